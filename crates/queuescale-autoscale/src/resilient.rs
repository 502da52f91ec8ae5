//! Timeout and bounded retry around adapter calls.
//!
//! Every attempt is capped by `IoPolicy::timeout`. Retryable failures
//! (transport errors and timeouts) are retried with exponential backoff
//! until `IoPolicy::retry_max_elapsed` has passed; anything else is
//! returned on the first occurrence.
//!
//! Replica writes are the exception. A write that timed out may still
//! have been applied, so it is not retried. When a write ends in an
//! error after an attempt whose outcome is unknown, the replica count is
//! read back, and a deployment already at the target counts as success.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use tracing::{debug, info, warn};

use queuescale_core::{
    ApplyError, ApplyResult, FetchError, FetchResult, IoPolicy, QueueMetrics, ReplicaState,
};

use crate::source::{MetricSource, ReplicaStore};

/// Errors the retry loop knows how to classify.
trait AdapterError: fmt::Display + Send + 'static {
    fn retryable(&self) -> bool;
    fn timed_out(after: Duration) -> Self;
}

impl AdapterError for FetchError {
    fn retryable(&self) -> bool {
        self.is_retryable()
    }

    fn timed_out(after: Duration) -> Self {
        FetchError::Timeout(after)
    }
}

impl AdapterError for ApplyError {
    fn retryable(&self) -> bool {
        self.is_retryable()
    }

    fn timed_out(after: Duration) -> Self {
        ApplyError::Timeout(after)
    }
}

/// Wraps a [`MetricSource`] or [`ReplicaStore`] with timeouts and retries.
pub struct Resilient<T> {
    inner: T,
    io: IoPolicy,
}

impl<T> Resilient<T> {
    pub fn new(inner: T, io: IoPolicy) -> Self {
        Self { inner, io }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.io.retry_initial_interval)
            .with_multiplier(2.0)
            .with_max_interval(self.io.retry_max_elapsed.max(self.io.retry_initial_interval))
            .with_max_elapsed_time(Some(self.io.retry_max_elapsed))
            .build()
    }

    async fn call<V, E, F, Fut>(&self, operation: &'static str, op: F) -> Result<V, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: AdapterError,
    {
        let unknown = AtomicBool::new(false);
        self.attempt(operation, true, &unknown, op).await
    }

    /// Retry loop shared by reads and writes. `unknown` is set when an
    /// attempt failed in a way that may have reached the remote side.
    async fn attempt<V, E, F, Fut>(
        &self,
        operation: &'static str,
        retry_timeouts: bool,
        unknown: &AtomicBool,
        mut op: F,
    ) -> Result<V, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: AdapterError,
    {
        let limit = self.io.timeout;
        backoff::future::retry_notify(
            self.backoff(),
            || {
                let attempt = op();
                async move {
                    match tokio::time::timeout(limit, attempt).await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(err)) if err.retryable() => {
                            unknown.store(true, Ordering::SeqCst);
                            Err(backoff::Error::transient(err))
                        }
                        Ok(Err(err)) => Err(backoff::Error::permanent(err)),
                        Err(_) => {
                            unknown.store(true, Ordering::SeqCst);
                            let err = E::timed_out(limit);
                            if retry_timeouts {
                                Err(backoff::Error::transient(err))
                            } else {
                                Err(backoff::Error::permanent(err))
                            }
                        }
                    }
                }
            },
            |err: E, wait: Duration| {
                warn!(operation, error = %err, retry_in = ?wait, "adapter call failed, retrying");
            },
        )
        .await
    }
}

impl<T: ReplicaStore> Resilient<T> {
    /// Read the deployment back after a write with an unknown outcome.
    async fn confirm_write(
        &self,
        observed: &ReplicaState,
        count: u32,
        err: ApplyError,
    ) -> ApplyResult<()> {
        match self
            .call("get_replica_count", || self.inner.get_replica_count())
            .await
        {
            Ok(state) if state.name == observed.name && state.current == count => {
                info!(
                    deployment = %state.name,
                    replicas = count,
                    error = %err,
                    "replica write reported failure but the deployment is at the target"
                );
                Ok(())
            }
            Ok(state) => {
                debug!(
                    deployment = %state.name,
                    replicas = state.current,
                    target = count,
                    "replica write did not land"
                );
                Err(err)
            }
            Err(read_err) => {
                warn!(error = %read_err, "cannot confirm replica write");
                Err(err)
            }
        }
    }
}

#[async_trait]
impl<T: MetricSource> MetricSource for Resilient<T> {
    async fn get_counts(&self) -> FetchResult<QueueMetrics> {
        self.call("get_counts", || self.inner.get_counts()).await
    }
}

#[async_trait]
impl<T: ReplicaStore> ReplicaStore for Resilient<T> {
    async fn get_replica_count(&self) -> FetchResult<ReplicaState> {
        self.call("get_replica_count", || self.inner.get_replica_count())
            .await
    }

    async fn set_replica_count(&self, observed: &ReplicaState, count: u32) -> ApplyResult<()> {
        let unknown = AtomicBool::new(false);
        let result = self
            .attempt("set_replica_count", false, &unknown, || {
                self.inner.set_replica_count(observed, count)
            })
            .await;

        match result {
            Err(err) if unknown.load(Ordering::SeqCst) => {
                self.confirm_write(observed, count, err).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_io() -> IoPolicy {
        IoPolicy {
            timeout: Duration::from_millis(50),
            retry_initial_interval: Duration::from_millis(1),
            retry_max_elapsed: Duration::from_millis(500),
        }
    }

    /// Fails with the scripted errors, then succeeds.
    struct Flaky {
        failures: Mutex<Vec<FetchError>>,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: Vec<FetchError>) -> Self {
            Self {
                failures: Mutex::new(failures),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl MetricSource for Flaky {
        async fn get_counts(&self) -> FetchResult<QueueMetrics> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.failures.lock().unwrap().pop() {
                Some(err) => Err(err),
                None => Ok(QueueMetrics::new(7, 1)),
            }
        }
    }

    struct Stuck;

    #[async_trait]
    impl MetricSource for Stuck {
        async fn get_counts(&self) -> FetchResult<QueueMetrics> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(QueueMetrics::default())
        }
    }

    struct Conflicting {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ReplicaStore for Conflicting {
        async fn get_replica_count(&self) -> FetchResult<ReplicaState> {
            Ok(ReplicaState::new("worker", 1))
        }

        async fn set_replica_count(&self, observed: &ReplicaState, _count: u32) -> ApplyResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ApplyError::Conflict {
                deployment: observed.name.clone(),
            })
        }
    }

    /// Deployment whose writes can land without a timely or successful
    /// reply. Every write bumps the revision; stale writes conflict.
    struct LossyAck {
        state: Mutex<(u32, u64)>,
        apply_first: bool,
        reply_delay: Duration,
        first_reply: Option<ApplyError>,
        writes: AtomicU32,
    }

    impl LossyAck {
        fn new(apply_first: bool, reply_delay: Duration, first_reply: Option<ApplyError>) -> Self {
            Self {
                state: Mutex::new((1, 1)),
                apply_first,
                reply_delay,
                first_reply,
                writes: AtomicU32::new(0),
            }
        }

        fn replicas(&self) -> u32 {
            self.state.lock().unwrap().0
        }
    }

    #[async_trait]
    impl ReplicaStore for LossyAck {
        async fn get_replica_count(&self) -> FetchResult<ReplicaState> {
            let (replicas, version) = *self.state.lock().unwrap();
            Ok(ReplicaState::new("worker", replicas).with_revision(version.to_string()))
        }

        async fn set_replica_count(&self, observed: &ReplicaState, count: u32) -> ApplyResult<()> {
            let first = self.writes.fetch_add(1, Ordering::SeqCst) == 0;
            {
                let mut state = self.state.lock().unwrap();
                if observed.revision.as_deref() != Some(state.1.to_string().as_str()) {
                    return Err(ApplyError::Conflict {
                        deployment: observed.name.clone(),
                    });
                }
                if !first || self.apply_first {
                    *state = (count, state.1 + 1);
                }
            }
            if first {
                tokio::time::sleep(self.reply_delay).await;
                if let Some(err) = self.first_reply.clone() {
                    return Err(err);
                }
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn late_acknowledged_write_is_confirmed() {
        let store = Resilient::new(
            LossyAck::new(true, Duration::from_millis(200), None),
            fast_io(),
        );

        let observed = store.get_replica_count().await.unwrap();
        store.set_replica_count(&observed, 2).await.unwrap();

        assert_eq!(store.inner().replicas(), 2);
        assert_eq!(store.inner().writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timed_out_write_that_did_not_land_is_not_retried() {
        let store = Resilient::new(
            LossyAck::new(false, Duration::from_millis(200), None),
            fast_io(),
        );

        let observed = store.get_replica_count().await.unwrap();
        let err = store.set_replica_count(&observed, 2).await.unwrap_err();

        assert_eq!(err, ApplyError::Timeout(Duration::from_millis(50)));
        assert_eq!(store.inner().replicas(), 1);
        assert_eq!(store.inner().writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn conflict_after_lost_reply_is_confirmed() {
        let store = Resilient::new(
            LossyAck::new(
                true,
                Duration::ZERO,
                Some(ApplyError::Transport("connection reset".into())),
            ),
            fast_io(),
        );

        let observed = store.get_replica_count().await.unwrap();
        store.set_replica_count(&observed, 2).await.unwrap();

        // The retry hit the bumped revision and conflicted; the read-back
        // found the deployment already at 2.
        assert_eq!(store.inner().replicas(), 2);
        assert_eq!(store.inner().writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let source = Resilient::new(
            Flaky::new(vec![
                FetchError::Transport("reset".into()),
                FetchError::Timeout(Duration::from_millis(1)),
            ]),
            fast_io(),
        );

        let metrics = source.get_counts().await.unwrap();
        assert_eq!(metrics, QueueMetrics::new(7, 1));
        assert_eq!(source.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_surface_immediately() {
        let source = Resilient::new(
            Flaky::new(vec![FetchError::NotFound("jobs".into())]),
            fast_io(),
        );

        let err = source.get_counts().await.unwrap_err();
        assert_eq!(err, FetchError::NotFound("jobs".into()));
        assert_eq!(source.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let io = IoPolicy {
            retry_max_elapsed: Duration::ZERO,
            ..fast_io()
        };
        let source = Resilient::new(
            Flaky::new(vec![FetchError::Transport("down".into()); 100]),
            io,
        );

        let err = source.get_counts().await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
        assert!(source.inner().calls.load(Ordering::SeqCst) < 100);
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let io = IoPolicy {
            timeout: Duration::from_millis(10),
            retry_initial_interval: Duration::from_millis(1),
            retry_max_elapsed: Duration::ZERO,
        };
        let source = Resilient::new(Stuck, io);

        let err = source.get_counts().await.unwrap_err();
        assert_eq!(err, FetchError::Timeout(Duration::from_millis(10)));
    }

    #[tokio::test]
    async fn conflicts_are_not_retried() {
        let store = Resilient::new(
            Conflicting {
                calls: AtomicU32::new(0),
            },
            fast_io(),
        );

        let observed = store.get_replica_count().await.unwrap();
        let err = store.set_replica_count(&observed, 2).await.unwrap_err();
        assert!(matches!(err, ApplyError::Conflict { .. }));
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 1);
    }
}
