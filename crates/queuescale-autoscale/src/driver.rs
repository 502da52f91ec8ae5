//! Poll driver: fetch, decide, apply, sleep, until shut down.
//!
//! One cycle runs at a time. The cooldown clock is owned here and only
//! advances after the replica store confirmed the write.

use std::time::Instant;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use queuescale_core::{
    ApplyError, FetchError, QueueMetrics, ReplicaState, ScalingAction, ScalingPolicy,
};

use crate::clock::CooldownClock;
use crate::engine::{self, Decision};
use crate::source::{MetricSource, ReplicaStore};

/// Errors that end a single poll cycle. The driver logs them and polls
/// again after the usual sleep.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CycleError {
    #[error("failed to fetch queue metrics: {0}")]
    Metrics(#[source] FetchError),

    #[error("failed to read replica count: {0}")]
    Replicas(#[source] FetchError),

    #[error("failed to apply {action}: {source}")]
    Apply {
        action: ScalingAction,
        #[source]
        source: ApplyError,
    },
}

pub type CycleResult<T> = Result<T, CycleError>;

/// What one cycle observed and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub metrics: QueueMetrics,
    pub replicas: ReplicaState,
    pub decision: Decision,
    /// True when a scaling action was written successfully.
    pub applied: bool,
}

pub struct PollDriver<M, R> {
    source: M,
    store: R,
    policy: ScalingPolicy,
    clock: CooldownClock,
}

impl<M: MetricSource, R: ReplicaStore> PollDriver<M, R> {
    /// Create a driver whose cooldowns start now.
    pub fn new(source: M, store: R, policy: ScalingPolicy) -> Self {
        Self::with_clock(source, store, policy, CooldownClock::new(Instant::now()))
    }

    pub fn with_clock(source: M, store: R, policy: ScalingPolicy, clock: CooldownClock) -> Self {
        Self {
            source,
            store,
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> &ScalingPolicy {
        &self.policy
    }

    pub fn clock(&self) -> &CooldownClock {
        &self.clock
    }

    pub fn store(&self) -> &R {
        &self.store
    }

    /// Run one fetch → decide → apply step, deciding as of `now`.
    pub async fn run_cycle(&mut self, now: Instant) -> CycleResult<CycleOutcome> {
        let metrics = self
            .source
            .get_counts()
            .await
            .map_err(CycleError::Metrics)?;
        let replicas = self
            .store
            .get_replica_count()
            .await
            .map_err(CycleError::Replicas)?;

        debug!(
            visible = metrics.visible,
            invisible = metrics.invisible,
            replicas = replicas.current,
            deployment = %replicas.name,
            "current message counts"
        );

        let decision = engine::evaluate(&metrics, replicas.current, &self.policy, &self.clock, now);

        let applied = match decision.action {
            ScalingAction::NoAction => {
                debug!(reason = %decision.reason, "no scaling action");
                false
            }
            action @ (ScalingAction::ScaleUp { to } | ScalingAction::ScaleDown { to }) => {
                self.store
                    .set_replica_count(&replicas, to)
                    .await
                    .map_err(|source| CycleError::Apply { action, source })?;

                if matches!(action, ScalingAction::ScaleUp { .. }) {
                    self.clock.record_scale_up(now);
                } else {
                    self.clock.record_scale_down(now);
                }

                info!(
                    deployment = %replicas.name,
                    from = replicas.current,
                    to,
                    visible = metrics.visible,
                    invisible = metrics.invisible,
                    reason = %decision.reason,
                    "{action}"
                );
                true
            }
        };

        Ok(CycleOutcome {
            metrics,
            replicas,
            decision,
            applied,
        })
    }

    /// Poll until `shutdown` flips to true (or its sender is dropped).
    ///
    /// Shutdown is only observed between cycles; a running cycle always
    /// completes.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_period_ms = self.policy.poll_period.as_millis() as u64,
            min_replicas = self.policy.min_replicas,
            max_replicas = self.policy.max_replicas,
            "poll driver started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.run_cycle(Instant::now()).await {
                warn!(error = %e, "poll cycle failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.policy.poll_period) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("poll driver shutting down");
    }
}
