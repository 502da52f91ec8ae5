//! Capability traits for the two external collaborators.
//!
//! Adapters live in their own crates (`queuescale-sqs`,
//! `queuescale-kube`); the poll driver only sees these traits.

use async_trait::async_trait;

use queuescale_core::{ApplyResult, FetchResult, QueueMetrics, ReplicaState};

/// Reports visible and in-flight message counts for one queue.
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn get_counts(&self) -> FetchResult<QueueMetrics>;
}

/// Reads and writes the replica count of one deployment.
#[async_trait]
pub trait ReplicaStore: Send + Sync {
    /// Current replica count, fresh from the orchestrator.
    async fn get_replica_count(&self) -> FetchResult<ReplicaState>;

    /// Set the replica count of the deployment described by `observed`.
    ///
    /// Implementations make the write conditional on `observed.revision`
    /// when it is present and report a lost race as
    /// [`ApplyError::Conflict`](queuescale_core::ApplyError::Conflict).
    async fn set_replica_count(&self, observed: &ReplicaState, count: u32) -> ApplyResult<()>;
}

#[async_trait]
impl<T: MetricSource + ?Sized> MetricSource for Box<T> {
    async fn get_counts(&self) -> FetchResult<QueueMetrics> {
        (**self).get_counts().await
    }
}

#[async_trait]
impl<T: ReplicaStore + ?Sized> ReplicaStore for Box<T> {
    async fn get_replica_count(&self) -> FetchResult<ReplicaState> {
        (**self).get_replica_count().await
    }

    async fn set_replica_count(&self, observed: &ReplicaState, count: u32) -> ApplyResult<()> {
        (**self).set_replica_count(observed, count).await
    }
}
