//! queuescale-autoscale — queue-depth-driven replica scaling.
//!
//! Watches the backlog of one queue and moves the replica count of one
//! deployment a single step at a time, keeping the backlog between
//! `scale_down_threshold` and `scale_up_threshold`.
//!
//! # Architecture
//!
//! ```text
//! PollDriver (one cycle at a time)
//!   ├── MetricSource::get_counts()        → QueueMetrics
//!   ├── ReplicaStore::get_replica_count() → ReplicaState
//!   ├── engine::decide()                  → ScalingAction (pure)
//!   ├── ReplicaStore::set_replica_count() (only on ScaleUp/ScaleDown)
//!   ├── CooldownClock::record_*()         (only after a successful write)
//!   └── sleep(poll_period)
//! ```
//!
//! Adapters are wrapped in [`Resilient`] to bound every call with a
//! timeout and a limited exponential-backoff retry.

pub mod clock;
pub mod driver;
pub mod engine;
pub mod resilient;
pub mod source;

pub use clock::CooldownClock;
pub use driver::{CycleError, CycleOutcome, CycleResult, PollDriver};
pub use engine::{Decision, Reason, decide, evaluate};
pub use resilient::Resilient;
pub use source::{MetricSource, ReplicaStore};
