//! Domain types for the queue-depth autoscaler.
//!
//! Everything here except [`ScalingPolicy`] and [`IoPolicy`] is a
//! per-cycle snapshot: fetched, used for one decision, and dropped.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

// ── Policy ────────────────────────────────────────────────────────

/// Static scaling parameters, validated once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingPolicy {
    /// Visible-message count at or above which scale-up is considered.
    pub scale_up_threshold: u64,
    /// Visible-message count at or below which scale-down is considered.
    pub scale_down_threshold: u64,
    /// Minimum time between two scale-ups.
    pub scale_up_cooldown: Duration,
    /// Minimum time between two scale-downs.
    pub scale_down_cooldown: Duration,
    pub min_replicas: u32,
    pub max_replicas: u32,
    /// Sleep between poll cycles.
    pub poll_period: Duration,
}

impl ScalingPolicy {
    /// Check bounds and thresholds.
    ///
    /// A down-threshold at or above the up-threshold would let both
    /// branches fire on the same queue depth, so it is rejected.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.min_replicas > self.max_replicas {
            return Err(ConfigError::ReplicaBounds {
                min: self.min_replicas,
                max: self.max_replicas,
            });
        }
        if self.scale_down_threshold >= self.scale_up_threshold {
            return Err(ConfigError::Thresholds {
                up: self.scale_up_threshold,
                down: self.scale_down_threshold,
            });
        }
        if self.poll_period.is_zero() {
            return Err(ConfigError::Invalid {
                field: "poll_period",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Timeout and retry bounds applied around every adapter call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoPolicy {
    /// Upper bound on a single attempt.
    pub timeout: Duration,
    /// First backoff interval; doubles on each retry.
    pub retry_initial_interval: Duration,
    /// Stop retrying once this much time has passed since the first attempt.
    pub retry_max_elapsed: Duration,
}

impl Default for IoPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry_initial_interval: Duration::from_millis(500),
            retry_max_elapsed: Duration::from_secs(30),
        }
    }
}

// ── Per-cycle snapshots ───────────────────────────────────────────

/// Message counts for one queue at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueMetrics {
    /// Messages available for consumption now.
    pub visible: u64,
    /// Messages leased by a consumer and not yet acknowledged.
    pub invisible: u64,
}

impl QueueMetrics {
    pub fn new(visible: u64, invisible: u64) -> Self {
        Self { visible, invisible }
    }
}

/// Replica count of the target deployment as read from the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaState {
    /// Resolved deployment name (a label selector is resolved on read).
    pub name: String,
    pub current: u32,
    /// Resource version observed with `current`. Writes are conditional on it.
    pub revision: Option<String>,
}

impl ReplicaState {
    pub fn new(name: impl Into<String>, current: u32) -> Self {
        Self {
            name: name.into(),
            current,
            revision: None,
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }
}

/// Outcome of one scaling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingAction {
    NoAction,
    ScaleUp { to: u32 },
    ScaleDown { to: u32 },
}

impl ScalingAction {
    /// Replica count to write, if any.
    pub fn target(&self) -> Option<u32> {
        match self {
            ScalingAction::NoAction => None,
            ScalingAction::ScaleUp { to } | ScalingAction::ScaleDown { to } => Some(*to),
        }
    }

    pub fn is_no_action(&self) -> bool {
        matches!(self, ScalingAction::NoAction)
    }
}

impl fmt::Display for ScalingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalingAction::NoAction => write!(f, "no action"),
            ScalingAction::ScaleUp { to } => write!(f, "scale up to {to}"),
            ScalingAction::ScaleDown { to } => write!(f, "scale down to {to}"),
        }
    }
}

// ── Targets ───────────────────────────────────────────────────────

/// The queue to watch. A name is resolved to a URL once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueTarget {
    Url(String),
    Name(String),
}

/// How the target deployment is located within its namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentSelector {
    /// Exact deployment name.
    Name(String),
    /// Label query such as `app=worker,tier=batch`.
    Labels(String),
}

impl fmt::Display for DeploymentSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentSelector::Name(name) => write!(f, "name={name}"),
            DeploymentSelector::Labels(labels) => write!(f, "labels({labels})"),
        }
    }
}

/// API group/version under which deployments are served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiGeneration {
    #[default]
    #[serde(rename = "apps/v1")]
    AppsV1,
    #[serde(rename = "apps/v1beta2")]
    AppsV1Beta2,
    #[serde(rename = "apps/v1beta1")]
    AppsV1Beta1,
    #[serde(rename = "extensions/v1beta1")]
    ExtensionsV1Beta1,
}

impl ApiGeneration {
    pub fn group(&self) -> &'static str {
        match self {
            ApiGeneration::ExtensionsV1Beta1 => "extensions",
            _ => "apps",
        }
    }

    pub fn version(&self) -> &'static str {
        match self {
            ApiGeneration::AppsV1 => "v1",
            ApiGeneration::AppsV1Beta2 => "v1beta2",
            ApiGeneration::AppsV1Beta1 | ApiGeneration::ExtensionsV1Beta1 => "v1beta1",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiGeneration::AppsV1 => "apps/v1",
            ApiGeneration::AppsV1Beta2 => "apps/v1beta2",
            ApiGeneration::AppsV1Beta1 => "apps/v1beta1",
            ApiGeneration::ExtensionsV1Beta1 => "extensions/v1beta1",
        }
    }
}

impl fmt::Display for ApiGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiGeneration {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "apps/v1" => Ok(ApiGeneration::AppsV1),
            "apps/v1beta2" => Ok(ApiGeneration::AppsV1Beta2),
            "apps/v1beta1" => Ok(ApiGeneration::AppsV1Beta1),
            "extensions/v1beta1" => Ok(ApiGeneration::ExtensionsV1Beta1),
            other => Err(ConfigError::Invalid {
                field: "kubernetes.api",
                reason: format!("unknown API generation {other:?}"),
            }),
        }
    }
}
