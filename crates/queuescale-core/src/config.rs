//! queuescale.toml configuration parser.
//!
//! The file is optional. Every key has a default, and the daemon layers
//! command-line flags and environment variables on top before calling
//! [`ScalerConfig::validate`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{ApiGeneration, DeploymentSelector, IoPolicy, QueueTarget, ScalingPolicy};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScalerConfig {
    pub queue: QueueConfig,
    pub kubernetes: KubernetesConfig,
    pub scaling: ScalingConfig,
    pub io: IoConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub url: Option<String>,
    pub name: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KubernetesConfig {
    pub namespace: String,
    pub deployment: Option<String>,
    pub deployment_selector: Option<String>,
    pub api: ApiGeneration,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            deployment: None,
            deployment_selector: None,
            api: ApiGeneration::AppsV1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScalingConfig {
    pub scale_up_messages: u64,
    pub scale_down_messages: u64,
    pub scale_up_cool_down: String,
    pub scale_down_cool_down: String,
    pub min_pods: u32,
    pub max_pods: u32,
    pub poll_period: String,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            scale_up_messages: 100,
            scale_down_messages: 10,
            scale_up_cool_down: "10s".to_string(),
            scale_down_cool_down: "30s".to_string(),
            min_pods: 1,
            max_pods: 1,
            poll_period: "5s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IoConfig {
    pub timeout: String,
    pub retry_initial_interval: String,
    pub retry_max_elapsed: String,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            timeout: "10s".to_string(),
            retry_initial_interval: "500ms".to_string(),
            retry_max_elapsed: "30s".to_string(),
        }
    }
}

/// Configuration after validation: everything the daemon needs to wire
/// the adapters and the poll driver.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    pub queue: QueueTarget,
    pub region: Option<String>,
    pub namespace: String,
    pub selector: DeploymentSelector,
    pub api: ApiGeneration,
    pub policy: ScalingPolicy,
    pub io: IoPolicy,
}

impl ScalerConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Resolve targets, parse durations, and check bounds.
    ///
    /// A queue URL wins over a queue name; an explicit label selector wins
    /// over a deployment name.
    pub fn validate(&self) -> ConfigResult<ValidatedConfig> {
        let queue = match (non_empty(&self.queue.url), non_empty(&self.queue.name)) {
            (Some(url), _) => QueueTarget::Url(url.to_string()),
            (None, Some(name)) => QueueTarget::Name(name.to_string()),
            (None, None) => return Err(ConfigError::MissingQueue),
        };

        let k8s = &self.kubernetes;
        let selector = match (
            non_empty(&k8s.deployment_selector),
            non_empty(&k8s.deployment),
        ) {
            (Some(labels), _) => DeploymentSelector::Labels(labels.to_string()),
            (None, Some(name)) => DeploymentSelector::Name(name.to_string()),
            (None, None) => return Err(ConfigError::MissingDeployment),
        };

        if k8s.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "kubernetes.namespace",
                reason: "must not be empty".to_string(),
            });
        }

        let s = &self.scaling;
        let policy = ScalingPolicy {
            scale_up_threshold: s.scale_up_messages,
            scale_down_threshold: s.scale_down_messages,
            scale_up_cooldown: parse_duration("scale_up_cool_down", &s.scale_up_cool_down)?,
            scale_down_cooldown: parse_duration("scale_down_cool_down", &s.scale_down_cool_down)?,
            min_replicas: s.min_pods,
            max_replicas: s.max_pods,
            poll_period: parse_duration("poll_period", &s.poll_period)?,
        };
        policy.validate()?;

        let io = IoPolicy {
            timeout: parse_duration("io.timeout", &self.io.timeout)?,
            retry_initial_interval: parse_duration(
                "io.retry_initial_interval",
                &self.io.retry_initial_interval,
            )?,
            retry_max_elapsed: parse_duration("io.retry_max_elapsed", &self.io.retry_max_elapsed)?,
        };
        if io.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "io.timeout",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(ValidatedConfig {
            queue,
            region: non_empty(&self.queue.region).map(str::to_string),
            namespace: k8s.namespace.trim().to_string(),
            selector,
            api: k8s.api,
            policy,
            io,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Parse a duration string like "500ms", "30s", "5m". A bare integer is
/// read as seconds.
pub fn parse_duration(field: &'static str, value: &str) -> ConfigResult<Duration> {
    let s = value.trim();
    let invalid = || ConfigError::Duration {
        field,
        value: value.to_string(),
    };

    let parsed = if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    };

    parsed.ok_or_else(invalid)
}
