//! Conversions between Kubernetes API values and queuescale types.

use std::fmt::Debug;

use kube::api::{Api, ListParams};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::warn;

use queuescale_core::{ApplyError, ApplyResult, DeploymentSelector, FetchError, FetchResult};

/// Map a read failure. 404 means the deployment is gone.
pub(crate) fn fetch_error(err: kube::Error, what: &str) -> FetchError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => FetchError::NotFound(what.to_string()),
        other => FetchError::Transport(other.to_string()),
    }
}

/// Map a write failure. 409 is a lost optimistic-concurrency race; other
/// 4xx codes except 429 will not succeed on retry.
pub(crate) fn apply_error(err: kube::Error, deployment: &str) -> ApplyError {
    match err {
        kube::Error::Api(resp) if resp.code == 409 => ApplyError::Conflict {
            deployment: deployment.to_string(),
        },
        kube::Error::Api(resp) if (400..500).contains(&resp.code) && resp.code != 429 => {
            ApplyError::Rejected(format!("{} ({})", resp.message, resp.code))
        }
        other => ApplyError::Transport(other.to_string()),
    }
}

/// Replica count from a deployment spec. An unset value means the
/// Kubernetes default of 1.
pub(crate) fn replica_count(replicas: Option<i64>, deployment: &str) -> FetchResult<u32> {
    let raw = replicas.unwrap_or(1);
    u32::try_from(raw).map_err(|_| {
        FetchError::Malformed(format!("deployment {deployment} reports {raw} replicas"))
    })
}

pub(crate) fn api_replicas(count: u32) -> ApplyResult<i32> {
    i32::try_from(count)
        .map_err(|_| ApplyError::Rejected(format!("replica count {count} is out of range")))
}

/// Resolve a selector to a deployment name.
pub(crate) async fn resolve_name<K>(api: &Api<K>, selector: &DeploymentSelector) -> FetchResult<String>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    match selector {
        DeploymentSelector::Name(name) => Ok(name.clone()),
        DeploymentSelector::Labels(labels) => {
            let list = api
                .list(&ListParams::default().labels(labels))
                .await
                .map_err(|e| fetch_error(e, &format!("deployments matching {labels}")))?;
            let names = list.items.iter().map(|d| d.name_any()).collect();
            pick_deployment(names, labels)
        }
    }
}

/// Pick the target among the deployments a label selector matched:
/// the first by name, with a warning when the choice is ambiguous.
pub(crate) fn pick_deployment(mut names: Vec<String>, labels: &str) -> FetchResult<String> {
    names.sort();
    if names.len() > 1 {
        warn!(
            selector = labels,
            matched = names.len(),
            chosen = %names[0],
            "selector matches several deployments, scaling the first"
        );
    }
    names
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::NotFound(format!("no deployment matches selector {labels}")))
}
