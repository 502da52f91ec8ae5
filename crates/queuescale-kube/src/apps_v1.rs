//! Replica store for `apps/v1` deployments.
//!
//! Reads and writes go through the `scale` subresource. The write is a
//! replace carrying the resource version that was read, so a concurrent
//! edit makes it fail with 409 instead of being overwritten.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v1::{Scale, ScaleSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, PostParams};
use tracing::debug;

use queuescale_autoscale::ReplicaStore;
use queuescale_core::{
    ApplyError, ApplyResult, DeploymentSelector, FetchResult, ReplicaState,
};

use crate::convert::{api_replicas, apply_error, fetch_error, replica_count, resolve_name};

pub struct AppsV1ReplicaStore {
    api: Api<Deployment>,
    namespace: String,
    selector: DeploymentSelector,
}

impl AppsV1ReplicaStore {
    pub fn new(client: Client, namespace: &str, selector: DeploymentSelector) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            selector,
        }
    }
}

#[async_trait]
impl ReplicaStore for AppsV1ReplicaStore {
    async fn get_replica_count(&self) -> FetchResult<ReplicaState> {
        let name = resolve_name(&self.api, &self.selector).await?;
        let scale = self
            .api
            .get_scale(&name)
            .await
            .map_err(|e| fetch_error(e, &format!("deployment {}/{name}", self.namespace)))?;
        state_from_scale(&name, &scale)
    }

    async fn set_replica_count(&self, observed: &ReplicaState, count: u32) -> ApplyResult<()> {
        let scale = scale_request(&self.namespace, observed, count)?;
        let body = serde_json::to_vec(&scale).map_err(|e| ApplyError::Rejected(e.to_string()))?;

        let updated = self
            .api
            .replace_scale(&observed.name, &PostParams::default(), body)
            .await
            .map_err(|e| apply_error(e, &observed.name))?;

        debug!(
            deployment = %observed.name,
            replicas = count,
            revision = ?updated.metadata.resource_version,
            "scale subresource replaced"
        );
        Ok(())
    }
}

fn state_from_scale(name: &str, scale: &Scale) -> FetchResult<ReplicaState> {
    let replicas = scale.spec.as_ref().and_then(|s| s.replicas).map(i64::from);
    Ok(ReplicaState {
        name: name.to_string(),
        current: replica_count(replicas, name)?,
        revision: scale.metadata.resource_version.clone(),
    })
}

/// Scale object for a conditional replace of `observed` to `count`.
fn scale_request(namespace: &str, observed: &ReplicaState, count: u32) -> ApplyResult<Scale> {
    Ok(Scale {
        metadata: ObjectMeta {
            name: Some(observed.name.clone()),
            namespace: Some(namespace.to_string()),
            resource_version: observed.revision.clone(),
            ..Default::default()
        },
        spec: Some(ScaleSpec {
            replicas: Some(api_replicas(count)?),
        }),
        status: None,
    })
}
