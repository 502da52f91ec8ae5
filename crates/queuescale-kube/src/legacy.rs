//! Replica store for deployments served under pre-`apps/v1` API groups
//! (`extensions/v1beta1`, `apps/v1beta1`, `apps/v1beta2`).
//!
//! These are addressed as dynamic objects. The write is a merge patch of
//! `spec.replicas` that also carries `metadata.resourceVersion`, which
//! the API server treats as a precondition.

use async_trait::async_trait;
use kube::Client;
use kube::api::{Api, Patch, PatchParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use serde_json::{Value, json};
use tracing::debug;

use queuescale_autoscale::ReplicaStore;
use queuescale_core::{
    ApiGeneration, ApplyResult, DeploymentSelector, FetchError, FetchResult, ReplicaState,
};

use crate::convert::{api_replicas, apply_error, fetch_error, replica_count, resolve_name};

pub struct LegacyReplicaStore {
    api: Api<DynamicObject>,
    namespace: String,
    selector: DeploymentSelector,
    generation: ApiGeneration,
}

impl LegacyReplicaStore {
    pub fn new(
        client: Client,
        namespace: &str,
        selector: DeploymentSelector,
        generation: ApiGeneration,
    ) -> Self {
        let gvk = GroupVersionKind::gvk(generation.group(), generation.version(), "Deployment");
        let resource = ApiResource::from_gvk(&gvk);
        Self {
            api: Api::namespaced_with(client, namespace, &resource),
            namespace: namespace.to_string(),
            selector,
            generation,
        }
    }
}

#[async_trait]
impl ReplicaStore for LegacyReplicaStore {
    async fn get_replica_count(&self) -> FetchResult<ReplicaState> {
        let name = resolve_name(&self.api, &self.selector).await?;
        let object = self.api.get(&name).await.map_err(|e| {
            fetch_error(
                e,
                &format!("{} deployment {}/{name}", self.generation, self.namespace),
            )
        })?;
        state_from_object(&name, &object)
    }

    async fn set_replica_count(&self, observed: &ReplicaState, count: u32) -> ApplyResult<()> {
        let patch = replica_patch(observed, count)?;
        self.api
            .patch(&observed.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| apply_error(e, &observed.name))?;

        debug!(
            deployment = %observed.name,
            api = %self.generation,
            replicas = count,
            "deployment patched"
        );
        Ok(())
    }
}

fn state_from_object(name: &str, object: &DynamicObject) -> FetchResult<ReplicaState> {
    let replicas = match object.data.get("spec").and_then(|spec| spec.get("replicas")) {
        None | Some(Value::Null) => None,
        Some(value) => Some(value.as_i64().ok_or_else(|| {
            FetchError::Malformed(format!("deployment {name} has non-integer replicas: {value}"))
        })?),
    };

    Ok(ReplicaState {
        name: name.to_string(),
        current: replica_count(replicas, name)?,
        revision: object.metadata.resource_version.clone(),
    })
}

fn replica_patch(observed: &ReplicaState, count: u32) -> ApplyResult<Value> {
    let mut patch = json!({ "spec": { "replicas": api_replicas(count)? } });
    if let Some(revision) = &observed.revision {
        patch["metadata"] = json!({ "resourceVersion": revision });
    }
    Ok(patch)
}
