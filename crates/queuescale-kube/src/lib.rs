//! queuescale-kube — Kubernetes replica stores.
//!
//! One [`ReplicaStore`] per deployment API generation, both behind the
//! same trait:
//!
//! - [`AppsV1ReplicaStore`]: `apps/v1`, via the `scale` subresource.
//! - [`LegacyReplicaStore`]: `extensions/v1beta1`, `apps/v1beta1` and
//!   `apps/v1beta2`, via dynamic objects.
//!
//! Every write is conditional on the resource version that was read in
//! the same cycle.

mod convert;

pub mod apps_v1;
pub mod legacy;

pub use apps_v1::AppsV1ReplicaStore;
pub use legacy::LegacyReplicaStore;

use kube::Client;
use queuescale_autoscale::ReplicaStore;
use queuescale_core::{ApiGeneration, DeploymentSelector};

/// Build the replica store for the given API generation.
pub fn replica_store(
    client: Client,
    namespace: &str,
    selector: DeploymentSelector,
    api: ApiGeneration,
) -> Box<dyn ReplicaStore> {
    match api {
        ApiGeneration::AppsV1 => Box::new(AppsV1ReplicaStore::new(client, namespace, selector)),
        legacy => Box::new(LegacyReplicaStore::new(client, namespace, selector, legacy)),
    }
}
