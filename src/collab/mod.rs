//! Collaborator contracts consumed by the baseline manager.
//!
//! These services live elsewhere in the platform (the central datastore, the
//! deployment and network-entity services, the sensor connection manager);
//! the manager only depends on the traits here. Access-scope filtering on
//! reads is the store's job; the manager writes with full access because it
//! already performed its permission checks at the API boundary.

pub mod sqlite;

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::policy::NetworkPolicy;
use crate::types::record::NetworkBaseline;

/// Write-through persistent store for baseline records, keyed by deployment
/// id.
pub trait BaselineStore: Send + Sync {
    fn get(&self, deployment_id: &str) -> Result<Option<NetworkBaseline>>;
    fn upsert_many(&self, baselines: &[NetworkBaseline]) -> Result<()>;
    fn delete(&self, deployment_id: &str) -> Result<()>;
    fn delete_many(&self, deployment_ids: &[String]) -> Result<()>;
    /// Iterate all stored records; used only at startup.
    fn walk(&self, f: &mut dyn FnMut(NetworkBaseline) -> Result<()>) -> Result<()>;
}

/// Deployment metadata as served by the deployment datastore.
#[derive(Debug, Clone)]
pub struct DeploymentInfo {
    pub id: String,
    pub name: String,
    pub cluster_id: String,
    pub namespace: String,
    pub pod_labels: BTreeMap<String, String>,
}

pub trait DeploymentLookup: Send + Sync {
    fn get_deployment(&self, id: &str) -> Result<Option<DeploymentInfo>>;
    /// All deployments in one cluster/namespace pair; used to find the
    /// deployments a changed network policy selects.
    fn search_deployments(&self, cluster_id: &str, namespace: &str) -> Result<Vec<DeploymentInfo>>;
}

/// Resolved metadata for a non-deployment network entity.
#[derive(Debug, Clone)]
pub struct ExternalEntity {
    pub name: String,
    /// Dynamically discovered rather than pinned by a user. Discovered
    /// entities are collapsed to the internet aggregate when naming peers.
    pub discovered: bool,
}

pub trait NetworkEntityLookup: Send + Sync {
    fn entity_name(&self, id: &str) -> Result<Option<ExternalEntity>>;
}

pub trait NetworkPolicyLookup: Send + Sync {
    /// Currently active policies in one cluster/namespace pair; used only to
    /// seed the dedup cache at startup.
    fn get_policies(&self, cluster_id: &str, namespace: &str) -> Result<Vec<NetworkPolicy>>;
}

/// Payload pushed to a cluster's connected agent when a locked baseline
/// changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineSync {
    pub message_id: Uuid,
    pub baseline: NetworkBaseline,
}

impl BaselineSync {
    pub fn new(baseline: NetworkBaseline) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            baseline,
        }
    }
}

pub trait AgentNotifier: Send + Sync {
    /// Fire-and-forget from the manager's perspective: a failure is logged
    /// and never rolls back the already-persisted change.
    fn send_baseline_sync(&self, cluster_id: &str, sync: BaselineSync) -> Result<()>;
}
