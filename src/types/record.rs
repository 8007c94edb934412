//! Baseline record shapes: the mutable in-memory record and its persisted
//! write-through form.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::peer::{flatten_peers, group_peers, Peer, PersistedPeer};

/// Mutable in-memory baseline record for one deployment.
///
/// The deployment id is the map key in the record store and is not repeated
/// here. Metadata fields are immutable after creation; the observation period
/// end, lock flag and both peer sets mutate over the record's lifetime.
#[derive(Debug, Clone)]
pub struct BaselineInfo {
    pub cluster_id: String,
    pub namespace: String,
    pub deployment_name: String,
    pub observation_period_end: DateTime<Utc>,
    pub user_locked: bool,
    /// Peers confirmed as normal connectivity.
    pub baseline_peers: HashSet<Peer>,
    /// Peers explicitly marked anomalous by a user. Disjoint from
    /// `baseline_peers` per peer tuple.
    pub forbidden_peers: HashSet<Peer>,
}

impl BaselineInfo {
    pub fn new(
        deployment_name: impl Into<String>,
        cluster_id: impl Into<String>,
        namespace: impl Into<String>,
        observation_period_end: DateTime<Utc>,
    ) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            namespace: namespace.into(),
            deployment_name: deployment_name.into(),
            observation_period_end,
            user_locked: false,
            baseline_peers: HashSet::new(),
            forbidden_peers: HashSet::new(),
        }
    }

    /// True if a flow observed at `ts` falls inside the learning window.
    pub fn in_observation_period(&self, ts: DateTime<Utc>) -> bool {
        self.observation_period_end > ts
    }

    /// Materialize the persisted form of this record.
    pub fn to_persisted(&self, deployment_id: &str) -> NetworkBaseline {
        NetworkBaseline {
            deployment_id: deployment_id.to_string(),
            cluster_id: self.cluster_id.clone(),
            namespace: self.namespace.clone(),
            deployment_name: self.deployment_name.clone(),
            observation_period_end: self.observation_period_end,
            locked: self.user_locked,
            peers: group_peers(&self.baseline_peers),
            forbidden_peers: group_peers(&self.forbidden_peers),
        }
    }
}

/// Persisted/transmitted form of a baseline record. Peer lists are in the
/// deterministic order produced by [`group_peers`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkBaseline {
    pub deployment_id: String,
    pub cluster_id: String,
    pub namespace: String,
    pub deployment_name: String,
    pub observation_period_end: DateTime<Utc>,
    pub locked: bool,
    pub peers: Vec<PersistedPeer>,
    pub forbidden_peers: Vec<PersistedPeer>,
}

impl NetworkBaseline {
    /// Split into the record-store key and the in-memory record.
    pub fn into_info(self) -> (String, BaselineInfo) {
        let info = BaselineInfo {
            cluster_id: self.cluster_id,
            namespace: self.namespace,
            deployment_name: self.deployment_name,
            observation_period_end: self.observation_period_end,
            user_locked: self.locked,
            baseline_peers: flatten_peers(&self.peers),
            forbidden_peers: flatten_peers(&self.forbidden_peers),
        };
        (self.deployment_id, info)
    }
}
