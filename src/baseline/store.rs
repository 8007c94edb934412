//! In-memory baseline record store.
//!
//! Owns the deployment-id -> record map and the mutations that must keep the
//! bidirectional mirroring invariant intact. Callers go through the manager,
//! which serializes all access behind its lock.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::types::entity::EntityType;
use crate::types::peer::Peer;
use crate::types::record::BaselineInfo;

#[derive(Default)]
pub struct RecordStore {
    records: HashMap<String, BaselineInfo>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, deployment_id: &str) -> bool {
        self.records.contains_key(deployment_id)
    }

    pub fn get(&self, deployment_id: &str) -> Option<&BaselineInfo> {
        self.records.get(deployment_id)
    }

    pub fn get_mut(&mut self, deployment_id: &str) -> Option<&mut BaselineInfo> {
        self.records.get_mut(deployment_id)
    }

    /// Replay one persisted record into memory (startup path).
    pub fn insert(&mut self, deployment_id: String, info: BaselineInfo) {
        self.records.insert(deployment_id, info);
    }

    /// Insert a fresh empty record unless one already exists.
    /// Returns whether a record was created.
    pub fn create(
        &mut self,
        deployment_id: &str,
        deployment_name: &str,
        cluster_id: &str,
        namespace: &str,
        observation_period_end: DateTime<Utc>,
    ) -> bool {
        if self.records.contains_key(deployment_id) {
            return false;
        }
        self.records.insert(
            deployment_id.to_string(),
            BaselineInfo::new(deployment_name, cluster_id, namespace, observation_period_end),
        );
        true
    }

    /// Add a peer to the baseline set unless it is already present or
    /// explicitly forbidden. Returns whether the record changed, so callers
    /// know whether persistence is needed.
    pub fn add_peer_if_new(&mut self, deployment_id: &str, peer: Peer) -> bool {
        match self.records.get_mut(deployment_id) {
            Some(info) => {
                if info.forbidden_peers.contains(&peer) {
                    false
                } else {
                    info.baseline_peers.insert(peer)
                }
            }
            None => false,
        }
    }

    /// Move a peer into the baseline set (removing any forbidden entry) or
    /// into the forbidden set (removing any baseline entry). The two sets
    /// stay disjoint per peer tuple. Returns whether the record changed.
    pub fn set_peer_status(&mut self, deployment_id: &str, peer: &Peer, forbidden: bool) -> bool {
        let Some(info) = self.records.get_mut(deployment_id) else {
            return false;
        };
        if forbidden {
            let removed = info.baseline_peers.remove(peer);
            let inserted = info.forbidden_peers.insert(peer.clone());
            removed || inserted
        } else {
            let removed = info.forbidden_peers.remove(peer);
            let inserted = info.baseline_peers.insert(peer.clone());
            removed || inserted
        }
    }

    /// Remove a record, scrubbing its mirrored edges from every referenced
    /// deployment's record. Returns the removed record together with the ids
    /// of the other records that changed, so the caller can persist them
    /// before deleting the record itself.
    pub fn delete(&mut self, deployment_id: &str) -> Option<(BaselineInfo, HashSet<String>)> {
        let info = self.records.remove(deployment_id)?;
        let mut changed = HashSet::new();
        for peer in info.baseline_peers.iter().chain(info.forbidden_peers.iter()) {
            if peer.entity.entity_type != EntityType::Deployment {
                continue;
            }
            let other_id = &peer.entity.id;
            if let Some(other) = self.records.get_mut(other_id) {
                let mirror = peer.reversed(deployment_id, &info.deployment_name);
                let removed =
                    other.baseline_peers.remove(&mirror) | other.forbidden_peers.remove(&mirror);
                if removed {
                    changed.insert(other_id.clone());
                }
            }
        }
        Some((info, changed))
    }

    /// Remove every record in the given cluster, scrubbing mirrored edges in
    /// the records that survive. Returns (deleted ids, changed survivor ids).
    pub fn bulk_delete_by_cluster(&mut self, cluster_id: &str) -> (Vec<String>, HashSet<String>) {
        let doomed: Vec<String> = self
            .records
            .iter()
            .filter(|(_, info)| info.cluster_id == cluster_id)
            .map(|(id, _)| id.clone())
            .collect();

        let mut changed = HashSet::new();
        for id in &doomed {
            if let Some((_, ids)) = self.delete(id) {
                changed.extend(ids);
            }
        }
        // Edges between two doomed records may have marked a record changed
        // before it was itself removed; those are deletions, not updates.
        for id in &doomed {
            changed.remove(id);
        }
        (doomed, changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::entity::{L4Protocol, PeerEntity};

    fn obs_end() -> DateTime<Utc> {
        Utc::now() + chrono::Duration::hours(1)
    }

    fn dep_peer(id: &str, ingress: bool, port: u32) -> Peer {
        Peer {
            entity: PeerEntity {
                entity_type: EntityType::Deployment,
                id: id.to_string(),
                name: format!("name-{}", id),
            },
            ingress,
            port,
            protocol: L4Protocol::Tcp,
        }
    }

    fn ext_peer(id: &str, port: u32) -> Peer {
        Peer {
            entity: PeerEntity {
                entity_type: EntityType::ExternalSource,
                id: id.to_string(),
                name: "External Entities".to_string(),
            },
            ingress: false,
            port,
            protocol: L4Protocol::Tcp,
        }
    }

    fn store_with(ids: &[&str]) -> RecordStore {
        let mut store = RecordStore::new();
        for id in ids {
            assert!(store.create(id, &format!("name-{}", id), "CLUSTER1", "NS1", obs_end()));
        }
        store
    }

    #[test]
    fn test_create_is_idempotent() {
        let mut store = store_with(&["A"]);
        store.add_peer_if_new("A", dep_peer("B", false, 80));

        assert!(!store.create("A", "other-name", "CLUSTER2", "NS2", obs_end()));

        let info = store.get("A").unwrap();
        assert_eq!(info.deployment_name, "name-A");
        assert_eq!(info.cluster_id, "CLUSTER1");
        assert_eq!(info.baseline_peers.len(), 1);
    }

    #[test]
    fn test_add_peer_if_new_reports_mutations() {
        let mut store = store_with(&["A"]);

        assert!(store.add_peer_if_new("A", dep_peer("B", false, 80)));
        assert!(!store.add_peer_if_new("A", dep_peer("B", false, 80)));
        assert!(!store.add_peer_if_new("UNKNOWN", dep_peer("B", false, 80)));
    }

    #[test]
    fn test_forbidden_peers_are_not_relearned() {
        let mut store = store_with(&["A"]);
        let peer = dep_peer("B", true, 443);

        assert!(store.set_peer_status("A", &peer, true));
        assert!(!store.add_peer_if_new("A", peer.clone()));
        assert!(store.get("A").unwrap().baseline_peers.is_empty());
    }

    #[test]
    fn test_set_peer_status_keeps_sets_disjoint() {
        let mut store = store_with(&["A"]);
        let peer = dep_peer("B", true, 443);

        assert!(store.set_peer_status("A", &peer, false));
        assert!(store.set_peer_status("A", &peer, true));
        {
            let info = store.get("A").unwrap();
            assert!(!info.baseline_peers.contains(&peer));
            assert!(info.forbidden_peers.contains(&peer));
        }

        // Moving it back is symmetric; repeating is a no-op.
        assert!(store.set_peer_status("A", &peer, false));
        assert!(!store.set_peer_status("A", &peer, false));
        let info = store.get("A").unwrap();
        assert!(info.baseline_peers.contains(&peer));
        assert!(info.forbidden_peers.is_empty());
    }

    #[test]
    fn test_delete_scrubs_mirrored_edges() {
        let mut store = store_with(&["A", "B", "C"]);
        // A -> B on 52: egress peer on A, mirrored ingress peer on B.
        store.add_peer_if_new("A", dep_peer("B", false, 52));
        store.add_peer_if_new("B", dep_peer("A", true, 52));
        // Forbidden edge between B and C.
        store.set_peer_status("B", &dep_peer("C", true, 443), true);
        store.set_peer_status("C", &dep_peer("B", false, 443), true);
        // External peer on B must not affect the cascade.
        store.add_peer_if_new("B", ext_peer("EXT1", 8080));

        let (info, changed) = store.delete("B").unwrap();
        assert_eq!(info.deployment_name, "name-B");
        assert_eq!(
            changed,
            HashSet::from(["A".to_string(), "C".to_string()])
        );

        assert!(!store.contains("B"));
        assert!(store.get("A").unwrap().baseline_peers.is_empty());
        assert!(store.get("C").unwrap().forbidden_peers.is_empty());
    }

    #[test]
    fn test_delete_unknown_is_none() {
        let mut store = store_with(&["A"]);
        assert!(store.delete("MISSING").is_none());
    }

    #[test]
    fn test_bulk_delete_spares_other_clusters() {
        let mut store = RecordStore::new();
        store.create("A", "name-A", "CLUSTER1", "NS1", obs_end());
        store.create("B", "name-B", "CLUSTER1", "NS1", obs_end());
        store.create("C", "name-C", "CLUSTER2", "NS2", obs_end());

        // Edge inside the doomed cluster and an edge crossing out of it.
        store.add_peer_if_new("A", dep_peer("B", false, 52));
        store.add_peer_if_new("B", dep_peer("A", true, 52));
        store.add_peer_if_new("A", dep_peer("C", false, 80));
        store.add_peer_if_new("C", dep_peer("A", true, 80));

        let (deleted, changed) = store.bulk_delete_by_cluster("CLUSTER1");

        let deleted: HashSet<String> = deleted.into_iter().collect();
        assert_eq!(deleted, HashSet::from(["A".to_string(), "B".to_string()]));
        assert_eq!(changed, HashSet::from(["C".to_string()]));

        assert_eq!(store.len(), 1);
        assert!(store.get("C").unwrap().baseline_peers.is_empty());
    }
}
