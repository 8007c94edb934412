//! Baseline Manager.
//!
//! Owns the authoritative in-memory view of every deployment's network
//! baseline. Every mutation entry point funnels through a single exclusive
//! lock that also covers the write-through persistence call; operations are
//! strictly serialized, which is what keeps the bidirectional mirroring
//! invariant safe from interleaved updates. In-memory state is advisory and
//! rebuildable from the store, so a failed persistence call is surfaced to
//! the caller without rolling memory back.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::access::AccessScope;
use crate::collab::{
    AgentNotifier, BaselineStore, BaselineSync, DeploymentLookup, NetworkEntityLookup,
    NetworkPolicyLookup,
};
use crate::config::Config;
use crate::error::{BaselineError, Result};
use crate::types::entity::{
    ConnEndpoint, Connection, EntityType, L4Protocol, PeerEntity, INTERNAL_ENTITIES_NAME,
    INTERNET_NAME,
};
use crate::types::peer::Peer;
use crate::types::policy::{NetworkPolicy, PolicyAction};
use crate::types::record::{BaselineInfo, NetworkBaseline};

use super::dedup::PolicyDedupCache;
use super::store::RecordStore;

/// Requested status for a peer in a user edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    Baseline,
    Anomalous,
}

/// One user edit: a candidate peer and the status it should move to.
#[derive(Debug, Clone)]
pub struct PeerStatusUpdate {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub ingress: bool,
    pub port: u32,
    pub protocol: L4Protocol,
    pub status: PeerStatus,
}

/// Everything behind the manager lock: the record map and the policy dedup
/// cache mutate together.
struct ManagerState {
    records: RecordStore,
    seen_policies: PolicyDedupCache,
}

pub struct BaselineManager {
    state: Mutex<ManagerState>,
    config: Config,
    store: Arc<dyn BaselineStore>,
    deployments: Arc<dyn DeploymentLookup>,
    entities: Arc<dyn NetworkEntityLookup>,
    policies: Arc<dyn NetworkPolicyLookup>,
    notifier: Arc<dyn AgentNotifier>,
}

impl BaselineManager {
    /// Build a manager and replay all persisted baselines into memory.
    pub fn new(
        config: Config,
        store: Arc<dyn BaselineStore>,
        deployments: Arc<dyn DeploymentLookup>,
        entities: Arc<dyn NetworkEntityLookup>,
        policies: Arc<dyn NetworkPolicyLookup>,
        notifier: Arc<dyn AgentNotifier>,
    ) -> Result<Self> {
        let manager = Self {
            state: Mutex::new(ManagerState {
                records: RecordStore::new(),
                seen_policies: PolicyDedupCache::new(),
            }),
            config,
            store,
            deployments,
            entities,
            policies,
            notifier,
        };
        manager.init_from_store()?;
        Ok(manager)
    }

    fn init_from_store(&self) -> Result<()> {
        let mut state = self.state.lock();

        let mut cluster_namespaces: HashSet<(String, String)> = HashSet::new();
        let records = &mut state.records;
        self.store
            .walk(&mut |baseline| {
                cluster_namespaces
                    .insert((baseline.cluster_id.clone(), baseline.namespace.clone()));
                let (id, info) = baseline.into_info();
                records.insert(id, info);
                Ok(())
            })
            .map_err(|e| BaselineError::Collaborator(e.context("replaying persisted baselines")))?;

        // Register the currently active policies as already processed, so a
        // restart does not replay observation-period resets that happened
        // before it.
        for (cluster_id, namespace) in &cluster_namespaces {
            let active = self
                .policies
                .get_policies(cluster_id, namespace)
                .map_err(|e| BaselineError::Collaborator(e.context("seeding policy dedup cache")))?;
            for policy in active {
                if let Some(hash) = state.seen_policies.check(PolicyAction::Create, &policy) {
                    state.seen_policies.mark_processed(hash);
                }
            }
        }

        log::info!(
            "Loaded {} network baselines, {} known policies",
            state.records.len(),
            state.seen_policies.len()
        );
        Ok(())
    }

    /// Ensure a baseline record exists for a newly created deployment.
    /// Repeat calls are no-ops.
    pub fn process_deployment_create(
        &self,
        deployment_id: &str,
        name: &str,
        cluster_id: &str,
        namespace: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let obs_end = Utc::now() + self.config.observation_window;
        if !state
            .records
            .create(deployment_id, name, cluster_id, namespace, obs_end)
        {
            return Ok(());
        }
        log::debug!("Created baseline for deployment {}", deployment_id);
        self.persist(&state, &[deployment_id.to_string()])
    }

    /// Learn observed flows into the baselines of deployments still inside
    /// their observation window. Only deployments whose record actually
    /// changed are persisted.
    pub fn process_flow_update(&self, flows: &HashMap<Connection, DateTime<Utc>>) -> Result<()> {
        let mut state = self.state.lock();
        let mut changed: HashSet<String> = HashSet::new();

        for (conn, seen_at) in flows {
            if !should_learn(&state.records, conn, *seen_at) {
                continue;
            }

            if conn.src.entity_type == EntityType::Deployment {
                let entity = self.peer_entity_for(&state.records, &conn.dst);
                let peer = Peer {
                    entity,
                    ingress: false,
                    port: conn.dst_port,
                    protocol: conn.protocol,
                };
                if state.records.add_peer_if_new(&conn.src.id, peer) {
                    changed.insert(conn.src.id.clone());
                }
            }
            if conn.dst.entity_type == EntityType::Deployment {
                let entity = self.peer_entity_for(&state.records, &conn.src);
                let peer = Peer {
                    entity,
                    ingress: true,
                    port: conn.dst_port,
                    protocol: conn.protocol,
                };
                if state.records.add_peer_if_new(&conn.dst.id, peer) {
                    changed.insert(conn.dst.id.clone());
                }
            }
        }

        let changed: Vec<String> = changed.into_iter().collect();
        self.persist(&state, &changed)
    }

    /// Drop a deleted deployment's record and scrub its mirrored edges from
    /// every other record. Mirror updates reach the store before the record
    /// itself is deleted, so a crash mid-operation never leaves a forward
    /// reference whose mirror cleanup was not at least attempted.
    pub fn process_deployment_delete(&self, deployment_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let Some((_, changed)) = state.records.delete(deployment_id) else {
            return Ok(());
        };
        let changed: Vec<String> = changed.into_iter().collect();
        self.persist(&state, &changed)?;
        self.store
            .delete(deployment_id)
            .map_err(|e| BaselineError::Collaborator(e.context("deleting baseline")))?;
        log::debug!("Removed baseline for deleted deployment {}", deployment_id);
        Ok(())
    }

    /// Bulk variant of deployment deletion for a whole cluster. Records in
    /// other clusters are touched only to scrub mirrored edges.
    pub fn process_post_cluster_delete(&self, cluster_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let (deleted, changed) = state.records.bulk_delete_by_cluster(cluster_id);
        if deleted.is_empty() {
            return Ok(());
        }
        let changed: Vec<String> = changed.into_iter().collect();
        self.persist(&state, &changed)?;
        self.store
            .delete_many(&deleted)
            .map_err(|e| BaselineError::Collaborator(e.context("deleting cluster baselines")))?;
        log::info!(
            "Removed {} baselines for deleted cluster {}",
            deleted.len(),
            cluster_id
        );
        Ok(())
    }

    /// Extend the observation window of every existing deployment matched by
    /// a changed network policy. Repeat notifications of identical policy
    /// content are ignored; a policy selecting no known deployment is
    /// accepted and produces no changes.
    pub fn process_network_policy_update(
        &self,
        action: PolicyAction,
        policy: &NetworkPolicy,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let Some(hash) = state.seen_policies.check(action, policy) else {
            log::debug!(
                "Ignoring already-processed update for network policy {}",
                policy.name
            );
            return Ok(());
        };

        let deployments = self
            .deployments
            .search_deployments(&policy.cluster_id, &policy.namespace)
            .map_err(|e| {
                BaselineError::Collaborator(e.context("looking up deployments for policy update"))
            })?;

        let obs_end = Utc::now() + self.config.observation_window;
        let mut changed = Vec::new();
        for deployment in deployments {
            if !policy.spec.pod_selector.matches(&deployment.pod_labels) {
                continue;
            }
            if let Some(info) = state.records.get_mut(&deployment.id) {
                info.observation_period_end = obs_end;
                changed.push(deployment.id);
            }
        }

        self.persist(&state, &changed)?;
        for id in &changed {
            self.notify_if_locked(&state, id);
        }
        // Registered only after a fully successful pass, so a redelivery
        // retries a failed update.
        state.seen_policies.mark_processed(hash);
        Ok(())
    }

    /// Apply user peer-status edits to a deployment's baseline, mirroring
    /// deployment-type peers into the other endpoint's record. Validation
    /// runs before any mutation: the in-memory edits are not trivially
    /// reversible, so requests fail fast and whole.
    pub fn process_baseline_status_update(
        &self,
        scope: &dyn AccessScope,
        deployment_id: &str,
        updates: &[PeerStatusUpdate],
    ) -> Result<()> {
        let mut state = self.state.lock();

        let info = state.records.get(deployment_id).ok_or_else(|| {
            BaselineError::NotFound(format!("no baseline for deployment {}", deployment_id))
        })?;
        if !scope.can_write(&info.cluster_id, &info.namespace) {
            return Err(BaselineError::PermissionDenied(format!(
                "no write access to deployment {}",
                deployment_id
            )));
        }
        let owner_name = info.deployment_name.clone();

        for update in updates {
            if update.entity_id.is_empty() {
                return Err(BaselineError::InvalidArgument(
                    "peer entity id must not be empty".to_string(),
                ));
            }
            if !update.entity_type.is_baselineable() {
                return Err(BaselineError::InvalidArgument(format!(
                    "entity type {:?} cannot be baselined",
                    update.entity_type
                )));
            }
            if update.entity_type == EntityType::Deployment
                && !state.records.contains(&update.entity_id)
            {
                return Err(BaselineError::InvalidArgument(format!(
                    "peer deployment {} has no baseline",
                    update.entity_id
                )));
            }
        }

        let mut changed: HashSet<String> = HashSet::new();
        for update in updates {
            let endpoint = ConnEndpoint::new(update.entity_type, update.entity_id.clone());
            let entity = self.peer_entity_for(&state.records, &endpoint);
            let peer = Peer {
                entity,
                ingress: update.ingress,
                port: update.port,
                protocol: update.protocol,
            };
            let forbidden = match update.status {
                PeerStatus::Anomalous => true,
                PeerStatus::Baseline => false,
            };

            if state.records.set_peer_status(deployment_id, &peer, forbidden) {
                changed.insert(deployment_id.to_string());
            }
            if update.entity_type == EntityType::Deployment {
                let mirror = peer.reversed(deployment_id, &owner_name);
                if state
                    .records
                    .set_peer_status(&update.entity_id, &mirror, forbidden)
                {
                    changed.insert(update.entity_id.clone());
                }
            }
        }

        let changed: Vec<String> = changed.into_iter().collect();
        self.persist(&state, &changed)?;
        // Mirrored edits can land on someone else's locked record; every
        // persisted change to a locked record is pushed, not just the
        // target's.
        for id in &changed {
            self.notify_if_locked(&state, id);
        }
        Ok(())
    }

    /// Toggle the user lock on a baseline. Locked deployments stop learning
    /// from flows; every lock transition is pushed to the cluster's agent so
    /// it can start or stop alerting against the baseline.
    pub fn process_baseline_lock_update(
        &self,
        scope: &dyn AccessScope,
        deployment_id: &str,
        locked: bool,
    ) -> Result<()> {
        let mut state = self.state.lock();

        let info = state.records.get(deployment_id).ok_or_else(|| {
            BaselineError::NotFound(format!("no baseline for deployment {}", deployment_id))
        })?;
        if !scope.can_write(&info.cluster_id, &info.namespace) {
            return Err(BaselineError::PermissionDenied(format!(
                "no write access to deployment {}",
                deployment_id
            )));
        }
        if info.user_locked == locked {
            return Ok(());
        }

        if let Some(info) = state.records.get_mut(deployment_id) {
            info.user_locked = locked;
        }
        self.persist(&state, &[deployment_id.to_string()])?;

        if let Some(info) = state.records.get(deployment_id) {
            self.push_to_agent(deployment_id, info);
        }
        Ok(())
    }

    /// Read path, served straight from the persistent store. The store
    /// applies its own scoped-read rules; the manager lock is not taken.
    pub fn get_baseline(&self, deployment_id: &str) -> Result<Option<NetworkBaseline>> {
        self.store
            .get(deployment_id)
            .map_err(|e| BaselineError::Collaborator(e.context("reading baseline")))
    }

    /// Lazily create a baseline when the API asks for one before the
    /// deployment-create event was processed.
    pub fn ensure_baseline_exists(&self, deployment_id: &str) -> Result<NetworkBaseline> {
        {
            let state = self.state.lock();
            if let Some(info) = state.records.get(deployment_id) {
                return Ok(info.to_persisted(deployment_id));
            }
        }

        let deployment = self
            .deployments
            .get_deployment(deployment_id)
            .map_err(|e| BaselineError::Collaborator(e.context("looking up deployment")))?
            .ok_or_else(|| {
                BaselineError::NotFound(format!("deployment {} does not exist", deployment_id))
            })?;

        self.process_deployment_create(
            &deployment.id,
            &deployment.name,
            &deployment.cluster_id,
            &deployment.namespace,
        )?;

        let state = self.state.lock();
        state
            .records
            .get(deployment_id)
            .map(|info| info.to_persisted(deployment_id))
            .ok_or_else(|| {
                BaselineError::Internal("baseline missing right after create".to_string())
            })
    }

    /// Write the current form of the given records through to the store.
    fn persist(&self, state: &ManagerState, deployment_ids: &[String]) -> Result<()> {
        let baselines: Vec<NetworkBaseline> = deployment_ids
            .iter()
            .filter_map(|id| state.records.get(id).map(|info| info.to_persisted(id)))
            .collect();
        if baselines.is_empty() {
            return Ok(());
        }
        self.store
            .upsert_many(&baselines)
            .map_err(|e| BaselineError::Collaborator(e.context("persisting baselines")))
    }

    /// Resolve the display name for a remote endpoint. Deployment names come
    /// from the record store; external sources resolve through the entity
    /// service and collapse to the internet aggregate when discovered or
    /// unresolvable. Name resolution is cosmetic metadata, so lookup
    /// failures degrade to the aggregate label instead of failing the flow.
    fn peer_entity_for(&self, records: &RecordStore, endpoint: &ConnEndpoint) -> PeerEntity {
        debug_assert!(
            endpoint.entity_type.is_baselineable(),
            "callers filter non-baselineable endpoints before building peers"
        );
        let name = match endpoint.entity_type {
            EntityType::Deployment => records
                .get(&endpoint.id)
                .map(|info| info.deployment_name.clone())
                .unwrap_or_default(),
            EntityType::Internet => INTERNET_NAME.to_string(),
            EntityType::InternalEntities => INTERNAL_ENTITIES_NAME.to_string(),
            EntityType::ExternalSource => match self.entities.entity_name(&endpoint.id) {
                Ok(Some(entity)) if !entity.discovered => entity.name,
                Ok(_) => INTERNET_NAME.to_string(),
                Err(e) => {
                    log::warn!("Failed to resolve external entity {}: {:#}", endpoint.id, e);
                    INTERNET_NAME.to_string()
                }
            },
            // Unreachable: flow filtering and status-update validation both
            // reject listen endpoints. The arm only satisfies exhaustiveness.
            EntityType::ListenEndpoint => String::new(),
        };
        PeerEntity {
            entity_type: endpoint.entity_type,
            id: endpoint.id.clone(),
            name,
        }
    }

    fn notify_if_locked(&self, state: &ManagerState, deployment_id: &str) {
        let Some(info) = state.records.get(deployment_id) else {
            return;
        };
        if info.user_locked {
            self.push_to_agent(deployment_id, info);
        }
    }

    fn push_to_agent(&self, deployment_id: &str, info: &BaselineInfo) {
        let sync = BaselineSync::new(info.to_persisted(deployment_id));
        if let Err(e) = self.notifier.send_baseline_sync(&info.cluster_id, sync) {
            log::warn!(
                "Failed to push baseline for {} to cluster agent: {:#}",
                deployment_id,
                e
            );
        }
    }
}

/// A flow is learned only if both endpoints are baseline-able with non-empty
/// ids, every deployment endpoint has an unlocked record, and at least one
/// endpoint is still inside its observation window at the time the flow was
/// seen. The two-sided window check is deliberate: a mature deployment
/// talking to a brand-new one still lets the new side learn.
fn should_learn(records: &RecordStore, conn: &Connection, seen_at: DateTime<Utc>) -> bool {
    if conn.src.id.is_empty() || conn.dst.id.is_empty() {
        return false;
    }
    if !conn.src.entity_type.is_baselineable() || !conn.dst.entity_type.is_baselineable() {
        return false;
    }

    let mut in_observation = false;
    for endpoint in [&conn.src, &conn.dst] {
        if endpoint.entity_type != EntityType::Deployment {
            continue;
        }
        match records.get(&endpoint.id) {
            // An unknown deployment cannot be named or mirrored; skip the
            // whole connection until its create event arrives.
            None => return false,
            Some(info) if info.user_locked => return false,
            Some(info) if info.in_observation_period(seen_at) => in_observation = true,
            Some(_) => {}
        }
    }
    in_observation
}
