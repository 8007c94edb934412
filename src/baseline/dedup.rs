//! Network-policy dedup cache.
//!
//! Lifecycle notifications for network policies are delivered at-least-once;
//! replaying one must not re-extend observation windows. Entries are keyed by
//! a content hash over the action, namespace, pod selector and rules.
//! Cluster and policy name are excluded, so only repeat notifications of the
//! same policy content are deduplicated. Entries never expire; the cache is
//! rebuilt from the active policies at startup.

use std::collections::HashSet;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::types::policy::{LabelSelector, NetworkPolicy, PolicyAction, PolicyRule};

#[derive(Default)]
pub struct PolicyDedupCache {
    seen: HashSet<String>,
}

impl PolicyDedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the content hash if this notification has not been processed
    /// yet, or None if it is a repeat. The caller registers the hash via
    /// [`mark_processed`](Self::mark_processed) once the update has been
    /// applied, so a failed update is retried on redelivery.
    pub fn check(&self, action: PolicyAction, policy: &NetworkPolicy) -> Option<String> {
        let hash = content_hash(action, policy);
        if self.seen.contains(&hash) {
            None
        } else {
            Some(hash)
        }
    }

    pub fn mark_processed(&mut self, hash: String) {
        self.seen.insert(hash);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// The hashed subset of a policy notification. Field order is fixed by the
/// struct, so the serialized form is canonical.
#[derive(Serialize)]
struct HashedContent<'a> {
    action: PolicyAction,
    namespace: &'a str,
    pod_selector: &'a LabelSelector,
    ingress: &'a [PolicyRule],
    egress: &'a [PolicyRule],
}

fn content_hash(action: PolicyAction, policy: &NetworkPolicy) -> String {
    let content = HashedContent {
        action,
        namespace: &policy.namespace,
        pod_selector: &policy.spec.pod_selector,
        ingress: &policy.spec.ingress,
        egress: &policy.spec.egress,
    };
    let bytes = serde_json::to_vec(&content).expect("policy content is always serializable");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}
