//! Access scopes for user-initiated baseline mutations.
//!
//! Scoped reads are enforced by the datastore on its own read path; the
//! manager only re-checks write access, once and up front, before mutating
//! state on behalf of a caller.

/// The caller's access scope, resolved at the service boundary.
pub trait AccessScope: Send + Sync {
    fn can_write(&self, cluster_id: &str, namespace: &str) -> bool;
}

/// Unrestricted scope, used by internal platform event paths.
pub struct AllowAll;

impl AccessScope for AllowAll {
    fn can_write(&self, _cluster_id: &str, _namespace: &str) -> bool {
        true
    }
}

/// Write access limited to a single cluster/namespace pair.
pub struct FixedScope {
    cluster_id: String,
    namespace: String,
}

impl FixedScope {
    pub fn new(cluster_id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            namespace: namespace.into(),
        }
    }
}

impl AccessScope for FixedScope {
    fn can_write(&self, cluster_id: &str, namespace: &str) -> bool {
        self.cluster_id == cluster_id && self.namespace == namespace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_scope_matches_exact_pair_only() {
        let scope = FixedScope::new("CLUSTER1", "NS1");
        assert!(scope.can_write("CLUSTER1", "NS1"));
        assert!(!scope.can_write("CLUSTER1", "NS2"));
        assert!(!scope.can_write("CLUSTER2", "NS1"));
    }
}
