//! Kubernetes network-policy model, reduced to what the baseline manager
//! needs: pod-selector matching and content hashing of the rule set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::entity::L4Protocol;

/// Action of a policy-change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyAction {
    Create,
    Update,
    Delete,
}

/// Label selector. A selector with no match expressions matches every pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn new(labels: &[(&str, &str)]) -> Self {
        Self {
            match_labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn matches(&self, pod_labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| pod_labels.get(k) == Some(v))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyPort {
    pub protocol: L4Protocol,
    /// None means all ports.
    pub port: Option<u32>,
}

/// A single ingress or egress rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub peers: Vec<LabelSelector>,
    pub ports: Vec<PolicyPort>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPolicySpec {
    pub pod_selector: LabelSelector,
    pub ingress: Vec<PolicyRule>,
    pub egress: Vec<PolicyRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPolicy {
    pub id: String,
    pub name: String,
    pub cluster_id: String,
    pub namespace: String,
    pub spec: NetworkPolicySpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let selector = LabelSelector::default();
        assert!(selector.matches(&labels(&[("app", "web")])));
        assert!(selector.matches(&BTreeMap::new()));
    }

    #[test]
    fn test_selector_requires_all_labels() {
        let selector = LabelSelector::new(&[("app", "web"), ("tier", "front")]);

        assert!(selector.matches(&labels(&[("app", "web"), ("tier", "front"), ("extra", "x")])));
        assert!(!selector.matches(&labels(&[("app", "web")])));
        assert!(!selector.matches(&labels(&[("app", "web"), ("tier", "back")])));
        assert!(!selector.matches(&BTreeMap::new()));
    }
}
