//! Network entities and observed connections.

use serde::{Deserialize, Serialize};

/// Display name used for the aggregated internet entity and for external
/// sources that cannot be resolved to a pinned name.
pub const INTERNET_NAME: &str = "External Entities";

/// Display name for the aggregate of unclassified in-cluster endpoints.
pub const INTERNAL_ENTITIES_NAME: &str = "Internal Entities";

/// Kinds of remote endpoints a deployment can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    Deployment,
    /// CIDR-scoped external source.
    ExternalSource,
    /// Aggregated internet entity.
    Internet,
    /// Aggregate of unclassified in-cluster endpoints.
    InternalEntities,
    /// Accepted in flow events but never stored in a baseline.
    ListenEndpoint,
}

impl EntityType {
    pub fn is_baselineable(&self) -> bool {
        !matches!(self, EntityType::ListenEndpoint)
    }
}

/// L4 protocols as reported by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum L4Protocol {
    Tcp,
    Udp,
    Icmp,
    Sctp,
    Any,
}

/// A remote endpoint as stored inside a baseline peer.
///
/// Equality and hashing are structural over all fields; deployment names are
/// always resolved from the record store, so two sightings of the same remote
/// endpoint compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerEntity {
    pub entity_type: EntityType,
    pub id: String,
    pub name: String,
}

/// One endpoint of an observed connection. Names are resolved later, during
/// learning, so flow events only carry type and id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnEndpoint {
    pub entity_type: EntityType,
    pub id: String,
}

impl ConnEndpoint {
    pub fn new(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            entity_type,
            id: id.into(),
        }
    }

    pub fn deployment(id: impl Into<String>) -> Self {
        Self::new(EntityType::Deployment, id)
    }
}

/// A single observed connection between two endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub src: ConnEndpoint,
    pub dst: ConnEndpoint,
    pub dst_port: u32,
    pub protocol: L4Protocol,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_endpoints_are_not_baselineable() {
        assert!(EntityType::Deployment.is_baselineable());
        assert!(EntityType::ExternalSource.is_baselineable());
        assert!(EntityType::Internet.is_baselineable());
        assert!(EntityType::InternalEntities.is_baselineable());
        assert!(!EntityType::ListenEndpoint.is_baselineable());
    }
}
