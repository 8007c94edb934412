//! Directed connectivity facts (peers) and their persisted list form.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::entity::{EntityType, L4Protocol, PeerEntity};

/// A directed connectivity fact from the owning deployment's perspective.
///
/// Peers live in set containers keyed by the full tuple; two peers with
/// identical fields are the same peer regardless of discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    pub entity: PeerEntity,
    /// True if the remote entity initiated the connection.
    pub ingress: bool,
    /// Destination port of the connection.
    pub port: u32,
    pub protocol: L4Protocol,
}

impl Peer {
    /// The same edge as seen from the other endpoint: direction flipped,
    /// remote entity replaced by the owning deployment. Used wherever a
    /// deployment-to-deployment edge must be mirrored.
    pub fn reversed(&self, deployment_id: &str, deployment_name: &str) -> Peer {
        Peer {
            entity: PeerEntity {
                entity_type: EntityType::Deployment,
                id: deployment_id.to_string(),
                name: deployment_name.to_string(),
            },
            ingress: !self.ingress,
            port: self.port,
            protocol: self.protocol,
        }
    }
}

/// Connection properties of one remote entity in the persisted shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProperties {
    pub ingress: bool,
    pub port: u32,
    pub protocol: L4Protocol,
}

/// One remote entity with all its observed connection properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedPeer {
    pub entity: PeerEntity,
    pub properties: Vec<ConnectionProperties>,
}

/// Group a peer set into the persisted list form.
///
/// Output is byte-stable: groups are ordered by remote-entity id ascending,
/// properties within a group ingress-first, then by protocol, then by port.
/// Stable output keeps persisted diffs and test fixtures reproducible.
pub fn group_peers(peers: &HashSet<Peer>) -> Vec<PersistedPeer> {
    let mut grouped: HashMap<&PeerEntity, Vec<ConnectionProperties>> = HashMap::new();
    for peer in peers {
        grouped.entry(&peer.entity).or_default().push(ConnectionProperties {
            ingress: peer.ingress,
            port: peer.port,
            protocol: peer.protocol,
        });
    }

    let mut out: Vec<PersistedPeer> = grouped
        .into_iter()
        .map(|(entity, mut properties)| {
            properties.sort_by_key(|p| (!p.ingress, p.protocol, p.port));
            PersistedPeer {
                entity: entity.clone(),
                properties,
            }
        })
        .collect();
    out.sort_by(|a, b| {
        a.entity
            .id
            .cmp(&b.entity.id)
            .then_with(|| a.entity.cmp(&b.entity))
    });
    out
}

/// Inverse of [`group_peers`]: flatten the persisted list form back into the
/// set representation.
pub fn flatten_peers(peers: &[PersistedPeer]) -> HashSet<Peer> {
    let mut out = HashSet::new();
    for group in peers {
        for props in &group.properties {
            out.insert(Peer {
                entity: group.entity.clone(),
                ingress: props.ingress,
                port: props.port,
                protocol: props.protocol,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep_entity(id: &str) -> PeerEntity {
        PeerEntity {
            entity_type: EntityType::Deployment,
            id: id.to_string(),
            name: format!("name-{}", id),
        }
    }

    fn peer(entity: PeerEntity, ingress: bool, port: u32) -> Peer {
        Peer {
            entity,
            ingress,
            port,
            protocol: L4Protocol::Tcp,
        }
    }

    #[test]
    fn test_reversed_flips_direction_and_entity() {
        let p = peer(dep_entity("B"), false, 443);
        let r = p.reversed("A", "name-A");

        assert_eq!(r.entity.id, "A");
        assert_eq!(r.entity.name, "name-A");
        assert_eq!(r.entity.entity_type, EntityType::Deployment);
        assert!(r.ingress);
        assert_eq!(r.port, 443);
        assert_eq!(r.protocol, L4Protocol::Tcp);

        // Reversing twice lands back on the original edge.
        assert_eq!(r.reversed("B", "name-B"), p);
    }

    #[test]
    fn test_grouping_is_deterministic() {
        let peers: Vec<Peer> = vec![
            peer(dep_entity("B"), false, 80),
            peer(dep_entity("B"), true, 80),
            peer(dep_entity("B"), false, 22),
            peer(dep_entity("A"), false, 443),
        ];

        let forward: HashSet<Peer> = peers.iter().cloned().collect();
        let reverse: HashSet<Peer> = peers.iter().rev().cloned().collect();

        let grouped = group_peers(&forward);
        assert_eq!(grouped, group_peers(&reverse));

        // Entity order: A before B. Property order: ingress first, then port.
        assert_eq!(grouped[0].entity.id, "A");
        assert_eq!(grouped[1].entity.id, "B");
        let props = &grouped[1].properties;
        assert_eq!(
            props,
            &vec![
                ConnectionProperties {
                    ingress: true,
                    port: 80,
                    protocol: L4Protocol::Tcp
                },
                ConnectionProperties {
                    ingress: false,
                    port: 22,
                    protocol: L4Protocol::Tcp
                },
                ConnectionProperties {
                    ingress: false,
                    port: 80,
                    protocol: L4Protocol::Tcp
                },
            ]
        );

        // Serialized form is byte-stable across insertion orders.
        let a = serde_json::to_string(&group_peers(&forward)).unwrap();
        let b = serde_json::to_string(&group_peers(&reverse)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_group_flatten_round_trip() {
        let mut peers = HashSet::new();
        peers.insert(peer(dep_entity("A"), true, 52));
        peers.insert(peer(dep_entity("A"), false, 52));
        peers.insert(peer(dep_entity("B"), false, 8080));

        let round_tripped = flatten_peers(&group_peers(&peers));
        assert_eq!(round_tripped, peers);
    }
}
