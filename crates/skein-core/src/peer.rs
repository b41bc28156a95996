//! Peer records and the connections they advertise

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::identity::PeerName;

/// Which connections count when traversing the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionFilter {
    /// Every connection whose remote end is known
    All,
    /// Only connections that are established in both directions
    EstablishedSymmetric,
}

impl ConnectionFilter {
    /// Whether this filter requires established, symmetric connections
    pub fn requires_established(&self) -> bool {
        matches!(self, Self::EstablishedSymmetric)
    }
}

/// A directed connection advertised by a peer towards `remote`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// The peer at the other end
    pub remote: PeerName,
    /// Whether the handshake with the remote has completed
    pub established: bool,
    /// Whether the owning peer initiated the connection
    pub outbound: bool,
}

impl Connection {
    /// Create an outbound connection that is not yet established
    pub fn new(remote: PeerName) -> Self {
        Self {
            remote,
            established: false,
            outbound: true,
        }
    }

    /// Mark the connection as established
    pub fn established(mut self) -> Self {
        self.established = true;
        self
    }

    /// Mark the connection as inbound
    pub fn inbound(mut self) -> Self {
        self.outbound = false;
        self
    }

    pub fn is_established(&self) -> bool {
        self.established
    }
}

/// A peer and the connections it advertises
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Name of the peer
    pub name: PeerName,
    /// Human-friendly label (may be empty)
    pub nickname: String,
    /// Connections keyed by remote name, so iteration order is canonical
    pub connections: BTreeMap<PeerName, Connection>,
}

impl Peer {
    /// Create a peer with no connections
    pub fn new(name: PeerName) -> Self {
        Self {
            name,
            nickname: String::new(),
            connections: BTreeMap::new(),
        }
    }

    /// Set the nickname
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = nickname.into();
        self
    }

    /// Get the connection towards `remote`, if any
    pub fn connection_to(&self, remote: &PeerName) -> Option<&Connection> {
        self.connections.get(remote)
    }

    /// Whether this peer lists a connection towards `remote`
    pub fn has_connection_to(&self, remote: &PeerName) -> bool {
        self.connections.contains_key(remote)
    }

    /// Number of advertised connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_builders() {
        let remote = PeerName::new(7);
        let conn = Connection::new(remote);
        assert!(!conn.is_established());
        assert!(conn.outbound);

        let conn = conn.established().inbound();
        assert!(conn.is_established());
        assert!(!conn.outbound);
        assert_eq!(conn.remote, remote);
    }

    #[test]
    fn test_connections_iterate_in_name_order() {
        let mut peer = Peer::new(PeerName::new(1)).with_nickname("one");
        for n in [9u64, 3, 5] {
            peer.connections
                .insert(PeerName::new(n), Connection::new(PeerName::new(n)));
        }
        let order: Vec<u64> = peer.connections.keys().map(|n| n.as_u64()).collect();
        assert_eq!(order, vec![3, 5, 9]);
        assert_eq!(peer.connection_count(), 3);
        assert!(peer.has_connection_to(&PeerName::new(5)));
        assert_eq!(peer.nickname, "one");
    }

    #[test]
    fn test_filter_requires_established() {
        assert!(ConnectionFilter::EstablishedSymmetric.requires_established());
        assert!(!ConnectionFilter::All.requires_established());
    }
}
