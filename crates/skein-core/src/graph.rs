//! The peer graph and its traversal primitives
//!
//! [`PeerGraph`] is the read model the routing solvers work on: every known
//! peer keyed by name, plus the name of the local peer (which is always
//! present). Connections to peers that are not in the graph are tolerated and
//! simply ignored during traversal.
//!
//! ## Determinism
//!
//! Broadcast fan-out is only loop- and duplicate-free if every node in the
//! mesh breaks ties between equal-length paths the same way. Connections are
//! therefore stored in name order and each BFS level is sorted by name before
//! it is expanded, so the traversal depends only on the graph contents.

use std::collections::HashMap;

use crate::error::PeerError;
use crate::identity::{PeerName, PeerNameSet};
use crate::peer::{Connection, ConnectionFilter, Peer};

/// Map from a reached peer to the first hop taken from the traversal source
pub type NextHops = HashMap<PeerName, PeerName>;

/// Result of a breadth-first traversal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reachability {
    /// Whether the traversal stopped because it reached its `stop_at` peer
    pub stopped: bool,
    /// Every peer discovered, mapped to the first hop from the source
    ///
    /// The source itself maps to [`PeerName::UNKNOWN`].
    pub next_hops: NextHops,
}

impl Reachability {
    /// Whether `name` was discovered by the traversal
    pub fn reached(&self, name: &PeerName) -> bool {
        self.next_hops.contains_key(name)
    }
}

/// All known peers and their connections
#[derive(Debug, Clone)]
pub struct PeerGraph {
    local: PeerName,
    peers: HashMap<PeerName, Peer>,
}

impl PeerGraph {
    /// Create a graph containing only the local peer
    ///
    /// The local peer may not use the reserved unknown name.
    pub fn new(local: Peer) -> Result<Self, PeerError> {
        let name = local.name;
        if name.is_unknown() {
            return Err(PeerError::ReservedName);
        }
        let mut peers = HashMap::new();
        peers.insert(name, local);
        Ok(Self { local: name, peers })
    }

    /// Name of the local peer
    pub fn local_name(&self) -> PeerName {
        self.local
    }

    pub fn get(&self, name: &PeerName) -> Option<&Peer> {
        self.peers.get(name)
    }

    pub fn contains(&self, name: &PeerName) -> bool {
        self.peers.contains_key(name)
    }

    /// Number of peers, including the local one
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Always false: the local peer is never removed
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Names of all known peers
    pub fn names(&self) -> PeerNameSet {
        self.peers.keys().copied().collect()
    }

    /// Iterate over all peer records (in no particular order)
    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    /// Add a peer if it is not already known
    ///
    /// Returns `true` if the peer was added.
    pub fn add_peer(&mut self, peer: Peer) -> Result<bool, PeerError> {
        if peer.name.is_unknown() {
            return Err(PeerError::ReservedName);
        }
        if self.peers.contains_key(&peer.name) {
            return Ok(false);
        }
        self.peers.insert(peer.name, peer);
        Ok(true)
    }

    /// Remove a peer and return its record
    pub fn remove_peer(&mut self, name: &PeerName) -> Result<Option<Peer>, PeerError> {
        if *name == self.local {
            return Err(PeerError::LocalPeerRemoval);
        }
        Ok(self.peers.remove(name))
    }

    /// Record that `from` advertises `connection`
    ///
    /// The remote end does not need to be known yet. An existing connection
    /// to the same remote is replaced.
    pub fn add_connection(&mut self, from: &PeerName, connection: Connection) -> Result<(), PeerError> {
        if connection.remote.is_unknown() {
            return Err(PeerError::ReservedName);
        }
        if *from == connection.remote {
            return Err(PeerError::SelfConnection);
        }
        let peer = self
            .peers
            .get_mut(from)
            .ok_or(PeerError::UnknownPeer(*from))?;
        peer.connections.insert(connection.remote, connection);
        Ok(())
    }

    /// Remove the connection `from -> to`
    ///
    /// Returns `true` if a connection was removed.
    pub fn remove_connection(&mut self, from: &PeerName, to: &PeerName) -> Result<bool, PeerError> {
        let peer = self
            .peers
            .get_mut(from)
            .ok_or(PeerError::UnknownPeer(*from))?;
        Ok(peer.connections.remove(to).is_some())
    }

    /// Update the established flag of the connection `from -> to`
    ///
    /// Returns `true` if the flag changed.
    pub fn set_established(
        &mut self,
        from: &PeerName,
        to: &PeerName,
        established: bool,
    ) -> Result<bool, PeerError> {
        let peer = self
            .peers
            .get_mut(from)
            .ok_or(PeerError::UnknownPeer(*from))?;
        match peer.connections.get_mut(to) {
            Some(conn) if conn.established != established => {
                conn.established = established;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Add both peers if needed and an established connection in each direction
    pub fn connect(&mut self, a: PeerName, b: PeerName) -> Result<(), PeerError> {
        if a == b {
            return Err(PeerError::SelfConnection);
        }
        self.add_peer(Peer::new(a))?;
        self.add_peer(Peer::new(b))?;
        self.add_connection(&a, Connection::new(b).established())?;
        self.add_connection(&b, Connection::new(a).established().inbound())
    }

    /// Whether `remote` lists a connection back to `from`
    pub fn is_symmetric(&self, from: &PeerName, remote: &PeerName) -> bool {
        self.peers
            .get(remote)
            .is_some_and(|peer| peer.has_connection_to(from))
    }

    /// Visit the peers `peer` is connected to under `filter`
    ///
    /// Connections are visited in ascending remote-name order. Remotes that
    /// are in `exclude` or absent from the graph are skipped. With
    /// [`ConnectionFilter::EstablishedSymmetric`], both the connection and
    /// its reverse must exist and be established.
    pub fn for_each_connected_peer<F>(
        &self,
        peer: &PeerName,
        filter: ConnectionFilter,
        exclude: &NextHops,
        mut visit: F,
    ) where
        F: FnMut(PeerName),
    {
        let Some(record) = self.peers.get(peer) else {
            return;
        };

        for (remote_name, conn) in &record.connections {
            if exclude.contains_key(remote_name) {
                continue;
            }
            let Some(remote) = self.peers.get(remote_name) else {
                continue;
            };
            if filter.requires_established() {
                if !conn.is_established() {
                    continue;
                }
                match remote.connection_to(peer) {
                    Some(reverse) if reverse.is_established() => {}
                    _ => continue,
                }
            }
            visit(*remote_name);
        }
    }

    /// Peers `peer` is connected to under `filter`, in name order
    pub fn connected_peers(&self, peer: &PeerName, filter: ConnectionFilter) -> Vec<PeerName> {
        let mut connected = Vec::new();
        self.for_each_connected_peer(peer, filter, &NextHops::new(), |remote| {
            connected.push(remote)
        });
        connected
    }

    /// Breadth-first traversal from `source`
    ///
    /// Computes, for every reachable peer, the first hop on a shortest path
    /// from `source`. When `stop_at` is given, the traversal ends as soon as
    /// that peer is taken off the worklist; at that point `next_hops`
    /// contains exactly the peers discovered before `stop_at` was expanded.
    pub fn routes(
        &self,
        source: PeerName,
        stop_at: Option<PeerName>,
        filter: ConnectionFilter,
    ) -> Reachability {
        let mut next_hops = NextHops::new();
        if !self.peers.contains_key(&source) {
            return Reachability {
                stopped: false,
                next_hops,
            };
        }

        next_hops.insert(source, PeerName::UNKNOWN);
        let mut next_worklist = vec![source];

        while !next_worklist.is_empty() {
            let mut worklist = std::mem::take(&mut next_worklist);
            worklist.sort_unstable();

            for current in worklist {
                if stop_at == Some(current) {
                    return Reachability {
                        stopped: true,
                        next_hops,
                    };
                }

                let mut discovered = Vec::new();
                self.for_each_connected_peer(&current, filter, &next_hops, |remote| {
                    discovered.push(remote)
                });

                // Peers found from the source are their own first hop;
                // everything else inherits the first hop of `current`.
                let inherited = if current == source {
                    None
                } else {
                    next_hops.get(&current).copied()
                };
                for remote in discovered {
                    next_hops.insert(remote, inherited.unwrap_or(remote));
                    next_worklist.push(remote);
                }
            }
        }

        Reachability {
            stopped: false,
            next_hops,
        }
    }

    /// Remove every peer that cannot be reached from the local peer
    ///
    /// Returns the removed names in ascending order.
    pub fn garbage_collect(&mut self) -> Vec<PeerName> {
        let reachable = self.routes(self.local, None, ConnectionFilter::All);
        let mut removed: Vec<PeerName> = self
            .peers
            .keys()
            .filter(|name| !reachable.reached(name))
            .copied()
            .collect();
        removed.sort_unstable();

        for name in &removed {
            self.peers.remove(name);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(n: u64) -> PeerName {
        PeerName::new(n)
    }

    /// Graph local=1 with the given undirected, established edges
    fn graph_with(local: u64, edges: &[(u64, u64)]) -> PeerGraph {
        let mut graph = PeerGraph::new(Peer::new(name(local))).unwrap();
        for (a, b) in edges {
            graph.connect(name(*a), name(*b)).unwrap();
        }
        graph
    }

    #[test]
    fn test_new_graph_contains_local() {
        let graph = PeerGraph::new(Peer::new(name(1))).unwrap();
        assert_eq!(graph.len(), 1);
        assert!(graph.contains(&name(1)));
        assert_eq!(graph.local_name(), name(1));
    }

    #[test]
    fn test_cannot_remove_local() {
        let mut graph = PeerGraph::new(Peer::new(name(1))).unwrap();
        assert_eq!(graph.remove_peer(&name(1)), Err(PeerError::LocalPeerRemoval));
    }

    #[test]
    fn test_add_connection_errors() {
        let mut graph = PeerGraph::new(Peer::new(name(1))).unwrap();
        assert_eq!(
            graph.add_connection(&name(1), Connection::new(name(1))),
            Err(PeerError::SelfConnection)
        );
        assert_eq!(
            graph.add_connection(&name(5), Connection::new(name(1))),
            Err(PeerError::UnknownPeer(name(5)))
        );
        // Remote need not be known
        assert!(graph.add_connection(&name(1), Connection::new(name(9))).is_ok());
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        assert_eq!(
            PeerGraph::new(Peer::new(PeerName::UNKNOWN)).unwrap_err(),
            PeerError::ReservedName
        );

        let mut graph = PeerGraph::new(Peer::new(name(1))).unwrap();
        assert_eq!(
            graph.add_peer(Peer::new(PeerName::UNKNOWN)),
            Err(PeerError::ReservedName)
        );
        assert_eq!(
            graph.add_connection(&name(1), Connection::new(PeerName::UNKNOWN)),
            Err(PeerError::ReservedName)
        );
        assert_eq!(
            graph.connect(name(1), PeerName::UNKNOWN),
            Err(PeerError::ReservedName)
        );
        assert_eq!(
            graph.connect(PeerName::UNKNOWN, name(2)),
            Err(PeerError::ReservedName)
        );

        // Nothing was recorded by the failed calls
        assert_eq!(graph.names(), PeerNameSet::from([name(1)]));
        assert_eq!(graph.get(&name(1)).map(Peer::connection_count), Some(0));
        let reach = graph.routes(name(1), None, ConnectionFilter::All);
        assert!(!reach.reached(&name(2)));
    }

    #[test]
    fn test_add_peer_reports_duplicates() {
        let mut graph = PeerGraph::new(Peer::new(name(1))).unwrap();
        assert_eq!(graph.add_peer(Peer::new(name(2))), Ok(true));
        assert_eq!(graph.add_peer(Peer::new(name(2))), Ok(false));
        assert_eq!(graph.add_peer(Peer::new(name(1))), Ok(false));
    }

    #[test]
    fn test_routes_on_chain() {
        // 1 - 2 - 3 - 4, from 2
        let graph = graph_with(2, &[(1, 2), (2, 3), (3, 4)]);
        let reach = graph.routes(name(2), None, ConnectionFilter::EstablishedSymmetric);

        assert!(!reach.stopped);
        assert_eq!(reach.next_hops[&name(2)], PeerName::UNKNOWN);
        assert_eq!(reach.next_hops[&name(1)], name(1));
        assert_eq!(reach.next_hops[&name(3)], name(3));
        assert_eq!(reach.next_hops[&name(4)], name(3));
    }

    #[test]
    fn test_routes_stop_at() {
        // 1 - 2 - 3 - 4, from 1 stopping at 2
        let graph = graph_with(2, &[(1, 2), (2, 3), (3, 4)]);
        let reach = graph.routes(name(1), Some(name(2)), ConnectionFilter::All);

        assert!(reach.stopped);
        assert!(reach.reached(&name(1)));
        assert!(reach.reached(&name(2)));
        assert!(!reach.reached(&name(3)));
        assert!(!reach.reached(&name(4)));
    }

    #[test]
    fn test_routes_stop_at_unreachable() {
        let mut graph = graph_with(1, &[(1, 2)]);
        graph.add_peer(Peer::new(name(9))).unwrap();
        let reach = graph.routes(name(1), Some(name(9)), ConnectionFilter::All);
        assert!(!reach.stopped);
        assert_eq!(reach.next_hops.len(), 2);
    }

    #[test]
    fn test_routes_tie_break_by_name() {
        // Diamond: 1 - {2, 3} - 4. Both paths to 4 have length 2; the
        // lower-named middle peer wins.
        let graph = graph_with(1, &[(1, 3), (1, 2), (3, 4), (2, 4)]);
        let reach = graph.routes(name(1), None, ConnectionFilter::All);
        assert_eq!(reach.next_hops[&name(4)], name(2));
    }

    #[test]
    fn test_symmetric_filter() {
        let mut graph = PeerGraph::new(Peer::new(name(1))).unwrap();
        graph.add_peer(Peer::new(name(2))).unwrap();
        graph.add_peer(Peer::new(name(3))).unwrap();
        // 1 -> 2 established, no reverse
        graph
            .add_connection(&name(1), Connection::new(name(2)).established())
            .unwrap();
        // 1 <-> 3, but the reverse is not established
        graph
            .add_connection(&name(1), Connection::new(name(3)).established())
            .unwrap();
        graph
            .add_connection(&name(3), Connection::new(name(1)).inbound())
            .unwrap();

        assert!(!graph.is_symmetric(&name(1), &name(2)));
        assert!(graph.is_symmetric(&name(1), &name(3)));
        assert!(
            graph
                .connected_peers(&name(1), ConnectionFilter::EstablishedSymmetric)
                .is_empty()
        );
        assert_eq!(
            graph.connected_peers(&name(1), ConnectionFilter::All),
            vec![name(2), name(3)]
        );

        assert!(graph.set_established(&name(3), &name(1), true).unwrap());
        assert_eq!(
            graph.connected_peers(&name(1), ConnectionFilter::EstablishedSymmetric),
            vec![name(3)]
        );
    }

    #[test]
    fn test_dangling_connections_are_ignored() {
        let mut graph = PeerGraph::new(Peer::new(name(1))).unwrap();
        graph
            .add_connection(&name(1), Connection::new(name(42)).established())
            .unwrap();
        let reach = graph.routes(name(1), None, ConnectionFilter::All);
        assert_eq!(reach.next_hops.len(), 1);
    }

    #[test]
    fn test_garbage_collect_removes_unreachable() {
        let mut graph = graph_with(1, &[(1, 2), (2, 3)]);
        graph.connect(name(7), name(8)).unwrap();
        assert_eq!(graph.len(), 5);

        let removed = graph.garbage_collect();
        assert_eq!(removed, vec![name(7), name(8)]);
        assert_eq!(graph.names(), PeerNameSet::from([name(1), name(2), name(3)]));
    }

    #[test]
    fn test_garbage_collect_after_disconnect() {
        let mut graph = graph_with(1, &[(1, 2), (2, 3), (1, 3)]);
        graph.remove_connection(&name(2), &name(3)).unwrap();
        graph.remove_connection(&name(3), &name(2)).unwrap();
        assert!(graph.garbage_collect().is_empty());

        graph.remove_connection(&name(1), &name(3)).unwrap();
        assert_eq!(graph.garbage_collect(), vec![name(3)]);
    }
}
