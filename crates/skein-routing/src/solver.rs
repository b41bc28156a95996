//! Unicast and broadcast route solvers
//!
//! Both solvers are pure functions of the peer graph and are expected to run
//! while the caller holds the graph's read lock. They never fail: a graph
//! that is inconsistent (dangling connections, half-open links) simply
//! produces a smaller table.

use std::collections::HashMap;

use skein_core::{ConnectionFilter, NextHops, PeerGraph, PeerName};

/// Destination -> next hop (a neighbour of the local peer)
pub type UnicastRoutes = NextHops;

/// Broadcast origin -> neighbours to forward to
pub type BroadcastRoutes = HashMap<PeerName, Vec<PeerName>>;

/// Compute the next hop towards every peer reachable from `local`
///
/// If *we* want to send to peer X, which neighbour do we hand it to? The
/// answer is the first hop of the shortest path found by the traversal.
/// `local` itself maps to [`PeerName::UNKNOWN`].
pub fn unicast_routes(graph: &PeerGraph, local: PeerName, filter: ConnectionFilter) -> UnicastRoutes {
    graph.routes(local, None, filter).next_hops
}

/// Compute which neighbours of `local` must receive a broadcast from `origin`
///
/// The origin's traversal is run until it reaches `local`. Neighbours that
/// were already discovered by then are reached through some other peer, so
/// only the remaining neighbours are ours to forward to. Because every node
/// runs the same deterministic traversal, the forwarding decisions of all
/// nodes together form the origin's BFS tree and each peer receives the
/// broadcast exactly once while the topology is stable.
///
/// Returns an empty list if `origin` is unknown or cannot reach `local`.
pub fn broadcast_routes(
    graph: &PeerGraph,
    local: PeerName,
    origin: PeerName,
    filter: ConnectionFilter,
) -> Vec<PeerName> {
    let mut hops = Vec::new();
    if !graph.contains(&origin) {
        return hops;
    }

    let reach = graph.routes(origin, Some(local), filter);
    if reach.stopped {
        graph.for_each_connected_peer(&local, filter, &reach.next_hops, |remote| {
            hops.push(remote)
        });
    }
    hops
}

#[cfg(test)]
mod tests {
    use std::collections::{HashSet, VecDeque};

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use skein_core::{Connection, Peer};

    use super::*;

    fn name(c: char) -> PeerName {
        PeerName::new(c as u64)
    }

    fn graph_with(local: char, edges: &[(char, char)]) -> PeerGraph {
        let mut graph = PeerGraph::new(Peer::new(name(local))).unwrap();
        for (a, b) in edges {
            graph.connect(name(*a), name(*b)).unwrap();
        }
        graph
    }

    fn sorted(mut names: Vec<PeerName>) -> Vec<PeerName> {
        names.sort();
        names
    }

    /// Flood a broadcast from `origin`, with every node applying its own
    /// fan-out, and count how often each peer receives it.
    fn flood(graph: &PeerGraph, origin: PeerName, filter: ConnectionFilter) -> HashMap<PeerName, usize> {
        let mut received: HashMap<PeerName, usize> = HashMap::new();
        let mut queue = VecDeque::from([origin]);
        while let Some(node) = queue.pop_front() {
            for next in broadcast_routes(graph, node, origin, filter) {
                let count = received.entry(next).or_default();
                *count += 1;
                if *count == 1 {
                    queue.push_back(next);
                }
            }
        }
        received
    }

    #[test]
    fn test_chain_unicast() {
        // A - B - C - D, local B
        let graph = graph_with('B', &[('A', 'B'), ('B', 'C'), ('C', 'D')]);
        let routes = unicast_routes(&graph, name('B'), ConnectionFilter::EstablishedSymmetric);

        assert_eq!(routes[&name('B')], PeerName::UNKNOWN);
        assert_eq!(routes[&name('A')], name('A'));
        assert_eq!(routes[&name('C')], name('C'));
        assert_eq!(routes[&name('D')], name('C'));
    }

    #[test]
    fn test_chain_broadcast() {
        let graph = graph_with('B', &[('A', 'B'), ('B', 'C'), ('C', 'D')]);
        let filter = ConnectionFilter::EstablishedSymmetric;
        let local = name('B');

        assert_eq!(
            sorted(broadcast_routes(&graph, local, local, filter)),
            vec![name('A'), name('C')]
        );
        assert_eq!(broadcast_routes(&graph, local, name('A'), filter), vec![name('C')]);
        assert_eq!(broadcast_routes(&graph, local, name('D'), filter), vec![name('A')]);
    }

    #[test]
    fn test_star() {
        let graph = graph_with('H', &[('H', '1'), ('H', '2'), ('H', '3')]);
        let filter = ConnectionFilter::EstablishedSymmetric;
        let hub = name('H');

        let routes = unicast_routes(&graph, hub, filter);
        for spoke in ['1', '2', '3'] {
            assert_eq!(routes[&name(spoke)], name(spoke));
        }
        assert_eq!(
            broadcast_routes(&graph, hub, hub, filter),
            vec![name('1'), name('2'), name('3')]
        );
        assert_eq!(
            broadcast_routes(&graph, hub, name('1'), filter),
            vec![name('2'), name('3')]
        );
    }

    #[test]
    fn test_asymmetric_triangle() {
        // A -> B with no reverse; A <-> C established; B <-> C not established
        let mut graph = PeerGraph::new(Peer::new(name('A'))).unwrap();
        graph.add_peer(Peer::new(name('B'))).unwrap();
        graph.connect(name('A'), name('C')).unwrap();
        graph
            .add_connection(&name('A'), Connection::new(name('B')).established())
            .unwrap();
        graph.add_connection(&name('B'), Connection::new(name('C'))).unwrap();
        graph
            .add_connection(&name('C'), Connection::new(name('B')).inbound())
            .unwrap();

        let local = name('A');
        let symmetric = unicast_routes(&graph, local, ConnectionFilter::EstablishedSymmetric);
        let all = unicast_routes(&graph, local, ConnectionFilter::All);

        assert!(!symmetric.contains_key(&name('B')));
        assert_eq!(all[&name('B')], name('B'));
        assert!(
            broadcast_routes(&graph, local, name('C'), ConnectionFilter::EstablishedSymmetric)
                .is_empty()
        );
    }

    #[test]
    fn test_unknown_origin_is_empty() {
        let graph = graph_with('A', &[('A', 'B')]);
        assert!(
            broadcast_routes(&graph, name('A'), name('Z'), ConnectionFilter::All).is_empty()
        );
    }

    #[test]
    fn test_unreachable_origin_is_empty() {
        let graph = graph_with('A', &[('A', 'B'), ('X', 'Y')]);
        assert!(
            broadcast_routes(&graph, name('A'), name('X'), ConnectionFilter::All).is_empty()
        );
    }

    #[test]
    fn test_symmetric_routes_subset_of_all() {
        let mut graph = graph_with('A', &[('A', 'B'), ('B', 'C'), ('C', 'D')]);
        graph.set_established(&name('C'), &name('D'), false).unwrap();

        let symmetric = unicast_routes(&graph, name('A'), ConnectionFilter::EstablishedSymmetric);
        let all = unicast_routes(&graph, name('A'), ConnectionFilter::All);
        assert!(!symmetric.contains_key(&name('D')));
        for dest in symmetric.keys() {
            assert!(all.contains_key(dest));
        }
    }

    #[test]
    fn test_broadcast_delivers_exactly_once_on_ring_with_chords() {
        let graph = graph_with(
            'A',
            &[
                ('A', 'B'),
                ('B', 'C'),
                ('C', 'D'),
                ('D', 'E'),
                ('E', 'F'),
                ('F', 'A'),
                ('A', 'D'),
                ('B', 'E'),
            ],
        );
        let filter = ConnectionFilter::EstablishedSymmetric;
        for origin in graph.names() {
            let received = flood(&graph, origin, filter);
            assert_eq!(received.len(), graph.len() - 1, "origin {origin}");
            assert!(received.values().all(|&count| count == 1));
            assert!(!received.contains_key(&origin));
        }
    }

    #[test]
    fn test_broadcast_delivers_exactly_once_on_random_graphs() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..20 {
            let size = rng.random_range(2..24u64);
            let mut graph = PeerGraph::new(Peer::new(PeerName::new(1))).unwrap();
            for n in 2..=size {
                graph.add_peer(Peer::new(PeerName::new(n))).unwrap();
            }
            for a in 1..=size {
                for b in (a + 1)..=size {
                    if rng.random_bool(0.2) {
                        graph.connect(PeerName::new(a), PeerName::new(b)).unwrap();
                    }
                }
            }

            for filter in [ConnectionFilter::EstablishedSymmetric, ConnectionFilter::All] {
                for origin in graph.names() {
                    let reachable: HashSet<PeerName> = graph
                        .routes(origin, None, filter)
                        .next_hops
                        .into_keys()
                        .filter(|n| *n != origin)
                        .collect();
                    let received = flood(&graph, origin, filter);

                    assert!(received.values().all(|&count| count == 1));
                    assert_eq!(received.keys().copied().collect::<HashSet<_>>(), reachable);
                }
            }
        }
    }
}
