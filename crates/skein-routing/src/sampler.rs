//! Topology-weighted random neighbour selection for gossip fan-out
//!
//! Neighbours are weighted by how many destinations in the all-connections
//! unicast table are routed through them. A neighbour at the end of a
//! bottleneck link carries many routes and is therefore favoured, which
//! speeds up gossip convergence across sparse cuts.
//!
//! We choose `2 * log2(n_peers)` *neighbours*, not peers, so on sparsely
//! connected peers a larger share of neighbours is returned; with fewer than
//! that many neighbours, all of them are.

use std::collections::BTreeMap;

use rand::Rng;
use skein_core::PeerName;

use crate::solver::UnicastRoutes;

/// How many neighbours to pick for a table of `peers` entries
pub fn sample_size(peers: usize, neighbors: usize) -> usize {
    if peers < 2 {
        return 0;
    }
    let bound = (2.0 * (peers as f64).log2()).floor() as usize;
    bound.min(neighbors)
}

/// Pick distinct neighbours from `unicast_all`, weighted by route count
///
/// Next hops equal to `except` or [`PeerName::UNKNOWN`] are never chosen.
pub fn random_neighbors<R>(unicast_all: &UnicastRoutes, except: Option<PeerName>, rng: &mut R) -> Vec<PeerName>
where
    R: Rng + ?Sized,
{
    let mut total: u64 = 0;
    let mut weights: BTreeMap<PeerName, u64> = BTreeMap::new();
    for hop in unicast_all.values() {
        if hop.is_unknown() || except == Some(*hop) {
            continue;
        }
        total += 1;
        *weights.entry(*hop).or_default() += 1;
    }

    let needed = sample_size(unicast_all.len(), weights.len());
    let mut chosen = Vec::with_capacity(needed);
    while chosen.len() < needed && total > 0 {
        // Pick a random point on the distribution and scan for it
        let mut point = rng.random_range(0..total);
        let mut picked = None;
        for (hop, count) in &weights {
            if point < *count {
                picked = Some((*hop, *count));
                break;
            }
            point -= count;
        }

        let Some((hop, count)) = picked else {
            break;
        };
        weights.remove(&hop);
        total -= count;
        chosen.push(hop);
    }
    chosen
}
