//! Serialisable snapshots of the routing table for diagnostics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skein_core::PeerName;

use crate::solver::{BroadcastRoutes, UnicastRoutes};

/// A unicast route: packets for `dest` go via `via`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnicastRouteStatus {
    pub dest: PeerName,
    pub via: PeerName,
}

/// A broadcast route: broadcasts from `source` are forwarded to `via`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastRouteStatus {
    pub source: PeerName,
    pub via: Vec<PeerName>,
}

/// Snapshot of the established-and-symmetric routes, sorted by peer name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingStatus {
    pub unicast: Vec<UnicastRouteStatus>,
    pub broadcast: Vec<BroadcastRouteStatus>,
}

impl RoutingStatus {
    pub(crate) fn new(unicast: &UnicastRoutes, broadcast: &BroadcastRoutes) -> Self {
        let mut unicast: Vec<UnicastRouteStatus> = unicast
            .iter()
            .map(|(dest, via)| UnicastRouteStatus {
                dest: *dest,
                via: *via,
            })
            .collect();
        unicast.sort_by_key(|route| route.dest);

        let mut broadcast: Vec<BroadcastRouteStatus> = broadcast
            .iter()
            .map(|(source, via)| BroadcastRouteStatus {
                source: *source,
                via: via.clone(),
            })
            .collect();
        broadcast.sort_by_key(|route| route.source);

        Self { unicast, broadcast }
    }
}

/// Counters describing the work done by the control loop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingStats {
    /// Full recomputations of all four tables
    pub recalculations: u64,
    /// Broadcast fan-outs computed on demand for non-local origins
    pub broadcast_computations: u64,
    /// Closures queued on the control loop by broadcast cache misses
    pub queued_actions: u64,
    /// When the last full recomputation finished
    pub last_recalculated: Option<DateTime<Utc>>,
}
