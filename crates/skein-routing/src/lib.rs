//! # Skein Routing
//!
//! Routing layer for the Skein mesh.
//!
//! Given the peer graph in [`skein_core::Peers`], this crate computes, for
//! the local peer:
//!
//! - the next hop towards every reachable peer (unicast);
//! - which neighbours to forward a broadcast to, per originating peer, so
//!   that every reachable peer receives it exactly once;
//! - a topology-weighted random sample of neighbours for gossip fan-out.
//!
//! Each table exists in two flavours: one over established, symmetric
//! connections only, and one over every advertised connection.
//!
//! ## Core Components
//!
//! - [`RoutingTable`]: the coordinator handle. Lookups are lock-light reads;
//!   recalculations are debounced and serialised on a background task.
//! - [`WeakRoutingTable`]: a handle for observers that does not keep the
//!   background task alive.
//! - [`solver`]: the pure unicast and broadcast solvers
//! - [`sampler`]: weighted neighbour selection
//! - [`RoutingStatus`] / [`RoutingStats`]: diagnostics snapshots
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use skein_core::{Peer, PeerName, Peers};
//! use skein_routing::RoutingTable;
//!
//! let peers = Arc::new(Peers::new(Peer::new(PeerName::new(1)))?);
//! let routes = RoutingTable::new(peers.clone());
//!
//! peers.write().connect(PeerName::new(1), PeerName::new(2))?;
//! routes.recalculate();
//! routes.ensure_recalculated().await?;
//!
//! assert_eq!(routes.unicast(&PeerName::new(2)), Some(PeerName::new(2)));
//! let fan_out = routes.broadcast(PeerName::new(1)).await?;
//! ```

pub mod config;
mod control;
pub mod error;
pub mod sampler;
pub mod solver;
pub mod status;
pub mod table;

// Re-export main types
pub use config::{DEFAULT_RECALC_DEFER, RoutingConfig};
pub use error::{RoutingError, RoutingResult};
pub use solver::{BroadcastRoutes, UnicastRoutes};
pub use status::{BroadcastRouteStatus, RoutingStats, RoutingStatus, UnicastRouteStatus};
pub use table::{ChangeCallback, RoutingTable, WeakRoutingTable};
