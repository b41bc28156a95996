//! # Skein Core
//!
//! Peer names, connections and the peer graph shared by the Skein mesh
//! crates.
//!
//! ## Key Types
//!
//! - [`PeerName`]: 48-bit peer identifier with a reserved [`PeerName::UNKNOWN`]
//! - [`Connection`]: a directed link advertised by a peer
//! - [`Peer`]: a peer record and its connections
//! - [`PeerGraph`]: all known peers, with deterministic BFS traversal
//! - [`Peers`]: the lock-owning handle shared with the routing layer

pub mod error;
pub mod graph;
pub mod identity;
pub mod peer;
pub mod peers;

// Re-export main types
pub use error::*;
pub use graph::{NextHops, PeerGraph, Reachability};
pub use identity::{PeerName, PeerNameSet};
pub use peer::{Connection, ConnectionFilter, Peer};
pub use peers::{GcCallback, Peers};
