//! Error types for the Skein peer graph

use thiserror::Error;

use crate::identity::PeerName;

/// Errors raised when mutating the peer graph
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeerError {
    #[error("Unknown peer: {0}")]
    UnknownPeer(PeerName),

    #[error("A peer cannot connect to itself")]
    SelfConnection,

    #[error("The local peer cannot be removed from the graph")]
    LocalPeerRemoval,

    #[error("The unknown peer name cannot be used for a real peer")]
    ReservedName,
}

/// Errors related to parsing peer names
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("Invalid peer name format: {0}")]
    InvalidFormat(String),

    #[error("Peer name is reserved for the unknown peer")]
    Reserved,

    #[error("Peer name out of range: {0:#x}")]
    OutOfRange(u64),
}
