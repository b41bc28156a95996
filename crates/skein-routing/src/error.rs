//! Routing error types
//!
//! Lookups for unknown destinations and empty broadcast fan-outs are not
//! errors; they are reported through `Option` and empty vectors. The only
//! failure of the routing table itself is a coordinator that has stopped.

use thiserror::Error;

/// Errors returned by the routing table
#[derive(Debug, Error)]
pub enum RoutingError {
    /// The control loop has shut down and can no longer serve requests
    #[error("Routing coordinator is closed")]
    CoordinatorClosed,
}

/// Result type for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;
