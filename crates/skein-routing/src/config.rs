//! Routing table configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default window during which recalculation requests are coalesced
pub const DEFAULT_RECALC_DEFER: Duration = Duration::from_millis(100);

/// Configuration for a [`RoutingTable`](crate::RoutingTable)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// How long to wait after the first recalculation request before
    /// recomputing, so that bursts of topology changes collapse into one
    pub recalc_defer: Duration,
    /// Seed for the neighbour sampler; `None` seeds from the OS
    pub rng_seed: Option<u64>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            recalc_defer: DEFAULT_RECALC_DEFER,
            rng_seed: None,
        }
    }
}

impl RoutingConfig {
    /// Set the recalculation defer window
    pub fn with_recalc_defer(mut self, defer: Duration) -> Self {
        self.recalc_defer = defer;
        self
    }

    /// Use a fixed seed for the neighbour sampler
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }
}
