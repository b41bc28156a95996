//! Shared, lock-protected handle on the peer graph
//!
//! The peer-management layer mutates the graph through [`Peers::write`];
//! routing reads it through [`Peers::read`]. After changing the graph the
//! writer is expected to ask the routing table to recalculate.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error};

use crate::error::PeerError;
use crate::graph::PeerGraph;
use crate::identity::{PeerName, PeerNameSet};
use crate::peer::Peer;

/// Callback invoked with the names removed by garbage collection
pub type GcCallback = Arc<dyn Fn(&[PeerName]) + Send + Sync>;

/// The set of known peers, shared between peer management and routing
pub struct Peers {
    local: PeerName,
    graph: RwLock<PeerGraph>,
    on_gc: Mutex<Vec<GcCallback>>,
}

impl Peers {
    /// Create a peer set containing only the local peer
    pub fn new(local: Peer) -> Result<Self, PeerError> {
        Ok(Self {
            local: local.name,
            graph: RwLock::new(PeerGraph::new(local)?),
            on_gc: Mutex::new(Vec::new()),
        })
    }

    /// Name of the local peer
    pub fn local_name(&self) -> PeerName {
        self.local
    }

    /// Acquire the graph for reading
    pub fn read(&self) -> RwLockReadGuard<'_, PeerGraph> {
        self.graph.read()
    }

    /// Acquire the graph for writing
    pub fn write(&self) -> RwLockWriteGuard<'_, PeerGraph> {
        self.graph.write()
    }

    /// Names of all known peers
    pub fn names(&self) -> PeerNameSet {
        self.graph.read().names()
    }

    /// Number of known peers, including the local one
    pub fn len(&self) -> usize {
        self.graph.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.read().is_empty()
    }

    /// Register a callback fired after garbage collection removed peers
    pub fn on_gc<F>(&self, callback: F)
    where
        F: Fn(&[PeerName]) + Send + Sync + 'static,
    {
        self.on_gc.lock().push(Arc::new(callback));
    }

    /// Drop peers that are no longer reachable from the local peer
    ///
    /// Callbacks run after the graph lock has been released. A panicking
    /// callback is logged and does not stop the others.
    pub fn garbage_collect(&self) -> Vec<PeerName> {
        let removed = self.graph.write().garbage_collect();
        if removed.is_empty() {
            return removed;
        }

        debug!(local = %self.local, removed = removed.len(), "Garbage collected peers");
        let callbacks: Vec<GcCallback> = self.on_gc.lock().clone();
        for callback in callbacks {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(&removed))).is_err() {
                error!(local = %self.local, "GC observer panicked");
            }
        }
        removed
    }
}

impl std::fmt::Debug for Peers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peers")
            .field("local", &self.local)
            .field("peers", &self.len())
            .finish()
    }
}
