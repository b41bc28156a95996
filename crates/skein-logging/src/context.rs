//! Peer context injection for multi-instance logging
//!
//! Several peers often run in one process (tests, simulations). A thread-local
//! peer context tells the logging layers which peer the current work belongs
//! to.

use std::cell::RefCell;

use skein_core::PeerName;
use uuid::Uuid;

/// Peer context data stored in thread-local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerContextData {
    /// The local peer's name
    pub peer: PeerName,
    /// Unique instance ID for this peer session
    pub instance_id: Uuid,
}

thread_local! {
    static PEER_CONTEXT: RefCell<Option<PeerContextData>> = const { RefCell::new(None) };
}

/// RAII guard for peer context
///
/// When this guard is created, it sets the peer context for the current thread.
/// When it's dropped, it restores the previous context (if any). Do not hold
/// a guard across an `.await`; the task may resume on another thread.
///
/// # Example
///
/// ```ignore
/// use skein_core::PeerName;
/// use skein_logging::PeerContextGuard;
///
/// let _guard = PeerContextGuard::new(PeerName::new(1));
///
/// // Spans opened in this scope carry the peer context
/// tracing::info!("Recalculating");
/// ```
pub struct PeerContextGuard {
    previous: Option<PeerContextData>,
}

impl PeerContextGuard {
    /// Set `peer` as the current peer with a fresh instance ID
    pub fn new(peer: PeerName) -> Self {
        Self::with_instance_id(peer, Uuid::new_v4())
    }

    /// Create a guard with a specific instance ID
    ///
    /// Useful when you want to maintain a consistent instance ID across restarts.
    pub fn with_instance_id(peer: PeerName, instance_id: Uuid) -> Self {
        let context = PeerContextData { peer, instance_id };
        let previous = PEER_CONTEXT.with(|ctx| ctx.borrow_mut().replace(context));
        Self { previous }
    }

    /// Get the current peer context (if any)
    pub fn current() -> Option<PeerContextData> {
        PEER_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    /// Get the current peer name (if set)
    pub fn current_peer() -> Option<PeerName> {
        PEER_CONTEXT.with(|ctx| ctx.borrow().as_ref().map(|data| data.peer))
    }

    /// Get the current instance ID (if set)
    pub fn current_instance_id() -> Option<Uuid> {
        PEER_CONTEXT.with(|ctx| ctx.borrow().as_ref().map(|data| data.instance_id))
    }
}

impl Drop for PeerContextGuard {
    fn drop(&mut self) {
        PEER_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Convenience macro to create a peer context scope
///
/// # Example
///
/// ```ignore
/// with_peer_context!(local, {
///     tracing::info!("Processing");
/// });
/// ```
#[macro_export]
macro_rules! with_peer_context {
    ($peer:expr, $body:block) => {{
        let _guard = $crate::context::PeerContextGuard::new($peer);
        $body
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_context_guard() {
        // No context initially
        assert!(PeerContextGuard::current().is_none());

        {
            let _guard = PeerContextGuard::new(PeerName::new(0xA));

            let ctx = PeerContextGuard::current().unwrap();
            assert_eq!(ctx.peer, PeerName::new(0xA));
        }

        // Context should be cleared after guard drops
        assert!(PeerContextGuard::current().is_none());
    }

    #[test]
    fn test_nested_contexts() {
        let peer_a = PeerName::new(0xA);
        let peer_b = PeerName::new(0xB);

        {
            let _guard_a = PeerContextGuard::new(peer_a);
            assert_eq!(PeerContextGuard::current_peer(), Some(peer_a));

            {
                let _guard_b = PeerContextGuard::new(peer_b);
                assert_eq!(PeerContextGuard::current_peer(), Some(peer_b));
            }

            // Should restore to A after B's guard drops
            assert_eq!(PeerContextGuard::current_peer(), Some(peer_a));
        }

        assert!(PeerContextGuard::current_peer().is_none());
    }

    #[test]
    fn test_with_instance_id() {
        let instance_id = Uuid::new_v4();
        let _guard = PeerContextGuard::with_instance_id(PeerName::new(7), instance_id);
        assert_eq!(PeerContextGuard::current_instance_id(), Some(instance_id));
    }

    #[test]
    fn test_macro_scope() {
        let seen = with_peer_context!(PeerName::new(3), { PeerContextGuard::current_peer() });
        assert_eq!(seen, Some(PeerName::new(3)));
        assert!(PeerContextGuard::current().is_none());
    }
}
