//! The routing table coordinator
//!
//! [`RoutingTable`] publishes four derived tables for the local peer:
//!
//! | Table | Connections considered |
//! |---|---|
//! | `unicast` | established and symmetric |
//! | `unicast_all` | all |
//! | `broadcast` | established and symmetric |
//! | `broadcast_all` | all |
//!
//! Readers take a read lock and never wait for a recalculation. All writes
//! happen on the control loop (see [`crate::control`]): full recalculations
//! replace every table at once, and broadcast entries for origins other
//! than the local peer are computed lazily on the first lookup and cached
//! until the next recalculation.
//!
//! Lock order is peer graph first, routing state second; the routing state
//! lock is never held while the graph lock is acquired.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rand::SeedableRng;
use rand::rngs::StdRng;
use skein_core::{ConnectionFilter, PeerName, PeerNameSet, Peers};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::config::RoutingConfig;
use crate::control::{Action, Command, ControlLoop};
use crate::error::{RoutingError, RoutingResult};
use crate::sampler;
use crate::solver::{self, BroadcastRoutes, UnicastRoutes};
use crate::status::{RoutingStats, RoutingStatus};

/// Observer fired after every full recalculation
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

type Waiters = Vec<oneshot::Sender<Vec<PeerName>>>;

/// Everything guarded by the routing table lock
struct RouteState {
    unicast: UnicastRoutes,
    unicast_all: UnicastRoutes,
    broadcast: BroadcastRoutes,
    broadcast_all: BroadcastRoutes,
    on_change: Vec<ChangeCallback>,
    pending_recalc: bool,
    /// Lookups waiting on a queued broadcast computation
    in_flight: HashMap<(PeerName, ConnectionFilter), Waiters>,
    /// Set once the control loop has exited
    closed: bool,
}

impl RouteState {
    fn new(local: PeerName) -> Self {
        Self {
            unicast: HashMap::from([(local, PeerName::UNKNOWN)]),
            unicast_all: HashMap::from([(local, PeerName::UNKNOWN)]),
            broadcast: HashMap::from([(local, Vec::new())]),
            broadcast_all: HashMap::from([(local, Vec::new())]),
            on_change: Vec::new(),
            pending_recalc: false,
            in_flight: HashMap::new(),
            closed: false,
        }
    }

    fn broadcast_cache(&self, filter: ConnectionFilter) -> &BroadcastRoutes {
        match filter {
            ConnectionFilter::EstablishedSymmetric => &self.broadcast,
            ConnectionFilter::All => &self.broadcast_all,
        }
    }

    fn broadcast_cache_mut(&mut self, filter: ConnectionFilter) -> &mut BroadcastRoutes {
        match filter {
            ConnectionFilter::EstablishedSymmetric => &mut self.broadcast,
            ConnectionFilter::All => &mut self.broadcast_all,
        }
    }
}

/// State shared between routing table handles and the control loop
pub(crate) struct Shared {
    peers: Arc<Peers>,
    state: RwLock<RouteState>,
    rng: Mutex<StdRng>,
    task: Mutex<Option<JoinHandle<()>>>,
    recalculations: AtomicU64,
    broadcast_computations: AtomicU64,
    queued_actions: AtomicU64,
    last_recalculated: Mutex<Option<DateTime<Utc>>>,
}

impl Shared {
    pub(crate) fn local_name(&self) -> PeerName {
        self.peers.local_name()
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.state.read().pending_recalc
    }

    /// Clear the pending flag, returning whether it was set
    pub(crate) fn take_pending(&self) -> bool {
        std::mem::replace(&mut self.state.write().pending_recalc, false)
    }

    /// Recalculate all four tables and notify observers
    pub(crate) fn calculate(&self) {
        let local = self.local_name();
        let symmetric = ConnectionFilter::EstablishedSymmetric;
        let all = ConnectionFilter::All;

        let (unicast, unicast_all, broadcast, broadcast_all, peer_count) = {
            let graph = self.peers.read();
            let unicast = solver::unicast_routes(&graph, local, symmetric);
            let unicast_all = solver::unicast_routes(&graph, local, all);
            let broadcast = HashMap::from([(
                local,
                solver::broadcast_routes(&graph, local, local, symmetric),
            )]);
            let broadcast_all =
                HashMap::from([(local, solver::broadcast_routes(&graph, local, local, all))]);
            (unicast, unicast_all, broadcast, broadcast_all, graph.len())
        };

        let reachable = unicast.len();
        let reachable_all = unicast_all.len();
        let on_change = {
            let mut state = self.state.write();
            state.unicast = unicast;
            state.unicast_all = unicast_all;
            state.broadcast = broadcast;
            state.broadcast_all = broadcast_all;
            state.on_change.clone()
        };

        let count = self.recalculations.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_recalculated.lock() = Some(Utc::now());
        debug!(
            local = %local,
            peers = peer_count,
            reachable,
            reachable_all,
            recalculation = count,
            "Recalculated routes"
        );

        for callback in on_change {
            if panic::catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                error!(local = %local, "Route change observer panicked");
            }
        }
    }

    /// Compute and cache the broadcast fan-out for `origin`, then answer
    /// every lookup waiting on it
    pub(crate) fn fill_broadcast(&self, origin: PeerName, filter: ConnectionFilter) {
        let cached = self.state.read().broadcast_cache(filter).get(&origin).cloned();
        let hops = match cached {
            Some(hops) => hops,
            None => {
                let hops = {
                    let graph = self.peers.read();
                    solver::broadcast_routes(&graph, self.local_name(), origin, filter)
                };
                self.broadcast_computations.fetch_add(1, Ordering::SeqCst);
                trace!(origin = %origin, ?filter, hops = hops.len(), "Computed broadcast route");
                hops
            }
        };

        let waiters = {
            let mut state = self.state.write();
            state
                .broadcast_cache_mut(filter)
                .insert(origin, hops.clone());
            state.in_flight.remove(&(origin, filter)).unwrap_or_default()
        };
        for waiter in waiters {
            let _ = waiter.send(hops.clone());
        }
    }

    /// Mark the coordinator as gone and fail every outstanding lookup
    pub(crate) fn close(&self) {
        let mut state = self.state.write();
        state.closed = true;
        // Dropping the senders wakes the waiters with an error
        state.in_flight.clear();
    }
}

/// Unicast and broadcast routes for the local peer
///
/// This is a cheap, cloneable handle. The control loop is spawned on the
/// current Tokio runtime when the table is created and stops on
/// [`shutdown`](Self::shutdown) or once every handle has been dropped.
/// [`WeakRoutingTable`] handles do not count.
#[derive(Clone)]
pub struct RoutingTable {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
}

/// Non-owning handle on a [`RoutingTable`]
///
/// Does not keep the control loop running. Observers registered through
/// [`RoutingTable::on_change`] or `Peers::on_gc` capture one of these to
/// reach the table, since a captured `RoutingTable` would keep itself
/// alive.
#[derive(Clone)]
pub struct WeakRoutingTable {
    shared: Weak<Shared>,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl WeakRoutingTable {
    /// Get a full handle, or `None` once every `RoutingTable` is gone
    pub fn upgrade(&self) -> Option<RoutingTable> {
        let commands = self.commands.upgrade()?;
        let shared = self.shared.upgrade()?;
        Some(RoutingTable { shared, commands })
    }
}

impl std::fmt::Debug for WeakRoutingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakRoutingTable")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish_non_exhaustive()
    }
}

impl RoutingTable {
    /// Create a routing table with the default configuration
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn new(peers: Arc<Peers>) -> Self {
        Self::with_config(peers, RoutingConfig::default())
    }

    /// Create a routing table with a custom configuration
    ///
    /// The tables start out containing only the local peer; call
    /// [`recalculate`](Self::recalculate) once the graph is populated.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn with_config(peers: Arc<Peers>, config: RoutingConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let shared = Arc::new(Shared {
            state: RwLock::new(RouteState::new(peers.local_name())),
            peers,
            rng: Mutex::new(rng),
            task: Mutex::new(None),
            recalculations: AtomicU64::new(0),
            broadcast_computations: AtomicU64::new(0),
            queued_actions: AtomicU64::new(0),
            last_recalculated: Mutex::new(None),
        });

        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = ControlLoop::spawn(shared.clone(), config.recalc_defer, command_rx);
        *shared.task.lock() = Some(task);

        Self { shared, commands }
    }

    /// Create a handle that does not keep the control loop running
    pub fn downgrade(&self) -> WeakRoutingTable {
        WeakRoutingTable {
            shared: Arc::downgrade(&self.shared),
            commands: self.commands.downgrade(),
        }
    }

    /// Name of the local peer
    pub fn local_name(&self) -> PeerName {
        self.shared.local_name()
    }

    /// Names of all known peers
    pub fn peer_names(&self) -> PeerNameSet {
        self.shared.peers.names()
    }

    /// Register a callback invoked after each full recalculation
    ///
    /// Callbacks run on the control loop, in registration order, after all
    /// locks have been released, so they may call back into the table
    /// through a [`WeakRoutingTable`] obtained from
    /// [`downgrade`](Self::downgrade).
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.state.write().on_change.push(Arc::new(callback));
    }

    /// Next hop towards `dest` over established, symmetric connections
    ///
    /// The local peer maps to [`PeerName::UNKNOWN`]; unreachable peers
    /// return `None`.
    pub fn unicast(&self, dest: &PeerName) -> Option<PeerName> {
        self.shared.state.read().unicast.get(dest).copied()
    }

    /// Next hop towards `dest` over all connections
    pub fn unicast_all(&self, dest: &PeerName) -> Option<PeerName> {
        self.shared.state.read().unicast_all.get(dest).copied()
    }

    /// Neighbours to forward a broadcast from `origin` to, over established,
    /// symmetric connections
    ///
    /// An unknown or unreachable origin yields an empty list.
    pub async fn broadcast(&self, origin: PeerName) -> RoutingResult<Vec<PeerName>> {
        self.lookup_or_calculate(origin, ConnectionFilter::EstablishedSymmetric)
            .await
    }

    /// Neighbours to forward a broadcast from `origin` to, over all
    /// connections
    pub async fn broadcast_all(&self, origin: PeerName) -> RoutingResult<Vec<PeerName>> {
        self.lookup_or_calculate(origin, ConnectionFilter::All).await
    }

    async fn lookup_or_calculate(
        &self,
        origin: PeerName,
        filter: ConnectionFilter,
    ) -> RoutingResult<Vec<PeerName>> {
        if let Some(hops) = self.shared.state.read().broadcast_cache(filter).get(&origin) {
            return Ok(hops.clone());
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let enqueue = {
            let mut state = self.shared.state.write();
            if let Some(hops) = state.broadcast_cache(filter).get(&origin) {
                return Ok(hops.clone());
            }
            if state.closed {
                return Err(RoutingError::CoordinatorClosed);
            }
            match state.in_flight.entry((origin, filter)) {
                Entry::Occupied(mut waiters) => {
                    waiters.get_mut().push(reply_tx);
                    false
                }
                Entry::Vacant(slot) => {
                    slot.insert(vec![reply_tx]);
                    true
                }
            }
        };

        if enqueue {
            self.shared.queued_actions.fetch_add(1, Ordering::SeqCst);
            let action: Action = Box::new(move |shared| shared.fill_broadcast(origin, filter));
            if self.commands.send(Command::Action(action)).is_err() {
                self.shared.state.write().in_flight.remove(&(origin, filter));
                return Err(RoutingError::CoordinatorClosed);
            }
        }

        reply_rx.await.map_err(|_| RoutingError::CoordinatorClosed)
    }

    /// Pick neighbours for gossip fan-out, weighted towards bottleneck links
    ///
    /// See [`sampler::random_neighbors`].
    pub fn random_neighbors(&self, except: Option<PeerName>) -> Vec<PeerName> {
        let state = self.shared.state.read();
        let mut rng = self.shared.rng.lock();
        sampler::random_neighbors(&state.unicast_all, except, &mut *rng)
    }

    /// Request a recalculation of the routing tables
    ///
    /// Returns immediately. Requests arriving within the defer window are
    /// coalesced; use [`ensure_recalculated`](Self::ensure_recalculated) to
    /// wait for the result.
    pub fn recalculate(&self) {
        let newly_pending = {
            let mut state = self.shared.state.write();
            !std::mem::replace(&mut state.pending_recalc, true)
        };
        if newly_pending && self.commands.send(Command::Arm).is_err() {
            warn!(local = %self.local_name(), "Recalculation requested after routing coordinator closed");
        }
    }

    /// Wait until every recalculation requested before this call has
    /// completed and its observers have run
    pub async fn ensure_recalculated(&self) -> RoutingResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.commands
            .send(Command::Barrier(done_tx))
            .map_err(|_| RoutingError::CoordinatorClosed)?;
        done_rx.await.map_err(|_| RoutingError::CoordinatorClosed)
    }

    /// Snapshot of the established-and-symmetric routes
    pub fn status(&self) -> RoutingStatus {
        let state = self.shared.state.read();
        RoutingStatus::new(&state.unicast, &state.broadcast)
    }

    /// Counters describing the work done so far
    pub fn stats(&self) -> RoutingStats {
        RoutingStats {
            recalculations: self.shared.recalculations.load(Ordering::SeqCst),
            broadcast_computations: self.shared.broadcast_computations.load(Ordering::SeqCst),
            queued_actions: self.shared.queued_actions.load(Ordering::SeqCst),
            last_recalculated: *self.shared.last_recalculated.lock(),
        }
    }

    /// Stop the control loop and wait for it to exit
    ///
    /// Published tables stay readable; broadcast cache misses and barriers
    /// fail with [`RoutingError::CoordinatorClosed`] afterwards.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
        let task = self.shared.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Routing control loop ended abnormally");
            }
        }
    }
}

impl std::fmt::Debug for RoutingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingTable")
            .field("local", &self.local_name())
            .finish_non_exhaustive()
    }
}
