//! The routing control loop
//!
//! A single task owns every mutation of the published routing tables. It
//! serves three kinds of work, strictly one at a time:
//!
//! 1. the debounce deadline expiring, which triggers a full recalculation;
//! 2. barrier requests from `ensure_recalculated`, which force any pending
//!    recalculation to run immediately before the waiter is released;
//! 3. queued actions, used to fill the broadcast cache on a miss.
//!
//! Because everything runs here, recalculations and cache fills never
//! overlap each other.

use std::sync::Arc;
use std::time::Duration;

use skein_logging::PeerContextGuard;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{Instrument, debug, info, info_span};

use crate::table::Shared;

/// Work queued on the control loop
pub(crate) type Action = Box<dyn FnOnce(&Shared) + Send>;

/// Commands sent from [`RoutingTable`](crate::RoutingTable) handles
pub(crate) enum Command {
    /// A recalculation was requested; start the debounce window
    Arm,
    /// Release the sender once pending recalculations have finished
    Barrier(oneshot::Sender<()>),
    /// Run a closure against the shared state
    Action(Action),
    Shutdown,
}

pub(crate) struct ControlLoop {
    shared: Arc<Shared>,
    recalc_defer: Duration,
    /// When the armed debounce window ends, if armed
    deadline: Option<Instant>,
}

impl ControlLoop {
    /// Spawn the control loop as a background task
    ///
    /// The task runs inside a `routing` span tagged with the local peer.
    pub(crate) fn spawn(
        shared: Arc<Shared>,
        recalc_defer: Duration,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> JoinHandle<()> {
        let local = shared.local_name();
        let span = {
            let _peer = PeerContextGuard::new(local);
            info_span!("routing", local = %local)
        };
        let control = Self {
            shared,
            recalc_defer,
            deadline: None,
        };
        tokio::spawn(control.run(commands).instrument(span))
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let local = self.shared.local_name();
        info!(
            local = %local,
            defer_ms = self.recalc_defer.as_millis() as u64,
            "Routing control loop started"
        );

        loop {
            let deadline = self.deadline;
            tokio::select! {
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.deadline = None;
                    self.shared.take_pending();
                    self.shared.calculate();
                }
                command = commands.recv() => match command {
                    Some(Command::Arm) => self.arm(),
                    Some(Command::Barrier(done)) => {
                        self.barrier();
                        let _ = done.send(());
                    }
                    Some(Command::Action(action)) => action(&self.shared),
                    Some(Command::Shutdown) | None => break,
                },
            }
        }

        self.shared.close();
        info!(local = %local, "Routing control loop stopped");
    }

    fn arm(&mut self) {
        // A barrier may already have served the request this Arm announces
        if self.deadline.is_none() && self.shared.is_pending() {
            self.deadline = Some(Instant::now() + self.recalc_defer);
        }
    }

    fn barrier(&mut self) {
        if self.shared.take_pending() {
            debug!("Barrier forcing pending recalculation");
            self.deadline = None;
            self.shared.calculate();
        }
    }
}
