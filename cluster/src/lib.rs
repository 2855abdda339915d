pub mod adapter;
pub mod ballot;
pub mod codec;
pub mod events;
pub mod node;
pub mod queue;
pub mod runtime;
pub mod supervisor;
pub mod timers;

pub use adapter::NetworkAdapter;
pub use ballot::Ballot;
pub use codec::{Message, MessageKind};
pub use events::{EventLog, EventRecord};
pub use node::{ElectionNode, ElectionTimings, NodeState, StatusSnapshot};
pub use queue::{QueueHandle, SerialQueue};
pub use runtime::{start_node, NodeRuntime};
pub use supervisor::ProcessSupervisor;
pub use timers::{Schedule, Timer, TimerSet};

use tokio::sync::mpsc;
use tracing::{debug, warn};
use watchdog_common::WatchdogError;

/// Producer half of the runtime error channel. Components report failures
/// here instead of returning them up the call stack; no reported error ever
/// changes FSM state.
#[derive(Debug, Clone)]
pub struct ErrorSink {
    tx: mpsc::UnboundedSender<WatchdogError>,
}

impl ErrorSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WatchdogError>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn report(&self, err: WatchdogError) {
        // A closed receiver means the logger is gone; nothing left to tell.
        let _ = self.tx.send(err);
    }
}

/// Drains the error channel into the log until every sink is dropped.
pub fn spawn_error_logger(
    mut rx: mpsc::UnboundedReceiver<WatchdogError>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(err) = rx.recv().await {
            if err.is_informational() {
                debug!("{err}");
            } else {
                warn!("{err}");
            }
        }
    })
}
