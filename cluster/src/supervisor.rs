use crate::node::{NodeState, StatusSnapshot};
use crate::ErrorSink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use watchdog_common::{CommandConfig, WatchdogError};

/// How often the supervisor reconciles the child against the node state.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Keeps the gated child process in lockstep with the election outcome.
///
/// A background sampler reads `(state, can_run_process)` from the snapshot
/// channel and reconciles: the child runs exactly while this node is
/// leading with the grace period elapsed. Both directions are idempotent,
/// and liveness is tracked through the wait handle: a child counts as
/// stopped only once it has been reaped.
pub struct ProcessSupervisor {
    command: CommandConfig,
    status: watch::Receiver<StatusSnapshot>,
    errors: ErrorSink,
    running: Arc<AtomicBool>,
    child: Option<Child>,
}

impl ProcessSupervisor {
    pub fn new(
        command: CommandConfig,
        status: watch::Receiver<StatusSnapshot>,
        errors: ErrorSink,
    ) -> Self {
        Self {
            command,
            status,
            errors,
            running: Arc::new(AtomicBool::new(false)),
            child: None,
        }
    }

    /// Shared flag for the diagnostic report: is the child currently alive?
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let should_run = {
                    let snapshot = self.status.borrow();
                    snapshot.state == NodeState::Leading && snapshot.can_run_process
                };

                if should_run {
                    self.ensure_running();
                } else {
                    self.ensure_stopped().await;
                }
            }
        })
    }

    fn ensure_running(&mut self) {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                // Still alive; nothing to do.
                Ok(None) => return,
                Ok(Some(status)) => {
                    warn!("gated process exited on its own ({status}), relaunching");
                    self.child = None;
                    self.running.store(false, Ordering::SeqCst);
                }
                Err(e) => {
                    self.errors.report(WatchdogError::ProcessReapFailed(e));
                    self.child = None;
                    self.running.store(false, Ordering::SeqCst);
                }
            }
        }

        match Command::new(&self.command.name)
            .args(&self.command.args)
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => {
                info!(
                    command = %self.command.name,
                    pid = child.id(),
                    "started gated process"
                );
                self.child = Some(child);
                self.running.store(true, Ordering::SeqCst);
            }
            Err(source) => {
                self.errors.report(WatchdogError::ProcessLaunchFailed {
                    command: self.command.name.clone(),
                    source,
                });
            }
        }
    }

    async fn ensure_stopped(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        info!(command = %self.command.name, "stopping gated process");
        self.running.store(false, Ordering::SeqCst);

        if let Err(e) = child.start_kill() {
            // Raced with the child exiting; the wait below still reaps it.
            debug!("kill failed: {e}");
        }

        match child.wait().await {
            Ok(status) => debug!("gated process reaped ({status})"),
            Err(e) => self.errors.report(WatchdogError::ProcessReapFailed(e)),
        }
    }
}
