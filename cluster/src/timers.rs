use crate::queue::QueueHandle;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// When a timer fires relative to its (re)start.
#[derive(Debug, Clone, Copy)]
pub enum Schedule {
    Fixed(Duration),
    /// Re-randomized on every start, uniform in the half-open `[min, max)`
    /// window. Randomization is what breaks ties between competing
    /// candidates.
    Jittered { min: Duration, max: Duration },
}

impl Schedule {
    fn next(&self) -> Duration {
        match *self {
            Schedule::Fixed(d) => d,
            Schedule::Jittered { min, max } => {
                let min = min.as_millis() as u64;
                let max = max.as_millis() as u64;
                Duration::from_millis(rand::thread_rng().gen_range(min..max))
            }
        }
    }
}

/// A restartable timer whose callback executes on the serialized queue.
///
/// `start` is idempotent: it always discards any outstanding schedule.
/// Cancellation is best-effort (a timer may already have enqueued its
/// callback when `stop` lands), so callbacks re-check state on entry.
pub struct Timer<S> {
    queue: QueueHandle<S>,
    schedule: Schedule,
    repeating: bool,
    callback: Arc<dyn Fn(&mut S) + Send + Sync>,
    guard: Option<CancellationToken>,
}

impl<S: 'static> Timer<S> {
    pub fn new(
        queue: QueueHandle<S>,
        schedule: Schedule,
        repeating: bool,
        callback: impl Fn(&mut S) + Send + Sync + 'static,
    ) -> Self {
        Self {
            queue,
            schedule,
            repeating,
            callback: Arc::new(callback),
            guard: None,
        }
    }

    pub fn start(&mut self) {
        self.stop();

        let token = CancellationToken::new();
        self.guard = Some(token.clone());

        let queue = self.queue.clone();
        let callback = self.callback.clone();
        let schedule = self.schedule;
        let repeating = self.repeating;

        if repeating {
            // Repeating timers fire on the leading edge too.
            let callback = callback.clone();
            queue.enqueue(move |state| callback(state));
        }

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(schedule.next()) => {
                        let callback = callback.clone();
                        queue.enqueue(move |state| callback(state));

                        if !repeating {
                            token.cancel();
                            return;
                        }
                    }
                }
            }
        });
    }

    pub fn stop(&mut self) {
        if let Some(guard) = self.guard.take() {
            guard.cancel();
        }
    }

    /// Whether a schedule is currently outstanding (or, for repeating
    /// timers, the timer is ticking).
    pub fn is_active(&self) -> bool {
        self.guard.as_ref().is_some_and(|g| !g.is_cancelled())
    }
}

/// The five named timers driving the election state machine. Each state
/// transition stops all of them and restarts exactly the ones the target
/// state needs.
pub struct TimerSet<S> {
    pub election: Timer<S>,
    pub leadership_aware: Timer<S>,
    pub heartbeat: Timer<S>,
    pub leadership_grace: Timer<S>,
    pub leadership: Timer<S>,
}

impl<S: 'static> TimerSet<S> {
    pub fn stop_all(&mut self) {
        self.election.stop();
        self.leadership_aware.stop();
        self.heartbeat.stop();
        self.leadership_grace.stop();
        self.leadership.stop();
    }
}
