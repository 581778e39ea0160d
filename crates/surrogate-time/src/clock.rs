//! Timer implementations

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use surrogate_core::BoxFuture;

/// Source of delays and elapsed time
pub trait Timer: Send + Sync {
    /// Future that completes after `duration`
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;

    /// Time elapsed since the timer was created
    fn elapsed(&self) -> Duration;
}

/// Wall-clock timer on the tokio runtime
#[derive(Debug, Clone)]
pub struct TokioTimer {
    origin: tokio::time::Instant,
}

impl TokioTimer {
    pub fn new() -> Self {
        TokioTimer {
            origin: tokio::time::Instant::now(),
        }
    }

    pub fn shared() -> Arc<dyn Timer> {
        Arc::new(Self::new())
    }
}

impl Default for TokioTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for TokioTimer {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }

    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

struct Sleeper {
    deadline: Duration,
    wake: oneshot::Sender<()>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    sleepers: Vec<Sleeper>,
    /// Total sleeps requested, for assertions
    requested: u64,
}

/// Manually advanced clock
/// INVARIANT: time only moves when `advance` is called; a sleep registered at
/// `t` with duration `d` completes on the first advance reaching `t + d`.
#[derive(Default)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock::default()
    }

    /// Move time forward and wake every sleeper whose deadline passed.
    /// Returns the number of sleepers woken.
    pub fn advance(&self, by: Duration) -> usize {
        let due = {
            let mut state = self.state.lock();
            state.now += by;
            let now = state.now;
            let (due, waiting): (Vec<_>, Vec<_>) =
                state.sleepers.drain(..).partition(|s| s.deadline <= now);
            state.sleepers = waiting;
            due
        };

        let woken = due.len();
        for sleeper in due {
            // Receiver gone means the waiter was cancelled
            let _ = sleeper.wake.send(());
        }
        woken
    }

    /// Sleepers still waiting (cancelled ones are pruned lazily)
    pub fn pending_sleepers(&self) -> usize {
        let mut state = self.state.lock();
        state.sleepers.retain(|s| !s.wake.is_closed());
        state.sleepers.len()
    }

    /// Sleeps requested since creation
    pub fn sleeps_requested(&self) -> u64 {
        self.state.lock().requested
    }

    pub fn now(&self) -> Duration {
        self.state.lock().now
    }
}

impl Timer for ManualClock {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        let mut state = self.state.lock();
        state.requested += 1;
        if duration.is_zero() {
            return Box::pin(std::future::ready(()));
        }

        let (tx, rx) = oneshot::channel();
        let deadline = state.now + duration;
        state.sleepers.push(Sleeper { deadline, wake: tx });
        Box::pin(async move {
            // A dropped clock releases everyone
            let _ = rx.await;
        })
    }

    fn elapsed(&self) -> Duration {
        self.now()
    }
}
