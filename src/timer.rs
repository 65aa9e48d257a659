//! Retransmission timer.
//!
//! Reliable delivery requires that unacknowledged packets are re-sent if no
//! ACK arrives within a bounded time.  [`RetransmitTimer`] is a repeating
//! alarm: once started it invokes its handler every `interval` until it is
//! stopped, which is how "retransmit on timeout" becomes "keep retransmitting
//! until acknowledged".
//!
//! # Liveness ticks
//!
//! Each arming gets a fresh generation number, handed to the handler as a
//! [`Tick`].  `start` and `stop` retire the previous generation, so a firing
//! that was already on its way when the timer was stopped carries a stale
//! tick.  Handlers that share a lock with the code calling `stop` re-check
//! [`RetransmitTimer::is_live`] under that lock and treat a stale tick as a
//! no-op.  The handler is never called while the timer's own lock is held.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Identifies the arming that produced a firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick(u64);

type FireFn = dyn Fn(Tick) + Send + Sync;

#[derive(Debug, Default)]
struct Alarm {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl Alarm {
    /// Cancel the pending alarm task, if any, and retire its generation.
    fn disarm(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }

    fn is_live(&self, tick: Tick) -> bool {
        self.task.is_some() && self.generation == tick.0
    }
}

/// A restartable, cancellable, self-re-arming alarm.
pub struct RetransmitTimer {
    interval: Duration,
    runtime: Handle,
    on_fire: Arc<FireFn>,
    alarm: Arc<Mutex<Alarm>>,
}

impl RetransmitTimer {
    /// Create a stopped timer that will call `on_fire` every `interval` once
    /// started.  Alarm tasks are spawned on `runtime`.
    pub fn new<F>(runtime: Handle, interval: Duration, on_fire: F) -> Self
    where
        F: Fn(Tick) + Send + Sync + 'static,
    {
        Self {
            interval,
            runtime,
            on_fire: Arc::new(on_fire),
            alarm: Arc::new(Mutex::new(Alarm::default())),
        }
    }

    /// Configured firing interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// (Re)arm the timer: any pending alarm is cancelled and the next firing
    /// happens one full `interval` from now.
    pub fn start(&self) {
        let mut alarm = self.lock();
        alarm.disarm();

        let tick = Tick(alarm.generation);
        let interval = self.interval;
        let on_fire = Arc::clone(&self.on_fire);
        let shared = Arc::clone(&self.alarm);

        alarm.task = Some(self.runtime.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let live = shared
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_live(tick);
                if !live {
                    break;
                }
                log::trace!("[timer] fired (generation {})", tick.0);
                on_fire(tick);
            }
        }));
    }

    /// Cancel any pending alarm.  A no-op when the timer is not running.
    ///
    /// The handler runs outside the timer lock, so a firing that already
    /// passed its liveness check may still reach the handler after `stop`
    /// returns.  Handlers that must not act after a stop re-check
    /// [`RetransmitTimer::is_live`] under their own lock, as both engines do.
    pub fn stop(&self) {
        let mut alarm = self.lock();
        if alarm.task.is_some() {
            alarm.disarm();
        }
    }

    /// `true` between a `start` and the next `stop`.
    pub fn is_running(&self) -> bool {
        self.lock().task.is_some()
    }

    /// `true` when `tick` belongs to the current arming and the timer has not
    /// been stopped or restarted since.
    pub fn is_live(&self, tick: Tick) -> bool {
        self.lock().is_live(tick)
    }

    fn lock(&self) -> MutexGuard<'_, Alarm> {
        self.alarm.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RetransmitTimer {
    fn drop(&mut self) {
        self.lock().disarm();
    }
}

impl std::fmt::Debug for RetransmitTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetransmitTimer")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}
