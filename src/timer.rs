// CLASSIFICATION: COMMUNITY
// Filename: timer.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! One-shot protocol timers.
//!
//! Every timer the engine uses has a fixed slot. Arming an armed timer
//! restarts it; cancelling reports whether it was still pending. Expiry is
//! collected by [`TimerService::take_due`], either from the dedicated timer
//! thread or from an explicit poll when a [`ManualClock`] drives time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::trace;

use crate::l2::Channel;

/// Upper bound on how long the timer thread sleeps between checks.
const MAX_TIMER_WAIT: Duration = Duration::from_millis(20);

/// Monotonic time source.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;

    /// Whether a background thread should poll timers against this clock.
    fn drives_timer_thread(&self) -> bool {
        true
    }
}

/// Wall-clock backed [`Clock`].
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to.
///
/// Nothing polls timers on its own under this clock; call
/// [`crate::Shrm::fire_due_timers`] after [`ManualClock::advance`].
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn drives_timer_thread(&self) -> bool {
        false
    }
}

/// Timers owned by the protocol engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Quiescence check after acknowledgements and sleep requests.
    IdleCheck,
    /// Stuck-modem watchdog for one channel's doorbell.
    ModStuck(Channel),
    /// Armed when a transmit ring runs out of space.
    FifoFull,
}

impl TimerKind {
    pub const ALL: [TimerKind; 4] = [
        TimerKind::IdleCheck,
        TimerKind::ModStuck(Channel::Common),
        TimerKind::ModStuck(Channel::Audio),
        TimerKind::FifoFull,
    ];

    fn slot(self) -> usize {
        match self {
            TimerKind::IdleCheck => 0,
            TimerKind::ModStuck(Channel::Common) => 1,
            TimerKind::ModStuck(Channel::Audio) => 2,
            TimerKind::FifoFull => 3,
        }
    }
}

/// Deadline table plus the condition variable the timer thread sleeps on.
pub struct TimerService {
    clock: Arc<dyn Clock>,
    deadlines: Mutex<[Option<Duration>; 4]>,
    changed: Condvar,
    stopped: AtomicBool,
}

impl TimerService {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            deadlines: Mutex::new([None; 4]),
            changed: Condvar::new(),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn table(&self) -> MutexGuard<'_, [Option<Duration>; 4]> {
        self.deadlines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start or restart `kind` to expire `after` from now.
    pub fn arm(&self, kind: TimerKind, after: Duration) {
        let deadline = self.clock.now() + after;
        self.table()[kind.slot()] = Some(deadline);
        trace!(target: "shrm::timer", "armed {kind:?} for {after:?}");
        self.changed.notify_all();
    }

    /// Cancel `kind`; returns `true` when it was armed.
    pub fn cancel(&self, kind: TimerKind) -> bool {
        let was_armed = self.table()[kind.slot()].take().is_some();
        if was_armed {
            trace!(target: "shrm::timer", "cancelled {kind:?}");
        }
        was_armed
    }

    pub fn cancel_all(&self) {
        *self.table() = [None; 4];
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.table()[kind.slot()].is_some()
    }

    /// Remove and return every expired timer, earliest first.
    pub fn take_due(&self) -> Vec<TimerKind> {
        let now = self.clock.now();
        let mut table = self.table();
        let mut due: Vec<(Duration, TimerKind)> = TimerKind::ALL
            .iter()
            .filter_map(|&kind| match table[kind.slot()] {
                Some(deadline) if deadline <= now => Some((deadline, kind)),
                _ => None,
            })
            .collect();
        for (_, kind) in &due {
            table[kind.slot()] = None;
        }
        due.sort_by_key(|(deadline, _)| *deadline);
        due.into_iter().map(|(_, kind)| kind).collect()
    }

    /// Block the calling thread, invoking `poll` whenever a timer may be due,
    /// until [`TimerService::stop`] is called.
    pub fn run(&self, mut poll: impl FnMut()) {
        loop {
            {
                let table = self.table();
                if self.stopped.load(Ordering::Acquire) {
                    return;
                }
                let now = self.clock.now();
                let wait = table
                    .iter()
                    .flatten()
                    .min()
                    .map(|deadline| deadline.saturating_sub(now))
                    .unwrap_or(MAX_TIMER_WAIT)
                    .min(MAX_TIMER_WAIT);
                if !wait.is_zero() {
                    let _unused = self
                        .changed
                        .wait_timeout(table, wait)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
            if self.stopped.load(Ordering::Acquire) {
                return;
            }
            poll();
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        // Take the lock so a waiter between its stop check and wait sees the notify.
        drop(self.table());
        self.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> (ManualClock, TimerService) {
        let clock = ManualClock::new();
        let svc = TimerService::new(Arc::new(clock.clone()));
        (clock, svc)
    }

    #[test]
    fn timer_fires_once_after_deadline() {
        let (clock, svc) = service();
        svc.arm(TimerKind::FifoFull, Duration::from_secs(1));
        assert!(svc.take_due().is_empty());
        clock.advance(Duration::from_millis(1000));
        assert_eq!(svc.take_due(), vec![TimerKind::FifoFull]);
        assert!(svc.take_due().is_empty());
        assert!(!svc.is_armed(TimerKind::FifoFull));
    }

    #[test]
    fn rearming_restarts_the_deadline() {
        let (clock, svc) = service();
        svc.arm(TimerKind::IdleCheck, Duration::from_millis(25));
        clock.advance(Duration::from_millis(20));
        svc.arm(TimerKind::IdleCheck, Duration::from_millis(25));
        clock.advance(Duration::from_millis(20));
        assert!(svc.take_due().is_empty());
        clock.advance(Duration::from_millis(5));
        assert_eq!(svc.take_due(), vec![TimerKind::IdleCheck]);
    }

    #[test]
    fn cancel_reports_whether_armed() {
        let (_clock, svc) = service();
        assert!(!svc.cancel(TimerKind::ModStuck(Channel::Common)));
        svc.arm(TimerKind::ModStuck(Channel::Common), Duration::from_secs(6));
        assert!(svc.cancel(TimerKind::ModStuck(Channel::Common)));
        assert!(!svc.is_armed(TimerKind::ModStuck(Channel::Common)));
    }

    #[test]
    fn due_timers_come_back_in_deadline_order() {
        let (clock, svc) = service();
        svc.arm(TimerKind::ModStuck(Channel::Audio), Duration::from_secs(6));
        svc.arm(TimerKind::FifoFull, Duration::from_secs(1));
        clock.advance(Duration::from_secs(7));
        assert_eq!(
            svc.take_due(),
            vec![TimerKind::FifoFull, TimerKind::ModStuck(Channel::Audio)]
        );
    }

    #[test]
    fn run_returns_after_stop() {
        let svc = Arc::new(TimerService::new(Arc::new(MonotonicClock::default())));
        let runner = Arc::clone(&svc);
        let handle = std::thread::spawn(move || runner.run(|| {}));
        svc.stop();
        handle.join().unwrap();
    }
}
