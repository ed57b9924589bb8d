//! Pipeline stage lifecycle.
//!
//! Every pipeline stage (and the listener as a whole) carries one
//! [`StateCell`]: an integer-backed state updated only by compare-and-swap.
//!
//! ```text
//! Unknown -> Active -> { Suspending -> Suspended -> Active }* -> StopSignaled -> Stopping -> Stopped
//! ```
//!
//! States are ordered, so "at least as far along as" checks are plain
//! ordinal comparisons. The transition into `Stopping` is the single point
//! that elects who runs a stage's terminal shutdown action.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

use crate::backoff::SpinBackoff;

/// Lifecycle state, in transition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum StageState {
    Unknown = 0,
    Active = 1,
    Suspending = 2,
    Suspended = 3,
    StopSignaled = 4,
    Stopping = 5,
    Stopped = 6,
}

impl StageState {
    #[inline]
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Active,
            2 => Self::Suspending,
            3 => Self::Suspended,
            4 => Self::StopSignaled,
            5 => Self::Stopping,
            6 => Self::Stopped,
            _ => Self::Unknown,
        }
    }

    /// Whether a stop has been requested or completed.
    #[inline]
    pub const fn is_stopping(self) -> bool {
        self as u8 >= Self::StopSignaled as u8
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Active => "active",
            Self::Suspending => "suspending",
            Self::Suspended => "suspended",
            Self::StopSignaled => "stop-signaled",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Outcome of [`StateCell::settle_idle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    /// Work arrived during the transition; the stage is Active again.
    Resume,
    /// The stage is now Suspended.
    Idle,
    /// A stop was signaled; the caller should run its shutdown path.
    Stop,
}

/// Atomic lifecycle cell.
pub struct StateCell {
    name: &'static str,
    raw: AtomicU8,
}

impl fmt::Debug for StateCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCell")
            .field("name", &self.name)
            .field("state", &self.current())
            .finish()
    }
}

impl StateCell {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            raw: AtomicU8::new(StageState::Unknown as u8),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn current(&self) -> StageState {
        StageState::from_u8(self.raw.load(Ordering::Acquire))
    }

    /// Move to `target` only if the cell currently holds `expected`.
    pub fn try_transition(&self, target: StageState, expected: StageState) -> bool {
        let ok = self
            .raw
            .compare_exchange(
                expected as u8,
                target as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if ok {
            trace!(stage = self.name, from = %expected, to = %target, "state transition");
        }
        ok
    }

    /// Unconditionally store `target`. Only for the owner of the cell.
    pub fn set(&self, target: StageState) {
        self.raw.store(target as u8, Ordering::Release);
    }

    #[inline]
    pub fn is(&self, state: StageState) -> bool {
        self.current() == state
    }

    #[inline]
    pub fn is_greater_than(&self, state: StageState) -> bool {
        self.current() > state
    }

    #[inline]
    pub fn is_less_than(&self, state: StageState) -> bool {
        self.current() < state
    }

    /// Spin until the cell holds `target`, calling `backoff` between checks.
    pub fn spin_wait_for(&self, target: StageState, mut backoff: impl FnMut()) {
        while !self.is(target) {
            backoff();
        }
    }

    /// Like [`spin_wait_for`](Self::spin_wait_for) but gives up after `timeout`.
    pub fn wait_for_timeout(&self, target: StageState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut backoff = SpinBackoff::new();
        while !self.is(target) {
            if Instant::now() >= deadline {
                return false;
            }
            backoff.snooze();
        }
        true
    }

    /// Activate an idle stage (`Unknown` or `Suspended` -> `Active`).
    ///
    /// Returns `true` if this call performed the activation, i.e. the caller
    /// is responsible for scheduling the stage's work. A stage caught in
    /// `Suspending` is waited out, since it is about to either resume on its
    /// own or settle into `Suspended`.
    pub fn try_activate(&self) -> bool {
        let mut backoff = SpinBackoff::new();
        loop {
            match self.current() {
                state @ (StageState::Unknown | StageState::Suspended) => {
                    if self.try_transition(StageState::Active, state) {
                        return true;
                    }
                }
                StageState::Suspending => backoff.snooze(),
                _ => return false,
            }
        }
    }

    /// Take an Active stage to Suspended, re-checking for work in between.
    ///
    /// `has_work` is evaluated while the cell is `Suspending`, which closes
    /// the race with a producer that enqueued just before the transition.
    pub fn settle_idle(&self, has_work: impl Fn() -> bool) -> Settle {
        if !self.try_transition(StageState::Suspending, StageState::Active) {
            return Settle::Stop;
        }
        if has_work() {
            return if self.try_transition(StageState::Active, StageState::Suspending) {
                Settle::Resume
            } else {
                Settle::Stop
            };
        }
        if self.try_transition(StageState::Suspended, StageState::Suspending) {
            Settle::Idle
        } else {
            Settle::Stop
        }
    }

    /// Request a stop. Returns the state the cell held when the request
    /// landed, or `None` if a stop had already been requested.
    pub fn signal_stop(&self) -> Option<StageState> {
        loop {
            let current = self.current();
            if current.is_stopping() {
                return None;
            }
            if self.try_transition(StageState::StopSignaled, current) {
                return Some(current);
            }
        }
    }

    /// Elect the caller to run the terminal shutdown action.
    ///
    /// Exactly one caller wins the `StopSignaled -> Stopping` transition;
    /// it runs `terminal` and then marks the cell `Stopped`.
    pub fn try_finish_stop(&self, terminal: impl FnOnce()) -> bool {
        if !self.try_transition(StageState::Stopping, StageState::StopSignaled) {
            return false;
        }
        terminal();
        self.set(StageState::Stopped);
        true
    }
}

/// Wait / notify primitive for a stage that parks while idle.
#[derive(Debug, Default)]
pub struct WakeSignal {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a wake-up and release a parked waiter.
    pub fn notify(&self) {
        let mut pending = self.pending.lock();
        *pending = true;
        self.cond.notify_one();
    }

    /// Park until notified (consuming the notification) or `timeout` elapses.
    ///
    /// Returns `true` if a notification was consumed.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut pending = self.pending.lock();
        if !*pending {
            let _ = self.cond.wait_for(&mut pending, timeout);
        }
        std::mem::take(&mut *pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn ordering_matches_transition_order() {
        assert!(StageState::Active < StageState::Suspending);
        assert!(StageState::Suspended < StageState::StopSignaled);
        assert!(StageState::Stopping.is_stopping());
        assert!(!StageState::Suspended.is_stopping());
    }

    #[test]
    fn transition_requires_expected_state() {
        let cell = StateCell::new("test");
        assert!(!cell.try_transition(StageState::Suspending, StageState::Active));
        assert!(cell.try_transition(StageState::Active, StageState::Unknown));
        assert!(cell.is(StageState::Active));
        assert!(cell.is_greater_than(StageState::Unknown));
        assert!(cell.is_less_than(StageState::Suspending));
    }

    #[test]
    fn settle_idle_without_work_suspends() {
        let cell = StateCell::new("test");
        cell.set(StageState::Active);
        assert_eq!(cell.settle_idle(|| false), Settle::Idle);
        assert!(cell.is(StageState::Suspended));
        assert!(cell.try_activate());
        assert!(!cell.try_activate());
    }

    #[test]
    fn settle_idle_with_work_resumes() {
        let cell = StateCell::new("test");
        cell.set(StageState::Active);
        assert_eq!(cell.settle_idle(|| true), Settle::Resume);
        assert!(cell.is(StageState::Active));
    }

    #[test]
    fn settle_idle_after_stop_reports_stop() {
        let cell = StateCell::new("test");
        cell.set(StageState::Active);
        assert_eq!(cell.signal_stop(), Some(StageState::Active));
        assert_eq!(cell.settle_idle(|| false), Settle::Stop);
        assert!(cell.try_finish_stop(|| {}));
        assert!(cell.is(StageState::Stopped));
    }

    #[test]
    fn stop_is_signaled_once() {
        let cell = StateCell::new("test");
        cell.set(StageState::Suspended);
        assert_eq!(cell.signal_stop(), Some(StageState::Suspended));
        assert_eq!(cell.signal_stop(), None);
        assert!(!cell.try_activate());
    }

    #[test]
    fn spin_wait_observes_other_thread() {
        let cell = Arc::new(StateCell::new("test"));
        let setter = Arc::clone(&cell);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            setter.set(StageState::Active);
        });
        let mut backoff = SpinBackoff::new();
        cell.spin_wait_for(StageState::Active, || backoff.snooze());
        assert!(cell.is(StageState::Active));
        assert!(!cell.wait_for_timeout(StageState::Stopped, Duration::from_millis(5)));
        handle.join().unwrap();
    }

    #[test]
    fn wake_signal_is_not_lost() {
        let signal = Arc::new(WakeSignal::new());
        signal.notify();
        assert!(signal.wait(Duration::from_millis(1)));
        assert!(!signal.wait(Duration::from_millis(1)));

        let waker = Arc::clone(&signal);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            waker.notify();
        });
        assert!(signal.wait(Duration::from_secs(5)));
        handle.join().unwrap();
    }
}
