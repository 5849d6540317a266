//! Per-call deadline tracking and timer rescheduling (§4.11).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::timeout::encode_timeout_checked;

/// Clock abstraction so tests can control "now" without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Longest single `tokio::time::sleep` the manager will arm before
/// checking back in and re-arming — stands in for a platform's maximum
/// timer period (the base spec names this explicitly; Windows' `WinHttp`
/// timer has a similar real-world ceiling).
pub const MAX_TIMER_PERIOD: Duration = Duration::from_secs(60 * 60 * 24);

/// Deadline expressed both as an absolute UTC instant (for `grpc-timeout`
/// encoding and user-facing reporting) and a monotonic `tokio::Instant`
/// deadline (for the actual timer).
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    absolute: DateTime<Utc>,
    monotonic: Instant,
}

impl Deadline {
    /// No deadline at all — `MAX` in the base spec's terms.
    pub fn none() -> Self {
        Deadline {
            absolute: DateTime::<Utc>::MAX_UTC,
            monotonic: Instant::now() + MAX_TIMER_PERIOD * 365 * 100,
        }
    }

    pub fn after(duration: Duration, clock: &dyn Clock) -> Self {
        let absolute = clock.now() + chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        Deadline {
            absolute,
            monotonic: Instant::now() + duration,
        }
    }

    pub fn is_none(&self) -> bool {
        self.absolute == DateTime::<Utc>::MAX_UTC
    }

    pub fn is_past(&self, clock: &dyn Clock) -> bool {
        !self.is_none() && self.absolute <= clock.now()
    }

    /// Remaining duration, clamped to zero if already past. `None` if this
    /// is [`Deadline::none`] — no `grpc-timeout` header should be emitted.
    pub fn remaining(&self, clock: &dyn Clock) -> Option<Duration> {
        if self.is_none() {
            return None;
        }
        let now = clock.now();
        if self.absolute <= now {
            Some(Duration::ZERO)
        } else {
            (self.absolute - now).to_std().ok()
        }
    }

    pub fn monotonic_instant(&self) -> Instant {
        self.monotonic
    }

    /// Encodes the `grpc-timeout` header value, or `None` when no header
    /// should be sent. Returns whether the value was clamped to the
    /// maximum, so the caller can log the "above maximum" warning exactly
    /// once.
    pub fn encode_header(&self, clock: &dyn Clock) -> Option<(String, bool)> {
        self.remaining(clock).map(encode_timeout_checked)
    }
}

/// Outcome of one tick of the deadline manager's timer loop.
pub enum DeadlineTick {
    /// Remaining time was still positive (clock skew / timer granularity);
    /// re-arm for `next_wait`.
    Rescheduled { next_wait: Duration },
    /// Remaining time is zero or negative; the call terminates.
    Expired,
}

/// Drives one call's deadline timer, re-arming across the platform's
/// maximum timer period until the deadline is actually reached.
pub struct DeadlineManager {
    clock: Arc<dyn Clock>,
    deadline: Deadline,
}

impl DeadlineManager {
    pub fn new(clock: Arc<dyn Clock>, deadline: Deadline) -> Self {
        DeadlineManager { clock, deadline }
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// The `tokio::time::sleep_until` target for the next arm: either the
    /// deadline itself, or `now + MAX_TIMER_PERIOD` if the deadline is
    /// further out than the platform allows in one timer.
    pub fn next_arm_instant(&self) -> Instant {
        let capped = Instant::now() + MAX_TIMER_PERIOD;
        if self.deadline.monotonic_instant() < capped {
            self.deadline.monotonic_instant()
        } else {
            capped
        }
    }

    /// Called when a previously-armed timer fires. Checks whether the
    /// deadline has actually been reached.
    pub fn on_timer_fired(&self) -> DeadlineTick {
        if self.deadline.is_past(self.clock.as_ref()) {
            DeadlineTick::Expired
        } else {
            let next_wait = self
                .deadline
                .remaining(self.clock.as_ref())
                .unwrap_or(Duration::ZERO)
                .min(MAX_TIMER_PERIOD);
            DeadlineTick::Rescheduled { next_wait }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedClock(Mutex<DateTime<Utc>>);

    impl FixedClock {
        fn new(t: DateTime<Utc>) -> Self {
            FixedClock(Mutex::new(t))
        }

        fn advance(&self, duration: chrono::Duration) {
            let mut guard = self.0.lock().unwrap();
            *guard += duration;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    #[test]
    fn no_deadline_never_reports_past() {
        let clock = SystemClock;
        let deadline = Deadline::none();
        assert!(!deadline.is_past(&clock));
        assert_eq!(deadline.remaining(&clock), None);
    }

    #[test]
    fn past_deadline_reports_past_and_zero_remaining() {
        let clock = FixedClock::new(Utc::now());
        let deadline = Deadline::after(Duration::from_millis(10), &clock);
        clock.advance(chrono::Duration::milliseconds(20));
        assert!(deadline.is_past(&clock));
        assert_eq!(deadline.remaining(&clock), Some(Duration::ZERO));
    }

    #[test]
    fn future_deadline_encodes_header() {
        let clock = FixedClock::new(Utc::now());
        let deadline = Deadline::after(Duration::from_secs(5), &clock);
        let (token, clamped) = deadline.encode_header(&clock).unwrap();
        assert_eq!(token, "5S");
        assert!(!clamped);
    }

    #[test]
    fn none_deadline_emits_no_header() {
        let clock = SystemClock;
        let deadline = Deadline::none();
        assert!(deadline.encode_header(&clock).is_none());
    }

    #[test]
    fn manager_expires_when_deadline_passed() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let deadline = Deadline::after(Duration::from_millis(1), clock.as_ref());
        clock.advance(chrono::Duration::milliseconds(5));
        let manager = DeadlineManager::new(clock.clone(), deadline);
        assert!(matches!(manager.on_timer_fired(), DeadlineTick::Expired));
    }

    #[test]
    fn manager_reschedules_on_spurious_wakeup() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let deadline = Deadline::after(Duration::from_secs(10), clock.as_ref());
        let manager = DeadlineManager::new(clock.clone(), deadline);
        match manager.on_timer_fired() {
            DeadlineTick::Rescheduled { next_wait } => assert!(next_wait > Duration::ZERO),
            DeadlineTick::Expired => panic!("should not have expired yet"),
        }
    }
}
