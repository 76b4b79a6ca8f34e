//! The timeout contract shared by every bounded operation.
//!
//! A timeout is either [`Timeout::Forever`] or a bounded wait. A bounded wait of zero means
//! "do not wait at all". Operations that may block more than once convert the timeout into a
//! [`Deadline`] exactly once and then ask the deadline for the remaining time on every retry,
//! so repeated signal interruptions never stretch the total wait.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeout {
    /// Wait until the operation can proceed
    #[default]
    Forever,
    /// Wait at most this long. [`Duration::ZERO`] polls once and returns
    After(Duration),
}

impl Timeout {
    pub const FOREVER: Timeout = Timeout::Forever;
    pub const IMMEDIATE: Timeout = Timeout::After(Duration::ZERO);

    /// Negative, NaN and unrepresentable values mean "wait forever"
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs.is_nan() || secs < 0.0 {
            return Timeout::Forever;
        }

        Duration::try_from_secs_f64(secs)
            .map(Timeout::After)
            .unwrap_or(Timeout::Forever)
    }

    pub fn is_forever(&self) -> bool {
        matches!(self, Timeout::Forever)
    }

    pub fn is_immediate(&self) -> bool {
        matches!(self, Timeout::After(d) if d.is_zero())
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Timeout::Forever => None,
            Timeout::After(d) => Some(*d),
        }
    }

    pub fn deadline(self) -> Deadline {
        Deadline::after(self)
    }
}

impl From<f64> for Timeout {
    fn from(secs: f64) -> Self {
        Timeout::from_secs_f64(secs)
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::After(duration)
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(duration: Option<Duration>) -> Self {
        duration.map(Timeout::After).unwrap_or(Timeout::Forever)
    }
}

/// An absolute point in time bounding a wait. `None` never expires.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn after(timeout: Timeout) -> Self {
        let at = match timeout {
            Timeout::Forever => None,
            // a deadline too far out to represent behaves like no deadline
            Timeout::After(d) => Instant::now().checked_add(d),
        };

        Self { at }
    }

    pub fn never() -> Self {
        Self { at: None }
    }

    /// Time left before expiry, saturating at zero. `None` for an unbounded deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// The remaining time expressed as a new timeout. Never negative: an expired deadline
    /// yields [`Timeout::IMMEDIATE`], not [`Timeout::Forever`]
    pub fn remaining_timeout(&self) -> Timeout {
        self.remaining().into()
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.remaining(), Some(d) if d.is_zero())
    }

    pub fn is_unbounded(&self) -> bool {
        self.at.is_none()
    }

    /// The remaining time in the form `poll(2)` expects: -1 for an unbounded wait, otherwise
    /// whole milliseconds rounded up so a live sub-millisecond remainder never turns into a
    /// zero-timeout spin
    pub fn poll_millis(&self) -> i32 {
        match self.remaining() {
            None => -1,
            Some(remaining) => {
                let mut millis = remaining.as_millis();
                if remaining.subsec_nanos() % 1_000_000 != 0 {
                    millis += 1;
                }

                i32::try_from(millis).unwrap_or(i32::MAX)
            }
        }
    }
}
