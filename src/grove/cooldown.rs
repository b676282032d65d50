//! Time-lock primitive shared by check-ins and tree resets.

use chrono::{DateTime, Duration, Utc};

use super::errors::GroveError;

/// Minimum gap between two check-ins on the same tree.
pub const CHECK_IN_WINDOW_MINUTES: i64 = 60;

/// Minimum gap between two resets of the same tree.
pub const RESET_WINDOW_HOURS: i64 = 24;

/// Outcome of a cooldown check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownStatus {
    pub allowed: bool,
    /// Zero whenever `allowed` is true.
    pub remaining: Duration,
}

impl CooldownStatus {
    /// Convert a refusal into `CooldownActive` carrying the remaining time.
    pub fn into_result(self) -> Result<(), GroveError> {
        if self.allowed {
            Ok(())
        } else {
            Err(GroveError::CooldownActive {
                remaining: self.remaining,
            })
        }
    }
}

/// A named cooldown window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownGate {
    window: Duration,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn check_in() -> Self {
        Self::new(Duration::minutes(CHECK_IN_WINDOW_MINUTES))
    }

    pub fn reset() -> Self {
        Self::new(Duration::hours(RESET_WINDOW_HOURS))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn status_at(&self, last_action_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> CooldownStatus {
        can_act_at(last_action_at, self.window, now)
    }

    pub fn status(&self, last_action_at: Option<DateTime<Utc>>) -> CooldownStatus {
        self.status_at(last_action_at, Utc::now())
    }
}

/// Decide whether an action last taken at `last_action_at` may run again at `now`.
///
/// A timestamp in the future (clock skew) counts as zero elapsed time.
pub fn can_act_at(
    last_action_at: Option<DateTime<Utc>>,
    window: Duration,
    now: DateTime<Utc>,
) -> CooldownStatus {
    let Some(last) = last_action_at else {
        return CooldownStatus {
            allowed: true,
            remaining: Duration::zero(),
        };
    };
    let elapsed = now.signed_duration_since(last).max(Duration::zero());
    if elapsed >= window {
        CooldownStatus {
            allowed: true,
            remaining: Duration::zero(),
        }
    } else {
        CooldownStatus {
            allowed: false,
            remaining: window - elapsed,
        }
    }
}

pub fn can_act(last_action_at: Option<DateTime<Utc>>, window: Duration) -> CooldownStatus {
    can_act_at(last_action_at, window, Utc::now())
}
