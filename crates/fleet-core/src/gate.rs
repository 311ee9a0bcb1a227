use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{FleetError, Result};
use crate::interaction::Member;
use crate::message::ActionMessage;

// ---------------------------------------------------------------------------
// RoleGate
// ---------------------------------------------------------------------------

/// Admits members holding one configured role. Checked on every click,
/// never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGate {
    role: String,
}

impl RoleGate {
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into() }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn admits(&self, member: &Member) -> bool {
        member.has_role(&self.role)
    }

    /// `Ok` when `member` may `action`, otherwise [`FleetError::RoleDenied`].
    pub fn check(&self, member: &Member, action: &str) -> Result<()> {
        if self.admits(member) {
            Ok(())
        } else {
            Err(FleetError::RoleDenied {
                role: self.role.clone(),
                action: action.to_string(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// DebounceWindow
// ---------------------------------------------------------------------------

/// Minimum spacing between two evaluations of the same message, measured
/// from a timestamp the message itself carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceWindow {
    window: Duration,
}

impl Default for DebounceWindow {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl DebounceWindow {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Time left before another attempt is allowed, or `None` when one is
    /// allowed now. A missing stamp or one in the future (clock skew)
    /// never blocks.
    pub fn remaining(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<Duration> {
        let last = last?;
        let elapsed = now.signed_duration_since(last).to_std().ok()?;
        self.window.checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    /// Rate-limit a click on `message` using the stamp in `field`.
    pub fn check(&self, message: &ActionMessage, field: &str, now: DateTime<Utc>) -> Result<()> {
        match self.remaining(message.timestamp(field), now) {
            Some(remaining) => Err(FleetError::RateLimited { remaining }),
            None => Ok(()),
        }
    }
}
