//! # Timeout behaviour of a mini-app execution.
//!
//! [`TimeoutBehavior`] decides what the manifest's `timeout_seconds` means.
//!
//! ```text
//! TimeoutBehavior::Return   → deadline armed; on expiry the stop signal is set,
//!                             the execution becomes TimedOut and gets the grace
//!                             period to return (default)
//! TimeoutBehavior::Continue → no deadline; the app runs until it returns or is
//!                             pre-empted by another launch
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Policy applied when an execution reaches its `timeout_seconds`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutBehavior {
    /// Signal the app to stop and return to idle (default).
    #[default]
    Return,
    /// Keep running; the timeout is not enforced.
    Continue,
}

impl TimeoutBehavior {
    /// Parses the manifest value; `None` for anything unknown.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "return" => Some(TimeoutBehavior::Return),
            "continue" => Some(TimeoutBehavior::Continue),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeoutBehavior::Return => "return",
            TimeoutBehavior::Continue => "continue",
        }
    }

    /// Deadline to arm for an execution with the given timeout.
    ///
    /// - `Return` → `Some(timeout)`
    /// - `Continue` → `None`
    #[inline]
    pub fn deadline(self, timeout: Duration) -> Option<Duration> {
        match self {
            TimeoutBehavior::Return => Some(timeout),
            TimeoutBehavior::Continue => None,
        }
    }
}

impl fmt::Display for TimeoutBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
