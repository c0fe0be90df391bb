//! Window kinds used by the quota policy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Extra lifetime given to a window key beyond its window duration.
///
/// An idle key outlives its newest event by at least this margin, so expiry
/// never truncates a window that is still in use.
pub const KEY_EXPIRY_MARGIN: Duration = Duration::from_secs(3600);

/// Kind of sliding window a quota is enforced over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    /// Rolling 24 hours
    Daily,
    /// Rolling 7 days
    Weekly,
}

impl WindowKind {
    /// Get the duration of this window.
    pub fn duration(&self) -> Duration {
        match self {
            WindowKind::Daily => Duration::from_secs(86_400),
            WindowKind::Weekly => Duration::from_secs(7 * 86_400),
        }
    }

    /// Name used in store keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowKind::Daily => "daily",
            WindowKind::Weekly => "weekly",
        }
    }

    /// Expiry applied to keys of this window on every check.
    pub fn key_ttl(&self) -> Duration {
        self.duration() + KEY_EXPIRY_MARGIN
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
