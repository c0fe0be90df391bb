//! Window store trait for abstracting Redis and in-process implementations.

use async_trait::async_trait;

use crate::error::Result;

/// One atomic "prune, count, conditionally insert, expire" step.
#[derive(Debug, Clone)]
pub struct AdmitRequest<'a> {
    /// Store key of the window
    pub key: &'a str,
    /// Window length in seconds
    pub window_secs: i64,
    /// Maximum events allowed inside the window
    pub max_events: u64,
    /// Current time in epoch seconds
    pub now: i64,
    /// Expiry applied to the key after the step, admitted or not
    pub ttl_secs: i64,
    /// Members to insert if admitted, all scored `now`
    pub members: &'a [String],
}

impl AdmitRequest<'_> {
    /// Records older than this are discarded.
    pub fn cutoff(&self) -> i64 {
        self.now - self.window_secs
    }
}

/// What the store observed while executing an `AdmitRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmitOutcome {
    pub admitted: bool,
    /// Records inside the window after the step
    pub occupancy: u64,
    /// Smallest surviving timestamp, including any new records
    pub oldest: Option<i64>,
}

/// A read-only view of one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Occupancy {
    pub count: u64,
    pub oldest: Option<i64>,
}

/// Trait for window store implementations.
///
/// Implementations must run `try_admit` as one indivisible step per key.
/// Separate round-trips race: two callers can both see `max_events - 1`
/// records and both insert.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Prune, count and conditionally insert in one atomic step.
    async fn try_admit(&self, request: &AdmitRequest<'_>) -> Result<AdmitOutcome>;

    /// Count records with timestamp >= `now - window_secs` without mutating.
    async fn peek(&self, key: &str, window_secs: i64, now: i64) -> Result<Occupancy>;

    /// Remove specific members from a window.
    async fn release(&self, key: &str, members: &[String]) -> Result<()>;

    /// Delete a window entirely.
    async fn clear(&self, key: &str) -> Result<()>;
}
