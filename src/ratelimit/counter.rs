//! Sliding-window counter.
//!
//! A generic admission primitive: given a key, a window duration and a
//! maximum event count, it decides in one atomic store step whether a new
//! event is admitted. It knows nothing about users or quota tiers.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};
use uuid::Uuid;

use super::backend::{AdmitRequest, Occupancy, WindowStore};
use super::clock::{to_datetime, Clock, SystemClock};
use super::window::KEY_EXPIRY_MARGIN;
use crate::error::{QuotaError, Result};

/// Result of one admit step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Whether the event was recorded
    pub admitted: bool,
    /// Events inside the window after the step
    pub occupancy: u64,
    /// Oldest event still inside the window
    pub oldest: Option<i64>,
    /// Members inserted by this step; empty when denied
    pub members: Vec<String>,
}

impl Admission {
    /// When the oldest counted event falls out of a window of `window` length.
    pub fn reset_time(&self, window: Duration) -> Option<DateTime<Utc>> {
        self.oldest
            .and_then(|oldest| to_datetime(oldest + window.as_secs() as i64))
    }
}

/// A sliding-window counter over a shared window store.
#[derive(Clone)]
pub struct SlidingWindowCounter {
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowCounter {
    /// Create a counter that reads wall-clock time.
    pub fn new(store: Arc<dyn WindowStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Create a counter with an explicit time source.
    pub fn with_clock(store: Arc<dyn WindowStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Current time in epoch seconds as seen by this counter.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Try to record one event under `key`.
    pub async fn try_admit(&self, key: &str, window: Duration, max_events: u64) -> Result<Admission> {
        self.try_admit_many(key, window, max_events, 1).await
    }

    /// Try to record `hits` events under `key`, all or nothing.
    ///
    /// `hits` must be at least one.
    pub async fn try_admit_many(
        &self,
        key: &str,
        window: Duration,
        max_events: u64,
        hits: u32,
    ) -> Result<Admission> {
        if hits == 0 {
            return Err(QuotaError::InvalidRequest(format!(
                "hits must be at least 1 for key {}",
                key
            )));
        }

        let now = self.clock.now();
        let members: Vec<String> = (0..hits).map(|_| event_member(now)).collect();

        let request = AdmitRequest {
            key,
            window_secs: window.as_secs() as i64,
            max_events,
            now,
            ttl_secs: (window + KEY_EXPIRY_MARGIN).as_secs() as i64,
            members: &members,
        };

        trace!(
            key = %key,
            hits = members.len(),
            limit = max_events,
            "Checking sliding window"
        );

        let outcome = self.store.try_admit(&request).await?;

        if !outcome.admitted {
            debug!(
                key = %key,
                occupancy = outcome.occupancy,
                limit = max_events,
                "Sliding window full"
            );
        }

        Ok(Admission {
            admitted: outcome.admitted,
            occupancy: outcome.occupancy,
            oldest: outcome.oldest,
            members: if outcome.admitted { members } else { Vec::new() },
        })
    }

    /// Read the current occupancy of `key` without recording anything.
    pub async fn peek(&self, key: &str, window: Duration) -> Result<Occupancy> {
        self.store
            .peek(key, window.as_secs() as i64, self.clock.now())
            .await
    }

    /// Remove the events an earlier admission recorded.
    pub async fn release(&self, key: &str, admission: &Admission) -> Result<()> {
        if admission.members.is_empty() {
            return Ok(());
        }
        trace!(key = %key, released = admission.members.len(), "Releasing admitted events");
        self.store.release(key, &admission.members).await
    }

    /// Delete every event recorded under `key`.
    pub async fn clear(&self, key: &str) -> Result<()> {
        self.store.clear(key).await
    }
}

/// Unique sorted-set member for an event admitted at `now`.
///
/// The random suffix keeps two events in the same second from collapsing
/// into one record.
fn event_member(now: i64) -> String {
    format!("{}-{}", now, Uuid::new_v4().simple())
}
