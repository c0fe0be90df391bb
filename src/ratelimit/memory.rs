//! In-process window store.
//!
//! Correct within a single process only: each key's step runs under that
//! key's map shard lock, which is never held across an `.await`.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::backend::{AdmitOutcome, AdmitRequest, Occupancy, WindowStore};
use super::clock::Clock;
use crate::error::Result;

/// Events of one window plus the key's expiry deadline.
#[derive(Debug, Default)]
struct WindowEntry {
    /// (timestamp, member), ordered by timestamp like a sorted set
    events: BTreeSet<(i64, String)>,
    expires_at: i64,
}

impl WindowEntry {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    fn oldest(&self) -> Option<i64> {
        self.events.first().map(|(ts, _)| *ts)
    }
}

/// Window store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryWindowStore {
    windows: DashMap<String, WindowEntry>,
}

impl MemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds until `key` expires, or `None` if it does not exist.
    pub fn ttl(&self, key: &str, now: i64) -> Option<i64> {
        self.windows
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.expires_at - now)
    }

    /// Whether `key` currently exists.
    pub fn contains_key(&self, key: &str, now: i64) -> bool {
        self.ttl(key, now).is_some()
    }

    /// Number of stored records under `key`, including any not yet pruned.
    pub fn stored_len(&self, key: &str, now: i64) -> usize {
        self.windows
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.events.len())
            .unwrap_or(0)
    }

    /// Get the number of stored keys, expired or not.
    pub fn key_count(&self) -> usize {
        self.windows.len()
    }

    /// Drop every expired key. Returns how many were removed.
    pub fn purge_expired(&self, now: i64) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(removed = removed, "Purged expired windows");
        }
        removed
    }

    /// Periodically purge expired keys until the returned task is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, clock: Arc<dyn Clock>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                self.purge_expired(clock.now());
            }
        })
    }
}

#[async_trait]
impl WindowStore for MemoryWindowStore {
    async fn try_admit(&self, request: &AdmitRequest<'_>) -> Result<AdmitOutcome> {
        let cutoff = request.cutoff();
        let hits = request.members.len() as u64;

        let (outcome, now_empty) = {
            let mut entry = self.windows.entry(request.key.to_string()).or_default();

            if entry.is_expired(request.now) {
                entry.events.clear();
            }
            entry.events = entry.events.split_off(&(cutoff, String::new()));

            let count = entry.events.len() as u64;
            let admitted = count + hits <= request.max_events;
            if admitted {
                for member in request.members {
                    entry.events.insert((request.now, member.clone()));
                }
            }
            entry.expires_at = request.now + request.ttl_secs;

            trace!(
                key = %request.key,
                occupancy = entry.events.len(),
                admitted = admitted,
                "Applied admit step"
            );

            (
                AdmitOutcome {
                    admitted,
                    occupancy: entry.events.len() as u64,
                    oldest: entry.oldest(),
                },
                entry.events.is_empty(),
            )
        };

        // An empty sorted set does not exist in Redis either.
        if now_empty {
            self.windows.remove_if(request.key, |_, entry| entry.events.is_empty());
        }

        Ok(outcome)
    }

    async fn peek(&self, key: &str, window_secs: i64, now: i64) -> Result<Occupancy> {
        let cutoff = now - window_secs;
        let occupancy = match self.windows.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                let mut live = entry.events.range((cutoff, String::new())..);
                let oldest = live.next().map(|(ts, _)| *ts);
                let count = oldest.map(|_| 1 + live.count() as u64).unwrap_or(0);
                Occupancy { count, oldest }
            }
            _ => Occupancy::default(),
        };
        Ok(occupancy)
    }

    async fn release(&self, key: &str, members: &[String]) -> Result<()> {
        if let Some(mut entry) = self.windows.get_mut(key) {
            entry.events.retain(|(_, member)| !members.contains(member));
        }
        self.windows.remove_if(key, |_, entry| entry.events.is_empty());
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.windows.remove(key);
        Ok(())
    }
}
