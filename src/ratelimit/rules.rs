//! Quota rules: per-window limits and the named policies for ambiguous cases.
//!
//! Rules are read as the `quota` section of the service configuration:
//!
//! ```yaml
//! daily_limit: 20
//! weekly_limit: 100
//! on_store_failure: propagate
//! on_weekly_denial: rollback_daily
//! ```

use serde::{Deserialize, Serialize};

use super::window::WindowKind;
use crate::error::{QuotaError, Result};

/// What a check does when the window store cannot complete its step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailurePolicy {
    /// Return the store error to the caller
    #[default]
    Propagate,
    /// Allow the AI call and log a warning
    FailOpen,
    /// Deny the AI call with an `unavailable` result and log an error
    FailClosed,
}

/// What happens to the daily event when the weekly window denies a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeeklyDenialPolicy {
    /// Remove the daily event again, so a denied check records nothing
    #[default]
    RollbackDaily,
    /// Keep the daily event, counting the denied check against the day
    RetainDaily,
}

/// Limits and policies for the two-tier AI quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRules {
    /// Events allowed per rolling day
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u64,

    /// Events allowed per rolling week
    #[serde(default = "default_weekly_limit")]
    pub weekly_limit: u64,

    #[serde(default)]
    pub on_store_failure: StoreFailurePolicy,

    #[serde(default)]
    pub on_weekly_denial: WeeklyDenialPolicy,
}

impl Default for QuotaRules {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            weekly_limit: default_weekly_limit(),
            on_store_failure: StoreFailurePolicy::default(),
            on_weekly_denial: WeeklyDenialPolicy::default(),
        }
    }
}

fn default_daily_limit() -> u64 {
    20
}

fn default_weekly_limit() -> u64 {
    100
}

impl QuotaRules {
    /// Both limits must admit at least one event.
    pub fn validate(&self) -> Result<()> {
        if self.daily_limit == 0 || self.weekly_limit == 0 {
            return Err(QuotaError::Config(
                "daily_limit and weekly_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the limit configured for a window.
    pub fn limit(&self, kind: WindowKind) -> u64 {
        match kind {
            WindowKind::Daily => self.daily_limit,
            WindowKind::Weekly => self.weekly_limit,
        }
    }
}
