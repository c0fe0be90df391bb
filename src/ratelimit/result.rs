//! Values returned to AI-invoking callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ALLOWED_MESSAGE: &str = "AI request allowed";
pub const DAILY_EXCEEDED_MESSAGE: &str = "Daily AI limit exceeded";
pub const WEEKLY_EXCEEDED_MESSAGE: &str = "Weekly AI limit exceeded";
pub const UNAVAILABLE_MESSAGE: &str = "AI quota temporarily unavailable";

/// Which tier decided a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitType {
    Allowed,
    Daily,
    Weekly,
    /// The store failed and the fail-closed policy denied the check
    Unavailable,
}

impl LimitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitType::Allowed => "allowed",
            LimitType::Daily => "daily",
            LimitType::Weekly => "weekly",
            LimitType::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for LimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict of one quota check. Computed per call and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitResult {
    pub allowed: bool,
    pub limit_type: LimitType,
    pub daily_remaining: u64,
    pub weekly_remaining: u64,
    pub message: String,
    /// When the limiting window next frees a slot; only set when denied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<DateTime<Utc>>,
    /// Seconds from the check until `reset_time`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl LimitResult {
    pub fn allowed(daily_remaining: u64, weekly_remaining: u64) -> Self {
        Self {
            allowed: true,
            limit_type: LimitType::Allowed,
            daily_remaining,
            weekly_remaining,
            message: ALLOWED_MESSAGE.to_string(),
            reset_time: None,
            retry_after_secs: None,
        }
    }

    pub fn denied(
        limit_type: LimitType,
        daily_remaining: u64,
        weekly_remaining: u64,
        reset_time: Option<DateTime<Utc>>,
        now: i64,
    ) -> Self {
        let message = match limit_type {
            LimitType::Daily => DAILY_EXCEEDED_MESSAGE,
            LimitType::Weekly => WEEKLY_EXCEEDED_MESSAGE,
            LimitType::Unavailable | LimitType::Allowed => UNAVAILABLE_MESSAGE,
        };
        Self {
            allowed: false,
            limit_type,
            daily_remaining,
            weekly_remaining,
            message: message.to_string(),
            reset_time,
            retry_after_secs: reset_time.map(|reset| (reset.timestamp() - now).max(0) as u64),
        }
    }
}

/// Read-only usage of both windows for one (user, operation type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaUsage {
    pub daily_used: u64,
    pub daily_remaining: u64,
    pub weekly_used: u64,
    pub weekly_remaining: u64,
    /// When the oldest daily event leaves the window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_reset_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly_reset_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_denied_retry_after() {
        let reset = Utc.timestamp_opt(1_000, 0).unwrap();
        let result = LimitResult::denied(LimitType::Daily, 0, 40, Some(reset), 940);
        assert_eq!(result.message, DAILY_EXCEEDED_MESSAGE);
        assert_eq!(result.retry_after_secs, Some(60));

        // A reset already in the past never yields a negative wait.
        let result = LimitResult::denied(LimitType::Weekly, 3, 0, Some(reset), 1_100);
        assert_eq!(result.retry_after_secs, Some(0));
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(LimitResult::allowed(19, 99)).unwrap();
        assert_eq!(json["allowed"], true);
        assert_eq!(json["limitType"], "allowed");
        assert_eq!(json["dailyRemaining"], 19);
        assert_eq!(json["weeklyRemaining"], 99);
        assert!(json.get("resetTime").is_none());
    }
}
