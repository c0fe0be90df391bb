//! Two-tier AI quota policy.
//!
//! Every check runs the sliding-window counter against the daily window and,
//! if that admits, against the weekly window of the same (user, operation
//! type). Daily is checked first, so it is reported when both are exhausted.

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::counter::SlidingWindowCounter;
use super::key::{WindowKey, DEFAULT_OPERATION_TYPE};
use super::result::{LimitResult, LimitType, QuotaUsage};
use super::rules::{QuotaRules, StoreFailurePolicy, WeeklyDenialPolicy};
use super::window::WindowKind;
use crate::error::{QuotaError, Result};

/// The AI quota policy that callers consult before every AI call.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct QuotaPolicy {
    counter: SlidingWindowCounter,
    rules: RwLock<QuotaRules>,
}

impl QuotaPolicy {
    /// Create a policy with the default rules.
    pub fn new(counter: SlidingWindowCounter) -> Self {
        Self::with_rules(counter, QuotaRules::default())
    }

    /// Create a policy with explicit rules.
    pub fn with_rules(counter: SlidingWindowCounter, rules: QuotaRules) -> Self {
        Self {
            counter,
            rules: RwLock::new(rules),
        }
    }

    /// Replace the rules used by subsequent checks.
    ///
    /// Invalid rules are rejected and the current ones stay in force.
    pub fn set_rules(&self, rules: QuotaRules) -> Result<()> {
        rules.validate()?;
        let mut current = self.rules.write();
        *current = rules;
        Ok(())
    }

    /// Get the current rules.
    pub fn rules(&self) -> QuotaRules {
        self.rules.read().clone()
    }

    /// Get the underlying counter.
    pub fn counter(&self) -> &SlidingWindowCounter {
        &self.counter
    }

    /// Check the quota for the `general` operation type.
    pub async fn check_general(&self, user_id: &str) -> Result<LimitResult> {
        self.check_limit(user_id, DEFAULT_OPERATION_TYPE).await
    }

    /// Check and, if allowed, consume one unit of the user's quota.
    ///
    /// Failures of the two admit steps are handled according to the
    /// configured [`StoreFailurePolicy`]. Once an admit step has denied the
    /// check, later store failures only degrade the reported remainders.
    pub async fn check_limit(&self, user_id: &str, operation_type: &str) -> Result<LimitResult> {
        let rules = self.rules();
        let daily_key = WindowKey::new(WindowKind::Daily, operation_type, user_id).to_store_key();
        let weekly_key = WindowKey::new(WindowKind::Weekly, operation_type, user_id).to_store_key();
        let daily_window = WindowKind::Daily.duration();
        let weekly_window = WindowKind::Weekly.duration();
        let daily_limit = rules.limit(WindowKind::Daily);
        let weekly_limit = rules.limit(WindowKind::Weekly);

        let daily = match self.counter.try_admit(&daily_key, daily_window, daily_limit).await {
            Ok(admission) => admission,
            Err(e) => return self.on_store_failure(e, user_id, operation_type, &rules),
        };

        if !daily.admitted {
            debug!(
                user_id = %user_id,
                operation_type = %operation_type,
                occupancy = daily.occupancy,
                limit = daily_limit,
                "Daily AI limit exceeded"
            );
            let weekly_remaining = match self.counter.peek(&weekly_key, weekly_window).await {
                Ok(weekly) => weekly_limit.saturating_sub(weekly.count),
                Err(e) => {
                    warn!(
                        user_id = %user_id,
                        operation_type = %operation_type,
                        error = %e,
                        "Could not read weekly usage, reporting none remaining"
                    );
                    0
                }
            };
            return Ok(LimitResult::denied(
                LimitType::Daily,
                0,
                weekly_remaining,
                daily.reset_time(daily_window),
                self.counter.now(),
            ));
        }

        let weekly = match self.counter.try_admit(&weekly_key, weekly_window, weekly_limit).await {
            Ok(admission) => admission,
            Err(e) => return self.on_store_failure(e, user_id, operation_type, &rules),
        };

        if !weekly.admitted {
            let daily_occupancy = match rules.on_weekly_denial {
                WeeklyDenialPolicy::RollbackDaily => {
                    match self.counter.release(&daily_key, &daily).await {
                        Ok(()) => daily.occupancy.saturating_sub(daily.members.len() as u64),
                        Err(e) => {
                            warn!(
                                user_id = %user_id,
                                operation_type = %operation_type,
                                error = %e,
                                "Could not roll back daily event, it stays counted"
                            );
                            daily.occupancy
                        }
                    }
                }
                WeeklyDenialPolicy::RetainDaily => daily.occupancy,
            };
            debug!(
                user_id = %user_id,
                operation_type = %operation_type,
                occupancy = weekly.occupancy,
                limit = weekly_limit,
                policy = ?rules.on_weekly_denial,
                "Weekly AI limit exceeded"
            );
            return Ok(LimitResult::denied(
                LimitType::Weekly,
                daily_limit.saturating_sub(daily_occupancy),
                0,
                weekly.reset_time(weekly_window),
                self.counter.now(),
            ));
        }

        Ok(LimitResult::allowed(
            daily_limit.saturating_sub(daily.occupancy),
            weekly_limit.saturating_sub(weekly.occupancy),
        ))
    }

    fn on_store_failure(
        &self,
        err: QuotaError,
        user_id: &str,
        operation_type: &str,
        rules: &QuotaRules,
    ) -> Result<LimitResult> {
        match rules.on_store_failure {
            StoreFailurePolicy::Propagate => {
                error!(
                    user_id = %user_id,
                    operation_type = %operation_type,
                    error = %err,
                    "AI quota check failed"
                );
                Err(err)
            }
            StoreFailurePolicy::FailOpen => {
                warn!(
                    user_id = %user_id,
                    operation_type = %operation_type,
                    error = %err,
                    "AI quota store unavailable, allowing request"
                );
                Ok(LimitResult::allowed(
                    rules.limit(WindowKind::Daily),
                    rules.limit(WindowKind::Weekly),
                ))
            }
            StoreFailurePolicy::FailClosed => {
                error!(
                    user_id = %user_id,
                    operation_type = %operation_type,
                    error = %err,
                    "AI quota store unavailable, denying request"
                );
                Ok(LimitResult::denied(
                    LimitType::Unavailable,
                    0,
                    0,
                    None,
                    self.counter.now(),
                ))
            }
        }
    }

    /// Report current usage of both windows without consuming quota.
    pub async fn usage(&self, user_id: &str, operation_type: &str) -> Result<QuotaUsage> {
        let rules = self.rules();
        let daily_key = WindowKey::new(WindowKind::Daily, operation_type, user_id).to_store_key();
        let weekly_key = WindowKey::new(WindowKind::Weekly, operation_type, user_id).to_store_key();
        let daily_window = WindowKind::Daily.duration();
        let weekly_window = WindowKind::Weekly.duration();

        let (daily, weekly) = futures::try_join!(
            self.counter.peek(&daily_key, daily_window),
            self.counter.peek(&weekly_key, weekly_window)
        )?;

        let reset = |oldest: Option<i64>, window: std::time::Duration| {
            oldest.and_then(|ts| super::clock::to_datetime(ts + window.as_secs() as i64))
        };

        Ok(QuotaUsage {
            daily_used: daily.count,
            daily_remaining: rules.limit(WindowKind::Daily).saturating_sub(daily.count),
            weekly_used: weekly.count,
            weekly_remaining: rules.limit(WindowKind::Weekly).saturating_sub(weekly.count),
            daily_reset_time: reset(daily.oldest, daily_window),
            weekly_reset_time: reset(weekly.oldest, weekly_window),
        })
    }

    /// Forget every recorded event for a (user, operation type).
    pub async fn reset(&self, user_id: &str, operation_type: &str) -> Result<()> {
        for kind in [WindowKind::Daily, WindowKind::Weekly] {
            let key = WindowKey::new(kind, operation_type, user_id).to_store_key();
            self.counter.clear(&key).await?;
        }
        info!(
            user_id = %user_id,
            operation_type = %operation_type,
            "AI quota reset"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::backend::{AdmitOutcome, AdmitRequest, Occupancy, WindowStore};
    use crate::ratelimit::clock::{Clock, ManualClock};
    use crate::ratelimit::memory::MemoryWindowStore;
    use crate::ratelimit::window::KEY_EXPIRY_MARGIN;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    const DAY: Duration = Duration::from_secs(86_400);
    const WEEK: Duration = Duration::from_secs(7 * 86_400);

    struct Fixture {
        policy: Arc<QuotaPolicy>,
        clock: Arc<ManualClock>,
        store: Arc<MemoryWindowStore>,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_rules(QuotaRules::default())
        }

        fn with_rules(rules: QuotaRules) -> Self {
            let clock = Arc::new(ManualClock::starting_now());
            let store = Arc::new(MemoryWindowStore::new());
            let counter = SlidingWindowCounter::with_clock(store.clone(), clock.clone());
            Self {
                policy: Arc::new(QuotaPolicy::with_rules(counter, rules)),
                clock,
                store,
            }
        }

        fn key(&self, kind: WindowKind, operation_type: &str, user_id: &str) -> String {
            WindowKey::new(kind, operation_type, user_id).to_store_key()
        }

        async fn occupancy(&self, kind: WindowKind, user_id: &str) -> u64 {
            let key = self.key(kind, DEFAULT_OPERATION_TYPE, user_id);
            self.store
                .peek(&key, kind.duration().as_secs() as i64, self.clock.now())
                .await
                .unwrap()
                .count
        }

        /// Record `n` weekly events one second apart starting `ago` before now.
        async fn seed_weekly(&self, user_id: &str, n: u64, ago: Duration) {
            let now = self.clock.now();
            let key = self.key(WindowKind::Weekly, DEFAULT_OPERATION_TYPE, user_id);
            self.clock.rewind(ago);
            for _ in 0..n {
                let admission = self.policy.counter().try_admit(&key, WEEK, n).await.unwrap();
                assert!(admission.admitted);
                self.clock.advance(Duration::from_secs(1));
            }
            self.clock.set(now);
        }
    }

    struct UnreachableStore;

    fn connection_refused() -> QuotaError {
        QuotaError::Store(redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        )))
    }

    #[async_trait]
    impl WindowStore for UnreachableStore {
        async fn try_admit(&self, _request: &AdmitRequest<'_>) -> Result<AdmitOutcome> {
            Err(connection_refused())
        }

        async fn peek(&self, _key: &str, _window_secs: i64, _now: i64) -> Result<Occupancy> {
            Err(connection_refused())
        }

        async fn release(&self, _key: &str, _members: &[String]) -> Result<()> {
            Err(connection_refused())
        }

        async fn clear(&self, _key: &str) -> Result<()> {
            Err(connection_refused())
        }
    }

    /// Memory store whose follow-up reads or rollbacks fail.
    struct FlakyStore {
        inner: MemoryWindowStore,
        fail_peek: bool,
        fail_release: bool,
    }

    #[async_trait]
    impl WindowStore for FlakyStore {
        async fn try_admit(&self, request: &AdmitRequest<'_>) -> Result<AdmitOutcome> {
            self.inner.try_admit(request).await
        }

        async fn peek(&self, key: &str, window_secs: i64, now: i64) -> Result<Occupancy> {
            if self.fail_peek {
                return Err(connection_refused());
            }
            self.inner.peek(key, window_secs, now).await
        }

        async fn release(&self, key: &str, members: &[String]) -> Result<()> {
            if self.fail_release {
                return Err(connection_refused());
            }
            self.inner.release(key, members).await
        }

        async fn clear(&self, key: &str) -> Result<()> {
            self.inner.clear(key).await
        }
    }

    fn flaky_policy(
        fail_peek: bool,
        fail_release: bool,
        on_store_failure: StoreFailurePolicy,
    ) -> (QuotaPolicy, Arc<FlakyStore>) {
        let store = Arc::new(FlakyStore {
            inner: MemoryWindowStore::new(),
            fail_peek,
            fail_release,
        });
        let rules = QuotaRules {
            on_store_failure,
            ..QuotaRules::default()
        };
        let counter = SlidingWindowCounter::new(store.clone());
        (QuotaPolicy::with_rules(counter, rules), store)
    }

    fn unreachable_policy(on_store_failure: StoreFailurePolicy) -> QuotaPolicy {
        let counter = SlidingWindowCounter::new(Arc::new(UnreachableStore));
        QuotaPolicy::with_rules(
            counter,
            QuotaRules {
                on_store_failure,
                ..QuotaRules::default()
            },
        )
    }

    #[tokio::test]
    async fn test_first_check_is_allowed() {
        let fx = Fixture::new();

        let result = fx.policy.check_general("user-allowed-1").await.unwrap();
        assert!(result.allowed);
        assert_eq!(result.limit_type, LimitType::Allowed);
        assert_eq!(result.daily_remaining, 19);
        assert_eq!(result.weekly_remaining, 99);
        assert_eq!(result.message, "AI request allowed");
        assert!(result.reset_time.is_none());
    }

    #[tokio::test]
    async fn test_daily_limit_exceeded() {
        let fx = Fixture::new();
        let now = fx.clock.now();

        for i in 0..20 {
            let result = fx.policy.check_general("user-daily-1").await.unwrap();
            assert!(result.allowed, "request {} should be allowed", i + 1);
        }

        let blocked = fx.policy.check_general("user-daily-1").await.unwrap();
        assert!(!blocked.allowed);
        assert_eq!(blocked.limit_type, LimitType::Daily);
        assert_eq!(blocked.daily_remaining, 0);
        assert_eq!(blocked.weekly_remaining, 80);
        assert!(blocked.message.contains("Daily AI limit exceeded"));

        let reset = blocked.reset_time.unwrap().timestamp();
        assert!(reset > now && reset <= now + DAY.as_secs() as i64);
    }

    #[tokio::test]
    async fn test_weekly_limit_exceeded_with_no_daily_usage() {
        let fx = Fixture::new();
        let now = fx.clock.now();
        let two_days = Duration::from_secs(2 * 86_400);
        fx.seed_weekly("user-weekly-1", 100, two_days).await;
        assert_eq!(fx.occupancy(WindowKind::Daily, "user-weekly-1").await, 0);

        let result = fx.policy.check_general("user-weekly-1").await.unwrap();
        assert!(!result.allowed);
        assert_eq!(result.limit_type, LimitType::Weekly);
        assert_eq!(result.weekly_remaining, 0);
        assert_eq!(result.daily_remaining, 20);
        assert!(result.message.contains("Weekly AI limit exceeded"));

        let oldest = now - two_days.as_secs() as i64;
        assert_eq!(
            result.reset_time.unwrap().timestamp(),
            oldest + WEEK.as_secs() as i64
        );
        assert_eq!(fx.occupancy(WindowKind::Daily, "user-weekly-1").await, 0);
    }

    #[tokio::test]
    async fn test_weekly_denial_can_retain_daily_event() {
        let fx = Fixture::with_rules(QuotaRules {
            on_weekly_denial: WeeklyDenialPolicy::RetainDaily,
            ..QuotaRules::default()
        });
        fx.seed_weekly("user-weekly-2", 100, Duration::from_secs(2 * 86_400)).await;

        let result = fx.policy.check_general("user-weekly-2").await.unwrap();
        assert_eq!(result.limit_type, LimitType::Weekly);
        assert_eq!(result.daily_remaining, 19);
        assert_eq!(fx.occupancy(WindowKind::Daily, "user-weekly-2").await, 1);
    }

    #[tokio::test]
    async fn test_daily_checked_before_weekly() {
        let fx = Fixture::with_rules(QuotaRules {
            daily_limit: 2,
            weekly_limit: 2,
            ..QuotaRules::default()
        });

        fx.policy.check_general("user-tie").await.unwrap();
        fx.policy.check_general("user-tie").await.unwrap();

        let result = fx.policy.check_general("user-tie").await.unwrap();
        assert_eq!(result.limit_type, LimitType::Daily);
        assert_eq!(result.weekly_remaining, 0);
    }

    #[tokio::test]
    async fn test_operation_type_namespaces_keys() {
        let fx = Fixture::new();
        let now = fx.clock.now();
        let chat_daily = fx.key(WindowKind::Daily, "chat", "user-keytest-1");
        let chat_weekly = fx.key(WindowKind::Weekly, "chat", "user-keytest-1");
        let general_daily = fx.key(WindowKind::Daily, "general", "user-keytest-1");

        let result = fx.policy.check_limit("user-keytest-1", "chat").await.unwrap();
        assert!(result.allowed);
        assert!(fx.store.contains_key(&chat_daily, now));
        assert!(fx.store.contains_key(&chat_weekly, now));
        assert!(!fx.store.contains_key(&general_daily, now));

        fx.policy.check_general("user-keytest-1").await.unwrap();
        assert_eq!(fx.store.stored_len(&chat_daily, now), 1);
        assert_eq!(fx.store.stored_len(&general_daily, now), 1);
    }

    #[tokio::test]
    async fn test_keys_expire_after_window_plus_margin() {
        let fx = Fixture::new();
        let now = fx.clock.now();

        fx.policy.check_general("user-ttl-1").await.unwrap();

        let daily_ttl = fx
            .store
            .ttl(&fx.key(WindowKind::Daily, "general", "user-ttl-1"), now)
            .unwrap();
        let weekly_ttl = fx
            .store
            .ttl(&fx.key(WindowKind::Weekly, "general", "user-ttl-1"), now)
            .unwrap();
        assert!(daily_ttl > 0 && daily_ttl <= (DAY + KEY_EXPIRY_MARGIN).as_secs() as i64);
        assert!(weekly_ttl > 0 && weekly_ttl <= (WEEK + KEY_EXPIRY_MARGIN).as_secs() as i64);
    }

    #[tokio::test]
    async fn test_reset_time_is_oldest_plus_window() {
        let fx = Fixture::new();
        let now = fx.clock.now();
        let oldest = now - (DAY.as_secs() as i64 - 60);

        fx.clock.set(oldest);
        for _ in 0..20 {
            fx.policy.check_general("user-reset-1").await.unwrap();
            fx.clock.advance(Duration::from_secs(1));
        }
        fx.clock.set(now);

        let blocked = fx.policy.check_general("user-reset-1").await.unwrap();
        assert_eq!(blocked.limit_type, LimitType::Daily);
        let reset = blocked.reset_time.unwrap().timestamp();
        let expected = oldest + DAY.as_secs() as i64;
        assert!((expected - 2..=expected + 2).contains(&reset));
        assert_eq!(blocked.retry_after_secs, Some(60));
    }

    #[tokio::test]
    async fn test_denied_checks_do_not_mutate_occupancy() {
        let fx = Fixture::new();
        for _ in 0..20 {
            fx.policy.check_general("user-idem-1").await.unwrap();
        }
        fx.seed_weekly("user-idem-2", 100, Duration::from_secs(2 * 86_400)).await;

        let daily_before = fx.occupancy(WindowKind::Daily, "user-idem-1").await;
        let weekly_before = fx.occupancy(WindowKind::Weekly, "user-idem-1").await;
        let daily_before_2 = fx.occupancy(WindowKind::Daily, "user-idem-2").await;
        let weekly_before_2 = fx.occupancy(WindowKind::Weekly, "user-idem-2").await;

        for _ in 0..5 {
            assert!(!fx.policy.check_general("user-idem-1").await.unwrap().allowed);
            assert!(!fx.policy.check_general("user-idem-2").await.unwrap().allowed);
        }

        assert_eq!(fx.occupancy(WindowKind::Daily, "user-idem-1").await, daily_before);
        assert_eq!(fx.occupancy(WindowKind::Weekly, "user-idem-1").await, weekly_before);
        assert_eq!(fx.occupancy(WindowKind::Daily, "user-idem-2").await, daily_before_2);
        assert_eq!(fx.occupancy(WindowKind::Weekly, "user-idem-2").await, weekly_before_2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_stay_within_limit() {
        let fx = Fixture::new();
        let callers = 5;
        let calls_each = 5;

        let tasks: Vec<_> = (0..callers)
            .map(|_| {
                let policy = fx.policy.clone();
                tokio::spawn(async move {
                    let mut allowed = 0u64;
                    for _ in 0..calls_each {
                        if policy.check_general("user-concurrent-1").await.unwrap().allowed {
                            allowed += 1;
                        }
                    }
                    allowed
                })
            })
            .collect();

        let mut allowed = 0;
        for result in futures::future::join_all(tasks).await {
            allowed += result.unwrap();
        }

        assert!(allowed >= 1);
        assert!(allowed <= 20);
        let stored = fx.occupancy(WindowKind::Daily, "user-concurrent-1").await;
        assert!(stored >= 1 && stored <= 20);
        assert_eq!(stored, allowed);
    }

    #[tokio::test]
    async fn test_window_slides_after_a_day() {
        let fx = Fixture::new();
        for _ in 0..20 {
            fx.policy.check_general("user-slide-1").await.unwrap();
        }
        assert!(!fx.policy.check_general("user-slide-1").await.unwrap().allowed);

        fx.clock.advance(DAY + Duration::from_secs(1));
        let result = fx.policy.check_general("user-slide-1").await.unwrap();
        assert!(result.allowed);
        assert_eq!(result.daily_remaining, 19);
        assert_eq!(result.weekly_remaining, 79);
    }

    #[tokio::test]
    async fn test_usage_and_reset() {
        let fx = Fixture::new();
        for _ in 0..3 {
            fx.policy.check_limit("user-usage-1", "chat").await.unwrap();
        }

        let usage = fx.policy.usage("user-usage-1", "chat").await.unwrap();
        assert_eq!(usage.daily_used, 3);
        assert_eq!(usage.daily_remaining, 17);
        assert_eq!(usage.weekly_used, 3);
        assert_eq!(usage.weekly_remaining, 97);
        assert_eq!(
            usage.daily_reset_time.unwrap().timestamp(),
            fx.clock.now() + DAY.as_secs() as i64
        );

        // Reading usage records nothing.
        let again = fx.policy.usage("user-usage-1", "chat").await.unwrap();
        assert_eq!(again, usage);

        fx.policy.reset("user-usage-1", "chat").await.unwrap();
        let usage = fx.policy.usage("user-usage-1", "chat").await.unwrap();
        assert_eq!(usage.daily_used, 0);
        assert_eq!(usage.weekly_used, 0);
        assert!(usage.daily_reset_time.is_none());
    }

    #[tokio::test]
    async fn test_rules_can_be_replaced() {
        let fx = Fixture::new();
        fx.policy
            .set_rules(QuotaRules {
                daily_limit: 1,
                ..QuotaRules::default()
            })
            .unwrap();

        assert!(fx.policy.check_general("user-rules-1").await.unwrap().allowed);
        let result = fx.policy.check_general("user-rules-1").await.unwrap();
        assert_eq!(result.limit_type, LimitType::Daily);
        assert_eq!(fx.policy.rules().daily_limit, 1);
    }

    #[tokio::test]
    async fn test_invalid_rules_are_rejected() {
        let fx = Fixture::new();
        let err = assert_err!(fx.policy.set_rules(QuotaRules {
            daily_limit: 0,
            ..QuotaRules::default()
        }));
        assert!(matches!(err, QuotaError::Config(_)));
        assert_eq!(fx.policy.rules().daily_limit, 20);
    }

    #[tokio::test]
    async fn test_store_failure_propagates_by_default() {
        let policy = unreachable_policy(StoreFailurePolicy::Propagate);
        let err = assert_err!(policy.check_general("user-down-1").await);
        assert!(err.is_store_failure());
    }

    #[tokio::test]
    async fn test_store_failure_fail_open() {
        let policy = unreachable_policy(StoreFailurePolicy::FailOpen);
        let result = assert_ok!(policy.check_general("user-down-1").await);
        assert!(result.allowed);
        assert_eq!(result.limit_type, LimitType::Allowed);
        assert_eq!(result.daily_remaining, 20);
        assert_eq!(result.weekly_remaining, 100);
    }

    #[tokio::test]
    async fn test_store_failure_fail_closed() {
        let policy = unreachable_policy(StoreFailurePolicy::FailClosed);
        let result = assert_ok!(policy.check_general("user-down-1").await);
        assert!(!result.allowed);
        assert_eq!(result.limit_type, LimitType::Unavailable);
        assert!(result.reset_time.is_none());
    }

    #[tokio::test]
    async fn test_usage_and_reset_surface_store_failure() {
        let policy = unreachable_policy(StoreFailurePolicy::FailOpen);
        assert_err!(policy.usage("user-down-1", "general").await);
        assert_err!(policy.reset("user-down-1", "general").await);
    }

    #[tokio::test]
    async fn test_failed_weekly_read_keeps_daily_denial() {
        for on_store_failure in [StoreFailurePolicy::FailOpen, StoreFailurePolicy::Propagate] {
            let (policy, _) = flaky_policy(true, false, on_store_failure);

            let mut allowed = 0;
            for _ in 0..30 {
                let result = assert_ok!(policy.check_general("user-flaky-1").await);
                if result.allowed {
                    allowed += 1;
                } else {
                    assert_eq!(result.limit_type, LimitType::Daily);
                    assert_eq!(result.weekly_remaining, 0);
                    assert!(result.reset_time.is_some());
                }
            }
            assert_eq!(allowed, 20, "policy {:?}", on_store_failure);
        }
    }

    #[tokio::test]
    async fn test_failed_rollback_keeps_weekly_denial() {
        for on_store_failure in [StoreFailurePolicy::FailOpen, StoreFailurePolicy::Propagate] {
            let (policy, store) = flaky_policy(false, true, on_store_failure);
            let weekly_key = WindowKey::new(WindowKind::Weekly, DEFAULT_OPERATION_TYPE, "user-flaky-2")
                .to_store_key();
            policy
                .counter()
                .try_admit_many(&weekly_key, WEEK, 100, 100)
                .await
                .unwrap();

            let result = assert_ok!(policy.check_general("user-flaky-2").await);
            assert!(!result.allowed);
            assert_eq!(result.limit_type, LimitType::Weekly);
            assert_eq!(result.weekly_remaining, 0);
            // The daily event could not be removed, so it is still counted.
            assert_eq!(result.daily_remaining, 19);

            let daily_key = WindowKey::new(WindowKind::Daily, DEFAULT_OPERATION_TYPE, "user-flaky-2")
                .to_store_key();
            let daily = store.inner.peek(&daily_key, DAY.as_secs() as i64, policy.counter().now());
            assert_eq!(daily.await.unwrap().count, 1);
        }
    }
}
