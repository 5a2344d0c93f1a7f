//! Rate limiting: token buckets at global and identity/tool scope.
//!
//! Buckets refill lazily on access. Each bucket sits behind its own mutex;
//! the map of scoped buckets sits behind an `RwLock` so lookups of existing
//! buckets never contend on insertion.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::types::RateLimitSettings;

/// Slack for float drift when comparing token counts.
const EPSILON: f64 = 1e-9;

/// Parse `"<N>/<unit>"` into `(capacity, refill_per_second)`.
///
/// Units: second, minute, hour (plural and short forms accepted). Anything
/// else yields the disabled bucket `(0, 0.0)`.
pub fn parse_rate(text: &str) -> (u32, f64) {
    let Some((count, unit)) = text.trim().split_once('/') else {
        return (0, 0.0);
    };
    let Ok(count) = count.trim().parse::<u32>() else {
        return (0, 0.0);
    };
    if count == 0 {
        return (0, 0.0);
    }
    let period = match unit.trim().to_ascii_lowercase().as_str() {
        "s" | "sec" | "second" | "seconds" => 1.0,
        "m" | "min" | "minute" | "minutes" => 60.0,
        "h" | "hr" | "hour" | "hours" => 3600.0,
        _ => return (0, 0.0),
    };
    (count, f64::from(count) / period)
}

// =============================================================================
// Token bucket
// =============================================================================

/// Result of a single-bucket take.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TakeOutcome {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_after_secs: f64,
}

#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: u32,
    refill_per_second: f64,
    tokens: f64,
    last_refill: Instant,
    last_used: Instant,
}

impl TokenBucket {
    /// A full bucket.
    pub fn new(capacity: u32, refill_per_second: f64, now: Instant) -> Self {
        Self {
            capacity,
            refill_per_second,
            tokens: f64::from(capacity),
            last_refill: now,
            last_used: now,
        }
    }

    pub fn from_rate(rate: &str, now: Instant) -> Self {
        let (capacity, refill) = parse_rate(rate);
        Self::new(capacity, refill, now)
    }

    /// Disabled buckets admit everything.
    pub fn is_disabled(&self) -> bool {
        self.capacity == 0 || self.refill_per_second <= 0.0
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_second)
            .clamp(0.0, f64::from(self.capacity));
        self.last_refill = now;
    }

    fn has_token(&self) -> bool {
        self.is_disabled() || self.tokens + EPSILON >= 1.0
    }

    fn consume(&mut self, now: Instant) {
        self.last_used = now;
        if !self.is_disabled() {
            self.tokens = (self.tokens - 1.0).max(0.0);
        }
    }

    fn remaining(&self) -> u32 {
        (self.tokens + EPSILON).floor() as u32
    }

    /// Seconds until the bucket is full again.
    fn reset_after_secs(&self) -> f64 {
        if self.is_disabled() {
            return 0.0;
        }
        ((f64::from(self.capacity) - self.tokens) / self.refill_per_second).max(0.0)
    }

    /// Seconds until one token is available.
    fn retry_after_secs(&self) -> f64 {
        if self.has_token() {
            return 0.0;
        }
        ((1.0 - self.tokens) / self.refill_per_second).max(0.0)
    }

    /// Refill lazily, then take one token if available.
    pub fn take(&mut self, now: Instant) -> TakeOutcome {
        self.refill(now);
        let allowed = self.has_token();
        if allowed {
            self.consume(now);
        }
        TakeOutcome {
            allowed,
            remaining: self.remaining(),
            reset_after_secs: self.reset_after_secs(),
        }
    }

    fn is_idle(&self, now: Instant, max_idle: Duration) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        let projected = self.tokens + elapsed * self.refill_per_second;
        projected + EPSILON >= f64::from(self.capacity)
            && now.saturating_duration_since(self.last_used) >= max_idle
    }

    fn status(&self) -> RateLimitStatus {
        RateLimitStatus {
            limit: self.capacity,
            remaining: self.remaining(),
            reset_after_secs: self.reset_after_secs(),
        }
    }

    fn rejection(&self, scope: RateLimitScope) -> RateLimitRejection {
        RateLimitRejection {
            scope,
            limit: self.capacity,
            remaining: self.remaining(),
            reset_after_secs: self.reset_after_secs(),
            retry_after_secs: self.retry_after_secs(),
        }
    }
}

// =============================================================================
// Admission results
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitScope {
    Global,
    Identity,
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitScope::Global => write!(f, "global"),
            RateLimitScope::Identity => write!(f, "identity"),
        }
    }
}

/// Throttling state reported on admitted calls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after_secs: f64,
}

/// A call refused by one of the buckets. Nothing was consumed.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{scope} rate limit of {limit} exhausted, retry after {retry_after_secs:.2}s")]
pub struct RateLimitRejection {
    pub scope: RateLimitScope,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after_secs: f64,
    pub retry_after_secs: f64,
}

// =============================================================================
// Rate limiter
// =============================================================================

/// Global bucket plus one bucket per `identity|plugin/tool`.
#[derive(Debug)]
pub struct RateLimiter {
    global: Mutex<TokenBucket>,
    per_identity: (u32, f64),
    per_tool: HashMap<String, (u32, f64)>,
    scoped: RwLock<HashMap<String, Arc<Mutex<TokenBucket>>>>,
}

impl RateLimiter {
    pub fn new(global: &str, per_identity: &str) -> Self {
        Self {
            global: Mutex::new(TokenBucket::from_rate(global, Instant::now())),
            per_identity: parse_rate(per_identity),
            per_tool: HashMap::new(),
            scoped: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        let mut limiter = Self::new(&settings.global, &settings.per_identity);
        for (tool, rate) in &settings.per_tool {
            limiter = limiter.with_tool_rate(tool, rate);
        }
        limiter
    }

    /// Override the identity rate for `plugin/tool`.
    pub fn with_tool_rate(mut self, qualified_tool: &str, rate: &str) -> Self {
        self.per_tool
            .insert(qualified_tool.to_string(), parse_rate(rate));
        self
    }

    fn scope_key(identity: &str, plugin: &str, tool: &str) -> String {
        format!("{}|{}/{}", identity, plugin, tool)
    }

    async fn scoped_bucket(
        &self,
        key: &str,
        plugin: &str,
        tool: &str,
        now: Instant,
    ) -> Arc<Mutex<TokenBucket>> {
        if let Some(bucket) = self.scoped.read().await.get(key) {
            return Arc::clone(bucket);
        }
        let (capacity, refill) = self
            .per_tool
            .get(&format!("{}/{}", plugin, tool))
            .copied()
            .unwrap_or(self.per_identity);
        let mut scoped = self.scoped.write().await;
        Arc::clone(
            scoped
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(capacity, refill, now)))),
        )
    }

    /// Admit one call against both buckets.
    pub async fn check(
        &self,
        identity: &str,
        plugin: &str,
        tool: &str,
    ) -> Result<Option<RateLimitStatus>, RateLimitRejection> {
        self.check_at(identity, plugin, tool, Instant::now()).await
    }

    /// Admit one call at `now`. Both buckets are locked (global first) and a
    /// token is taken from each only when both have one.
    ///
    /// The returned status is the tighter of the enabled buckets; `None` when
    /// both are disabled.
    pub async fn check_at(
        &self,
        identity: &str,
        plugin: &str,
        tool: &str,
        now: Instant,
    ) -> Result<Option<RateLimitStatus>, RateLimitRejection> {
        let key = Self::scope_key(identity, plugin, tool);
        loop {
            let scoped = self.scoped_bucket(&key, plugin, tool, now).await;
            if let Some(decision) = self.try_admit(&key, &scoped, now).await {
                if let Err(rejection) = &decision {
                    tracing::debug!(identity, plugin, tool, scope = %rejection.scope, "rate_limited");
                }
                return decision;
            }
        }
    }

    /// Decide against `scoped`, or `None` if it was pruned or cleared after
    /// it was looked up and the caller must fetch the live bucket.
    async fn try_admit(
        &self,
        key: &str,
        scoped: &Arc<Mutex<TokenBucket>>,
        now: Instant,
    ) -> Option<Result<Option<RateLimitStatus>, RateLimitRejection>> {
        let mut global = self.global.lock().await;
        let mut local = scoped.lock().await;
        let live = self
            .scoped
            .read()
            .await
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, scoped));
        if !live {
            return None;
        }

        global.refill(now);
        local.refill(now);

        if !global.has_token() {
            return Some(Err(global.rejection(RateLimitScope::Global)));
        }
        if !local.has_token() {
            return Some(Err(local.rejection(RateLimitScope::Identity)));
        }
        global.consume(now);
        local.consume(now);

        let status = [&*global, &*local]
            .into_iter()
            .filter(|b| !b.is_disabled())
            .map(TokenBucket::status)
            .min_by_key(|s| s.remaining);
        Some(Ok(status))
    }

    /// Remove every bucket belonging to `identity`.
    pub async fn clear(&self, identity: &str) {
        let prefix = format!("{}|", identity);
        self.scoped.write().await.retain(|key, _| !key.starts_with(&prefix));
    }

    /// Drop scoped buckets that are full and unused for `max_idle`. Returns
    /// the number removed.
    pub async fn prune_idle(&self, max_idle: Duration) -> usize {
        self.prune_idle_at(max_idle, Instant::now()).await
    }

    pub async fn prune_idle_at(&self, max_idle: Duration, now: Instant) -> usize {
        let mut scoped = self.scoped.write().await;
        let before = scoped.len();
        scoped.retain(|_, bucket| match bucket.try_lock() {
            Ok(bucket) => !bucket.is_idle(now, max_idle),
            // In use right now, so not idle.
            Err(_) => true,
        });
        before - scoped.len()
    }

    pub async fn scoped_len(&self) -> usize {
        self.scoped.read().await.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_settings(&RateLimitSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("20/minute"), (20, 20.0 / 60.0));
        assert_eq!(parse_rate("5/second"), (5, 5.0));
        assert_eq!(parse_rate(" 100 / Hours "), (100, 100.0 / 3600.0));
        assert_eq!(parse_rate("10/m"), (10, 10.0 / 60.0));
        assert_eq!(parse_rate("garbage"), (0, 0.0));
        assert_eq!(parse_rate("0/minute"), (0, 0.0));
        assert_eq!(parse_rate("-3/minute"), (0, 0.0));
        assert_eq!(parse_rate("3/fortnight"), (0, 0.0));
    }

    #[test]
    fn test_capacity_then_reject_then_refill() {
        let start = Instant::now();
        let mut bucket = TokenBucket::from_rate("20/minute", start);

        for _ in 0..20 {
            assert!(bucket.take(start).allowed);
        }
        let rejected = bucket.take(start);
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert!((rejected.reset_after_secs - 60.0).abs() < 1e-6);

        let later = start + Duration::from_secs_f64(1.0 / (20.0 / 60.0));
        assert!(bucket.take(later).allowed);
        assert!(!bucket.take(later).allowed);
    }

    #[test]
    fn test_disabled_bucket_always_allows() {
        let now = Instant::now();
        let mut bucket = TokenBucket::from_rate("whatever", now);
        assert!(bucket.is_disabled());
        for _ in 0..1000 {
            assert!(bucket.take(now).allowed);
        }
    }

    #[tokio::test]
    async fn test_rejection_by_scoped_consumes_nothing_globally() {
        let limiter = RateLimiter::new("10/minute", "1/minute");
        let now = Instant::now();

        let status = limiter.check_at("alice", "p", "t", now).await.unwrap().unwrap();
        assert_eq!(status.remaining, 0);
        assert_eq!(status.limit, 1);

        let rejection = limiter.check_at("alice", "p", "t", now).await.unwrap_err();
        assert_eq!(rejection.scope, RateLimitScope::Identity);
        assert!(rejection.retry_after_secs > 59.0);

        // Global bucket still holds 9 tokens.
        assert!((limiter.global.lock().await.tokens() - 9.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_global_bucket_shared_across_identities() {
        let limiter = RateLimiter::new("2/minute", "10/minute");
        let now = Instant::now();
        assert!(limiter.check_at("a", "p", "t", now).await.is_ok());
        assert!(limiter.check_at("b", "p", "t", now).await.is_ok());
        let rejection = limiter.check_at("c", "p", "t", now).await.unwrap_err();
        assert_eq!(rejection.scope, RateLimitScope::Global);
    }

    #[tokio::test]
    async fn test_per_tool_override() {
        let limiter = RateLimiter::new("", "100/minute").with_tool_rate("scanner/ports", "1/hour");
        let now = Instant::now();
        assert!(limiter.check_at("a", "scanner", "ports", now).await.is_ok());
        assert!(limiter.check_at("a", "scanner", "ports", now).await.is_err());
        assert!(limiter.check_at("a", "scanner", "whois", now).await.is_ok());
    }

    #[tokio::test]
    async fn test_both_disabled_reports_no_status() {
        let limiter = RateLimiter::new("off", "off");
        assert_eq!(limiter.check("a", "p", "t").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_parallel_checks_admit_exactly_capacity() {
        let limiter = Arc::new(RateLimiter::new("", "7/hour"));
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.check("alice", "p", "t").await.is_ok() })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 7);
    }

    #[tokio::test]
    async fn test_clear_and_prune() {
        let limiter = RateLimiter::new("", "60/minute");
        let now = Instant::now();
        limiter.check_at("alice", "p", "t", now).await.unwrap();
        limiter.check_at("alice", "p", "u", now).await.unwrap();
        limiter.check_at("bob", "p", "t", now).await.unwrap();
        assert_eq!(limiter.scoped_len().await, 3);

        limiter.clear("alice").await;
        assert_eq!(limiter.scoped_len().await, 1);

        // Not yet full again.
        assert_eq!(limiter.prune_idle_at(Duration::ZERO, now).await, 0);
        let later = now + Duration::from_secs(5);
        assert_eq!(limiter.prune_idle_at(Duration::from_secs(1), later).await, 1);
        assert_eq!(limiter.scoped_len().await, 0);
    }

    #[tokio::test]
    async fn test_bucket_pruned_mid_check_is_not_spent() {
        let limiter = RateLimiter::new("", "2/minute");
        let now = Instant::now();
        let key = RateLimiter::scope_key("alice", "p", "t");

        // A checker looked the bucket up, then the sweeper evicted it.
        let stale = limiter.scoped_bucket(&key, "p", "t", now).await;
        assert_eq!(limiter.prune_idle_at(Duration::ZERO, now).await, 1);

        assert!(limiter.try_admit(&key, &stale, now).await.is_none());
        assert_eq!(stale.lock().await.tokens(), 2.0);

        limiter.check_at("alice", "p", "t", now).await.unwrap();
        limiter.check_at("alice", "p", "t", now).await.unwrap();
        let rejection = limiter.check_at("alice", "p", "t", now).await.unwrap_err();
        assert_eq!(rejection.scope, RateLimitScope::Identity);
    }

    #[tokio::test]
    async fn test_bucket_cleared_mid_check_is_not_spent() {
        let limiter = RateLimiter::new("", "1/minute");
        let now = Instant::now();
        let key = RateLimiter::scope_key("alice", "p", "t");

        let stale = limiter.scoped_bucket(&key, "p", "t", now).await;
        limiter.clear("alice").await;
        assert!(limiter.try_admit(&key, &stale, now).await.is_none());

        limiter.check_at("alice", "p", "t", now).await.unwrap();
        assert!(limiter.check_at("alice", "p", "t", now).await.is_err());
    }

    proptest! {
        #[test]
        fn prop_parse_rate_roundtrips_units(n in 1u32..100_000, unit in 0usize..3) {
            let (name, secs) = [("second", 1.0), ("minute", 60.0), ("hour", 3600.0)][unit];
            let (capacity, refill) = parse_rate(&format!("{}/{}", n, name));
            prop_assert_eq!(capacity, n);
            prop_assert!((refill - f64::from(n) / secs).abs() < 1e-9);
        }

        #[test]
        fn prop_tokens_stay_in_bounds(
            capacity in 1u32..50,
            steps in proptest::collection::vec(0u64..5_000, 1..200),
        ) {
            let start = Instant::now();
            let mut bucket = TokenBucket::new(capacity, f64::from(capacity) / 60.0, start);
            let mut now = start;
            for step in steps {
                now += Duration::from_millis(step);
                let outcome = bucket.take(now);
                prop_assert!(bucket.tokens() >= 0.0);
                prop_assert!(bucket.tokens() <= f64::from(capacity));
                prop_assert!(outcome.remaining <= capacity);
            }
        }
    }
}
