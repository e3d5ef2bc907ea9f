//! Rate limiter for preventing brute force attacks
//!
//! The count comes from the login-attempt ledger, so every worker process
//! sees the same answer.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::warn;

use crate::config::AuthConfig;
use crate::repositories::LoginAttemptRepository;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Failed attempts allowed inside the window before blocking
    pub max_attempts: i64,
    /// Look-back window
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::minutes(15),
        }
    }
}

impl From<&AuthConfig> for RateLimiterConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            max_attempts: config.max_failed_attempts,
            window: config.rate_limit_window(),
        }
    }
}

/// Rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    attempts: Arc<dyn LoginAttemptRepository>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimiterConfig, attempts: Arc<dyn LoginAttemptRepository>) -> Self {
        Self { config, attempts }
    }

    /// Check whether an IP address may attempt a login at `now`
    pub async fn is_allowed(&self, ip_address: &str, now: DateTime<Utc>) -> Result<bool> {
        let since = now - self.config.window;
        let failures = self.attempts.count_failures_since(ip_address, since).await?;

        if failures >= self.config.max_attempts {
            warn!(
                "Blocked login from {}: {} failed attempts in the last {} minutes",
                ip_address,
                failures,
                self.config.window.num_minutes()
            );
            return Ok(false);
        }

        Ok(true)
    }

    /// Get the rate limiter configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewLoginAttempt;
    use crate::repositories::MemoryAuthStore;

    async fn seed_failures(store: &MemoryAuthStore, ip: &str, count: usize, at: DateTime<Utc>) {
        for _ in 0..count {
            let mut attempt = NewLoginAttempt::failed("mallory", ip, None);
            attempt.attempted_at = at;
            store.record(&attempt).await.unwrap();
        }
    }

    #[tokio::test]
    async fn blocks_after_max_failures_in_window() {
        let store = MemoryAuthStore::new();
        let limiter = RateLimiter::new(RateLimiterConfig::default(), Arc::new(store.clone()));
        let now = Utc::now();

        seed_failures(&store, "10.0.0.1", 4, now - Duration::minutes(1)).await;
        assert!(limiter.is_allowed("10.0.0.1", now).await.unwrap());

        seed_failures(&store, "10.0.0.1", 1, now - Duration::minutes(1)).await;
        assert!(!limiter.is_allowed("10.0.0.1", now).await.unwrap());

        // other addresses are unaffected
        assert!(limiter.is_allowed("10.0.0.2", now).await.unwrap());
    }

    #[tokio::test]
    async fn failures_outside_window_are_ignored() {
        let store = MemoryAuthStore::new();
        let limiter = RateLimiter::new(RateLimiterConfig::default(), Arc::new(store.clone()));
        let now = Utc::now();

        seed_failures(&store, "10.0.0.3", 5, now - Duration::minutes(16)).await;
        assert!(limiter.is_allowed("10.0.0.3", now).await.unwrap());
    }
}
