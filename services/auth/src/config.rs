//! Authentication settings loaded from `AUTH_*` environment variables

use chrono::Duration;
use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of a server-side session
    pub session_ttl_hours: i64,
    /// Failed attempts from one IP that trigger the login block
    pub max_failed_attempts: i64,
    pub rate_limit_window_minutes: i64,
    /// Issuer shown in authenticator apps
    pub totp_issuer: String,
    pub cookie_name: String,
    pub cookie_secure: bool,
    /// Take the client address from `X-Forwarded-For` instead of the peer
    pub trust_forwarded_for: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 24,
            max_failed_attempts: 5,
            rate_limit_window_minutes: 15,
            totp_issuer: "Campus Stationery".to_string(),
            cookie_name: "sid".to_string(),
            cookie_secure: false,
            trust_forwarded_for: false,
        }
    }
}

impl AuthConfig {
    /// Load the configuration from the environment, falling back to defaults
    ///
    /// # Environment Variables
    /// - `AUTH_SESSION_TTL_HOURS` (default: 24)
    /// - `AUTH_MAX_FAILED_ATTEMPTS` (default: 5)
    /// - `AUTH_RATE_LIMIT_WINDOW_MINUTES` (default: 15)
    /// - `AUTH_TOTP_ISSUER` (default: "Campus Stationery")
    /// - `AUTH_COOKIE_NAME` (default: "sid")
    /// - `AUTH_COOKIE_SECURE` (default: false)
    /// - `AUTH_TRUST_FORWARDED_FOR` (default: false)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Config::builder()
            .set_default("session_ttl_hours", defaults.session_ttl_hours)?
            .set_default("max_failed_attempts", defaults.max_failed_attempts)?
            .set_default("rate_limit_window_minutes", defaults.rate_limit_window_minutes)?
            .set_default("totp_issuer", defaults.totp_issuer)?
            .set_default("cookie_name", defaults.cookie_name)?
            .set_default("cookie_secure", defaults.cookie_secure)?
            .set_default("trust_forwarded_for", defaults.trust_forwarded_for)?
            .add_source(Environment::with_prefix("AUTH").try_parsing(true))
            .build()?;

        let config: AuthConfig = config.try_deserialize()?;
        if config.session_ttl_hours <= 0 || config.max_failed_attempts <= 0 {
            return Err(ConfigError::Message(
                "AUTH_SESSION_TTL_HOURS and AUTH_MAX_FAILED_ATTEMPTS must be positive".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::hours(self.session_ttl_hours)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::minutes(self.rate_limit_window_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env() {
        for key in [
            "AUTH_SESSION_TTL_HOURS",
            "AUTH_MAX_FAILED_ATTEMPTS",
            "AUTH_RATE_LIMIT_WINDOW_MINUTES",
            "AUTH_TOTP_ISSUER",
            "AUTH_COOKIE_NAME",
            "AUTH_COOKIE_SECURE",
            "AUTH_TRUST_FORWARDED_FOR",
        ] {
            unsafe { env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn test_auth_config_defaults() {
        clear_env();

        let config = AuthConfig::from_env().unwrap();
        assert_eq!(config.session_ttl_hours, 24);
        assert_eq!(config.max_failed_attempts, 5);
        assert_eq!(config.rate_limit_window(), Duration::minutes(15));
        assert_eq!(config.cookie_name, "sid");
        assert!(!config.cookie_secure);
        assert!(!config.trust_forwarded_for);
    }

    #[test]
    #[serial]
    fn test_auth_config_from_env() {
        clear_env();
        unsafe {
            env::set_var("AUTH_SESSION_TTL_HOURS", "2");
            env::set_var("AUTH_COOKIE_SECURE", "true");
            env::set_var("AUTH_TRUST_FORWARDED_FOR", "true");
        }

        let config = AuthConfig::from_env().unwrap();
        assert_eq!(config.session_ttl(), Duration::hours(2));
        assert!(config.cookie_secure);
        assert!(config.trust_forwarded_for);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_auth_config_rejects_non_positive_ttl() {
        clear_env();
        unsafe { env::set_var("AUTH_SESSION_TTL_HOURS", "0") };

        assert!(AuthConfig::from_env().is_err());

        clear_env();
    }
}
