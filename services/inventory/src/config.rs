//! Store settings loaded from `STORE_*` environment variables

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Where the catalog, ledger and auth tables live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    /// Process-local tables; nothing survives a restart
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub bind_address: String,
    pub storage: StorageBackend,
    /// Items at or below this stock show up in the low-stock report
    pub low_stock_threshold: i32,
    pub max_rent_days: i32,
    /// Six-field cron expressions (seconds first)
    pub session_cleanup_schedule: String,
    pub overdue_scan_schedule: String,
    pub reconcile_sessions_on_startup: bool,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            storage: StorageBackend::Postgres,
            low_stock_threshold: 2,
            max_rent_days: 30,
            session_cleanup_schedule: "0 */30 * * * *".to_string(),
            overdue_scan_schedule: "0 0 * * * *".to_string(),
            reconcile_sessions_on_startup: true,
            admin_username: None,
            admin_password: None,
        }
    }
}

impl AppConfig {
    /// Load the configuration from the environment, falling back to defaults
    ///
    /// # Environment Variables
    /// - `STORE_BIND_ADDRESS` (default: "0.0.0.0:3000")
    /// - `STORE_STORAGE`: `postgres` or `memory` (default: postgres)
    /// - `STORE_LOW_STOCK_THRESHOLD` (default: 2)
    /// - `STORE_MAX_RENT_DAYS` (default: 30)
    /// - `STORE_SESSION_CLEANUP_SCHEDULE` (default: every 30 minutes)
    /// - `STORE_OVERDUE_SCAN_SCHEDULE` (default: hourly)
    /// - `STORE_RECONCILE_SESSIONS_ON_STARTUP` (default: true)
    /// - `STORE_ADMIN_USERNAME` / `STORE_ADMIN_PASSWORD`: optional admin bootstrap
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Config::builder()
            .set_default("bind_address", defaults.bind_address)?
            .set_default("storage", "postgres")?
            .set_default("low_stock_threshold", defaults.low_stock_threshold)?
            .set_default("max_rent_days", defaults.max_rent_days)?
            .set_default("session_cleanup_schedule", defaults.session_cleanup_schedule)?
            .set_default("overdue_scan_schedule", defaults.overdue_scan_schedule)?
            .set_default(
                "reconcile_sessions_on_startup",
                defaults.reconcile_sessions_on_startup,
            )?
            .add_source(Environment::with_prefix("STORE").try_parsing(true))
            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        if config.max_rent_days < 1 {
            return Err(ConfigError::Message(
                "STORE_MAX_RENT_DAYS must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    /// Admin credentials to bootstrap, when both are set
    pub fn admin_credentials(&self) -> Option<(&str, &str)> {
        match (self.admin_username.as_deref(), self.admin_password.as_deref()) {
            (Some(username), Some(password)) if !username.is_empty() => {
                Some((username, password))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env() {
        for key in [
            "STORE_BIND_ADDRESS",
            "STORE_STORAGE",
            "STORE_LOW_STOCK_THRESHOLD",
            "STORE_MAX_RENT_DAYS",
            "STORE_RECONCILE_SESSIONS_ON_STARTUP",
            "STORE_ADMIN_USERNAME",
            "STORE_ADMIN_PASSWORD",
        ] {
            unsafe { env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn test_app_config_defaults() {
        clear_env();

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert_eq!(config.storage, StorageBackend::Postgres);
        assert_eq!(config.low_stock_threshold, 2);
        assert_eq!(config.max_rent_days, 30);
        assert!(config.reconcile_sessions_on_startup);
        assert!(config.admin_credentials().is_none());
    }

    #[test]
    #[serial]
    fn test_app_config_from_env() {
        clear_env();
        unsafe {
            env::set_var("STORE_STORAGE", "memory");
            env::set_var("STORE_LOW_STOCK_THRESHOLD", "5");
            env::set_var("STORE_ADMIN_USERNAME", "storeadmin");
            env::set_var("STORE_ADMIN_PASSWORD", "changeme");
        }

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.low_stock_threshold, 5);
        assert_eq!(config.admin_credentials(), Some(("storeadmin", "changeme")));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_app_config_rejects_zero_rent_days() {
        clear_env();
        unsafe { env::set_var("STORE_MAX_RENT_DAYS", "0") };

        assert!(AppConfig::from_env().is_err());

        clear_env();
    }
}
