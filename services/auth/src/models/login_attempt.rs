//! Login-attempt audit records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One login attempt as stored in the audit ledger. Never updated.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LoginAttempt {
    pub id: i64,
    pub user_id: Option<Uuid>,
    /// The identifier exactly as typed; it may not match any user
    pub username: String,
    pub ip_address: String,
    pub success: bool,
    pub attempted_at: DateTime<Utc>,
    pub user_agent: Option<String>,
}

/// Login attempt about to be appended
#[derive(Debug, Clone)]
pub struct NewLoginAttempt {
    pub user_id: Option<Uuid>,
    pub username: String,
    pub ip_address: String,
    pub success: bool,
    pub attempted_at: DateTime<Utc>,
    pub user_agent: Option<String>,
}

impl NewLoginAttempt {
    pub fn failed(username: &str, ip_address: &str, user_agent: Option<&str>) -> Self {
        Self {
            user_id: None,
            username: username.to_string(),
            ip_address: ip_address.to_string(),
            success: false,
            attempted_at: Utc::now(),
            user_agent: user_agent.map(str::to_string),
        }
    }

    pub fn succeeded(
        user_id: Uuid,
        username: &str,
        ip_address: &str,
        user_agent: Option<&str>,
    ) -> Self {
        Self {
            user_id: Some(user_id),
            success: true,
            ..Self::failed(username, ip_address, user_agent)
        }
    }
}

/// An address with many recent failures
#[derive(Debug, Clone, Serialize)]
pub struct SuspiciousIp {
    pub ip_address: String,
    pub failures: i64,
}
