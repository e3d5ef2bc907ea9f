//! Bearer API keys for programmatic clients

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApiKey {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub key: String,
    pub name: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl ApiKey {
    /// Active and, when an expiry is set, not yet past it
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub key: String,
    pub name: String,
    pub user_id: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
}
