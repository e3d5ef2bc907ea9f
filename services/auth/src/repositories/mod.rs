//! Repositories for the credential store, the login-attempt ledger, the
//! session registry and API keys
//!
//! Each entity has a trait with a PostgreSQL implementation and an in-memory
//! one. Services only ever see the traits.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    ActiveSession, ApiKey, LoginAttempt, NewApiKey, NewLoginAttempt, NewSession, NewUser,
    SuspiciousIp, User,
};

pub mod api_key;
pub mod login_attempt;
pub mod memory;
pub mod session;
pub mod user;

pub use api_key::PgApiKeyRepository;
pub use login_attempt::PgLoginAttemptRepository;
pub use memory::MemoryAuthStore;
pub use session::PgSessionRepository;
pub use user::PgUserRepository;

/// Credential store
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, new_user: &NewUser) -> Result<User>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    /// Store (or clear) the TOTP secret together with the enabled flag
    async fn set_two_factor(&self, id: Uuid, secret: Option<&str>, enabled: bool) -> Result<()>;
}

/// Append-only audit ledger of login attempts
#[async_trait]
pub trait LoginAttemptRepository: Send + Sync {
    async fn record(&self, attempt: &NewLoginAttempt) -> Result<()>;
    async fn count_failures_since(&self, ip_address: &str, since: DateTime<Utc>) -> Result<i64>;
    async fn recent_failures(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<LoginAttempt>>;
    async fn suspicious_ips(&self, since: DateTime<Utc>, threshold: i64)
    -> Result<Vec<SuspiciousIp>>;
}

/// Server-side session registry
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Commit a successful login as one unit: the session row, the successful
    /// attempt and the user's last-login fields
    async fn create_for_login(
        &self,
        session: &NewSession,
        attempt: &NewLoginAttempt,
    ) -> Result<ActiveSession>;
    /// Exact match on user, token and `is_active = true`
    async fn find_active(&self, user_id: Uuid, session_token: &str)
    -> Result<Option<ActiveSession>>;
    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
    async fn deactivate(&self, id: Uuid) -> Result<()>;
    async fn deactivate_by_token(&self, session_token: &str) -> Result<bool>;
    /// Mark every active row inactive; used when the process starts
    async fn deactivate_all(&self) -> Result<u64>;
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
    async fn list_valid(&self, now: DateTime<Utc>) -> Result<Vec<ActiveSession>>;
}

#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn create(&self, new_key: &NewApiKey) -> Result<ApiKey>;
    async fn find_by_key(&self, key: &str) -> Result<Option<ApiKey>>;
    async fn mark_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
}

/// The four auth repositories behind one handle
#[derive(Clone)]
pub struct AuthRepositories {
    pub users: Arc<dyn UserRepository>,
    pub attempts: Arc<dyn LoginAttemptRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub api_keys: Arc<dyn ApiKeyRepository>,
}

impl AuthRepositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            attempts: Arc::new(PgLoginAttemptRepository::new(pool.clone())),
            sessions: Arc::new(PgSessionRepository::new(pool.clone())),
            api_keys: Arc::new(PgApiKeyRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self::from_memory(MemoryAuthStore::default())
    }

    /// Wrap an existing in-memory store so tests can keep a handle to it
    pub fn from_memory(store: MemoryAuthStore) -> Self {
        let store = Arc::new(store);
        Self {
            users: store.clone(),
            attempts: store.clone(),
            sessions: store.clone(),
            api_keys: store,
        }
    }
}
