//! Client-side session state keyed by the opaque `sid` cookie
//!
//! The browser only ever carries the `sid`. What it maps to (the user id, the
//! server-side session token and an unconfirmed TOTP secret) lives here,
//! either in Redis or in process memory.

use anyhow::Result;
use async_trait::async_trait;
use common::cache::RedisPool;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::password::random_token;

/// Length of the `sid` cookie value
pub const SID_LENGTH: usize = 43;

/// Per-browser session data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSession {
    pub user_id: Option<Uuid>,
    pub session_token: Option<String>,
    /// Secret shown to the user during 2FA setup, not yet confirmed
    pub pending_totp_secret: Option<String>,
}

impl ClientSession {
    pub fn authenticated(user_id: Uuid, session_token: String) -> Self {
        Self {
            user_id: Some(user_id),
            session_token: Some(session_token),
            pending_totp_secret: None,
        }
    }
}

pub fn new_sid() -> String {
    random_token(SID_LENGTH)
}

#[async_trait]
pub trait ClientSessionStore: Send + Sync {
    async fn load(&self, sid: &str) -> Result<Option<ClientSession>>;
    async fn save(&self, sid: &str, session: &ClientSession, ttl_seconds: u64) -> Result<()>;
    async fn remove(&self, sid: &str) -> Result<()>;
}

/// Redis-backed store; values are JSON under `client_session:<sid>`
#[derive(Clone)]
pub struct RedisClientSessionStore {
    redis: RedisPool,
}

impl RedisClientSessionStore {
    pub fn new(redis: RedisPool) -> Self {
        Self { redis }
    }

    fn key(sid: &str) -> String {
        format!("client_session:{sid}")
    }
}

#[async_trait]
impl ClientSessionStore for RedisClientSessionStore {
    async fn load(&self, sid: &str) -> Result<Option<ClientSession>> {
        match self.redis.get(&Self::key(sid)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, sid: &str, session: &ClientSession, ttl_seconds: u64) -> Result<()> {
        let raw = serde_json::to_string(session)?;
        self.redis.set(&Self::key(sid), &raw, Some(ttl_seconds)).await
    }

    async fn remove(&self, sid: &str) -> Result<()> {
        self.redis.delete(&Self::key(sid)).await
    }
}

/// In-process store. Its contents vanish on restart, which the session
/// middleware treats like any other missing session.
#[derive(Clone, Default)]
pub struct MemoryClientSessionStore {
    sessions: Arc<Mutex<HashMap<String, ClientSession>>>,
}

impl MemoryClientSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ClientSessionStore for MemoryClientSessionStore {
    async fn load(&self, sid: &str) -> Result<Option<ClientSession>> {
        Ok(self.sessions.lock().await.get(sid).cloned())
    }

    async fn save(&self, sid: &str, session: &ClientSession, _ttl_seconds: u64) -> Result<()> {
        self.sessions
            .lock()
            .await
            .insert(sid.to_string(), session.clone());
        Ok(())
    }

    async fn remove(&self, sid: &str) -> Result<()> {
        self.sessions.lock().await.remove(sid);
        Ok(())
    }
}
