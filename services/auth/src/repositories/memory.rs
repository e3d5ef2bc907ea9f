//! In-memory implementation of every auth repository
//!
//! All tables sit behind one mutex so a login commit (session, attempt and
//! user update) is applied as a single step, like the PostgreSQL transaction.

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ApiKeyRepository, LoginAttemptRepository, SessionRepository, UserRepository};
use crate::models::{
    ActiveSession, ApiKey, LoginAttempt, NewApiKey, NewLoginAttempt, NewSession, NewUser,
    SuspiciousIp, User,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    attempts: Vec<LoginAttempt>,
    sessions: HashMap<Uuid, ActiveSession>,
    api_keys: HashMap<Uuid, ApiKey>,
}

/// Shared in-memory auth tables; clones see the same data
#[derive(Clone, Default)]
pub struct MemoryAuthStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded attempt, oldest first
    pub async fn attempts(&self) -> Vec<LoginAttempt> {
        self.tables.lock().await.attempts.clone()
    }

    /// Every session row, whatever its state
    pub async fn sessions(&self) -> Vec<ActiveSession> {
        self.tables.lock().await.sessions.values().cloned().collect()
    }
}

fn push_attempt(tables: &mut Tables, attempt: &NewLoginAttempt) {
    let id = tables.attempts.len() as i64 + 1;
    tables.attempts.push(LoginAttempt {
        id,
        user_id: attempt.user_id,
        username: attempt.username.clone(),
        ip_address: attempt.ip_address.clone(),
        success: attempt.success,
        attempted_at: attempt.attempted_at,
        user_agent: attempt.user_agent.clone(),
    });
}

#[async_trait]
impl UserRepository for MemoryAuthStore {
    async fn create(&self, new_user: &NewUser) -> Result<User> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.username == new_user.username) {
            bail!("duplicate key value violates unique constraint \"users_username_key\"");
        }
        let email_taken = new_user
            .email
            .as_ref()
            .is_some_and(|email| tables.users.values().any(|u| u.email.as_ref() == Some(email)));
        if email_taken {
            bail!("duplicate key value violates unique constraint \"users_email_key\"");
        }

        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username.clone(),
            email: new_user.email.clone(),
            password_hash: new_user.password_hash.clone(),
            role: new_user.role,
            two_fa_enabled: false,
            two_fa_secret: None,
            last_login_ip: None,
            last_login_time: None,
            created_at: Utc::now(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned())
    }

    async fn set_two_factor(&self, id: Uuid, secret: Option<&str>, enabled: bool) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if let Some(user) = tables.users.get_mut(&id) {
            user.two_fa_secret = secret.map(str::to_string);
            user.two_fa_enabled = enabled;
        }
        Ok(())
    }
}

#[async_trait]
impl LoginAttemptRepository for MemoryAuthStore {
    async fn record(&self, attempt: &NewLoginAttempt) -> Result<()> {
        push_attempt(&mut *self.tables.lock().await, attempt);
        Ok(())
    }

    async fn count_failures_since(&self, ip_address: &str, since: DateTime<Utc>) -> Result<i64> {
        let tables = self.tables.lock().await;
        let count = tables
            .attempts
            .iter()
            .filter(|a| !a.success && a.ip_address == ip_address && a.attempted_at >= since)
            .count();
        Ok(count as i64)
    }

    async fn recent_failures(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<LoginAttempt>> {
        let tables = self.tables.lock().await;
        let mut failures: Vec<LoginAttempt> = tables
            .attempts
            .iter()
            .filter(|a| !a.success && a.attempted_at >= since)
            .cloned()
            .collect();
        failures.sort_by(|a, b| b.attempted_at.cmp(&a.attempted_at));
        failures.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(failures)
    }

    async fn suspicious_ips(
        &self,
        since: DateTime<Utc>,
        threshold: i64,
    ) -> Result<Vec<SuspiciousIp>> {
        let tables = self.tables.lock().await;
        let mut counts: HashMap<&str, i64> = HashMap::new();
        for attempt in tables
            .attempts
            .iter()
            .filter(|a| !a.success && a.attempted_at >= since)
        {
            *counts.entry(attempt.ip_address.as_str()).or_default() += 1;
        }

        let mut ips: Vec<SuspiciousIp> = counts
            .into_iter()
            .filter(|(_, failures)| *failures >= threshold)
            .map(|(ip, failures)| SuspiciousIp {
                ip_address: ip.to_string(),
                failures,
            })
            .collect();
        ips.sort_by(|a, b| b.failures.cmp(&a.failures));
        Ok(ips)
    }
}

#[async_trait]
impl SessionRepository for MemoryAuthStore {
    async fn create_for_login(
        &self,
        session: &NewSession,
        attempt: &NewLoginAttempt,
    ) -> Result<ActiveSession> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&session.user_id) {
            bail!("user {} does not exist", session.user_id);
        }
        if tables
            .sessions
            .values()
            .any(|s| s.session_token == session.session_token)
        {
            bail!("duplicate session token");
        }

        let created = ActiveSession {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            session_token: session.session_token.clone(),
            ip_address: session.ip_address.clone(),
            user_agent: session.user_agent.clone(),
            created_at: session.created_at,
            last_activity: session.created_at,
            expires_at: session.expires_at,
            is_active: true,
        };
        tables.sessions.insert(created.id, created.clone());
        push_attempt(&mut tables, attempt);
        if let Some(user) = tables.users.get_mut(&session.user_id) {
            user.last_login_ip = Some(session.ip_address.clone());
            user.last_login_time = Some(session.created_at);
        }
        Ok(created)
    }

    async fn find_active(
        &self,
        user_id: Uuid,
        session_token: &str,
    ) -> Result<Option<ActiveSession>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .values()
            .find(|s| s.user_id == user_id && s.session_token == session_token && s.is_active)
            .cloned())
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if let Some(session) = self.tables.lock().await.sessions.get_mut(&id) {
            session.last_activity = at;
        }
        Ok(())
    }

    async fn deactivate(&self, id: Uuid) -> Result<()> {
        if let Some(session) = self.tables.lock().await.sessions.get_mut(&id) {
            session.is_active = false;
        }
        Ok(())
    }

    async fn deactivate_by_token(&self, session_token: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let mut changed = false;
        for session in tables
            .sessions
            .values_mut()
            .filter(|s| s.session_token == session_token && s.is_active)
        {
            session.is_active = false;
            changed = true;
        }
        Ok(changed)
    }

    async fn deactivate_all(&self) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let mut count = 0;
        for session in tables.sessions.values_mut().filter(|s| s.is_active) {
            session.is_active = false;
            count += 1;
        }
        Ok(count)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.expires_at >= now);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn list_valid(&self, now: DateTime<Utc>) -> Result<Vec<ActiveSession>> {
        let tables = self.tables.lock().await;
        let mut sessions: Vec<ActiveSession> = tables
            .sessions
            .values()
            .filter(|s| s.is_active && s.expires_at > now)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(sessions)
    }
}

#[async_trait]
impl ApiKeyRepository for MemoryAuthStore {
    async fn create(&self, new_key: &NewApiKey) -> Result<ApiKey> {
        let mut tables = self.tables.lock().await;
        if tables.api_keys.values().any(|k| k.key == new_key.key) {
            bail!("duplicate api key");
        }
        let key = ApiKey {
            id: Uuid::new_v4(),
            key: new_key.key.clone(),
            name: new_key.name.clone(),
            user_id: new_key.user_id,
            created_at: Utc::now(),
            expires_at: new_key.expires_at,
            last_used_at: None,
            is_active: true,
        };
        tables.api_keys.insert(key.id, key.clone());
        Ok(key)
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<ApiKey>> {
        let tables = self.tables.lock().await;
        Ok(tables.api_keys.values().find(|k| k.key == key).cloned())
    }

    async fn mark_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if let Some(key) = self.tables.lock().await.api_keys.get_mut(&id) {
            key.last_used_at = Some(at);
        }
        Ok(())
    }
}
