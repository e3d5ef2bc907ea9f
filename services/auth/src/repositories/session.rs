//! Session repository for database operations

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::{SessionRepository, login_attempt::insert_attempt};
use crate::models::{ActiveSession, NewLoginAttempt, NewSession};

const SESSION_COLUMNS: &str = "id, user_id, session_token, ip_address, user_agent, created_at, \
     last_activity, expires_at, is_active";

/// Session repository for database operations
#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    /// Create a new session repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create_for_login(
        &self,
        session: &NewSession,
        attempt: &NewLoginAttempt,
    ) -> Result<ActiveSession> {
        // Dropping the transaction on any early return rolls everything back
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, ActiveSession>(&format!(
            r#"
            INSERT INTO active_sessions
                (id, user_id, session_token, ip_address, user_agent, created_at, last_activity, expires_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $6, $7, TRUE)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(session.user_id)
        .bind(&session.session_token)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.created_at)
        .bind(session.expires_at)
        .fetch_one(&mut *tx)
        .await?;

        insert_attempt(&mut *tx, attempt).await?;

        sqlx::query("UPDATE users SET last_login_ip = $2, last_login_time = $3 WHERE id = $1")
            .bind(session.user_id)
            .bind(&session.ip_address)
            .bind(session.created_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn find_active(
        &self,
        user_id: Uuid,
        session_token: &str,
    ) -> Result<Option<ActiveSession>> {
        let session = sqlx::query_as::<_, ActiveSession>(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM active_sessions
            WHERE user_id = $1 AND session_token = $2 AND is_active = TRUE
            "#
        ))
        .bind(user_id)
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE active_sessions SET last_activity = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn deactivate(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE active_sessions SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn deactivate_by_token(&self, session_token: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE active_sessions SET is_active = FALSE WHERE session_token = $1 AND is_active = TRUE",
        )
        .bind(session_token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_all(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE active_sessions SET is_active = FALSE WHERE is_active = TRUE")
            .execute(&self.pool)
            .await?;
        info!("Deactivated {} sessions", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM active_sessions WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_valid(&self, now: DateTime<Utc>) -> Result<Vec<ActiveSession>> {
        let sessions = sqlx::query_as::<_, ActiveSession>(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM active_sessions
            WHERE is_active = TRUE AND expires_at > $1
            ORDER BY last_activity DESC
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }
}
