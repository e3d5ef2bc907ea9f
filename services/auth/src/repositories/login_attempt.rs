//! PostgreSQL login-attempt ledger

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row};

use super::LoginAttemptRepository;
use crate::models::{LoginAttempt, NewLoginAttempt, SuspiciousIp};

#[derive(Clone)]
pub struct PgLoginAttemptRepository {
    pool: PgPool,
}

impl PgLoginAttemptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Shared with the session repository, which appends inside its own transaction
pub(crate) async fn insert_attempt<'e, E>(executor: E, attempt: &NewLoginAttempt) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO login_attempts (user_id, username, ip_address, success, attempted_at, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(attempt.user_id)
    .bind(&attempt.username)
    .bind(&attempt.ip_address)
    .bind(attempt.success)
    .bind(attempt.attempted_at)
    .bind(&attempt.user_agent)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl LoginAttemptRepository for PgLoginAttemptRepository {
    async fn record(&self, attempt: &NewLoginAttempt) -> Result<()> {
        insert_attempt(&self.pool, attempt).await
    }

    async fn count_failures_since(&self, ip_address: &str, since: DateTime<Utc>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM login_attempts
            WHERE ip_address = $1 AND success = FALSE AND attempted_at >= $2
            "#,
        )
        .bind(ip_address)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn recent_failures(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<LoginAttempt>> {
        let attempts = sqlx::query_as::<_, LoginAttempt>(
            r#"
            SELECT id, user_id, username, ip_address, success, attempted_at, user_agent
            FROM login_attempts
            WHERE success = FALSE AND attempted_at >= $1
            ORDER BY attempted_at DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(attempts)
    }

    async fn suspicious_ips(
        &self,
        since: DateTime<Utc>,
        threshold: i64,
    ) -> Result<Vec<SuspiciousIp>> {
        let rows = sqlx::query(
            r#"
            SELECT ip_address, COUNT(*) AS failures
            FROM login_attempts
            WHERE success = FALSE AND attempted_at >= $1
            GROUP BY ip_address
            HAVING COUNT(*) >= $2
            ORDER BY failures DESC
            "#,
        )
        .bind(since)
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(SuspiciousIp {
                    ip_address: row.try_get("ip_address")?,
                    failures: row.try_get("failures")?,
                })
            })
            .collect()
    }
}
