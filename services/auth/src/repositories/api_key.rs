//! PostgreSQL API-key repository

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::ApiKeyRepository;
use crate::models::{ApiKey, NewApiKey};

#[derive(Clone)]
pub struct PgApiKeyRepository {
    pool: PgPool,
}

impl PgApiKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApiKeyRepository for PgApiKeyRepository {
    async fn create(&self, new_key: &NewApiKey) -> Result<ApiKey> {
        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (id, key, name, user_id, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, key, name, user_id, created_at, expires_at, last_used_at, is_active
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new_key.key)
        .bind(&new_key.name)
        .bind(new_key.user_id)
        .bind(new_key.expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(key)
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<ApiKey>> {
        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            SELECT id, key, name, user_id, created_at, expires_at, last_used_at, is_active
            FROM api_keys WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(key)
    }

    async fn mark_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
