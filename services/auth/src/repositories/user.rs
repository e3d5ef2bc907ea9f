//! User repository for database operations

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use super::UserRepository;
use crate::models::{NewUser, User};

const USER_COLUMNS: &str = "id, username, email, password_hash, role, two_fa_enabled, \
     two_fa_secret, last_login_ip, last_login_time, created_at";

/// User repository
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {column} = $1"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| user_from_row(&row)).transpose()
    }
}

pub(crate) fn user_from_row(row: &PgRow) -> Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: role.parse()?,
        two_fa_enabled: row.try_get("two_fa_enabled")?,
        two_fa_secret: row.try_get("two_fa_secret")?,
        last_login_ip: row.try_get("last_login_ip")?,
        last_login_time: row.try_get("last_login_time")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, new_user: &NewUser) -> Result<User> {
        info!("Creating new {} user: {}", new_user.role, new_user.username);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (id, username, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(new_user.role.as_str())
        .fetch_one(&self.pool)
        .await?;

        user_from_row(&row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| user_from_row(&row)).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find_one("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_one("email", email).await
    }

    async fn set_two_factor(&self, id: Uuid, secret: Option<&str>, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE users SET two_fa_secret = $2, two_fa_enabled = $3 WHERE id = $1")
            .bind(id)
            .bind(secret)
            .bind(enabled)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
