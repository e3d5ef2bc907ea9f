//! Item repository for database operations

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{ItemRepository, page};
use crate::models::{Item, ItemQuery, NewItem};

pub(crate) const ITEM_COLUMNS: &str =
    "id, name, description, category, price, stock, rentable, image_filename, created_at";

#[derive(Clone)]
pub struct PgItemRepository {
    pool: PgPool,
}

impl PgItemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItemRepository for PgItemRepository {
    async fn create(&self, item: &NewItem, at: DateTime<Utc>) -> Result<Item> {
        let created = sqlx::query_as::<_, Item>(&format!(
            r#"
            INSERT INTO items (name, description, category, price, stock, rentable, image_filename, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(&item.name)
        .bind(&item.description)
        .bind(&item.category)
        .bind(item.price)
        .bind(item.stock)
        .bind(item.rentable)
        .bind(&item.image_filename)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Item>> {
        let item = sqlx::query_as::<_, Item>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    async fn list(&self, query: &ItemQuery) -> Result<Vec<Item>> {
        let (limit, offset) = page(query.limit, query.offset);
        let items = sqlx::query_as::<_, Item>(&format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM items
            WHERE ($1::text IS NULL OR category = $1)
              AND ($2::bool IS NULL OR rentable = $2)
              AND ($3::text IS NULL OR name ILIKE '%' || $3 || '%')
            ORDER BY name, id
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(&query.category)
        .bind(query.rentable)
        .bind(&query.search)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn low_stock(&self, threshold: i32) -> Result<Vec<Item>> {
        let items = sqlx::query_as::<_, Item>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE stock <= $1 ORDER BY stock, name"
        ))
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }
}
