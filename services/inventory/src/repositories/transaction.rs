//! Ledger repository for database operations

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Row, postgres::PgRow};

use super::{TransactionRepository, item::ITEM_COLUMNS, page};
use crate::models::{
    Item, KindActivity, MAX_STOCK, NewTransaction, Recorded, RentalClosed, Transaction,
    TransactionFilter, TransactionKind,
};

const TRANSACTION_COLUMNS: &str = "id, user_id, item_id, kind, qty, timestamp, rent_days, \
     rent_start_date, rent_due_date, returned, return_date, extension_requested, \
     extension_days, extension_approved, extension_approved_at";

#[derive(Clone)]
pub struct PgTransactionRepository {
    pool: PgPool,
}

impl PgTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction> {
    let kind: String = row.try_get("kind")?;
    Ok(Transaction {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        item_id: row.try_get("item_id")?,
        kind: kind.parse()?,
        qty: row.try_get("qty")?,
        timestamp: row.try_get("timestamp")?,
        rent_days: row.try_get("rent_days")?,
        rent_start_date: row.try_get("rent_start_date")?,
        rent_due_date: row.try_get("rent_due_date")?,
        returned: row.try_get("returned")?,
        return_date: row.try_get("return_date")?,
        extension_requested: row.try_get("extension_requested")?,
        extension_days: row.try_get("extension_days")?,
        extension_approved: row.try_get("extension_approved")?,
        extension_approved_at: row.try_get("extension_approved_at")?,
    })
}

fn transactions_from_rows(rows: &[PgRow]) -> Result<Vec<Transaction>> {
    rows.iter().map(transaction_from_row).collect()
}

async fn insert_entry<'e, E>(executor: E, entry: &NewTransaction) -> Result<Transaction>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO transactions
            (user_id, item_id, kind, qty, timestamp, rent_days, rent_start_date, rent_due_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {TRANSACTION_COLUMNS}
        "#
    ))
    .bind(entry.user_id)
    .bind(entry.item_id)
    .bind(entry.kind.as_str())
    .bind(entry.qty)
    .bind(entry.timestamp)
    .bind(entry.rental.map(|terms| terms.days))
    .bind(entry.rental.map(|terms| terms.start_date))
    .bind(entry.rental.map(|terms| terms.due_date))
    .fetch_one(executor)
    .await?;
    transaction_from_row(&row)
}

#[async_trait]
impl TransactionRepository for PgTransactionRepository {
    async fn withdraw(&self, entry: &NewTransaction) -> Result<Option<Recorded>> {
        let mut tx = self.pool.begin().await?;

        // Zero rows means the item is missing or short; dropping `tx` rolls back
        let item = sqlx::query_as::<_, Item>(&format!(
            r#"
            UPDATE items SET stock = stock - $2
            WHERE id = $1 AND stock >= $2
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(entry.item_id)
        .bind(entry.qty)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(item) = item else {
            return Ok(None);
        };

        let transaction = insert_entry(&mut *tx, entry).await?;
        tx.commit().await?;
        Ok(Some(Recorded { item, transaction }))
    }

    async fn deposit(&self, entry: &NewTransaction) -> Result<Option<Recorded>> {
        let mut tx = self.pool.begin().await?;

        // Zero rows means the item is missing or the stock would overflow
        let item = sqlx::query_as::<_, Item>(&format!(
            r#"
            UPDATE items SET stock = stock + $2
            WHERE id = $1 AND stock <= $3 - $2
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(entry.item_id)
        .bind(entry.qty)
        .bind(MAX_STOCK)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(item) = item else {
            return Ok(None);
        };

        let transaction = insert_entry(&mut *tx, entry).await?;
        tx.commit().await?;
        Ok(Some(Recorded { item, transaction }))
    }

    async fn close_rental(
        &self,
        rental_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<RentalClosed>> {
        let mut tx = self.pool.begin().await?;

        // Only the first of two concurrent returns matches `returned = FALSE`
        let row = sqlx::query(&format!(
            r#"
            UPDATE transactions SET returned = TRUE, return_date = $2
            WHERE id = $1 AND kind = 'rent' AND returned = FALSE
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(rental_id)
        .bind(at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let rental = transaction_from_row(&row)?;

        let item = sqlx::query_as::<_, Item>(&format!(
            "UPDATE items SET stock = stock + $2 WHERE id = $1 RETURNING {ITEM_COLUMNS}"
        ))
        .bind(rental.item_id)
        .bind(rental.qty)
        .fetch_one(&mut *tx)
        .await?;

        let entry = NewTransaction::new(
            TransactionKind::Return,
            rental.item_id,
            rental.user_id,
            rental.qty,
            at,
        );
        let entry = insert_entry(&mut *tx, &entry).await?;

        tx.commit().await?;
        Ok(Some(RentalClosed {
            rental,
            entry,
            item,
        }))
    }

    async fn request_extension(&self, rental_id: i64, days: i32) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE transactions SET extension_requested = TRUE, extension_days = $2
            WHERE id = $1 AND kind = 'rent' AND returned = FALSE
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(rental_id)
        .bind(days)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn approve_extension(
        &self,
        rental_id: i64,
        days: i32,
        at: DateTime<Utc>,
    ) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE transactions
            SET rent_due_date = rent_due_date + $2,
                extension_approved = TRUE,
                extension_days = $2,
                extension_approved_at = $3
            WHERE id = $1 AND kind = 'rent' AND returned = FALSE
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(rental_id)
        .bind(days)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn oldest_open_rental(&self, item_id: i64) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS} FROM transactions
            WHERE item_id = $1 AND kind = 'rent' AND returned = FALSE
            ORDER BY timestamp, id
            LIMIT 1
            "#
        ))
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn count_open_rentals(&self, item_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transactions WHERE item_id = $1 AND kind = 'rent' AND returned = FALSE",
        )
        .bind(item_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn open_rentals(&self) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS} FROM transactions
            WHERE kind = 'rent' AND returned = FALSE
            ORDER BY rent_due_date, id
            "#
        ))
        .fetch_all(&self.pool)
        .await?;
        transactions_from_rows(&rows)
    }

    async fn overdue(&self, today: NaiveDate) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS} FROM transactions
            WHERE kind = 'rent' AND returned = FALSE AND rent_due_date < $1
            ORDER BY rent_due_date, id
            "#
        ))
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        transactions_from_rows(&rows)
    }

    async fn list(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let (limit, offset) = page(filter.limit, filter.offset);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS} FROM transactions
            WHERE ($1::timestamptz IS NULL OR timestamp >= $1)
              AND ($2::timestamptz IS NULL OR timestamp <= $2)
              AND ($3::text IS NULL OR kind = $3)
              AND ($4::uuid IS NULL OR user_id = $4)
              AND ($5::boolean IS NULL OR returned = $5)
              AND ($6::date IS NULL OR rent_due_date >= $6)
              AND ($7::date IS NULL OR rent_due_date < $7)
            ORDER BY timestamp DESC, id DESC
            LIMIT $8 OFFSET $9
            "#
        ))
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.kind.map(|kind| kind.as_str()))
        .bind(filter.user_id)
        .bind(filter.returned)
        .bind(filter.due_from)
        .bind(filter.due_before)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        transactions_from_rows(&rows)
    }

    async fn activity(&self, kind: TransactionKind, since: DateTime<Utc>) -> Result<KindActivity> {
        let (count, latest): (i64, Option<DateTime<Utc>>) = sqlx::query_as(
            "SELECT COUNT(*), MAX(timestamp) FROM transactions WHERE kind = $1 AND timestamp >= $2",
        )
        .bind(kind.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(KindActivity { count, latest })
    }
}
