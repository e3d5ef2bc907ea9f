//! Application state shared across handlers

use sqlx::PgPool;

use auth::AuthState;

use crate::ledger::InventoryLedger;

#[derive(Clone)]
pub struct AppState {
    /// `None` when running on the in-memory backend
    pub db_pool: Option<PgPool>,
    pub ledger: InventoryLedger,
    pub auth: AuthState,
}
