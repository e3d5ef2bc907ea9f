//! Campus stationery store: item catalog, inventory ledger and the HTTP
//! application that ties them to the authentication layer

pub mod app;
pub mod config;
pub mod error;
pub mod jobs;
pub mod ledger;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod state;

pub use config::AppConfig;
pub use error::{ApiError, LedgerError};
pub use ledger::InventoryLedger;
pub use repositories::InventoryRepositories;
pub use state::AppState;
