//! Common library for the campus stationery store
//!
//! Infrastructure shared by the services: PostgreSQL connectivity and
//! migrations, the Redis connection wrapper, database error types and the
//! tracing bootstrap.
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, health_check, init_pool, run_migrations};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     common::telemetry::init_tracing();
//!     let pool = init_pool(&DatabaseConfig::from_env()?).await?;
//!     run_migrations(&pool).await?;
//!     assert!(health_check(&pool).await?);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod database;
pub mod error;
pub mod telemetry;
