use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use auth::session_store::{ClientSessionStore, MemoryClientSessionStore, RedisClientSessionStore};
use auth::{AuthConfig, AuthRepositories, AuthService, AuthState};
use common::cache::{RedisConfig, RedisPool};
use common::database::{DatabaseConfig, health_check, init_pool, run_migrations};
use common::telemetry::init_tracing;
use inventory::config::StorageBackend;
use inventory::ledger::LedgerPolicy;
use inventory::{AppConfig, AppState, InventoryLedger, InventoryRepositories, app, jobs};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    info!("Starting campus stationery service");

    let config = AppConfig::from_env()?;
    let auth_config = AuthConfig::from_env()?;

    let (db_pool, auth_repos, inventory_repos) = match config.storage {
        StorageBackend::Postgres => {
            let db_config = DatabaseConfig::from_env()?;
            let pool = init_pool(&db_config).await?;

            if health_check(&pool).await? {
                info!("Database connection successful");
            } else {
                anyhow::bail!("Failed to connect to database");
            }
            run_migrations(&pool).await?;

            (
                Some(pool.clone()),
                AuthRepositories::postgres(pool.clone()),
                InventoryRepositories::postgres(pool),
            )
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; nothing survives a restart");
            (
                None,
                AuthRepositories::in_memory(),
                InventoryRepositories::in_memory(),
            )
        }
    };

    let auth_service = AuthService::new(auth_repos, auth_config);
    if config.reconcile_sessions_on_startup {
        auth_service.reconcile_sessions().await?;
    }
    if let Some((username, password)) = config.admin_credentials() {
        auth_service.bootstrap_admin(username, password).await?;
    }

    // Browser sessions live in Redis next to PostgreSQL, in memory otherwise
    let client_sessions: Arc<dyn ClientSessionStore> = match config.storage {
        StorageBackend::Postgres => {
            let redis = RedisPool::new(&RedisConfig::from_env()?).await?;
            Arc::new(RedisClientSessionStore::new(redis))
        }
        StorageBackend::Memory => Arc::new(MemoryClientSessionStore::new()),
    };

    let ledger = InventoryLedger::new(inventory_repos, LedgerPolicy::from(&config));
    let _scheduler = jobs::start(&config, auth_service.clone(), ledger.clone()).await?;

    let state = AppState {
        db_pool,
        ledger,
        auth: AuthState::new(auth_service, client_sessions),
    };
    let app = app::create_app(state);

    let listener = TcpListener::bind(config.bind_address.as_str()).await?;
    info!("Listening on {}", config.bind_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
