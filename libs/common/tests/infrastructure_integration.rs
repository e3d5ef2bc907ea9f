//! Integration tests for the infrastructure components
//!
//! These tests verify that the PostgreSQL database and Redis cache
//! are properly configured and that the schema migrations apply cleanly.

use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool, run_migrations},
};
use sqlx::Row;

#[tokio::test]
#[ignore = "requires PostgreSQL at DATABASE_URL and Redis at REDIS_URL"]
async fn test_infrastructure_integration() -> Result<(), Box<dyn std::error::Error>> {
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;
    assert!(health_check(&pool).await?, "Database health check failed");

    run_migrations(&pool).await?;

    // Every table the services rely on must exist after migrating
    for table in [
        "users",
        "login_attempts",
        "active_sessions",
        "api_keys",
        "items",
        "transactions",
    ] {
        let row = sqlx::query("SELECT to_regclass($1) IS NOT NULL AS present")
            .bind(format!("public.{table}"))
            .fetch_one(&pool)
            .await?;
        let present: bool = row.get("present");
        assert!(present, "table {table} missing after migrations");
    }

    let redis_config = RedisConfig::from_env()?;
    let redis_pool = RedisPool::new(&redis_config).await?;
    assert!(
        redis_pool.health_check().await?,
        "Redis health check failed"
    );

    let test_key = "integration_test_key";
    redis_pool.set(test_key, "integration_test_value", Some(10)).await?;
    assert_eq!(
        redis_pool.get(test_key).await?,
        Some("integration_test_value".to_string())
    );
    redis_pool.delete(test_key).await?;
    assert_eq!(redis_pool.get(test_key).await?, None);

    Ok(())
}
