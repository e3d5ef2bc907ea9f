//! Redis cache module
//!
//! Thin wrapper over a multiplexed Redis connection. The services use it as
//! the backing store for short-lived, per-browser state that must be shared
//! between worker processes.

use anyhow::Result;
use redis::{AsyncCommands, Client};
use tracing::info;

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Prefix prepended to every key written through the pool
    pub key_prefix: String,
}

impl RedisConfig {
    /// Create a new RedisConfig from environment variables
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
    /// - `REDIS_KEY_PREFIX`: Namespace for keys (default: "stationery")
    pub fn from_env() -> Result<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let key_prefix =
            std::env::var("REDIS_KEY_PREFIX").unwrap_or_else(|_| "stationery".to_string());

        Ok(RedisConfig { url, key_prefix })
    }
}

/// Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
    key_prefix: String,
}

impl RedisPool {
    /// Initialize a new Redis connection pool
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.clone())?;
        info!("Redis client initialized with URL: {}", config.url);
        Ok(RedisPool {
            client,
            key_prefix: config.key_prefix.clone(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    /// Set a key-value pair in Redis with optional TTL
    pub async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let key = self.key(key);

        if let Some(ttl) = ttl_seconds {
            let _: () = conn.set_ex(key, value, ttl).await?;
        } else {
            let _: () = conn.set(key, value).await?;
        }

        Ok(())
    }

    /// Get a value from Redis by key
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(self.key(key)).await?;
        Ok(value)
    }

    /// Delete a key from Redis
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: u64 = conn.del(self.key(key)).await?;
        Ok(())
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> RedisConfig {
        RedisConfig {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "stationery-test".to_string(),
        }
    }

    #[tokio::test]
    async fn keys_are_namespaced_by_prefix() -> Result<()> {
        let pool = RedisPool::new(&local_config()).await?;
        assert_eq!(pool.key("client_session:abc"), "stationery-test:client_session:abc");
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a running Redis on localhost:6379"]
    async fn test_set_get_delete() -> Result<()> {
        let pool = RedisPool::new(&local_config()).await?;
        assert!(pool.health_check().await?);

        let key = "test_key";
        pool.set(key, "test_value", Some(5)).await?;
        assert_eq!(pool.get(key).await?, Some("test_value".to_string()));

        pool.delete(key).await?;
        assert_eq!(pool.get(key).await?, None);

        Ok(())
    }
}
