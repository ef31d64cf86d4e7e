//! Redis-compatible key-value store using deadpool-redis
//!
//! Works with Redis and drop-in compatible servers (Valkey, Dragonfly).

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Config, Pool, Runtime};
use pipeline::{FastStoreWriter, ResourceError};
use serde::{Deserialize, Serialize};

use crate::KvStoreError;

fn default_port() -> u16 {
    6379
}

/// Connection settings for [`RedisKvStore`]
///
/// Passed through from the `[resources.redis]` configuration table.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub db: u8,
    #[serde(default)]
    pub password: Option<String>,
}

impl RedisConfig {
    /// Connection URL in `redis://[:password@]host:port/db` form
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }

    /// Connection URL safe for logging
    fn sanitized_url(&self) -> String {
        match &self.password {
            Some(_) => format!("redis://:***@{}:{}/{}", self.host, self.port, self.db),
            None => self.url(),
        }
    }
}

impl std::fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Redis-compatible key-value store
///
/// Uses connection pooling via deadpool-redis. Values are written with plain
/// `SET`, so rewriting a key with the same value is a no-op in effect.
pub struct RedisKvStore {
    pool: Pool,
}

impl RedisKvStore {
    /// Create a pool and validate the connection with `PING`
    pub async fn new(config: &RedisConfig) -> Result<Self, KvStoreError> {
        let sanitized_url = config.sanitized_url();

        let mut pool_config = Config::from_url(config.url());
        pool_config.pool = Some(deadpool_redis::PoolConfig {
            max_size: 4,
            timeouts: deadpool_redis::Timeouts {
                wait: Some(Duration::from_secs(5)),
                create: Some(Duration::from_secs(5)),
                recycle: Some(Duration::from_secs(5)),
            },
            ..Default::default()
        });
        let pool = pool_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| {
                KvStoreError::Connection(format!(
                    "Failed to create Redis pool for {sanitized_url}: {e}"
                ))
            })?;

        let mut conn = pool.get().await.map_err(|e| {
            KvStoreError::Connection(format!(
                "Failed to get Redis connection from pool for {sanitized_url}: {e}"
            ))
        })?;

        deadpool_redis::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| {
                KvStoreError::Connection(format!("Redis PING failed for {sanitized_url}: {e}"))
            })?;

        tracing::debug!(url = %sanitized_url, "Redis key-value store connected");

        Ok(Self { pool })
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvStoreError> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.set(key, value).await?;
        Ok(())
    }
}

#[async_trait]
impl FastStoreWriter for RedisKvStore {
    async fn put(&self, key: &str, value: &str) -> Result<(), ResourceError> {
        self.set(key, value).await?;
        tracing::debug!(key, value, "Value stored in Redis");
        Ok(())
    }
}
