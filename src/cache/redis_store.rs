//! Redis-backed persistent tier
//!
//! Values are written with `SETEX`; prefix invalidation walks the keyspace
//! with `SCAN MATCH`, which is O(matching keys) and kept off hot paths.

use crate::config::RedisConfig;
use crate::core::KeyValueStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult};
use secrecy::ExposeSecret;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

const SCAN_BATCH: usize = 500;

/// Redis key-value store over a reconnecting connection manager
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    timeout: Duration,
}

impl RedisStore {
    /// Connect and verify with `PING`
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.expose_secret())
            .map_err(|e| Error::Config(format!("Invalid Redis URL: {}", e)))?;

        let conn = tokio::time::timeout(config.timeout, ConnectionManager::new(client)).await??;

        let store = RedisStore {
            conn,
            timeout: config.timeout,
        };
        store.health_check().await?;

        info!("Redis cache tier connected");
        Ok(store)
    }

    async fn bounded<T>(&self, fut: impl Future<Output = RedisResult<T>>) -> Result<T> {
        Ok(tokio::time::timeout(self.timeout, fut).await??)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        self.bounded(async move { conn.get(key).await }).await
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        // SETEX rejects zero
        let seconds = ttl.as_secs().max(1);
        self.bounded(async move { conn.set_ex(key, value, seconds).await })
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = self.bounded(async move { conn.del(key).await }).await?;
        Ok(removed > 0)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = self
                .bounded(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn),
                )
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!("SCAN {} matched {} keys", pattern, keys.len());
        Ok(keys)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let removed: i64 = self.bounded(async move { conn.del(keys.to_vec()).await }).await?;
        Ok(removed.max(0) as usize)
    }

    async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let pong: String = self
            .bounded(async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        if pong != "PONG" {
            return Err(Error::StoreConnection(format!("unexpected PING reply: {}", pong)));
        }
        Ok(())
    }
}
