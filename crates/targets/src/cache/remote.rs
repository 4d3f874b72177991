//! Redis 공유 캐시

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use tracing::info;

use courier_core::config::RedisConfig;
use courier_core::error::CacheError;
use courier_core::pipeline::BoxFuture;

use super::DedupCache;

/// `<prefix>:<id>` 키에 PX TTL로 값을 쓰는 캐시
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
    prefix: String,
    ttl: Duration,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("prefix", &self.prefix)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl RedisCache {
    pub async fn connect(config: &RedisConfig, ttl: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.url())
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        info!(address = %config.address, prefix = %config.prefix, "redis cache connected");
        Ok(Self::with_connection(conn, config.prefix.clone(), ttl))
    }

    pub fn with_connection(conn: MultiplexedConnection, prefix: String, ttl: Duration) -> Self {
        Self { conn, prefix, ttl }
    }

    fn key(&self, id: &str) -> String {
        cache_key(&self.prefix, id)
    }
}

fn cache_key(prefix: &str, id: &str) -> String {
    if prefix.is_empty() {
        id.to_owned()
    } else {
        format!("{prefix}:{id}")
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl DedupCache for RedisCache {
    fn add(&self, id: &str) -> BoxFuture<'_, Result<(), CacheError>> {
        let key = self.key(id);
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let _: () = redis::cmd("SET")
                .arg(&key)
                .arg(1)
                .arg("PX")
                .arg(ttl_millis(self.ttl))
                .query_async(&mut conn)
                .await
                .map_err(|e| CacheError::Command(e.to_string()))?;
            Ok(())
        })
    }

    fn has(&self, id: &str) -> BoxFuture<'_, Result<bool, CacheError>> {
        let key = self.key(id);
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let exists: bool = redis::cmd("EXISTS")
                .arg(&key)
                .query_async(&mut conn)
                .await
                .map_err(|e| CacheError::Command(e.to_string()))?;
            Ok(exists)
        })
    }

    fn shared(&self) -> bool {
        true
    }
}
