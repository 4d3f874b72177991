//! Redis 임대 잠금
//!
//! 획득은 `SET NX PX`, 갱신과 반납은 보유자를 비교하는 Lua 스크립트로
//! 원자적으로 처리합니다.

use std::time::Duration;

use redis::Script;
use redis::aio::MultiplexedConnection;
use tracing::info;

use courier_core::config::RedisConfig;
use courier_core::error::ElectionError;
use courier_core::pipeline::BoxFuture;

use super::LeaseLock;

const RENEW_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
end
return 0
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// `<prefix>:lease:<namespace>:<lock>` 키를 쓰는 임대 잠금
#[derive(Clone)]
pub struct RedisLease {
    conn: MultiplexedConnection,
    key: String,
}

impl std::fmt::Debug for RedisLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisLease").field("key", &self.key).finish()
    }
}

impl RedisLease {
    pub async fn connect(
        config: &RedisConfig,
        namespace: &str,
        lock_name: &str,
    ) -> Result<Self, ElectionError> {
        let client =
            redis::Client::open(config.url()).map_err(|e| ElectionError::Backend(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ElectionError::Backend(e.to_string()))?;
        let key = lease_key(&config.prefix, namespace, lock_name);
        info!(address = %config.address, key = %key, "redis lease connected");
        Ok(Self { conn, key })
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

fn lease_key(prefix: &str, namespace: &str, lock_name: &str) -> String {
    if prefix.is_empty() {
        format!("lease:{namespace}:{lock_name}")
    } else {
        format!("{prefix}:lease:{namespace}:{lock_name}")
    }
}

fn backend(e: redis::RedisError) -> ElectionError {
    ElectionError::Backend(e.to_string())
}

impl LeaseLock for RedisLease {
    fn try_acquire_or_renew(
        &self,
        identity: &str,
        lease: Duration,
    ) -> BoxFuture<'_, Result<bool, ElectionError>> {
        let identity = identity.to_owned();
        let millis = u64::try_from(lease.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(&self.key)
                .arg(&identity)
                .arg("NX")
                .arg("PX")
                .arg(millis)
                .query_async(&mut conn)
                .await
                .map_err(backend)?;
            if acquired.is_some() {
                return Ok(true);
            }

            let renewed: i64 = Script::new(RENEW_SCRIPT)
                .key(&self.key)
                .arg(&identity)
                .arg(millis)
                .invoke_async(&mut conn)
                .await
                .map_err(backend)?;
            Ok(renewed == 1)
        })
    }

    fn holder(&self) -> BoxFuture<'_, Result<Option<String>, ElectionError>> {
        let mut conn = self.conn.clone();
        Box::pin(async move {
            redis::cmd("GET")
                .arg(&self.key)
                .query_async(&mut conn)
                .await
                .map_err(backend)
        })
    }

    fn release(&self, identity: &str) -> BoxFuture<'_, Result<(), ElectionError>> {
        let identity = identity.to_owned();
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let _: i64 = Script::new(RELEASE_SCRIPT)
                .key(&self.key)
                .arg(&identity)
                .invoke_async(&mut conn)
                .await
                .map_err(backend)?;
            Ok(())
        })
    }
}
