//! 전송 중복 제거 캐시
//!
//! "이 결과 ID를 이미 처리했는가"만 답합니다. 재전송 억제 정책은
//! [`Dispatcher`](crate::dispatch::Dispatcher)가 담당합니다.
//!
//! - [`MemoryCache`]: 프로세스 내부 맵 (단일 레플리카)
//! - [`RedisCache`]: 레플리카 간 공유 (`SET PX`, `EXISTS`)

mod memory;
mod remote;

pub use self::memory::MemoryCache;
pub(crate) use self::memory::deadline;
pub use self::remote::RedisCache;

use std::sync::Arc;

use courier_core::config::{CacheConfig, RedisConfig};
use courier_core::error::CacheError;
use courier_core::pipeline::BoxFuture;

/// TTL 기반 존재 확인 저장소
pub trait DedupCache: Send + Sync {
    /// ID를 TTL 동안 처리됨으로 표시합니다.
    fn add(&self, id: &str) -> BoxFuture<'_, Result<(), CacheError>>;

    /// TTL 안에 추가된 적이 있는지
    fn has(&self, id: &str) -> BoxFuture<'_, Result<bool, CacheError>>;

    /// 여러 레플리카가 같은 상태를 보는지
    fn shared(&self) -> bool;
}

/// 설정에 맞는 캐시 백엔드를 만듭니다.
///
/// 메모리 백엔드는 호출한 런타임에 정리 태스크를 띄웁니다.
pub async fn from_config(
    cache: &CacheConfig,
    redis: &RedisConfig,
) -> Result<Arc<dyn DedupCache>, CacheError> {
    match cache.backend.as_str() {
        "redis" => Ok(Arc::new(RedisCache::connect(redis, cache.ttl()).await?)),
        _ => {
            let memory = Arc::new(MemoryCache::new(cache.ttl()));
            memory.spawn_purge(cache.ttl());
            Ok(memory)
        }
    }
}
