//! 프로세스 내부 캐시

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use courier_core::error::CacheError;
use courier_core::pipeline::BoxFuture;

use super::DedupCache;

/// 만료 시각 계산이 넘칠 때 대신 쓰는 기간 (약 30년)
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// `now + ttl`. 넘치면 먼 미래로 고정합니다.
pub(crate) fn deadline(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// ID별 만료 시각을 가진 맵
#[derive(Debug)]
pub struct MemoryCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Instant>>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// 만료된 항목을 지우고 지운 개수를 반환합니다.
    pub async fn purge(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, expires| *expires > now);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// 주기적으로 만료 항목을 지우는 태스크
    ///
    /// 캐시가 해제되면 태스크도 종료됩니다.
    pub fn spawn_purge(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    return;
                };
                let removed = cache.purge().await;
                if removed > 0 {
                    debug!(removed, "purged expired cache entries");
                }
            }
        })
    }
}

impl DedupCache for MemoryCache {
    fn add(&self, id: &str) -> BoxFuture<'_, Result<(), CacheError>> {
        let id = id.to_owned();
        Box::pin(async move {
            let expires = deadline(Instant::now(), self.ttl);
            self.entries.lock().await.insert(id, expires);
            Ok(())
        })
    }

    fn has(&self, id: &str) -> BoxFuture<'_, Result<bool, CacheError>> {
        let id = id.to_owned();
        Box::pin(async move {
            let entries = self.entries.lock().await;
            Ok(entries
                .get(&id)
                .is_some_and(|expires| *expires > Instant::now()))
        })
    }

    fn shared(&self) -> bool {
        false
    }
}
