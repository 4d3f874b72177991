//! 프로세스 내 임대 잠금
//!
//! 같은 프로세스의 여러 선출자가 `Arc`로 공유합니다. 단일 레플리카
//! 배포와 테스트에 씁니다.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use courier_core::error::ElectionError;
use courier_core::pipeline::BoxFuture;

use crate::cache::deadline;

use super::LeaseLock;

#[derive(Debug)]
struct Lease {
    holder: String,
    expires_at: Instant,
}

/// 메모리 임대 잠금
#[derive(Debug, Default)]
pub struct MemoryLease {
    lease: Mutex<Option<Lease>>,
}

impl MemoryLease {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LeaseLock for MemoryLease {
    fn try_acquire_or_renew(
        &self,
        identity: &str,
        lease: Duration,
    ) -> BoxFuture<'_, Result<bool, ElectionError>> {
        let identity = identity.to_owned();
        Box::pin(async move {
            let now = Instant::now();
            let mut current = self.lease.lock().await;
            let free = match current.as_ref() {
                None => true,
                Some(held) => held.holder == identity || held.expires_at <= now,
            };
            if free {
                *current = Some(Lease {
                    holder: identity,
                    expires_at: deadline(now, lease),
                });
            }
            Ok(free)
        })
    }

    fn holder(&self) -> BoxFuture<'_, Result<Option<String>, ElectionError>> {
        Box::pin(async move {
            let current = self.lease.lock().await;
            Ok(current
                .as_ref()
                .filter(|held| held.expires_at > Instant::now())
                .map(|held| held.holder.clone()))
        })
    }

    fn release(&self, identity: &str) -> BoxFuture<'_, Result<(), ElectionError>> {
        let identity = identity.to_owned();
        Box::pin(async move {
            let mut current = self.lease.lock().await;
            if current.as_ref().is_some_and(|held| held.holder == identity) {
                *current = None;
            }
            Ok(())
        })
    }
}
