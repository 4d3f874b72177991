//! 준비 상태 게이트
//!
//! REST와 리더 선출이 모두 켜져 있으면 대기 레플리카는 리더가 될 때까지
//! 트래픽 준비를 알리지 않습니다. 그 외 구성에서는 기다리지 않습니다.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::info;

#[derive(Debug)]
pub struct ReadinessGate {
    required: bool,
    ready: watch::Sender<bool>,
    running: AtomicBool,
}

impl ReadinessGate {
    pub fn new(rest_enabled: bool, leader_election_enabled: bool) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            required: rest_enabled && leader_election_enabled,
            ready,
            running: AtomicBool::new(false),
        }
    }

    pub fn required(&self) -> bool {
        self.required
    }

    /// 준비 신호를 한 번만 보냅니다. 여러 번 호출해도 됩니다.
    pub fn ready(&self) {
        if !self.required {
            return;
        }
        let fired = self.ready.send_if_modified(|ready| {
            if *ready {
                return false;
            }
            *ready = true;
            true
        });
        if fired {
            info!("readiness signalled");
        }
    }

    /// 준비 신호가 올 때까지 기다립니다. 게이트가 필요 없으면 바로 반환합니다.
    pub async fn wait(&self) {
        if self.required {
            let mut rx = self.ready.subscribe();
            // 송신자는 self가 소유하므로 채널이 닫히지 않음
            let _ = rx.wait_for(|ready| *ready).await;
        }
        self.running.store(true, Ordering::Release);
    }

    /// `wait()`가 이미 풀렸는지
    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_returns_immediately_when_not_required() {
        for (rest, leader) in [(false, false), (true, false), (false, true)] {
            let gate = ReadinessGate::new(rest, leader);
            assert!(!gate.required());
            tokio::time::timeout(Duration::from_secs(1), gate.wait())
                .await
                .unwrap();
            assert!(gate.running());
        }
    }

    #[tokio::test]
    async fn wait_blocks_until_ready_from_another_task() {
        // Given: REST와 리더 선출 모두 활성
        let gate = Arc::new(ReadinessGate::new(true, true));
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait().await })
        };

        // When: 신호 전
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Then: 아직 대기 중
        assert!(!waiter.is_finished());
        assert!(!gate.running());

        // When: 다른 태스크에서 준비 신호
        let signaller = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.ready() })
        };
        signaller.await.unwrap();

        // Then
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(gate.running());
    }

    #[tokio::test]
    async fn ready_is_idempotent_and_later_waiters_pass() {
        let gate = ReadinessGate::new(true, true);
        gate.ready();
        gate.ready();

        tokio::time::timeout(Duration::from_secs(1), gate.wait())
            .await
            .unwrap();
        assert!(gate.running());
    }
}
