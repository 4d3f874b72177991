//! 리더 선출
//!
//! 이름 있는 임대(lease)를 가진 레플리카 하나만 디스패처를 실행합니다.
//!
//! 상태 전이: `Standby → Leading`(임대 획득) `→ Standby`(갱신 실패) 또는
//! `→ Stopped`(취소). [`LeaderElector::run`]은 프로세스 수명 동안 실행되며
//! 반환값은 항상 에러입니다.

mod memory;
mod remote;

pub use self::memory::MemoryLease;
pub use self::remote::RedisLease;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use courier_core::config::LeaderElectionConfig;
use courier_core::error::ElectionError;
use courier_core::metrics as m;
use courier_core::pipeline::BoxFuture;

/// 분산 임대 잠금
pub trait LeaseLock: Send + Sync {
    /// 비어 있거나 만료됐거나 이미 `identity`가 가진 임대를 `lease` 동안 잡습니다.
    fn try_acquire_or_renew(
        &self,
        identity: &str,
        lease: Duration,
    ) -> BoxFuture<'_, Result<bool, ElectionError>>;

    /// 현재 보유자
    fn holder(&self) -> BoxFuture<'_, Result<Option<String>, ElectionError>>;

    /// `identity`가 보유 중이면 임대를 반납합니다.
    fn release(&self, identity: &str) -> BoxFuture<'_, Result<(), ElectionError>>;
}

/// 선출 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionState {
    Standby,
    Leading,
    Stopped,
}

/// 선출 파라미터
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionConfig {
    pub identity: String,
    pub lock_name: String,
    pub namespace: String,
    pub lease_duration: Duration,
    pub renew_deadline: Duration,
    pub retry_period: Duration,
    pub release_on_cancel: bool,
}

impl ElectionConfig {
    pub fn from_config(config: &LeaderElectionConfig, identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            lock_name: config.lock_name.clone(),
            namespace: config.namespace.clone(),
            lease_duration: config.lease_duration(),
            renew_deadline: config.renew_deadline(),
            retry_period: config.retry_period(),
            release_on_cancel: config.release_on_cancel,
        }
    }
}

type StartedCallback = Box<dyn Fn(CancellationToken) + Send + Sync>;
type StoppedCallback = Box<dyn Fn() + Send + Sync>;
type NewLeaderCallback = Box<dyn Fn(&str, &str) + Send + Sync>;

/// "내가 리더인가"를 공유하는 플래그
///
/// `on_new_leader`에서 보고된 리더와 자기 식별자를 비교해 갱신합니다.
#[derive(Debug, Clone, Default)]
pub struct LeaderFlag(Arc<AtomicBool>);

impl LeaderFlag {
    pub fn observe(&self, leader: &str, own: &str) {
        self.0.store(leader == own, Ordering::Release);
    }

    pub fn is_leader(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// 리더 선출 루프
pub struct LeaderElector {
    config: ElectionConfig,
    lock: Arc<dyn LeaseLock>,
    on_started_leading: StartedCallback,
    on_stopped_leading: StoppedCallback,
    on_new_leader: NewLeaderCallback,
    state: watch::Sender<ElectionState>,
    observed: Mutex<Option<String>>,
}

impl LeaderElector {
    pub fn new(config: ElectionConfig, lock: Arc<dyn LeaseLock>) -> Self {
        let (state, _) = watch::channel(ElectionState::Standby);
        Self {
            config,
            lock,
            on_started_leading: Box::new(|_| {}),
            on_stopped_leading: Box::new(|| {}),
            on_new_leader: Box::new(|_, _| {}),
            state,
            observed: Mutex::new(None),
        }
    }

    /// 리더가 되면 호출됩니다. 토큰은 리더십을 잃으면 취소됩니다.
    pub fn on_started_leading(
        mut self,
        callback: impl Fn(CancellationToken) + Send + Sync + 'static,
    ) -> Self {
        self.on_started_leading = Box::new(callback);
        self
    }

    pub fn on_stopped_leading(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_stopped_leading = Box::new(callback);
        self
    }

    /// 관찰된 리더가 바뀔 때마다 `(leader, own_identity)`로 호출됩니다.
    pub fn on_new_leader(mut self, callback: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.on_new_leader = Box::new(callback);
        self
    }

    pub fn identity(&self) -> &str {
        &self.config.identity
    }

    pub fn state(&self) -> ElectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ElectionState> {
        self.state.subscribe()
    }

    /// 선출 루프를 실행합니다.
    ///
    /// 리더십을 잃으면 [`ElectionError::LeadershipLost`], 취소되면
    /// [`ElectionError::Stopped`]를 반환합니다.
    pub async fn run(&self, cancel: CancellationToken) -> ElectionError {
        let mut ticker = tokio::time::interval(self.config.retry_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            identity = %self.config.identity,
            lock = %self.config.lock_name,
            namespace = %self.config.namespace,
            "starting leader election"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return self.stop(false).await,
                _ = ticker.tick() => {}
            }

            let acquired = self.try_acquire().await;
            self.observe_leader().await;
            if acquired {
                return self.lead(&cancel, &mut ticker).await;
            }
        }
    }

    async fn lead(&self, cancel: &CancellationToken, ticker: &mut tokio::time::Interval) -> ElectionError {
        self.transition(ElectionState::Leading);
        info!(identity = %self.config.identity, lock = %self.config.lock_name, "started leading");

        let leading = cancel.child_token();
        (self.on_started_leading)(leading.clone());
        let mut last_renew = Instant::now();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    leading.cancel();
                    return self.stop(true).await;
                }
                _ = ticker.tick() => {}
            }

            if self.try_acquire().await {
                last_renew = Instant::now();
                continue;
            }

            if last_renew.elapsed() >= self.config.renew_deadline {
                break;
            }
        }

        leading.cancel();
        warn!(identity = %self.config.identity, lock = %self.config.lock_name, "leadership lost");
        self.transition(ElectionState::Standby);
        (self.on_stopped_leading)();
        self.observe_leader().await;
        ElectionError::LeadershipLost {
            lock: self.config.lock_name.clone(),
        }
    }

    async fn stop(&self, was_leading: bool) -> ElectionError {
        if was_leading {
            if self.config.release_on_cancel {
                match self.lock.release(&self.config.identity).await {
                    Ok(()) => debug!(lock = %self.config.lock_name, "lease released"),
                    Err(e) => warn!(lock = %self.config.lock_name, error = %e, "failed to release lease"),
                }
            }
            (self.on_stopped_leading)();
        }
        self.transition(ElectionState::Stopped);
        info!(identity = %self.config.identity, "leader election stopped");
        ElectionError::Stopped {
            lock: self.config.lock_name.clone(),
        }
    }

    async fn try_acquire(&self) -> bool {
        match self
            .lock
            .try_acquire_or_renew(&self.config.identity, self.config.lease_duration)
            .await
        {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!(lock = %self.config.lock_name, error = %e, "lease attempt failed");
                false
            }
        }
    }

    async fn observe_leader(&self) {
        let holder = match self.lock.holder().await {
            Ok(Some(holder)) => holder,
            Ok(None) => return,
            Err(e) => {
                debug!(error = %e, "failed to read lease holder");
                return;
            }
        };

        let mut observed = self.observed.lock().await;
        if observed.as_deref() == Some(holder.as_str()) {
            return;
        }
        info!(leader = %holder, "new leader observed");
        (self.on_new_leader)(&holder, &self.config.identity);
        *observed = Some(holder);
    }

    fn transition(&self, next: ElectionState) {
        let previous = self.state.send_replace(next);
        if previous == next {
            return;
        }
        metrics::gauge!(m::LEADER_STATUS).set(if next == ElectionState::Leading { 1.0 } else { 0.0 });
        metrics::counter!(m::LEADER_TRANSITIONS_TOTAL).increment(1);
    }
}
