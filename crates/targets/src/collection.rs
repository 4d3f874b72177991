//! 전송 대상 레지스트리
//!
//! 현재 활성 대상의 불변 스냅샷([`Registry`])을 `watch` 채널로 보관합니다.
//! 갱신은 전체 목록을 새로 만든 뒤 포인터 하나를 교체하므로 읽는 쪽은
//! 락 없이 일관된 목록만 봅니다.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use courier_core::metrics as m;

use crate::client::{Client, DeliveryMode};
use crate::factory::Target;

/// 특정 시점의 대상 목록과 전송 단위별 분할
#[derive(Debug, Default)]
pub struct Registry {
    targets: Vec<Target>,
    clients: Vec<Arc<dyn Client>>,
    single: Vec<Arc<dyn Client>>,
    batch: Vec<Arc<dyn Client>>,
}

impl Registry {
    fn new(targets: Vec<Target>) -> Self {
        let clients: Vec<Arc<dyn Client>> = targets.iter().map(|t| t.client.clone()).collect();
        let (single, batch): (Vec<_>, Vec<_>) = clients
            .iter()
            .cloned()
            .partition(|c| c.mode() == DeliveryMode::SingleSend);
        Self {
            targets,
            clients,
            single,
            batch,
        }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn clients(&self) -> &[Arc<dyn Client>] {
        &self.clients
    }

    pub fn single_send_clients(&self) -> &[Arc<dyn Client>] {
        &self.single
    }

    pub fn batch_send_clients(&self) -> &[Arc<dyn Client>] {
        &self.batch
    }

    pub fn get(&self, id: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.id == id)
    }
}

/// 동시 접근 가능한 대상 모음
#[derive(Debug)]
pub struct Collection {
    snapshot: watch::Sender<Arc<Registry>>,
}

impl Default for Collection {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Collection {
    pub fn new(targets: Vec<Target>) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Registry::new(targets)));
        let collection = Self { snapshot };
        collection.record_size();
        collection
    }

    /// 현재 스냅샷
    pub fn snapshot(&self) -> Arc<Registry> {
        self.snapshot.borrow().clone()
    }

    /// 스냅샷 교체 알림 구독
    pub fn subscribe(&self) -> watch::Receiver<Arc<Registry>> {
        self.snapshot.subscribe()
    }

    /// 같은 ID의 대상을 교체하거나 새로 추가합니다.
    pub fn update(&self, target: Target) {
        let id = target.id.clone();
        self.snapshot.send_modify(move |current| {
            let mut targets = current.targets.clone();
            match targets.iter_mut().find(|t| t.id == target.id) {
                Some(slot) => *slot = target,
                None => targets.push(target),
            }
            *current = Arc::new(Registry::new(targets));
        });
        debug!(target_id = %id, "registry updated");
        self.record_size();
    }

    pub fn targets(&self) -> Vec<Target> {
        self.snapshot().targets.clone()
    }

    pub fn clients(&self) -> Vec<Arc<dyn Client>> {
        self.snapshot().clients.clone()
    }

    pub fn single_send_clients(&self) -> Vec<Arc<dyn Client>> {
        self.snapshot().single.clone()
    }

    pub fn batch_send_clients(&self) -> Vec<Arc<dyn Client>> {
        self.snapshot().batch.clone()
    }

    /// 유효 시크릿 참조를 가진 대상이 하나라도 있는지
    pub fn uses_secrets(&self) -> bool {
        self.snapshot()
            .targets
            .iter()
            .any(|t| !t.secret().is_empty())
    }

    pub fn len(&self) -> usize {
        self.snapshot.borrow().targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record_size(&self) {
        metrics::gauge!(m::TARGETS_REGISTERED).set(self.len() as f64);
    }
}
