//! 시크릿 변경 감시와 대상 핫 리로드
//!
//! 시크릿이 바뀌면 그 시크릿을 참조하는 대상만 같은 ID로 다시 만들어
//! 레지스트리에 교체합니다. 재생성에 실패하면 기존 대상을 유지합니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use courier_core::error::TargetError;
use courier_core::metrics as m;

use crate::collection::Collection;
use crate::factory::TargetFactory;
use crate::secrets::{SecretEvent, SecretStore};

/// 초기 동기화 여부를 공유하는 핸들
#[derive(Debug, Clone, Default)]
pub struct SyncState(Arc<AtomicBool>);

impl SyncState {
    pub fn has_synced(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self, synced: bool) {
        self.0.store(synced, Ordering::Release);
    }
}

/// 시크릿 감시자
pub struct SecretWatcher {
    store: Arc<dyn SecretStore>,
    factory: TargetFactory,
    collection: Arc<Collection>,
    events: mpsc::Receiver<SecretEvent>,
    sync_timeout: Duration,
    state: SyncState,
}

impl SecretWatcher {
    pub fn new(
        store: Arc<dyn SecretStore>,
        factory: TargetFactory,
        collection: Arc<Collection>,
        events: mpsc::Receiver<SecretEvent>,
        sync_timeout: Duration,
    ) -> Self {
        Self {
            store,
            factory,
            collection,
            events,
            sync_timeout,
            state: SyncState::default(),
        }
    }

    /// 초기 목록 조회가 끝났고 감시 연결이 정상인지
    pub fn has_synced(&self) -> bool {
        self.state.has_synced()
    }

    pub fn sync_state(&self) -> SyncState {
        self.state.clone()
    }

    /// 초기 목록을 읽은 뒤 취소되거나 이벤트 채널이 닫힐 때까지 변경을 처리합니다.
    ///
    /// 초기 목록 조회가 `sync_timeout` 안에 끝나지 않으면
    /// [`TargetError::SyncTimeout`]을 반환합니다.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), TargetError> {
        self.sync().await?;
        self.watch(cancel).await;
        Ok(())
    }

    /// 초기 목록 조회. 성공하면 동기화 상태가 되고 시크릿 수를 반환합니다.
    pub async fn sync(&self) -> Result<usize, TargetError> {
        let timeout_secs = self.sync_timeout.as_secs();
        let names = match tokio::time::timeout(self.sync_timeout, self.store.list()).await {
            Ok(Ok(names)) => names,
            Ok(Err(e)) => {
                warn!(error = %e, "initial secret listing failed");
                return Err(TargetError::SyncTimeout { timeout_secs });
            }
            Err(_elapsed) => return Err(TargetError::SyncTimeout { timeout_secs }),
        };
        self.state.set(true);
        info!(secrets = names.len(), "secret watcher synced");
        Ok(names.len())
    }

    /// 취소되거나 이벤트 채널이 닫힐 때까지 변경 이벤트를 처리합니다.
    pub async fn watch(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("secret watcher cancelled");
                    break;
                }
                event = self.events.recv() => {
                    let Some(event) = event else {
                        info!("secret event channel closed, stopping watcher");
                        break;
                    };
                    self.handle(event).await;
                }
            }
        }

        self.state.set(false);
    }

    async fn handle(&self, event: SecretEvent) {
        match event {
            SecretEvent::Updated(name) => {
                let rebuilt = self.reload(&name).await;
                debug!(secret = %name, rebuilt, "secret update handled");
            }
            SecretEvent::WatchError(reason) => {
                if self.state.has_synced() {
                    warn!(reason = %reason, "secret watch failed, waiting for resync");
                }
                self.state.set(false);
            }
            SecretEvent::Resynced => {
                info!("secret watch resynced");
                self.state.set(true);
            }
        }
    }

    /// 시크릿 `name`을 참조하는 대상을 다시 만들고 교체한 개수를 반환합니다.
    pub async fn reload(&self, name: &str) -> usize {
        let affected: Vec<_> = self
            .collection
            .targets()
            .into_iter()
            .filter(|t| t.secret() == name)
            .collect();

        let mut rebuilt = 0;
        for target in &affected {
            match self.factory.rebuild(target).await {
                Some(replacement) => {
                    info!(
                        target_name = replacement.name(),
                        target_id = %replacement.id,
                        secret = name,
                        "target rebuilt after secret change"
                    );
                    self.collection.update(replacement);
                    metrics::counter!(m::TARGETS_REBUILDS_TOTAL).increment(1);
                    rebuilt += 1;
                }
                None => {
                    warn!(
                        target_name = target.name(),
                        target_id = %target.id,
                        secret = name,
                        "rebuild failed, keeping previous target"
                    );
                }
            }
        }
        rebuilt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::DefaultAdapterBuilder;
    use crate::config::TargetsConfig;
    use crate::secrets::{MemorySecretStore, RetryPolicy, SecretValues};
    use courier_core::pipeline::BoxFuture;

    fn host(url: &str) -> SecretValues {
        SecretValues {
            host: url.to_owned(),
            ..Default::default()
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 0,
            backoff_base: Duration::from_millis(1),
            attempt_timeout: Duration::from_secs(1),
        }
    }

    async fn setup() -> (Arc<MemorySecretStore>, TargetFactory, Arc<Collection>) {
        let store = Arc::new(MemorySecretStore::new());
        store.insert("loki", host("http://old")).await;

        let mut config = TargetsConfig::parse(
            r#"
loki:
  secretRef: loki
  channels:
    - config:
        host: http://plain
      secretRef: other
webhook:
  config:
    webhook: http://hooks/a
"#,
        )
        .unwrap();
        let factory = TargetFactory::new(Arc::new(DefaultAdapterBuilder))
            .with_secrets(store.clone())
            .with_retry(fast_retry());
        let targets = factory.create_targets(&mut config).await;
        (store, factory, Arc::new(Collection::new(targets)))
    }

    #[tokio::test]
    async fn reload_rebuilds_only_dependent_targets_with_same_id() {
        // Given
        let (store, factory, collection) = setup().await;
        assert_eq!(collection.len(), 3);
        let before = collection.targets();
        let (_tx, rx) = mpsc::channel(1);
        let watcher = SecretWatcher::new(
            store.clone(),
            factory,
            collection.clone(),
            rx,
            Duration::from_secs(1),
        );

        // When: loki 시크릿 변경
        store.insert("loki", host("http://new")).await;
        let rebuilt = watcher.reload("loki").await;

        // Then: 하나만 재생성, ID와 크기 유지
        assert_eq!(rebuilt, 1);
        assert_eq!(collection.len(), 3);
        let after = collection.targets();
        assert_eq!(after[0].id, before[0].id);
        assert_eq!(after[0].client.endpoint(), "http://new/loki/api/v1/push");
        assert!(Arc::ptr_eq(&after[2].client, &before[2].client));
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_previous_target() {
        let (store, _, collection) = setup().await;
        let before = collection.targets();

        // 시크릿을 읽지 못하는 팩토리로 재생성하면 호스트가 없어 실패
        let broken = TargetFactory::new(Arc::new(DefaultAdapterBuilder))
            .with_secrets(Arc::new(MemorySecretStore::new()))
            .with_retry(fast_retry());
        let (_tx, rx) = mpsc::channel(1);
        let watcher =
            SecretWatcher::new(store, broken, collection.clone(), rx, Duration::from_secs(1));

        assert_eq!(watcher.reload("loki").await, 0);
        assert!(Arc::ptr_eq(
            &collection.targets()[0].client,
            &before[0].client
        ));
    }

    #[tokio::test]
    async fn run_syncs_and_applies_events() {
        // Given
        let (store, factory, collection) = setup().await;
        let (tx, rx) = mpsc::channel(8);
        let watcher = SecretWatcher::new(
            store.clone(),
            factory,
            collection.clone(),
            rx,
            Duration::from_secs(1),
        );
        let state = watcher.sync_state();
        assert!(!state.has_synced());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(cancel.clone()));

        // When: 감시 오류 후 재동기화, 그리고 시크릿 변경
        tx.send(SecretEvent::WatchError("connection reset".to_owned()))
            .await
            .unwrap();
        store.insert("loki", host("http://rotated")).await;
        tx.send(SecretEvent::Resynced).await.unwrap();
        tx.send(SecretEvent::Updated("loki".to_owned())).await.unwrap();
        drop(tx);

        // Then: 채널이 닫히면 정상 종료, 변경 반영
        handle.await.unwrap().unwrap();
        assert_eq!(
            collection.targets()[0].client.endpoint(),
            "http://rotated/loki/api/v1/push"
        );
        assert!(!state.has_synced());
    }

    #[tokio::test]
    async fn watch_error_clears_synced_until_resync() {
        let (store, factory, collection) = setup().await;
        // 용량 1: 세 번째 send가 끝나면 첫 이벤트 처리가 끝난 상태
        let (tx, rx) = mpsc::channel(1);
        let watcher = SecretWatcher::new(store, factory, collection, rx, Duration::from_secs(1));
        let state = watcher.sync_state();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(cancel.clone()));

        tx.send(SecretEvent::WatchError("gone".to_owned())).await.unwrap();
        tx.send(SecretEvent::Updated("none".to_owned())).await.unwrap();
        tx.send(SecretEvent::Updated("none".to_owned())).await.unwrap();
        assert!(!state.has_synced());

        tx.send(SecretEvent::Resynced).await.unwrap();
        tx.send(SecretEvent::Updated("none".to_owned())).await.unwrap();
        tx.send(SecretEvent::Updated("none".to_owned())).await.unwrap();
        assert!(state.has_synced());

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    struct HangingStore;

    impl SecretStore for HangingStore {
        fn get(&self, _name: &str) -> BoxFuture<'_, Result<SecretValues, TargetError>> {
            Box::pin(std::future::pending())
        }

        fn list(&self) -> BoxFuture<'_, Result<Vec<String>, TargetError>> {
            Box::pin(std::future::pending())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn initial_listing_timeout_is_sync_error() {
        let (_tx, rx) = mpsc::channel(1);
        let watcher = SecretWatcher::new(
            Arc::new(HangingStore),
            TargetFactory::new(Arc::new(DefaultAdapterBuilder)),
            Arc::new(Collection::default()),
            rx,
            Duration::from_secs(30),
        );

        let err = watcher.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, TargetError::SyncTimeout { timeout_secs: 30 }));
    }
}
