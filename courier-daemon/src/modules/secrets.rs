//! Secret watcher module.
//!
//! Polls the secret directory and rebuilds every target that references a
//! changed secret, keeping its ID.
//!
//! ```text
//! DirectorySecretStore --SecretEvent--> SecretWatcher --rebuild--> Collection
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use courier_core::config::CourierConfig;
use courier_core::error::{CourierError, PipelineError};
use courier_core::pipeline::{HealthStatus, Pipeline};
use courier_targets::{Collection, DirectorySecretStore, SecretWatcher, SyncState, TargetFactory};

use super::ModuleHandle;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Initialize the secret watcher module.
///
/// Returns `None` when no secret directory is configured or no target
/// references a secret.
pub fn init(
    config: &CourierConfig,
    store: Option<Arc<DirectorySecretStore>>,
    factory: &TargetFactory,
    collection: &Arc<Collection>,
) -> Option<ModuleHandle> {
    let Some(store) = store else {
        tracing::info!("no secret directory configured, hot reload disabled");
        return None;
    };
    if !collection.uses_secrets() {
        tracing::info!("no target references a secret, hot reload disabled");
        return None;
    }

    let module = SecretsModule {
        store,
        factory: factory.clone(),
        collection: collection.clone(),
        poll_interval: Duration::from_secs(config.secrets.poll_interval_secs),
        sync_timeout: Duration::from_secs(config.secrets.sync_timeout_secs),
        state: SyncState::default(),
        cancel: None,
        tasks: Vec::new(),
    };
    Some(ModuleHandle::new("secret-watcher", true, Box::new(module)))
}

pub struct SecretsModule {
    store: Arc<DirectorySecretStore>,
    factory: TargetFactory,
    collection: Arc<Collection>,
    poll_interval: Duration,
    sync_timeout: Duration,
    state: SyncState,
    cancel: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline for SecretsModule {
    /// Fails with a sync timeout when the initial listing does not finish in time.
    async fn start(&mut self) -> Result<(), CourierError> {
        if self.cancel.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let watcher = SecretWatcher::new(
            self.store.clone(),
            self.factory.clone(),
            self.collection.clone(),
            rx,
            self.sync_timeout,
        );
        let secrets = watcher.sync().await?;
        self.state = watcher.sync_state();

        let cancel = CancellationToken::new();
        self.tasks.push(
            self.store
                .clone()
                .spawn_poller(self.poll_interval, tx, cancel.clone()),
        );
        self.tasks.push(tokio::spawn(watcher.watch(cancel.clone())));
        self.cancel = Some(cancel);

        tracing::info!(
            dir = %self.store.dir().display(),
            secrets,
            poll_interval_secs = self.poll_interval.as_secs(),
            "secret watcher running"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), CourierError> {
        let Some(cancel) = self.cancel.take() else {
            return Err(PipelineError::NotRunning.into());
        };
        cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "secret watcher task panicked");
            }
        }
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        if self.cancel.is_none() {
            return HealthStatus::Unhealthy("not running".to_owned());
        }
        if self.state.has_synced() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded("secret directory not synced".to_owned())
        }
    }
}
