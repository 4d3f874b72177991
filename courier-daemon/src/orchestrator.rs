//! Module orchestration -- assembly, channel wiring, and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `courier-daemon`.
//! It builds the target registry from `targets.yaml`, wires the report
//! channel into the dispatcher, registers the modules and runs the main
//! loop until a signal or a fatal module error.
//!
//! # Startup Order
//!
//! 1. Secret watcher (initial sync must finish before anything delivers)
//! 2. Dispatcher (consumes reports, paused while on standby)
//! 3. Leader election (activates the dispatcher once the lease is held)
//!
//! # Shutdown Order (reverse)
//!
//! Leader election releases the lease first, then delivery and secret
//! watching stop.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};

use courier_core::config::CourierConfig;
use courier_core::metrics as m;
use courier_core::types::Report;
use courier_targets::{
    Collection, DefaultAdapterBuilder, DirectorySecretStore, Dispatcher, ReadinessGate,
    StaticNamespaceResolver, TargetFactory, TargetsConfig,
};

use crate::health::{DaemonHealth, ModuleHealth, aggregate_status};
use crate::metrics_server;
use crate::modules::dispatcher::Activation;
use crate::modules::{self, ModuleRegistry};

const REPORT_CHANNEL_CAPACITY: usize = 256;
const FATAL_CHANNEL_CAPACITY: usize = 4;

/// The main daemon orchestrator.
pub struct Orchestrator {
    config: CourierConfig,
    modules: ModuleRegistry,
    collection: Arc<Collection>,
    readiness: Arc<ReadinessGate>,
    /// Ingest side of the dispatcher. Handed to the report watch loop.
    report_tx: mpsc::Sender<Arc<Report>>,
    /// Errors that end the process, e.g. a lost lease.
    fatal_rx: mpsc::Receiver<String>,
    shutdown_tx: broadcast::Sender<()>,
    start_time: Instant,
}

impl Orchestrator {
    /// Load `courier.toml` (with environment overrides) and build.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = CourierConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// # Errors
    ///
    /// - Configuration validation fails
    /// - `targets.yaml` cannot be read or parsed
    /// - The cache or lease backend cannot be reached
    pub async fn build_from_config(config: CourierConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let targets_config = load_targets(&config).await?;
        let store = secret_store(&config);
        let (collection, factory) = build_collection(targets_config, store.clone()).await;
        let collection = Arc::new(collection);
        tracing::info!(targets = collection.len(), "target registry built");

        let cache = courier_targets::cache::from_config(&config.cache, &config.redis)
            .await
            .map_err(|e| anyhow::anyhow!("failed to create dedup cache: {}", e))?;
        let dispatcher = Dispatcher::new(collection.clone(), cache);
        let readiness = Arc::new(ReadinessGate::new(
            config.rest.enabled,
            config.leader_election.enabled,
        ));

        let (report_tx, report_rx) = mpsc::channel(REPORT_CHANNEL_CAPACITY);
        let (fatal_tx, fatal_rx) = mpsc::channel(FATAL_CHANNEL_CAPACITY);
        let (shutdown_tx, _) = broadcast::channel(16);
        let activation = Activation::new(!config.leader_election.enabled);

        let mut registry = ModuleRegistry::new();
        if let Some(handle) = modules::secrets::init(&config, store, &factory, &collection) {
            registry.register(handle);
        }
        registry.register(modules::dispatcher::init(
            dispatcher,
            report_rx,
            activation.clone(),
        ));
        if let Some(handle) =
            modules::leader::init(&config, activation, readiness.clone(), fatal_tx).await?
        {
            registry.register(handle);
        }

        tracing::info!(
            modules = registry.count(),
            names = ?registry.names(),
            "orchestrator initialized"
        );
        if config.metrics.enabled {
            record_daemon_metrics(registry.count());
        }

        Ok(Self {
            config,
            modules: registry,
            collection,
            readiness,
            report_tx,
            fatal_rx,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Start all modules and block until shutdown.
    ///
    /// # Shutdown Triggers
    ///
    /// - `SIGTERM` or `SIGINT`
    /// - A fatal module error (returned as `Err` after cleanup)
    pub async fn run(&mut self) -> Result<()> {
        let pid_file = self.config.general.pid_file.clone();
        if !pid_file.is_empty() {
            write_pid_file(Path::new(&pid_file))?;
        }

        tracing::info!("starting all modules");
        if let Err(e) = self.modules.start_all().await {
            tracing::warn!("startup failed, rolling back already-started modules");
            if let Err(stop_err) = self.modules.stop_all().await {
                tracing::error!(
                    startup_error = %e,
                    rollback_error = %stop_err,
                    "rollback also failed during startup failure cleanup"
                );
            }
            if !pid_file.is_empty() {
                remove_pid_file(Path::new(&pid_file));
            }
            return Err(e);
        }

        let readiness_task = spawn_readiness_waiter(
            self.readiness.clone(),
            self.shutdown_tx.subscribe(),
        );
        let uptime_task = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, self.shutdown_tx.subscribe()));

        tracing::info!("entering main event loop");
        let outcome = tokio::select! {
            signal = wait_for_shutdown_signal() => {
                let signal = signal?;
                tracing::info!(signal, "shutdown signal received");
                Ok(())
            }
            reason = self.fatal_rx.recv() => {
                let reason = reason.unwrap_or_else(|| "fatal channel closed".to_owned());
                tracing::error!(reason = %reason, "fatal module error, shutting down");
                Err(anyhow::anyhow!("fatal: {}", reason))
            }
        };

        let _ = self.shutdown_tx.send(());
        let _ = readiness_task.await;
        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        let stopped = self.shutdown().await;
        if !pid_file.is_empty() {
            remove_pid_file(Path::new(&pid_file));
        }
        outcome.and(stopped)
    }

    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping all modules");
        self.modules.stop_all().await
    }

    /// Current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let modules: Vec<ModuleHealth> = self
            .modules
            .health_statuses()
            .await
            .into_iter()
            .map(|(name, enabled, status)| ModuleHealth {
                name,
                enabled,
                status,
            })
            .collect();

        let uptime_secs = self.start_time.elapsed().as_secs();
        if self.config.metrics.enabled {
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
        }

        DaemonHealth {
            status: aggregate_status(&modules),
            uptime_secs,
            ready: self.readiness.running(),
            targets: self.collection.len(),
            modules,
        }
    }

    /// Sender for reports to deliver.
    pub fn report_sender(&self) -> mpsc::Sender<Arc<Report>> {
        self.report_tx.clone()
    }

    pub fn collection(&self) -> &Arc<Collection> {
        &self.collection
    }

    pub fn readiness(&self) -> &Arc<ReadinessGate> {
        &self.readiness
    }

    /// Module names in start order.
    pub fn module_names(&self) -> Vec<&str> {
        self.modules.names()
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }
}

/// Build the target tree from the configured files and count valid targets.
///
/// Used by `--validate`. Nothing is started.
pub async fn validate_targets(config: &CourierConfig) -> Result<usize> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
    let targets_config = load_targets(config).await?;
    let (collection, _) = build_collection(targets_config, secret_store(config)).await;
    Ok(collection.len())
}

/// An empty `targets_file` means no targets.
async fn load_targets(config: &CourierConfig) -> Result<TargetsConfig> {
    let path = &config.general.targets_file;
    if path.is_empty() {
        tracing::warn!("no targets file configured, no delivery targets");
        return Ok(TargetsConfig::default());
    }
    TargetsConfig::load(path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load targets from {}: {}", path, e))
}

fn secret_store(config: &CourierConfig) -> Option<Arc<DirectorySecretStore>> {
    (!config.secrets.dir.is_empty())
        .then(|| Arc::new(DirectorySecretStore::new(&config.secrets.dir)))
}

async fn build_collection(
    mut targets_config: TargetsConfig,
    store: Option<Arc<DirectorySecretStore>>,
) -> (Collection, TargetFactory) {
    let mut factory = TargetFactory::new(Arc::new(DefaultAdapterBuilder));
    if let Some(store) = store {
        factory = factory.with_secrets(store);
    }
    if !targets_config.namespace_labels.is_empty() {
        factory = factory.with_resolver(Arc::new(StaticNamespaceResolver::new(
            targets_config.namespace_labels.clone(),
        )));
    }

    let targets = factory.create_targets(&mut targets_config).await;
    (Collection::new(targets), factory)
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Write the current process PID to a file.
///
/// # Security
///
/// - `create_new(true)` creates the file atomically
/// - The created file must be a regular file
/// - The parent directory is created with mode 0o700, the file with 0o600
///
/// # Errors
///
/// Fails when the file already exists or cannot be written.
pub fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            let mut builder = fs::DirBuilder::new();
            builder.mode(0o700).recursive(true);
            builder.create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    if !file.metadata()?.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{}", pid)?;
    tracing::info!(pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file. Failures are logged only.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file");
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

/// Logs once the readiness gate opens.
fn spawn_readiness_waiter(
    readiness: Arc<ReadinessGate>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = readiness.wait() => {
                tracing::info!(gated = readiness.required(), "courier ready to deliver");
            }
            _ = shutdown_rx.recv() => {
                tracing::debug!("shutdown before readiness");
            }
        }
    })
}

fn record_daemon_metrics(module_count: usize) {
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    #[allow(clippy::cast_precision_loss)]
    metrics::gauge!(m::DAEMON_MODULES_REGISTERED).set(module_count as f64);

    tracing::debug!(
        module_count,
        version = env!("CARGO_PKG_VERSION"),
        "daemon metrics recorded"
    );
}

/// Refreshes the uptime gauge every 10 seconds.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
