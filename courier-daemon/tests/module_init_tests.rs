//! Module initialization and lifecycle tests.
//!
//! Starts and stops the real modules against temp directories. Nothing
//! here talks to the network.

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use courier_core::config::CourierConfig;
use courier_core::pipeline::HealthStatus;
use courier_core::types::Report;
use courier_daemon::modules::ModuleRegistry;
use courier_daemon::modules::dispatcher::{self, Activation};
use courier_daemon::modules::secrets;
use courier_targets::{
    Collection, DefaultAdapterBuilder, DirectorySecretStore, Dispatcher, MemoryCache,
    TargetFactory, TargetsConfig,
};
use tempfile::TempDir;
use tokio::sync::mpsc;

async fn secret_backed_collection(
    store: Arc<DirectorySecretStore>,
) -> (TargetFactory, Arc<Collection>) {
    let factory = TargetFactory::new(Arc::new(DefaultAdapterBuilder)).with_secrets(store);
    let mut targets = TargetsConfig::parse("loki:\n  secretRef: loki\n").unwrap();
    let collection = Arc::new(Collection::new(factory.create_targets(&mut targets).await));
    (factory, collection)
}

fn empty_report() -> Arc<Report> {
    Arc::new(Report {
        id: "polr-a".to_owned(),
        name: "polr-a".to_owned(),
        namespace: "team-a".to_owned(),
        source: "kyverno".to_owned(),
        labels: BTreeMap::new(),
        scope: None,
        results: vec![],
        creation_timestamp: Utc::now(),
    })
}

#[tokio::test]
async fn test_secrets_module_disabled_without_directory() {
    let config = CourierConfig::default();
    let factory = TargetFactory::new(Arc::new(DefaultAdapterBuilder));
    let collection = Arc::new(Collection::default());

    assert!(secrets::init(&config, None, &factory, &collection).is_none());
}

#[tokio::test]
async fn test_secrets_module_disabled_when_no_target_uses_secrets() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(DirectorySecretStore::new(dir.path()));
    let factory = TargetFactory::new(Arc::new(DefaultAdapterBuilder));
    let collection = Arc::new(Collection::default());

    assert!(secrets::init(&CourierConfig::default(), Some(store), &factory, &collection).is_none());
}

#[tokio::test]
async fn test_secrets_module_syncs_then_stops() {
    // Given: A readable secret directory
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("loki.json"), r#"{"host":"http://loki:3100"}"#).unwrap();
    let store = Arc::new(DirectorySecretStore::new(dir.path()));
    let (factory, collection) = secret_backed_collection(store.clone()).await;
    assert_eq!(collection.len(), 1);

    let mut handle = secrets::init(&CourierConfig::default(), Some(store), &factory, &collection)
        .expect("module should be registered");

    // When
    handle.pipeline.start().await.expect("should start");

    // Then: Synced, and a second start is refused
    assert!(handle.health_check().await.is_healthy());
    assert!(handle.pipeline.start().await.is_err());

    handle.pipeline.stop().await.expect("should stop");
    assert!(handle.pipeline.stop().await.is_err());
}

#[tokio::test]
async fn test_secrets_module_fails_start_when_directory_unreadable() {
    // Given: Targets were built while the directory existed, then it vanished
    let dir = TempDir::new().unwrap();
    let secret_dir = dir.path().join("secrets");
    fs::create_dir(&secret_dir).unwrap();
    fs::write(secret_dir.join("loki.json"), r#"{"host":"http://loki:3100"}"#).unwrap();
    let store = Arc::new(DirectorySecretStore::new(&secret_dir));
    let (factory, collection) = secret_backed_collection(store.clone()).await;
    fs::remove_dir_all(&secret_dir).unwrap();

    let mut config = CourierConfig::default();
    config.secrets.sync_timeout_secs = 1;
    let mut registry = ModuleRegistry::new();
    registry.register(
        secrets::init(&config, Some(store), &factory, &collection).expect("module registered"),
    );

    // When
    let err = registry.start_all().await.unwrap_err();

    // Then: Startup fails with the sync timeout and nothing needs stopping
    assert!(err.to_string().contains("secret-watcher"), "{err}");
    registry.stop_all().await.expect("nothing started");
}

#[tokio::test]
async fn test_dispatch_module_can_restart() {
    // Given
    let collection = Arc::new(Collection::default());
    let cache = Arc::new(MemoryCache::new(Duration::from_secs(60)));
    let (tx, rx) = mpsc::channel(4);
    let mut handle = dispatcher::init(Dispatcher::new(collection, cache), rx, Activation::new(true));
    assert!(matches!(handle.health_check().await, HealthStatus::Unhealthy(_)));

    // When: start, feed a report, stop, start again
    handle.pipeline.start().await.expect("first start");
    tx.send(empty_report()).await.unwrap();
    handle.pipeline.stop().await.expect("stop");
    handle.pipeline.start().await.expect("restart keeps the report channel");

    // Then
    assert!(handle.health_check().await.is_healthy());
    tx.send(empty_report()).await.unwrap();
    handle.pipeline.stop().await.expect("final stop");
}

#[tokio::test]
async fn test_dispatch_module_unhealthy_when_channel_closes() {
    let collection = Arc::new(Collection::default());
    let cache = Arc::new(MemoryCache::new(Duration::from_secs(60)));
    let (tx, rx) = mpsc::channel(1);
    let mut handle = dispatcher::init(Dispatcher::new(collection, cache), rx, Activation::new(false));

    handle.pipeline.start().await.expect("start");
    drop(tx);

    // the loop exits once it sees the closed channel
    let mut status = handle.health_check().await;
    for _ in 0..50 {
        if !status.is_healthy() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        status = handle.health_check().await;
    }
    assert!(matches!(status, HealthStatus::Unhealthy(reason) if reason.contains("closed")));
    handle.pipeline.stop().await.expect("stop");
}

#[test]
fn test_activation_is_shared_between_clones() {
    let activation = Activation::new(false);
    let observer = activation.clone();

    activation.activate();
    assert!(observer.is_active());

    observer.deactivate();
    assert!(!activation.is_active());
}
