//! Orchestrator assembly tests.
//!
//! Config -> targets.yaml -> registry -> module registration. Nothing here
//! waits for OS signals; `run()` is covered by the module lifecycle tests.

use std::fs;
use std::path::Path;

use courier_core::config::CourierConfig;
use courier_core::pipeline::HealthStatus;
use courier_daemon::orchestrator::{Orchestrator, validate_targets};
use tempfile::TempDir;

const TARGETS_YAML: &str = r#"
loki:
  secretRef: loki
  channels:
    - name: Loki Errors
      config:
        host: http://loki-errors:3100
      minimumSeverity: high
webhook:
  name: Team Hook
  config:
    webhook: http://hooks.local/team
slack:
  config:
    webhook: ""
"#;

/// Config pointing at a targets file, with an optional secret directory.
fn test_config(targets: &Path, secrets: Option<&Path>) -> CourierConfig {
    let mut config = CourierConfig::default();
    config.general.targets_file = targets.display().to_string();
    if let Some(dir) = secrets {
        config.secrets.dir = dir.display().to_string();
    }
    config
}

fn write_targets(dir: &TempDir, yaml: &str) -> std::path::PathBuf {
    let path = dir.path().join("targets.yaml");
    fs::write(&path, yaml).expect("should write targets.yaml");
    path
}

#[tokio::test]
async fn test_build_without_secret_dir_registers_dispatcher_only() {
    // Given: Targets with a literal host only
    let dir = TempDir::new().unwrap();
    let targets = write_targets(
        &dir,
        "webhook:\n  config:\n    webhook: http://hooks.local/a\n",
    );

    // When
    let orchestrator = Orchestrator::build_from_config(test_config(&targets, None))
        .await
        .expect("should build");

    // Then
    assert_eq!(orchestrator.collection().len(), 1);
    assert_eq!(orchestrator.module_names(), vec!["dispatcher"]);
    assert!(!orchestrator.readiness().required());
}

#[tokio::test]
async fn test_build_with_secret_references_registers_watcher_first() {
    // Given: A secret directory providing the Loki host
    let dir = TempDir::new().unwrap();
    let secrets = dir.path().join("secrets");
    fs::create_dir(&secrets).unwrap();
    fs::write(secrets.join("loki.json"), r#"{"host":"http://loki:3100"}"#).unwrap();
    let targets = write_targets(&dir, TARGETS_YAML);

    // When
    let orchestrator = Orchestrator::build_from_config(test_config(&targets, Some(&secrets)))
        .await
        .expect("should build");

    // Then: loki parent + channel + webhook; the empty slack node is skipped
    assert_eq!(orchestrator.collection().len(), 3);
    assert_eq!(
        orchestrator.module_names(),
        vec!["secret-watcher", "dispatcher"]
    );
}

#[tokio::test]
async fn test_health_before_start_reports_not_running() {
    let dir = TempDir::new().unwrap();
    let targets = write_targets(&dir, "");
    let orchestrator = Orchestrator::build_from_config(test_config(&targets, None))
        .await
        .expect("should build");

    let health = orchestrator.health().await;

    assert_eq!(health.targets, 0);
    assert!(!health.ready);
    assert_eq!(health.modules.len(), 1);
    assert!(matches!(health.status, HealthStatus::Unhealthy(_)));
}

#[tokio::test]
async fn test_missing_targets_file_fails_build() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir.path().join("absent.yaml"), None);

    let result = Orchestrator::build_from_config(config).await;

    let message = result.err().expect("build should fail").to_string();
    assert!(message.contains("absent.yaml"), "{message}");
}

#[tokio::test]
async fn test_invalid_config_fails_build() {
    let dir = TempDir::new().unwrap();
    let targets = write_targets(&dir, "");
    let mut config = test_config(&targets, None);
    config.general.log_format = "xml".to_owned();

    assert!(Orchestrator::build_from_config(config).await.is_err());
}

#[tokio::test]
async fn test_validate_counts_valid_targets() {
    // Given: Same tree, secret directory present
    let dir = TempDir::new().unwrap();
    let secrets = dir.path().join("secrets");
    fs::create_dir(&secrets).unwrap();
    fs::write(secrets.join("loki.json"), r#"{"host":"http://loki:3100"}"#).unwrap();
    let targets = write_targets(&dir, TARGETS_YAML);

    // When
    let count = validate_targets(&test_config(&targets, Some(&secrets)))
        .await
        .expect("should validate");

    // Then
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_empty_targets_path_means_no_targets() {
    let mut config = CourierConfig::default();
    config.general.targets_file = String::new();

    assert_eq!(validate_targets(&config).await.unwrap(), 0);
}
