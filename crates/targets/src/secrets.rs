//! 시크릿 저장소: 전송 대상 자격 증명
//!
//! 시크릿은 고정된 선택 키 집합([`SecretValues`])을 가진 JSON 객체입니다.
//! 비어 있지 않은 값은 같은 이름의 설정 필드를 항상 덮어씁니다.
//!
//! - [`MemorySecretStore`]: 테스트 및 임베딩용
//! - [`DirectorySecretStore`]: 디렉토리의 `<name>.json` 파일, 폴링으로 변경 감지

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use courier_core::error::TargetError;
use courier_core::pipeline::BoxFuture;

/// 시크릿이 제공하는 값
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecretValues {
    pub host: String,
    pub webhook: String,
    pub channel: String,
    pub username: String,
    pub password: String,
    pub api_key: String,
    #[serde(rename = "accessKeyID", alias = "accessKeyId")]
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(rename = "accountID", alias = "accountId")]
    pub account_id: String,
    pub kms_key_id: String,
    pub token: String,
    pub credentials: String,
    pub database: String,
    pub dsn: String,
    #[serde(deserialize_with = "lenient_bool")]
    pub typeless_api: bool,
}

impl SecretValues {
    /// JSON 문서에서 값을 읽습니다.
    pub fn from_json(name: &str, content: &str) -> Result<Self, TargetError> {
        serde_json::from_str(content).map_err(|e| TargetError::SecretResolution {
            name: name.to_owned(),
            reason: e.to_string(),
        })
    }

    /// `other`에서 비어 있지 않은 값만 덮어씁니다.
    pub fn overlay(&mut self, other: SecretValues) {
        let SecretValues {
            host,
            webhook,
            channel,
            username,
            password,
            api_key,
            access_key_id,
            secret_access_key,
            account_id,
            kms_key_id,
            token,
            credentials,
            database,
            dsn,
            typeless_api,
        } = other;

        for (field, value) in [
            (&mut self.host, host),
            (&mut self.webhook, webhook),
            (&mut self.channel, channel),
            (&mut self.username, username),
            (&mut self.password, password),
            (&mut self.api_key, api_key),
            (&mut self.access_key_id, access_key_id),
            (&mut self.secret_access_key, secret_access_key),
            (&mut self.account_id, account_id),
            (&mut self.kms_key_id, kms_key_id),
            (&mut self.token, token),
            (&mut self.credentials, credentials),
            (&mut self.database, database),
            (&mut self.dsn, dsn),
        ] {
            if !value.is_empty() {
                *field = value;
            }
        }
        self.typeless_api |= typeless_api;
    }
}

impl fmt::Debug for SecretValues {
    /// 값 대신 채워진 키 이름만 출력합니다.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = [
            ("host", &self.host),
            ("webhook", &self.webhook),
            ("channel", &self.channel),
            ("username", &self.username),
            ("password", &self.password),
            ("apiKey", &self.api_key),
            ("accessKeyID", &self.access_key_id),
            ("secretAccessKey", &self.secret_access_key),
            ("accountID", &self.account_id),
            ("kmsKeyId", &self.kms_key_id),
            ("token", &self.token),
            ("credentials", &self.credentials),
            ("database", &self.database),
            ("dsn", &self.dsn),
        ];
        f.debug_struct("SecretValues")
            .field(
                "keys",
                &keys
                    .iter()
                    .filter(|(_, v)| !v.is_empty())
                    .map(|(k, _)| *k)
                    .collect::<Vec<_>>(),
            )
            .field("typeless_api", &self.typeless_api)
            .finish()
    }
}

/// 시크릿 변경 알림
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretEvent {
    /// 시크릿이 추가되거나 변경됨
    Updated(String),
    /// 감시 연결 실패
    WatchError(String),
    /// 실패 후 전체 목록을 다시 읽음
    Resynced,
}

/// 이름으로 시크릿을 조회하는 저장소
pub trait SecretStore: Send + Sync {
    fn get(&self, name: &str) -> BoxFuture<'_, Result<SecretValues, TargetError>>;

    /// 저장된 시크릿 이름 목록
    fn list(&self) -> BoxFuture<'_, Result<Vec<String>, TargetError>>;
}

/// 재시도 정책 (선형 백오프)
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(200),
            attempt_timeout: Duration::from_secs(5),
        }
    }
}

/// 재시도를 포함하여 시크릿을 조회합니다.
///
/// 시도 사이의 대기는 `backoff_base * attempt`입니다.
pub async fn fetch_with_retry(
    store: &dyn SecretStore,
    name: &str,
    policy: RetryPolicy,
) -> Result<SecretValues, TargetError> {
    let mut last_error = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let backoff = policy.backoff_base * attempt;
            warn!(
                secret = name,
                attempt,
                backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                "retrying secret lookup"
            );
            tokio::time::sleep(backoff).await;
        }

        match tokio::time::timeout(policy.attempt_timeout, store.get(name)).await {
            Ok(Ok(values)) => return Ok(values),
            Ok(Err(e)) => last_error = Some(e),
            Err(_elapsed) => {
                last_error = Some(TargetError::SecretResolution {
                    name: name.to_owned(),
                    reason: "lookup timed out".to_owned(),
                });
            }
        }
    }

    Err(last_error.unwrap_or_else(|| TargetError::SecretResolution {
        name: name.to_owned(),
        reason: "unknown error".to_owned(),
    }))
}

/// 마운트된 JSON 시크릿 파일을 읽습니다.
pub async fn read_mounted(path: &str) -> Result<SecretValues, TargetError> {
    let content =
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| TargetError::SecretResolution {
                name: path.to_owned(),
                reason: e.to_string(),
            })?;
    SecretValues::from_json(path, &content)
}

/// 메모리 시크릿 저장소
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<String, SecretValues>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, name: impl Into<String>, values: SecretValues) {
        self.secrets.write().await.insert(name.into(), values);
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, name: &str) -> BoxFuture<'_, Result<SecretValues, TargetError>> {
        let name = name.to_owned();
        Box::pin(async move {
            self.secrets
                .read()
                .await
                .get(&name)
                .cloned()
                .ok_or(TargetError::SecretResolution {
                    name,
                    reason: "secret not found".to_owned(),
                })
        })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<String>, TargetError>> {
        Box::pin(async move { Ok(self.secrets.read().await.keys().cloned().collect()) })
    }
}

/// 디렉토리 기반 시크릿 저장소
///
/// `<dir>/<name>.json` 파일 하나가 시크릿 하나입니다.
#[derive(Debug, Clone)]
pub struct DirectorySecretStore {
    dir: PathBuf,
}

impl DirectorySecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    async fn snapshot(&self) -> Result<HashMap<String, SystemTime>, std::io::Error> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut snapshot = HashMap::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let modified = entry.metadata().await?.modified()?;
            snapshot.insert(name.to_owned(), modified);
        }
        Ok(snapshot)
    }

    /// 디렉토리를 주기적으로 읽어 변경된 시크릿을 알립니다.
    ///
    /// 디렉토리 읽기에 실패하면 [`SecretEvent::WatchError`]를, 실패 이후 처음
    /// 성공하면 [`SecretEvent::Resynced`]를 보냅니다.
    pub fn spawn_poller(
        self: Arc<Self>,
        interval: Duration,
        tx: mpsc::Sender<SecretEvent>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut known = self.snapshot().await.unwrap_or_default();
            let mut failing = false;
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(dir = %self.dir.display(), "secret poller stopped");
                        return;
                    }
                    _ = ticker.tick() => {}
                }

                let current = match self.snapshot().await {
                    Ok(current) => current,
                    Err(e) => {
                        if !failing {
                            warn!(dir = %self.dir.display(), error = %e, "failed to read secret directory");
                        }
                        failing = true;
                        if tx.send(SecretEvent::WatchError(e.to_string())).await.is_err() {
                            return;
                        }
                        continue;
                    }
                };

                if failing {
                    failing = false;
                    info!(dir = %self.dir.display(), "secret directory readable again");
                    if tx.send(SecretEvent::Resynced).await.is_err() {
                        return;
                    }
                }

                for (name, modified) in &current {
                    if known.get(name) != Some(modified) {
                        debug!(secret = name.as_str(), "secret changed");
                        if tx.send(SecretEvent::Updated(name.clone())).await.is_err() {
                            return;
                        }
                    }
                }
                known = current;
            }
        })
    }
}

impl SecretStore for DirectorySecretStore {
    fn get(&self, name: &str) -> BoxFuture<'_, Result<SecretValues, TargetError>> {
        let name = name.to_owned();
        Box::pin(async move {
            let path = self.path_for(&name);
            let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                TargetError::SecretResolution {
                    name: name.clone(),
                    reason: format!("{}: {e}", path.display()),
                }
            })?;
            SecretValues::from_json(&name, &content)
        })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<String>, TargetError>> {
        Box::pin(async move {
            let snapshot = self
                .snapshot()
                .await
                .map_err(|e| TargetError::SecretResolution {
                    name: self.dir.display().to_string(),
                    reason: e.to_string(),
                })?;
            Ok(snapshot.into_keys().collect())
        })
    }
}

/// `true`/`false` 외에 `"true"` 같은 문자열도 받습니다. 해석 불가 값은 `false`입니다.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Text(String),
    }

    Ok(match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(b) => b,
        BoolOrString::Text(s) => s.trim().parse().unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyStore {
        failures_before_success: u32,
        calls: AtomicU32,
    }

    impl SecretStore for FlakyStore {
        fn get(&self, name: &str) -> BoxFuture<'_, Result<SecretValues, TargetError>> {
            let name = name.to_owned();
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                if call < self.failures_before_success {
                    Err(TargetError::SecretResolution {
                        name,
                        reason: "unavailable".to_owned(),
                    })
                } else {
                    Ok(SecretValues {
                        host: "http://b".to_owned(),
                        ..Default::default()
                    })
                }
            })
        }

        fn list(&self) -> BoxFuture<'_, Result<Vec<String>, TargetError>> {
            Box::pin(async { Ok(vec![]) })
        }
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_base: Duration::from_millis(1),
            attempt_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn secret_values_parse_camel_case_and_aliases() {
        let json = r#"{
            "host": "http://loki",
            "accessKeyID": "AKIA",
            "secretAccessKey": "s3cr3t",
            "accountId": "123456789012",
            "typelessApi": "true"
        }"#;
        let values = SecretValues::from_json("s", json).unwrap();
        assert_eq!(values.host, "http://loki");
        assert_eq!(values.access_key_id, "AKIA");
        assert_eq!(values.secret_access_key, "s3cr3t");
        assert_eq!(values.account_id, "123456789012");
        assert!(values.typeless_api);
    }

    #[test]
    fn overlay_keeps_fields_missing_from_other() {
        // Given: 참조 시크릿에는 host와 password, 마운트 시크릿에는 password만
        let mut values = SecretValues {
            host: "http://loki".to_owned(),
            password: "old".to_owned(),
            ..Default::default()
        };
        let mounted = SecretValues {
            password: "new".to_owned(),
            ..Default::default()
        };

        // When
        values.overlay(mounted);

        // Then
        assert_eq!(values.host, "http://loki");
        assert_eq!(values.password, "new");
    }

    #[test]
    fn secret_values_debug_prints_keys_only() {
        let values = SecretValues {
            token: "123:ABC".to_owned(),
            ..Default::default()
        };
        let printed = format!("{values:?}");
        assert!(printed.contains("token"));
        assert!(!printed.contains("123:ABC"));
    }

    #[test]
    fn secret_values_invalid_bool_string_is_false() {
        let values = SecretValues::from_json("s", r#"{"typelessApi": "maybe"}"#).unwrap();
        assert!(!values.typeless_api);
    }

    #[test]
    fn secret_values_invalid_json_is_resolution_error() {
        let err = SecretValues::from_json("broken", "{not json").unwrap_err();
        assert!(matches!(err, TargetError::SecretResolution { ref name, .. } if name == "broken"));
    }

    #[tokio::test]
    async fn memory_store_get_and_list() {
        let store = MemorySecretStore::new();
        store
            .insert(
                "loki-secret",
                SecretValues {
                    host: "http://loki".to_owned(),
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(store.get("loki-secret").await.unwrap().host, "http://loki");
        assert!(store.get("missing").await.is_err());
        assert_eq!(store.list().await.unwrap(), vec!["loki-secret"]);
    }

    #[tokio::test]
    async fn fetch_with_retry_recovers_from_transient_failures() {
        let store = FlakyStore {
            failures_before_success: 2,
            calls: AtomicU32::new(0),
        };
        let values = fetch_with_retry(&store, "s", fast_retry(3)).await.unwrap();
        assert_eq!(values.host, "http://b");
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fetch_with_retry_gives_up_after_max_retries() {
        let store = FlakyStore {
            failures_before_success: u32::MAX,
            calls: AtomicU32::new(0),
        };
        assert!(fetch_with_retry(&store, "s", fast_retry(2)).await.is_err());
        // 최초 1회 + 재시도 2회
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn directory_store_reads_json_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("slack.json"), r#"{"webhook": "https://hooks"}"#)
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), "ignored")
            .await
            .unwrap();

        let store = DirectorySecretStore::new(dir.path());
        assert_eq!(store.get("slack").await.unwrap().webhook, "https://hooks");
        assert_eq!(store.list().await.unwrap(), vec!["slack"]);
        assert!(store.get("missing").await.is_err());
    }

    #[tokio::test]
    async fn directory_store_list_fails_for_missing_dir() {
        let store = DirectorySecretStore::new("/nonexistent/courier/secrets");
        assert!(store.list().await.is_err());
    }

    #[tokio::test]
    async fn read_mounted_parses_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mounted.json");
        tokio::fs::write(&path, r#"{"token": "abc"}"#).await.unwrap();

        let values = read_mounted(path.to_str().unwrap()).await.unwrap();
        assert_eq!(values.token, "abc");
        assert!(read_mounted("/nonexistent/mounted.json").await.is_err());
    }

    #[tokio::test]
    async fn poller_reports_new_secret() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DirectorySecretStore::new(dir.path()));
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = store.spawn_poller(Duration::from_millis(20), tx, cancel.clone());

        // Given: 폴러가 빈 디렉토리 상태를 기억한 뒤
        tokio::time::sleep(Duration::from_millis(10)).await;

        // When: 새 시크릿 파일 작성
        tokio::fs::write(dir.path().join("loki.json"), r#"{"host": "http://x"}"#)
            .await
            .unwrap();

        // Then: Updated 이벤트 수신
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(SecretEvent::Updated("loki".to_owned())));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn poller_with_zero_interval_still_runs() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DirectorySecretStore::new(dir.path()));
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        // Given: 0 간격으로 시작한 폴러
        let handle = store.spawn_poller(Duration::ZERO, tx, cancel.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;

        // When
        tokio::fs::write(dir.path().join("slack.json"), r#"{"webhook": "http://x"}"#)
            .await
            .unwrap();

        // Then: 패닉 없이 변경을 알림
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(SecretEvent::Updated("slack".to_owned())));

        cancel.cancel();
        handle.await.unwrap();
    }
}
