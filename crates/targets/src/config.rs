//! 전송 대상 설정 트리: `targets.yaml`
//!
//! 각 유형은 최상위 [`TargetConfig`] 하나와 그 아래 `channels`를 가집니다.
//! 채널은 직속 부모에게서만 값을 물려받으며, 상속은 생성 시점에 한 번만
//! 적용됩니다.
//!
//! ```yaml
//! loki:
//!   config:
//!     host: http://loki:3100
//!   minimumSeverity: medium
//!   channels:
//!     - customFields:
//!         cluster: prod
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use courier_core::error::{ConfigError, CourierError};

use crate::filter::FilterConfig;

/// 전송 대상 설정 노드
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    default,
    rename_all = "camelCase",
    bound(deserialize = "T: Deserialize<'de> + Default")
)]
pub struct TargetConfig<T> {
    pub name: String,
    /// 유형별 옵션
    pub config: T,
    /// 최소 전송 기준 (우선순위 또는 심각도 이름)
    pub minimum_severity: String,
    pub filter: FilterConfig,
    /// 참조하는 시크릿 이름
    pub secret_ref: String,
    /// 마운트된 JSON 시크릿 파일 경로
    pub mounted_secret: String,
    pub sources: Vec<String>,
    pub custom_fields: BTreeMap<String, String>,
    #[serde(rename = "skipExistingOnStartup")]
    pub skip_existing: bool,
    pub channels: Vec<TargetConfig<T>>,
    /// 이 노드가 전송 대상을 만들었는지 여부
    #[serde(skip)]
    pub valid: bool,
}

impl<T> TargetConfig<T> {
    /// 비어 있는 공통 스칼라 필드를 부모 값으로 채웁니다.
    pub fn map_base_parent(&mut self, parent: &TargetConfig<T>) {
        inherit(&mut self.minimum_severity, &parent.minimum_severity);
        if !self.skip_existing {
            self.skip_existing = parent.skip_existing;
        }
    }

    /// 유효한 채널 수
    pub fn valid_channels(&self) -> usize {
        self.channels.iter().filter(|c| c.valid).count()
    }
}

/// AWS 자격 증명 공통 필드
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AwsConfig {
    #[serde(alias = "accessKeyID")]
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub endpoint: String,
}

impl AwsConfig {
    /// 비어 있는 자격 증명 필드를 부모 값으로 채웁니다.
    pub fn map_aws_parent(&mut self, parent: &AwsConfig) {
        inherit(&mut self.endpoint, &parent.endpoint);
        inherit(&mut self.access_key_id, &parent.access_key_id);
        inherit(&mut self.secret_access_key, &parent.secret_access_key);
        inherit(&mut self.region, &parent.region);
    }
}

/// 호스트 기반 HTTP 대상 공통 옵션
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostOptions {
    pub host: String,
    #[serde(rename = "skipTLS")]
    pub skip_tls: bool,
    /// PEM 인증서 파일 경로
    pub certificate: String,
    pub headers: BTreeMap<String, String>,
}

/// 웹훅 기반 대상 공통 옵션
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebhookOptions {
    pub webhook: String,
    #[serde(rename = "skipTLS")]
    pub skip_tls: bool,
    pub certificate: String,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LokiOptions {
    #[serde(flatten)]
    pub host: HostOptions,
    pub username: String,
    pub password: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ElasticsearchOptions {
    #[serde(flatten)]
    pub host: HostOptions,
    pub index: String,
    /// daily, monthly, annually, none
    pub rotation: String,
    pub username: String,
    pub password: String,
    pub api_key: String,
    pub typeless_api: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SlackOptions {
    #[serde(flatten)]
    pub webhook: WebhookOptions,
    pub channel: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TelegramOptions {
    #[serde(flatten)]
    pub webhook: WebhookOptions,
    pub token: String,
    #[serde(alias = "chatID")]
    pub chat_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JiraOptions {
    pub host: String,
    #[serde(rename = "skipTLS")]
    pub skip_tls: bool,
    pub certificate: String,
    pub project_key: String,
    pub api_token: String,
    pub username: String,
    pub password: String,
    pub issue_type: String,
    pub labels: Vec<String>,
    pub components: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SplunkOptions {
    #[serde(flatten)]
    pub host: HostOptions,
    pub token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct S3Options {
    #[serde(flatten)]
    pub aws: AwsConfig,
    pub prefix: String,
    pub bucket: String,
    pub bucket_key_enabled: bool,
    pub kms_key_id: String,
    pub server_side_encryption: String,
    pub path_style: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KinesisOptions {
    #[serde(flatten)]
    pub aws: AwsConfig,
    pub stream_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecurityHubOptions {
    #[serde(flatten)]
    pub aws: AwsConfig,
    pub account_id: String,
    pub product_name: String,
    pub company_name: String,
    pub delay_in_seconds: u64,
    pub synchronize: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GcsOptions {
    /// 서비스 계정 JSON
    pub credentials: String,
    pub prefix: String,
    pub bucket: String,
}

/// `targets.yaml` 전체
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TargetsConfig {
    pub loki: Option<TargetConfig<LokiOptions>>,
    pub elasticsearch: Option<TargetConfig<ElasticsearchOptions>>,
    pub slack: Option<TargetConfig<SlackOptions>>,
    pub discord: Option<TargetConfig<WebhookOptions>>,
    pub teams: Option<TargetConfig<WebhookOptions>>,
    pub google_chat: Option<TargetConfig<WebhookOptions>>,
    pub telegram: Option<TargetConfig<TelegramOptions>>,
    pub jira: Option<TargetConfig<JiraOptions>>,
    pub webhook: Option<TargetConfig<WebhookOptions>>,
    pub alert_manager: Option<TargetConfig<HostOptions>>,
    pub splunk: Option<TargetConfig<SplunkOptions>>,
    pub s3: Option<TargetConfig<S3Options>>,
    pub kinesis: Option<TargetConfig<KinesisOptions>>,
    pub security_hub: Option<TargetConfig<SecurityHubOptions>>,
    pub gcs: Option<TargetConfig<GcsOptions>>,
    /// 네임스페이스 선택자 해석용 네임스페이스 레이블 표
    pub namespace_labels: BTreeMap<String, BTreeMap<String, String>>,
}

impl TargetsConfig {
    /// YAML 파일에서 전송 대상 트리를 읽습니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CourierError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CourierError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                CourierError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// YAML 문자열을 파싱합니다. 빈 문서는 대상 없음입니다.
    pub fn parse(yaml: &str) -> Result<Self, CourierError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| {
            CourierError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }
}

/// 자식 값이 비어 있으면 부모 값을 복사합니다.
pub(crate) fn inherit(child: &mut String, parent: &str) {
    if child.is_empty() {
        *child = parent.to_owned();
    }
}

/// 자식이 `false`면 부모 값을 따릅니다.
pub(crate) fn inherit_flag(child: &mut bool, parent: bool) {
    if !*child {
        *child = parent;
    }
}

/// 자식과 부모 모두 비어 있으면 기본값을 씁니다.
pub(crate) fn inherit_or(child: &mut String, parent: &str, default: &str) {
    inherit(child, parent);
    inherit(child, default);
}
