//! 전송 어댑터
//!
//! 팩토리는 병합이 끝난 필드로 [`HttpSpec`] 또는 [`ObjectStoreSpec`]을 만들고
//! [`AdapterBuilder`]에 클라이언트 생성을 맡깁니다.
//!
//! - [`http`]: reqwest 기반 JSON 전송 (Loki, Slack, Webhook 등)
//! - [`storage`]: S3, GCS 오브젝트 업로드 (`object_store`)
//!
//! Kinesis와 SecurityHub는 번들 어댑터가 없습니다. 임베딩 애플리케이션이
//! 직접 `AdapterBuilder`를 구현해 제공할 수 있습니다.

pub mod http;
pub mod storage;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use courier_core::error::TargetError;

use crate::client::{Client, ClientOptions, DeliveryMode, TargetKind, redact_url};
use crate::config::{AwsConfig, KinesisOptions, SecurityHubOptions};

/// HTTP 페이로드 형식
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpFormat {
    Loki,
    Elasticsearch {
        index: String,
        /// `daily`, `monthly`, `annually`, `none`
        rotation: String,
        typeless_api: bool,
    },
    Slack {
        channel: String,
    },
    Discord,
    Teams,
    GoogleChat,
    Telegram {
        chat_id: String,
    },
    Jira {
        project_key: String,
        issue_type: String,
        labels: Vec<String>,
        components: Vec<String>,
    },
    Webhook,
    AlertManager,
    Splunk,
}

/// HTTP 인증 방식
#[derive(Clone, Default, PartialEq, Eq)]
pub enum HttpAuth {
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
}

impl fmt::Debug for HttpAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// HTTP 어댑터 생성 명세
///
/// `Debug` 출력은 URL 경로, 헤더 값, 비밀번호를 가립니다. Telegram 토큰과
/// Slack 웹훅 키가 URL 경로에 들어가기 때문입니다.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpSpec {
    pub kind: TargetKind,
    pub mode: DeliveryMode,
    pub format: HttpFormat,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub auth: HttpAuth,
    pub skip_tls: bool,
    /// PEM 인증서 파일 경로
    pub certificate: String,
    /// 팩토리가 `certificate` 경로에서 미리 읽어 둔 PEM 내용
    pub certificate_pem: Vec<u8>,
}

impl fmt::Debug for HttpSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSpec")
            .field("kind", &self.kind)
            .field("mode", &self.mode)
            .field("format", &self.format)
            .field("url", &redact_url(&self.url))
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("auth", &self.auth)
            .field("skip_tls", &self.skip_tls)
            .field("certificate", &self.certificate)
            .field("certificate_pem_len", &self.certificate_pem.len())
            .finish()
    }
}

/// 오브젝트 스토리지 제공자
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectStoreProvider {
    S3 {
        aws: AwsConfig,
        kms_key_id: String,
        server_side_encryption: String,
        bucket_key_enabled: bool,
        path_style: bool,
    },
    Gcs {
        /// 서비스 계정 JSON
        credentials: String,
    },
}

/// 오브젝트 스토리지 어댑터 생성 명세
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStoreSpec {
    pub kind: TargetKind,
    pub provider: ObjectStoreProvider,
    pub bucket: String,
    pub prefix: String,
}

/// 병합된 명세로 클라이언트를 만드는 seam
pub trait AdapterBuilder: Send + Sync {
    fn http(&self, spec: HttpSpec, options: ClientOptions)
    -> Result<Arc<dyn Client>, TargetError>;

    fn object_store(
        &self,
        spec: ObjectStoreSpec,
        options: ClientOptions,
    ) -> Result<Arc<dyn Client>, TargetError>;

    fn kinesis(
        &self,
        _config: KinesisOptions,
        _options: ClientOptions,
    ) -> Result<Arc<dyn Client>, TargetError> {
        Err(TargetError::Unsupported {
            kind: TargetKind::Kinesis.display_name().to_owned(),
        })
    }

    fn security_hub(
        &self,
        _config: SecurityHubOptions,
        _options: ClientOptions,
    ) -> Result<Arc<dyn Client>, TargetError> {
        Err(TargetError::Unsupported {
            kind: TargetKind::SecurityHub.display_name().to_owned(),
        })
    }
}

/// 번들 어댑터로 클라이언트를 만드는 기본 빌더
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAdapterBuilder;

impl AdapterBuilder for DefaultAdapterBuilder {
    fn http(
        &self,
        spec: HttpSpec,
        options: ClientOptions,
    ) -> Result<Arc<dyn Client>, TargetError> {
        Ok(Arc::new(http::HttpClient::new(spec, options)?))
    }

    fn object_store(
        &self,
        spec: ObjectStoreSpec,
        options: ClientOptions,
    ) -> Result<Arc<dyn Client>, TargetError> {
        Ok(Arc::new(storage::ObjectStoreClient::new(spec, options)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_builder_rejects_kinesis_and_security_hub() {
        let builder = DefaultAdapterBuilder;

        let err = builder
            .kinesis(KinesisOptions::default(), ClientOptions::new("Kinesis"))
            .unwrap_err();
        assert!(matches!(err, TargetError::Unsupported { ref kind } if kind == "Kinesis"));

        let err = builder
            .security_hub(SecurityHubOptions::default(), ClientOptions::new("SecurityHub"))
            .unwrap_err();
        assert!(matches!(err, TargetError::Unsupported { ref kind } if kind == "SecurityHub"));
    }

    #[test]
    fn default_builder_creates_http_client() {
        let spec = HttpSpec {
            kind: TargetKind::Webhook,
            mode: DeliveryMode::SingleSend,
            format: HttpFormat::Webhook,
            url: "http://hooks.local/courier".to_owned(),
            headers: BTreeMap::new(),
            auth: HttpAuth::None,
            skip_tls: false,
            certificate: String::new(),
            certificate_pem: Vec::new(),
        };
        let client = DefaultAdapterBuilder
            .http(spec, ClientOptions::new("Webhook"))
            .unwrap();
        assert_eq!(client.endpoint(), "http://hooks.local/courier");
        assert_eq!(client.mode(), DeliveryMode::SingleSend);
    }

    #[test]
    fn http_spec_debug_hides_credentials() {
        // Given: 토큰이 경로에, 인증 정보가 헤더와 basic auth에 있는 명세
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_owned(), "Bearer s3cr3t-token".to_owned());
        let spec = HttpSpec {
            kind: TargetKind::Telegram,
            mode: DeliveryMode::SingleSend,
            format: HttpFormat::Telegram {
                chat_id: "42".to_owned(),
            },
            url: "https://api.telegram.org/bot123:ABCsecret/sendMessage".to_owned(),
            headers,
            auth: HttpAuth::Basic {
                username: "courier".to_owned(),
                password: "hunter2".to_owned(),
            },
            skip_tls: false,
            certificate: String::new(),
            certificate_pem: Vec::new(),
        };

        // When
        let printed = format!("{spec:?}");

        // Then
        assert!(!printed.contains("ABCsecret"), "{printed}");
        assert!(!printed.contains("s3cr3t-token"), "{printed}");
        assert!(!printed.contains("hunter2"), "{printed}");
        assert!(printed.contains("api.telegram.org"));
        assert!(printed.contains("Authorization"));
    }
}
