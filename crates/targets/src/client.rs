//! 전송 대상 클라이언트 계약
//!
//! 어댑터는 [`Client`]를 구현합니다. 필터 평가는 어댑터가 아니라 공통
//! [`ClientOptions`]의 [`Filters`]가 담당합니다.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use courier_core::error::TargetError;
use courier_core::pipeline::BoxFuture;
use courier_core::types::{PolicyResult, Report};

use crate::filter::Filters;

/// 전송 대상 유형 태그
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Loki,
    Elasticsearch,
    Slack,
    Discord,
    Teams,
    GoogleChat,
    Telegram,
    Jira,
    Webhook,
    AlertManager,
    Splunk,
    S3,
    Kinesis,
    SecurityHub,
    Gcs,
}

impl TargetKind {
    /// 이름이 없는 대상의 기본 이름으로 쓰는 표시 이름
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Loki => "Loki",
            Self::Elasticsearch => "Elasticsearch",
            Self::Slack => "Slack",
            Self::Discord => "Discord",
            Self::Teams => "Teams",
            Self::GoogleChat => "GoogleChat",
            Self::Telegram => "Telegram",
            Self::Jira => "Jira",
            Self::Webhook => "Webhook",
            Self::AlertManager => "AlertManager",
            Self::Splunk => "Splunk",
            Self::S3 => "S3",
            Self::Kinesis => "Kinesis",
            Self::SecurityHub => "SecurityHub",
            Self::Gcs => "GoogleCloudStorage",
        }
    }

    /// 메트릭 레이블용 소문자 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loki => "loki",
            Self::Elasticsearch => "elasticsearch",
            Self::Slack => "slack",
            Self::Discord => "discord",
            Self::Teams => "teams",
            Self::GoogleChat => "googlechat",
            Self::Telegram => "telegram",
            Self::Jira => "jira",
            Self::Webhook => "webhook",
            Self::AlertManager => "alertmanager",
            Self::Splunk => "splunk",
            Self::S3 => "s3",
            Self::Kinesis => "kinesis",
            Self::SecurityHub => "securityhub",
            Self::Gcs => "gcs",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// 전송 단위
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// 결과 하나당 한 번 호출
    SingleSend,
    /// 리포트의 결과 묶음당 한 번 호출
    BatchSend,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleSend => "single",
            Self::BatchSend => "batch",
        }
    }
}

/// 모든 클라이언트에 공통인 옵션
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub name: String,
    pub skip_existing_on_startup: bool,
    pub filters: Filters,
    /// 페이로드에 덧붙이는 사용자 정의 필드
    pub custom_fields: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl ClientOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            skip_existing_on_startup: false,
            filters: Filters::default(),
            custom_fields: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }
}

/// 전송 대상 클라이언트
pub trait Client: Send + Sync {
    fn options(&self) -> &ClientOptions;

    fn mode(&self) -> DeliveryMode;

    /// 대상 주소 (URL 또는 버킷)
    fn endpoint(&self) -> &str;

    /// 결과 하나를 보냅니다 (SingleSend).
    fn send<'a>(
        &'a self,
        report: &'a Report,
        result: &'a PolicyResult,
    ) -> BoxFuture<'a, Result<(), TargetError>>;

    /// 리포트의 결과 묶음을 보냅니다 (BatchSend).
    fn batch_send<'a>(
        &'a self,
        report: &'a Report,
        results: &'a [PolicyResult],
    ) -> BoxFuture<'a, Result<(), TargetError>>;

    fn name(&self) -> &str {
        &self.options().name
    }

    fn skip_existing_on_startup(&self) -> bool {
        self.options().skip_existing_on_startup
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.options().created_at
    }

    fn filters(&self) -> &Filters {
        &self.options().filters
    }
}

impl fmt::Debug for dyn Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.name())
            .field("mode", &self.mode())
            .field("endpoint", &redact_url(self.endpoint()))
            .finish()
    }
}

/// 로그와 `Debug` 출력용으로 URL의 사용자 정보와 경로를 가립니다.
///
/// `https://user:pw@host:443/bot123/send` → `https://host:443/...`
pub(crate) fn redact_url(url: &str) -> String {
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, url),
    };
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..authority_end];
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);

    let mut out = String::with_capacity(url.len().min(64));
    if let Some(scheme) = scheme {
        out.push_str(scheme);
        out.push_str("://");
    }
    out.push_str(host);
    if authority_end < rest.len() || authority.len() != host.len() {
        out.push_str("/...");
    }
    out
}

#[cfg(test)]
pub(crate) mod testing {
    //! 테스트용 클라이언트

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// 호출을 기록하는 클라이언트
    pub struct MockClient {
        options: ClientOptions,
        mode: DeliveryMode,
        endpoint: String,
        fail: bool,
        pub sent: Mutex<Vec<String>>,
        pub batches: AtomicUsize,
    }

    impl MockClient {
        pub fn new(name: &str, mode: DeliveryMode) -> Self {
            Self {
                options: ClientOptions::new(name),
                mode,
                endpoint: String::new(),
                fail: false,
                sent: Mutex::new(Vec::new()),
                batches: AtomicUsize::new(0),
            }
        }

        pub fn with_options(mut self, options: ClientOptions) -> Self {
            self.options = options;
            self
        }

        pub fn with_endpoint(mut self, endpoint: &str) -> Self {
            self.endpoint = endpoint.to_owned();
            self
        }

        pub fn with_failure(mut self) -> Self {
            self.fail = true;
            self
        }

        pub fn sent_ids(&self) -> Vec<String> {
            self.sent.lock().map(|s| s.clone()).unwrap_or_default()
        }

        fn outcome(&self) -> Result<(), TargetError> {
            if self.fail {
                Err(TargetError::Delivery {
                    target: self.options.name.clone(),
                    reason: "mock failure".to_owned(),
                })
            } else {
                Ok(())
            }
        }
    }

    impl Client for MockClient {
        fn options(&self) -> &ClientOptions {
            &self.options
        }

        fn mode(&self) -> DeliveryMode {
            self.mode
        }

        fn endpoint(&self) -> &str {
            &self.endpoint
        }

        fn send<'a>(
            &'a self,
            _report: &'a Report,
            result: &'a PolicyResult,
        ) -> BoxFuture<'a, Result<(), TargetError>> {
            Box::pin(async move {
                if let Ok(mut sent) = self.sent.lock() {
                    sent.push(result.id.clone());
                }
                self.outcome()
            })
        }

        fn batch_send<'a>(
            &'a self,
            _report: &'a Report,
            results: &'a [PolicyResult],
        ) -> BoxFuture<'a, Result<(), TargetError>> {
            Box::pin(async move {
                self.batches.fetch_add(1, Ordering::SeqCst);
                if let Ok(mut sent) = self.sent.lock() {
                    sent.extend(results.iter().map(|r| r.id.clone()));
                }
                self.outcome()
            })
        }
    }
}
