//! 도메인 타입: 컴플라이언스 결과와 리포트
//!
//! 정책 엔진이 생성한 결과([`PolicyResult`])와 이를 묶은 리포트([`Report`])를
//! 정의합니다. 모든 전송 대상은 이 타입들을 입력으로 받습니다.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// 심각도 레벨
///
/// 정책 결과에 붙는 심각도입니다.
/// `Ord` 구현으로 비교가 가능합니다 (`Info < Low < Medium < High < Critical`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 정보성
    Info,
    /// 낮은 심각도
    Low,
    /// 중간 심각도
    Medium,
    /// 높은 심각도
    High,
    /// 치명적
    Critical,
}

impl Severity {
    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "info" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// 소문자 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 전송 우선순위
///
/// `Debug < Info < Warning < Error < Critical` 순서로 완전 정렬됩니다.
/// 결과의 우선순위는 심각도에서 파생됩니다.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// 심각도 없음
    #[default]
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Priority {
    /// 심각도에서 우선순위를 계산합니다.
    ///
    /// | severity | priority |
    /// |---|---|
    /// | critical | critical |
    /// | high | error |
    /// | medium | warning |
    /// | low, info | info |
    /// | 없음 | debug |
    pub fn from_severity(severity: Option<Severity>) -> Self {
        match severity {
            Some(Severity::Critical) => Self::Critical,
            Some(Severity::High) => Self::Error,
            Some(Severity::Medium) => Self::Warning,
            Some(Severity::Low) | Some(Severity::Info) => Self::Info,
            None => Self::Debug,
        }
    }

    /// 최소 전송 기준을 파싱합니다.
    ///
    /// 우선순위 이름(`warning`, `error` 등)과 심각도 이름(`medium`, `high` 등)을
    /// 모두 받습니다. 빈 문자열이나 알 수 없는 값은 `None`(기준 없음)입니다.
    pub fn parse_threshold(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "" => None,
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "critical" => Some(Self::Critical),
            other => Severity::from_str_loose(other).map(|s| Self::from_severity(Some(s))),
        }
    }

    /// 소문자 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 정책 평가 결과 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Pass,
    Fail,
    Warn,
    Error,
    Skip,
}

impl ResultStatus {
    /// 소문자 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 결과가 가리키는 클러스터 리소스
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Resource {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    /// 클러스터 범위 리소스는 빈 문자열
    pub namespace: String,
    pub uid: String,
}

/// 정책 결과 (이벤트)
///
/// 하나의 리소스에 대해 정책 엔진이 생성한 단일 평가 결과입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyResult {
    /// 결과 ID (중복 제거 키)
    pub id: String,
    /// 결과를 생성한 엔진 (예: `kyverno`, `falco`)
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub policy: String,
    #[serde(default)]
    pub rule: String,
    #[serde(default)]
    pub message: String,
    pub status: ResultStatus,
    /// 심각도 (빈 문자열은 없음으로 처리)
    #[serde(default, deserialize_with = "empty_severity_as_none")]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub category: String,
    /// 대상 리소스 (주체가 없는 클러스터 범위 결과는 `None`)
    #[serde(default)]
    pub resource: Option<Resource>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl PolicyResult {
    /// 심각도에서 파생된 우선순위
    pub fn priority(&self) -> Priority {
        Priority::from_severity(self.severity)
    }

    /// 리소스의 네임스페이스 (리소스가 없으면 `None`)
    pub fn namespace(&self) -> Option<&str> {
        self.resource.as_ref().map(|r| r.namespace.as_str())
    }

    /// 리소스가 있는지 여부
    pub fn has_resource(&self) -> bool {
        self.resource.is_some()
    }
}

impl fmt::Display for PolicyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}/{} {} ({})",
            self.priority(),
            self.policy,
            self.rule,
            self.status,
            self.source,
        )
    }
}

/// 정책 리포트
///
/// 하나의 범위(네임스페이스 또는 클러스터)에 대한 결과 묶음입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// 리포트가 단일 리소스 범위일 때의 리소스
    #[serde(default)]
    pub scope: Option<Resource>,
    #[serde(default)]
    pub results: Vec<PolicyResult>,
    pub creation_timestamp: DateTime<Utc>,
}

impl Report {
    /// 결과에 리소스가 없으면 리포트 범위를 리소스로 채워 반환합니다.
    pub fn scoped(&self, result: &PolicyResult) -> PolicyResult {
        let mut result = result.clone();
        if result.resource.is_none() {
            result.resource = self.scope.clone();
        }
        result
    }
}

fn empty_severity_as_none<'de, D>(deserializer: D) -> Result<Option<Severity>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => Severity::from_str_loose(s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown severity '{s}'"))),
    }
}
