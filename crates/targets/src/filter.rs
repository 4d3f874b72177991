//! 전송 대상별 결과/리포트 필터
//!
//! - [`ResultFilter`]: 결과 하나를 최소 우선순위, 소스, 네임스페이스, 정책,
//!   심각도, 상태 기준으로 평가
//! - [`ReportFilter`]: 리포트 레이블과 소스를 평가
//! - [`Filters`]: 둘을 AND로 묶으며 없는 필터는 통과로 취급

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use courier_core::error::TargetError;
use courier_core::pipeline::BoxFuture;
use courier_core::types::{PolicyResult, Priority, Report};

use crate::ruleset::RuleSet;

/// 레이블 선택자를 현재 일치하는 네임스페이스 이름 목록으로 해석합니다.
pub trait NamespaceResolver: Send + Sync {
    fn list(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> BoxFuture<'_, Result<Vec<String>, TargetError>>;
}

/// 고정된 네임스페이스 레이블 표로 선택자를 해석하는 리졸버
///
/// 클러스터 API 없이 동작할 때 `targets.yaml`의 `namespaceLabels`로 구성합니다.
#[derive(Debug, Clone, Default)]
pub struct StaticNamespaceResolver {
    namespaces: BTreeMap<String, BTreeMap<String, String>>,
}

impl StaticNamespaceResolver {
    pub fn new(namespaces: BTreeMap<String, BTreeMap<String, String>>) -> Self {
        Self { namespaces }
    }
}

impl NamespaceResolver for StaticNamespaceResolver {
    fn list(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> BoxFuture<'_, Result<Vec<String>, TargetError>> {
        let matched = self
            .namespaces
            .iter()
            .filter(|(_, labels)| {
                selector
                    .iter()
                    .all(|(k, v)| labels.get(k).is_some_and(|value| value == v))
            })
            .map(|(name, _)| name.clone())
            .collect();
        Box::pin(async move { Ok(matched) })
    }
}

/// 필터 설정 (`filter:` 블록)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterConfig {
    pub namespaces: RuleSet,
    pub severities: RuleSet,
    pub policies: RuleSet,
    pub sources: RuleSet,
    pub status: RuleSet,
    pub report_labels: RuleSet,
}

/// 결과 단위 필터
#[derive(Clone, Default)]
pub struct ResultFilter {
    minimum_priority: Option<Priority>,
    sources: RuleSet,
    namespaces: RuleSet,
    namespace_selector: BTreeMap<String, String>,
    resolver: Option<Arc<dyn NamespaceResolver>>,
    policies: RuleSet,
    severities: RuleSet,
    status: RuleSet,
}

impl std::fmt::Debug for ResultFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultFilter")
            .field("minimum_priority", &self.minimum_priority)
            .field("sources", &self.sources)
            .field("namespaces", &self.namespaces)
            .field("namespace_selector", &self.namespace_selector)
            .field("policies", &self.policies)
            .field("severities", &self.severities)
            .field("status", &self.status)
            .finish()
    }
}

impl ResultFilter {
    /// 설정에서 필터를 만듭니다.
    ///
    /// `sources`가 비어 있지 않으면 `filter.sources`의 include 목록을 대체합니다.
    pub fn from_config(
        config: &FilterConfig,
        minimum_severity: &str,
        sources: &[String],
        resolver: Option<Arc<dyn NamespaceResolver>>,
    ) -> Self {
        let mut source_rules = config.sources.clone();
        if !sources.is_empty() {
            source_rules.include = sources.to_vec();
        }

        Self {
            minimum_priority: Priority::parse_threshold(minimum_severity),
            sources: source_rules,
            namespaces: RuleSet::new(
                config.namespaces.include.clone(),
                config.namespaces.exclude.clone(),
            ),
            namespace_selector: config.namespaces.selector.clone(),
            resolver,
            policies: config.policies.clone(),
            severities: config.severities.clone(),
            status: config.status.clone(),
        }
    }

    pub fn minimum_priority(&self) -> Option<Priority> {
        self.minimum_priority
    }

    /// 소스 include 목록
    pub fn sources(&self) -> &[String] {
        &self.sources.include
    }

    /// 결과를 이 대상에 보낼지 평가합니다.
    pub async fn validate(&self, result: &PolicyResult) -> bool {
        if let Some(min) = self.minimum_priority {
            if result.priority() < min {
                debug!(result_id = %result.id, priority = %result.priority(), minimum = %min, "filter result priority");
                return false;
            }
        }

        if self.sources.enabled() && !self.sources.matches_ignore_case(&result.source) {
            debug!(result_id = %result.id, source = %result.source, "filter result source");
            return false;
        }

        // 리소스가 없거나 클러스터 범위면 네임스페이스 검사 생략
        if let Some(namespace) = result.namespace().filter(|ns| !ns.is_empty()) {
            if self.namespaces.enabled() && !self.namespaces.matches(namespace) {
                debug!(result_id = %result.id, namespace, "filter result namespace");
                return false;
            }
            if !self.namespace_selector.is_empty() && !self.selector_allows(namespace).await {
                return false;
            }
        }

        if self.policies.enabled() && !self.policies.matches(&result.policy) {
            debug!(result_id = %result.id, policy = %result.policy, "filter result policy");
            return false;
        }

        if self.severities.enabled() {
            let severity = result.severity.map(|s| s.as_str()).unwrap_or_default();
            if !self.severities.contains(severity) {
                debug!(result_id = %result.id, severity, "filter result severity");
                return false;
            }
        }

        if self.status.enabled() && !self.status.contains(result.status.as_str()) {
            debug!(result_id = %result.id, status = %result.status, "filter result status");
            return false;
        }

        true
    }

    async fn selector_allows(&self, namespace: &str) -> bool {
        let Some(resolver) = &self.resolver else {
            warn!("namespace selector configured without a resolver, rejecting result");
            return false;
        };

        match resolver.list(&self.namespace_selector).await {
            Ok(names) => names.iter().any(|n| n == namespace),
            Err(e) => {
                warn!(error = %e, "failed to resolve namespace selector");
                false
            }
        }
    }
}

/// 리포트 단위 필터
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    labels: RuleSet,
    sources: RuleSet,
}

impl ReportFilter {
    pub fn new(labels: RuleSet, sources: RuleSet) -> Self {
        Self { labels, sources }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.report_labels.clone(), config.sources.clone())
    }

    pub fn validate(&self, report: &Report) -> bool {
        if self.labels.enabled() && !self.labels.matches_labels(&report.labels) {
            debug!(report = %report.name, "filter report labels");
            return false;
        }

        if self.sources.enabled()
            && !report.source.is_empty()
            && !self.sources.matches_ignore_case(&report.source)
        {
            debug!(report = %report.name, source = %report.source, "filter report source");
            return false;
        }

        true
    }
}

/// 한 전송 대상의 결과/리포트 필터 묶음
#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub result: Option<ResultFilter>,
    pub report: Option<ReportFilter>,
}

impl Filters {
    pub fn new(result: ResultFilter, report: ReportFilter) -> Self {
        Self {
            result: Some(result),
            report: Some(report),
        }
    }

    pub fn validate_report(&self, report: &Report) -> bool {
        self.report.as_ref().is_none_or(|f| f.validate(report))
    }

    /// 리포트 필터와 결과 필터를 모두 통과해야 `true`
    pub async fn validate(&self, report: &Report, result: &PolicyResult) -> bool {
        if !self.validate_report(report) {
            return false;
        }
        match &self.result {
            Some(filter) => filter.validate(result).await,
            None => true,
        }
    }
}
