//! 전송 디스패처
//!
//! 결과 하나가 들어오면 단건 전송 대상마다 태스크 하나를 띄우고, 리포트
//! 하나가 들어오면 일괄 전송 대상마다 태스크 하나를 띄웁니다. 느린 대상이
//! 다른 대상이나 호출자를 막지 않으며, 전송 실패는 기록만 하고 버립니다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use courier_core::metrics as m;
use courier_core::types::{PolicyResult, Report};

use crate::cache::DedupCache;
use crate::client::Client;
use crate::collection::Collection;

/// 레지스트리, 중복 제거 캐시, 시작 시각을 묶은 디스패처
#[derive(Clone)]
pub struct Dispatcher {
    collection: Arc<Collection>,
    cache: Arc<dyn DedupCache>,
    started_at: DateTime<Utc>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("targets", &self.collection.len())
            .field("shared_cache", &self.cache.shared())
            .field("started_at", &self.started_at)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(collection: Arc<Collection>, cache: Arc<dyn DedupCache>) -> Self {
        Self::with_start_time(collection, cache, Utc::now())
    }

    pub fn with_start_time(
        collection: Arc<Collection>,
        cache: Arc<dyn DedupCache>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            collection,
            cache,
            started_at,
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// 결과 하나를 단건 전송 대상들에 보냅니다.
    ///
    /// 이미 본 결과 ID면 아무것도 하지 않습니다. 반환된 핸들은 기다리지
    /// 않아도 됩니다.
    pub async fn dispatch_result(
        &self,
        report: Arc<Report>,
        result: &PolicyResult,
    ) -> Vec<JoinHandle<()>> {
        match self.cache.has(&result.id).await {
            Ok(true) => {
                metrics::counter!(m::DEDUP_HITS_TOTAL).increment(1);
                debug!(result_id = %result.id, "result already delivered, skipping");
                return Vec::new();
            }
            Ok(false) => {}
            Err(e) => warn!(result_id = %result.id, error = %e, "dedup lookup failed"),
        }
        if let Err(e) = self.cache.add(&result.id).await {
            warn!(result_id = %result.id, error = %e, "failed to mark result as seen");
        }

        let result = Arc::new(report.scoped(result));
        self.collection
            .single_send_clients()
            .into_iter()
            .map(|client| {
                let report = report.clone();
                let result = result.clone();
                let started_at = self.started_at;
                tokio::spawn(async move {
                    if !accepts(client.as_ref(), &report, &result, started_at).await {
                        return;
                    }
                    let start = Instant::now();
                    let outcome = client.send(&report, &result).await;
                    record(client.as_ref(), start, outcome.map_err(|e| e.to_string()));
                })
            })
            .collect()
    }

    /// 리포트의 결과 묶음을 일괄 전송 대상들에 보냅니다.
    pub fn dispatch_report(&self, report: Arc<Report>) -> Vec<JoinHandle<()>> {
        self.collection
            .batch_send_clients()
            .into_iter()
            .map(|client| {
                let report = report.clone();
                let started_at = self.started_at;
                tokio::spawn(async move {
                    if !client.filters().validate_report(&report) {
                        return;
                    }

                    let mut results = Vec::with_capacity(report.results.len());
                    for result in &report.results {
                        let result = report.scoped(result);
                        if accepts(client.as_ref(), &report, &result, started_at).await {
                            results.push(result);
                        }
                    }
                    if results.is_empty() {
                        return;
                    }

                    let start = Instant::now();
                    let outcome = client.batch_send(&report, &results).await;
                    record(client.as_ref(), start, outcome.map_err(|e| e.to_string()));
                })
            })
            .collect()
    }
}

/// 필터와 기존 결과 무시 규칙을 적용합니다.
///
/// 기준 시각은 프로세스 시작과 클라이언트 생성 중 이른 쪽입니다.
/// 핫 리로드로 다시 만든 클라이언트도 시작 이후의 결과는 받습니다.
async fn accepts(
    client: &dyn Client,
    report: &Report,
    result: &PolicyResult,
    started_at: DateTime<Utc>,
) -> bool {
    if client.skip_existing_on_startup() {
        let cutoff = started_at.min(client.created_at());
        if result.timestamp < cutoff {
            return false;
        }
    }
    client.filters().validate(report, result).await
}

fn record(client: &dyn Client, start: Instant, outcome: Result<(), String>) {
    let name = client.name().to_owned();
    metrics::histogram!(m::DELIVERY_DURATION_SECONDS, m::LABEL_TARGET => name.clone())
        .record(start.elapsed().as_secs_f64());
    match outcome {
        Ok(()) => {
            metrics::counter!(m::DELIVERIES_TOTAL, m::LABEL_TARGET => name).increment(1);
        }
        Err(error) => {
            metrics::counter!(m::DELIVERY_FAILURES_TOTAL, m::LABEL_TARGET => name.clone())
                .increment(1);
            warn!(target_name = %name, error = %error, "delivery failed");
        }
    }
}
