//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `courier_`
//! - 영역명: `targets_`, `delivery_`, `dedup_`, `leader_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(courier_core::metrics::DELIVERIES_TOTAL, "target" => "Loki").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 전송 대상 이름 레이블 키
pub const LABEL_TARGET: &str = "target";

/// 전송 대상 유형 레이블 키 (loki, s3, webhook ...)
pub const LABEL_KIND: &str = "kind";

/// 전송 방식 레이블 키 (single, batch)
pub const LABEL_MODE: &str = "mode";

// ─── 전송 대상 메트릭 ──────────────────────────────────────────────

/// 등록된 전송 대상 수 (gauge, label: kind)
pub const TARGETS_REGISTERED: &str = "courier_targets_registered";

/// 시크릿 변경으로 재생성된 전송 대상 수 (counter)
pub const TARGETS_REBUILDS_TOTAL: &str = "courier_targets_rebuilds_total";

// ─── 전송 메트릭 ───────────────────────────────────────────────────

/// 성공한 전송 수 (counter, labels: target, mode)
pub const DELIVERIES_TOTAL: &str = "courier_delivery_deliveries_total";

/// 실패한 전송 수 (counter, labels: target, mode)
pub const DELIVERY_FAILURES_TOTAL: &str = "courier_delivery_failures_total";

/// 단일 전송 소요 시간 (histogram, 초)
pub const DELIVERY_DURATION_SECONDS: &str = "courier_delivery_duration_seconds";

// ─── 중복 제거 메트릭 ──────────────────────────────────────────────

/// 이미 전송된 결과라서 건너뛴 수 (counter)
pub const DEDUP_HITS_TOTAL: &str = "courier_dedup_hits_total";

// ─── 리더 선출 메트릭 ──────────────────────────────────────────────

/// 현재 프로세스가 리더인지 여부 (gauge, 0 또는 1)
pub const LEADER_STATUS: &str = "courier_leader_status";

/// 리더 교체 관측 횟수 (counter)
pub const LEADER_TRANSITIONS_TOTAL: &str = "courier_leader_transitions_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "courier_daemon_uptime_seconds";

/// Daemon: 등록된 모듈 수 (gauge)
pub const DAEMON_MODULES_REGISTERED: &str = "courier_daemon_modules_registered";

/// Daemon: 빌드 정보 (gauge, 항상 1, labels: version, rust_version)
pub const DAEMON_BUILD_INFO: &str = "courier_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 전송 지연 시간 히스토그램 버킷 (초)
///
/// 5ms ~ 30s 범위 (원격 HTTP/오브젝트 스토리지 왕복 포함)
pub const DELIVERY_DURATION_BUCKETS: [f64; 10] =
    [0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 10.0, 30.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `courier-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Targets
    describe_gauge!(
        TARGETS_REGISTERED,
        "Number of delivery targets currently registered, by kind"
    );
    describe_counter!(
        TARGETS_REBUILDS_TOTAL,
        "Total number of targets rebuilt after a secret change"
    );

    // Delivery
    describe_counter!(
        DELIVERIES_TOTAL,
        "Total number of successful deliveries per target"
    );
    describe_counter!(
        DELIVERY_FAILURES_TOTAL,
        "Total number of failed deliveries per target"
    );
    describe_histogram!(
        DELIVERY_DURATION_SECONDS,
        "Time to deliver a single result or report in seconds"
    );

    // Dedup
    describe_counter!(
        DEDUP_HITS_TOTAL,
        "Total number of results skipped because they were already delivered"
    );

    // Leader election
    describe_gauge!(LEADER_STATUS, "1 when this instance holds the lease");
    describe_counter!(
        LEADER_TRANSITIONS_TOTAL,
        "Total number of observed leader changes"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Courier daemon uptime in seconds");
    describe_gauge!(
        DAEMON_MODULES_REGISTERED,
        "Number of modules registered in the daemon"
    );
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version labels)"
    );
}
