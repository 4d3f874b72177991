//! # courier-core
//!
//! Courier의 공통 기반 크레이트입니다.
//! 정책 결과 도메인 타입, 에러, 설정, 파이프라인 생명주기 trait,
//! 메트릭 이름을 정의하며 다른 모든 크레이트가 이 크레이트에 의존합니다.
//!
//! ## 모듈
//! - [`config`]: `courier.toml` 로딩과 환경변수 오버라이드
//! - [`error`]: 도메인별 에러 타입
//! - [`metrics`]: Prometheus 메트릭 이름 상수
//! - [`pipeline`]: 장기 실행 컴포넌트의 시작/정지 trait
//! - [`types`]: 정책 결과와 리포트

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{
    CacheError, ConfigError, CourierError, ElectionError, PipelineError, TargetError,
};

// 설정
pub use config::CourierConfig;

// 파이프라인 trait
pub use pipeline::{BoxFuture, DynPipeline, HealthStatus, Pipeline};

// 도메인 타입
pub use types::{PolicyResult, Priority, Report, Resource, ResultStatus, Severity};
