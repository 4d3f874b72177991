//! # courier-targets
//!
//! 정책 결과를 설정된 전송 대상으로 라우팅하는 엔진입니다.
//!
//! ## 모듈
//! - [`ruleset`]: include/exclude 와일드카드 규칙
//! - [`filter`]: 전송 대상별 결과/리포트 필터
//! - [`config`]: 전송 대상 설정 트리 (`targets.yaml`)
//! - [`secrets`]: 시크릿 저장소와 마운트된 시크릿
//! - [`factory`]: 설정 트리에서 전송 대상 생성, 재생성
//! - [`collection`]: 활성 대상 레지스트리 (불변 스냅샷)
//! - [`watcher`]: 시크릿 변경 시 핫 리로드
//! - [`cache`]: 전송 중복 제거 캐시
//! - [`leader`]: 임대 기반 리더 선출
//! - [`readiness`]: 리더가 될 때까지 준비 상태 보류
//! - [`dispatch`]: 결과/리포트 팬아웃
//! - [`adapters`]: HTTP, 오브젝트 스토리지 전송 어댑터
//!
//! ## 구조
//!
//! ```text
//! targets.yaml ──> TargetFactory ──> Collection <── SecretWatcher (재생성, 같은 ID)
//!                                        │
//! PolicyResult ──> Dispatcher ── DedupCache
//!                      │
//!                 Client::send / batch_send (대상별 태스크)
//! ```

pub mod adapters;
pub mod cache;
pub mod client;
pub mod collection;
pub mod config;
pub mod dispatch;
pub mod factory;
pub mod filter;
pub mod leader;
pub mod readiness;
pub mod ruleset;
pub mod secrets;
pub mod watcher;

// --- 주요 타입 re-export ---

// 대상 생성과 레지스트리
pub use collection::{Collection, Registry};
pub use config::TargetsConfig;
pub use factory::{Target, TargetFactory, TargetSpec};

// 클라이언트
pub use adapters::{AdapterBuilder, DefaultAdapterBuilder};
pub use client::{Client, ClientOptions, DeliveryMode, TargetKind};

// 필터
pub use filter::{
    FilterConfig, Filters, NamespaceResolver, ReportFilter, ResultFilter,
    StaticNamespaceResolver,
};
pub use ruleset::RuleSet;

// 시크릿과 핫 리로드
pub use secrets::{DirectorySecretStore, MemorySecretStore, SecretEvent, SecretStore, SecretValues};
pub use watcher::{SecretWatcher, SyncState};

// 중복 제거, 선출, 준비 상태, 디스패치
pub use cache::{DedupCache, MemoryCache, RedisCache};
pub use dispatch::Dispatcher;
pub use leader::{ElectionConfig, ElectionState, LeaderElector, LeaderFlag, LeaseLock, MemoryLease, RedisLease};
pub use readiness::ReadinessGate;
