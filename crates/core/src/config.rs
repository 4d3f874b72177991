//! 설정 관리: courier.toml 파싱 및 런타임 설정
//!
//! [`CourierConfig`]는 데몬 전체 설정을 담는 최상위 구조체입니다.
//! 전송 대상 트리는 별도의 YAML 파일(`general.targets_file`)에 둡니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`COURIER_LEADER_ELECTION_ENABLED=true` 형식)
//! 3. 설정 파일 (`courier.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), courier_core::error::CourierError> {
//! use courier_core::config::CourierConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = CourierConfig::load("courier.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = CourierConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, CourierError};

/// 기간 설정값 상한 (30일). 만료 시각 계산이 넘치지 않도록 제한합니다.
pub const MAX_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

/// Courier 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourierConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// REST 노출 설정 (준비 상태 판단에만 사용)
    #[serde(default)]
    pub rest: RestConfig,
    /// 리더 선출 설정
    #[serde(default)]
    pub leader_election: LeaderElectionConfig,
    /// 전송 중복 제거 캐시 설정
    #[serde(default)]
    pub cache: CacheConfig,
    /// Redis 연결 설정 (캐시, 리더 선출 공용)
    #[serde(default)]
    pub redis: RedisConfig,
    /// 시크릿 저장소 설정
    #[serde(default)]
    pub secrets: SecretsConfig,
}

impl CourierConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CourierError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, CourierError> {
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

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, CourierError> {
        toml::from_str(toml_str).map_err(|e| {
            CourierError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `COURIER_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "COURIER_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "COURIER_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "COURIER_GENERAL_PID_FILE");
        override_string(
            &mut self.general.targets_file,
            "COURIER_GENERAL_TARGETS_FILE",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "COURIER_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "COURIER_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "COURIER_METRICS_PORT");

        // REST
        override_bool(&mut self.rest.enabled, "COURIER_REST_ENABLED");

        // Leader election
        override_bool(
            &mut self.leader_election.enabled,
            "COURIER_LEADER_ELECTION_ENABLED",
        );
        override_string(
            &mut self.leader_election.lock_name,
            "COURIER_LEADER_ELECTION_LOCK_NAME",
        );
        override_string(
            &mut self.leader_election.namespace,
            "COURIER_LEADER_ELECTION_NAMESPACE",
        );
        override_string(
            &mut self.leader_election.pod_name,
            "COURIER_LEADER_ELECTION_POD_NAME",
        );
        override_u64(
            &mut self.leader_election.lease_duration_secs,
            "COURIER_LEADER_ELECTION_LEASE_DURATION_SECS",
        );
        override_u64(
            &mut self.leader_election.renew_deadline_secs,
            "COURIER_LEADER_ELECTION_RENEW_DEADLINE_SECS",
        );
        override_u64(
            &mut self.leader_election.retry_period_secs,
            "COURIER_LEADER_ELECTION_RETRY_PERIOD_SECS",
        );
        override_bool(
            &mut self.leader_election.release_on_cancel,
            "COURIER_LEADER_ELECTION_RELEASE_ON_CANCEL",
        );

        // Cache
        override_string(&mut self.cache.backend, "COURIER_CACHE_BACKEND");
        override_u64(&mut self.cache.ttl_secs, "COURIER_CACHE_TTL_SECS");

        // Redis
        override_bool(&mut self.redis.enabled, "COURIER_REDIS_ENABLED");
        override_string(&mut self.redis.address, "COURIER_REDIS_ADDRESS");
        override_string(&mut self.redis.prefix, "COURIER_REDIS_PREFIX");
        override_string(&mut self.redis.username, "COURIER_REDIS_USERNAME");
        override_string(&mut self.redis.password, "COURIER_REDIS_PASSWORD");
        override_u32(&mut self.redis.database, "COURIER_REDIS_DATABASE");

        // Secrets
        override_string(&mut self.secrets.dir, "COURIER_SECRETS_DIR");
        override_u64(
            &mut self.secrets.poll_interval_secs,
            "COURIER_SECRETS_POLL_INTERVAL_SECS",
        );
        override_u64(
            &mut self.secrets.sync_timeout_secs,
            "COURIER_SECRETS_SYNC_TIMEOUT_SECS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), CourierError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.leader_election.enabled {
            let le = &self.leader_election;
            if le.lock_name.is_empty() {
                return Err(invalid(
                    "leader_election.lock_name",
                    "must not be empty when leader election is enabled".to_owned(),
                ));
            }
            if le.lease_duration_secs == 0 || le.renew_deadline_secs == 0 || le.retry_period_secs == 0
            {
                return Err(invalid(
                    "leader_election",
                    "durations must be greater than zero".to_owned(),
                ));
            }
            if le.lease_duration_secs > MAX_DURATION_SECS {
                return Err(invalid(
                    "leader_election.lease_duration_secs",
                    format!("must be at most {MAX_DURATION_SECS}"),
                ));
            }
            // client-go와 동일한 제약: retry < renew < lease
            if le.renew_deadline_secs >= le.lease_duration_secs {
                return Err(invalid(
                    "leader_election.renew_deadline_secs",
                    "must be less than lease_duration_secs".to_owned(),
                ));
            }
            if le.retry_period_secs >= le.renew_deadline_secs {
                return Err(invalid(
                    "leader_election.retry_period_secs",
                    "must be less than renew_deadline_secs".to_owned(),
                ));
            }
            if !self.redis.enabled {
                return Err(invalid(
                    "leader_election.enabled",
                    "leader election requires [redis] to be enabled".to_owned(),
                ));
            }
        }

        let valid_backends = ["memory", "redis"];
        if !valid_backends.contains(&self.cache.backend.as_str()) {
            return Err(invalid(
                "cache.backend",
                format!("must be one of: {}", valid_backends.join(", ")),
            ));
        }
        if self.cache.ttl_secs == 0 {
            return Err(invalid(
                "cache.ttl_secs",
                "must be greater than zero".to_owned(),
            ));
        }
        if self.cache.ttl_secs > MAX_DURATION_SECS {
            return Err(invalid(
                "cache.ttl_secs",
                format!("must be at most {MAX_DURATION_SECS}"),
            ));
        }
        if self.cache.backend == "redis" && !self.redis.enabled {
            return Err(invalid(
                "cache.backend",
                "redis cache requires [redis] to be enabled".to_owned(),
            ));
        }

        if self.redis.enabled && self.redis.address.is_empty() {
            return Err(invalid(
                "redis.address",
                "must not be empty when redis is enabled".to_owned(),
            ));
        }

        if self.secrets.sync_timeout_secs == 0 {
            return Err(invalid(
                "secrets.sync_timeout_secs",
                "must be greater than zero".to_owned(),
            ));
        }
        if self.secrets.poll_interval_secs == 0 {
            return Err(invalid(
                "secrets.poll_interval_secs",
                "must be greater than zero".to_owned(),
            ));
        }
        if self.secrets.sync_timeout_secs > MAX_DURATION_SECS
            || self.secrets.poll_interval_secs > MAX_DURATION_SECS
        {
            return Err(invalid(
                "secrets",
                format!("durations must be at most {MAX_DURATION_SECS}"),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> CourierError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 생성하지 않음)
    pub pid_file: String,
    /// 전송 대상 트리 YAML 파일 경로
    pub targets_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: String::new(),
            targets_file: "/etc/courier/targets.yaml".to_owned(),
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
    pub port: u16,
    /// 스크레이프 경로 (현재 `/metrics`만 지원)
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9464,
            endpoint: "/metrics".to_owned(),
        }
    }
}

/// REST 노출 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    pub enabled: bool,
}

/// 리더 선출 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderElectionConfig {
    pub enabled: bool,
    /// 임대 이름
    pub lock_name: String,
    /// 임대가 속한 네임스페이스
    pub namespace: String,
    /// 이 프로세스의 식별자 (빈 값이면 `POD_NAME` 또는 호스트명)
    pub pod_name: String,
    pub lease_duration_secs: u64,
    pub renew_deadline_secs: u64,
    pub retry_period_secs: u64,
    /// 취소 시 임대를 즉시 반납할지 여부
    pub release_on_cancel: bool,
}

impl LeaderElectionConfig {
    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }

    pub fn renew_deadline(&self) -> Duration {
        Duration::from_secs(self.renew_deadline_secs)
    }

    pub fn retry_period(&self) -> Duration {
        Duration::from_secs(self.retry_period_secs)
    }
}

impl Default for LeaderElectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            lock_name: "courier".to_owned(),
            namespace: "default".to_owned(),
            pod_name: String::new(),
            lease_duration_secs: 15,
            renew_deadline_secs: 10,
            retry_period_secs: 2,
            release_on_cancel: true,
        }
    }
}

/// 전송 중복 제거 캐시 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// memory 또는 redis
    pub backend: String,
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_owned(),
            ttl_secs: 6 * 60 * 60,
        }
    }
}

/// Redis 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub enabled: bool,
    /// `host:port`
    pub address: String,
    /// 키 접두어
    pub prefix: String,
    pub username: String,
    pub password: String,
    pub database: u32,
}

impl RedisConfig {
    /// `redis://` 연결 URL을 만듭니다.
    pub fn url(&self) -> String {
        let auth = match (self.username.is_empty(), self.password.is_empty()) {
            (true, true) => String::new(),
            (true, false) => format!(":{}@", self.password),
            (false, _) => format!("{}:{}@", self.username, self.password),
        };
        format!("redis://{auth}{}/{}", self.address, self.database)
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "localhost:6379".to_owned(),
            prefix: "courier".to_owned(),
            username: String::new(),
            password: String::new(),
            database: 0,
        }
    }
}

/// 시크릿 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// `<name>.json` 시크릿 파일 디렉토리 (빈 값이면 시크릿 저장소 없음)
    pub dir: String,
    pub poll_interval_secs: u64,
    /// 감시자 초기 동기화 제한 시간
    pub sync_timeout_secs: u64,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            dir: String::new(),
            poll_interval_secs: 10,
            sync_timeout_secs: 30,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
