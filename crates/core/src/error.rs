//! 에러 타입: 도메인별 에러 정의
//!
//! 생성/전송 단계의 실패([`TargetError`])는 호출자가 로그만 남기고 삼키며,
//! 인프라 수준의 실패([`ElectionError`], [`TargetError::SyncTimeout`])만
//! 프로세스 수준까지 전파됩니다.

/// Courier 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum CourierError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 타깃 생성/전송 에러
    #[error("target error: {0}")]
    Target(#[from] TargetError),

    /// 중복 제거 캐시 에러
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// 리더 선출 에러
    #[error("leader election error: {0}")]
    Election(#[from] ElectionError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 이미 실행 중
    #[error("already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("not running")]
    NotRunning,

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),
}

/// 타깃(전송 대상) 에러
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// 필수 필드가 상속 이후에도 비어 있음
    #[error("target '{target}' is missing mandatory field '{field}'")]
    MissingField { target: String, field: String },

    /// 시크릿 조회 또는 파싱 실패
    #[error("failed to resolve secret '{name}': {reason}")]
    SecretResolution { name: String, reason: String },

    /// 번들되지 않은 전송 대상 유형
    #[error("unsupported destination '{kind}'")]
    Unsupported { kind: String },

    /// 어댑터 생성 실패
    #[error("failed to build client for '{target}': {reason}")]
    ClientBuild { target: String, reason: String },

    /// 외부 전송 실패
    #[error("delivery to '{target}' failed: {reason}")]
    Delivery { target: String, reason: String },

    /// 네임스페이스 선택자 해석 실패
    #[error("failed to resolve namespace selector: {reason}")]
    NamespaceLookup { reason: String },

    /// 시크릿 감시자의 초기 목록 조회 시간 초과
    #[error("secret watcher failed to sync within {timeout_secs}s")]
    SyncTimeout { timeout_secs: u64 },
}

/// 중복 제거 캐시 에러
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// 원격 저장소 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 명령 실행 실패
    #[error("command failed: {0}")]
    Command(String),
}

/// 리더 선출 에러
#[derive(Debug, thiserror::Error)]
pub enum ElectionError {
    /// 임대(lease) 저장소 접근 실패
    #[error("lease backend error: {0}")]
    Backend(String),

    /// 리더십 상실로 선출 루프 종료
    #[error("leadership lost for lock '{lock}'")]
    LeadershipLost { lock: String },

    /// 선출 루프 종료
    #[error("leader election stopped for lock '{lock}'")]
    Stopped { lock: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_courier_error() {
        let err: CourierError = ConfigError::InvalidValue {
            field: "general.log_level".to_owned(),
            reason: "bad".to_owned(),
        }
        .into();
        assert!(matches!(err, CourierError::Config(_)));
        assert!(err.to_string().contains("general.log_level"));
    }

    #[test]
    fn target_error_display_names_target_and_field() {
        let err = TargetError::MissingField {
            target: "Loki".to_owned(),
            field: "host".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Loki"));
        assert!(msg.contains("host"));
    }

    #[test]
    fn election_error_converts_to_courier_error() {
        let err: CourierError = ElectionError::Stopped {
            lock: "courier".to_owned(),
        }
        .into();
        assert!(matches!(err, CourierError::Election(_)));
    }
}
