//! courier.toml 통합 설정 테스트
//!
//! - courier.toml.example 파싱 테스트
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 빈 파일 / 잘못된 형식 에러 테스트

use courier_core::config::CourierConfig;
use courier_core::error::{ConfigError, CourierError};

// =============================================================================
// courier.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let content = include_str!("../../../courier.toml.example");
    let config = CourierConfig::parse(content).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "json");
    assert_eq!(config.general.targets_file, "/etc/courier/targets.yaml");
}

#[test]
fn example_config_passes_validation() {
    let content = include_str!("../../../courier.toml.example");
    let config = CourierConfig::parse(content).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_code_defaults() {
    let content = include_str!("../../../courier.toml.example");
    let example = CourierConfig::parse(content).expect("should parse");
    let defaults = CourierConfig::default();

    assert_eq!(example.general.log_level, defaults.general.log_level);
    assert_eq!(example.metrics.port, defaults.metrics.port);
    assert_eq!(example.rest.enabled, defaults.rest.enabled);
    assert_eq!(
        example.leader_election.lease_duration_secs,
        defaults.leader_election.lease_duration_secs
    );
    assert_eq!(
        example.leader_election.renew_deadline_secs,
        defaults.leader_election.renew_deadline_secs
    );
    assert_eq!(
        example.leader_election.retry_period_secs,
        defaults.leader_election.retry_period_secs
    );
    assert_eq!(example.cache.backend, defaults.cache.backend);
    assert_eq!(example.cache.ttl_secs, defaults.cache.ttl_secs);
    assert_eq!(example.redis.address, defaults.redis.address);
    assert_eq!(example.secrets.sync_timeout_secs, defaults.secrets.sync_timeout_secs);
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn partial_config_general_only() {
    let toml = r#"
[general]
log_level = "debug"
log_format = "pretty"
"#;
    let config = CourierConfig::parse(toml).expect("should parse");
    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.general.log_format, "pretty");
    assert_eq!(config.cache.backend, "memory");
    config.validate().expect("should validate");
}

#[test]
fn partial_config_leader_election_with_redis() {
    let toml = r#"
[leader_election]
enabled = true
pod_name = "courier-0"

[redis]
enabled = true
address = "redis.monitoring:6379"
"#;
    let config = CourierConfig::parse(toml).expect("should parse");
    config.validate().expect("should validate");
    assert_eq!(config.leader_election.lock_name, "courier");
    assert_eq!(config.redis.url(), "redis://redis.monitoring:6379/0");
}

#[test]
fn partial_config_redis_cache() {
    let toml = r#"
[cache]
backend = "redis"
ttl_secs = 60

[redis]
enabled = true
"#;
    let config = CourierConfig::parse(toml).expect("should parse");
    config.validate().expect("should validate");
    assert_eq!(config.cache.ttl().as_secs(), 60);
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[general]
log_level = "info"
"#;

    let original = std::env::var("COURIER_GENERAL_LOG_LEVEL").ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("COURIER_GENERAL_LOG_LEVEL", "error");
    }

    let mut config = CourierConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    let result = config.general.log_level.clone();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("COURIER_GENERAL_LOG_LEVEL", val),
            None => std::env::remove_var("COURIER_GENERAL_LOG_LEVEL"),
        }
    }

    assert_eq!(result, "error");
}

#[test]
#[serial_test::serial]
fn env_override_bool_field() {
    let original = std::env::var("COURIER_REST_ENABLED").ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("COURIER_REST_ENABLED", "true");
    }

    let mut config = CourierConfig::default();
    config.apply_env_overrides();
    let result = config.rest.enabled;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("COURIER_REST_ENABLED", val),
            None => std::env::remove_var("COURIER_REST_ENABLED"),
        }
    }

    assert!(result);
}

#[test]
#[serial_test::serial]
fn env_override_numeric_field() {
    let original = std::env::var("COURIER_LEADER_ELECTION_LEASE_DURATION_SECS").ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("COURIER_LEADER_ELECTION_LEASE_DURATION_SECS", "60");
    }

    let mut config = CourierConfig::default();
    config.apply_env_overrides();
    let result = config.leader_election.lease_duration_secs;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("COURIER_LEADER_ELECTION_LEASE_DURATION_SECS", val),
            None => std::env::remove_var("COURIER_LEADER_ELECTION_LEASE_DURATION_SECS"),
        }
    }

    assert_eq!(result, 60);
}

#[test]
#[serial_test::serial]
fn env_override_invalid_numeric_keeps_toml_value() {
    let toml = r#"
[cache]
ttl_secs = 120
"#;
    let original = std::env::var("COURIER_CACHE_TTL_SECS").ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("COURIER_CACHE_TTL_SECS", "soon");
    }

    let mut config = CourierConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    let result = config.cache.ttl_secs;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("COURIER_CACHE_TTL_SECS", val),
            None => std::env::remove_var("COURIER_CACHE_TTL_SECS"),
        }
    }

    assert_eq!(result, 120);
}

// =============================================================================
// 에러 케이스
// =============================================================================

#[test]
fn empty_string_parses_with_defaults() {
    let config = CourierConfig::parse("").expect("empty should parse");
    assert_eq!(config.general.log_level, "info");
    config.validate().expect("defaults should validate");
}

#[test]
fn comments_only_parses_with_defaults() {
    let toml = "# just a comment\n# another\n";
    let config = CourierConfig::parse(toml).expect("should parse");
    assert_eq!(config.cache.backend, "memory");
}

#[test]
fn malformed_toml_returns_parse_error() {
    let result = CourierConfig::parse("[general\nlog_level = ");
    assert!(matches!(
        result.unwrap_err(),
        CourierError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn wrong_type_for_numeric_field() {
    let toml = r#"
[leader_election]
lease_duration_secs = "fifteen"
"#;
    assert!(CourierConfig::parse(toml).is_err());
}

#[test]
fn unknown_section_is_ignored() {
    let toml = r#"
[general]
log_level = "warn"

[unknown_section]
foo = "bar"
"#;
    let config = CourierConfig::parse(toml).expect("unknown sections are ignored");
    assert_eq!(config.general.log_level, "warn");
}

#[tokio::test]
async fn from_file_nonexistent_returns_file_not_found() {
    let result = CourierConfig::from_file("/tmp/courier_test_nonexistent_12345.toml").await;
    assert!(matches!(
        result.unwrap_err(),
        CourierError::Config(ConfigError::FileNotFound { .. })
    ));
}

#[tokio::test]
async fn load_from_tempfile_validates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("courier.toml");
    tokio::fs::write(&path, "[general]\nlog_level = \"bogus\"\n")
        .await
        .expect("write");

    let result = CourierConfig::load(&path).await;
    assert!(matches!(
        result.unwrap_err(),
        CourierError::Config(ConfigError::InvalidValue { .. })
    ));
}

// =============================================================================
// 직렬화 라운드트립 테스트
// =============================================================================

#[test]
fn example_config_serialize_roundtrip() {
    let content = include_str!("../../../courier.toml.example");
    let config = CourierConfig::parse(content).expect("should parse");
    let serialized = toml::to_string_pretty(&config).expect("should serialize");
    let reparsed = CourierConfig::parse(&serialized).expect("should reparse");
    assert_eq!(
        config.leader_election.lock_name,
        reparsed.leader_election.lock_name
    );
    assert_eq!(config.secrets.dir, reparsed.secrets.dir);
}
