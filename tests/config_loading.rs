use std::io::Write;

use mangaba_core::config::{AppConfig, FailurePolicy, ToolBackend};

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[model]
provider = "gemini"
model_id = "gemini-1.5-pro"
api_key = "AIzaSyA-full-config-test-key"
base_url = "http://localhost:8089"
timeout_secs = 15

[model.retry]
max_retries = 5
initial_backoff_ms = 250

[tools]
backend = "remote"
endpoint = "https://example.supabase.co/functions/v1/execute-tool"
api_key = "anon-key"
timeout_secs = 10

[executor]
failure_policy = "abort_run"
max_visits_per_node = 8

[log]
log_dir = "/tmp/mangaba-test-logs"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.model.model_id, "gemini-1.5-pro");
    assert_eq!(config.model.timeout_secs, 15);
    assert_eq!(
        config.model.resolve_api_key().as_deref(),
        Some("AIzaSyA-full-config-test-key")
    );

    let retry = config.model.retry.expect("retry present");
    assert_eq!(retry.max_retries, 5);
    assert_eq!(retry.initial_backoff_ms, 250);
    assert_eq!(retry.max_backoff_ms, 30000);

    assert_eq!(config.tools.backend, ToolBackend::Remote);
    assert_eq!(config.tools.timeout_secs, 10);
    assert_eq!(config.executor.failure_policy, FailurePolicy::AbortRun);
    assert_eq!(config.executor.max_visits_per_node, 8);

    let log = config.log.expect("log present");
    assert!(log.enabled);
    assert_eq!(log.dir(), std::path::PathBuf::from("/tmp/mangaba-test-logs"));
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("MANGABA_IT_API_KEY", "AIzaSyA-expanded-key-value");

    let toml_content = r#"
[model]
api_key = "${MANGABA_IT_API_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(
        config.model.api_key,
        Some("AIzaSyA-expanded-key-value".to_string())
    );

    std::env::remove_var("MANGABA_IT_API_KEY");
}

#[test]
fn test_unexpanded_key_is_not_a_credential() {
    let toml_content = r#"
[model]
api_key = "${MANGABA_IT_NEVER_SET_KEY}"
api_key_env = "MANGABA_IT_NEVER_SET_KEY"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(
        config.model.api_key.as_deref(),
        Some("${MANGABA_IT_NEVER_SET_KEY}")
    );
    assert!(config.model.resolve_api_key().is_none());
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml_content = r#"
[model]
model_id = "gemini-1.5-flash-8b"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.model.provider, "gemini");
    assert_eq!(config.model.api_key_env, "GEMINI_API_KEY");
    assert!(config.model.retry.is_none());
    assert_eq!(config.tools.backend, ToolBackend::Mock);
    assert!(config.tools.endpoint.is_none());
    assert_eq!(config.executor.failure_policy, FailurePolicy::IsolateBranch);
    assert_eq!(config.executor.max_visits_per_node, 0);
    assert!(config.log.is_none());
}

#[test]
fn test_missing_file_is_reported() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/mangaba.toml")).unwrap_err();
    assert!(err.to_string().starts_with("Config file not found"));
}

#[test]
fn test_invalid_toml_is_a_config_error() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[executor]\nfailure_policy = \"sometimes\"\n")
        .expect("write toml");

    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert!(err.to_string().starts_with("Config error"));
}

#[test]
fn test_config_roundtrips_through_toml() {
    let config = AppConfig::default();
    let text = toml::to_string_pretty(&config).expect("serialize");
    let back = AppConfig::from_toml(&text).expect("parse");
    assert_eq!(back.model.model_id, config.model.model_id);
    assert_eq!(back.executor.failure_policy, config.executor.failure_policy);
}
