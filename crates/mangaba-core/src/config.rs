use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

/// Minimum length of a credential accepted by [`validate_api_key`].
pub const MIN_API_KEY_LEN: usize = 20;

/// Top-level Mangaba configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub log: Option<LogConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is absent.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Deadline for one model call, in seconds (0 = no deadline).
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: None,
            api_key_env: default_api_key_env(),
            base_url: None,
            timeout_secs: default_model_timeout(),
            retry: None,
        }
    }
}

impl ModelConfig {
    /// Resolve the credential: explicit key first, then the configured env var.
    /// Returns `None` unless the key passes [`validate_api_key`].
    pub fn resolve_api_key(&self) -> Option<String> {
        let candidate = self
            .api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())?;
        validate_api_key(&candidate).ok()
    }
}

fn default_provider() -> String { "gemini".to_string() }
fn default_model_id() -> String { "gemini-1.5-flash".to_string() }
fn default_api_key_env() -> String { "GEMINI_API_KEY".to_string() }
fn default_model_timeout() -> u64 { 60 }

/// Retry configuration for model requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Which tool backend serves tool nodes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolBackend {
    /// In-process backend returning canned payloads.
    #[default]
    Mock,
    /// HTTP endpoint accepting `{toolType, input, config}`.
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub backend: ToolBackend,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            backend: ToolBackend::Mock,
            endpoint: None,
            api_key: None,
            timeout_secs: default_tool_timeout(),
        }
    }
}

fn default_tool_timeout() -> u64 { 30 }

/// What a handler failure does to the rest of the run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The first failure ends the run; nothing else is dispatched.
    AbortRun,
    /// Only the failing node's downstream is skipped; siblings and later
    /// entry nodes still run. The run still ends in `error`.
    #[default]
    IsolateBranch,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Maximum dispatches of a single node in one run (0 = unlimited).
    #[serde(default)]
    pub max_visits_per_node: usize,
}

/// JSONL run logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable run logging (default: true when section is present).
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// Directory for log files. Default: ./mangaba-logs
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: default_log_dir(),
        }
    }
}

fn default_log_enabled() -> bool { true }
fn default_log_dir() -> String { "./mangaba-logs".to_string() }

impl LogConfig {
    /// Resolve the log directory (expand ~).
    pub fn dir(&self) -> PathBuf {
        if let Some(rest) = self.log_dir.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(&self.log_dir)
    }
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| FlowError::ConfigNotFound(path.display().to_string()))?;

        Self::from_toml(&content)
    }

    /// Parse config from TOML text, with env var expansion.
    pub fn from_toml(content: &str) -> Result<Self> {
        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(content);

        toml::from_str(&expanded).map_err(|e| FlowError::Config(e.to_string()))
    }
}

/// Check that a credential looks usable.
pub fn validate_api_key(key: &str) -> Result<String> {
    let key = key.trim();
    if key.is_empty() {
        return Err(FlowError::Config("API key is empty".into()));
    }
    if key.starts_with("${") {
        return Err(FlowError::Config(format!(
            "API key references an unset environment variable: {}",
            key
        )));
    }
    if key.len() < MIN_API_KEY_LEN {
        return Err(FlowError::Config(format!(
            "API key is too short (minimum {} characters)",
            MIN_API_KEY_LEN
        )));
    }
    Ok(key.to_string())
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_MANGABA_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_MANGABA_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_MANGABA_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_MANGABA_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_MANGABA_VAR}\"");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.model.provider, "gemini");
        assert_eq!(config.model.api_key_env, "GEMINI_API_KEY");
        assert_eq!(config.model.timeout_secs, 60);
        assert_eq!(config.tools.backend, ToolBackend::Mock);
        assert_eq!(config.executor.failure_policy, FailurePolicy::IsolateBranch);
        assert_eq!(config.executor.max_visits_per_node, 0);
        assert!(config.log.is_none());
    }

    #[test]
    fn test_executor_and_tools_sections() {
        let toml_str = r#"
[executor]
failure_policy = "abort_run"
max_visits_per_node = 4

[tools]
backend = "remote"
endpoint = "https://example.com/functions/v1/execute-tool"
"#;
        let config = AppConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.executor.failure_policy, FailurePolicy::AbortRun);
        assert_eq!(config.executor.max_visits_per_node, 4);
        assert_eq!(config.tools.backend, ToolBackend::Remote);
        assert_eq!(config.tools.timeout_secs, 30);
    }

    #[test]
    fn test_validate_api_key() {
        assert!(validate_api_key("").is_err());
        assert!(validate_api_key("short").is_err());
        assert!(validate_api_key("${GEMINI_API_KEY}").is_err());
        let key = validate_api_key("  AIzaSyA-0123456789abcdef  ").unwrap();
        assert_eq!(key, "AIzaSyA-0123456789abcdef");
    }

    #[test]
    fn test_resolve_api_key_prefers_explicit_key() {
        let config = ModelConfig {
            api_key: Some("AIzaSyA-explicit-key-0000".into()),
            api_key_env: "MANGABA_TEST_UNUSED_KEY_ENV".into(),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_api_key().as_deref(),
            Some("AIzaSyA-explicit-key-0000")
        );
    }

    #[test]
    fn test_resolve_api_key_from_env() {
        std::env::set_var("MANGABA_TEST_KEY_ENV", "AIzaSyA-from-environment-1");
        let config = ModelConfig {
            api_key_env: "MANGABA_TEST_KEY_ENV".into(),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_api_key().as_deref(),
            Some("AIzaSyA-from-environment-1")
        );
        std::env::remove_var("MANGABA_TEST_KEY_ENV");

        let missing = ModelConfig {
            api_key_env: "MANGABA_TEST_KEY_ENV_MISSING".into(),
            ..Default::default()
        };
        assert!(missing.resolve_api_key().is_none());
    }
}
