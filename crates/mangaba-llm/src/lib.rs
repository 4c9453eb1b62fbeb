pub mod gemini;
pub mod retry;
pub mod streaming;

use std::sync::Arc;

use mangaba_core::config::ModelConfig;
use mangaba_core::error::{FlowError, Result};
use mangaba_core::traits::ModelService;

pub use gemini::GeminiClient;
pub use retry::RetryingModel;

/// Create the model service described by `config`, wrapped in retries when
/// a `[model.retry]` section is present.
pub fn create_service(config: &ModelConfig) -> Result<Arc<dyn ModelService>> {
    let base: Box<dyn ModelService> = match config.provider.as_str() {
        "gemini" | "google" => Box::new(GeminiClient::new(config.clone())),
        other => return Err(FlowError::Config(format!("unsupported model provider: {}", other))),
    };

    Ok(match &config.retry {
        Some(retry) => Arc::new(RetryingModel::new(base, retry.clone())),
        None => Arc::from(base),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mangaba_core::config::RetryConfig;

    #[test]
    fn builds_gemini_with_and_without_retry() {
        let plain = create_service(&ModelConfig::default()).unwrap();
        assert_eq!(plain.name(), "Gemini");

        let retried = create_service(&ModelConfig {
            retry: Some(RetryConfig::default()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(retried.name(), "Gemini");
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = create_service(&ModelConfig {
            provider: "openai".into(),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(err.to_string().contains("unsupported model provider: openai"));
    }
}
