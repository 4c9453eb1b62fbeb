use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

use mangaba_core::config::RetryConfig;
use mangaba_core::error::{FlowError, Result};
use mangaba_core::traits::ModelService;
use mangaba_core::types::ModelOptions;

/// A model service that retries transient failures with jittered backoff.
pub struct RetryingModel {
    inner: Box<dyn ModelService>,
    retry_config: RetryConfig,
}

impl RetryingModel {
    pub fn new(inner: Box<dyn ModelService>, retry_config: RetryConfig) -> Self {
        Self {
            inner,
            retry_config,
        }
    }
}

fn is_retryable(e: &FlowError) -> bool {
    match e {
        FlowError::ModelRequest(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        FlowError::ModelTimeout(_) => true,
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // Jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl ModelService for RetryingModel {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn process_text(&self, text: String, options: ModelOptions) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;
            let mut attempt = 0;

            loop {
                match self.inner.process_text(text.clone(), options.clone()).await {
                    Ok(out) => return Ok(out),
                    Err(e) if is_retryable(&e) && attempt < max_retries => {
                        let backoff = calculate_backoff(attempt, &self.retry_config);
                        warn!(
                            attempt = attempt + 1,
                            max_retries,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Retrying model request"
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }
}
