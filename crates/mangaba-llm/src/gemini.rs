use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use mangaba_core::config::ModelConfig;
use mangaba_core::error::{FlowError, Result};
use mangaba_core::traits::ModelService;
use mangaba_core::types::ModelOptions;

use crate::streaming::{SseEvent, SseStream};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini native API client.
pub struct GeminiClient {
    http: Client,
    config: ModelConfig,
}

impl GeminiClient {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn endpoint(&self, api_key: &str) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            base, self.config.model_id, api_key
        )
    }

    async fn generate(&self, text: String, options: ModelOptions) -> Result<String> {
        let api_key = self
            .config
            .resolve_api_key()
            .ok_or_else(|| FlowError::MissingCredential("Gemini".into()))?;

        let body = build_request(text, &options);

        let response = self
            .http
            .post(self.endpoint(&api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| FlowError::ModelRequest(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(FlowError::ModelRequest(format!("HTTP {}: {}", status, body)));
        }

        collect_response(SseStream::new(response.bytes_stream())).await
    }
}

/// Concatenate streamed text until the body ends.
///
/// A transport error part-way through fails the whole request rather than
/// returning the partial text.
async fn collect_response<S, E>(mut events: S) -> Result<String>
where
    S: Stream<Item = std::result::Result<SseEvent, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut collected = String::new();
    let mut finish_reason = None;

    while let Some(event) = events.next().await {
        let event = event.map_err(|e| {
            FlowError::ModelRequest(format!(
                "stream interrupted after {} chars: {}",
                collected.len(),
                e
            ))
        })?;
        match parse_chunk(&event) {
            Some(ChunkDelta::Text(t)) => collected.push_str(&t),
            Some(ChunkDelta::Finished { text, reason }) => {
                collected.push_str(&text);
                finish_reason = Some(reason);
            }
            Some(ChunkDelta::Blocked(reason)) => {
                return Err(FlowError::ModelRequest(format!(
                    "prompt blocked by Gemini: {}",
                    reason
                )));
            }
            None => {}
        }
    }

    debug!(
        chars = collected.len(),
        finish_reason = finish_reason.as_deref().unwrap_or("none"),
        "Gemini response collected"
    );

    if collected.is_empty() {
        return Err(FlowError::ModelParse(format!(
            "empty response (finish reason: {})",
            finish_reason.as_deref().unwrap_or("none")
        )));
    }
    Ok(collected)
}

// ── Request types ────────────────────────────────────────────────

#[derive(Serialize, Debug)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize, Debug, PartialEq)]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u64>,
}

fn build_request(text: String, options: &ModelOptions) -> GeminiRequest {
    let system_instruction = if options.prompt.is_empty() {
        None
    } else {
        Some(GeminiContent {
            role: None,
            parts: vec![GeminiPart {
                text: Some(options.prompt.clone()),
            }],
        })
    };

    GeminiRequest {
        contents: vec![GeminiContent {
            role: Some("user".to_string()),
            parts: vec![GeminiPart { text: Some(text) }],
        }],
        system_instruction,
        generation_config: GenerationConfig {
            max_output_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.extra.get("topP").and_then(|v| v.as_f64()),
            top_k: options.extra.get("topK").and_then(|v| v.as_u64()),
        },
    }
}

// ── Response types ───────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default, rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(default, rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PromptFeedback {
    #[serde(default, rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, PartialEq)]
enum ChunkDelta {
    Text(String),
    Finished { text: String, reason: String },
    Blocked(String),
}

fn parse_chunk(event: &SseEvent) -> Option<ChunkDelta> {
    if event.data.trim() == "[DONE]" {
        return None;
    }

    let chunk: GeminiStreamChunk = match serde_json::from_str(&event.data) {
        Ok(c) => c,
        Err(e) => {
            warn!(data = %event.data, error = %e, "Failed to parse Gemini SSE chunk");
            return None;
        }
    };

    if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
        return Some(ChunkDelta::Blocked(reason));
    }

    let candidate = chunk.candidates.into_iter().next()?;
    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    match candidate.finish_reason {
        Some(reason) => Some(ChunkDelta::Finished { text, reason }),
        None if text.is_empty() => None,
        None => Some(ChunkDelta::Text(text)),
    }
}

impl ModelService for GeminiClient {
    fn name(&self) -> &str {
        "Gemini"
    }

    fn process_text(&self, text: String, options: ModelOptions) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let timeout_secs = self.config.timeout_secs;
            if timeout_secs == 0 {
                return self.generate(text, options).await;
            }
            tokio::time::timeout(
                Duration::from_secs(timeout_secs),
                self.generate(text, options),
            )
            .await
            .map_err(|_| FlowError::ModelTimeout(timeout_secs))?
        })
    }
}
