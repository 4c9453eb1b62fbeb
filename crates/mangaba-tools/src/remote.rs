use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use mangaba_core::error::{FlowError, Result};
use mangaba_core::traits::ToolService;
use mangaba_core::types::ConfigBag;

use crate::kind::ToolKind;

/// Tool backend that forwards every call to an HTTP tool-execution endpoint.
///
/// The endpoint receives `{toolType, input, config}` and answers with either
/// `{result}` or `{error, details}`.
pub struct RemoteToolService {
    http: Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Option<Duration>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ToolRequest<'a> {
    tool_type: &'a str,
    input: &'a str,
    config: &'a ConfigBag,
}

#[derive(Deserialize, Debug, Default)]
struct ToolResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

impl RemoteToolService {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout_secs: u64) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.to_string(),
            api_key,
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        }
    }

    async fn invoke(&self, kind: ToolKind, input: &str, config: &ConfigBag) -> Result<Value> {
        let body = ToolRequest {
            tool_type: kind.as_str(),
            input,
            config,
        };
        debug!(tool = %kind, endpoint = %self.endpoint, "Invoking remote tool");

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FlowError::ToolExecution(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| FlowError::ToolExecution(e.to_string()))?;

        decode_response(status.as_u16(), &text)
    }
}

fn decode_response(status: u16, body: &str) -> Result<Value> {
    let parsed: ToolResponse = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) if (200..300).contains(&status) => {
            return Err(FlowError::ToolExecution(format!("malformed response: {}", e)));
        }
        Err(_) => ToolResponse::default(),
    };

    if let Some(error) = parsed.error {
        if let Some(details) = &parsed.details {
            warn!(status, details = %details, "Remote tool reported an error");
        }
        return Err(FlowError::ToolExecution(error));
    }
    if !(200..300).contains(&status) {
        return Err(FlowError::ToolExecution(format!("HTTP {}", status)));
    }
    parsed
        .result
        .ok_or_else(|| FlowError::ToolExecution("response carried no result".into()))
}

impl ToolService for RemoteToolService {
    fn web_search(&self, query: String) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            self.invoke(ToolKind::WebSearch, &query, &ConfigBag::new())
                .await
        })
    }

    fn database_query(&self, query: String) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            self.invoke(ToolKind::Database, &query, &ConfigBag::new())
                .await
        })
    }

    fn api_call(&self, endpoint: String, config: ConfigBag) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move { self.invoke(ToolKind::Api, &endpoint, &config).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_uses_wire_names() {
        let mut config = ConfigBag::new();
        config.insert("method".into(), json!("POST"));
        let body = ToolRequest {
            tool_type: ToolKind::Api.as_str(),
            input: "https://api.test",
            config: &config,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            json!({
                "toolType": "api",
                "input": "https://api.test",
                "config": { "method": "POST" }
            })
        );
    }

    #[test]
    fn unwraps_result_envelope() {
        let value = decode_response(200, r#"{"result":{"query":"q","rows":[]}}"#).unwrap();
        assert_eq!(value["query"], "q");
    }

    #[test]
    fn surfaces_backend_error_message() {
        let err = decode_response(
            500,
            r#"{"error":"Unknown tool type: shell","details":"Error: Unknown tool type: shell"}"#,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Tool execution failed: Unknown tool type: shell");
    }

    #[test]
    fn non_json_failure_reports_status() {
        let err = decode_response(502, "<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, FlowError::ToolExecution(m) if m == "HTTP 502"));
    }

    #[test]
    fn success_without_result_is_an_error() {
        assert!(decode_response(200, "{}").is_err());
        assert!(decode_response(200, "not json").is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_as_tool_error() {
        let service = RemoteToolService::new("http://127.0.0.1:9/execute-tool", None, 1);
        let err = service.web_search("q".into()).await.unwrap_err();
        assert!(matches!(err, FlowError::ToolExecution(_)));
    }
}
