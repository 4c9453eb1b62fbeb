use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::debug;

use mangaba_core::error::Result;
use mangaba_core::traits::ToolService;
use mangaba_core::types::ConfigBag;

/// In-process tool backend that returns canned, deterministic-shaped payloads.
///
/// Used when no remote tool endpoint is configured, and in tests.
#[derive(Debug, Default, Clone)]
pub struct MockToolService;

impl MockToolService {
    pub fn new() -> Self {
        Self
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

pub(crate) fn search_payload(query: &str) -> Value {
    let encoded = urlencoding::encode(query);
    json!({
        "query": query,
        "results": [
            {
                "title": format!("Search result for \"{}\"", query),
                "url": format!("https://example.com/search?q={}", encoded),
                "snippet": format!(
                    "This is a mock search result for the query: {}. In a real implementation, this would return actual web search results.",
                    query
                ),
            },
            {
                "title": format!("Additional information about \"{}\"", query),
                "url": format!("https://example.org/info/{}", encoded),
                "snippet": format!(
                    "More detailed information and context about {} from various sources across the web.",
                    query
                ),
            }
        ],
        "timestamp": now(),
    })
}

pub(crate) fn database_payload(query: &str) -> Value {
    json!({
        "query": query,
        "result": format!("Database query executed: {}", query),
        "rows": [
            { "id": 1, "data": format!("Mock data for {}", query) },
            { "id": 2, "data": format!("Additional mock data related to {}", query) }
        ],
        "timestamp": now(),
    })
}

pub(crate) fn api_payload(endpoint: &str, config: &ConfigBag) -> Value {
    let url = config
        .get("url")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(endpoint);
    let method = config
        .get("method")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("GET");

    json!({
        "url": url,
        "method": method,
        "response": {
            "status": 200,
            "data": format!("Mock API response for {} {}", method, url),
            "timestamp": now(),
        }
    })
}

impl ToolService for MockToolService {
    fn web_search(&self, query: String) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            debug!(query = %query, "Mock web search");
            Ok(search_payload(&query))
        })
    }

    fn database_query(&self, query: String) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            debug!(query = %query, "Mock database query");
            Ok(database_payload(&query))
        })
    }

    fn api_call(&self, endpoint: String, config: ConfigBag) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            debug!(endpoint = %endpoint, "Mock API call");
            Ok(api_payload(&endpoint, &config))
        })
    }
}
