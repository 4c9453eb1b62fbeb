use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{ConfigBag, ExecutionStep, ModelOptions};

/// Remote language-model service used by AI nodes.
pub trait ModelService: Send + Sync + 'static {
    /// Service name, used in error messages ("Failed to process with <name>").
    fn name(&self) -> &str;

    /// Process `text` under the instruction and parameters in `options`.
    fn process_text(&self, text: String, options: ModelOptions) -> BoxFuture<'_, Result<String>>;
}

/// External tool backend used by tool nodes.
///
/// Payloads are opaque to the engine; they become the node's output as-is.
pub trait ToolService: Send + Sync + 'static {
    /// Returns `{query, results[], timestamp}`.
    fn web_search(&self, query: String) -> BoxFuture<'_, Result<serde_json::Value>>;

    /// Returns `{query, result, rows[], timestamp}`.
    fn database_query(&self, query: String) -> BoxFuture<'_, Result<serde_json::Value>>;

    /// Returns `{url, method, response}`.
    fn api_call(
        &self,
        endpoint: String,
        config: ConfigBag,
    ) -> BoxFuture<'_, Result<serde_json::Value>>;
}

/// Receives a snapshot of every step, in node-registration order, each time
/// any step changes status. Called synchronously from the executor.
pub trait StatusObserver: Send + Sync {
    fn on_update(&self, steps: &[ExecutionStep]);
}

impl<F> StatusObserver for F
where
    F: Fn(&[ExecutionStep]) + Send + Sync,
{
    fn on_update(&self, steps: &[ExecutionStep]) {
        self(steps)
    }
}
