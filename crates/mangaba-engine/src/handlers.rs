use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, error};

use mangaba_core::error::{FlowError, Result};
use mangaba_core::traits::{ModelService, ToolService};
use mangaba_core::types::{ConfigBag, ModelOptions, Node};
use mangaba_tools::{calculator, ToolKind};

use crate::dispatch::{NodeBehavior, ToolSelector};

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// The collaborators node handlers call out to.
#[derive(Clone)]
pub struct NodeHandlers {
    model: Arc<dyn ModelService>,
    tools: Arc<dyn ToolService>,
}

impl NodeHandlers {
    pub fn new(model: Arc<dyn ModelService>, tools: Arc<dyn ToolService>) -> Self {
        Self { model, tools }
    }

    /// Run `node`'s behavior against `input` and return its output.
    pub async fn handle(&self, node: &Node, behavior: NodeBehavior, input: Value) -> Result<Value> {
        match behavior {
            NodeBehavior::PassThrough => Ok(input),
            NodeBehavior::ModelInvocation(template) => self.invoke_model(node, template, input).await,
            NodeBehavior::ToolInvocation(selector) => self.invoke_tool(node, selector, input).await,
            NodeBehavior::ResultSink => Ok(output_envelope(&node.id, input)),
        }
    }

    async fn invoke_model(&self, node: &Node, template: &str, input: Value) -> Result<Value> {
        let options = model_options(template, node.data.config.as_ref());
        let text = serialize_input(&input);
        debug!(
            node_id = %node.id,
            service = self.model.name(),
            temperature = options.temperature,
            max_tokens = options.max_tokens,
            "Invoking model"
        );

        match self.model.process_text(text, options).await {
            Ok(reply) => Ok(Value::String(reply)),
            Err(e) => {
                error!(node_id = %node.id, error = %e, "Model invocation failed");
                Err(FlowError::ModelInvocation {
                    service: self.model.name().to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    async fn invoke_tool(&self, node: &Node, selector: ToolSelector, input: Value) -> Result<Value> {
        let result = match select_tool(node, selector) {
            Ok(kind) => {
                debug!(node_id = %node.id, tool = %kind, "Invoking tool");
                self.run_tool(node, kind, serialize_input(&input)).await
            }
            Err(e) => Err(e),
        };

        result.map_err(|e| {
            error!(node_id = %node.id, error = %e, "Tool node failed");
            match e {
                FlowError::ToolExecution(_) => e,
                other => FlowError::ToolExecution(other.to_string()),
            }
        })
    }

    async fn run_tool(&self, node: &Node, kind: ToolKind, input: String) -> Result<Value> {
        match kind {
            ToolKind::WebSearch => self.tools.web_search(input).await,
            ToolKind::Database => self.tools.database_query(input).await,
            ToolKind::Api => {
                let config = node.data.config.clone().unwrap_or_default();
                self.tools.api_call(input, config).await
            }
            ToolKind::Calculator => Ok(calculator::calculate(&input)),
        }
    }
}

fn select_tool(node: &Node, selector: ToolSelector) -> Result<ToolKind> {
    match selector {
        ToolSelector::Fixed(kind) => Ok(kind),
        ToolSelector::Configured => match node.config_str("toolType").filter(|s| !s.is_empty()) {
            None => Ok(ToolKind::WebSearch),
            Some(name) => {
                ToolKind::parse(name).ok_or_else(|| FlowError::UnknownToolType(name.to_string()))
            }
        },
    }
}

/// Text handed to model and tool services: strings as-is, anything else as
/// compact JSON.
pub fn serialize_input(input: &Value) -> String {
    match input {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Merge an instruction template with a node's configuration.
///
/// `prompt`, `temperature` and `maxTokens` from the config win over the
/// template and defaults; every other key is passed through in `extra`.
/// Null or non-numeric values count as absent.
pub fn model_options(template: &str, config: Option<&ConfigBag>) -> ModelOptions {
    let mut options = ModelOptions {
        prompt: template.to_string(),
        temperature: DEFAULT_TEMPERATURE,
        max_tokens: DEFAULT_MAX_TOKENS,
        extra: ConfigBag::new(),
    };

    let Some(config) = config else {
        return options;
    };

    for (key, value) in config {
        match key.as_str() {
            "prompt" => {
                if let Some(p) = value.as_str() {
                    options.prompt = p.to_string();
                }
            }
            "temperature" => {
                if let Some(t) = value.as_f64() {
                    options.temperature = t;
                }
            }
            "maxTokens" => {
                if let Some(n) = value.as_u64() {
                    options.max_tokens = u32::try_from(n).unwrap_or(u32::MAX);
                } else if let Some(f) = value.as_f64().filter(|f| *f >= 0.0) {
                    options.max_tokens = f.min(u32::MAX as f64) as u32;
                }
            }
            _ => {
                options.extra.insert(key.clone(), value.clone());
            }
        }
    }
    options
}

/// The record an output node produces.
pub fn output_envelope(node_id: &str, input: Value) -> Value {
    json!({
        "result": input,
        "timestamp": Utc::now().to_rfc3339(),
        "nodeId": node_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mangaba_test_utils::ScriptedModel;
    use mangaba_tools::MockToolService;

    fn handlers(model: Arc<ScriptedModel>) -> NodeHandlers {
        NodeHandlers::new(model, Arc::new(MockToolService::new()))
    }

    #[test]
    fn serializes_strings_raw_and_values_as_json() {
        assert_eq!(serialize_input(&json!("hello")), "hello");
        assert_eq!(serialize_input(&json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(serialize_input(&json!(42)), "42");
        assert_eq!(serialize_input(&Value::Null), "null");
    }

    #[test]
    fn model_options_use_defaults_without_config() {
        let opts = model_options("T", None);
        assert_eq!(opts.prompt, "T");
        assert_eq!(opts.temperature, 0.7);
        assert_eq!(opts.max_tokens, 1024);
        assert!(opts.extra.is_empty());
    }

    #[test]
    fn config_keys_override_template_and_defaults() {
        let config = json!({
            "prompt": "Custom",
            "temperature": 0.0,
            "maxTokens": 64,
            "targetLanguage": "pt-BR"
        });
        let opts = model_options("T", config.as_object());
        assert_eq!(opts.prompt, "Custom");
        assert_eq!(opts.temperature, 0.0);
        assert_eq!(opts.max_tokens, 64);
        assert_eq!(opts.extra.get("targetLanguage"), Some(&json!("pt-BR")));
    }

    #[test]
    fn non_numeric_settings_fall_back_to_defaults() {
        let config = json!({ "temperature": null, "maxTokens": "lots" });
        let opts = model_options("T", config.as_object());
        assert_eq!(opts.temperature, 0.7);
        assert_eq!(opts.max_tokens, 1024);
    }

    #[tokio::test]
    async fn pass_through_returns_input() {
        let h = handlers(Arc::new(ScriptedModel::echo()));
        let node = Node::new("in1", "input");
        let out = h
            .handle(&node, NodeBehavior::PassThrough, json!({"k": [1, 2]}))
            .await
            .unwrap();
        assert_eq!(out, json!({"k": [1, 2]}));
    }

    #[tokio::test]
    async fn model_node_sends_template_and_serialized_input() {
        let model = Arc::new(ScriptedModel::replying("positive (0.93)"));
        let h = handlers(model.clone());
        let node = Node::new("s1", "sentiment");

        let out = h
            .handle(&node, NodeBehavior::ModelInvocation("TEMPLATE"), json!({"text": "great"}))
            .await
            .unwrap();

        assert_eq!(out, json!("positive (0.93)"));
        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].text, r#"{"text":"great"}"#);
        assert_eq!(calls[0].options.prompt, "TEMPLATE");
    }

    #[tokio::test]
    async fn model_failure_names_the_service() {
        let h = handlers(Arc::new(ScriptedModel::failing("HTTP 503")));
        let node = Node::new("l1", "llm");
        let err = h
            .handle(&node, NodeBehavior::ModelInvocation("T"), json!("x"))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to process with Gemini: Model request failed: HTTP 503"
        );
    }

    #[tokio::test]
    async fn output_node_wraps_input() {
        let h = handlers(Arc::new(ScriptedModel::echo()));
        let node = Node::new("out1", "output");
        let out = h
            .handle(&node, NodeBehavior::ResultSink, json!("hello"))
            .await
            .unwrap();
        assert_eq!(out["result"], "hello");
        assert_eq!(out["nodeId"], "out1");
        assert!(out["timestamp"].is_string());
    }

    #[tokio::test]
    async fn generic_tool_defaults_to_web_search() {
        let h = handlers(Arc::new(ScriptedModel::echo()));
        let node = Node::new("t1", "tool");
        let out = h
            .handle(&node, NodeBehavior::ToolInvocation(ToolSelector::Configured), json!("rust"))
            .await
            .unwrap();
        assert_eq!(out["query"], "rust");
        assert_eq!(out["results"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn generic_tool_reads_tool_type() {
        let h = handlers(Arc::new(ScriptedModel::echo()));
        let node = Node::new("t1", "tool").with_config(json!({ "toolType": "calculator" }));
        let out = h
            .handle(&node, NodeBehavior::ToolInvocation(ToolSelector::Configured), json!("2*(3+4)"))
            .await
            .unwrap();
        assert_eq!(out["result"], 14);
    }

    #[tokio::test]
    async fn unknown_tool_type_is_a_tool_failure() {
        let h = handlers(Arc::new(ScriptedModel::echo()));
        let node = Node::new("t1", "tool").with_config(json!({ "toolType": "shell" }));
        let err = h
            .handle(&node, NodeBehavior::ToolInvocation(ToolSelector::Configured), json!("ls"))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Tool execution failed: Unknown tool type: shell"
        );
    }

    #[tokio::test]
    async fn api_call_passes_node_config() {
        let h = handlers(Arc::new(ScriptedModel::echo()));
        let node = Node::new("a1", "api-call").with_config(json!({ "method": "DELETE" }));
        let out = h
            .handle(
                &node,
                NodeBehavior::ToolInvocation(ToolSelector::Fixed(ToolKind::Api)),
                json!("https://api.test/x"),
            )
            .await
            .unwrap();
        assert_eq!(out["method"], "DELETE");
        assert_eq!(out["url"], "https://api.test/x");
    }

    #[tokio::test]
    async fn calculator_error_payload_is_not_a_failure() {
        let h = handlers(Arc::new(ScriptedModel::echo()));
        let node = Node::new("c1", "calculator");
        let out = h
            .handle(
                &node,
                NodeBehavior::ToolInvocation(ToolSelector::Fixed(ToolKind::Calculator)),
                json!("no digits here"),
            )
            .await
            .unwrap();
        assert_eq!(out["error"], "Invalid mathematical expression");
    }
}
