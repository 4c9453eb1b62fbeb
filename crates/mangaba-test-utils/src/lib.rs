//! Mocks and fixtures shared by Mangaba test suites.

use std::sync::Mutex;

use futures::future::BoxFuture;
use serde_json::Value;

use mangaba_core::error::{FlowError, Result};
use mangaba_core::traits::{ModelService, StatusObserver};
use mangaba_core::types::{Connection, ExecutionStep, ModelOptions, Node, StepStatus};

/// One recorded call to [`ScriptedModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCall {
    pub text: String,
    pub options: ModelOptions,
}

#[derive(Clone)]
enum Reply {
    Fixed(String),
    Fail(String),
}

/// Model service that answers from a script and records every call.
///
/// Replies are consumed in order; once the script runs out the last reply
/// keeps being used. An empty script echoes the input back prefixed with
/// `"model: "`.
pub struct ScriptedModel {
    name: String,
    replies: Mutex<Vec<Reply>>,
    calls: Mutex<Vec<ModelCall>>,
}

impl ScriptedModel {
    pub fn echo() -> Self {
        Self::with_replies(Vec::new())
    }

    pub fn replying(text: impl Into<String>) -> Self {
        Self::with_replies(vec![Reply::Fixed(text.into())])
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_replies(vec![Reply::Fail(message.into())])
    }

    fn with_replies(replies: Vec<Reply>) -> Self {
        Self {
            name: "Gemini".to_string(),
            replies: Mutex::new(replies),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue another fixed reply after the current ones.
    pub fn then_reply(self, text: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push(Reply::Fixed(text.into()));
        self
    }

    /// Queue a failure after the current replies.
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push(Reply::Fail(message.into()));
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn calls(&self) -> Vec<ModelCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next_reply(&self, text: &str) -> Result<String> {
        let mut replies = self.replies.lock().unwrap();
        let reply = if replies.len() > 1 {
            Some(replies.remove(0))
        } else {
            replies.first().cloned()
        };
        match reply {
            None => Ok(format!("model: {}", text)),
            Some(Reply::Fixed(t)) => Ok(t),
            Some(Reply::Fail(m)) => Err(FlowError::ModelRequest(m)),
        }
    }
}

impl ModelService for ScriptedModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn process_text(&self, text: String, options: ModelOptions) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(ModelCall {
                text: text.clone(),
                options,
            });
            self.next_reply(&text)
        })
    }
}

/// Status observer that keeps every snapshot it is handed.
#[derive(Default)]
pub struct RecordingObserver {
    snapshots: Mutex<Vec<Vec<ExecutionStep>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, steps: &[ExecutionStep]) {
        self.snapshots.lock().unwrap().push(steps.to_vec());
    }

    pub fn snapshots(&self) -> Vec<Vec<ExecutionStep>> {
        self.snapshots.lock().unwrap().clone()
    }

    /// `(node_id, status)` of the step that changed in each snapshot.
    pub fn transitions(&self) -> Vec<(String, StepStatus)> {
        let snapshots = self.snapshots.lock().unwrap();
        let mut previous: Option<&Vec<ExecutionStep>> = None;
        let mut out = Vec::new();
        for snap in snapshots.iter() {
            for (i, step) in snap.iter().enumerate() {
                let changed = match previous {
                    Some(prev) => prev.get(i) != Some(step),
                    None => step.status != StepStatus::Pending,
                };
                if changed {
                    out.push((step.node_id.clone(), step.status));
                }
            }
            previous = Some(snap);
        }
        out
    }
}

impl StatusObserver for RecordingObserver {
    fn on_update(&self, steps: &[ExecutionStep]) {
        self.record(steps);
    }
}

// ── Fixtures ─────────────────────────────────────────────────────

pub fn input_node(id: &str) -> Node {
    Node::new(id, "input").with_label("Text Input")
}

pub fn output_node(id: &str) -> Node {
    Node::new(id, "output").with_label("Output")
}

pub fn model_node(id: &str, kind: &str) -> Node {
    Node::new(id, kind)
}

pub fn tool_node(id: &str, kind: &str, config: Value) -> Node {
    Node::new(id, kind).with_config(config)
}

pub fn connect(source: &str, target: &str) -> Connection {
    Connection::new(source, target)
}

/// `input → <kind> → output`, with ids `in1`, `n1`, `out1`.
pub fn linear_flow(kind: &str) -> (Vec<Node>, Vec<Connection>) {
    (
        vec![input_node("in1"), Node::new("n1", kind), output_node("out1")],
        vec![connect("in1", "n1"), connect("n1", "out1")],
    )
}
