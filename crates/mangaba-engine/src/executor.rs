use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use mangaba_core::config::{ExecutorConfig, FailurePolicy};
use mangaba_core::error::{FlowError, Result};
use mangaba_core::event::EventBus;
use mangaba_core::traits::StatusObserver;
use mangaba_core::types::{
    Execution, ExecutionStep, FlowEvent, Node, RunStatus, StepStatus,
};

use crate::dispatch::{self, NodeBehavior};
use crate::graph::FlowGraph;
use crate::handlers::NodeHandlers;
use crate::observer::{BusObserver, Fanout};

/// Everything a finished run leaves behind.
#[derive(Debug, Clone)]
pub struct FlowRun {
    pub execution: Execution,
    /// Final state of every step, in node-registration order.
    pub steps: Vec<ExecutionStep>,
}

impl FlowRun {
    pub fn step(&self, node_id: &str) -> Option<&ExecutionStep> {
        self.steps.iter().find(|s| s.node_id == node_id)
    }

    pub fn succeeded(&self) -> bool {
        self.execution.status == RunStatus::Completed
    }
}

/// Walks a flow graph depth-first from its entry nodes, one node at a time.
///
/// Each node's handler output becomes the input of every node downstream of
/// it. Step transitions are pushed to the observer as they happen.
pub struct FlowExecutor {
    graph: FlowGraph,
    handlers: NodeHandlers,
    config: ExecutorConfig,
    flow_id: String,
    event_bus: Option<Arc<EventBus>>,
}

struct RunState<'o> {
    steps: Vec<ExecutionStep>,
    index: HashMap<String, usize>,
    visits: HashMap<String, usize>,
    output: Option<Value>,
    first_error: Option<String>,
    observers: Fanout<'o>,
}

impl RunState<'_> {
    fn transition(&mut self, node_id: &str, update: impl FnOnce(&mut ExecutionStep)) {
        if let Some(&i) = self.index.get(node_id) {
            update(&mut self.steps[i]);
            self.observers.notify(&self.steps);
        }
    }

    fn fail(&mut self, node_id: &str, err: &FlowError) {
        let message = err.to_string();
        self.first_error.get_or_insert_with(|| message.clone());
        self.transition(node_id, |step| {
            step.status = StepStatus::Error;
            step.error = Some(message);
        });
    }
}

impl FlowExecutor {
    pub fn new(graph: FlowGraph, handlers: NodeHandlers) -> Self {
        Self {
            graph,
            handlers,
            config: ExecutorConfig::default(),
            flow_id: format!("flow_{}", Uuid::new_v4().simple()),
            event_bus: None,
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_flow_id(mut self, flow_id: impl Into<String>) -> Self {
        self.flow_id = flow_id.into();
        self
    }

    /// Publish run and step events on `bus` in addition to the observer.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    /// Run the graph against `input`.
    ///
    /// Never returns an error: failures are recorded on the failing step and
    /// on the returned execution.
    pub async fn execute(&self, input: Value, observer: Option<&dyn StatusObserver>) -> FlowRun {
        let started = Instant::now();
        let mut execution = Execution::start(self.flow_id.clone(), input.clone());

        let bus_observer = self
            .event_bus
            .as_ref()
            .map(|bus| BusObserver::new(bus.clone(), execution.id.clone()));
        let mut observers: Vec<&dyn StatusObserver> = Vec::new();
        if let Some(o) = observer {
            observers.push(o);
        }
        if let Some(b) = &bus_observer {
            observers.push(b);
        }

        let mut state = RunState {
            steps: Vec::with_capacity(self.graph.nodes.len()),
            index: HashMap::new(),
            visits: HashMap::new(),
            output: None,
            first_error: None,
            observers: Fanout { observers },
        };
        for node in &self.graph.nodes {
            if state.index.contains_key(&node.id) {
                warn!(node_id = %node.id, "Duplicate node id, sharing the first step");
                continue;
            }
            state.index.insert(node.id.clone(), state.steps.len());
            state.steps.push(ExecutionStep::pending(node.id.clone()));
        }

        self.publish(FlowEvent::RunStarted {
            execution_id: execution.id.clone(),
            node_count: self.graph.nodes.len(),
        });
        info!(
            execution_id = %execution.id,
            flow_id = %execution.flow_id,
            nodes = self.graph.nodes.len(),
            connections = self.graph.connections.len(),
            "Flow run started"
        );

        match self.graph.entry_nodes() {
            Ok(entries) => {
                for entry in entries {
                    let result = self.run_node(&mut state, entry, input.clone()).await;
                    if result.is_err() && self.config.failure_policy == FailurePolicy::AbortRun {
                        break;
                    }
                }
            }
            Err(e) => {
                warn!(execution_id = %execution.id, error = %e, "Flow has no entry point");
                state.first_error = Some(e.to_string());
            }
        }

        execution.output = state.output.take();
        match state.first_error.take() {
            Some(message) => {
                execution.status = RunStatus::Error;
                execution.error = Some(message.clone());
                error!(
                    execution_id = %execution.id,
                    error = %message,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Flow run failed"
                );
                self.publish(FlowEvent::RunFailed {
                    execution_id: execution.id.clone(),
                    error: message,
                });
            }
            None => {
                execution.status = RunStatus::Completed;
                info!(
                    execution_id = %execution.id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Flow run completed"
                );
                self.publish(FlowEvent::RunCompleted {
                    execution_id: execution.id.clone(),
                    output: execution.output.clone(),
                });
            }
        }

        FlowRun {
            execution,
            steps: state.steps,
        }
    }

    fn publish(&self, event: FlowEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    fn run_node<'a, 'o: 'a>(
        &'a self,
        state: &'a mut RunState<'o>,
        node: &'a Node,
        input: Value,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let visits = {
                let count = state.visits.entry(node.id.clone()).or_insert(0);
                *count += 1;
                *count
            };
            let limit = self.config.max_visits_per_node;
            if limit > 0 && visits > limit {
                let err = FlowError::CycleLimit {
                    node_id: node.id.clone(),
                    visits,
                };
                warn!(node_id = %node.id, visits, limit, "Visit limit exceeded");
                state.fail(&node.id, &err);
                return Err(err);
            }

            info!(node_id = %node.id, node_type = %node.kind, "Executing flow node");
            state.transition(&node.id, |step| {
                step.status = StepStatus::Running;
                step.input = Some(input.clone());
                step.output = None;
                step.error = None;
            });

            let node_start = Instant::now();
            let result = match dispatch::resolve(&node.kind) {
                Some(behavior) => self
                    .handlers
                    .handle(node, behavior, input)
                    .await
                    .map(|output| (behavior, output)),
                None => Err(FlowError::UnknownNodeType(node.kind.clone())),
            };

            let (behavior, output) = match result {
                Ok(done) => done,
                Err(e) => {
                    error!(node_id = %node.id, error = %e, "Flow node failed");
                    state.fail(&node.id, &e);
                    return Err(e);
                }
            };

            if behavior == NodeBehavior::ResultSink {
                state.output = Some(output.clone());
            }
            state.transition(&node.id, |step| {
                step.status = StepStatus::Completed;
                step.output = Some(output.clone());
            });
            debug!(
                node_id = %node.id,
                elapsed_ms = node_start.elapsed().as_millis() as u64,
                "Flow node complete"
            );

            let mut branch_error = None;
            for next in self.graph.downstream_of(&node.id) {
                if let Err(e) = self.run_node(state, next, output.clone()).await {
                    match self.config.failure_policy {
                        FailurePolicy::AbortRun => return Err(e),
                        FailurePolicy::IsolateBranch => {
                            branch_error.get_or_insert(e);
                        }
                    }
                }
            }
            match branch_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
    }
}
