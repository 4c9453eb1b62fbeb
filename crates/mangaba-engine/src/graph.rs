use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use mangaba_core::config::validate_api_key;
use mangaba_core::error::{FlowError, Result};
use mangaba_core::types::{Connection, Node};

use crate::dispatch;

/// Nodes and the directed connections between them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default, alias = "edges")]
    pub connections: Vec<Connection>,
}

/// Every node that is not the target of any connection, in node order.
pub fn entry_nodes<'a>(nodes: &'a [Node], connections: &[Connection]) -> Result<Vec<&'a Node>> {
    let targets: HashSet<&str> = connections.iter().map(|c| c.target.as_str()).collect();
    let entries: Vec<&Node> = nodes
        .iter()
        .filter(|n| !targets.contains(n.id.as_str()))
        .collect();
    if entries.is_empty() {
        return Err(FlowError::NoEntryPoint);
    }
    Ok(entries)
}

/// Targets of every connection leaving `node_id`, in connection order.
///
/// A node targeted by several such connections appears once per connection.
/// Targets that name no node are skipped.
pub fn downstream_of<'a>(
    node_id: &str,
    nodes: &'a [Node],
    connections: &[Connection],
) -> Vec<&'a Node> {
    connections
        .iter()
        .filter(|c| c.source == node_id)
        .filter_map(|c| {
            let target = nodes.iter().find(|n| n.id == c.target);
            if target.is_none() {
                warn!(
                    connection_id = %c.id,
                    source = %c.source,
                    target = %c.target,
                    "Connection targets a missing node, skipping"
                );
            }
            target
        })
        .collect()
}

impl FlowGraph {
    pub fn new(nodes: Vec<Node>, connections: Vec<Connection>) -> Self {
        Self { nodes, connections }
    }

    /// Parse a graph, refusing one with no nodes.
    pub fn from_json(json: &str) -> Result<Self> {
        let graph: Self = serde_json::from_str(json)?;
        if graph.nodes.is_empty() {
            return Err(FlowError::InvalidGraph("flow has no nodes".into()));
        }
        Ok(graph)
    }

    /// Load a graph from a JSON file holding `{nodes, connections}`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// First node registered under `id`.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn entry_nodes(&self) -> Result<Vec<&Node>> {
        entry_nodes(&self.nodes, &self.connections)
    }

    pub fn downstream_of(&self, node_id: &str) -> Vec<&Node> {
        downstream_of(node_id, &self.nodes, &self.connections)
    }

    /// Whether any node calls the model service.
    pub fn requires_model(&self) -> bool {
        self.nodes
            .iter()
            .any(|n| dispatch::resolve(&n.kind).is_some_and(|b| b.is_model()))
    }

    /// Structural report. Never fails; the caller decides what is fatal.
    pub fn validate(&self) -> GraphReport {
        let mut report = GraphReport::default();

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) && !report.duplicate_ids.contains(&node.id) {
                report.duplicate_ids.push(node.id.clone());
            }
            if dispatch::resolve(&node.kind).is_none() {
                report.unknown_types.push((node.id.clone(), node.kind.clone()));
            }
        }

        for conn in &self.connections {
            let source_ok = seen.contains(conn.source.as_str());
            let target_ok = seen.contains(conn.target.as_str());
            if !source_ok || !target_ok {
                report.dangling_connections.push(conn.id.clone());
            }
        }

        report.entry_nodes = match self.entry_nodes() {
            Ok(entries) => entries.into_iter().map(|n| n.id.clone()).collect(),
            Err(_) => Vec::new(),
        };
        report
    }
}

/// Refuse a run that needs the model service when no usable credential exists.
pub fn preflight(graph: &FlowGraph, service: &str, credential: Option<&str>) -> Result<()> {
    if !graph.requires_model() {
        return Ok(());
    }
    match credential.map(validate_api_key) {
        Some(Ok(_)) => Ok(()),
        _ => Err(FlowError::MissingCredential(service.to_string())),
    }
}

/// Findings of [`FlowGraph::validate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphReport {
    pub entry_nodes: Vec<String>,
    pub duplicate_ids: Vec<String>,
    /// Ids of connections whose source or target names no node.
    pub dangling_connections: Vec<String>,
    /// `(node_id, type)` pairs with no handler.
    pub unknown_types: Vec<(String, String)>,
}

impl GraphReport {
    /// True when the graph has an entry point and no structural problems.
    pub fn is_clean(&self) -> bool {
        !self.entry_nodes.is_empty()
            && self.duplicate_ids.is_empty()
            && self.dangling_connections.is_empty()
            && self.unknown_types.is_empty()
    }

    pub fn issues(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.entry_nodes.is_empty() {
            out.push(FlowError::NoEntryPoint.to_string());
        }
        for id in &self.duplicate_ids {
            out.push(format!("Duplicate node id: {}", id));
        }
        for id in &self.dangling_connections {
            out.push(format!("Connection {} references a missing node", id));
        }
        for (id, kind) in &self.unknown_types {
            out.push(format!("Node {}: {}", id, FlowError::UnknownNodeType(kind.clone())));
        }
        out
    }
}

impl fmt::Display for GraphReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Entry nodes: {}", self.entry_nodes.join(", "))?;
        let issues = self.issues();
        if issues.is_empty() {
            return writeln!(f, "No issues found.");
        }
        for issue in issues {
            writeln!(f, "  - {}", issue)?;
        }
        Ok(())
    }
}
