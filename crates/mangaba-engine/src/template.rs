use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use mangaba_core::types::{Connection, Node};

use crate::graph::FlowGraph;

/// A reusable flow: nodes and connections with template-local ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowTemplate {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default, alias = "edges")]
    pub connections: Vec<Connection>,
}

impl FlowTemplate {
    /// Copy the template into a new graph with fresh node ids.
    pub fn instantiate(&self) -> FlowGraph {
        self.instantiate_with(|node| format!("{}-{}", node.kind, Uuid::new_v4().simple()))
    }

    /// Like [`instantiate`](Self::instantiate), with caller-chosen ids.
    ///
    /// Connection endpoints are rewritten through the original → new id table.
    /// Connections that mention an id the template does not define are dropped.
    pub fn instantiate_with(&self, mut new_id: impl FnMut(&Node) -> String) -> FlowGraph {
        let mut remap: HashMap<&str, String> = HashMap::with_capacity(self.nodes.len());
        let mut nodes = Vec::with_capacity(self.nodes.len());

        for node in &self.nodes {
            let id = new_id(node);
            remap.entry(node.id.as_str()).or_insert_with(|| id.clone());
            let mut copy = node.clone();
            copy.id = id;
            nodes.push(copy);
        }

        let connections = self
            .connections
            .iter()
            .filter_map(|conn| {
                let (Some(source), Some(target)) = (
                    remap.get(conn.source.as_str()),
                    remap.get(conn.target.as_str()),
                ) else {
                    warn!(
                        template_id = %self.id,
                        connection_id = %conn.id,
                        "Template connection references an unknown node, dropping"
                    );
                    return None;
                };
                let mut copy = Connection::new(source.clone(), target.clone());
                copy.source_handle = conn.source_handle.clone();
                copy.target_handle = conn.target_handle.clone();
                Some(copy)
            })
            .collect();

        FlowGraph::new(nodes, connections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mangaba_test_utils::{connect, input_node, output_node};

    fn template() -> FlowTemplate {
        FlowTemplate {
            id: "sentiment-pipeline".into(),
            name: "Sentiment Pipeline".into(),
            nodes: vec![input_node("input-1"), Node::new("sentiment-1", "sentiment"), output_node("output-1")],
            connections: vec![
                connect("input-1", "sentiment-1").with_handles("out", "in"),
                connect("sentiment-1", "output-1"),
                connect("sentiment-1", "missing-9"),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn remaps_every_endpoint() {
        let mut n = 0;
        let graph = template().instantiate_with(|node| {
            n += 1;
            format!("{}-{}", node.kind, n)
        });

        let ids: Vec<_> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["input-1", "sentiment-2", "output-3"]);
        assert_eq!(graph.connections.len(), 2);
        assert_eq!(graph.connections[0].source, "input-1");
        assert_eq!(graph.connections[0].target, "sentiment-2");
        assert_eq!(graph.connections[0].source_handle.as_deref(), Some("out"));
        assert_eq!(graph.connections[1].source, "sentiment-2");
        assert_eq!(graph.connections[1].target, "output-3");
    }

    #[test]
    fn fresh_ids_differ_between_instances() {
        let t = template();
        let a = t.instantiate();
        let b = t.instantiate();
        assert_ne!(a.nodes[0].id, b.nodes[0].id);
        assert!(a.nodes[1].id.starts_with("sentiment-"));
        assert!(a.validate().is_clean());
    }

    #[test]
    fn deserializes_template_json() {
        let t: FlowTemplate = serde_json::from_str(
            r#"{
                "id": "t1",
                "name": "Echo",
                "nodes": [
                    {"id": "input-1", "type": "input", "data": {"label": "Text Input"}, "position": {"x": 100, "y": 100}},
                    {"id": "output-1", "type": "output", "data": {"label": "Output"}, "position": {"x": 400, "y": 100}}
                ],
                "connections": [{"id": "e1", "source": "input-1", "target": "output-1"}]
            }"#,
        )
        .unwrap();
        let graph = t.instantiate();
        assert_eq!(graph.connections[0].source, graph.nodes[0].id);
        assert_eq!(graph.connections[0].target, graph.nodes[1].id);
    }
}
