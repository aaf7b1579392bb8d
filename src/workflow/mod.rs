//! Workflow documents: the parsed shape of one workflow file.
//!
//! A workflow is a graph of typed nodes plus a connection map keyed by source
//! node name. Parsing is lenient about optional fields (see [`parse_workflow`]);
//! [`build_diagram`] renders the graph as Mermaid text.

mod diagram;
mod parser;

pub use diagram::{build_diagram, sanitize_node_id};
pub use parser::parse_workflow;

use serde::Serialize;

/// A typed unit within a workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    /// Display name, unique within its document.
    pub name: String,
    /// Dotted type identifier, e.g. `n8n-nodes-base.slack`. Empty when missing.
    pub node_type: String,
}

impl Node {
    /// Last dotted segment of the type (`n8n-nodes-base.slack` → `slack`).
    pub fn kind(&self) -> &str {
        self.node_type.rsplit('.').next().unwrap_or("")
    }
}

/// Outgoing edges of one port of a source node.
///
/// `outputs[i]` lists the target node names wired to output slot `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Port {
    pub name: String,
    pub outputs: Vec<Vec<String>>,
}

/// All ports of one source node, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceConnections {
    pub node: String,
    pub ports: Vec<Port>,
}

/// Connection map of a workflow, preserving document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Connections {
    pub sources: Vec<SourceConnections>,
}

impl Connections {
    /// Iterate `(source, target)` pairs: sources, ports, slots and targets in order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.sources.iter().flat_map(|source| {
            source.ports.iter().flat_map(move |port| {
                port.outputs
                    .iter()
                    .flatten()
                    .map(move |target| (source.node.as_str(), target.as_str()))
            })
        })
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// One parsed workflow document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowDocument {
    pub name: String,
    pub description: String,
    pub active: bool,
    pub nodes: Vec<Node>,
    pub connections: Connections,
    pub tags: Vec<String>,
}

impl WorkflowDocument {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
