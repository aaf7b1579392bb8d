use super::{Connections, Node};

/// Placeholder rendered for a workflow without nodes.
const EMPTY_DIAGRAM: &str = "graph TD\n    A[No nodes found]";

/// Render a workflow graph as Mermaid `graph TD` text.
///
/// Output is a pure function of its input: nodes in document order, then
/// edges in connection-map order (sources, ports, output slots, targets).
pub fn build_diagram(nodes: &[Node], connections: &Connections) -> String {
    if nodes.is_empty() {
        return EMPTY_DIAGRAM.to_string();
    }

    let mut lines = vec!["graph TD".to_string()];

    for node in nodes {
        let kind = match node.kind() {
            "" => "unknown",
            kind => kind,
        };
        lines.push(format!(
            "    {}[\"{}\\n({})\"]",
            sanitize_node_id(&node.name),
            node.name.replace('"', "'"),
            kind
        ));
    }

    for (source, target) in connections.edges() {
        lines.push(format!(
            "    {} --> {}",
            sanitize_node_id(source),
            sanitize_node_id(target)
        ));
    }

    let mut diagram = lines.join("\n");
    diagram.push('\n');
    diagram
}

/// Mermaid-safe identifier: non-alphanumeric characters become `_`, then
/// leading and trailing `_` are stripped.
pub fn sanitize_node_id(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    replaced.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::parse_workflow;

    fn node(name: &str, node_type: &str) -> Node {
        Node { name: name.to_string(), node_type: node_type.to_string() }
    }

    #[test]
    fn test_sanitize_node_id() {
        assert_eq!(sanitize_node_id("Send Email"), "Send_Email");
        assert_eq!(sanitize_node_id("  HTTP Request (2) "), "HTTP_Request__2");
        assert_eq!(sanitize_node_id("__x__"), "x");
        assert_eq!(sanitize_node_id("Café"), "Caf");
        assert_eq!(sanitize_node_id("***"), "");
    }

    #[test]
    fn test_empty_workflow_placeholder() {
        let diagram = build_diagram(&[], &Connections::default());
        assert_eq!(diagram, "graph TD\n    A[No nodes found]");
    }

    #[test]
    fn test_diagram_nodes_and_edges() {
        let doc = parse_workflow(
            br#"{
                "nodes": [
                    {"name": "On Webhook", "type": "n8n-nodes-base.webhook"},
                    {"name": "Post \"hi\"", "type": "n8n-nodes-base.slack"},
                    {"name": "Mystery"}
                ],
                "connections": {
                    "On Webhook": {"main": [[{"node": "Post \"hi\""}, {"node": "Mystery"}]]}
                }
            }"#,
        )
        .unwrap();

        let diagram = build_diagram(&doc.nodes, &doc.connections);
        let expected = concat!(
            "graph TD\n",
            "    On_Webhook[\"On Webhook\\n(webhook)\"]\n",
            "    Post__hi[\"Post 'hi'\\n(slack)\"]\n",
            "    Mystery[\"Mystery\\n(unknown)\"]\n",
            "    On_Webhook --> Post__hi\n",
            "    On_Webhook --> Mystery\n",
        );
        assert_eq!(diagram, expected);
    }

    #[test]
    fn test_diagram_is_deterministic() {
        let nodes = vec![node("A", "x.a"), node("B", "x.b")];
        let raw = br#"{"nodes": [], "connections": {"A": {"main": [[{"node": "B"}]]}}}"#;
        let connections = parse_workflow(raw).unwrap().connections;

        let first = build_diagram(&nodes, &connections);
        for _ in 0..10 {
            assert_eq!(build_diagram(&nodes, &connections), first);
        }
    }
}
