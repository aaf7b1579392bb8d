use serde_json::{Map, Value as JsonValue};

use super::{Connections, Node, Port, SourceConnections, WorkflowDocument};
use crate::error::{FlowdexError, Result};

/// Parse one raw workflow document.
///
/// Fails only on structural problems: invalid UTF-8 or JSON, a top level that
/// is not an object, or a missing / non-array `nodes` field. Every other field
/// is optional and falls back to an empty value.
pub fn parse_workflow(raw: &[u8]) -> Result<WorkflowDocument> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| FlowdexError::Parse(format!("document is not valid UTF-8: {}", e)))?;

    let value: JsonValue = serde_json::from_str(text)
        .map_err(|e| FlowdexError::Parse(format!("invalid JSON: {}", e)))?;

    let map = value
        .as_object()
        .ok_or_else(|| FlowdexError::Parse("top level is not an object".to_string()))?;

    let nodes = match map.get("nodes") {
        Some(JsonValue::Array(items)) => items.iter().filter_map(parse_node).collect(),
        Some(_) => return Err(FlowdexError::Parse("`nodes` is not an array".to_string())),
        None => return Err(FlowdexError::Parse("missing `nodes` field".to_string())),
    };

    Ok(WorkflowDocument {
        name: string_field(map, "name"),
        description: string_field(map, "description"),
        active: map.get("active").and_then(JsonValue::as_bool).unwrap_or(false),
        nodes,
        connections: parse_connections(map.get("connections")),
        tags: parse_tags(map.get("tags")),
    })
}

fn string_field(map: &Map<String, JsonValue>, key: &str) -> String {
    map.get(key)
        .and_then(JsonValue::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Non-object entries are skipped.
fn parse_node(value: &JsonValue) -> Option<Node> {
    let map = value.as_object()?;
    Some(Node {
        name: map.get("name").and_then(JsonValue::as_str).unwrap_or("").to_string(),
        node_type: map.get("type").and_then(JsonValue::as_str).unwrap_or("").to_string(),
    })
}

/// Tags are either plain strings or `{ "name": ... }` objects.
fn parse_tags(value: Option<&JsonValue>) -> Vec<String> {
    let Some(JsonValue::Array(items)) = value else {
        return Vec::new();
    };

    let mut tags: Vec<String> = Vec::new();
    for item in items {
        let tag = match item {
            JsonValue::String(s) => s.trim(),
            JsonValue::Object(obj) => obj.get("name").and_then(JsonValue::as_str).unwrap_or("").trim(),
            _ => "",
        };
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

fn parse_connections(value: Option<&JsonValue>) -> Connections {
    let Some(JsonValue::Object(sources)) = value else {
        return Connections::default();
    };

    let sources = sources
        .iter()
        .filter_map(|(source, ports)| {
            let ports: Vec<Port> = ports
                .as_object()?
                .iter()
                .map(|(port, slots)| Port {
                    name: port.clone(),
                    outputs: normalize_slots(slots),
                })
                .collect();
            Some(SourceConnections {
                node: source.clone(),
                ports,
            })
        })
        .collect();

    Connections { sources }
}

/// Normalize a port value to `[[target, ...], ...]`.
///
/// Accepts the canonical array of arrays, a flat array of targets (one slot)
/// or a single target object. Anything else yields no slots.
fn normalize_slots(value: &JsonValue) -> Vec<Vec<String>> {
    match value {
        JsonValue::Array(items) if items.iter().all(JsonValue::is_array) => items
            .iter()
            .filter_map(JsonValue::as_array)
            .map(|slot| slot.iter().filter_map(target_name).collect())
            .collect(),
        JsonValue::Array(items) if items.iter().all(JsonValue::is_object) => {
            vec![items.iter().filter_map(target_name).collect()]
        }
        JsonValue::Object(_) => vec![target_name(value).into_iter().collect()],
        _ => Vec::new(),
    }
}

fn target_name(value: &JsonValue) -> Option<String> {
    value
        .as_object()?
        .get("node")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "name": "  Slack alerts ",
        "active": true,
        "tags": ["ops", {"id": "1", "name": "alerts"}, "ops", 7],
        "nodes": [
            {"name": "Webhook", "type": "n8n-nodes-base.webhook", "parameters": {}},
            {"name": "Post", "type": "n8n-nodes-base.slack"},
            "garbage"
        ],
        "connections": {
            "Webhook": {"main": [[{"node": "Post", "type": "main", "index": 0}]]}
        }
    }"#;

    #[test]
    fn test_parse_full_document() {
        let doc = parse_workflow(SAMPLE.as_bytes()).unwrap();
        assert_eq!(doc.name, "Slack alerts");
        assert!(doc.active);
        assert_eq!(doc.description, "");
        assert_eq!(doc.tags, vec!["ops", "alerts"]);
        assert_eq!(doc.node_count(), 2);
        assert_eq!(doc.nodes[1].node_type, "n8n-nodes-base.slack");
        let edges: Vec<_> = doc.connections.edges().collect();
        assert_eq!(edges, vec![("Webhook", "Post")]);
    }

    #[test]
    fn test_parse_minimal_document_defaults() {
        let doc = parse_workflow(br#"{"nodes": []}"#).unwrap();
        assert_eq!(doc.name, "");
        assert!(!doc.active);
        assert!(doc.tags.is_empty());
        assert!(doc.nodes.is_empty());
        assert!(doc.connections.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        let cases: [&[u8]; 5] = [
            b"not json",
            b"[1, 2]",
            br#"{"name": "no nodes"}"#,
            br#"{"nodes": {"a": 1}}"#,
            b"\xff\xfe{}",
        ];
        for raw in cases {
            let err = parse_workflow(raw).unwrap_err();
            assert!(matches!(err, FlowdexError::Parse(_)), "expected parse error for {:?}", raw);
        }
    }

    #[test]
    fn test_missing_node_fields_default_to_empty() {
        let doc = parse_workflow(br#"{"nodes": [{"name": "A"}, {"type": "x.y"}]}"#).unwrap();
        assert_eq!(doc.nodes[0].node_type, "");
        assert_eq!(doc.nodes[1].name, "");
    }

    #[test]
    fn test_connection_shapes_are_normalized() {
        let raw = br#"{
            "nodes": [],
            "connections": {
                "A": {"main": [{"node": "B"}, {"node": "C"}]},
                "B": {"main": {"node": "C"}},
                "C": {"main": "bogus"},
                "D": 42
            }
        }"#;
        let doc = parse_workflow(raw).unwrap();

        assert_eq!(doc.connections.sources.len(), 3);
        assert_eq!(doc.connections.sources[0].ports[0].outputs, vec![vec!["B".to_string(), "C".to_string()]]);
        assert_eq!(doc.connections.sources[1].ports[0].outputs, vec![vec!["C".to_string()]]);
        assert!(doc.connections.sources[2].ports[0].outputs.is_empty());
    }

    #[test]
    fn test_connection_order_is_preserved() {
        let raw = br#"{
            "nodes": [],
            "connections": {
                "Zeta": {"main": [[{"node": "Alpha"}]]},
                "Alpha": {"main": [[{"node": "Mid"}]]}
            }
        }"#;
        let doc = parse_workflow(raw).unwrap();
        let sources: Vec<_> = doc.connections.sources.iter().map(|s| s.node.as_str()).collect();
        assert_eq!(sources, vec!["Zeta", "Alpha"]);
    }
}
