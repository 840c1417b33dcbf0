//! Seed deltas: the shape the transformer emits
//!
//! A delta is a proposed set of node and edge creations cross-referenced by
//! temp ids that are only meaningful within one run. Referential integrity is
//! checked before any matching or application begins.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

use crate::error::{GraphError, Result};
use crate::types::PropertyMap;

/// A proposed node, identified by a run-scoped temp id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedNode {
    pub temp_id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub properties: PropertyMap,
}

/// A proposed edge referencing nodes by temp id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedEdge {
    pub from_temp_id: String,
    pub to_temp_id: String,
    #[serde(rename = "type")]
    pub edge_type: String,
    #[serde(default)]
    pub properties: PropertyMap,
}

/// A complete proposed delta, not yet matched or applied
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub nodes: Vec<SeedNode>,
    #[serde(default)]
    pub edges: Vec<SeedEdge>,
}

/// Keys of a flat record that belong to the seed envelope rather than
/// to the node's property mapping.
const ENVELOPE_KEYS: &[&str] = &["temp_id", "type", "title", "status", "edges"];

impl SeedData {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Reject the delta when an edge references a temp id that no node
    /// declares, or when two nodes share a temp id. Lists every offender.
    pub fn validate_references(&self) -> Result<()> {
        let mut problems = vec![];
        let mut seen: HashSet<&str> = HashSet::new();

        for node in &self.nodes {
            if node.temp_id.is_empty() {
                problems.push(format!("node '{}' has an empty temp_id", node.title));
            } else if !seen.insert(node.temp_id.as_str()) {
                problems.push(format!("duplicate temp_id '{}'", node.temp_id));
            }
        }

        for (index, edge) in self.edges.iter().enumerate() {
            if !seen.contains(edge.from_temp_id.as_str()) {
                problems.push(format!(
                    "edge {} references unknown temp_id '{}'",
                    index, edge.from_temp_id
                ));
            }
            if !seen.contains(edge.to_temp_id.as_str()) {
                problems.push(format!(
                    "edge {} references unknown temp_id '{}'",
                    index, edge.to_temp_id
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(GraphError::InvalidDelta { problems })
        }
    }

    /// Build a delta from a stream of flat records.
    ///
    /// Each record is an object carrying the envelope keys (`temp_id`, `type`,
    /// `title`, optional `status`) with every other key folded into the node's
    /// property mapping. Edges may be embedded per record under `edges`; an
    /// embedded edge defaults its `from` endpoint to the record's temp id:
    /// `{"to": "t2", "type": "Knows"}`.
    pub fn from_records(records: &[JsonValue]) -> Result<SeedData> {
        let mut data = SeedData::default();
        let mut problems = vec![];

        for (index, record) in records.iter().enumerate() {
            let Some(object) = record.as_object() else {
                problems.push(format!("record {} is not an object", index));
                continue;
            };

            let temp_id = match object.get("temp_id").and_then(|v| v.as_str()) {
                Some(id) => id.to_string(),
                None => {
                    problems.push(format!("record {} is missing temp_id", index));
                    continue;
                }
            };
            let node_type = match object.get("type").and_then(|v| v.as_str()) {
                Some(t) => t.to_string(),
                None => {
                    problems.push(format!("record {} is missing type", index));
                    continue;
                }
            };
            let title = match object.get("title").and_then(|v| v.as_str()) {
                Some(t) => t.to_string(),
                None => {
                    problems.push(format!("record {} is missing title", index));
                    continue;
                }
            };
            let status = object
                .get("status")
                .and_then(|v| v.as_str())
                .map(String::from);

            let mut properties = PropertyMap::new();
            for (key, value) in object {
                if !ENVELOPE_KEYS.contains(&key.as_str()) {
                    properties.insert(key.clone(), value.clone());
                }
            }

            if let Some(edges) = object.get("edges").and_then(|v| v.as_array()) {
                for (edge_index, embedded) in edges.iter().enumerate() {
                    match parse_embedded_edge(embedded, &temp_id) {
                        Some(edge) => data.edges.push(edge),
                        None => problems.push(format!(
                            "record {} edge {} is malformed",
                            index, edge_index
                        )),
                    }
                }
            }

            data.nodes.push(SeedNode {
                temp_id,
                node_type,
                title,
                status,
                properties,
            });
        }

        if problems.is_empty() {
            Ok(data)
        } else {
            Err(GraphError::InvalidDelta { problems })
        }
    }
}

fn parse_embedded_edge(value: &JsonValue, default_from: &str) -> Option<SeedEdge> {
    let object = value.as_object()?;
    let edge_type = object.get("type")?.as_str()?.to_string();
    let to_temp_id = object.get("to")?.as_str()?.to_string();
    let from_temp_id = object
        .get("from")
        .and_then(|v| v.as_str())
        .unwrap_or(default_from)
        .to_string();
    let mut properties = PropertyMap::new();
    if let Some(props) = object.get("properties").and_then(|v| v.as_object()) {
        properties = props.clone();
    }
    Some(SeedEdge {
        from_temp_id,
        to_temp_id,
        edge_type,
        properties,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(temp_id: &str, title: &str) -> SeedNode {
        SeedNode {
            temp_id: temp_id.to_string(),
            node_type: "Person".to_string(),
            title: title.to_string(),
            status: None,
            properties: PropertyMap::new(),
        }
    }

    #[test]
    fn test_valid_references() {
        let data = SeedData {
            nodes: vec![node("t1", "Ada"), node("t2", "Grace")],
            edges: vec![SeedEdge {
                from_temp_id: "t1".to_string(),
                to_temp_id: "t2".to_string(),
                edge_type: "Knows".to_string(),
                properties: PropertyMap::new(),
            }],
        };
        assert!(data.validate_references().is_ok());
    }

    #[test]
    fn test_dangling_temp_id_rejected() {
        let data = SeedData {
            nodes: vec![node("t1", "Ada")],
            edges: vec![SeedEdge {
                from_temp_id: "t1".to_string(),
                to_temp_id: "t9".to_string(),
                edge_type: "Knows".to_string(),
                properties: PropertyMap::new(),
            }],
        };
        let err = data.validate_references().unwrap_err();
        assert!(err.to_string().contains("t9"));
    }

    #[test]
    fn test_duplicate_temp_id_rejected() {
        let data = SeedData {
            nodes: vec![node("t1", "Ada"), node("t1", "Grace")],
            edges: vec![],
        };
        let err = data.validate_references().unwrap_err();
        assert!(err.to_string().contains("duplicate temp_id 't1'"));
    }

    #[test]
    fn test_from_records_folds_properties() {
        let records = vec![json!({
            "temp_id": "t1",
            "type": "Person",
            "title": "Ada Lovelace",
            "email": "ada@example.com",
            "edges": [{"to": "t2", "type": "WorksAt"}]
        })];

        let data = SeedData::from_records(&records).unwrap();
        assert_eq!(data.nodes.len(), 1);
        assert_eq!(data.nodes[0].properties["email"], json!("ada@example.com"));
        assert!(!data.nodes[0].properties.contains_key("title"));
        assert_eq!(data.edges.len(), 1);
        assert_eq!(data.edges[0].from_temp_id, "t1");
        assert_eq!(data.edges[0].to_temp_id, "t2");
    }

    #[test]
    fn test_from_records_reports_every_problem() {
        let records = vec![
            json!("not an object"),
            json!({"type": "Person", "title": "No Id"}),
        ];
        let err = SeedData::from_records(&records).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("record 0"));
        assert!(message.contains("record 1"));
    }
}
