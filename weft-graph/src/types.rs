//! Entity definitions for the workflow graph

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Open property mapping carried by nodes and edges
pub type PropertyMap = serde_json::Map<String, JsonValue>;

fn short_id(prefix: &str) -> String {
    format!(
        "{}-{}",
        prefix,
        Uuid::new_v4().to_string().split('-').next().unwrap()
    )
}

/// A workflow scopes nodes and edges and declares the status vocabulary
/// its nodes may use. An empty vocabulary means statuses are unrestricted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    /// Finite set of node statuses this workflow allows
    #[serde(default)]
    pub node_statuses: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: short_id("wf"),
            name: name.into(),
            node_statuses: vec![],
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Declare the status vocabulary for nodes in this workflow
    pub fn with_statuses(mut self, statuses: Vec<String>) -> Self {
        self.node_statuses = statuses;
        self
    }

    /// Whether a status value is allowed for nodes in this workflow
    pub fn allows_status(&self, status: &str) -> bool {
        self.node_statuses.is_empty() || self.node_statuses.iter().any(|s| s == status)
    }
}

/// A typed, titled node in a workflow graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub workflow_id: String,
    pub node_type: String,
    pub title: String,
    pub status: Option<String>,
    #[serde(default)]
    pub properties: PropertyMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    pub fn new(
        workflow_id: impl Into<String>,
        node_type: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: short_id("node"),
            workflow_id: workflow_id.into(),
            node_type: node_type.into(),
            title: title.into(),
            status: None,
            properties: PropertyMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_properties(mut self, properties: PropertyMap) -> Self {
        self.properties = properties;
        self
    }
}

/// A typed, directed relation between two nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub workflow_id: String,
    pub edge_type: String,
    pub from_node: String,
    pub to_node: String,
    #[serde(default)]
    pub properties: PropertyMap,
    pub created_at: DateTime<Utc>,
}

impl Edge {
    pub fn new(
        workflow_id: impl Into<String>,
        edge_type: impl Into<String>,
        from_node: impl Into<String>,
        to_node: impl Into<String>,
    ) -> Self {
        Self {
            id: short_id("edge"),
            workflow_id: workflow_id.into(),
            edge_type: edge_type.into(),
            from_node: from_node.into(),
            to_node: to_node.into(),
            properties: PropertyMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_properties(mut self, properties: PropertyMap) -> Self {
        self.properties = properties;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_status_vocabulary() {
        let wf = Workflow::new("deals")
            .with_statuses(vec!["Draft".to_string(), "Released".to_string()]);

        assert!(wf.allows_status("Draft"));
        assert!(wf.allows_status("Released"));
        assert!(!wf.allows_status("Archived"));

        // Empty vocabulary is unrestricted
        let open = Workflow::new("notes");
        assert!(open.allows_status("anything"));
    }

    #[test]
    fn test_node_builders() {
        let node = Node::new("wf-1", "Person", "Ada Lovelace").with_status("Draft");
        assert!(node.id.starts_with("node-"));
        assert_eq!(node.workflow_id, "wf-1");
        assert_eq!(node.status.as_deref(), Some("Draft"));
        assert!(node.properties.is_empty());
    }

    #[test]
    fn test_edge_creation() {
        let edge = Edge::new("wf-1", "Knows", "node-a", "node-b");
        assert!(edge.id.starts_with("edge-"));
        assert_eq!(edge.from_node, "node-a");
        assert_eq!(edge.to_node, "node-b");
    }
}
