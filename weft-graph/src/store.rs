//! Graph store seam and the in-memory implementation
//!
//! The storage engine proper is an external collaborator; this module defines
//! the trait the rest of the system programs against plus `MemoryGraphStore`,
//! a `RwLock`-guarded implementation that serializes writes at the statement
//! level and can persist its state to a JSON file.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::types::{Edge, Node, PropertyMap, Workflow};

/// Partial node update with merge semantics: properties are merged key-by-key,
/// title/status replace when present. Keys absent from the update are untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub title: Option<String>,
    pub status: Option<String>,
    pub properties: Option<PropertyMap>,
}

impl NodeUpdate {
    pub fn properties(properties: PropertyMap) -> Self {
        Self {
            properties: Some(properties),
            ..Default::default()
        }
    }
}

/// Edges touching a node, split by direction
#[derive(Debug, Clone, Default)]
pub struct Neighbors {
    pub incoming: Vec<Edge>,
    pub outgoing: Vec<Edge>,
}

impl Neighbors {
    /// Count edges of the given type over both directions
    pub fn count_by_type(&self, edge_type: &str) -> usize {
        self.incoming
            .iter()
            .chain(self.outgoing.iter())
            .filter(|e| e.edge_type == edge_type)
            .count()
    }
}

/// Node/edge counts for a workflow, broken down by type
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowStats {
    pub nodes: usize,
    pub edges: usize,
    pub nodes_by_type: HashMap<String, usize>,
    pub edges_by_type: HashMap<String, usize>,
}

/// CRUD surface for workflows, nodes and edges.
///
/// Every method is a single statement against the store; callers needing
/// cross-statement atomicity must arrange it themselves.
pub trait GraphStore: Send + Sync {
    fn create_workflow(&self, workflow: Workflow) -> Result<Workflow>;
    fn get_workflow(&self, id: &str) -> Result<Workflow>;
    fn list_workflows(&self) -> Result<Vec<Workflow>>;
    /// Delete a workflow and cascade to its nodes and edges
    fn delete_workflow(&self, id: &str) -> Result<()>;

    fn create_node(&self, node: Node) -> Result<Node>;
    fn get_node(&self, id: &str) -> Result<Node>;
    fn update_node(&self, id: &str, update: NodeUpdate) -> Result<Node>;
    /// Delete a node and any edges touching it
    fn delete_node(&self, id: &str) -> Result<()>;

    fn create_edge(&self, edge: Edge) -> Result<Edge>;
    fn get_edge(&self, id: &str) -> Result<Edge>;
    fn delete_edge(&self, id: &str) -> Result<()>;

    fn nodes_in_workflow(&self, workflow_id: &str) -> Result<Vec<Node>>;
    fn edges_in_workflow(&self, workflow_id: &str) -> Result<Vec<Edge>>;
    /// Incoming and outgoing edges for a node
    fn neighbors(&self, node_id: &str) -> Result<Neighbors>;

    fn stats(&self, workflow_id: &str) -> Result<WorkflowStats>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    workflows: HashMap<String, Workflow>,
    nodes: HashMap<String, Node>,
    edges: HashMap<String, Edge>,
}

/// In-memory graph store with optional JSON persistence
#[derive(Default)]
pub struct MemoryGraphStore {
    state: RwLock<StoreState>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load state from a JSON file, or start empty if it doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| GraphError::Storage(e.to_string()))?;
        let state: StoreState = serde_json::from_str(&content)?;
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Save state to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let state = self.state.read().unwrap();
        let content = serde_json::to_string_pretty(&*state)?;
        std::fs::write(path, content).map_err(|e| GraphError::Storage(e.to_string()))?;
        Ok(())
    }

    fn check_status(state: &StoreState, workflow_id: &str, status: &str) -> Result<()> {
        let workflow = state
            .workflows
            .get(workflow_id)
            .ok_or_else(|| GraphError::WorkflowNotFound(workflow_id.to_string()))?;
        if !workflow.allows_status(status) {
            return Err(GraphError::UnknownStatus {
                status: status.to_string(),
                workflow_id: workflow_id.to_string(),
            });
        }
        Ok(())
    }
}

impl GraphStore for MemoryGraphStore {
    fn create_workflow(&self, workflow: Workflow) -> Result<Workflow> {
        let mut state = self.state.write().unwrap();
        if state.workflows.contains_key(&workflow.id) {
            return Err(GraphError::DuplicateId(workflow.id));
        }
        state.workflows.insert(workflow.id.clone(), workflow.clone());
        tracing::debug!("Created workflow {}", workflow.id);
        Ok(workflow)
    }

    fn get_workflow(&self, id: &str) -> Result<Workflow> {
        let state = self.state.read().unwrap();
        state
            .workflows
            .get(id)
            .cloned()
            .ok_or_else(|| GraphError::WorkflowNotFound(id.to_string()))
    }

    fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let state = self.state.read().unwrap();
        let mut workflows: Vec<Workflow> = state.workflows.values().cloned().collect();
        workflows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(workflows)
    }

    fn delete_workflow(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.workflows.remove(id).is_none() {
            return Err(GraphError::WorkflowNotFound(id.to_string()));
        }
        state.nodes.retain(|_, n| n.workflow_id != id);
        state.edges.retain(|_, e| e.workflow_id != id);
        tracing::info!("Deleted workflow {} with cascade", id);
        Ok(())
    }

    fn create_node(&self, node: Node) -> Result<Node> {
        let mut state = self.state.write().unwrap();
        if !state.workflows.contains_key(&node.workflow_id) {
            return Err(GraphError::WorkflowNotFound(node.workflow_id));
        }
        if state.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateId(node.id));
        }
        if let Some(ref status) = node.status {
            Self::check_status(&state, &node.workflow_id, status)?;
        }
        state.nodes.insert(node.id.clone(), node.clone());
        Ok(node)
    }

    fn get_node(&self, id: &str) -> Result<Node> {
        let state = self.state.read().unwrap();
        state
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))
    }

    fn update_node(&self, id: &str, update: NodeUpdate) -> Result<Node> {
        let mut state = self.state.write().unwrap();
        let workflow_id = state
            .nodes
            .get(id)
            .map(|n| n.workflow_id.clone())
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        if let Some(ref status) = update.status {
            Self::check_status(&state, &workflow_id, status)?;
        }
        let node = state.nodes.get_mut(id).unwrap();
        if let Some(title) = update.title {
            node.title = title;
        }
        if let Some(status) = update.status {
            node.status = Some(status);
        }
        if let Some(properties) = update.properties {
            for (key, value) in properties {
                node.properties.insert(key, value);
            }
        }
        node.updated_at = chrono::Utc::now();
        Ok(node.clone())
    }

    fn delete_node(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.nodes.remove(id).is_none() {
            return Err(GraphError::NodeNotFound(id.to_string()));
        }
        state
            .edges
            .retain(|_, e| e.from_node != id && e.to_node != id);
        Ok(())
    }

    fn create_edge(&self, edge: Edge) -> Result<Edge> {
        let mut state = self.state.write().unwrap();
        if !state.workflows.contains_key(&edge.workflow_id) {
            return Err(GraphError::WorkflowNotFound(edge.workflow_id));
        }
        if !state.nodes.contains_key(&edge.from_node) {
            return Err(GraphError::NodeNotFound(edge.from_node));
        }
        if !state.nodes.contains_key(&edge.to_node) {
            return Err(GraphError::NodeNotFound(edge.to_node));
        }
        if state.edges.contains_key(&edge.id) {
            return Err(GraphError::DuplicateId(edge.id));
        }
        state.edges.insert(edge.id.clone(), edge.clone());
        Ok(edge)
    }

    fn get_edge(&self, id: &str) -> Result<Edge> {
        let state = self.state.read().unwrap();
        state
            .edges
            .get(id)
            .cloned()
            .ok_or_else(|| GraphError::EdgeNotFound(id.to_string()))
    }

    fn delete_edge(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state
            .edges
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| GraphError::EdgeNotFound(id.to_string()))
    }

    fn nodes_in_workflow(&self, workflow_id: &str) -> Result<Vec<Node>> {
        let state = self.state.read().unwrap();
        let mut nodes: Vec<Node> = state
            .nodes
            .values()
            .filter(|n| n.workflow_id == workflow_id)
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(nodes)
    }

    fn edges_in_workflow(&self, workflow_id: &str) -> Result<Vec<Edge>> {
        let state = self.state.read().unwrap();
        let mut edges: Vec<Edge> = state
            .edges
            .values()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect();
        edges.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(edges)
    }

    fn neighbors(&self, node_id: &str) -> Result<Neighbors> {
        let state = self.state.read().unwrap();
        if !state.nodes.contains_key(node_id) {
            return Err(GraphError::NodeNotFound(node_id.to_string()));
        }
        let mut neighbors = Neighbors::default();
        for edge in state.edges.values() {
            if edge.to_node == node_id {
                neighbors.incoming.push(edge.clone());
            }
            if edge.from_node == node_id {
                neighbors.outgoing.push(edge.clone());
            }
        }
        Ok(neighbors)
    }

    fn stats(&self, workflow_id: &str) -> Result<WorkflowStats> {
        let state = self.state.read().unwrap();
        if !state.workflows.contains_key(workflow_id) {
            return Err(GraphError::WorkflowNotFound(workflow_id.to_string()));
        }
        let mut stats = WorkflowStats::default();
        for node in state.nodes.values().filter(|n| n.workflow_id == workflow_id) {
            stats.nodes += 1;
            *stats.nodes_by_type.entry(node.node_type.clone()).or_insert(0) += 1;
        }
        for edge in state.edges.values().filter(|e| e.workflow_id == workflow_id) {
            stats.edges += 1;
            *stats.edges_by_type.entry(edge.edge_type.clone()).or_insert(0) += 1;
        }
        Ok(stats)
    }
}
