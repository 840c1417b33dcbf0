//! Delta application under a preview/apply split
//!
//! Preview computes the match result and projected counts without touching
//! the store. Apply executes decisions item by item: nodes first (filling the
//! temp-id resolution map), then edges. An item failure is recorded and the
//! batch continues; nothing here is a single transaction. Apply does not
//! re-validate that the graph is unchanged since preview (optimistic, no
//! locking); a matched id that vanished in between surfaces as an item error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{GraphError, Result};
use crate::matcher::{match_delta, MatchDecision, MatchResult};
use crate::seed::{SeedData, SeedNode};
use crate::store::{GraphStore, NodeUpdate};
use crate::types::Node;

/// Counts of store operations performed (or projected)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyCounts {
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub nodes_skipped: usize,
    pub edges_created: usize,
    pub edges_skipped: usize,
}

/// Per-item failure; never aborts the remaining items
#[derive(Debug, Error)]
pub enum ApplyItemError {
    #[error("edge {index} references unresolved temp id '{temp_id}'")]
    DanglingReference { index: usize, temp_id: String },

    #[error("failed to apply {item}: {source}")]
    ItemFailed {
        item: String,
        #[source]
        source: GraphError,
    },
}

/// Outcome of an apply pass
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub counts: ApplyCounts,
    pub errors: Vec<ApplyItemError>,
    /// Complete temp id → real id map after application
    pub resolved: HashMap<String, String>,
}

impl ApplyReport {
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }
}

/// Match result plus projected counts, returned by the dry pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaPreview {
    pub match_result: MatchResult,
    pub projected: ApplyCounts,
}

pub struct DeltaApplicator<'a> {
    store: &'a dyn GraphStore,
}

impl<'a> DeltaApplicator<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self { store }
    }

    /// Dry pass: match the delta and project counts without mutating the store
    pub fn preview(&self, workflow_id: &str, seed: &SeedData) -> Result<DeltaPreview> {
        seed.validate_references()?;
        let existing_nodes = self.store.nodes_in_workflow(workflow_id)?;
        let existing_edges = self.store.edges_in_workflow(workflow_id)?;
        let match_result = match_delta(seed, &existing_nodes, &existing_edges);
        let projected = project_counts(&match_result);
        Ok(DeltaPreview {
            match_result,
            projected,
        })
    }

    /// Commit pass: execute the decisions of a previously computed match result
    pub fn apply(
        &self,
        workflow_id: &str,
        seed: &SeedData,
        match_result: &MatchResult,
    ) -> Result<ApplyReport> {
        // Structural check up front; everything past this point is per-item
        self.store.get_workflow(workflow_id)?;

        let mut report = ApplyReport::default();
        let seed_nodes: HashMap<&str, &SeedNode> =
            seed.nodes.iter().map(|n| (n.temp_id.as_str(), n)).collect();

        for node_match in &match_result.nodes {
            let Some(seed_node) = seed_nodes.get(node_match.temp_id.as_str()) else {
                report.errors.push(ApplyItemError::ItemFailed {
                    item: format!("node '{}'", node_match.temp_id),
                    source: GraphError::NodeNotFound(node_match.temp_id.clone()),
                });
                continue;
            };

            match node_match.decision {
                MatchDecision::Create => {
                    let mut node = Node::new(
                        workflow_id,
                        &seed_node.node_type,
                        &seed_node.title,
                    )
                    .with_properties(seed_node.properties.clone());
                    if let Some(ref status) = seed_node.status {
                        node = node.with_status(status);
                    }
                    match self.store.create_node(node) {
                        Ok(created) => {
                            report
                                .resolved
                                .insert(seed_node.temp_id.clone(), created.id);
                            report.counts.nodes_created += 1;
                        }
                        Err(e) => report.errors.push(ApplyItemError::ItemFailed {
                            item: format!("node '{}'", seed_node.temp_id),
                            source: e,
                        }),
                    }
                }
                MatchDecision::Update => {
                    let matched_id = node_match.matched_id.clone().unwrap_or_default();
                    match self
                        .store
                        .update_node(&matched_id, NodeUpdate::properties(node_match.diff.clone()))
                    {
                        Ok(_) => {
                            report
                                .resolved
                                .insert(seed_node.temp_id.clone(), matched_id);
                            report.counts.nodes_updated += 1;
                        }
                        Err(e) => report.errors.push(ApplyItemError::ItemFailed {
                            item: format!("node '{}'", seed_node.temp_id),
                            source: e,
                        }),
                    }
                }
                MatchDecision::Skip => {
                    if let Some(ref matched_id) = node_match.matched_id {
                        report
                            .resolved
                            .insert(seed_node.temp_id.clone(), matched_id.clone());
                    }
                    report.counts.nodes_skipped += 1;
                }
            }
        }

        for edge_match in &match_result.edges {
            let Some(seed_edge) = seed.edges.get(edge_match.index) else {
                continue;
            };

            if edge_match.decision == MatchDecision::Skip {
                report.counts.edges_skipped += 1;
                continue;
            }

            let from = report.resolved.get(&seed_edge.from_temp_id).cloned();
            let to = report.resolved.get(&seed_edge.to_temp_id).cloned();
            let (from, to) = match (from, to) {
                (Some(f), Some(t)) => (f, t),
                (None, _) => {
                    report.errors.push(ApplyItemError::DanglingReference {
                        index: edge_match.index,
                        temp_id: seed_edge.from_temp_id.clone(),
                    });
                    continue;
                }
                (_, None) => {
                    report.errors.push(ApplyItemError::DanglingReference {
                        index: edge_match.index,
                        temp_id: seed_edge.to_temp_id.clone(),
                    });
                    continue;
                }
            };

            let edge = crate::types::Edge::new(workflow_id, &seed_edge.edge_type, from, to)
                .with_properties(seed_edge.properties.clone());
            match self.store.create_edge(edge) {
                Ok(_) => report.counts.edges_created += 1,
                Err(e) => report.errors.push(ApplyItemError::ItemFailed {
                    item: format!("edge {}", edge_match.index),
                    source: e,
                }),
            }
        }

        tracing::info!(
            "Applied delta to {}: {} created, {} updated, {} skipped nodes; {} edges created ({} errors)",
            workflow_id,
            report.counts.nodes_created,
            report.counts.nodes_updated,
            report.counts.nodes_skipped,
            report.counts.edges_created,
            report.errors.len()
        );

        Ok(report)
    }
}

fn project_counts(match_result: &MatchResult) -> ApplyCounts {
    let mut counts = ApplyCounts::default();
    for node in &match_result.nodes {
        match node.decision {
            MatchDecision::Create => counts.nodes_created += 1,
            MatchDecision::Update => counts.nodes_updated += 1,
            MatchDecision::Skip => counts.nodes_skipped += 1,
        }
    }
    for edge in &match_result.edges {
        match edge.decision {
            MatchDecision::Create => counts.edges_created += 1,
            _ => counts.edges_skipped += 1,
        }
    }
    counts
}
