//! Declarative rules gating node status transitions
//!
//! A rule triggers on a node type (optionally a specific target status) and
//! demands minimum edge counts by type. Evaluation is read-only; any single
//! violated rule blocks the transition entirely.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::{GraphStore, Neighbors, NodeUpdate};
use crate::types::Node;

/// Minimum count of edges of a given type, counted over both directions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRequirement {
    pub edge_type: String,
    pub min_count: usize,
}

/// A declarative transition constraint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    /// Node type this rule triggers on
    pub node_type: String,
    /// Target status this rule applies to; unset applies to every transition
    #[serde(default)]
    pub target_status: Option<String>,
    pub requirements: Vec<EdgeRequirement>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Rule {
    fn applies_to(&self, node: &Node, target_status: &str) -> bool {
        self.node_type == node.node_type
            && self
                .target_status
                .as_deref()
                .map_or(true, |s| s == target_status)
    }
}

/// A specific shortfall against one requirement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleViolation {
    pub rule_id: String,
    pub message: String,
    pub edge_type: String,
    pub required: usize,
    pub actual: usize,
}

/// Aggregate gate decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionCheck {
    pub allowed: bool,
    pub violations: Vec<RuleViolation>,
}

/// Evaluate the rule set against a node's current edges for a proposed
/// target status. Pure: takes the neighbor snapshot, mutates nothing.
pub fn check_transition(
    node: &Node,
    target_status: &str,
    rules: &[Rule],
    neighbors: &Neighbors,
) -> TransitionCheck {
    let mut violations = vec![];

    for rule in rules.iter().filter(|r| r.applies_to(node, target_status)) {
        for requirement in &rule.requirements {
            let actual = neighbors.count_by_type(&requirement.edge_type);
            if actual < requirement.min_count {
                violations.push(RuleViolation {
                    rule_id: rule.id.clone(),
                    message: rule.message.clone().unwrap_or_else(|| {
                        format!(
                            "requires at least {} '{}' edge(s)",
                            requirement.min_count, requirement.edge_type
                        )
                    }),
                    edge_type: requirement.edge_type.clone(),
                    required: requirement.min_count,
                    actual,
                });
            }
        }
    }

    TransitionCheck {
        allowed: violations.is_empty(),
        violations,
    }
}

/// Outcome of a gated transition attempt
#[derive(Debug)]
pub enum TransitionOutcome {
    Applied(Node),
    Blocked(TransitionCheck),
}

/// Run the gate against the live store and apply the status when allowed.
/// A blocked transition is a structured result, not an error.
pub fn transition_status(
    store: &dyn GraphStore,
    node_id: &str,
    target_status: &str,
    rules: &[Rule],
) -> Result<TransitionOutcome> {
    let node = store.get_node(node_id)?;
    let neighbors = store.neighbors(node_id)?;
    let check = check_transition(&node, target_status, rules, &neighbors);

    if !check.allowed {
        tracing::info!(
            "Transition of {} to '{}' blocked by {} violation(s)",
            node_id,
            target_status,
            check.violations.len()
        );
        return Ok(TransitionOutcome::Blocked(check));
    }

    let updated = store.update_node(
        node_id,
        NodeUpdate {
            status: Some(target_status.to_string()),
            ..Default::default()
        },
    )?;
    Ok(TransitionOutcome::Applied(updated))
}
