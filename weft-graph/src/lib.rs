//! weft-graph: typed workflow graph library
//!
//! Entities, the `GraphStore` seam with an in-memory implementation, seed
//! deltas with referential-integrity validation, deterministic node/edge
//! matching, delta application under a preview/apply split, and declarative
//! transition rules. No agent or model dependency lives here.

pub mod delta;
pub mod error;
pub mod matcher;
pub mod rules;
pub mod seed;
pub mod store;
pub mod types;

pub use delta::{ApplyCounts, ApplyItemError, ApplyReport, DeltaApplicator, DeltaPreview};
pub use error::{GraphError, Result};
pub use matcher::{
    levenshtein, match_delta, normalize_title, property_diff, title_confidence, EdgeMatchResult,
    MatchConfidence, MatchDecision, MatchResult, NodeMatchResult,
};
pub use rules::{
    check_transition, transition_status, EdgeRequirement, Rule, RuleViolation, TransitionCheck,
    TransitionOutcome,
};
pub use seed::{SeedData, SeedEdge, SeedNode};
pub use store::{GraphStore, MemoryGraphStore, Neighbors, NodeUpdate, WorkflowStats};
pub use types::{Edge, Node, PropertyMap, Workflow};
