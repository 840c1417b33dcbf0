//! Node/edge matching for incoming deltas
//!
//! Deterministic and agent-free: a pure function of the incoming seed data and
//! the workflow's existing nodes and edges. Nodes match by normalized title
//! with edit-distance confidence tiers; edges match only by exact
//! (type, from, to) structure once their endpoints are resolved.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::seed::SeedData;
use crate::types::{Edge, Node, PropertyMap};

/// Confidence tier for a title match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchConfidence {
    Exact,
    High,
    Medium,
    None,
}

impl MatchConfidence {
    fn rank(self) -> u8 {
        match self {
            MatchConfidence::Exact => 3,
            MatchConfidence::High => 2,
            MatchConfidence::Medium => 1,
            MatchConfidence::None => 0,
        }
    }

    fn better(self, other: MatchConfidence) -> MatchConfidence {
        if self.rank() >= other.rank() {
            self
        } else {
            other
        }
    }
}

/// What to do with a candidate item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchDecision {
    Create,
    Update,
    Skip,
}

/// Per-node classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMatchResult {
    pub temp_id: String,
    pub decision: MatchDecision,
    pub confidence: MatchConfidence,
    /// Real id of the matched existing node, for update/skip
    pub matched_id: Option<String>,
    /// Keys whose incoming value is absent from or differs in the stored node
    #[serde(default)]
    pub diff: PropertyMap,
}

/// Per-edge classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeMatchResult {
    /// Index of the edge in the seed delta
    pub index: usize,
    pub decision: MatchDecision,
    /// Real id of the structurally identical existing edge, for skip
    pub matched_id: Option<String>,
}

/// Aggregate match outcome plus the temp-id resolution map
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchResult {
    pub nodes: Vec<NodeMatchResult>,
    pub edges: Vec<EdgeMatchResult>,
    /// temp id → real id, for nodes matched against existing entities.
    /// Temp ids destined for creation are absent until apply mints their ids.
    pub resolution: HashMap<String, String>,
}

impl MatchResult {
    pub fn needs_review(&self) -> bool {
        self.nodes
            .iter()
            .any(|n| n.confidence == MatchConfidence::Medium)
    }
}

/// Lowercase, trim, and collapse internal whitespace runs to a single space
pub fn normalize_title(title: &str) -> String {
    title
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Classic Levenshtein distance (insert, delete, substitute, unit cost)
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution_cost = if ca == cb { 0 } else { 1 };
            current[j + 1] = (previous[j] + substitution_cost)
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Titles at or below this normalized length use the absolute short-title
/// tiers; longer titles also get the relative thresholds.
const SHORT_TITLE_MAX: usize = 5;

/// Confidence tier for two raw titles. Distance is computed over the
/// normalized forms; `L` is the longer normalized length.
pub fn title_confidence(a: &str, b: &str) -> MatchConfidence {
    let a = normalize_title(a);
    let b = normalize_title(b);
    let distance = levenshtein(&a, &b);
    if distance == 0 {
        return MatchConfidence::Exact;
    }

    let length = a.chars().count().max(b.chars().count());
    if length <= SHORT_TITLE_MAX {
        return match distance {
            1 => MatchConfidence::High,
            2 => MatchConfidence::Medium,
            _ => MatchConfidence::None,
        };
    }

    let absolute = match distance {
        1 | 2 => MatchConfidence::High,
        3 | 4 => MatchConfidence::Medium,
        _ => MatchConfidence::None,
    };
    let ratio = distance as f64 / length as f64;
    let relative = if ratio <= 0.10 {
        MatchConfidence::High
    } else if ratio <= 0.20 {
        MatchConfidence::Medium
    } else {
        MatchConfidence::None
    };

    // Relative thresholds win when they yield the higher confidence
    absolute.better(relative)
}

/// Incoming keys that are absent from the stored mapping or carry a different
/// value. Stored keys missing from the incoming mapping are left untouched.
pub fn property_diff(incoming: &PropertyMap, existing: &PropertyMap) -> PropertyMap {
    let mut diff = PropertyMap::new();
    for (key, value) in incoming {
        match existing.get(key) {
            Some(stored) if stored == value => {}
            _ => {
                diff.insert(key.clone(), value.clone());
            }
        }
    }
    diff
}

/// Match an incoming delta against the workflow's existing nodes and edges
pub fn match_delta(seed: &SeedData, existing_nodes: &[Node], existing_edges: &[Edge]) -> MatchResult {
    let mut result = MatchResult::default();
    // Existing nodes already consumed by an earlier seed node in this delta;
    // a second hit on the same entity must not become a second update.
    let mut claimed: HashSet<String> = HashSet::new();

    for seed_node in &seed.nodes {
        let mut best = MatchConfidence::None;
        let mut candidates: Vec<&Node> = vec![];

        for node in existing_nodes.iter().filter(|n| n.node_type == seed_node.node_type) {
            let confidence = title_confidence(&seed_node.title, &node.title);
            if confidence == MatchConfidence::None {
                continue;
            }
            if confidence.rank() > best.rank() {
                best = confidence;
                candidates = vec![node];
            } else if confidence.rank() == best.rank() {
                candidates.push(node);
            }
        }

        let node_result = match (best, candidates.as_slice()) {
            (MatchConfidence::None, _) | (_, []) => NodeMatchResult {
                temp_id: seed_node.temp_id.clone(),
                decision: MatchDecision::Create,
                confidence: MatchConfidence::None,
                matched_id: None,
                diff: PropertyMap::new(),
            },
            (confidence, [matched]) => {
                if claimed.contains(&matched.id) {
                    // Duplicate within the delta: resolve to the same entity
                    // without issuing another update.
                    result
                        .resolution
                        .insert(seed_node.temp_id.clone(), matched.id.clone());
                    NodeMatchResult {
                        temp_id: seed_node.temp_id.clone(),
                        decision: MatchDecision::Skip,
                        confidence,
                        matched_id: Some(matched.id.clone()),
                        diff: PropertyMap::new(),
                    }
                } else {
                    claimed.insert(matched.id.clone());
                    result
                        .resolution
                        .insert(seed_node.temp_id.clone(), matched.id.clone());
                    let diff = property_diff(&seed_node.properties, &matched.properties);
                    // Medium-confidence matches always surface as updates,
                    // even with nothing to change, so review tooling sees them.
                    let decision = if diff.is_empty() && confidence != MatchConfidence::Medium {
                        MatchDecision::Skip
                    } else {
                        MatchDecision::Update
                    };
                    NodeMatchResult {
                        temp_id: seed_node.temp_id.clone(),
                        decision,
                        confidence,
                        matched_id: Some(matched.id.clone()),
                        diff,
                    }
                }
            }
            // Multiple equally-confident candidates: ambiguous, create
            (_, _) => NodeMatchResult {
                temp_id: seed_node.temp_id.clone(),
                decision: MatchDecision::Create,
                confidence: MatchConfidence::None,
                matched_id: None,
                diff: PropertyMap::new(),
            },
        };

        result.nodes.push(node_result);
    }

    for (index, seed_edge) in seed.edges.iter().enumerate() {
        let from = result.resolution.get(&seed_edge.from_temp_id);
        let to = result.resolution.get(&seed_edge.to_temp_id);

        // An endpoint headed for creation can't collide with an existing edge
        let edge_result = match (from, to) {
            (Some(from_id), Some(to_id)) => {
                let duplicate = existing_edges.iter().find(|e| {
                    e.edge_type == seed_edge.edge_type
                        && &e.from_node == from_id
                        && &e.to_node == to_id
                });
                match duplicate {
                    Some(existing) => EdgeMatchResult {
                        index,
                        decision: MatchDecision::Skip,
                        matched_id: Some(existing.id.clone()),
                    },
                    None => EdgeMatchResult {
                        index,
                        decision: MatchDecision::Create,
                        matched_id: None,
                    },
                }
            }
            _ => EdgeMatchResult {
                index,
                decision: MatchDecision::Create,
                matched_id: None,
            },
        };

        result.edges.push(edge_result);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::{SeedEdge, SeedNode};
    use serde_json::json;

    fn seed_node(temp_id: &str, node_type: &str, title: &str) -> SeedNode {
        SeedNode {
            temp_id: temp_id.to_string(),
            node_type: node_type.to_string(),
            title: title.to_string(),
            status: None,
            properties: PropertyMap::new(),
        }
    }

    fn existing(id: &str, node_type: &str, title: &str) -> Node {
        Node::new("wf-1", node_type, title).with_id(id)
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  Acme   Corp  "), "acme corp");
        assert_eq!(normalize_title("ACME CORP"), "acme corp");
        assert_eq!(normalize_title("acme\t corp"), "acme corp");
    }

    #[test]
    fn test_levenshtein_properties() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("", "hello"), 5);
        assert_eq!(levenshtein("hello", ""), 5);
        // Symmetric
        assert_eq!(levenshtein("flaw", "lawn"), levenshtein("lawn", "flaw"));
    }

    #[test]
    fn test_identical_normalized_titles_are_exact() {
        assert_eq!(
            title_confidence("Acme Corp", "  ACME   CORP "),
            MatchConfidence::Exact
        );
    }

    #[test]
    fn test_short_title_tiers() {
        // L = 5
        assert_eq!(title_confidence("acmes", "acmex"), MatchConfidence::High);
        assert_eq!(title_confidence("acmes", "acxex"), MatchConfidence::Medium);
        assert_eq!(title_confidence("acmes", "azxex"), MatchConfidence::None);
    }

    #[test]
    fn test_long_title_absolute_tiers() {
        let base = "engineering roadmap";
        assert_eq!(title_confidence(base, "engineering roadmaps"), MatchConfidence::High);
        // d=3 on L=20: absolute and relative agree on Medium
        assert_eq!(title_confidence(base, "engineering roedmops"), MatchConfidence::Medium);
        assert_eq!(
            title_confidence("abcdefghij", "abcde12345"),
            MatchConfidence::None
        );
    }

    #[test]
    fn test_long_title_relative_overrides_absolute() {
        // L = 40, d = 4: absolute says Medium, relative 0.10 says High
        let a = "a very long organization title for match";
        let b = "a very long organization title for patch"; // d=1 actually
        assert_eq!(title_confidence(a, b), MatchConfidence::High);

        // d = 4 over L = 40: 10% boundary, relative High beats absolute Medium
        let c = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
        let d = "bbbbaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
        assert_eq!(levenshtein(c, d), 4);
        assert_eq!(title_confidence(c, d), MatchConfidence::High);
    }

    #[test]
    fn test_property_diff_idempotent() {
        let mut props = PropertyMap::new();
        props.insert("email".to_string(), json!("ada@example.com"));
        props.insert("age".to_string(), json!(36));
        assert!(property_diff(&props, &props).is_empty());
    }

    #[test]
    fn test_property_diff_never_deletes() {
        let mut incoming = PropertyMap::new();
        incoming.insert("email".to_string(), json!("new@example.com"));
        let mut stored = PropertyMap::new();
        stored.insert("email".to_string(), json!("old@example.com"));
        stored.insert("phone".to_string(), json!("555"));

        let diff = property_diff(&incoming, &stored);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff["email"], json!("new@example.com"));
        assert!(!diff.contains_key("phone"));
    }

    #[test]
    fn test_exact_match_never_creates() {
        let seed = SeedData {
            nodes: vec![seed_node("t1", "Company", "ACME CORP")],
            edges: vec![],
        };
        let nodes = vec![existing("node-1", "Company", "acme corp")];

        let result = match_delta(&seed, &nodes, &[]);
        assert_eq!(result.nodes[0].confidence, MatchConfidence::Exact);
        assert_ne!(result.nodes[0].decision, MatchDecision::Create);
        assert_eq!(result.resolution["t1"], "node-1");
    }

    #[test]
    fn test_type_mismatch_prevents_match() {
        let seed = SeedData {
            nodes: vec![seed_node("t1", "Person", "Acme Corp")],
            edges: vec![],
        };
        let nodes = vec![existing("node-1", "Company", "Acme Corp")];

        let result = match_delta(&seed, &nodes, &[]);
        assert_eq!(result.nodes[0].decision, MatchDecision::Create);
    }

    #[test]
    fn test_ambiguous_candidates_create() {
        let seed = SeedData {
            nodes: vec![seed_node("t1", "Company", "Acme Corp")],
            edges: vec![],
        };
        let nodes = vec![
            existing("node-1", "Company", "Acme Corp"),
            existing("node-2", "Company", "acme corp"),
        ];

        let result = match_delta(&seed, &nodes, &[]);
        assert_eq!(result.nodes[0].decision, MatchDecision::Create);
        assert_eq!(result.nodes[0].confidence, MatchConfidence::None);
    }

    #[test]
    fn test_update_when_properties_differ() {
        let mut seed = SeedData {
            nodes: vec![seed_node("t1", "Company", "Acme Corp")],
            edges: vec![],
        };
        seed.nodes[0]
            .properties
            .insert("industry".to_string(), json!("robotics"));
        let nodes = vec![existing("node-1", "Company", "Acme Corp")];

        let result = match_delta(&seed, &nodes, &[]);
        assert_eq!(result.nodes[0].decision, MatchDecision::Update);
        assert_eq!(result.nodes[0].diff["industry"], json!("robotics"));
    }

    #[test]
    fn test_medium_match_updates_even_without_diff() {
        // "engineering roedmops" vs "engineering roadmap" is d=3, Medium
        let seed = SeedData {
            nodes: vec![seed_node("t1", "Project", "engineering roedmops")],
            edges: vec![],
        };
        let nodes = vec![existing("node-1", "Project", "engineering roadmap")];

        let result = match_delta(&seed, &nodes, &[]);
        assert_eq!(result.nodes[0].confidence, MatchConfidence::Medium);
        assert_eq!(result.nodes[0].decision, MatchDecision::Update);
        assert!(result.nodes[0].diff.is_empty());
        assert_eq!(result.resolution["t1"], "node-1");
        assert!(result.needs_review());
    }

    #[test]
    fn test_duplicate_within_delta_skips_second() {
        let seed = SeedData {
            nodes: vec![
                seed_node("t1", "Company", "Acme Corp"),
                seed_node("t2", "Company", "ACME CORP"),
            ],
            edges: vec![],
        };
        let nodes = vec![existing("node-1", "Company", "acme corp")];

        let result = match_delta(&seed, &nodes, &[]);
        assert_eq!(result.nodes[0].confidence, MatchConfidence::Exact);
        assert_eq!(result.nodes[1].confidence, MatchConfidence::Exact);
        assert_eq!(result.nodes[1].decision, MatchDecision::Skip);
        // Both resolve to the same entity, only one may carry an update
        assert_eq!(result.resolution["t1"], "node-1");
        assert_eq!(result.resolution["t2"], "node-1");
        let updates = result
            .nodes
            .iter()
            .filter(|n| n.decision == MatchDecision::Update)
            .count();
        assert_eq!(updates, 0);
    }

    #[test]
    fn test_edge_exact_duplicate_skipped() {
        let seed = SeedData {
            nodes: vec![
                seed_node("t1", "Person", "Ada"),
                seed_node("t2", "Person", "Grace"),
            ],
            edges: vec![SeedEdge {
                from_temp_id: "t1".to_string(),
                to_temp_id: "t2".to_string(),
                edge_type: "Knows".to_string(),
                properties: PropertyMap::new(),
            }],
        };
        let nodes = vec![
            existing("node-1", "Person", "Ada"),
            existing("node-2", "Person", "Grace"),
        ];
        let edges = vec![Edge::new("wf-1", "Knows", "node-1", "node-2").with_id("edge-1")];

        let result = match_delta(&seed, &nodes, &edges);
        assert_eq!(result.edges[0].decision, MatchDecision::Skip);
        assert_eq!(result.edges[0].matched_id.as_deref(), Some("edge-1"));
    }

    #[test]
    fn test_edge_to_new_node_creates() {
        let seed = SeedData {
            nodes: vec![
                seed_node("t1", "Person", "Ada"),
                seed_node("t2", "Person", "Brand New"),
            ],
            edges: vec![SeedEdge {
                from_temp_id: "t1".to_string(),
                to_temp_id: "t2".to_string(),
                edge_type: "Knows".to_string(),
                properties: PropertyMap::new(),
            }],
        };
        let nodes = vec![existing("node-1", "Person", "Ada")];

        let result = match_delta(&seed, &nodes, &[]);
        assert_eq!(result.edges[0].decision, MatchDecision::Create);
    }
}
