//! Per-run transform configuration and run artifacts

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub(crate) fn short_id(prefix: &str) -> String {
    format!(
        "{}-{}",
        prefix,
        Uuid::new_v4().to_string().split('-').next().unwrap()
    )
}

/// How the agent produces the artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformMode {
    /// The agent emits the data itself
    #[default]
    Direct,
    /// The agent emits a program; the host executes it
    Code,
}

impl TransformMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformMode::Direct => "direct",
            TransformMode::Code => "code",
        }
    }
}

/// Shape of the produced artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputCardinality {
    SingleObject,
    #[default]
    RecordStream,
}

/// Immutable per-run configuration; never mutated after construction
#[derive(Debug, Clone)]
pub struct TransformConfig {
    pub run_id: String,
    pub mode: TransformMode,
    pub cardinality: OutputCardinality,
    /// Maximum agent turns before the run fails
    pub max_iterations: u32,
    /// Wall-clock budget, checked at turn boundaries
    pub timeout: Duration,
    /// Isolated working directory for this run
    pub workdir: PathBuf,
    /// Input files copied into the workdir before the run
    pub input_files: Vec<PathBuf>,
    /// Whether to persist the run as a reusable skill
    pub learn: bool,
    /// Workflow whose graph the agent may query
    pub graph_scope: Option<String>,
    /// Interpreter for code-mode programs
    pub code_command: String,
    /// Items retained in the manifest sample
    pub sample_size: usize,
}

impl TransformConfig {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            run_id: short_id("run"),
            mode: TransformMode::Direct,
            cardinality: OutputCardinality::RecordStream,
            max_iterations: 6,
            timeout: Duration::from_secs(300),
            workdir: workdir.into(),
            input_files: vec![],
            learn: false,
            graph_scope: None,
            code_command: "python3".to_string(),
            sample_size: 5,
        }
    }

    pub fn with_mode(mut self, mode: TransformMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_cardinality(mut self, cardinality: OutputCardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_input_files(mut self, files: Vec<PathBuf>) -> Self {
        self.input_files = files;
        self
    }

    pub fn with_learn(mut self, learn: bool) -> Self {
        self.learn = learn;
        self
    }

    pub fn with_graph_scope(mut self, workflow_id: impl Into<String>) -> Self {
        self.graph_scope = Some(workflow_id.into());
        self
    }

    pub fn with_code_command(mut self, command: impl Into<String>) -> Self {
        self.code_command = command.into();
        self
    }

    /// Filename the generated program is written to before execution
    pub fn program_filename(&self) -> &'static str {
        if self.code_command.contains("python") {
            "transform.py"
        } else if self.code_command.contains("node") {
            "transform.js"
        } else {
            "transform.src"
        }
    }
}

/// Declarative record of one transform run. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformManifest {
    pub run_id: String,
    pub artifact_path: PathBuf,
    pub format: String,
    pub item_count: usize,
    /// Content hash of the target schema, for reproducibility
    pub schema_hash: String,
    pub validation_passed: bool,
    pub validation_errors: usize,
    /// Bounded sample of produced items
    pub sample: Vec<JsonValue>,
    pub created_at: DateTime<Utc>,
}

/// Optional byproduct of a run, persisted by the skill generator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearnedAssets {
    /// Generated program text (code mode only)
    pub program: Option<String>,
    /// Instruction refinements discovered mid-run
    pub refinements: Vec<String>,
    /// Generated documentation text
    pub documentation: Option<String>,
}

impl LearnedAssets {
    pub fn is_empty(&self) -> bool {
        self.program.is_none() && self.refinements.is_empty() && self.documentation.is_none()
    }
}

/// Everything a transform run yields
#[derive(Debug, Clone)]
pub struct TransformOutcome {
    pub manifest: TransformManifest,
    pub items: Vec<JsonValue>,
    pub assets: LearnedAssets,
    /// Orchestrator invocations (1 for unchunked runs)
    pub chunks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builders() {
        let config = TransformConfig::new("/tmp/run")
            .with_mode(TransformMode::Code)
            .with_max_iterations(3)
            .with_graph_scope("wf-1");
        assert!(config.run_id.starts_with("run-"));
        assert_eq!(config.mode, TransformMode::Code);
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.graph_scope.as_deref(), Some("wf-1"));
    }

    #[test]
    fn test_program_filename_tracks_interpreter() {
        let config = TransformConfig::new("/tmp/run");
        assert_eq!(config.program_filename(), "transform.py");
        let config = config.with_code_command("node");
        assert_eq!(config.program_filename(), "transform.js");
        let config = config.with_code_command("cat");
        assert_eq!(config.program_filename(), "transform.src");
    }
}
