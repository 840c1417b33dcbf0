//! Learned endpoints and their executor
//!
//! An endpoint binds an instruction to a target schema and transform
//! settings. Executing one runs the agentic transform, previews the
//! resulting delta against a workflow's graph, and optionally applies it.
//! Only a missing workflow is a structural error; everything that goes
//! wrong inside the run is reported in the result instead.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use weft_graph::{
    ApplyCounts, DeltaApplicator, DeltaPreview, GraphError, GraphStore, SeedData,
};

use crate::progress::{spawn_keepalive, ProgressEvent, ProgressSink};
use crate::provider::{ModelProvider, RetryPolicy};
use crate::schema::TargetSchema;
use crate::transform::{
    ChunkConfig, ChunkedDriver, OutputCardinality, Skill, SkillGenerator, TransformConfig,
    TransformManifest, TransformMode, TransformOrchestrator,
};

const KEEPALIVE_PERIOD: Duration = Duration::from_secs(15);

/// A learned endpoint: instruction plus schema plus transform settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub instruction: String,
    pub schema: TargetSchema,
    #[serde(default)]
    pub mode: TransformMode,
    #[serde(default)]
    pub cardinality: OutputCardinality,
    /// Present when the transform should run chunked
    #[serde(default)]
    pub chunking: Option<ChunkConfig>,
    /// Input files copied into the run workdir
    #[serde(default)]
    pub input_files: Vec<PathBuf>,
    /// Interpreter override for code mode
    #[serde(default)]
    pub code_command: Option<String>,
}

impl EndpointDefinition {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading endpoint file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing endpoint file {}", path.display()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Workflow the delta is previewed (and applied) against
    pub workflow_id: Option<String>,
    /// Apply the delta instead of stopping at the preview
    pub apply: bool,
    /// Persist the run as a reusable skill on success
    pub learn: bool,
    pub max_iterations: Option<u32>,
    pub timeout: Option<Duration>,
}

/// Apply-side counts and errors, flattened for reporting
#[derive(Debug, Clone, Serialize)]
pub struct ApplySummary {
    pub counts: ApplyCounts,
    pub errors: Vec<String>,
}

/// Everything one execution produced. `success` means no errors were
/// recorded anywhere in the run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub run_id: String,
    pub endpoint: String,
    pub success: bool,
    pub manifest: Option<TransformManifest>,
    pub chunks: usize,
    pub preview: Option<DeltaPreview>,
    pub applied: Option<ApplySummary>,
    pub skill: Option<Skill>,
    pub errors: Vec<String>,
    pub elapsed_ms: u64,
}

#[derive(Clone)]
pub struct EndpointExecutor {
    provider: Arc<dyn ModelProvider>,
    store: Arc<dyn GraphStore>,
    retry: RetryPolicy,
    data_dir: PathBuf,
}

impl EndpointExecutor {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        store: Arc<dyn GraphStore>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            provider,
            store,
            retry: RetryPolicy::default(),
            data_dir: data_dir.into(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Execute an endpoint end to end. The only `Err` is a missing
    /// workflow; run-level failures come back inside the result.
    pub async fn execute(
        &self,
        endpoint: &EndpointDefinition,
        options: &ExecuteOptions,
        progress: &ProgressSink,
    ) -> Result<ExecutionResult, GraphError> {
        if let Some(ref workflow_id) = options.workflow_id {
            self.store.get_workflow(workflow_id)?;
        }

        let started = std::time::Instant::now();
        let config = self.transform_config(endpoint, options);
        let run_id = config.run_id.clone();
        tracing::info!("Executing endpoint '{}' as run {}", endpoint.name, run_id);
        progress.phase("transform");

        let mut result = ExecutionResult {
            run_id,
            endpoint: endpoint.name.clone(),
            success: false,
            manifest: None,
            chunks: 0,
            preview: None,
            applied: None,
            skill: None,
            errors: vec![],
            elapsed_ms: 0,
        };

        let mut orchestrator =
            TransformOrchestrator::new(Arc::clone(&self.provider)).with_retry(self.retry);
        if options.workflow_id.is_some() {
            orchestrator = orchestrator.with_store(Arc::clone(&self.store));
        }

        let outcome = match &endpoint.chunking {
            Some(chunking) => {
                ChunkedDriver::new(&orchestrator, chunking.clone())
                    .run(&endpoint.instruction, &endpoint.schema, &config, progress)
                    .await
            }
            None => {
                orchestrator
                    .run(&endpoint.instruction, &endpoint.schema, &config, progress)
                    .await
            }
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                result.errors.push(e.to_string());
                result.elapsed_ms = started.elapsed().as_millis() as u64;
                return Ok(self.finish(&config, progress, result));
            }
        };

        result.manifest = Some(outcome.manifest.clone());
        result.chunks = outcome.chunks;

        // A chunked run validates per chunk only optionally; the merged
        // artifact's verdict is what gates the graph.
        if !outcome.manifest.validation_passed {
            result.errors.push(format!(
                "artifact failed schema validation with {} problem(s)",
                outcome.manifest.validation_errors
            ));
        } else if let Some(ref workflow_id) = options.workflow_id {
            let seed = match self.build_seed(endpoint, &outcome.items) {
                Ok(seed) => Some(seed),
                Err(e) => {
                    result.errors.push(e.to_string());
                    None
                }
            };

            if let Some(seed) = seed {
                progress.phase("preview");
                let applicator = DeltaApplicator::new(self.store.as_ref());
                match applicator.preview(workflow_id, &seed) {
                    Ok(preview) => {
                        if options.apply {
                            progress.phase("apply");
                            match applicator.apply(workflow_id, &seed, &preview.match_result) {
                                Ok(report) => {
                                    result.errors.extend(report.error_messages());
                                    result.applied = Some(ApplySummary {
                                        counts: report.counts,
                                        errors: report.error_messages(),
                                    });
                                }
                                Err(e) => result.errors.push(e.to_string()),
                            }
                        }
                        result.preview = Some(preview);
                    }
                    Err(e) => result.errors.push(e.to_string()),
                }
            }
        }

        if options.learn && result.errors.is_empty() {
            let generator = SkillGenerator::new(self.data_dir.join("skills"));
            match generator.save(
                &endpoint.name,
                &endpoint.instruction,
                &endpoint.schema,
                &outcome,
                config.program_filename(),
            ) {
                Ok(skill) => result.skill = Some(skill),
                // A failed skill save never fails the data run
                Err(e) => tracing::warn!("Could not save skill: {:#}", e),
            }
        }

        result.elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(self.finish(&config, progress, result))
    }

    /// Run an endpoint on a background task, streaming progress events.
    /// Keepalives cover the quiet stretches between phases.
    pub fn execute_with_events(
        &self,
        endpoint: EndpointDefinition,
        options: ExecuteOptions,
    ) -> (
        mpsc::UnboundedReceiver<ProgressEvent>,
        tokio::task::JoinHandle<Result<ExecutionResult, GraphError>>,
    ) {
        let (sink, rx) = ProgressSink::channel();
        let keepalive = spawn_keepalive(sink.clone(), KEEPALIVE_PERIOD);
        let executor = self.clone();
        let handle = tokio::spawn(async move {
            let result = executor.execute(&endpoint, &options, &sink).await;
            keepalive.abort();
            result
        });
        (rx, handle)
    }

    /// Apply a previously computed preview. The gap between preview and
    /// apply is optimistic; stale matches degrade to per-item errors.
    pub fn apply_preview(
        &self,
        workflow_id: &str,
        seed: &SeedData,
        preview: &DeltaPreview,
    ) -> weft_graph::Result<ApplySummary> {
        let report = DeltaApplicator::new(self.store.as_ref()).apply(
            workflow_id,
            seed,
            &preview.match_result,
        )?;
        Ok(ApplySummary {
            errors: report.error_messages(),
            counts: report.counts,
        })
    }

    fn transform_config(
        &self,
        endpoint: &EndpointDefinition,
        options: &ExecuteOptions,
    ) -> TransformConfig {
        let mut config = TransformConfig::new(self.data_dir.join("runs"))
            .with_mode(endpoint.mode)
            .with_cardinality(endpoint.cardinality)
            .with_input_files(endpoint.input_files.clone())
            .with_learn(options.learn);
        config.workdir = self.data_dir.join("runs").join(&config.run_id);
        if let Some(ref workflow_id) = options.workflow_id {
            config = config.with_graph_scope(workflow_id.clone());
        }
        if let Some(ref command) = endpoint.code_command {
            config = config.with_code_command(command.clone());
        }
        if let Some(max_iterations) = options.max_iterations {
            config = config.with_max_iterations(max_iterations);
        }
        if let Some(timeout) = options.timeout {
            config = config.with_timeout(timeout);
        }
        config
    }

    /// Turn the artifact into seed data. Record streams are flat records
    /// with envelope keys; a single object is a seed document itself.
    fn build_seed(
        &self,
        endpoint: &EndpointDefinition,
        items: &[serde_json::Value],
    ) -> weft_graph::Result<SeedData> {
        match endpoint.cardinality {
            OutputCardinality::RecordStream => SeedData::from_records(items),
            OutputCardinality::SingleObject => {
                let Some(object) = items.first() else {
                    return Ok(SeedData::default());
                };
                Ok(serde_json::from_value(object.clone())?)
            }
        }
    }

    /// Persist the result next to the run artifacts and emit completion
    fn finish(
        &self,
        config: &TransformConfig,
        progress: &ProgressSink,
        mut result: ExecutionResult,
    ) -> ExecutionResult {
        result.success = result.errors.is_empty();

        let result_path = config.workdir.join("result.json");
        if let Ok(serialized) = serde_json::to_string_pretty(&result) {
            if let Err(e) = std::fs::write(&result_path, serialized) {
                tracing::warn!("Could not persist run result: {}", e);
            }
        }

        progress.emit(ProgressEvent::Completed {
            success: result.success,
            items: result
                .manifest
                .as_ref()
                .map(|m| m.item_count)
                .unwrap_or(0),
        });
        result
    }
}
