//! Multi-turn agentic transform loop
//!
//! Each turn sends the instruction (plus any feedback from the previous
//! turn), parses the reply for bracket-tagged blocks, and either executes
//! tools, runs a generated program (code mode), or validates a candidate
//! artifact. Validation failures are fed back to the agent rather than
//! failing the run; the run fails permanently only on timeout, iteration
//! exhaustion, or a dead provider.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tokio::process::Command;

use weft_graph::GraphStore;

use crate::progress::{ProgressEvent, ProgressSink};
use crate::provider::{CompletionRequest, ModelProvider, RetryPolicy};
use crate::schema::{SchemaValidator, TargetSchema, ValidationReport};

use super::config::{
    LearnedAssets, OutputCardinality, TransformConfig, TransformManifest, TransformMode,
    TransformOutcome,
};
use super::TransformError;

/// Continuation context for chunked runs
#[derive(Debug, Clone, Default)]
pub(crate) struct ChunkWindow {
    pub produced: usize,
    pub recent: Vec<JsonValue>,
}

pub struct TransformOrchestrator {
    provider: Arc<dyn ModelProvider>,
    retry: RetryPolicy,
    store: Option<Arc<dyn GraphStore>>,
}

impl TransformOrchestrator {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            retry: RetryPolicy::default(),
            store: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Attach a graph store so the agent can query existing state when the
    /// run is scoped to a workflow
    pub fn with_store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Run a complete transform to a validated artifact
    pub async fn run(
        &self,
        instruction: &str,
        schema: &TargetSchema,
        config: &TransformConfig,
        progress: &ProgressSink,
    ) -> Result<TransformOutcome, TransformError> {
        let deadline = Instant::now() + config.timeout;
        self.run_batch(instruction, schema, config, None, None, true, deadline, progress)
            .await
    }

    /// One batch of the turn loop. The chunked driver calls this per chunk
    /// with a continuation window and a requested item count. The deadline
    /// is wall-clock for the whole run, not per batch.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn run_batch(
        &self,
        instruction: &str,
        schema: &TargetSchema,
        config: &TransformConfig,
        window: Option<&ChunkWindow>,
        requested: Option<usize>,
        validate: bool,
        deadline: Instant,
        progress: &ProgressSink,
    ) -> Result<TransformOutcome, TransformError> {
        prepare_workdir(config)?;

        let mut feedback: Option<String> = None;
        let mut assets = LearnedAssets::default();

        for turn in 1..=config.max_iterations {
            // Cancellation is cooperative: the budget is checked at turn
            // boundaries only, never mid-turn.
            if Instant::now() >= deadline {
                return Err(TransformError::Timeout(config.timeout));
            }
            progress.phase(format!("turn {}", turn));

            let prompt =
                build_prompt(instruction, schema, config, window, requested, feedback.as_deref());
            let request =
                CompletionRequest::new(prompt).with_system(protocol_text(config, self.store.is_some()));

            let provider = Arc::clone(&self.provider);
            let response = self
                .retry
                .run(move || {
                    let provider = Arc::clone(&provider);
                    let request = request.clone();
                    async move { provider.complete(request).await }
                })
                .await?;
            let content = response.content;

            for (_, note) in parse_tagged_blocks(&content, "NOTE") {
                assets.refinements.push(note);
            }

            let candidate = match config.mode {
                TransformMode::Direct => parse_tagged_blocks(&content, "OUTPUT")
                    .into_iter()
                    .next()
                    .map(|(_, body)| (body, None)),
                TransformMode::Code => {
                    match parse_tagged_blocks(&content, "PROGRAM").into_iter().next() {
                        None => None,
                        Some((_, source)) => {
                            match self.execute_program(&source, config).await {
                                Ok((stdout, _, true)) => Some((stdout, Some(source))),
                                Ok((stdout, stderr, false)) => {
                                    feedback = Some(format!(
                                        "The program failed.\nstdout:\n{}\nstderr:\n{}",
                                        stdout, stderr
                                    ));
                                    continue;
                                }
                                Err(e) => {
                                    feedback =
                                        Some(format!("The program could not be executed: {}", e));
                                    continue;
                                }
                            }
                        }
                    }
                }
            };

            let Some((body, program)) = candidate else {
                let tools = parse_tagged_blocks(&content, "TOOL");
                if !tools.is_empty() {
                    feedback = Some(self.run_tools(&tools, config, progress).await);
                } else {
                    feedback = Some(missing_artifact_hint(config.mode).to_string());
                }
                continue;
            };

            let items = match parse_artifact(&body, config.cardinality) {
                Ok(items) => items,
                Err(message) => {
                    feedback = Some(format!("Could not parse the artifact: {}", message));
                    continue;
                }
            };

            let report = if validate {
                match config.cardinality {
                    OutputCardinality::SingleObject => {
                        SchemaValidator::validate_object(schema, &items[0])
                    }
                    OutputCardinality::RecordStream => {
                        SchemaValidator::validate_items(schema, &items)
                    }
                }
            } else {
                ValidationReport::passed(items.len())
            };

            if !report.passed {
                tracing::info!(
                    "Turn {} artifact failed validation with {} problem(s)",
                    turn,
                    report.violations.len()
                );
                progress.emit(ProgressEvent::ValidationFailed {
                    violations: report.violations.len(),
                });
                feedback = Some(report.feedback());
                continue;
            }

            if let Some(source) = program {
                assets.program = Some(source);
            }
            return build_outcome(items, &report, schema, config, assets, 1);
        }

        Err(TransformError::IterationsExhausted(config.max_iterations))
    }

    async fn run_tools(
        &self,
        tools: &[(String, String)],
        config: &TransformConfig,
        progress: &ProgressSink,
    ) -> String {
        let mut results = String::from("## Tool results\n\n");
        for (arg, body) in tools {
            let (name, param) = match arg.split_once(':') {
                Some((name, param)) => (name, Some(param)),
                None => (arg.as_str(), None),
            };
            progress.emit(ProgressEvent::ToolCall {
                name: name.to_string(),
                detail: param.unwrap_or("").to_string(),
            });

            let result = match name {
                "read_file" => self.tool_read_file(param.unwrap_or(body.trim()), config),
                "write_file" => self.tool_write_file(param, body, config),
                "query_graph" => self.tool_query_graph(body.trim(), config),
                other => format!("unknown tool '{}'", other),
            };
            results.push_str(&format!("### {}\n{}\n\n", arg, result));
        }
        results
    }

    fn tool_read_file(&self, path: &str, config: &TransformConfig) -> String {
        let Some(full) = safe_path(&config.workdir, path) else {
            return format!("path '{}' is outside the working directory", path);
        };
        match std::fs::read_to_string(&full) {
            Ok(content) => content,
            Err(e) => format!("could not read '{}': {}", path, e),
        }
    }

    fn tool_write_file(&self, param: Option<&str>, body: &str, config: &TransformConfig) -> String {
        let Some(path) = param else {
            return "write_file needs a path: [TOOL:write_file:name.txt]".to_string();
        };
        let Some(full) = safe_path(&config.workdir, path) else {
            return format!("path '{}' is outside the working directory", path);
        };
        match std::fs::write(&full, body) {
            Ok(()) => format!("wrote {} bytes to '{}'", body.len(), path),
            Err(e) => format!("could not write '{}': {}", path, e),
        }
    }

    fn tool_query_graph(&self, node_type: &str, config: &TransformConfig) -> String {
        let (Some(store), Some(workflow_id)) = (self.store.as_ref(), config.graph_scope.as_ref())
        else {
            return "graph queries are not available for this run".to_string();
        };
        match store.nodes_in_workflow(workflow_id) {
            Ok(nodes) => {
                let listing: Vec<JsonValue> = nodes
                    .iter()
                    .filter(|n| node_type.is_empty() || n.node_type == node_type)
                    .map(|n| {
                        serde_json::json!({
                            "id": n.id,
                            "type": n.node_type,
                            "title": n.title,
                            "status": n.status,
                        })
                    })
                    .collect();
                serde_json::to_string_pretty(&listing).unwrap_or_default()
            }
            Err(e) => format!("graph query failed: {}", e),
        }
    }

    /// Write the generated program into the isolated workdir and execute it,
    /// capturing (stdout, stderr, success)
    async fn execute_program(
        &self,
        source: &str,
        config: &TransformConfig,
    ) -> std::io::Result<(String, String, bool)> {
        let program_path = config.workdir.join(config.program_filename());
        std::fs::write(&program_path, source)?;

        let mut cmd = Command::new(&config.code_command);
        cmd.arg(config.program_filename());
        cmd.current_dir(&config.workdir);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Executing transform program with {}", config.code_command);
        let output = cmd.output().await?;

        Ok((
            String::from_utf8_lossy(&output.stdout).to_string(),
            String::from_utf8_lossy(&output.stderr).to_string(),
            output.status.success(),
        ))
    }
}

/// Create the run workdir and copy the declared input files into it.
/// Nothing else from the host is visible to generated code.
fn prepare_workdir(config: &TransformConfig) -> Result<(), TransformError> {
    std::fs::create_dir_all(&config.workdir)?;
    for input in &config.input_files {
        let Some(name) = input.file_name() else {
            continue;
        };
        std::fs::copy(input, config.workdir.join(name))?;
    }
    Ok(())
}

pub(crate) fn build_outcome(
    items: Vec<JsonValue>,
    report: &ValidationReport,
    schema: &TargetSchema,
    config: &TransformConfig,
    assets: LearnedAssets,
    chunks: usize,
) -> Result<TransformOutcome, TransformError> {
    let artifact_path = config.workdir.join("artifact.json");
    let payload = match config.cardinality {
        OutputCardinality::SingleObject if !items.is_empty() => items[0].clone(),
        _ => JsonValue::Array(items.clone()),
    };
    std::fs::write(
        &artifact_path,
        serde_json::to_string_pretty(&payload).unwrap_or_default(),
    )?;

    let manifest = TransformManifest {
        run_id: config.run_id.clone(),
        artifact_path,
        format: "json".to_string(),
        item_count: items.len(),
        schema_hash: schema.content_hash(),
        validation_passed: report.passed,
        validation_errors: report.violations.len(),
        sample: items.iter().take(config.sample_size).cloned().collect(),
        created_at: Utc::now(),
    };

    Ok(TransformOutcome {
        manifest,
        items,
        assets,
        chunks,
    })
}

fn build_prompt(
    instruction: &str,
    schema: &TargetSchema,
    config: &TransformConfig,
    window: Option<&ChunkWindow>,
    requested: Option<usize>,
    feedback: Option<&str>,
) -> String {
    let mut prompt = format!("# Transformation task\n\n{}\n\n", instruction);

    prompt.push_str(&format!(
        "## Target schema\n\n```json\n{}\n```\n\n",
        serde_json::to_string_pretty(schema).unwrap_or_default()
    ));

    match config.cardinality {
        OutputCardinality::SingleObject => {
            prompt.push_str("The artifact is a single JSON object.\n\n")
        }
        OutputCardinality::RecordStream => {
            prompt.push_str("The artifact is a JSON array of records.\n\n")
        }
    }

    if let Some(n) = requested {
        prompt.push_str(&format!("Produce up to {} records in this batch.\n\n", n));
    }

    if let Some(window) = window {
        prompt.push_str(&format!(
            "## Continuation\n\n{} records have already been produced in earlier batches. \
             The most recent ones were:\n```json\n{}\n```\nContinue with new records only; \
             do not reuse earlier temp ids.\n\n",
            window.produced,
            serde_json::to_string_pretty(&window.recent).unwrap_or_default()
        ));
    }

    if let Some(feedback) = feedback {
        prompt.push_str(&format!("## Previous turn feedback\n\n{}\n", feedback));
    }

    prompt
}

fn protocol_text(config: &TransformConfig, has_store: bool) -> String {
    let mut text = String::from(
        "You are a data transformation agent. Respond using bracket-tagged blocks.\n",
    );
    match config.mode {
        TransformMode::Direct => {
            text.push_str("Emit the final artifact as [OUTPUT]...json...[/OUTPUT].\n")
        }
        TransformMode::Code => text.push_str(
            "Emit a transformation program as [PROGRAM]...source...[/PROGRAM]. It runs in the \
             working directory with the input files present and must print the artifact JSON \
             to stdout.\n",
        ),
    }
    text.push_str(
        "Available tools: [TOOL:read_file]path[/TOOL], [TOOL:write_file:path]content[/TOOL]",
    );
    if has_store && config.graph_scope.is_some() {
        text.push_str(", [TOOL:query_graph]node type[/TOOL]");
    }
    text.push_str(
        ".\nRecord instruction refinements worth keeping as [NOTE]...[/NOTE].\n",
    );
    text
}

fn missing_artifact_hint(mode: TransformMode) -> &'static str {
    match mode {
        TransformMode::Direct => {
            "No artifact found. Emit the final JSON inside [OUTPUT]...[/OUTPUT]."
        }
        TransformMode::Code => {
            "No program found. Emit the transformation program inside [PROGRAM]...[/PROGRAM]."
        }
    }
}

/// Parse the artifact body according to the configured cardinality
fn parse_artifact(body: &str, cardinality: OutputCardinality) -> Result<Vec<JsonValue>, String> {
    let value: JsonValue =
        serde_json::from_str(body.trim()).map_err(|e| format!("invalid JSON: {}", e))?;
    match cardinality {
        OutputCardinality::SingleObject => {
            if value.is_object() {
                Ok(vec![value])
            } else {
                Err("expected a single JSON object".to_string())
            }
        }
        OutputCardinality::RecordStream => match value {
            JsonValue::Array(items) => Ok(items),
            _ => Err("expected a JSON array of records".to_string()),
        },
    }
}

/// Parse `[TAG]body[/TAG]` and `[TAG:arg]body[/TAG]` blocks, returning
/// (arg, body) pairs; arg is empty for the plain form
pub(crate) fn parse_tagged_blocks(output: &str, tag: &str) -> Vec<(String, String)> {
    let open_plain = format!("[{}]", tag);
    let open_arg = format!("[{}:", tag);
    let close = format!("[/{}]", tag);

    let mut blocks = vec![];
    let mut remaining = output;

    loop {
        let plain_at = remaining.find(&open_plain);
        let arg_at = remaining.find(&open_arg);
        let (start, with_arg) = match (plain_at, arg_at) {
            (None, None) => break,
            (Some(p), None) => (p, false),
            (None, Some(a)) => (a, true),
            (Some(p), Some(a)) => {
                if p <= a {
                    (p, false)
                } else {
                    (a, true)
                }
            }
        };

        let (arg, after_open) = if with_arg {
            let after_tag = &remaining[start + open_arg.len()..];
            let Some(bracket) = after_tag.find(']') else {
                break;
            };
            (
                after_tag[..bracket].trim().to_string(),
                &after_tag[bracket + 1..],
            )
        } else {
            (String::new(), &remaining[start + open_plain.len()..])
        };

        let Some(end) = after_open.find(&close) else {
            break;
        };
        blocks.push((arg, after_open[..end].trim().to_string()));
        remaining = &after_open[end + close.len()..];
    }

    blocks
}

/// Resolve a tool-supplied path inside the workdir, rejecting absolute
/// paths and parent traversal
fn safe_path(workdir: &Path, relative: &str) -> Option<PathBuf> {
    let path = Path::new(relative);
    if path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
    {
        return None;
    }
    Some(workdir.join(path))
}
