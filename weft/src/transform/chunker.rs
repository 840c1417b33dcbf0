//! Chunked transform driver
//!
//! Splits a large transform into bounded batches. Each chunk gets a
//! continuation window (count produced so far plus the most recent items)
//! so the agent resumes instead of restarting. A chunk that comes back far
//! below the requested size signals source exhaustion and, by default,
//! stops the run.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::progress::{ProgressEvent, ProgressSink};
use crate::schema::{SchemaValidator, TargetSchema};

use super::config::{LearnedAssets, TransformConfig, TransformOutcome};
use super::orchestrator::{build_outcome, ChunkWindow, TransformOrchestrator};
use super::TransformError;

fn default_chunk_size() -> usize {
    50
}
fn default_max_chunks() -> usize {
    100
}
fn default_overlap_context() -> usize {
    5
}
fn default_underflow_threshold() -> f64 {
    0.5
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Records requested per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Hard cap on chunk count, independent of progress
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
    /// Recent items echoed into the next chunk's continuation window
    #[serde(default = "default_overlap_context")]
    pub overlap_context: usize,
    /// A full-size request returning fewer than threshold * chunk_size
    /// records counts as underflow
    #[serde(default = "default_underflow_threshold")]
    pub underflow_threshold: f64,
    #[serde(default = "default_true")]
    pub stop_on_underflow: bool,
    #[serde(default = "default_true")]
    pub validate_each_chunk: bool,
    /// Known total record count; caps requests when present
    #[serde(default)]
    pub expected_total: Option<usize>,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_chunks: default_max_chunks(),
            overlap_context: default_overlap_context(),
            underflow_threshold: default_underflow_threshold(),
            stop_on_underflow: true,
            validate_each_chunk: true,
            expected_total: None,
        }
    }
}

impl ChunkConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_expected_total(mut self, total: usize) -> Self {
        self.expected_total = Some(total);
        self
    }
}

/// Underflow is only meaningful when the full chunk size was requested;
/// a legitimately short final chunk never trips it.
fn is_underflow(produced: usize, requested: usize, config: &ChunkConfig) -> bool {
    requested == config.chunk_size
        && (produced as f64) < config.underflow_threshold * (config.chunk_size as f64)
}

pub struct ChunkedDriver<'a> {
    orchestrator: &'a TransformOrchestrator,
    chunking: ChunkConfig,
}

impl<'a> ChunkedDriver<'a> {
    pub fn new(orchestrator: &'a TransformOrchestrator, chunking: ChunkConfig) -> Self {
        Self {
            orchestrator,
            chunking,
        }
    }

    pub async fn run(
        &self,
        instruction: &str,
        schema: &TargetSchema,
        config: &TransformConfig,
        progress: &ProgressSink,
    ) -> Result<TransformOutcome, TransformError> {
        let mut items: Vec<serde_json::Value> = vec![];
        let mut assets = LearnedAssets::default();
        let mut chunks_run = 0;
        // One wall-clock budget across every chunk
        let deadline = Instant::now() + config.timeout;

        for chunk_index in 1..=self.chunking.max_chunks {
            if let Some(total) = self.chunking.expected_total {
                if items.len() >= total {
                    break;
                }
            }

            let requested = match self.chunking.expected_total {
                Some(total) => (total - items.len()).min(self.chunking.chunk_size),
                None => self.chunking.chunk_size,
            };

            let window = if items.is_empty() {
                None
            } else {
                let recent_from = items.len().saturating_sub(self.chunking.overlap_context);
                Some(ChunkWindow {
                    produced: items.len(),
                    recent: items[recent_from..].to_vec(),
                })
            };

            // Each chunk runs in its own subdirectory so intermediate
            // artifacts never clobber the merged one.
            let mut chunk_config = config.clone();
            chunk_config.workdir = config.workdir.join(format!("chunk-{:03}", chunk_index));

            let outcome = self
                .orchestrator
                .run_batch(
                    instruction,
                    schema,
                    &chunk_config,
                    window.as_ref(),
                    Some(requested),
                    self.chunking.validate_each_chunk,
                    deadline,
                    progress,
                )
                .await?;
            chunks_run += 1;

            let produced = outcome.items.len();
            merge_assets(&mut assets, outcome.assets);
            items.extend(outcome.items);

            tracing::info!(
                "Chunk {} produced {} record(s) ({} total)",
                chunk_index,
                produced,
                items.len()
            );
            progress.emit(ProgressEvent::ChunkCompleted {
                chunk: chunk_index,
                items: produced,
                total: items.len(),
            });

            if produced == 0 {
                break;
            }
            if is_underflow(produced, requested, &self.chunking) && self.chunking.stop_on_underflow
            {
                tracing::info!(
                    "Chunk {} underflowed ({} of {} requested), stopping",
                    chunk_index,
                    produced,
                    requested
                );
                break;
            }
        }

        if let Some(total) = self.chunking.expected_total {
            items.truncate(total);
        }

        // The merged artifact gets a final validation pass of its own
        let report = SchemaValidator::validate_items(schema, &items);
        build_outcome(items, &report, schema, config, assets, chunks_run)
    }
}

fn merge_assets(into: &mut LearnedAssets, from: LearnedAssets) {
    if into.program.is_none() {
        into.program = from.program;
    }
    into.refinements.extend(from.refinements);
    if into.documentation.is_none() {
        into.documentation = from.documentation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underflow_only_on_full_requests() {
        let config = ChunkConfig::default(); // chunk_size 50, threshold 0.5
        assert!(is_underflow(10, 50, &config));
        assert!(!is_underflow(30, 50, &config));
        // Final short chunk: 20 requested, 20 produced
        assert!(!is_underflow(20, 20, &config));
        // Even a tiny return against a short request is not underflow
        assert!(!is_underflow(3, 20, &config));
    }

    #[test]
    fn test_chunk_config_serde_defaults() {
        let config: ChunkConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.chunk_size, 50);
        assert_eq!(config.max_chunks, 100);
        assert_eq!(config.overlap_context, 5);
        assert!(config.stop_on_underflow);
        assert!(config.validate_each_chunk);
        assert!(config.expected_total.is_none());

        let config: ChunkConfig =
            serde_json::from_str(r#"{"chunk_size": 10, "expected_total": 35}"#).unwrap();
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.expected_total, Some(35));
    }

    #[test]
    fn test_merge_assets_keeps_first_program() {
        let mut assets = LearnedAssets::default();
        merge_assets(
            &mut assets,
            LearnedAssets {
                program: Some("print(1)".to_string()),
                refinements: vec!["skip header row".to_string()],
                documentation: None,
            },
        );
        merge_assets(
            &mut assets,
            LearnedAssets {
                program: Some("print(2)".to_string()),
                refinements: vec!["dates are ISO".to_string()],
                documentation: None,
            },
        );
        assert_eq!(assets.program.as_deref(), Some("print(1)"));
        assert_eq!(assets.refinements.len(), 2);
    }
}
