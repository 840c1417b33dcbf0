//! The agentic transformation pipeline

pub mod chunker;
pub mod config;
pub mod orchestrator;
pub mod skill;

use std::time::Duration;

use thiserror::Error;

use crate::provider::ProviderError;

pub use chunker::{ChunkConfig, ChunkedDriver};
pub use config::{
    LearnedAssets, OutputCardinality, TransformConfig, TransformManifest, TransformMode,
    TransformOutcome,
};
pub use orchestrator::TransformOrchestrator;
pub use skill::{Skill, SkillGenerator};

/// Fatal transform failures. Schema-validation failures are not here: they
/// loop back into the agent as feedback and only surface indirectly when the
/// iteration budget runs out.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("transform timed out after {0:?}")]
    Timeout(Duration),

    #[error("iteration budget exhausted after {0} turn(s) without a valid artifact")]
    IterationsExhausted(u32),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("workdir error: {0}")]
    Workdir(#[from] std::io::Error),
}
