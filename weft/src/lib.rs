//! Endpoint-learning transformation pipeline over a graph-structured
//! workflow backend
//!
//! The `weft-graph` crate holds the graph store, fuzzy matcher, delta
//! applicator, and rule engine; this crate adds the agentic layer on top:
//! model providers, target schemas, the multi-turn transform orchestrator,
//! chunked driving, skill learning, and endpoint execution.

pub mod endpoint;
pub mod progress;
pub mod provider;
pub mod schema;
pub mod transform;

pub use endpoint::{
    ApplySummary, EndpointDefinition, EndpointExecutor, ExecuteOptions, ExecutionResult,
};
pub use progress::{spawn_keepalive, ProgressEvent, ProgressSink};
pub use provider::{
    CommandProvider, CompletionRequest, ModelProvider, ModelResponse, ProviderError,
    RetryDecision, RetryPolicy, ScriptedProvider,
};
pub use schema::{
    FieldKind, FieldSpec, SchemaValidator, SchemaViolation, TargetSchema, ValidationReport,
};
pub use transform::{
    ChunkConfig, ChunkedDriver, LearnedAssets, OutputCardinality, Skill, SkillGenerator,
    TransformConfig, TransformError, TransformManifest, TransformMode, TransformOrchestrator,
    TransformOutcome,
};
