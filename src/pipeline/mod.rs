// =============================================================================
// Pipeline — fusion and decision stages of a run
// =============================================================================

pub mod aggregator;
pub mod cross_verifier;
pub mod orchestrator;
pub mod velocity;

pub use orchestrator::{PipelineContext, RunOrchestrator};
