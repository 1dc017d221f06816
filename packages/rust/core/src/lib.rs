//! Core pipeline orchestration for CloneForge.
//!
//! Sequences the five clone phases over the progress store, plans and
//! resolves the replica's artifacts, and hosts the standalone refine loop.

pub mod fetch;
pub mod generator;
pub mod orchestrator;
pub mod planner;
pub mod refine;

pub use fetch::{HttpPageSource, PageSource};
pub use generator::{CodeGenerator, GeneratedFiles, ScaffoldGenerator};
pub use orchestrator::{
    Orchestrator, PhaseInputs, PhaseOutcome, PhaseResult, PipelineConfig, PipelineState,
    ProgressReporter, SilentProgress, synopsis,
};
pub use planner::{build_plan, top_level_components};
pub use refine::{RefineOptions, RefineOutcome, RefineReporter, SilentRefine, refine};
