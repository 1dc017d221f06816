//! Shared types, error model, and configuration for CloneForge.
//!
//! This crate is the foundation depended on by all other CloneForge crates.
//! It provides:
//! - [`CloneForgeError`]: the unified error type
//! - Domain types ([`ProgressRecord`], [`PageAnalysis`], [`ExtractedData`],
//!   [`DependencyGraph`], [`ImplementationPlan`])
//! - Configuration ([`AppConfig`], runtime configs, config loading)

pub mod config;
pub mod error;
pub mod links;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, FetchConfig, FetchSettings, PathsConfig, RefineSettings, ResolverConfig,
    SharedConfig, VerifyConfig, VerifySettings, config_dir, config_file_path, init_config,
    load_config, load_config_from, validate_config,
};
pub use error::{CloneForgeError, Result};
pub use links::{classify_href, internal_path};
pub use types::{
    DependencyGraph, DependencyKind, DependencyStatus, ErrorLogEntry, ExtractedData, ImageRef,
    ImplementationPlan, InteractiveElement, InteractiveKind, LinkRef, LinkType, NavigationEntry,
    PageAnalysis, PageDependency, PageMetadata, Phase, PhaseState, PhaseStatus, Phases,
    PlanResolution, PlannedArtifact, ProgressRecord, RunStatus, Section, SectionType, TextBlock,
};
