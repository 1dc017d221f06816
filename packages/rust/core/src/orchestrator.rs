//! Five-phase clone pipeline driven entirely by the persisted progress record.
//!
//! Every phase method reloads what it needs from the [`ProgressStore`], so
//! phases can run in separate processes. A crash leaves the last durable
//! phase state behind and [`Orchestrator::run`] picks up from
//! `next_phase()`; there is no separate resume path.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use cloneforge_deps::DependencyResolver;
use cloneforge_extract::{extract_page_data, verify_clone_with};
use cloneforge_progress::ProgressStore;
use cloneforge_shared::{
    AppConfig, ExtractedData, Phase, PhaseState, ProgressRecord, Result, ResolverConfig,
    RunStatus, VerifyConfig,
};
use cloneforge_snapshot::{AnalyzeOptions, analyze_page};

use crate::generator::{CodeGenerator, ScaffoldGenerator};
use crate::planner::build_plan;

// ---------------------------------------------------------------------------
// Results and state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseOutcome {
    Success,
    NeedsRetry,
    Failed,
}

/// What a phase call reports back. Retrying, skipping or aborting is the
/// caller's decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: Phase,
    pub status: PhaseOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl PhaseResult {
    fn success(phase: Phase, data: Option<Value>) -> Self {
        Self {
            phase,
            status: PhaseOutcome::Success,
            data,
            errors: Vec::new(),
        }
    }

    fn needs_retry(phase: Phase, error: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            phase,
            status: PhaseOutcome::NeedsRetry,
            data,
            errors: vec![error.into()],
        }
    }

    fn failed(phase: Phase, error: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            phase,
            status: PhaseOutcome::Failed,
            data,
            errors: vec![error.into()],
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PhaseOutcome::Success
    }
}

/// In-process view of where the pipeline is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Analyzing,
    Extracting,
    Planning,
    Implementing,
    Verifying,
    Completed,
    Failed,
}

impl PipelineState {
    fn running(phase: Phase) -> Self {
        match phase {
            Phase::Analyze => Self::Analyzing,
            Phase::Extract => Self::Extracting,
            Phase::Plan => Self::Planning,
            Phase::Implement => Self::Implementing,
            Phase::Verify => Self::Verifying,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Analyzing => "analyzing",
            Self::Extracting => "extracting",
            Self::Planning => "planning",
            Self::Implementing => "implementing",
            Self::Verifying => "verifying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    fn phase_started(&self, phase: Phase);
    fn phase_finished(&self, result: &PhaseResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase_started(&self, _phase: Phase) {}
    fn phase_finished(&self, _result: &PhaseResult) {}
}

/// Runtime configuration for an [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub resolver: ResolverConfig,
    pub verify: VerifyConfig,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            resolver: ResolverConfig::from(config),
            verify: VerifyConfig::from(config),
        }
    }
}

/// Caller-supplied inputs for [`Orchestrator::run`] and
/// [`Orchestrator::run_phase`]. Phases whose input is absent report
/// `needs_retry`.
#[derive(Debug, Clone, Default)]
pub struct PhaseInputs {
    pub snapshot: Option<String>,
    pub analyze: AnalyzeOptions,
    /// Source page markup for `extract`.
    pub html: Option<String>,
    /// Replica markup for `verify`.
    pub clone_html: Option<String>,
    /// URL the replica was served from; links are classified against it.
    pub clone_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    store: ProgressStore,
    slug: String,
    resolver: DependencyResolver,
    verify: VerifyConfig,
    generator: Box<dyn CodeGenerator>,
    progress: Box<dyn ProgressReporter>,
    state: PipelineState,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("slug", &self.slug)
            .field("state", &self.state)
            .field("generator", &self.generator.name())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    fn with_store(store: ProgressStore, config: &PipelineConfig, slug: &str) -> Self {
        Self {
            store,
            slug: slug.to_string(),
            resolver: DependencyResolver::new(config.resolver.clone()),
            verify: config.verify.clone(),
            generator: Box::new(ScaffoldGenerator::new(&config.resolver.project_root)),
            progress: Box::new(SilentProgress),
            state: PipelineState::Idle,
        }
    }

    /// Begin a fresh run, replacing any active record for `slug`.
    pub fn start(
        store: ProgressStore,
        config: &PipelineConfig,
        source_url: &str,
        slug: &str,
    ) -> Result<Self> {
        store.create(source_url, slug)?;
        Ok(Self::with_store(store, config, slug))
    }

    /// Attach to an existing run. Fails with `NotFound` when there is none.
    pub fn resume(store: ProgressStore, config: &PipelineConfig, slug: &str) -> Result<Self> {
        let record = store.require(slug)?;
        let mut orchestrator = Self::with_store(store, config, slug);
        orchestrator.state = match record.status {
            RunStatus::Completed => PipelineState::Completed,
            RunStatus::Failed => PipelineState::Failed,
            RunStatus::InProgress => PipelineState::Idle,
        };
        Ok(orchestrator)
    }

    /// Resume the run for `slug` if one exists, otherwise start one.
    pub fn open(
        store: ProgressStore,
        config: &PipelineConfig,
        source_url: &str,
        slug: &str,
    ) -> Result<Self> {
        if store.read(slug)?.is_some() {
            info!(page_slug = slug, "resuming existing run");
            Self::resume(store, config, slug)
        } else {
            Self::start(store, config, source_url, slug)
        }
    }

    pub fn with_generator(mut self, generator: Box<dyn CodeGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Current persisted record.
    pub fn record(&self) -> Result<ProgressRecord> {
        self.store.require(&self.slug)
    }

    // -----------------------------------------------------------------------
    // Driving
    // -----------------------------------------------------------------------

    /// Run from the persisted resume point until a phase does not succeed
    /// or every phase is completed.
    #[instrument(skip_all, fields(page_slug = %self.slug))]
    pub fn run(&mut self, inputs: &PhaseInputs) -> Result<Vec<PhaseResult>> {
        let mut results = Vec::new();
        while let Some(phase) = self.record()?.next_phase() {
            let result = self.run_phase(phase, inputs)?;
            let done = !result.is_success();
            results.push(result);
            if done {
                break;
            }
        }
        Ok(results)
    }

    /// Run one phase with whatever `inputs` it needs.
    pub fn run_phase(&mut self, phase: Phase, inputs: &PhaseInputs) -> Result<PhaseResult> {
        match phase {
            Phase::Analyze => match &inputs.snapshot {
                Some(snapshot) => self.analyze(snapshot, &inputs.analyze),
                None => Ok(self.missing_input(phase, "a page snapshot")),
            },
            Phase::Extract => match &inputs.html {
                Some(html) => self.extract(html),
                None => Ok(self.missing_input(phase, "the source page markup")),
            },
            Phase::Plan => self.plan(),
            Phase::Implement => self.implement(),
            Phase::Verify => match &inputs.clone_html {
                Some(html) => self.verify(html, inputs.clone_url.as_deref()),
                None => Ok(self.missing_input(phase, "the replica markup")),
            },
        }
    }

    fn missing_input(&self, phase: Phase, what: &str) -> PhaseResult {
        let result = PhaseResult::needs_retry(phase, format!("{phase} needs {what}"), None);
        self.progress.phase_finished(&result);
        result
    }

    // -----------------------------------------------------------------------
    // Phase bookkeeping
    // -----------------------------------------------------------------------

    /// `Some(reason)` when `phase`'s predecessor has not completed.
    fn unmet_prerequisite(record: &ProgressRecord, phase: Phase) -> Option<String> {
        let previous = phase.previous()?;
        (record.phases.get(previous).status != PhaseState::Completed)
            .then(|| format!("{phase} requires {previous} to be completed"))
    }

    fn begin(&mut self, phase: Phase) -> Result<()> {
        self.state = PipelineState::running(phase);
        self.progress.phase_started(phase);
        self.store
            .update_phase_status(&self.slug, phase, PhaseState::InProgress, None)?;
        Ok(())
    }

    fn succeed(&mut self, phase: Phase, data: Option<Value>) -> Result<PhaseResult> {
        let record = self
            .store
            .update_phase_status(&self.slug, phase, PhaseState::Completed, None)?;
        if record.status == RunStatus::Completed {
            self.state = PipelineState::Completed;
        }
        info!(page_slug = %self.slug, %phase, "phase completed");
        Ok(self.finish(PhaseResult::success(phase, data)))
    }

    fn fail(&mut self, phase: Phase, error: String, data: Option<Value>) -> Result<PhaseResult> {
        warn!(page_slug = %self.slug, %phase, error = %error, "phase failed");
        self.store
            .update_phase_status(&self.slug, phase, PhaseState::Failed, Some(error.clone()))?;
        self.store.log_error(&self.slug, phase, error.clone(), None)?;
        self.state = PipelineState::Failed;
        Ok(self.finish(PhaseResult::failed(phase, error, data)))
    }

    fn retry(&self, result: PhaseResult) -> PhaseResult {
        warn!(page_slug = %self.slug, phase = %result.phase, errors = ?result.errors, "phase needs retry");
        self.finish(result)
    }

    fn finish(&self, result: PhaseResult) -> PhaseResult {
        self.progress.phase_finished(&result);
        result
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    /// Analyze the page snapshot and persist the analysis.
    #[instrument(skip_all, fields(page_slug = %self.slug))]
    pub fn analyze(&mut self, snapshot: &str, opts: &AnalyzeOptions) -> Result<PhaseResult> {
        let phase = Phase::Analyze;
        let record = self.record()?;
        self.begin(phase)?;

        match analyze_page(&record.source_url, snapshot, opts) {
            Ok(analysis) => {
                let data = serde_json::json!({
                    "title": analysis.title,
                    "sections": analysis.sections.len(),
                    "interactiveElements": analysis.interactive_elements.len(),
                    "navigation": analysis.navigation.len(),
                    "breakpoints": analysis.breakpoints,
                    "dependencies": analysis.dependencies,
                });
                self.store.set_page_analysis(&self.slug, analysis)?;
                self.succeed(phase, Some(data))
            }
            Err(e) => self.fail(phase, e.to_string(), None),
        }
    }

    /// Extract structured content from the source markup.
    #[instrument(skip_all, fields(page_slug = %self.slug, html_len = html.len()))]
    pub fn extract(&mut self, html: &str) -> Result<PhaseResult> {
        let phase = Phase::Extract;
        let record = self.record()?;
        if let Some(reason) = Self::unmet_prerequisite(&record, phase) {
            return Ok(self.retry(PhaseResult::needs_retry(phase, reason, None)));
        }
        self.begin(phase)?;

        if html.trim().is_empty() {
            return self.fail(phase, "source page markup is empty".into(), None);
        }
        let data = extract_page_data(html, &record.source_url);
        let summary = serde_json::json!({
            "title": data.metadata.title,
            "textBlocks": data.text_blocks.len(),
            "images": data.images.len(),
            "links": data.links.len(),
        });
        self.store.set_extracted_data(&self.slug, data)?;
        self.succeed(phase, Some(summary))
    }

    /// Plan the implementation and resolve its dependencies, stubbing what
    /// is missing.
    #[instrument(skip_all, fields(page_slug = %self.slug))]
    pub fn plan(&mut self) -> Result<PhaseResult> {
        let phase = Phase::Plan;
        let record = self.record()?;
        if let Some(reason) = Self::unmet_prerequisite(&record, phase) {
            return Ok(self.retry(PhaseResult::needs_retry(phase, reason, None)));
        }
        let (Some(analysis), Some(extracted)) = (&record.page_analysis, &record.extracted_data)
        else {
            return Ok(self.retry(PhaseResult::needs_retry(
                phase,
                "plan needs the page analysis and extracted data",
                None,
            )));
        };
        self.begin(phase)?;

        let mut plan = build_plan(analysis, extracted, &self.slug, &self.resolver);
        let graph = self.resolver.analyze_dependencies(analysis, &plan);
        let resolution = self.resolver.resolve_dependencies(&graph);

        for failure in resolution.failed_stubs() {
            let error = format!(
                "could not create stub {}: {}",
                failure.path,
                failure.error.as_deref().unwrap_or("unknown error")
            );
            self.store.log_error(
                &self.slug,
                phase,
                error,
                Some("create the file by hand or rerun plan".into()),
            )?;
        }

        let data = serde_json::json!({
            "components": plan.components.len(),
            "routes": plan.routes.len(),
            "stubsCreated": resolution.stubs_created,
            "cycles": resolution.cycles,
        });
        self.store
            .add_files_created(&self.slug, resolution.stubs_created.iter().cloned())?;
        plan.resolution = Some(resolution.into());
        self.store.set_implementation_plan(&self.slug, plan)?;
        self.succeed(phase, Some(data))
    }

    /// Hand the resolved plan to the code generator.
    #[instrument(skip_all, fields(page_slug = %self.slug, generator = self.generator.name()))]
    pub fn implement(&mut self) -> Result<PhaseResult> {
        let phase = Phase::Implement;
        let record = self.record()?;
        if let Some(reason) = Self::unmet_prerequisite(&record, phase) {
            return Ok(self.retry(PhaseResult::needs_retry(phase, reason, None)));
        }
        let (Some(plan), Some(extracted)) = (&record.implementation_plan, &record.extracted_data)
        else {
            return Ok(self.retry(PhaseResult::needs_retry(
                phase,
                "implement needs an implementation plan",
                None,
            )));
        };
        self.begin(phase)?;

        match self.generator.generate(plan, extracted) {
            Ok(files) => {
                let data = serde_json::to_value(&files).ok();
                self.store.add_files_created(&self.slug, files.created)?;
                self.store.add_files_modified(&self.slug, files.modified)?;
                self.succeed(phase, data)
            }
            Err(e) => self.fail(phase, e.to_string(), None),
        }
    }

    /// Score the replica against the source extraction.
    ///
    /// Below the threshold the phase stays `in_progress` and reports
    /// `needs_retry` until `max_attempts` verifications have run.
    #[instrument(skip_all, fields(page_slug = %self.slug))]
    pub fn verify(&mut self, clone_html: &str, clone_url: Option<&str>) -> Result<PhaseResult> {
        let phase = Phase::Verify;
        let record = self.record()?;
        if let Some(reason) = Self::unmet_prerequisite(&record, phase) {
            return Ok(self.retry(PhaseResult::needs_retry(phase, reason, None)));
        }
        let Some(source) = &record.extracted_data else {
            return Ok(self.retry(PhaseResult::needs_retry(
                phase,
                "verify needs the source extraction",
                None,
            )));
        };
        self.begin(phase)?;

        let attempts = self
            .store
            .increment_verification_attempts(&self.slug)?
            .verification_attempts;
        let clone: ExtractedData =
            extract_page_data(clone_html, clone_url.unwrap_or(&record.source_url));
        let result = verify_clone_with(source, &clone, self.verify.threshold);
        let data = serde_json::to_value(&result).ok();

        if result.passed {
            info!(score = result.score, attempts, "replica verified");
            return self.succeed(phase, data);
        }

        let error = format!(
            "score {} below threshold {} ({} issues)",
            result.score,
            self.verify.threshold,
            result.issues.len()
        );
        if attempts < self.verify.max_attempts {
            self.store.log_error(
                &self.slug,
                phase,
                error.clone(),
                Some(format!(
                    "attempt {attempts} of {}; refine the replica and verify again",
                    self.verify.max_attempts
                )),
            )?;
            Ok(self.retry(PhaseResult::needs_retry(phase, error, data)))
        } else {
            self.fail(phase, error, data)
        }
    }

    // -----------------------------------------------------------------------
    // Terminal steps
    // -----------------------------------------------------------------------

    /// Human-readable synopsis of the run. Does not archive.
    pub fn complete(&mut self) -> Result<String> {
        let record = self.record()?;
        self.state = match record.status {
            RunStatus::Completed => PipelineState::Completed,
            RunStatus::Failed => PipelineState::Failed,
            RunStatus::InProgress => self.state,
        };
        Ok(synopsis(&record))
    }

    /// Move the record to the archive; returns the archived file.
    pub fn archive(&self) -> Result<PathBuf> {
        self.store.archive(&self.slug)
    }
}

/// Render a record as a short multi-line report.
pub fn synopsis(record: &ProgressRecord) -> String {
    let mut out = format!(
        "Clone of {} ({}): {}\n",
        record.source_url, record.page_slug, record.status
    );
    for (phase, entry) in record.phases.iter() {
        out.push_str(&format!("  {:<10} {}", phase.as_str(), entry.status));
        if let Some(error) = &entry.error {
            out.push_str(&format!("  ({error})"));
        }
        out.push('\n');
    }

    out.push_str(&format!("Files created ({}):\n", record.files_created.len()));
    for file in &record.files_created {
        out.push_str(&format!("  - {file}\n"));
    }
    out.push_str(&format!("Files modified ({}):\n", record.files_modified.len()));
    for file in &record.files_modified {
        out.push_str(&format!("  - {file}\n"));
    }
    if !record.errors.is_empty() {
        out.push_str(&format!("Errors ({}):\n", record.errors.len()));
        for entry in &record.errors {
            out.push_str(&format!("  [{}] {}\n", entry.phase, entry.error));
        }
    }
    out.push_str(&format!(
        "Verification attempts: {}\n",
        record.verification_attempts
    ));
    out
}
