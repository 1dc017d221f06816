//! Core domain types for CloneForge runs.
//!
//! Everything persisted in a progress document lives here, so the store,
//! the analyzers and the orchestrator agree on one schema. JSON field names
//! are camelCase to match the on-disk progress format.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CloneForgeError;

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// One of the five ordered stages of a page-cloning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Analyze,
    Extract,
    Plan,
    Implement,
    Verify,
}

impl Phase {
    /// Every phase, in execution order.
    pub const ALL: [Phase; 5] = [
        Phase::Analyze,
        Phase::Extract,
        Phase::Plan,
        Phase::Implement,
        Phase::Verify,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Analyze => "analyze",
            Phase::Extract => "extract",
            Phase::Plan => "plan",
            Phase::Implement => "implement",
            Phase::Verify => "verify",
        }
    }

    /// The phase that must be completed before this one, if any.
    pub fn previous(self) -> Option<Phase> {
        let idx = Self::ALL.iter().position(|p| *p == self)?;
        idx.checked_sub(1).map(|i| Self::ALL[i])
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = CloneForgeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| CloneForgeError::validation(format!("unknown phase '{s}'")))
    }
}

/// Status of a single phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PhaseState::Pending => "pending",
            PhaseState::InProgress => "in_progress",
            PhaseState::Completed => "completed",
            PhaseState::Failed => "failed",
        })
    }
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        })
    }
}

/// Per-phase bookkeeping stored in the progress record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseStatus {
    pub status: PhaseState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The fixed set of five phase entries. All five are required on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Phases {
    pub analyze: PhaseStatus,
    pub extract: PhaseStatus,
    pub plan: PhaseStatus,
    pub implement: PhaseStatus,
    pub verify: PhaseStatus,
}

impl Phases {
    pub fn get(&self, phase: Phase) -> &PhaseStatus {
        match phase {
            Phase::Analyze => &self.analyze,
            Phase::Extract => &self.extract,
            Phase::Plan => &self.plan,
            Phase::Implement => &self.implement,
            Phase::Verify => &self.verify,
        }
    }

    pub fn get_mut(&mut self, phase: Phase) -> &mut PhaseStatus {
        match phase {
            Phase::Analyze => &mut self.analyze,
            Phase::Extract => &mut self.extract,
            Phase::Plan => &mut self.plan,
            Phase::Implement => &mut self.implement,
            Phase::Verify => &mut self.verify,
        }
    }

    /// Phase entries in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (Phase, &PhaseStatus)> {
        Phase::ALL.into_iter().map(move |p| (p, self.get(p)))
    }
}

/// One entry of the run's error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLogEntry {
    pub phase: Phase,
    pub error: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

// ---------------------------------------------------------------------------
// ProgressRecord
// ---------------------------------------------------------------------------

/// The durable per-page document; sole source of truth for pipeline state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub source_url: String,
    pub page_slug: String,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub phases: Phases,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_analysis: Option<PageAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_data: Option<ExtractedData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation_plan: Option<ImplementationPlan>,
    #[serde(default)]
    pub files_created: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub errors: Vec<ErrorLogEntry>,
    #[serde(default)]
    pub verification_attempts: u32,
}

impl ProgressRecord {
    /// A fresh record: every phase pending, run in progress.
    pub fn new(source_url: impl Into<String>, page_slug: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            source_url: source_url.into(),
            page_slug: page_slug.into(),
            started_at: now,
            last_updated_at: now,
            completed_at: None,
            status: RunStatus::InProgress,
            phases: Phases::default(),
            page_analysis: None,
            extracted_data: None,
            implementation_plan: None,
            files_created: Vec::new(),
            files_modified: Vec::new(),
            errors: Vec::new(),
            verification_attempts: 0,
        }
    }

    /// Apply a phase transition and recompute the overall status.
    ///
    /// `startedAt` is stamped on the first move to `in_progress` only;
    /// `completedAt` on every move to `completed` or `failed`, and cleared
    /// again when the phase is re-entered.
    pub fn set_phase_status(&mut self, phase: Phase, status: PhaseState, error: Option<String>) {
        let now = Utc::now();
        let entry = self.phases.get_mut(phase);

        entry.status = status;
        match status {
            PhaseState::InProgress => {
                if entry.started_at.is_none() {
                    entry.started_at = Some(now);
                }
                entry.completed_at = None;
            }
            PhaseState::Completed | PhaseState::Failed => {
                // A phase completed without an explicit start still gets a
                // consistent window.
                if entry.started_at.is_none() {
                    entry.started_at = Some(now);
                }
                entry.completed_at = Some(now);
            }
            PhaseState::Pending => {}
        }
        if error.is_some() || status == PhaseState::Completed {
            entry.error = error;
        }

        self.status = self.overall_status();
        self.last_updated_at = now;
    }

    /// `failed` if any phase failed, `completed` if all completed, else `in_progress`.
    pub fn overall_status(&self) -> RunStatus {
        let mut all_completed = true;
        for (_, entry) in self.phases.iter() {
            match entry.status {
                PhaseState::Failed => return RunStatus::Failed,
                PhaseState::Completed => {}
                _ => all_completed = false,
            }
        }
        if all_completed {
            RunStatus::Completed
        } else {
            RunStatus::InProgress
        }
    }

    /// The last `completed` phase before the first non-completed one.
    pub fn last_completed_phase(&self) -> Option<Phase> {
        self.phases
            .iter()
            .take_while(|(_, entry)| entry.status == PhaseState::Completed)
            .map(|(phase, _)| phase)
            .last()
    }

    /// The first phase that is not `completed`, or `None` when all are.
    pub fn next_phase(&self) -> Option<Phase> {
        self.phases
            .iter()
            .find(|(_, entry)| entry.status != PhaseState::Completed)
            .map(|(phase, _)| phase)
    }
}

// ---------------------------------------------------------------------------
// Page analysis
// ---------------------------------------------------------------------------

/// Kind of structural region derived from a snapshot role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionType {
    Header,
    Main,
    Sidebar,
    Footer,
    Modal,
    Panel,
}

impl SectionType {
    pub fn as_str(self) -> &'static str {
        match self {
            SectionType::Header => "header",
            SectionType::Main => "main",
            SectionType::Sidebar => "sidebar",
            SectionType::Footer => "footer",
            SectionType::Modal => "modal",
            SectionType::Panel => "panel",
        }
    }
}

/// A logical region of the page. Children are nested regions found inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    #[serde(rename = "type")]
    pub section_type: SectionType,
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Section>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractiveKind {
    Button,
    Link,
    Tab,
    Dropdown,
    Accordion,
    Form,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveElement {
    #[serde(rename = "type")]
    pub kind: InteractiveKind,
    /// Human-readable description of what interacting does.
    pub action: String,
    pub selector: String,
}

/// Where a link points relative to the page it was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Internal,
    External,
    Anchor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationEntry {
    pub href: String,
    pub text: String,
    #[serde(rename = "type")]
    pub link_type: LinkType,
}

/// Structural analysis of the source page, produced once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageAnalysis {
    pub url: String,
    pub title: String,
    pub sections: Vec<Section>,
    pub interactive_elements: Vec<InteractiveElement>,
    pub navigation: Vec<NavigationEntry>,
    /// Responsive breakpoints in pixels, ascending.
    pub breakpoints: Vec<u32>,
    /// Internal, non-root, deduplicated hrefs.
    pub dependencies: Vec<String>,
}

// ---------------------------------------------------------------------------
// Extracted content
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub og_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBlock {
    pub content: String,
    /// Tag the text came from (`h1`, `p`, `li`, ...).
    pub tag: String,
    pub order: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub src: String,
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRef {
    pub href: String,
    pub text: String,
    #[serde(rename = "type")]
    pub link_type: LinkType,
}

/// Structured content pulled from a page's markup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedData {
    pub metadata: PageMetadata,
    pub text_blocks: Vec<TextBlock>,
    pub images: Vec<ImageRef>,
    pub links: Vec<LinkRef>,
}

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

/// The four artifact kinds a planned page can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Component,
    Data,
    Service,
    Route,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyStatus {
    NeedsCreation,
    Exists,
    Stub,
}

/// A filesystem artifact the replica needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDependency {
    #[serde(rename = "type")]
    pub kind: DependencyKind,
    /// Path relative to the project root.
    pub path: String,
    pub status: DependencyStatus,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl PageDependency {
    pub fn new(kind: DependencyKind, path: impl Into<String>, status: DependencyStatus) -> Self {
        Self {
            kind,
            path: path.into(),
            status,
            depends_on: Vec::new(),
        }
    }

    pub fn with_depends_on(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGraph {
    pub page_slug: String,
    pub dependencies: Vec<PageDependency>,
    pub shared_components: Vec<String>,
    pub shared_data: Vec<String>,
    pub linked_pages: Vec<String>,
}

// ---------------------------------------------------------------------------
// Implementation plan
// ---------------------------------------------------------------------------

/// A file the plan intends to exist, with the planned files it imports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedArtifact {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub description: String,
}

/// Outcome of dependency resolution, stored with the plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResolution {
    /// Dependencies in topological order.
    pub dependencies: Vec<PageDependency>,
    pub stubs_created: Vec<String>,
    pub cycles: Vec<Vec<String>>,
    pub shared_components: Vec<String>,
    pub shared_data: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImplementationPlan {
    pub page_slug: String,
    /// The page's own entry file.
    pub entry_file: String,
    pub components: Vec<PlannedArtifact>,
    pub data_files: Vec<PlannedArtifact>,
    pub services: Vec<PlannedArtifact>,
    /// Internal hrefs the page links to.
    pub routes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<PlanResolution>,
}

impl ImplementationPlan {
    /// Every planned artifact with its dependency kind, in plan order.
    pub fn artifacts(&self) -> impl Iterator<Item = (DependencyKind, &PlannedArtifact)> {
        self.components
            .iter()
            .map(|a| (DependencyKind::Component, a))
            .chain(self.data_files.iter().map(|a| (DependencyKind::Data, a)))
            .chain(self.services.iter().map(|a| (DependencyKind::Service, a)))
    }
}
