//! Durable, resumable per-page progress records.
//!
//! One JSON document per page slug lives in the progress directory. Every
//! mutation is a full read-modify-write of that document, persisted through a
//! temp file and rename so a crash never leaves a half-written record.
//!
//! There is no file locking: callers serialize operations per slug.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, instrument};

use cloneforge_shared::{
    CloneForgeError, ErrorLogEntry, ExtractedData, ImplementationPlan, PageAnalysis, Phase,
    PhaseState, ProgressRecord, Result,
};

/// File-backed store of [`ProgressRecord`]s.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    progress_dir: PathBuf,
    archive_dir: PathBuf,
}

/// Reject slugs that could escape the progress directory.
pub fn validate_slug(slug: &str) -> Result<()> {
    let ok = !slug.is_empty()
        && !slug.starts_with('.')
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(CloneForgeError::validation(format!(
            "invalid page slug {slug:?}: use letters, digits, '-', '_' or '.'"
        )))
    }
}

/// Lowercase, hyphen-separated slug: `"Tool Detail Page"` → `tool-detail-page`.
pub fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

impl ProgressStore {
    pub fn new(progress_dir: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            progress_dir: progress_dir.into(),
            archive_dir: archive_dir.into(),
        }
    }

    pub fn progress_dir(&self) -> &Path {
        &self.progress_dir
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Path of the active record for `slug`.
    pub fn record_path(&self, slug: &str) -> PathBuf {
        self.progress_dir.join(format!("{slug}.json"))
    }

    // -----------------------------------------------------------------------
    // Create / read
    // -----------------------------------------------------------------------

    /// Start a fresh record for `page_slug`, replacing any active one.
    #[instrument(skip_all, fields(page_slug = %page_slug))]
    pub fn create(&self, source_url: &str, page_slug: &str) -> Result<ProgressRecord> {
        validate_slug(page_slug)?;
        let record = ProgressRecord::new(source_url, page_slug);
        self.write(&record)?;
        info!(source_url, "progress record created");
        Ok(record)
    }

    /// Load the record for `slug`. `Ok(None)` means no run exists yet.
    ///
    /// A record that exists but cannot be decoded is an error, never `None`.
    pub fn read(&self, slug: &str) -> Result<Option<ProgressRecord>> {
        validate_slug(slug)?;
        let path = self.record_path(slug);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CloneForgeError::io(&path, e)),
        };
        let record = serde_json::from_str::<ProgressRecord>(&raw).map_err(|e| {
            CloneForgeError::from_json(&format!("progress record {}", path.display()), e)
        })?;
        if record.page_slug != slug {
            return Err(CloneForgeError::validation(format!(
                "progress record {} belongs to page '{}'",
                path.display(),
                record.page_slug
            )));
        }
        Ok(Some(record))
    }

    /// Like [`read`](Self::read) but a missing record is `NotFound`.
    pub fn require(&self, slug: &str) -> Result<ProgressRecord> {
        self.read(slug)?
            .ok_or_else(|| CloneForgeError::not_found(format!("progress record '{slug}'")))
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Read the record, apply `f`, persist it and return the new state.
    fn modify(&self, slug: &str, f: impl FnOnce(&mut ProgressRecord)) -> Result<ProgressRecord> {
        let mut record = self.require(slug)?;
        f(&mut record);
        record.last_updated_at = Utc::now();
        self.write(&record)?;
        Ok(record)
    }

    #[instrument(skip_all, fields(page_slug = %slug, phase = %phase, status = ?status))]
    pub fn update_phase_status(
        &self,
        slug: &str,
        phase: Phase,
        status: PhaseState,
        error: Option<String>,
    ) -> Result<ProgressRecord> {
        let record = self.modify(slug, |r| r.set_phase_status(phase, status, error))?;
        debug!(overall = ?record.status, "phase status updated");
        Ok(record)
    }

    pub fn set_page_analysis(&self, slug: &str, analysis: PageAnalysis) -> Result<ProgressRecord> {
        self.modify(slug, |r| r.page_analysis = Some(analysis))
    }

    pub fn set_extracted_data(&self, slug: &str, data: ExtractedData) -> Result<ProgressRecord> {
        self.modify(slug, |r| r.extracted_data = Some(data))
    }

    pub fn set_implementation_plan(
        &self,
        slug: &str,
        plan: ImplementationPlan,
    ) -> Result<ProgressRecord> {
        self.modify(slug, |r| r.implementation_plan = Some(plan))
    }

    /// Add created file paths; paths already listed are skipped.
    pub fn add_files_created<I, S>(&self, slug: &str, paths: I) -> Result<ProgressRecord>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modify(slug, |r| merge_unique(&mut r.files_created, paths))
    }

    /// Add modified file paths; paths already listed are skipped.
    pub fn add_files_modified<I, S>(&self, slug: &str, paths: I) -> Result<ProgressRecord>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modify(slug, |r| merge_unique(&mut r.files_modified, paths))
    }

    /// Append an error-log entry. An entry identical to the last one
    /// (same phase, message and resolution) is not repeated.
    pub fn log_error(
        &self,
        slug: &str,
        phase: Phase,
        error: impl Into<String>,
        resolution: Option<String>,
    ) -> Result<ProgressRecord> {
        let error = error.into();
        self.modify(slug, |r| {
            let duplicate = r.errors.last().is_some_and(|last| {
                last.phase == phase && last.error == error && last.resolution == resolution
            });
            if !duplicate {
                r.errors.push(ErrorLogEntry {
                    phase,
                    error,
                    timestamp: Utc::now(),
                    resolution,
                });
            }
        })
    }

    pub fn increment_verification_attempts(&self, slug: &str) -> Result<ProgressRecord> {
        self.modify(slug, |r| r.verification_attempts += 1)
    }

    // -----------------------------------------------------------------------
    // Resume points
    // -----------------------------------------------------------------------

    pub fn last_completed_phase(&self, slug: &str) -> Result<Option<Phase>> {
        Ok(self.require(slug)?.last_completed_phase())
    }

    pub fn next_phase(&self, slug: &str) -> Result<Option<Phase>> {
        Ok(self.require(slug)?.next_phase())
    }

    // -----------------------------------------------------------------------
    // Archive
    // -----------------------------------------------------------------------

    /// Stamp `completedAt`, copy the record into the archive directory with a
    /// timestamp suffix and delete the active record. Returns the archive path.
    #[instrument(skip_all, fields(page_slug = %slug))]
    pub fn archive(&self, slug: &str) -> Result<PathBuf> {
        let mut record = self.require(slug)?;
        let now = Utc::now();
        record.completed_at = Some(now);
        record.last_updated_at = now;

        std::fs::create_dir_all(&self.archive_dir)
            .map_err(|e| CloneForgeError::io(&self.archive_dir, e))?;
        let stamp = now.format("%Y%m%dT%H%M%S%3fZ");
        let target = self.archive_dir.join(format!("{slug}-{stamp}.json"));
        write_json_atomic(&target, &record)?;

        let active = self.record_path(slug);
        std::fs::remove_file(&active).map_err(|e| CloneForgeError::io(&active, e))?;
        info!(archive = %target.display(), "progress record archived");
        Ok(target)
    }

    fn write(&self, record: &ProgressRecord) -> Result<()> {
        std::fs::create_dir_all(&self.progress_dir)
            .map_err(|e| CloneForgeError::io(&self.progress_dir, e))?;
        write_json_atomic(&self.record_path(&record.page_slug), record)
    }
}

fn merge_unique<I, S>(list: &mut Vec<String>, paths: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    for path in paths {
        let path = path.into();
        if !list.contains(&path) {
            list.push(path);
        }
    }
}

/// Serialize `record` next to `target` and rename it into place.
fn write_json_atomic(target: &Path, record: &ProgressRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| CloneForgeError::validation(format!("serialize progress record: {e}")))?;

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = target.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::now_v7()));

    std::fs::write(&temp, json).map_err(|e| CloneForgeError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        CloneForgeError::io(target, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloneforge_shared::RunStatus;

    fn temp_store() -> (ProgressStore, PathBuf) {
        let root = std::env::temp_dir().join(format!("cf-progress-test-{}", uuid::Uuid::now_v7()));
        let store = ProgressStore::new(root.join("progress"), root.join("archive"));
        (store, root)
    }

    #[test]
    fn create_then_next_phase_is_analyze() {
        let (store, root) = temp_store();
        store.create("https://x.com/p", "demo").unwrap();
        assert_eq!(store.next_phase("demo").unwrap(), Some(Phase::Analyze));
        assert_eq!(store.last_completed_phase("demo").unwrap(), None);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn read_missing_is_none() {
        let (store, root) = temp_store();
        assert!(store.read("nobody").unwrap().is_none());
        assert!(matches!(
            store.update_phase_status("nobody", Phase::Analyze, PhaseState::InProgress, None),
            Err(CloneForgeError::NotFound { .. })
        ));
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn corrupt_records_are_errors() {
        let (store, root) = temp_store();
        std::fs::create_dir_all(store.progress_dir()).unwrap();

        std::fs::write(store.record_path("broken"), "{ not json").unwrap();
        assert!(matches!(store.read("broken"), Err(CloneForgeError::Parse { .. })));

        std::fs::write(store.record_path("shape"), r#"{"sourceUrl": 42}"#).unwrap();
        assert!(matches!(store.read("shape"), Err(CloneForgeError::Validation { .. })));
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn unsafe_slugs_are_rejected() {
        let (store, _root) = temp_store();
        for slug in ["", "../etc", "a/b", ".hidden"] {
            assert!(matches!(
                store.create("https://x.com", slug),
                Err(CloneForgeError::Validation { .. })
            ));
        }
    }

    #[test]
    fn slugify_names() {
        assert_eq!(slugify("Tool Detail Page"), "tool-detail-page");
        assert_eq!(slugify("  pricing__table!! "), "pricing-table");
        assert!(validate_slug(&slugify("Über Café")).is_ok());
    }

    #[test]
    fn phase_progression_is_persisted() {
        let (store, root) = temp_store();
        store.create("https://x.com/p", "demo").unwrap();

        for phase in [Phase::Analyze, Phase::Extract] {
            store.update_phase_status("demo", phase, PhaseState::InProgress, None).unwrap();
            store.update_phase_status("demo", phase, PhaseState::Completed, None).unwrap();
        }
        assert_eq!(store.last_completed_phase("demo").unwrap(), Some(Phase::Extract));
        assert_eq!(store.next_phase("demo").unwrap(), Some(Phase::Plan));

        let record = store.read("demo").unwrap().unwrap();
        let analyze = record.phases.get(Phase::Analyze);
        let (started, completed) = (analyze.started_at.unwrap(), analyze.completed_at.unwrap());
        assert!(started <= completed);
        assert!(completed <= Utc::now());

        let record = store
            .update_phase_status("demo", Phase::Plan, PhaseState::Failed, Some("boom".into()))
            .unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.phases.get(Phase::Plan).error.as_deref(), Some("boom"));
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn all_phases_completed_means_no_next_phase() {
        let (store, root) = temp_store();
        store.create("https://x.com/p", "demo").unwrap();
        for phase in Phase::ALL {
            store.update_phase_status("demo", phase, PhaseState::Completed, None).unwrap();
        }
        assert_eq!(store.next_phase("demo").unwrap(), None);
        assert_eq!(store.read("demo").unwrap().unwrap().status, RunStatus::Completed);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn file_lists_are_set_like() {
        let (store, root) = temp_store();
        store.create("https://x.com/p", "demo").unwrap();
        store.add_files_created("demo", ["a.tsx", "b.tsx"]).unwrap();
        let record = store.add_files_created("demo", ["b.tsx", "c.tsx", "a.tsx"]).unwrap();
        assert_eq!(record.files_created, ["a.tsx", "b.tsx", "c.tsx"]);

        store.add_files_modified("demo", ["x.ts"]).unwrap();
        let record = store.add_files_modified("demo", ["x.ts"]).unwrap();
        assert_eq!(record.files_modified, ["x.ts"]);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn error_log_and_attempt_counter() {
        let (store, root) = temp_store();
        store.create("https://x.com/p", "demo").unwrap();
        store.log_error("demo", Phase::Verify, "score 80", None).unwrap();
        store.log_error("demo", Phase::Verify, "score 80", None).unwrap();
        let record = store
            .log_error("demo", Phase::Verify, "score 90", Some("retry".into()))
            .unwrap();
        assert_eq!(record.errors.len(), 2);
        assert_eq!(record.errors[1].resolution.as_deref(), Some("retry"));

        store.increment_verification_attempts("demo").unwrap();
        let record = store.increment_verification_attempts("demo").unwrap();
        assert_eq!(record.verification_attempts, 2);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn archive_moves_record() {
        let (store, root) = temp_store();
        store.create("https://x.com/p", "demo").unwrap();
        let archived = store.archive("demo").unwrap();

        assert!(store.read("demo").unwrap().is_none());
        let name = archived.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("demo-") && name.ends_with(".json"));

        let raw = std::fs::read_to_string(&archived).unwrap();
        let record: ProgressRecord = serde_json::from_str(&raw).unwrap();
        assert!(record.completed_at.is_some());
        assert!(matches!(store.archive("demo"), Err(CloneForgeError::NotFound { .. })));
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn no_temp_files_left_behind() {
        let (store, root) = temp_store();
        store.create("https://x.com/p", "demo").unwrap();
        store.increment_verification_attempts("demo").unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(store.progress_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        std::fs::remove_dir_all(&root).ok();
    }
}
