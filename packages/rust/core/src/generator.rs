//! Code generation collaborators for the implement phase.
//!
//! The pipeline only writes stubs itself; materializing real source files is
//! delegated to a [`CodeGenerator`]. [`ScaffoldGenerator`] is the built-in one.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use cloneforge_deps::{is_stub, pascal_case};
use cloneforge_shared::{CloneForgeError, ExtractedData, ImplementationPlan, Result};

use crate::planner::top_level_components;

/// Files touched by a generator run, relative to the project root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedFiles {
    pub created: Vec<String>,
    pub modified: Vec<String>,
}

/// Outbound collaborator that turns a resolved plan into source files.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self, plan: &ImplementationPlan, extracted: &ExtractedData) -> Result<GeneratedFiles>;

    /// Human-readable generator name for tracing.
    fn name(&self) -> &str;
}

/// Writes the page entry file and its data file.
///
/// Existing files are left alone unless they are still placeholders, in
/// which case they are rewritten and reported as modified.
#[derive(Debug, Clone)]
pub struct ScaffoldGenerator {
    project_root: PathBuf,
}

impl ScaffoldGenerator {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    fn write(&self, rel: &str, content: &str, files: &mut GeneratedFiles) -> Result<()> {
        let target = self.project_root.join(rel);
        match std::fs::read_to_string(&target) {
            Ok(existing) if existing == content => return Ok(()),
            Ok(existing) if !is_stub(&existing) => {
                debug!(path = rel, "keeping hand-written file");
                return Ok(());
            }
            Ok(_) => files.modified.push(rel.to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => files.created.push(rel.to_string()),
            Err(e) => return Err(CloneForgeError::io(&target, e)),
        }
        write_atomic(&target, content)
    }
}

impl CodeGenerator for ScaffoldGenerator {
    #[instrument(skip_all, fields(page_slug = %plan.page_slug))]
    fn generate(&self, plan: &ImplementationPlan, extracted: &ExtractedData) -> Result<GeneratedFiles> {
        let mut files = GeneratedFiles::default();

        self.write(&plan.entry_file, &page_source(plan, extracted), &mut files)?;
        for data in &plan.data_files {
            self.write(&data.path, &data_json(extracted)?, &mut files)?;
        }

        info!(
            created = files.created.len(),
            modified = files.modified.len(),
            "scaffold generated"
        );
        Ok(files)
    }

    fn name(&self) -> &str {
        "scaffold"
    }
}

fn write_atomic(target: &Path, content: &str) -> Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CloneForgeError::io(parent, e))?;
    }
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = target.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::now_v7()));

    std::fs::write(&temp, content).map_err(|e| CloneForgeError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        CloneForgeError::io(target, e)
    })
}

/// Import specifier for a project-relative source path.
fn import_path(path: &str) -> String {
    let without_ext = path.rsplit_once('.').map_or(path, |(stem, _)| stem);
    format!("@/{without_ext}")
}

fn page_source(plan: &ImplementationPlan, extracted: &ExtractedData) -> String {
    let top = top_level_components(plan);
    let mut out = String::new();

    for component in &top {
        out.push_str(&format!(
            "import {} from \"{}\";\n",
            component.name,
            import_path(&component.path)
        ));
    }
    if !top.is_empty() {
        out.push('\n');
    }

    let meta = &extracted.metadata;
    out.push_str("export const metadata = {\n");
    out.push_str(&format!("  title: {},\n", js_string(&meta.title)));
    if let Some(description) = &meta.description {
        out.push_str(&format!("  description: {},\n", js_string(description)));
    }
    out.push_str("};\n\n");

    out.push_str(&format!(
        "export default function {}Page() {{\n  return (\n    <>\n",
        pascal_case(&plan.page_slug)
    ));
    for component in &top {
        out.push_str(&format!("      <{} />\n", component.name));
    }
    out.push_str("    </>\n  );\n}\n");
    out
}

fn js_string(s: &str) -> String {
    // JSON string syntax is valid JS.
    serde_json::Value::String(s.to_string()).to_string()
}

fn data_json(extracted: &ExtractedData) -> Result<String> {
    let mut json = serde_json::to_string_pretty(extracted)
        .map_err(|e| CloneForgeError::validation(format!("serialize extracted data: {e}")))?;
    json.push('\n');
    Ok(json)
}
