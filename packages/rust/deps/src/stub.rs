//! Placeholder artifacts for missing or cycle-breaking dependencies.
//!
//! Stub creation is best-effort: failures come back as `success: false`
//! on the [`StubResult`] rather than as errors.

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use cloneforge_shared::{DependencyKind, PageDependency};

/// Outcome of writing one stub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StubResult {
    pub path: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Write a placeholder for `dep` under `project_root`, creating parent
/// directories. An existing file is left untouched and counts as success.
///
/// Paths that are absolute or contain `..` are refused so a stub can never
/// land outside `project_root`.
pub fn create_stub(project_root: &Path, dep: &PageDependency) -> StubResult {
    if !is_contained(&dep.path) {
        warn!(path = %dep.path, "refusing stub path outside the project root");
        return StubResult {
            path: dep.path.clone(),
            success: false,
            error: Some(format!("path escapes the project root: {}", dep.path)),
        };
    }

    let target = project_root.join(&dep.path);

    if target.exists() {
        debug!(path = %dep.path, "stub target already exists, leaving it");
        return StubResult {
            path: dep.path.clone(),
            success: true,
            error: None,
        };
    }

    let write = || -> std::io::Result<()> {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, stub_content(dep))
    };

    match write() {
        Ok(()) => {
            debug!(path = %dep.path, kind = ?dep.kind, "stub written");
            StubResult {
                path: dep.path.clone(),
                success: true,
                error: None,
            }
        }
        Err(e) => {
            warn!(path = %dep.path, error = %e, "failed to write stub");
            StubResult {
                path: dep.path.clone(),
                success: false,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Relative, non-empty and made only of plain segments (`.` is tolerated).
fn is_contained(path: &str) -> bool {
    let mut normal = false;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => normal = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    normal
}

/// First line of every non-JSON placeholder.
const STUB_HEADER: &str = "// Placeholder generated by cloneforge";

/// Whether `content` is an untouched placeholder from [`stub_content`].
pub fn is_stub(content: &str) -> bool {
    content.starts_with(STUB_HEADER) || content.contains("\"_stub\": true")
}

/// Placeholder source for a dependency, chosen by kind.
pub fn stub_content(dep: &PageDependency) -> String {
    let name = pascal_case(file_stem(&dep.path));
    match dep.kind {
        DependencyKind::Component => component_stub(&name, &dep.path),
        DependencyKind::Data => data_stub(&dep.path),
        DependencyKind::Service => service_stub(&name),
        DependencyKind::Route => route_stub(&name, &dep.path),
    }
}

fn component_stub(name: &str, path: &str) -> String {
    format!(
        r#"// Placeholder generated by cloneforge. Replace with the real component.

export interface {name}Props {{}}

export default function {name}(_props: {name}Props) {{
  return (
    <div data-stub="{path}" className="rounded border border-dashed p-4 text-sm text-gray-500">
      {name}: not implemented
    </div>
  );
}}
"#
    )
}

fn data_stub(path: &str) -> String {
    if path.ends_with(".json") {
        "{\n  \"_stub\": true,\n  \"items\": []\n}\n".to_string()
    } else {
        "// Placeholder generated by cloneforge.\nexport const _stub = true;\n\nexport const items: unknown[] = [];\n\nexport default items;\n".to_string()
    }
}

fn service_stub(name: &str) -> String {
    format!(
        r#"// Placeholder generated by cloneforge. Replace with the real service.

export async function getAll(): Promise<unknown[]> {{
  console.warn("[stub] {name}.getAll is not implemented");
  return [];
}}

export async function getById(_id: string): Promise<unknown | null> {{
  console.warn("[stub] {name}.getById is not implemented");
  return null;
}}
"#
    )
}

fn route_stub(name: &str, path: &str) -> String {
    format!(
        r#"// Placeholder generated by cloneforge for {path}.

export default function {name}Page() {{
  return (
    <main className="mx-auto max-w-3xl p-8">
      <h1 className="text-2xl font-semibold">Coming soon</h1>
      <p className="mt-2 text-gray-500">This page is not yet implemented.</p>
    </main>
  );
}}
"#
    )
}

/// File name without extension; for `.../page.tsx` routes, the route segment.
fn file_stem(path: &str) -> &str {
    let mut segments = path.rsplit('/');
    let last = segments.next().unwrap_or(path);
    let stem = last.split('.').next().unwrap_or(last);
    if stem == "page" || stem == "index" {
        segments.next().unwrap_or(stem)
    } else {
        stem
    }
}

/// `pricing-table` / `pricing_table` / `pricingTable` → `PricingTable`.
pub fn pascal_case(s: &str) -> String {
    let name: String = s
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();

    match name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => name,
        Some(_) => format!("Page{name}"),
        None => "Placeholder".to_string(),
    }
}
