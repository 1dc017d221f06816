//! Snapshot Analyzer: turns an accessibility snapshot into a [`PageAnalysis`].
//!
//! The snapshot is a hierarchical outline of roles, names and attributes
//! supplied by the browser-automation layer. From it we derive:
//! - [`identify_sections`]: structural regions, nested as found
//! - [`identify_interactive_elements`]: buttons, links, tabs, form controls
//! - [`identify_navigation`]: deduplicated, classified links
//! - [`identify_breakpoints`]: responsive widths in pixels
//!
//! [`analyze_page`] runs all of them and derives the dependency list.

pub mod parser;

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};
use url::Url;

use cloneforge_shared::{
    CloneForgeError, InteractiveElement, InteractiveKind, LinkType, NavigationEntry,
    PageAnalysis, Result, Section, SectionType, classify_href, internal_path,
};

pub use parser::{SnapshotNode, flatten, parse_snapshot};

/// Breakpoints used when neither explicit nor detected ones are available.
pub const DEFAULT_BREAKPOINTS: [u32; 4] = [640, 768, 1024, 1280];

/// Responsive prefix tokens and their canonical widths.
const BREAKPOINT_PREFIXES: [(&str, u32); 5] = [
    ("sm", 640),
    ("md", 768),
    ("lg", 1024),
    ("xl", 1280),
    ("2xl", 1536),
];

/// Inputs besides the snapshot itself.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Raw page source, scanned for responsive tokens.
    pub raw_source: Option<String>,
    /// Breakpoints supplied by the caller; these win over detection.
    pub breakpoints: Option<Vec<u32>>,
}

/// Analyze a page snapshot.
#[instrument(skip(snapshot, opts), fields(url = %url))]
pub fn analyze_page(url: &str, snapshot: &str, opts: &AnalyzeOptions) -> Result<PageAnalysis> {
    let page_url = Url::parse(url)
        .map_err(|e| CloneForgeError::validation(format!("invalid page URL '{url}': {e}")))?;
    let nodes = parse_snapshot(snapshot)?;

    let sections = identify_sections(&nodes);
    let interactive_elements = identify_interactive_elements(&nodes);
    let navigation = identify_navigation(&nodes, &page_url);
    let breakpoints =
        identify_breakpoints(opts.breakpoints.as_deref(), opts.raw_source.as_deref());
    let dependencies = page_dependencies(&navigation, &page_url);

    debug!(
        sections = sections.len(),
        interactive = interactive_elements.len(),
        links = navigation.len(),
        dependencies = dependencies.len(),
        "snapshot analyzed"
    );

    Ok(PageAnalysis {
        url: url.to_string(),
        title: page_title(&nodes),
        sections,
        interactive_elements,
        navigation,
        breakpoints,
        dependencies,
    })
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

fn section_type_for(role: &str) -> Option<SectionType> {
    match role {
        "banner" => Some(SectionType::Header),
        "main" => Some(SectionType::Main),
        "contentinfo" => Some(SectionType::Footer),
        "complementary" => Some(SectionType::Sidebar),
        "dialog" => Some(SectionType::Modal),
        "region" => Some(SectionType::Panel),
        _ => None,
    }
}

/// Derive structural sections. A section found inside another becomes its child.
pub fn identify_sections(nodes: &[SnapshotNode]) -> Vec<Section> {
    let mut counters: HashMap<SectionType, usize> = HashMap::new();
    collect_sections(nodes, &mut counters)
}

fn collect_sections(
    nodes: &[SnapshotNode],
    counters: &mut HashMap<SectionType, usize>,
) -> Vec<Section> {
    let mut out = Vec::new();
    for node in nodes {
        match section_type_for(&node.role) {
            Some(section_type) => {
                let n = counters.entry(section_type).or_insert(0);
                *n += 1;
                let id = format!("{}-{n}", section_type.as_str());
                out.push(Section {
                    id,
                    section_type,
                    selector: section_selector(section_type, node.name.as_deref()),
                    name: node.name.clone(),
                    children: collect_sections(&node.children, counters),
                });
            }
            None => out.extend(collect_sections(&node.children, counters)),
        }
    }
    out
}

fn section_selector(section_type: SectionType, name: Option<&str>) -> String {
    let base = match section_type {
        SectionType::Header => "header",
        SectionType::Main => "main",
        SectionType::Footer => "footer",
        SectionType::Sidebar => "aside",
        SectionType::Modal => "[role=\"dialog\"]",
        SectionType::Panel => "section",
    };
    match name {
        Some(name) => format!("{base}[aria-label=\"{}\"]", name.replace('"', "\\\"")),
        None => base.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Interactive elements
// ---------------------------------------------------------------------------

/// Find every interactive control anywhere in the tree.
pub fn identify_interactive_elements(nodes: &[SnapshotNode]) -> Vec<InteractiveElement> {
    flatten(nodes)
        .into_iter()
        .filter_map(interactive_element)
        .collect()
}

fn interactive_element(node: &SnapshotNode) -> Option<InteractiveElement> {
    let label = node.label().unwrap_or("").to_string();
    let (kind, action) = match node.role.as_str() {
        "button" => (InteractiveKind::Button, format!("Click \"{label}\"")),
        "link" => {
            let href = node.href();
            if href.is_some_and(|h| h.starts_with('#')) {
                return None;
            }
            let target = href.unwrap_or(label.as_str());
            (InteractiveKind::Link, format!("Navigate to {target}"))
        }
        "tab" => (InteractiveKind::Tab, format!("Switch to tab \"{label}\"")),
        "combobox" => (
            InteractiveKind::Dropdown,
            format!("Select an option from \"{label}\""),
        ),
        "details" => (InteractiveKind::Accordion, format!("Expand \"{label}\"")),
        "textbox" => (InteractiveKind::Form, format!("Enter text into \"{label}\"")),
        "checkbox" => (InteractiveKind::Form, format!("Toggle checkbox \"{label}\"")),
        "radio" => (InteractiveKind::Form, format!("Choose option \"{label}\"")),
        _ => return None,
    };

    Some(InteractiveElement {
        kind,
        action,
        selector: role_selector(&node.role, node.name.as_deref()),
    })
}

fn role_selector(role: &str, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("role={role}[name=\"{}\"]", name.replace('"', "\\\"")),
        None => format!("role={role}"),
    }
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

/// Collect links with an href, classified and deduplicated by href (first wins).
pub fn identify_navigation(nodes: &[SnapshotNode], page_url: &Url) -> Vec<NavigationEntry> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut entries = Vec::new();

    for node in flatten(nodes) {
        if node.role != "link" {
            continue;
        }
        let Some(href) = node.href() else { continue };
        if !seen.insert(href) {
            continue;
        }
        entries.push(NavigationEntry {
            href: href.to_string(),
            text: node.label().unwrap_or("").trim().to_string(),
            link_type: classify_href(href, Some(page_url)),
        });
    }

    entries
}

/// Internal, non-root, deduplicated paths the page links to.
pub fn page_dependencies(navigation: &[NavigationEntry], page_url: &Url) -> Vec<String> {
    let mut seen = HashSet::new();
    navigation
        .iter()
        .filter(|entry| entry.link_type == LinkType::Internal)
        .filter_map(|entry| internal_path(&entry.href, Some(page_url)))
        .filter(|path| path != "/")
        .filter(|path| seen.insert(path.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Breakpoints
// ---------------------------------------------------------------------------

/// Matches a responsive prefix such as `md:` that is not part of a longer word.
static PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\w-])(2xl|xl|lg|md|sm):[\w\[\-]").expect("prefix regex")
});

/// Matches `min-width: 900px` / `max-width:600px` in inline CSS.
static MEDIA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:min|max)-width\s*:\s*(\d{3,4})px").expect("media query regex")
});

/// Explicit breakpoints win; else detect from raw source; else the defaults.
/// Always ascending with no duplicates.
pub fn identify_breakpoints(explicit: Option<&[u32]>, raw_source: Option<&str>) -> Vec<u32> {
    let mut widths: Vec<u32> = match explicit {
        Some(list) if !list.is_empty() => list.to_vec(),
        _ => raw_source.map(detect_breakpoints).unwrap_or_default(),
    };

    if widths.is_empty() {
        widths = DEFAULT_BREAKPOINTS.to_vec();
    }

    widths.sort_unstable();
    widths.dedup();
    widths
}

fn detect_breakpoints(source: &str) -> Vec<u32> {
    let mut widths = Vec::new();

    for caps in PREFIX_RE.captures_iter(source) {
        if let Some((_, px)) = BREAKPOINT_PREFIXES.iter().find(|(p, _)| *p == &caps[1]) {
            widths.push(*px);
        }
    }
    for caps in MEDIA_RE.captures_iter(source) {
        if let Ok(px) = caps[1].parse::<u32>() {
            widths.push(px);
        }
    }

    widths
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// First level-1 heading, else first heading, else empty.
fn page_title(nodes: &[SnapshotNode]) -> String {
    let headings: Vec<&SnapshotNode> = flatten(nodes)
        .into_iter()
        .filter(|n| n.role == "heading")
        .collect();

    headings
        .iter()
        .find(|n| n.attr("level") == Some("1"))
        .or_else(|| headings.first())
        .and_then(|n| n.label())
        .unwrap_or("")
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
