//! Accessibility-snapshot outline parser.
//!
//! Parses the indentation-delimited outline produced by the browser layer:
//! - `- role "name" [key=value] [flag]: inline text`
//! - the leading `- ` is optional
//! - `- /url: /pricing` is a property of the enclosing node, not a node
//!
//! Nesting is derived from indentation, so any consistent indent width works.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use cloneforge_shared::{CloneForgeError, Result};
use regex::Regex;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One node of the parsed snapshot tree. Each node owns its children.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotNode {
    /// ARIA role (`banner`, `link`, `button`, ...).
    pub role: String,
    /// Accessible name from the quoted part of the line.
    pub name: Option<String>,
    /// Bracketed attributes; bare flags map to `"true"`.
    pub attributes: BTreeMap<String, String>,
    /// Inline text after the trailing `:`.
    pub text: Option<String>,
    /// Nesting depth, 0 for top-level nodes.
    pub depth: usize,
    pub children: Vec<SnapshotNode>,
}

impl SnapshotNode {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Link target, from either `[href=...]` or a `/url:` property.
    pub fn href(&self) -> Option<&str> {
        self.attr("href").or_else(|| self.attr("url"))
    }

    /// Best human-readable label: accessible name, else inline text.
    pub fn label(&self) -> Option<&str> {
        self.name.as_deref().or(self.text.as_deref())
    }

    /// This node and all descendants in pre-order.
    pub fn descendants(&self) -> Vec<&SnapshotNode> {
        let mut out = Vec::new();
        collect(std::slice::from_ref(self), &mut out);
        out
    }
}

/// Flatten a forest in pre-order.
pub fn flatten(nodes: &[SnapshotNode]) -> Vec<&SnapshotNode> {
    let mut out = Vec::new();
    collect(nodes, &mut out);
    out
}

fn collect<'a>(nodes: &'a [SnapshotNode], out: &mut Vec<&'a SnapshotNode>) {
    for node in nodes {
        out.push(node);
        collect(&node.children, out);
    }
}

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// `role "name" [attrs...]: text`
static NODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?:-\s+)?(?P<role>[A-Za-z][\w-]*)(?:\s+"(?P<name>(?:[^"\\]|\\.)*)")?(?P<attrs>(?:\s*\[[^\]]*\])*)\s*(?::\s*(?P<text>.*))?$"#,
    )
    .expect("node regex")
});

/// `/key: value`
static PROPERTY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:-\s+)?/(?P<key>[\w-]+):\s*(?P<value>.*)$").expect("property regex")
});

static ATTR_GROUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]").expect("attribute group regex"));

static ATTR_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([\w-]+)(?:\s*=\s*(?:"([^"]*)"|([^,\s]*)))?"#).expect("attribute pair regex")
});

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

enum Line {
    Node(SnapshotNode),
    Property(String, String),
}

/// Parse a snapshot outline into a forest of top-level nodes.
pub fn parse_snapshot(content: &str) -> Result<Vec<SnapshotNode>> {
    let mut roots: Vec<SnapshotNode> = Vec::new();
    // Open ancestors, innermost last, paired with their indent width.
    let mut stack: Vec<(usize, SnapshotNode)> = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        if raw.trim().is_empty() {
            continue;
        }

        let indent = indent_width(raw);
        close_deeper(&mut stack, &mut roots, indent);

        match parse_line(raw.trim(), idx + 1)? {
            Line::Property(key, value) => match stack.last_mut() {
                Some((_, parent)) => {
                    parent.attributes.insert(key, value);
                }
                None => {
                    tracing::debug!(line = idx + 1, %key, "property without parent node, ignoring");
                }
            },
            Line::Node(mut node) => {
                node.depth = stack.len();
                stack.push((indent, node));
            }
        }
    }

    close_deeper(&mut stack, &mut roots, 0);
    Ok(roots)
}

/// Pop every open node indented at least `indent` into its parent.
fn close_deeper(
    stack: &mut Vec<(usize, SnapshotNode)>,
    roots: &mut Vec<SnapshotNode>,
    indent: usize,
) {
    while let Some((open_indent, _)) = stack.last() {
        if *open_indent < indent {
            break;
        }
        if let Some((_, node)) = stack.pop() {
            match stack.last_mut() {
                Some((_, parent)) => parent.children.push(node),
                None => roots.push(node),
            }
        }
    }
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 2 } else { 1 })
        .sum()
}

fn parse_line(line: &str, line_no: usize) -> Result<Line> {
    if let Some(caps) = PROPERTY_RE.captures(line) {
        return Ok(Line::Property(
            caps["key"].to_string(),
            unquote(caps["value"].trim()).to_string(),
        ));
    }

    let caps = NODE_RE.captures(line).ok_or_else(|| {
        CloneForgeError::parse(format!("snapshot line {line_no}: cannot read role from '{line}'"))
    })?;

    let name = caps
        .name("name")
        .map(|m| m.as_str().replace("\\\"", "\""));
    let attributes = caps
        .name("attrs")
        .map(|m| parse_attributes(m.as_str()))
        .unwrap_or_default();
    let text = caps
        .name("text")
        .map(|m| unquote(m.as_str().trim()).to_string())
        .filter(|t| !t.is_empty());

    Ok(Line::Node(SnapshotNode {
        role: caps["role"].to_string(),
        name,
        attributes,
        text,
        depth: 0,
        children: Vec::new(),
    }))
}

fn parse_attributes(groups: &str) -> BTreeMap<String, String> {
    let mut attrs = BTreeMap::new();
    for group in ATTR_GROUP_RE.captures_iter(groups) {
        for pair in ATTR_PAIR_RE.captures_iter(&group[1]) {
            let value = pair
                .get(2)
                .or_else(|| pair.get(3))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "true".to_string());
            attrs.insert(pair[1].to_string(), value);
        }
    }
    attrs
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(s)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
