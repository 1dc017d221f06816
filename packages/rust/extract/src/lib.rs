//! Structured content extraction and clone verification.
//!
//! [`extract_page_data`] pulls title, text blocks, images and links out of raw
//! markup; [`verify_clone`] scores a replica's extraction against the
//! source's with a weighted checklist.

mod verify;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use cloneforge_shared::{ExtractedData, ImageRef, LinkRef, PageMetadata, TextBlock, classify_href};

pub use verify::{
    CheckTally, IssueKind, PASS_THRESHOLD, Severity, VerificationChecks, VerificationIssue,
    VerificationResult, verify_clone, verify_clone_with,
};

/// Text shorter than this (in chars) is ignored.
const MIN_TEXT_LEN: usize = 3;

// ---------------------------------------------------------------------------
// Compiled patterns and selectors
// ---------------------------------------------------------------------------

static SCRIPT_STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b[^>]*>.*?</(script|style|noscript)\s*>")
        .expect("valid regex")
});

static TEXT_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("h1, h2, h3, h4, h5, h6, p, span, li").expect("text selector")
});
static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("title selector"));
static H1_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").expect("h1 selector"));
static IMG_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src]").expect("img selector"));
static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector"));
static HTML_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("html").expect("html selector"));
static CANONICAL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"link[rel="canonical"]"#).expect("canonical selector"));

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Extract structured content from `html`, classifying links against `base_url`.
#[instrument(skip(html), fields(base_url = %base_url, html_len = html.len()))]
pub fn extract_page_data(html: &str, base_url: &str) -> ExtractedData {
    let base = Url::parse(base_url).ok();
    let cleaned = SCRIPT_STYLE_RE.replace_all(html, "");
    let doc = Html::parse_document(&cleaned);

    let data = ExtractedData {
        metadata: extract_metadata(&doc),
        text_blocks: extract_text_blocks(&doc),
        images: extract_images(&doc),
        links: extract_links(&doc, base.as_ref()),
    };

    debug!(
        title = %data.metadata.title,
        text_blocks = data.text_blocks.len(),
        images = data.images.len(),
        links = data.links.len(),
        "page data extracted"
    );

    data
}

fn extract_metadata(doc: &Html) -> PageMetadata {
    let title = doc
        .select(&TITLE_SEL)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .or_else(|| meta_content(doc, "property", "og:title"))
        .or_else(|| doc.select(&H1_SEL).next().map(element_text))
        .unwrap_or_default();

    PageMetadata {
        title,
        description: meta_content(doc, "name", "description")
            .or_else(|| meta_content(doc, "property", "og:description")),
        og_image: meta_content(doc, "property", "og:image"),
        canonical: doc
            .select(&CANONICAL_SEL)
            .next()
            .and_then(|el| el.value().attr("href"))
            .map(str::to_string),
        lang: doc
            .select(&HTML_SEL)
            .next()
            .and_then(|el| el.value().attr("lang"))
            .map(str::to_string),
    }
}

/// `<meta {attr}="{key}" content="...">`
fn meta_content(doc: &Html, attr: &str, key: &str) -> Option<String> {
    let selector = Selector::parse(&format!(r#"meta[{attr}="{key}"]"#)).ok()?;
    doc.select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn extract_text_blocks(doc: &Html) -> Vec<TextBlock> {
    doc.select(&TEXT_SEL)
        .filter_map(|el| {
            let content = element_text(el);
            (content.chars().count() >= MIN_TEXT_LEN)
                .then(|| (el.value().name().to_string(), content))
        })
        .enumerate()
        .map(|(order, (tag, content))| TextBlock {
            content,
            tag,
            order,
        })
        .collect()
}

fn extract_images(doc: &Html) -> Vec<ImageRef> {
    doc.select(&IMG_SEL)
        .filter_map(|el| {
            let src = el.value().attr("src")?.trim();
            if src.is_empty() || src.starts_with("data:") {
                return None;
            }
            Some(ImageRef {
                src: src.to_string(),
                alt: el.value().attr("alt").unwrap_or("").trim().to_string(),
            })
        })
        .collect()
}

fn extract_links(doc: &Html, base: Option<&Url>) -> Vec<LinkRef> {
    doc.select(&LINK_SEL)
        .filter_map(|el| {
            let href = el.value().attr("href")?.trim();
            if href.is_empty() || href.to_ascii_lowercase().starts_with("javascript:") {
                return None;
            }
            Some(LinkRef {
                href: href.to_string(),
                text: element_text(el),
                link_type: classify_href(href, base),
            })
        })
        .collect()
}

/// Element text with whitespace runs collapsed.
fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cloneforge_shared::LinkType;

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/html/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    const BASE: &str = "https://tools.example.com/tools/notion";

    #[test]
    fn extracts_metadata() {
        let data = extract_page_data(&load_fixture("tool_page.html"), BASE);
        let meta = &data.metadata;
        assert_eq!(meta.title, "Notion - AI Tools Hub | Productivity workspace");
        assert_eq!(
            meta.description.as_deref(),
            Some("All-in-one workspace for notes, docs and project management.")
        );
        assert_eq!(meta.og_image.as_deref(), Some("https://tools.example.com/og/notion.png"));
        assert_eq!(meta.canonical.as_deref(), Some(BASE));
        assert_eq!(meta.lang.as_deref(), Some("en"));
    }

    #[test]
    fn text_blocks_skip_scripts_and_short_text() {
        let data = extract_page_data(&load_fixture("tool_page.html"), BASE);
        let contents: Vec<&str> = data.text_blocks.iter().map(|b| b.content.as_str()).collect();

        assert!(contents.contains(&"Notion"));
        assert!(contents.contains(&"Plus plan at $10 per seat"));
        assert!(contents.contains(&"Made by the AI Tools Hub team"));
        assert!(!contents.iter().any(|c| c.contains("not content")));
        assert!(!contents.contains(&"OK"));

        let orders: Vec<usize> = data.text_blocks.iter().map(|b| b.order).collect();
        assert_eq!(orders, (0..data.text_blocks.len()).collect::<Vec<_>>());
        assert_eq!(data.text_blocks[0].tag, "h1");
    }

    #[test]
    fn images_skip_data_uris() {
        let data = extract_page_data(&load_fixture("tool_page.html"), BASE);
        let srcs: Vec<&str> = data.images.iter().map(|i| i.src.as_str()).collect();
        assert_eq!(srcs, ["/logo.svg", "/images/notion-screenshot.png"]);
        assert_eq!(data.images[1].alt, "Notion screenshot");
    }

    #[test]
    fn links_skip_javascript_and_are_classified() {
        let data = extract_page_data(&load_fixture("tool_page.html"), BASE);
        assert!(!data.links.iter().any(|l| l.href.starts_with("javascript:")));

        let find = |href: &str| data.links.iter().find(|l| l.href == href).unwrap();
        assert_eq!(find("/categories").link_type, LinkType::Internal);
        assert_eq!(find("https://www.notion.so").link_type, LinkType::External);
        assert_eq!(find("#top").link_type, LinkType::Anchor);
        assert_eq!(find("/news").text, "News");
    }

    #[test]
    fn title_falls_back_to_h1() {
        let data = extract_page_data("<html><body><h1> Hello   world </h1></body></html>", BASE);
        assert_eq!(data.metadata.title, "Hello world");
        assert!(data.metadata.description.is_none());
    }

    #[test]
    fn invalid_base_url_still_extracts() {
        let data = extract_page_data(r#"<a href="https://a.com/x">A link</a>"#, "not a url");
        assert_eq!(data.links.len(), 1);
        assert_eq!(data.links[0].link_type, LinkType::External);
    }
}
