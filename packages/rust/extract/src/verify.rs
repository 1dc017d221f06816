//! Weighted clone verification.
//!
//! Every comparison is one pass/fail check; the score is the passed share of
//! all checks. Coverage below a category's floor also raises an issue, and a
//! critical issue fails the clone whatever the score.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use cloneforge_shared::{ExtractedData, LinkType};

/// Default minimum score for a passing clone.
pub const PASS_THRESHOLD: u8 = 95;

/// Characters of the source title that must appear in the clone title.
const TITLE_PREFIX_LEN: usize = 20;
/// Text fragments are compared on this many leading chars.
const TEXT_KEY_LEN: usize = 50;
/// Length of the substring used for the mutual containment test.
const TEXT_PREFIX_LEN: usize = 30;

const TEXT_COVERAGE_FLOOR: f64 = 0.8;
const IMAGE_COVERAGE_FLOOR: f64 = 0.7;
const LINK_COVERAGE_FLOOR: f64 = 0.7;

/// Listed missing items per issue.
const MAX_DETAILS: usize = 10;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingText,
    MissingImage,
    MissingLink,
    TitleMismatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationIssue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    /// Up to ten of the missing items.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

/// Passed/total checks for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckTally {
    pub passed: usize,
    pub total: usize,
}

impl CheckTally {
    fn ratio(self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.passed as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationChecks {
    pub metadata: CheckTally,
    pub text: CheckTally,
    pub images: CheckTally,
    pub links: CheckTally,
}

impl VerificationChecks {
    fn combined(&self) -> CheckTally {
        [self.metadata, self.text, self.images, self.links]
            .into_iter()
            .fold(CheckTally::default(), |acc, t| CheckTally {
                passed: acc.passed + t.passed,
                total: acc.total + t.total,
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub passed: bool,
    /// 0..=100
    pub score: u8,
    pub issues: Vec<VerificationIssue>,
    pub suggestions: Vec<String>,
    pub checks: VerificationChecks,
}

impl VerificationResult {
    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Score `clone` against `source` with the default pass threshold.
pub fn verify_clone(source: &ExtractedData, clone: &ExtractedData) -> VerificationResult {
    verify_clone_with(source, clone, PASS_THRESHOLD)
}

/// Score `clone` against `source`; passing needs `score >= threshold` and no
/// critical issue.
#[instrument(skip_all, fields(threshold = threshold))]
pub fn verify_clone_with(
    source: &ExtractedData,
    clone: &ExtractedData,
    threshold: u8,
) -> VerificationResult {
    let mut issues = Vec::new();

    let metadata = check_title(source, clone, &mut issues);
    let text = check_text(source, clone, &mut issues);
    let images = check_images(source, clone, &mut issues);
    let links = check_links(source, clone, &mut issues);

    let checks = VerificationChecks {
        metadata,
        text,
        images,
        links,
    };
    let all = checks.combined();
    let score = if all.total == 0 {
        100
    } else {
        (100.0 * all.passed as f64 / all.total as f64).round() as u8
    };

    let mut result = VerificationResult {
        passed: false,
        score,
        suggestions: suggestions_for(&issues, score, threshold),
        issues,
        checks,
    };
    result.passed = score >= threshold && !result.has_critical();

    debug!(
        score,
        passed = result.passed,
        issues = result.issues.len(),
        "clone verified"
    );

    result
}

fn check_title(
    source: &ExtractedData,
    clone: &ExtractedData,
    issues: &mut Vec<VerificationIssue>,
) -> CheckTally {
    let prefix: String = source.metadata.title.chars().take(TITLE_PREFIX_LEN).collect();
    let ok = clone.metadata.title.contains(&prefix);

    if !ok {
        issues.push(VerificationIssue {
            kind: IssueKind::TitleMismatch,
            severity: Severity::Minor,
            message: format!(
                "clone title '{}' does not contain '{prefix}'",
                clone.metadata.title
            ),
            details: Vec::new(),
        });
    }

    CheckTally {
        passed: usize::from(ok),
        total: 1,
    }
}

/// Lowercased, first `TEXT_KEY_LEN` chars.
fn text_key(content: &str) -> String {
    content.to_lowercase().chars().take(TEXT_KEY_LEN).collect()
}

fn text_prefix(key: &str) -> String {
    key.chars().take(TEXT_PREFIX_LEN).collect()
}

/// Distinct keys in first-seen order.
fn distinct<I: IntoIterator<Item = String>>(items: I) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn check_text(
    source: &ExtractedData,
    clone: &ExtractedData,
    issues: &mut Vec<VerificationIssue>,
) -> CheckTally {
    let source_keys = distinct(source.text_blocks.iter().map(|b| text_key(&b.content)));
    let clone_keys = distinct(clone.text_blocks.iter().map(|b| text_key(&b.content)));
    let clone_prefixes: Vec<String> = clone_keys.iter().map(|k| text_prefix(k)).collect();

    let missing: Vec<String> = source_keys
        .iter()
        .filter(|src| {
            let src_prefix = text_prefix(src);
            !clone_keys
                .iter()
                .zip(&clone_prefixes)
                .any(|(key, key_prefix)| key.contains(&src_prefix) || src.contains(key_prefix))
        })
        .cloned()
        .collect();

    let tally = CheckTally {
        passed: source_keys.len() - missing.len(),
        total: source_keys.len(),
    };

    if tally.ratio() < TEXT_COVERAGE_FLOOR {
        issues.push(coverage_issue(
            IssueKind::MissingText,
            Severity::Critical,
            "text blocks",
            tally,
            missing,
        ));
    }
    tally
}

fn check_images(
    source: &ExtractedData,
    clone: &ExtractedData,
    issues: &mut Vec<VerificationIssue>,
) -> CheckTally {
    let source_srcs = distinct(source.images.iter().map(|i| i.src.clone()));
    let clone_srcs: HashSet<&str> = clone.images.iter().map(|i| i.src.as_str()).collect();
    membership_check(
        source_srcs,
        &clone_srcs,
        IMAGE_COVERAGE_FLOOR,
        IssueKind::MissingImage,
        "images",
        issues,
    )
}

fn check_links(
    source: &ExtractedData,
    clone: &ExtractedData,
    issues: &mut Vec<VerificationIssue>,
) -> CheckTally {
    let non_anchor = |data: &ExtractedData| -> Vec<String> {
        data.links
            .iter()
            .filter(|l| l.link_type != LinkType::Anchor)
            .map(|l| l.href.clone())
            .collect()
    };
    let source_hrefs = distinct(non_anchor(source));
    let clone_list = non_anchor(clone);
    let clone_hrefs: HashSet<&str> = clone_list.iter().map(String::as_str).collect();
    membership_check(
        source_hrefs,
        &clone_hrefs,
        LINK_COVERAGE_FLOOR,
        IssueKind::MissingLink,
        "links",
        issues,
    )
}

/// One check per source item: exact membership in `present`.
fn membership_check(
    expected: Vec<String>,
    present: &HashSet<&str>,
    floor: f64,
    kind: IssueKind,
    noun: &str,
    issues: &mut Vec<VerificationIssue>,
) -> CheckTally {
    let total = expected.len();
    let missing: Vec<String> = expected
        .into_iter()
        .filter(|item| !present.contains(item.as_str()))
        .collect();
    let tally = CheckTally {
        passed: total - missing.len(),
        total,
    };

    if tally.ratio() < floor {
        issues.push(coverage_issue(kind, Severity::Major, noun, tally, missing));
    }
    tally
}

fn coverage_issue(
    kind: IssueKind,
    severity: Severity,
    noun: &str,
    tally: CheckTally,
    mut missing: Vec<String>,
) -> VerificationIssue {
    missing.truncate(MAX_DETAILS);
    VerificationIssue {
        kind,
        severity,
        message: format!(
            "only {}/{} {noun} found ({:.0}%)",
            tally.passed,
            tally.total,
            tally.ratio() * 100.0
        ),
        details: missing,
    }
}

fn suggestions_for(issues: &[VerificationIssue], score: u8, threshold: u8) -> Vec<String> {
    let mut suggestions = Vec::new();
    let fired = |kind: IssueKind| issues.iter().any(|i| i.kind == kind);

    if fired(IssueKind::MissingText) {
        suggestions.push(
            "Copy the missing text blocks verbatim from the source page, starting with headings and list items."
                .to_string(),
        );
    }
    if fired(IssueKind::MissingImage) {
        suggestions.push(
            "Reference the missing images with the same src values the source page uses.".to_string(),
        );
    }
    if fired(IssueKind::MissingLink) {
        suggestions.push(
            "Recreate the missing links with identical href values, external links included."
                .to_string(),
        );
    }
    if fired(IssueKind::TitleMismatch) {
        suggestions.push("Set the page <title> to match the source page title.".to_string());
    }
    if issues.is_empty() && score < threshold {
        suggestions.push(format!(
            "Score {score} is below {threshold}; review the unmatched items in each check category."
        ));
    }

    suggestions
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
