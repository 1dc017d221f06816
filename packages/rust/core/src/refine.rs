//! Lightweight extract → verify loop that does not touch the progress store.
//!
//! The source page is fetched and extracted once; the replica is re-fetched
//! and re-scored each iteration until it passes or the iteration cap is hit.

use std::time::Duration;

use tracing::{info, instrument, warn};

use cloneforge_extract::{VerificationResult, extract_page_data, verify_clone_with};
use cloneforge_shared::{RefineSettings, Result, VerifyConfig};

use crate::fetch::PageSource;

/// Inputs for [`refine`].
#[derive(Debug, Clone)]
pub struct RefineOptions {
    pub source_url: String,
    pub clone_url: String,
    pub max_iterations: u32,
    pub threshold: u8,
    /// Pause between iterations.
    pub interval: Duration,
}

impl RefineOptions {
    /// Options with iteration count, interval and threshold taken from config.
    pub fn from_config(
        source_url: impl Into<String>,
        clone_url: impl Into<String>,
        refine: &RefineSettings,
        verify: &VerifyConfig,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            clone_url: clone_url.into(),
            max_iterations: refine.max_iterations,
            threshold: verify.threshold,
            interval: Duration::from_secs(refine.interval_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefineOutcome {
    pub passed: bool,
    /// Iterations actually run.
    pub iterations: u32,
    /// Score of the last replica that could be fetched.
    pub last: Option<VerificationResult>,
}

/// Callbacks for each iteration.
pub trait RefineReporter: Send + Sync {
    fn iteration(&self, iteration: u32, max: u32, result: &VerificationResult);
    fn fetch_failed(&self, iteration: u32, max: u32, error: &str);
}

/// No-op reporter for headless/test usage.
pub struct SilentRefine;

impl RefineReporter for SilentRefine {
    fn iteration(&self, _iteration: u32, _max: u32, _result: &VerificationResult) {}
    fn fetch_failed(&self, _iteration: u32, _max: u32, _error: &str) {}
}

/// Re-score the replica until it passes or `max_iterations` is reached.
///
/// A replica that cannot be fetched (dev server still starting, say) counts
/// as a failed iteration. Failure to fetch the source is an error.
#[instrument(skip_all, fields(source_url = %opts.source_url, clone_url = %opts.clone_url))]
pub async fn refine<S: PageSource>(
    pages: &S,
    opts: &RefineOptions,
    reporter: &dyn RefineReporter,
) -> Result<RefineOutcome> {
    let source_html = pages.fetch(&opts.source_url).await?;
    let source = extract_page_data(&source_html, &opts.source_url);
    info!(
        text_blocks = source.text_blocks.len(),
        images = source.images.len(),
        links = source.links.len(),
        "source extracted"
    );

    let mut outcome = RefineOutcome {
        passed: false,
        iterations: 0,
        last: None,
    };

    for iteration in 1..=opts.max_iterations {
        outcome.iterations = iteration;

        match pages.fetch(&opts.clone_url).await {
            Ok(html) => {
                let clone = extract_page_data(&html, &opts.clone_url);
                let result = verify_clone_with(&source, &clone, opts.threshold);
                reporter.iteration(iteration, opts.max_iterations, &result);
                info!(iteration, score = result.score, passed = result.passed, "replica scored");

                let passed = result.passed;
                outcome.last = Some(result);
                if passed {
                    outcome.passed = true;
                    return Ok(outcome);
                }
            }
            Err(e) => {
                warn!(iteration, error = %e, "replica fetch failed");
                reporter.fetch_failed(iteration, opts.max_iterations, &e.to_string());
            }
        }

        if iteration < opts.max_iterations && !opts.interval.is_zero() {
            tokio::time::sleep(opts.interval).await;
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use cloneforge_shared::CloneForgeError;

    /// Serves a fixed page per URL; clone responses are consumed in order.
    struct ScriptedPages {
        source: String,
        clones: Mutex<Vec<Option<String>>>,
        fetches: Mutex<HashMap<String, usize>>,
    }

    impl ScriptedPages {
        fn new(source: &str, clones: Vec<Option<&str>>) -> Self {
            Self {
                source: source.into(),
                clones: Mutex::new(clones.into_iter().rev().map(|c| c.map(String::from)).collect()),
                fetches: Mutex::new(HashMap::new()),
            }
        }
    }

    impl PageSource for ScriptedPages {
        async fn fetch(&self, url: &str) -> Result<String> {
            *self.fetches.lock().unwrap().entry(url.to_string()).or_default() += 1;
            if url.contains("source") {
                return Ok(self.source.clone());
            }
            match self.clones.lock().unwrap().pop().flatten() {
                Some(html) => Ok(html),
                None => Err(CloneForgeError::Network(format!("{url}: connection refused"))),
            }
        }
    }

    const PAGE: &str = r#"<html><head><title>Notion - AI Tools</title></head>
        <body><h1>Notion workspace</h1><p>All-in-one workspace for notes and docs.</p>
        <img src="/logo.png" alt="logo"><a href="/pricing">Pricing</a></body></html>"#;
    const BLANK: &str = "<html><head><title>Loading</title></head><body></body></html>";

    fn opts(max_iterations: u32) -> RefineOptions {
        RefineOptions {
            source_url: "https://source.example.com/tools/notion".into(),
            clone_url: "http://localhost:3000/notion".into(),
            max_iterations,
            threshold: 95,
            interval: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn stops_at_first_pass() {
        let pages = ScriptedPages::new(PAGE, vec![Some(BLANK), Some(PAGE), Some(BLANK)]);
        let outcome = refine(&pages, &opts(5), &SilentRefine).await.unwrap();

        assert!(outcome.passed);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.last.unwrap().score, 100);
        assert_eq!(pages.fetches.lock().unwrap()["https://source.example.com/tools/notion"], 1);
    }

    #[tokio::test]
    async fn exhausts_iterations() {
        let pages = ScriptedPages::new(PAGE, vec![None, Some(BLANK), Some(BLANK)]);
        let outcome = refine(&pages, &opts(3), &SilentRefine).await.unwrap();

        assert!(!outcome.passed);
        assert_eq!(outcome.iterations, 3);
        assert!(outcome.last.unwrap().has_critical());
    }

    #[tokio::test]
    async fn source_fetch_failure_is_an_error() {
        struct Down;
        impl PageSource for Down {
            async fn fetch(&self, url: &str) -> Result<String> {
                Err(CloneForgeError::Network(format!("{url}: down")))
            }
        }
        assert!(refine(&Down, &opts(2), &SilentRefine).await.is_err());
    }
}
