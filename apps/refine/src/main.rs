//! clone-refine: re-score a running replica against its source page until
//! it passes or the iteration cap is reached.
//!
//! Exit codes: 0 passed (or help/version), 1 usage error, 2 not passed,
//! 3 runtime error (config, network, runtime startup).

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::info;

use cloneforge_core::{HttpPageSource, RefineOptions, RefineReporter, refine};
use cloneforge_extract::VerificationResult;
use cloneforge_progress::slugify;
use cloneforge_shared::{FetchConfig, VerifyConfig, load_config};

const EXIT_USAGE: u8 = 1;
const EXIT_NOT_PASSED: u8 = 2;
const EXIT_RUNTIME: u8 = 3;

/// Re-score a replica against its source until it passes.
#[derive(Parser, Debug)]
#[command(name = "clone-refine", version, long_about = None)]
struct Args {
    /// Source page URL.
    url: String,

    /// Feature name, used for the default slug.
    feature_name: String,

    /// Page slug (defaults to the slugified feature name).
    #[arg(long)]
    slug: Option<String>,

    /// Replica URL (defaults to http://localhost:3000/<slug>).
    #[arg(long)]
    clone_url: Option<String>,

    /// Maximum verification rounds.
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Passing score, 0-100.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    threshold: Option<u8>,

    /// Seconds to wait between rounds.
    #[arg(long)]
    interval: Option<u64>,

    /// Print every issue and suggestion.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn slug(&self) -> String {
        self.slug.clone().unwrap_or_else(|| slugify(&self.feature_name))
    }

    fn clone_url(&self) -> String {
        self.clone_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:3000/{}", self.slug()))
    }
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(e) = color_eyre::install() {
        eprintln!("{e}");
    }
    init_tracing(args.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            return ExitCode::from(EXIT_RUNTIME);
        }
    };

    let outcome = runtime.block_on(run(&args));
    if let Err(e) = &outcome {
        eprintln!("Error: {e:?}");
    }
    ExitCode::from(exit_code(&outcome))
}

fn exit_code(outcome: &Result<bool>) -> u8 {
    match outcome {
        Ok(true) => 0,
        Ok(false) => EXIT_NOT_PASSED,
        Err(_) => EXIT_RUNTIME,
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = if verbose {
        "cloneforge=debug,clone_refine=debug"
    } else {
        "cloneforge=warn,clone_refine=warn"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Returns whether the replica passed.
async fn run(args: &Args) -> Result<bool> {
    let config = load_config()?;
    let mut opts = RefineOptions::from_config(
        &args.url,
        args.clone_url(),
        &config.refine,
        &VerifyConfig::from(&config),
    );
    if let Some(max) = args.max_iterations {
        opts.max_iterations = max;
    }
    if let Some(threshold) = args.threshold {
        opts.threshold = threshold;
    }
    if let Some(secs) = args.interval {
        opts.interval = Duration::from_secs(secs);
    }

    println!("Refining '{}' ({})", args.feature_name, args.slug());
    println!("  source: {}", opts.source_url);
    println!("  clone:  {}", opts.clone_url);
    println!(
        "  up to {} iterations, threshold {}",
        opts.max_iterations, opts.threshold
    );
    info!(slug = %args.slug(), "refine loop starting");

    let pages = HttpPageSource::new(&FetchConfig::from(&config))?;
    let reporter = ConsoleReporter {
        verbose: args.verbose,
    };
    let outcome = refine(&pages, &opts, &reporter).await?;

    println!();
    if outcome.passed {
        println!("PASSED after {} iteration(s).", outcome.iterations);
    } else {
        let score = outcome
            .last
            .as_ref()
            .map_or_else(|| "n/a".to_string(), |r| r.score.to_string());
        println!(
            "NOT PASSED after {} iteration(s); last score {score}.",
            outcome.iterations
        );
        if let Some(last) = &outcome.last {
            for suggestion in &last.suggestions {
                println!("  - {suggestion}");
            }
        }
    }
    Ok(outcome.passed)
}

struct ConsoleReporter {
    verbose: bool,
}

impl RefineReporter for ConsoleReporter {
    fn iteration(&self, iteration: u32, max: u32, result: &VerificationResult) {
        let verdict = if result.passed { "pass" } else { "fail" };
        println!(
            "[{iteration}/{max}] score {:>3} {verdict} ({} issues)",
            result.score,
            result.issues.len()
        );
        if self.verbose {
            for issue in &result.issues {
                println!("    {:?} {:?}: {}", issue.severity, issue.kind, issue.message);
                for detail in &issue.details {
                    println!("      · {detail}");
                }
            }
            for suggestion in &result.suggestions {
                println!("    → {suggestion}");
            }
        }
    }

    fn fetch_failed(&self, iteration: u32, max: u32, error: &str) {
        println!("[{iteration}/{max}] replica unavailable: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_derive_from_feature_name() {
        let args = Args::try_parse_from(["clone-refine", "https://x.com/tools/a", "Tool Detail"]).unwrap();
        assert_eq!(args.slug(), "tool-detail");
        assert_eq!(args.clone_url(), "http://localhost:3000/tool-detail");
        assert_eq!(args.max_iterations, None);
    }

    #[test]
    fn flags_override() {
        let args = Args::try_parse_from([
            "clone-refine",
            "https://x.com/tools/a",
            "Tool Detail",
            "--slug",
            "tool",
            "--max-iterations",
            "3",
            "--threshold",
            "90",
            "--verbose",
        ])
        .unwrap();
        assert_eq!(args.clone_url(), "http://localhost:3000/tool");
        assert_eq!(args.max_iterations, Some(3));
        assert_eq!(args.threshold, Some(90));
        assert!(args.verbose);
    }

    #[test]
    fn usage_errors_use_stderr_and_help_does_not() {
        let missing = Args::try_parse_from(["clone-refine", "https://x.com"]).unwrap_err();
        assert!(missing.use_stderr());

        let bad = Args::try_parse_from(["clone-refine", "u", "f", "--threshold", "101"]).unwrap_err();
        assert!(bad.use_stderr());

        let help = Args::try_parse_from(["clone-refine", "--help"]).unwrap_err();
        assert!(!help.use_stderr());
    }

    #[test]
    fn runtime_errors_are_distinct_from_usage_errors() {
        assert_eq!(exit_code(&Ok(true)), 0);
        assert_eq!(exit_code(&Ok(false)), EXIT_NOT_PASSED);
        let failed: Result<bool> = Err(color_eyre::eyre::eyre!("source unreachable"));
        assert_eq!(exit_code(&failed), EXIT_RUNTIME);
        assert_ne!(EXIT_RUNTIME, EXIT_USAGE);
        assert_ne!(EXIT_RUNTIME, EXIT_NOT_PASSED);
    }
}
