//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use url::Url;

use cloneforge_core::{
    HttpPageSource, Orchestrator, PageSource, PhaseInputs, PhaseOutcome, PhaseResult,
    PipelineConfig, ProgressReporter, synopsis,
};
use cloneforge_progress::{ProgressStore, slugify};
use cloneforge_shared::{
    AppConfig, FetchConfig, Phase, RunStatus, config_dir, init_config, load_config,
};
use cloneforge_snapshot::AnalyzeOptions;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// CloneForge: clone a live page into a scaffolded replica.
#[derive(Parser)]
#[command(
    name = "cloneforge",
    version,
    about = "Clone a web page into a scaffolded replica through five resumable phases.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Create or resume a run and execute phases from the resume point.
    Run {
        /// Source page URL.
        url: String,

        /// Page identifier (defaults to the last URL path segment).
        #[arg(short, long)]
        slug: Option<String>,

        /// Discard any existing run for this slug and start over.
        #[arg(long)]
        fresh: bool,

        /// Archive the record once every phase has completed.
        #[arg(long)]
        archive: bool,

        #[command(flatten)]
        inputs: InputArgs,
    },

    /// Run a single phase of an existing run.
    Phase {
        /// Phase name: analyze, extract, plan, implement or verify.
        name: Phase,

        /// Page identifier.
        #[arg(short, long)]
        slug: String,

        /// Source URL; starts a run when none exists for the slug.
        #[arg(long)]
        url: Option<String>,

        #[command(flatten)]
        inputs: InputArgs,
    },

    /// Print the synopsis of a run.
    Status {
        #[arg(short, long)]
        slug: String,
    },

    /// Move a run's record to the archive directory.
    Archive {
        #[arg(short, long)]
        slug: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Phase inputs shared by `run` and `phase`.
#[derive(Args, Default)]
pub(crate) struct InputArgs {
    /// Accessibility snapshot of the source page (analyze).
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Raw page source scanned for responsive breakpoints.
    #[arg(long)]
    raw_source: Option<PathBuf>,

    /// Explicit breakpoints in pixels, comma-separated.
    #[arg(long, value_delimiter = ',')]
    breakpoints: Vec<u32>,

    /// Source page markup (extract). Fetched from the URL when omitted.
    #[arg(long)]
    html: Option<PathBuf>,

    /// Replica markup (verify).
    #[arg(long, conflicts_with = "clone_url")]
    clone_html: Option<PathBuf>,

    /// URL serving the replica (verify); fetched before each verification.
    #[arg(long)]
    clone_url: Option<String>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a default cloneforge.toml.
    Init {
        /// Write to ~/.cloneforge instead of the current directory.
        #[arg(long)]
        global: bool,
    },
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "cloneforge=info",
        1 => "cloneforge=debug",
        _ => "cloneforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            url,
            slug,
            fresh,
            archive,
            inputs,
        } => cmd_run(&url, slug.as_deref(), fresh, archive, &inputs).await,
        Command::Phase {
            name,
            slug,
            url,
            inputs,
        } => cmd_phase(name, &slug, url.as_deref(), &inputs).await,
        Command::Status { slug } => cmd_status(&slug),
        Command::Archive { slug } => cmd_archive(&slug),
        Command::Config { action } => match action {
            ConfigAction::Init { global } => cmd_config_init(global),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

fn store(config: &AppConfig) -> ProgressStore {
    ProgressStore::new(&config.paths.progress_dir, &config.paths.archive_dir)
}

/// Last non-empty path segment of `url`, else its host.
fn default_slug(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;
    let segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(String::from)
        .or_else(|| parsed.host_str().map(String::from))
        .unwrap_or_default();
    let slug = slugify(&segment);
    if slug.is_empty() {
        return Err(eyre!("cannot derive a slug from '{url}', pass --slug"));
    }
    Ok(slug)
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))
}

// ---------------------------------------------------------------------------
// Phase execution
// ---------------------------------------------------------------------------

/// Lazily materializes phase inputs: files are read once, URLs fetched only
/// when the phase that needs them is about to run.
struct InputLoader<'a> {
    args: &'a InputArgs,
    source_url: String,
    fetcher: HttpPageSource,
    inputs: PhaseInputs,
}

impl<'a> InputLoader<'a> {
    fn new(args: &'a InputArgs, source_url: String, fetch: &FetchConfig) -> Result<Self> {
        let analyze = AnalyzeOptions {
            raw_source: args.raw_source.as_deref().map(read_file).transpose()?,
            breakpoints: (!args.breakpoints.is_empty()).then(|| args.breakpoints.clone()),
        };
        Ok(Self {
            args,
            source_url,
            fetcher: HttpPageSource::new(fetch)?,
            inputs: PhaseInputs {
                analyze,
                clone_url: args.clone_url.clone(),
                ..Default::default()
            },
        })
    }

    async fn prepare(&mut self, phase: Phase) -> Result<&PhaseInputs> {
        match phase {
            Phase::Analyze if self.inputs.snapshot.is_none() => {
                self.inputs.snapshot = self.args.snapshot.as_deref().map(read_file).transpose()?;
            }
            Phase::Extract if self.inputs.html.is_none() => {
                self.inputs.html = Some(match &self.args.html {
                    Some(path) => read_file(path)?,
                    None => {
                        info!(url = %self.source_url, "fetching source page");
                        self.fetcher.fetch(&self.source_url).await?
                    }
                });
            }
            Phase::Verify => {
                if let Some(path) = &self.args.clone_html {
                    self.inputs.clone_html = Some(read_file(path)?);
                } else if let Some(url) = &self.args.clone_url {
                    info!(%url, "fetching replica");
                    self.inputs.clone_html = Some(self.fetcher.fetch(url).await?);
                }
            }
            _ => {}
        }
        Ok(&self.inputs)
    }
}

async fn cmd_run(
    url: &str,
    slug: Option<&str>,
    fresh: bool,
    archive: bool,
    args: &InputArgs,
) -> Result<()> {
    let config = load_config()?;
    let slug = match slug {
        Some(s) => s.to_string(),
        None => default_slug(url)?,
    };
    let pipeline = PipelineConfig::from(&config);

    let mut orchestrator = if fresh {
        Orchestrator::start(store(&config), &pipeline, url, &slug)?
    } else {
        Orchestrator::open(store(&config), &pipeline, url, &slug)?
    };
    orchestrator = orchestrator.with_progress(Box::new(CliProgress::new()));

    let source_url = orchestrator.record()?.source_url;
    info!(%slug, %source_url, "running clone pipeline");
    let mut loader = InputLoader::new(args, source_url, &FetchConfig::from(&config))?;

    let mut last = None;
    while let Some(phase) = orchestrator.record()?.next_phase() {
        let inputs = loader.prepare(phase).await?;
        let result = orchestrator.run_phase(phase, inputs)?;
        print_result(&result);
        let stop = !result.is_success();
        last = Some(result);
        if stop {
            break;
        }
    }

    println!();
    print!("{}", orchestrator.complete()?);

    let record = orchestrator.record()?;
    if record.status == RunStatus::Completed && archive {
        let path = orchestrator.archive()?;
        println!("Archived to {}", path.display());
    }

    match last {
        Some(result) if result.status == PhaseOutcome::Failed => Err(eyre!(
            "{} failed: {}",
            result.phase,
            result.errors.join("; ")
        )),
        _ => Ok(()),
    }
}

async fn cmd_phase(phase: Phase, slug: &str, url: Option<&str>, args: &InputArgs) -> Result<()> {
    let config = load_config()?;
    let pipeline = PipelineConfig::from(&config);

    let orchestrator = match url {
        Some(url) => Orchestrator::open(store(&config), &pipeline, url, slug)?,
        None => Orchestrator::resume(store(&config), &pipeline, slug)
            .wrap_err_with(|| format!("no run for '{slug}'; pass --url to start one"))?,
    };
    let mut orchestrator = orchestrator.with_progress(Box::new(CliProgress::new()));

    let source_url = orchestrator.record()?.source_url;
    let mut loader = InputLoader::new(args, source_url, &FetchConfig::from(&config))?;
    let inputs = loader.prepare(phase).await?;
    let result = orchestrator.run_phase(phase, inputs)?;

    print_result(&result);
    if let Some(data) = &result.data {
        println!("{}", serde_json::to_string_pretty(data)?);
    }
    match result.status {
        PhaseOutcome::Failed => Err(eyre!("{phase} failed: {}", result.errors.join("; "))),
        _ => Ok(()),
    }
}

fn print_result(result: &PhaseResult) {
    let mark = match result.status {
        PhaseOutcome::Success => "✓",
        PhaseOutcome::NeedsRetry => "↻",
        PhaseOutcome::Failed => "✗",
    };
    println!("  {mark} {:<10}", result.phase.as_str());
    for error in &result.errors {
        println!("      {error}");
    }
}

fn cmd_status(slug: &str) -> Result<()> {
    let config = load_config()?;
    match store(&config).read(slug)? {
        Some(record) => print!("{}", synopsis(&record)),
        None => println!("No active run for '{slug}'."),
    }
    Ok(())
}

fn cmd_archive(slug: &str) -> Result<()> {
    let config = load_config()?;
    let path = store(&config).archive(slug)?;
    println!("Archived '{slug}' to {}", path.display());
    Ok(())
}

fn cmd_config_init(global: bool) -> Result<()> {
    let dir = if global {
        config_dir()?
    } else {
        std::env::current_dir().wrap_err("cannot determine working directory")?
    };
    let path = init_config(&dir)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase_started(&self, phase: Phase) {
        self.spinner.reset();
        self.spinner
            .enable_steady_tick(std::time::Duration::from_millis(80));
        self.spinner.set_message(format!("Running {phase}"));
    }

    fn phase_finished(&self, _result: &PhaseResult) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_from_url() {
        assert_eq!(default_slug("https://tools.example.com/tools/notion").unwrap(), "notion");
        assert_eq!(default_slug("https://tools.example.com/tools/notion/").unwrap(), "notion");
        assert_eq!(default_slug("https://tools.example.com/").unwrap(), "tools-example-com");
        assert!(default_slug("not a url").is_err());
    }

    #[test]
    fn cli_parses_run() {
        let cli = Cli::try_parse_from([
            "cloneforge",
            "run",
            "https://x.com/p",
            "--snapshot",
            "snap.txt",
            "--breakpoints",
            "640,1024",
            "--clone-url",
            "http://localhost:3000/p",
        ])
        .unwrap();
        let Command::Run { inputs, slug, .. } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(slug, None);
        assert_eq!(inputs.breakpoints, [640, 1024]);
        assert_eq!(inputs.clone_url.as_deref(), Some("http://localhost:3000/p"));
    }

    #[test]
    fn cli_rejects_both_clone_sources() {
        assert!(
            Cli::try_parse_from([
                "cloneforge",
                "phase",
                "verify",
                "--slug",
                "p",
                "--clone-html",
                "a.html",
                "--clone-url",
                "http://localhost:3000/p",
            ])
            .is_err()
        );
    }

    #[test]
    fn cli_parses_phase_names() {
        let cli = Cli::try_parse_from(["cloneforge", "phase", "plan", "--slug", "p"]).unwrap();
        assert!(matches!(cli.command, Command::Phase { name: Phase::Plan, .. }));
        assert!(Cli::try_parse_from(["cloneforge", "phase", "deploy", "--slug", "p"]).is_err());
    }
}
