//! Application configuration for CloneForge.
//!
//! Config is read from `./cloneforge.toml` if present, otherwise from
//! `~/.cloneforge/cloneforge.toml`. CLI flags override config file values,
//! which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CloneForgeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "cloneforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".cloneforge";

// ---------------------------------------------------------------------------
// Config structs (matching cloneforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where the replica project and progress files live.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Shared-resource locations inside the replica project.
    #[serde(default)]
    pub shared: SharedConfig,

    /// Verification thresholds.
    #[serde(default)]
    pub verify: VerifySettings,

    /// Page fetching.
    #[serde(default)]
    pub fetch: FetchSettings,

    /// Standalone refine loop.
    #[serde(default)]
    pub refine: RefineSettings,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the project the replica is generated into.
    #[serde(default = "default_project_root")]
    pub project_root: String,

    /// Directory holding one progress JSON document per page slug.
    #[serde(default = "default_progress_dir")]
    pub progress_dir: String,

    /// Directory receiving timestamped copies of finished runs.
    #[serde(default = "default_archive_dir")]
    pub archive_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            project_root: default_project_root(),
            progress_dir: default_progress_dir(),
            archive_dir: default_archive_dir(),
        }
    }
}

fn default_project_root() -> String {
    ".".into()
}
fn default_progress_dir() -> String {
    ".cloneforge/progress".into()
}
fn default_archive_dir() -> String {
    ".cloneforge/archive".into()
}

/// `[shared]` section. Paths are relative to `project_root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    #[serde(default = "default_components_dir")]
    pub components_dir: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_services_dir")]
    pub services_dir: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            components_dir: default_components_dir(),
            data_dir: default_data_dir(),
            services_dir: default_services_dir(),
        }
    }
}

fn default_components_dir() -> String {
    "components/shared".into()
}
fn default_data_dir() -> String {
    "data/shared".into()
}
fn default_services_dir() -> String {
    "services/shared".into()
}

/// `[verify]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifySettings {
    /// Minimum score (0-100) for a clone to pass.
    #[serde(default = "default_threshold")]
    pub threshold: u8,

    /// Verify-phase attempts before the run is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_threshold() -> u8 {
    95
}
fn default_max_attempts() -> u32 {
    3
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSettings {
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    concat!("CloneForge/", env!("CARGO_PKG_VERSION")).into()
}

/// `[refine]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Seconds to wait between refine attempts.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for RefineSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_max_iterations() -> u32 {
    5
}
fn default_interval_secs() -> u64 {
    10
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime configuration for the dependency resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Root that dependency paths are resolved against.
    pub project_root: PathBuf,
    pub shared_components_dir: String,
    pub shared_data_dir: String,
    pub shared_services_dir: String,
}

impl ResolverConfig {
    /// Resolver config rooted at `project_root` with default shared dirs.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let shared = SharedConfig::default();
        Self {
            project_root: project_root.into(),
            shared_components_dir: shared.components_dir,
            shared_data_dir: shared.data_dir,
            shared_services_dir: shared.services_dir,
        }
    }

    /// All shared directories, in component/data/service order.
    pub fn shared_dirs(&self) -> [&str; 3] {
        [
            &self.shared_components_dir,
            &self.shared_data_dir,
            &self.shared_services_dir,
        ]
    }
}

impl From<&AppConfig> for ResolverConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            project_root: PathBuf::from(&config.paths.project_root),
            shared_components_dir: config.shared.components_dir.clone(),
            shared_data_dir: config.shared.data_dir.clone(),
            shared_services_dir: config.shared.services_dir.clone(),
        }
    }
}

/// Runtime verification policy.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    pub threshold: u8,
    pub max_attempts: u32,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for VerifyConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            threshold: config.verify.threshold,
            max_attempts: config.verify.max_attempts,
        }
    }
}

/// Runtime HTTP fetch configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeout_secs: config.fetch.timeout_secs,
            user_agent: config.fetch.user_agent.clone(),
        }
    }
}

/// Check value ranges the TOML schema cannot express.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.verify.threshold > 100 {
        return Err(CloneForgeError::config(format!(
            "verify.threshold must be within 0..=100, got {}",
            config.verify.threshold
        )));
    }
    if config.verify.max_attempts == 0 {
        return Err(CloneForgeError::config("verify.max_attempts must be at least 1"));
    }
    if config.refine.max_iterations == 0 {
        return Err(CloneForgeError::config("refine.max_iterations must be at least 1"));
    }
    if config.fetch.timeout_secs == 0 {
        return Err(CloneForgeError::config("fetch.timeout_secs must be at least 1"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the user config directory (`~/.cloneforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CloneForgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Resolve the config file to use: project-local first, then the user's.
pub fn config_file_path() -> Result<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Ok(local);
    }
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config. Returns defaults if no file exists.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CloneForgeError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        CloneForgeError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Write a default config file into `dir`. Returns the path to the created file.
pub fn init_config(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| CloneForgeError::io(dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Err(CloneForgeError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| CloneForgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CloneForgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
