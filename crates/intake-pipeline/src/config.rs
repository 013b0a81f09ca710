//! Configuration management
//!
//! Values are resolved in order: built-in defaults, an optional TOML file
//! (`--config` or `INTAKE_CONFIG`), then `INTAKE_*` environment variables.
//! A `.env` file in the working directory is loaded first.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{PipelineError, Result};
use crate::transform::FeedSchema;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Default directory watched for incoming feeds.
pub const DEFAULT_PENDING_DIR: &str = "data/pending";

/// Default directory for successfully processed feeds.
pub const DEFAULT_SUCCESS_DIR: &str = "data/success";

/// Default directory for feeds that failed transformation.
pub const DEFAULT_ERROR_DIR: &str = "data/error";

/// Default location of the SQLite job database.
pub const DEFAULT_STORE_PATH: &str = "data/jobs.db";

/// Default name recorded on every job.
pub const DEFAULT_PROCESS_ID: &str = "intake";

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "INTAKE_CONFIG";

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of this pipeline instance, stored on each job
    pub process_id: String,
    pub directories: DirectoryConfig,
    pub selection: SelectionConfig,
    pub store: StoreConfig,
    pub feed: FeedSchema,
}

/// Watched directories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub pending_dir: PathBuf,
    pub success_dir: PathBuf,
    pub error_dir: PathBuf,
}

/// File selection policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Process the lexicographically last file first
    pub newest_first: bool,
    /// Rename selected files into `.inflight/` before processing
    pub claim: bool,
}

/// Job store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[default]
    Sqlite,
}

impl FromStr for StoreBackend {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => Err(PipelineError::config(format!(
                "Unknown job store '{}', expected memory or sqlite",
                other
            ))),
        }
    }
}

/// Job store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Database file, used by the sqlite backend
    pub path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            process_id: DEFAULT_PROCESS_ID.to_string(),
            directories: DirectoryConfig::default(),
            selection: SelectionConfig::default(),
            store: StoreConfig::default(),
            feed: FeedSchema::default(),
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            pending_dir: PathBuf::from(DEFAULT_PENDING_DIR),
            success_dir: PathBuf::from(DEFAULT_SUCCESS_DIR),
            error_dir: PathBuf::from(DEFAULT_ERROR_DIR),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: PathBuf::from(DEFAULT_STORE_PATH),
        }
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PipelineError::config(format!(
            "{} must be a boolean, got '{}'",
            var, value
        ))),
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env_var(CONFIG_PATH_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML config file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        Ok(toml::from_str(&raw)?)
    }

    /// Apply `INTAKE_*` overrides
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(dir) = env_var("INTAKE_PENDING_DIR") {
            self.directories.pending_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_var("INTAKE_SUCCESS_DIR") {
            self.directories.success_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_var("INTAKE_ERROR_DIR") {
            self.directories.error_dir = PathBuf::from(dir);
        }
        if let Some(value) = env_var("INTAKE_NEWEST_FIRST") {
            self.selection.newest_first = parse_bool("INTAKE_NEWEST_FIRST", &value)?;
        }
        if let Some(value) = env_var("INTAKE_CLAIM") {
            self.selection.claim = parse_bool("INTAKE_CLAIM", &value)?;
        }
        if let Some(value) = env_var("INTAKE_STORE") {
            self.store.backend = value.parse()?;
        }
        if let Some(path) = env_var("INTAKE_STORE_PATH") {
            self.store.path = PathBuf::from(path);
        }
        if let Some(id) = env_var("INTAKE_PROCESS_ID") {
            self.process_id = id;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let dirs = &self.directories;
        let named = [
            ("pending_dir", &dirs.pending_dir),
            ("success_dir", &dirs.success_dir),
            ("error_dir", &dirs.error_dir),
        ];

        for (name, dir) in named {
            if dir.as_os_str().is_empty() {
                return Err(PipelineError::config(format!("{} cannot be empty", name)));
            }
        }

        if dirs.pending_dir == dirs.success_dir
            || dirs.pending_dir == dirs.error_dir
            || dirs.success_dir == dirs.error_dir
        {
            return Err(PipelineError::config(
                "pending_dir, success_dir and error_dir must be distinct",
            ));
        }

        if self.store.backend == StoreBackend::Sqlite && self.store.path.as_os_str().is_empty() {
            return Err(PipelineError::config("store.path is required for the sqlite backend"));
        }

        if self.process_id.trim().is_empty() {
            return Err(PipelineError::config("process_id cannot be empty"));
        }

        self.feed
            .delimiter_byte()
            .map_err(|e| PipelineError::config(e.to_string()))?;

        Ok(())
    }
}
