//! Intake Pipeline Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Single-file intake for delimited data feeds. Each invocation picks one file
//! from a pending directory, validates it, moves it to a success or error
//! directory and records the attempt as a job.
//!
//! # Overview
//!
//! - **Selection**: oldest (or newest) file by name, optionally claimed ([`selector`])
//! - **Transformation**: CSV feed validation into a summary ([`transform`])
//! - **Relocation**: tagged move outcomes ([`relocator`])
//! - **Metrics**: elapsed time, valid-record percentage, throughput ([`metrics`])
//! - **Job records**: memory or SQLite document store ([`recorder`])
//! - **Orchestration**: the `run_once` state machine ([`orchestrator`])
//!
//! # Example
//!
//! ```no_run
//! use intake_pipeline::config::Config;
//! use intake_pipeline::{PipelineContext, PipelineOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let orchestrator = PipelineOrchestrator::new(PipelineContext::from_config(&config)?);
//!     if let Some(result) = orchestrator.run_once().await? {
//!         println!("{}", serde_json::to_string_pretty(&result)?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod queue;
pub mod recorder;
pub mod relocator;
pub mod selector;
pub mod transform;
pub mod types;

// Re-export commonly used types
pub use context::{PipelineContext, WatchDirs};
pub use error::{PipelineError, Result};
pub use orchestrator::{PipelineOrchestrator, PipelineState};
pub use types::{JobId, PendingFile, ProcessingSummary, RunResult};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use config::Config;

/// Intake - single-file feed pipeline
#[derive(Parser, Debug)]
#[command(name = "intake")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML configuration file (also read from INTAKE_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory watched for incoming feeds
    #[arg(long, global = true)]
    pub pending_dir: Option<PathBuf>,

    /// Directory for processed feeds
    #[arg(long, global = true)]
    pub success_dir: Option<PathBuf>,

    /// Directory for feeds that failed
    #[arg(long, global = true)]
    pub error_dir: Option<PathBuf>,

    /// Take the lexicographically last file first
    #[arg(long, global = true)]
    pub newest_first: bool,

    /// Print the CLI reference as Markdown
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process a single pending file
    Run,

    /// Process pending files one at a time until the queue is empty
    Drain {
        /// Stop after this many files
        #[arg(short, long)]
        max: Option<usize>,
    },

    /// Inspect recorded jobs
    Jobs {
        #[command(subcommand)]
        command: JobsCommand,
    },
}

/// Job inspection subcommands
#[derive(Subcommand, Debug)]
pub enum JobsCommand {
    /// List recent jobs
    List {
        /// Limit number of jobs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show a job document
    Show {
        /// Job id, e.g. JOB_12
        id: String,
    },
}

impl Cli {
    /// Resolve configuration, letting command-line flags win
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        if let Some(ref dir) = self.pending_dir {
            config.directories.pending_dir = dir.clone();
        }
        if let Some(ref dir) = self.success_dir {
            config.directories.success_dir = dir.clone();
        }
        if let Some(ref dir) = self.error_dir {
            config.directories.error_dir = dir.clone();
        }
        if self.newest_first {
            config.selection.newest_first = true;
        }

        config.validate()?;
        Ok(config)
    }
}
