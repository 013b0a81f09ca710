//! Error types for the intake pipeline
//!
//! Transformation problems are not errors here: they travel as data inside
//! [`ProcessingSummary`](crate::types::ProcessingSummary). These variants cover
//! the pipeline's own plumbing.

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A dependency (store, directories) is unusable at startup
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// The pending directory could not be scanned or claimed from
    #[error("File selection failed: {0}")]
    Selection(String),

    /// The initial job record could not be written
    #[error("Could not create job record for '{file}': {reason}")]
    JobCreate { file: String, reason: String },

    /// Job store failure
    #[error("Job store error: {0}")]
    JobStore(String),

    #[error("Job database error: {0}")]
    JobDb(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PipelineError {
    pub fn initialization(msg: impl Into<String>) -> Self {
        Self::Initialization(msg.into())
    }

    pub fn selection(msg: impl Into<String>) -> Self {
        Self::Selection(msg.into())
    }

    pub fn job_store(msg: impl Into<String>) -> Self {
        Self::JobStore(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Faults that must reach the caller of `run_once`
    ///
    /// Initialization-class faults abort the invocation. Anything else raised
    /// while a file is in hand is logged and reported on its `RunResult`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Initialization(_)
                | PipelineError::Selection(_)
                | PipelineError::JobCreate { .. }
                | PipelineError::Config(_)
        )
    }
}
