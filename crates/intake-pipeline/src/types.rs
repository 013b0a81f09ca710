//! Core types for the intake pipeline
//!
//! These are the documents that flow between the pipeline stages: the file
//! picked from the pending directory, the transformer's summary, the derived
//! timing metrics and the job record persisted for audit.

use chrono::{DateTime, Utc};
use intake_common::checksum::FileDigest;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::relocator::RelocationOutcome;

/// A file waiting in (or claimed from) the pending directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFile {
    /// Bare file name, e.g. `feed1.csv`
    pub name: String,
    /// Current location of the file
    pub full_path: PathBuf,
}

impl PendingFile {
    pub fn new(dir: impl AsRef<Path>, name: impl Into<String>) -> Self {
        let name = name.into();
        let full_path = dir.as_ref().join(&name);
        Self { name, full_path }
    }

    /// Directory the file currently lives in
    pub fn dir(&self) -> &Path {
        self.full_path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Outcome flag attached to a summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Fail,
    Ok,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Fail => "FAIL",
            ErrorKind::Ok => "OK",
        }
    }
}

/// Structured error reported by a transformer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Aggregate counts for one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    /// Data rows read from the file
    pub raw_lines: u64,
    /// Rows that passed validation
    pub records_ok: u64,
    /// Business transactions found; `None` when the transformer cannot tell
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<u64>,
}

/// A rejected row, kept for operator follow-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// 1-based line number in the file (header is line 1)
    pub line: u64,
    pub reason: String,
}

/// What a transformer found in one file
///
/// Produced once per file and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSummary {
    pub totals: Totals,
    /// Classification of the feed, e.g. the site that produced it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProcessingError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejections: Vec<Rejection>,
}

impl ProcessingSummary {
    /// Summary of a file that was processed
    pub fn ok(totals: Totals) -> Self {
        Self {
            totals,
            ..Default::default()
        }
    }

    /// Zero-filled summary of a file the transformer could not process
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            totals: Totals {
                raw_lines: 0,
                records_ok: 0,
                transactions: Some(0),
            },
            tag: None,
            error: Some(ProcessingError {
                kind: ErrorKind::Fail,
                message: message.into(),
            }),
            rejections: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_rejections(mut self, rejections: Vec<Rejection>) -> Self {
        self.rejections = rejections;
        self
    }

    /// Whether the file must be routed to the error directory
    pub fn is_failure(&self) -> bool {
        matches!(
            self.error,
            Some(ProcessingError {
                kind: ErrorKind::Fail,
                ..
            })
        )
    }

    /// Split into the classification tag and the nested result sections
    pub fn into_result_document(self) -> (Option<String>, ResultDocument) {
        let document = ResultDocument {
            totals: self.totals,
            error: self.error,
            rejections: self.rejections,
        };
        (self.tag, document)
    }
}

/// Nested sections of a summary, returned to the caller and kept on the job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultDocument {
    pub totals: Totals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProcessingError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejections: Vec<Rejection>,
}

/// Timing and throughput derived from a summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingMetrics {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub elapsed_millis: i64,
    pub elapsed_secs: f64,
    pub valid_record_percent: f64,
    pub throughput_per_sec: f64,
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Finished,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Finished => "finished",
            JobStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifier assigned by a job store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id derived from a store sequence number
    pub fn from_sequence(seq: i64) -> Self {
        Self(format!("JOB_{}", seq))
    }

    /// Sequence number for ids produced by [`JobId::from_sequence`]
    pub fn sequence(&self) -> Option<i64> {
        self.0.strip_prefix("JOB_")?.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stage-specific slot of a job record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub start_time: DateTime<Utc>,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ResultDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<TimingMetrics>,
    /// Where the file ended up, if it was moved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
    /// Pipeline fault that ended the attempt early
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Audit document describing one processing attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Name of the pipeline instance that ran the attempt
    pub process_id: String,
    pub file_name: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<FileDigest>,
    pub stage: StageRecord,
}

impl JobRecord {
    /// Initial record written before the transformer runs
    pub fn started(
        process_id: impl Into<String>,
        file_name: impl Into<String>,
        started_at: DateTime<Utc>,
        input: Option<FileDigest>,
    ) -> Self {
        Self {
            process_id: process_id.into(),
            file_name: file_name.into(),
            started_at,
            input,
            stage: StageRecord {
                start_time: started_at,
                status: JobStatus::Processing,
                tag: None,
                summary: None,
                metrics: None,
                destination: None,
                failure: None,
            },
        }
    }
}

/// What `run_once` hands back to its caller when a file was handled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    /// Nested result sections; absent when the attempt failed before metrics
    pub result: Option<ResultDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// How the file left the pending directory, if it got that far
    #[serde(skip)]
    pub relocation: Option<RelocationOutcome>,
}

impl RunResult {
    /// True when the file may still be waiting to be picked again
    pub fn left_in_place(&self) -> bool {
        !self
            .relocation
            .as_ref()
            .is_some_and(RelocationOutcome::is_settled)
    }
}
