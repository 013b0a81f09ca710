//! Job records
//!
//! Every processing attempt is written to a [`JobStore`] as a JSON document:
//! once when the file is selected (status `processing`) and once more when the
//! attempt ends. The store is a plain document store; [`JobRecorder`] layers
//! the pipeline's typed records and failure policy on top of it.

pub mod memory;
pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::types::{JobId, JobRecord, JobStatus, StageRecord};

pub use memory::MemoryJobStore;
pub use sqlite::SqliteJobStore;

/// A job as held by a store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredJob {
    pub id: JobId,
    pub file_name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub document: Value,
}

impl StoredJob {
    fn new(id: JobId, document: Value, now: DateTime<Utc>) -> Self {
        Self {
            id,
            file_name: document_file_name(&document),
            status: document_status(&document),
            created_at: now,
            updated_at: now,
            document,
        }
    }
}

/// Document store for job records
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Store a new document and assign it a fresh id
    async fn create(&self, payload: Value) -> Result<JobId>;

    /// Deep-merge `patch` into an existing document
    ///
    /// Returns `Ok(false)` when no job has this id.
    async fn update(&self, id: &JobId, patch: Value) -> Result<bool>;

    async fn get(&self, id: &JobId) -> Result<Option<StoredJob>>;

    /// Most recently created jobs first
    async fn list_recent(&self, limit: usize) -> Result<Vec<StoredJob>>;
}

/// Merge `patch` into `target`
///
/// Objects merge key by key, recursively. Any other value replaces what was
/// there; a `null` removes the key.
pub fn merge_patch(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    target.remove(&key);
                } else {
                    merge_patch(target.entry(key).or_insert(Value::Null), value);
                }
            }
        },
        (target, patch) => *target = patch,
    }
}

fn document_file_name(document: &Value) -> String {
    document
        .get("file_name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn document_status(document: &Value) -> String {
    document
        .pointer("/stage/status")
        .and_then(Value::as_str)
        .unwrap_or(JobStatus::Processing.as_str())
        .to_string()
}

/// Typed front for a [`JobStore`]
///
/// Creation failures are surfaced, since nothing can be audited without a
/// job. Update failures are logged and reported as `false`.
#[derive(Clone)]
pub struct JobRecorder {
    store: Arc<dyn JobStore>,
}

impl JobRecorder {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub async fn create(&self, record: &JobRecord) -> Result<JobId> {
        let job_create = |reason: String| PipelineError::JobCreate {
            file: record.file_name.clone(),
            reason,
        };

        let payload = serde_json::to_value(record).map_err(|e| job_create(e.to_string()))?;
        let id = self
            .store
            .create(payload)
            .await
            .map_err(|e| job_create(e.to_string()))?;

        info!(
            job_id = %id,
            file = %record.file_name,
            status = %record.stage.status,
            "Created job"
        );
        Ok(id)
    }

    /// Merge a raw patch into the job
    pub async fn update(&self, id: &JobId, patch: Value) -> bool {
        match self.store.update(id, patch).await {
            Ok(true) => {
                info!(job_id = %id, "Updated job");
                true
            },
            Ok(false) => {
                warn!(job_id = %id, "Update for unknown job ignored");
                false
            },
            Err(e) => {
                warn!(job_id = %id, error = %e, "Job update failed");
                false
            },
        }
    }

    /// Replace the stage slot with its terminal state
    pub async fn finish(&self, id: &JobId, stage: &StageRecord) -> bool {
        let patch = match serde_json::to_value(stage) {
            Ok(stage) => json!({ "stage": stage }),
            Err(e) => {
                warn!(job_id = %id, error = %e, "Cannot serialize job stage");
                return false;
            },
        };
        info!(job_id = %id, status = %stage.status, "Recording job outcome");
        self.update(id, patch).await
    }

    /// Best-effort terminal update for an attempt that ended in a fault
    pub async fn record_failure(&self, id: &JobId, message: &str) -> bool {
        let patch = json!({
            "stage": {
                "status": JobStatus::Error,
                "failure": message,
            }
        });
        self.update(id, patch).await
    }
}
