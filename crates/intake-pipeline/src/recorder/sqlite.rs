//! Durable job store in a single SQLite file

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::{document_file_name, document_status, merge_patch, schema, JobStore, StoredJob};
use crate::error::{PipelineError, Result};
use crate::types::JobId;

const SELECT_JOB: &str =
    "SELECT id, file_name, status, created_at, updated_at, document FROM jobs";

/// SQLite-backed job store
pub struct SqliteJobStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    /// Open (or create) the job database at `db_path`
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| {
            PipelineError::initialization(format!(
                "Failed to open job database {}: {}",
                db_path.display(),
                e
            ))
        })?;
        schema::init_schema(&conn)?;
        debug!(path = %db_path.display(), "Opened job database");

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory job store
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            PipelineError::initialization(format!("Failed to create in-memory database: {}", e))
        })?;
        schema::init_schema(&conn)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|e| PipelineError::job_store(format!("Failed to acquire database lock: {}", e)))
    }
}

fn conversion_error<E>(column: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_timestamp(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e))
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<StoredJob> {
    let document = row.get::<_, String>(5)?;

    Ok(StoredJob {
        id: JobId::from_sequence(row.get::<_, i64>(0)?),
        file_name: row.get::<_, String>(1)?,
        status: row.get::<_, String>(2)?,
        created_at: parse_timestamp(3, &row.get::<_, String>(3)?)?,
        updated_at: parse_timestamp(4, &row.get::<_, String>(4)?)?,
        document: serde_json::from_str(&document).map_err(|e| conversion_error(5, e))?,
    })
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(&self, payload: Value) -> Result<JobId> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO jobs (file_name, status, created_at, updated_at, document)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                document_file_name(&payload),
                document_status(&payload),
                now,
                now,
                serde_json::to_string(&payload)?,
            ],
        )?;

        Ok(JobId::from_sequence(conn.last_insert_rowid()))
    }

    async fn update(&self, id: &JobId, patch: Value) -> Result<bool> {
        let Some(seq) = id.sequence() else {
            return Ok(false);
        };

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let current: Option<String> = tx
            .query_row("SELECT document FROM jobs WHERE id = ?1", params![seq], |row| {
                row.get(0)
            })
            .optional()?;
        let Some(current) = current else {
            return Ok(false);
        };

        let mut document: Value = serde_json::from_str(&current)?;
        merge_patch(&mut document, patch);

        tx.execute(
            "UPDATE jobs SET status = ?1, updated_at = ?2, document = ?3 WHERE id = ?4",
            params![
                document_status(&document),
                Utc::now().to_rfc3339(),
                serde_json::to_string(&document)?,
                seq,
            ],
        )?;
        tx.commit()?;

        Ok(true)
    }

    async fn get(&self, id: &JobId) -> Result<Option<StoredJob>> {
        let Some(seq) = id.sequence() else {
            return Ok(None);
        };

        let conn = self.conn()?;
        let job = conn
            .query_row(&format!("{} WHERE id = ?1", SELECT_JOB), params![seq], row_to_job)
            .optional()?;
        Ok(job)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<StoredJob>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY id DESC LIMIT ?1", SELECT_JOB))?;
        let jobs = stmt
            .query_map(params![limit as i64], row_to_job)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(jobs)
    }
}
