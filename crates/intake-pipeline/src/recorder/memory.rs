//! In-process job store

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{document_status, merge_patch, JobStore, StoredJob};
use crate::error::{PipelineError, Result};
use crate::types::JobId;

#[derive(Debug, Default)]
struct MemoryState {
    last_id: i64,
    jobs: BTreeMap<i64, StoredJob>,
}

/// Job store backed by a map; contents are lost on exit
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    state: Mutex<MemoryState>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| PipelineError::job_store(format!("Failed to acquire job store lock: {}", e)))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|state| state.jobs.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, payload: Value) -> Result<JobId> {
        let mut state = self.lock()?;
        state.last_id += 1;
        let seq = state.last_id;
        let id = JobId::from_sequence(seq);
        state.jobs.insert(seq, StoredJob::new(id.clone(), payload, Utc::now()));
        Ok(id)
    }

    async fn update(&self, id: &JobId, patch: Value) -> Result<bool> {
        let mut state = self.lock()?;
        let Some(seq) = id.sequence() else {
            return Ok(false);
        };
        let Some(job) = state.jobs.get_mut(&seq) else {
            return Ok(false);
        };

        merge_patch(&mut job.document, patch);
        job.status = document_status(&job.document);
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn get(&self, id: &JobId) -> Result<Option<StoredJob>> {
        let state = self.lock()?;
        Ok(id.sequence().and_then(|seq| state.jobs.get(&seq)).cloned())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<StoredJob>> {
        let state = self.lock()?;
        Ok(state.jobs.values().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_ids_are_sequential_and_distinct() {
        let store = MemoryJobStore::new();
        let a = store.create(json!({"file_name": "a.csv"})).await.unwrap();
        let b = store.create(json!({"file_name": "b.csv"})).await.unwrap();

        assert_eq!(a.as_str(), "JOB_1");
        assert_eq!(b.as_str(), "JOB_2");
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_update_merges_and_tracks_status() {
        let store = MemoryJobStore::new();
        let id = store
            .create(json!({"file_name": "a.csv", "stage": {"status": "processing"}}))
            .await
            .unwrap();

        assert!(store.update(&id, json!({"stage": {"status": "finished"}})).await.unwrap());

        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.file_name, "a.csv");
        assert_eq!(job.status, "finished");
        assert!(job.updated_at >= job.created_at);
    }

    #[tokio::test]
    async fn test_unknown_id() {
        let store = MemoryJobStore::new();
        assert!(!store.update(&JobId::new("JOB_7"), json!({})).await.unwrap());
        assert!(!store.update(&JobId::new("bogus"), json!({})).await.unwrap());
        assert!(store.get(&JobId::new("JOB_7")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_recent_newest_first() {
        let store = MemoryJobStore::new();
        for name in ["a.csv", "b.csv", "c.csv"] {
            store.create(json!({"file_name": name})).await.unwrap();
        }

        let recent = store.list_recent(2).await.unwrap();
        let names: Vec<&str> = recent.iter().map(|j| j.file_name.as_str()).collect();
        assert_eq!(names, vec!["c.csv", "b.csv"]);
    }
}
