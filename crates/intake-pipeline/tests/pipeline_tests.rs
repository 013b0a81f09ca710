//! End-to-end tests for `run_once`
//!
//! These tests drive the orchestrator against real temporary directories with
//! fake transformers and job stores to cover:
//! - Success and failure routing
//! - Empty and missing pending directories
//! - Transformer panics and vanished files
//! - Job store faults (fatal on create, downgraded on update)
//! - Faults outside the transformer and unroutable files
//! - Claim-on-select cleanup

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use intake_pipeline::metrics::{Clock, MetricsComputer, StandardMetrics};
use intake_pipeline::recorder::{JobStore, MemoryJobStore, SqliteJobStore, StoredJob};
use intake_pipeline::relocator::{FileRelocator, RelocationOutcome};
use intake_pipeline::selector::{inflight_dir, DirectorySelector};
use intake_pipeline::transform::{Check, ColumnRule, CsvFeedTransformer, FeedSchema, Transformer};
use intake_pipeline::types::{TimingMetrics, Totals};
use intake_pipeline::{
    JobId, PendingFile, PipelineContext, PipelineError, PipelineOrchestrator, ProcessingSummary,
    WatchDirs,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Fakes
// ============================================================================

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Returns the same summary for every file
struct FixedTransformer(ProcessingSummary);

#[async_trait]
impl Transformer for FixedTransformer {
    async fn transform(&self, _file: &PendingFile, _job_id: &JobId) -> ProcessingSummary {
        self.0.clone()
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

struct PanickingTransformer;

#[async_trait]
impl Transformer for PanickingTransformer {
    async fn transform(&self, _file: &PendingFile, _job_id: &JobId) -> ProcessingSummary {
        panic!("column index out of range")
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

/// Deletes the file it was given, as if an operator removed it mid-run
struct VanishingTransformer;

#[async_trait]
impl Transformer for VanishingTransformer {
    async fn transform(&self, file: &PendingFile, _job_id: &JobId) -> ProcessingSummary {
        tokio::fs::remove_file(&file.full_path).await.unwrap();
        ProcessingSummary::ok(Totals {
            raw_lines: 1,
            records_ok: 1,
            transactions: Some(1),
        })
    }

    fn name(&self) -> &str {
        "vanishing"
    }
}

/// Computer whose clock works but whose arithmetic blows up
struct PanickingMetrics;

impl MetricsComputer for PanickingMetrics {
    fn compute(&self, _start_time: DateTime<Utc>, _summary: &ProcessingSummary) -> TimingMetrics {
        panic!("metrics boom")
    }

    fn now(&self) -> DateTime<Utc> {
        fixed_now()
    }
}

struct PanickingRelocator;

#[async_trait]
impl FileRelocator for PanickingRelocator {
    async fn relocate(
        &self,
        _file_name: &str,
        _from_dir: &Path,
        _to_dir: &Path,
    ) -> RelocationOutcome {
        panic!("disk controller reset")
    }
}

/// Store that refuses to create jobs
struct OfflineStore;

#[async_trait]
impl JobStore for OfflineStore {
    async fn create(&self, _payload: Value) -> intake_pipeline::Result<JobId> {
        Err(PipelineError::job_store("connection refused"))
    }

    async fn update(&self, _id: &JobId, _patch: Value) -> intake_pipeline::Result<bool> {
        Err(PipelineError::job_store("connection refused"))
    }

    async fn get(&self, _id: &JobId) -> intake_pipeline::Result<Option<StoredJob>> {
        Ok(None)
    }

    async fn list_recent(&self, _limit: usize) -> intake_pipeline::Result<Vec<StoredJob>> {
        Ok(Vec::new())
    }
}

/// Store that creates jobs but fails every update
struct ReadOnlyAfterCreate(MemoryJobStore);

#[async_trait]
impl JobStore for ReadOnlyAfterCreate {
    async fn create(&self, payload: Value) -> intake_pipeline::Result<JobId> {
        self.0.create(payload).await
    }

    async fn update(&self, _id: &JobId, _patch: Value) -> intake_pipeline::Result<bool> {
        Err(PipelineError::job_store("database is locked"))
    }

    async fn get(&self, id: &JobId) -> intake_pipeline::Result<Option<StoredJob>> {
        self.0.get(id).await
    }

    async fn list_recent(&self, limit: usize) -> intake_pipeline::Result<Vec<StoredJob>> {
        self.0.list_recent(limit).await
    }
}

// ============================================================================
// Helpers
// ============================================================================

struct Workspace {
    _root: TempDir,
    dirs: WatchDirs,
}

impl Workspace {
    fn new(files: &[&str]) -> Self {
        let root = tempfile::tempdir().unwrap();
        let dirs = WatchDirs::new(
            root.path().join("pending"),
            root.path().join("success"),
            root.path().join("error"),
        );
        std::fs::create_dir(&dirs.pending_dir).unwrap();
        for name in files {
            std::fs::write(dirs.pending_dir.join(name), b"order_id,total_amount\n1,10\n").unwrap();
        }
        Self { _root: root, dirs }
    }

    fn pending(&self, name: &str) -> PathBuf {
        self.dirs.pending_dir.join(name)
    }

    fn success(&self, name: &str) -> PathBuf {
        self.dirs.success_dir.join(name)
    }

    fn error(&self, name: &str) -> PathBuf {
        self.dirs.error_dir.join(name)
    }
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn context(
    ws: &Workspace,
    transformer: Arc<dyn Transformer>,
    store: Arc<dyn JobStore>,
) -> PipelineContext {
    PipelineContext::new(ws.dirs.clone(), transformer, store)
        .with_metrics(Arc::new(StandardMetrics::with_clock(FixedClock(fixed_now()))))
        .with_process_id("intake-test")
}

fn summary(raw_lines: u64, records_ok: u64, transactions: u64) -> ProcessingSummary {
    ProcessingSummary::ok(Totals {
        raw_lines,
        records_ok,
        transactions: Some(transactions),
    })
}

async fn stored(store: &dyn JobStore, id: &JobId) -> StoredJob {
    store.get(id).await.unwrap().expect("job should exist")
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn test_successful_feed_goes_to_success_dir() {
    let ws = Workspace::new(&["feed1.csv"]);
    let store = Arc::new(MemoryJobStore::new());
    let transformer = Arc::new(FixedTransformer(summary(100, 95, 95).with_tag("Site_A")));
    let orchestrator = PipelineOrchestrator::new(context(&ws, transformer, store.clone()));

    let result = orchestrator.run_once().await.unwrap().expect("a file was pending");

    assert_eq!(result.file_name, "feed1.csv");
    assert!(result.failure.is_none());
    assert!(!ws.pending("feed1.csv").exists());
    assert!(ws.success("feed1.csv").exists());
    assert!(!ws.error("feed1.csv").exists());

    let document = result.result.expect("result document");
    assert_eq!(document.totals.records_ok, 95);
    assert!(document.error.is_none());

    let job_id = result.job_id.expect("job id");
    assert_eq!(job_id.as_str(), "JOB_1");

    let job = stored(store.as_ref(), &job_id).await;
    assert_eq!(job.status, "finished");
    let stage = &job.document["stage"];
    assert_eq!(stage["status"], "finished");
    assert_eq!(stage["tag"], "Site_A");
    assert!(stage["summary"].get("tag").is_none());
    assert_eq!(stage["summary"]["totals"]["raw_lines"], 100);
    assert_eq!(stage["metrics"]["valid_record_percent"], 95.0);
    assert_eq!(stage["metrics"]["throughput_per_sec"], 95.0);
    assert_eq!(stage["metrics"]["elapsed_millis"], 0);
    assert_eq!(job.document["process_id"], "intake-test");
    assert!(job.document["input"]["sha256"].is_string());
}

#[tokio::test]
async fn test_failed_feed_goes_to_error_dir() {
    let ws = Workspace::new(&["feed2.csv"]);
    let store = Arc::new(MemoryJobStore::new());
    let transformer = Arc::new(FixedTransformer(ProcessingSummary::failed("parse error")));
    let orchestrator = PipelineOrchestrator::new(context(&ws, transformer, store.clone()));

    let result = orchestrator.run_once().await.unwrap().expect("a file was pending");

    assert!(ws.error("feed2.csv").exists());
    assert!(!ws.success("feed2.csv").exists());
    assert!(!ws.pending("feed2.csv").exists());

    // A failed transformation is data, not a pipeline fault
    assert!(result.failure.is_none());
    let document = result.result.expect("result document is not null");
    assert_eq!(document.error.as_ref().map(|e| e.message.as_str()), Some("parse error"));

    let job = stored(store.as_ref(), &result.job_id.unwrap()).await;
    assert_eq!(job.status, "error");
    let metrics = &job.document["stage"]["metrics"];
    assert_eq!(metrics["valid_record_percent"], 0.0);
    assert_eq!(metrics["throughput_per_sec"], -1.0);
    assert_eq!(job.document["stage"]["summary"]["error"]["kind"], "FAIL");
}

#[tokio::test]
async fn test_newest_first_takes_last_name() {
    let ws = Workspace::new(&["feed_20240101.csv", "feed_20240102.csv"]);
    let ctx = context(
        &ws,
        Arc::new(FixedTransformer(summary(1, 1, 1))),
        Arc::new(MemoryJobStore::new()),
    )
    .with_newest_first(true);

    let result = PipelineOrchestrator::new(ctx).run_once().await.unwrap().unwrap();

    assert_eq!(result.file_name, "feed_20240102.csv");
    assert!(ws.pending("feed_20240101.csv").exists());
}

// ============================================================================
// Empty queue
// ============================================================================

#[tokio::test]
async fn test_empty_pending_dir_returns_none() {
    let ws = Workspace::new(&[]);
    let store = Arc::new(MemoryJobStore::new());
    let orchestrator = PipelineOrchestrator::new(context(
        &ws,
        Arc::new(FixedTransformer(summary(1, 1, 1))),
        store.clone(),
    ));

    assert!(orchestrator.run_once().await.unwrap().is_none());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_missing_pending_dir_returns_none() {
    let ws = Workspace::new(&[]);
    std::fs::remove_dir(&ws.dirs.pending_dir).unwrap();
    let store = Arc::new(MemoryJobStore::new());
    let orchestrator = PipelineOrchestrator::new(context(
        &ws,
        Arc::new(FixedTransformer(summary(1, 1, 1))),
        store.clone(),
    ));

    assert!(orchestrator.run_once().await.unwrap().is_none());
    assert!(store.is_empty());
    assert!(!ws.dirs.success_dir.exists());
}

// ============================================================================
// Faults
// ============================================================================

#[tokio::test]
async fn test_transformer_panic_is_routed_as_failure() {
    let ws = Workspace::new(&["feed3.csv"]);
    let store = Arc::new(MemoryJobStore::new());
    let orchestrator =
        PipelineOrchestrator::new(context(&ws, Arc::new(PanickingTransformer), store.clone()));

    let result = orchestrator.run_once().await.unwrap().unwrap();

    assert!(ws.error("feed3.csv").exists());
    let message = result.result.unwrap().error.unwrap().message;
    assert!(message.contains("panicked"));
    assert!(message.contains("column index out of range"));

    let job = stored(store.as_ref(), &result.job_id.unwrap()).await;
    assert_eq!(job.status, "error");
}

#[tokio::test]
async fn test_vanished_file_is_logged_not_fatal() {
    let ws = Workspace::new(&["feed4.csv"]);
    let store = Arc::new(MemoryJobStore::new());
    let orchestrator =
        PipelineOrchestrator::new(context(&ws, Arc::new(VanishingTransformer), store.clone()));

    let result = orchestrator.run_once().await.unwrap().unwrap();

    assert!(result.failure.is_none());
    assert!(!ws.success("feed4.csv").exists());

    let job = stored(store.as_ref(), &result.job_id.unwrap()).await;
    assert_eq!(job.status, "finished");
    assert!(job.document["stage"].get("destination").is_none());
}

#[tokio::test]
async fn test_job_create_failure_propagates() {
    let ws = Workspace::new(&["feed5.csv"]);
    let orchestrator = PipelineOrchestrator::new(context(
        &ws,
        Arc::new(FixedTransformer(summary(1, 1, 1))),
        Arc::new(OfflineStore),
    ));

    let err = orchestrator.run_once().await.unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(err, PipelineError::JobCreate { ref file, .. } if file == "feed5.csv"));
    // Nothing was transformed or moved
    assert!(ws.pending("feed5.csv").exists());
    assert!(!ws.dirs.success_dir.exists());
    assert!(orchestrator.context().queue.in_flight().is_empty());
}

#[tokio::test]
async fn test_claimed_file_is_restored_when_job_create_fails() {
    let ws = Workspace::new(&["feed6.csv"]);
    let ctx = context(
        &ws,
        Arc::new(FixedTransformer(summary(1, 1, 1))),
        Arc::new(OfflineStore),
    )
    .with_selector(Arc::new(DirectorySelector::claiming()));

    let err = PipelineOrchestrator::new(ctx).run_once().await.unwrap_err();

    assert!(matches!(err, PipelineError::JobCreate { .. }));
    assert!(ws.pending("feed6.csv").exists());
    assert!(!inflight_dir(&ws.dirs.pending_dir).join("feed6.csv").exists());
}

#[tokio::test]
async fn test_update_failure_does_not_undo_relocation() {
    let ws = Workspace::new(&["feed7.csv"]);
    let store = Arc::new(ReadOnlyAfterCreate(MemoryJobStore::new()));
    let orchestrator = PipelineOrchestrator::new(context(
        &ws,
        Arc::new(FixedTransformer(summary(10, 10, 10))),
        store.clone(),
    ));

    let result = orchestrator.run_once().await.unwrap().unwrap();

    assert!(ws.success("feed7.csv").exists());
    assert_eq!(result.result.unwrap().totals.records_ok, 10);

    // The job keeps its initial state
    let job = stored(store.as_ref(), &result.job_id.unwrap()).await;
    assert_eq!(job.status, "processing");
}

#[tokio::test]
async fn test_metrics_panic_records_failure_on_job() {
    let ws = Workspace::new(&["feed9.csv"]);
    let store = Arc::new(MemoryJobStore::new());
    let ctx = context(
        &ws,
        Arc::new(FixedTransformer(summary(5, 5, 5))),
        store.clone(),
    )
    .with_metrics(Arc::new(PanickingMetrics));
    let orchestrator = PipelineOrchestrator::new(ctx);

    let result = orchestrator.run_once().await.unwrap().unwrap();

    assert!(result.result.is_none());
    assert_eq!(result.failure.as_deref(), Some("pipeline fault: metrics boom"));
    // Relocation happened before the fault
    assert!(ws.success("feed9.csv").exists());
    assert!(!result.left_in_place());

    let job = stored(store.as_ref(), result.job_id.as_ref().unwrap()).await;
    assert_eq!(job.status, "error");
    assert_eq!(job.document["stage"]["failure"], "pipeline fault: metrics boom");
    assert!(orchestrator.context().queue.in_flight().is_empty());
}

#[tokio::test]
async fn test_relocator_panic_restores_claimed_file() {
    let ws = Workspace::new(&["feed10.csv"]);
    let store = Arc::new(MemoryJobStore::new());
    let ctx = context(
        &ws,
        Arc::new(FixedTransformer(summary(5, 5, 5))),
        store.clone(),
    )
    .with_selector(Arc::new(DirectorySelector::claiming()))
    .with_relocator(Arc::new(PanickingRelocator));
    let orchestrator = PipelineOrchestrator::new(ctx);

    let result = orchestrator.run_once().await.unwrap().unwrap();

    assert!(result.result.is_none());
    let failure = result.failure.as_deref().unwrap();
    assert!(failure.contains("disk controller reset"));
    assert!(result.left_in_place());

    assert!(ws.pending("feed10.csv").exists());
    assert!(!inflight_dir(&ws.dirs.pending_dir).join("feed10.csv").exists());
    assert!(!ws.dirs.success_dir.exists());

    let job = stored(store.as_ref(), result.job_id.as_ref().unwrap()).await;
    assert_eq!(job.status, "error");
    assert!(job.document["stage"]["failure"]
        .as_str()
        .unwrap()
        .contains("disk controller reset"));
    assert!(orchestrator.context().queue.in_flight().is_empty());
}

#[tokio::test]
async fn test_unroutable_file_records_relocation_failure() {
    let mut ws = Workspace::new(&["feed11.csv"]);
    let blocker = ws.dirs.pending_dir.parent().unwrap().join("not_a_dir");
    std::fs::write(&blocker, b"").unwrap();
    ws.dirs.success_dir = blocker.join("success");

    let store = Arc::new(MemoryJobStore::new());
    let orchestrator = PipelineOrchestrator::new(context(
        &ws,
        Arc::new(FixedTransformer(summary(3, 3, 3))),
        store.clone(),
    ));

    let result = orchestrator.run_once().await.unwrap().unwrap();

    assert!(ws.pending("feed11.csv").exists());
    assert!(result.left_in_place());
    assert!(result.result.is_some());
    assert!(result.failure.as_deref().unwrap().starts_with("relocation failed:"));

    let job = stored(store.as_ref(), result.job_id.as_ref().unwrap()).await;
    assert_eq!(job.status, "finished");
    assert!(job.document["stage"].get("destination").is_none());
    assert!(job.document["stage"]["failure"]
        .as_str()
        .unwrap()
        .starts_with("relocation failed:"));
}

// ============================================================================
// Claiming and draining
// ============================================================================

#[tokio::test]
async fn test_claimed_file_is_relocated_from_inflight() {
    let ws = Workspace::new(&["feed8.csv"]);
    let ctx = context(
        &ws,
        Arc::new(FixedTransformer(summary(1, 1, 1))),
        Arc::new(MemoryJobStore::new()),
    )
    .with_selector(Arc::new(DirectorySelector::claiming()));

    PipelineOrchestrator::new(ctx).run_once().await.unwrap().unwrap();

    assert!(ws.success("feed8.csv").exists());
    assert!(!ws.pending("feed8.csv").exists());
    assert!(!inflight_dir(&ws.dirs.pending_dir).join("feed8.csv").exists());
}

#[tokio::test]
async fn test_drain_processes_one_file_at_a_time() {
    let ws = Workspace::new(&["a.csv", "b.csv", "c.csv"]);
    let store = Arc::new(MemoryJobStore::new());
    let orchestrator = PipelineOrchestrator::new(context(
        &ws,
        Arc::new(FixedTransformer(summary(1, 1, 1))),
        store.clone(),
    ));

    let limited = orchestrator.drain(Some(2)).await.unwrap();
    let names: Vec<&str> = limited.iter().map(|r| r.file_name.as_str()).collect();
    assert_eq!(names, vec!["a.csv", "b.csv"]);
    assert!(ws.pending("c.csv").exists());

    let rest = orchestrator.drain(None).await.unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].job_id.as_ref().map(JobId::as_str), Some("JOB_3"));
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn test_drain_stops_on_unroutable_file() {
    let mut ws = Workspace::new(&["a.csv", "b.csv"]);
    let blocker = ws.dirs.pending_dir.parent().unwrap().join("not_a_dir");
    std::fs::write(&blocker, b"").unwrap();
    ws.dirs.success_dir = blocker.join("success");

    let store = Arc::new(MemoryJobStore::new());
    let ctx = context(
        &ws,
        Arc::new(FixedTransformer(summary(1, 1, 1))),
        store.clone(),
    )
    .with_selector(Arc::new(DirectorySelector::claiming()));
    let orchestrator = PipelineOrchestrator::new(ctx);

    let results = tokio::time::timeout(Duration::from_secs(5), orchestrator.drain(None))
        .await
        .expect("drain should terminate")
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].file_name, "a.csv");
    assert_eq!(store.len(), 1);

    // The claim was handed back and nothing else was touched
    assert!(ws.pending("a.csv").exists());
    assert!(ws.pending("b.csv").exists());
    assert!(!inflight_dir(&ws.dirs.pending_dir).join("a.csv").exists());
}

// ============================================================================
// Production stack
// ============================================================================

#[tokio::test]
async fn test_csv_feed_with_sqlite_store() {
    let ws = Workspace::new(&[]);
    std::fs::write(
        ws.pending("orders_20240301.csv"),
        "order_id,order_date,total_amount,site_name\n\
         1,2024-03-01T08:00:00Z,10.00,Site_C\n\
         2,2024-03-01T08:05:00Z,-3,Site_C\n\
         3,2024-03-01T08:10:00Z,7.25,Site_C\n",
    )
    .unwrap();

    let schema = FeedSchema {
        required_columns: vec!["order_id".into()],
        rules: vec![
            ColumnRule::new("order_date", Check::Timestamp),
            ColumnRule::new("total_amount", Check::NonNegative),
        ],
        unique_column: Some("order_id".into()),
        tag_column: Some("site_name".into()),
        ..Default::default()
    };

    let db_path = ws.dirs.pending_dir.parent().unwrap().join("jobs.db");
    let store = Arc::new(SqliteJobStore::open(&db_path).unwrap());
    let orchestrator = PipelineOrchestrator::new(context(
        &ws,
        Arc::new(CsvFeedTransformer::new(schema)),
        store.clone(),
    ));

    let result = orchestrator.run_once().await.unwrap().unwrap();
    assert!(ws.success("orders_20240301.csv").exists());

    let totals = result.result.unwrap().totals;
    assert_eq!(totals.raw_lines, 3);
    assert_eq!(totals.records_ok, 2);

    let job = stored(store.as_ref(), &result.job_id.unwrap()).await;
    assert_eq!(job.status, "finished");
    assert_eq!(job.file_name, "orders_20240301.csv");
    assert_eq!(job.document["stage"]["tag"], "Site_C");
    assert_eq!(job.document["stage"]["summary"]["rejections"][0]["line"], 3);
    assert_eq!(
        Path::new(job.document["stage"]["destination"].as_str().unwrap()),
        ws.success("orders_20240301.csv")
    );
}
