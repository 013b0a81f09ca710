//! Single-file pipeline orchestration
//!
//! [`PipelineOrchestrator::run_once`] takes one file from the pending
//! directory through the whole lifecycle:
//!
//! ```text
//! Idle -> Selected -> Transformed -> Routed -> Recorded -> Done
//!            \____________\______________\__________\---> Errored
//! ```
//!
//! Faults before a job record exists propagate to the caller. Anything that
//! goes wrong later is logged, written to the job as its failure and turned
//! into a partial [`RunResult`]. The in-flight queue is released on every path
//! once a file has been selected.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use intake_common::checksum::FileDigest;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::context::PipelineContext;
use crate::error::Result;
use crate::relocator::RelocationOutcome;
use crate::types::{
    JobId, JobRecord, JobStatus, PendingFile, ProcessingSummary, RunResult, StageRecord,
};

/// Lifecycle of one `run_once` invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Selected,
    Transformed,
    Routed,
    Recorded,
    Done,
    Errored,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Selected => "selected",
            PipelineState::Transformed => "transformed",
            PipelineState::Routed => "routed",
            PipelineState::Recorded => "recorded",
            PipelineState::Done => "done",
            PipelineState::Errored => "errored",
        }
    }

    /// Whether `next` is a legal successor
    pub fn can_advance_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Selected)
                | (Idle, Done)
                | (Selected, Transformed)
                | (Transformed, Routed)
                | (Routed, Recorded)
                | (Recorded, Done)
                | (Selected | Transformed | Routed | Recorded, Errored)
        )
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn advance(state: &mut PipelineState, next: PipelineState) {
    if !state.can_advance_to(next) {
        warn!(from = %state, to = %next, "Unexpected pipeline transition");
    }
    debug!(from = %state, to = %next, "Pipeline state");
    *state = next;
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// SHA-256 of the selected file, if it can be read
async fn fingerprint(file: &PendingFile) -> Option<FileDigest> {
    let path = file.full_path.clone();
    match tokio::task::spawn_blocking(move || FileDigest::from_file(path)).await {
        Ok(Ok(digest)) => Some(digest),
        Ok(Err(e)) => {
            warn!(file = %file.name, error = %e, "Could not fingerprint file");
            None
        },
        Err(e) => {
            warn!(file = %file.name, error = %e, "Fingerprint task aborted");
            None
        },
    }
}

/// Runs the pipeline for one file per call
pub struct PipelineOrchestrator {
    ctx: PipelineContext,
}

impl PipelineOrchestrator {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Process at most one pending file
    ///
    /// Returns `Ok(None)` when there is nothing to do.
    pub async fn run_once(&self) -> Result<Option<RunResult>> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run_once", run_id = %run_id, process_id = %self.ctx.process_id);
        self.run().instrument(span).await
    }

    /// Call [`run_once`](Self::run_once) until the queue is empty or `max`
    /// files were handled
    ///
    /// Stops early when a file could not be moved out of the pending
    /// directory, since the next pick would return the same file.
    pub async fn drain(&self, max: Option<usize>) -> Result<Vec<RunResult>> {
        let mut results = Vec::new();

        while max.is_none_or(|max| results.len() < max) {
            let Some(result) = self.run_once().await? else {
                break;
            };

            let stalled = result.left_in_place();
            if stalled {
                warn!(file = %result.file_name, "File was not routed, stopping drain");
            }
            results.push(result);
            if stalled {
                break;
            }
        }

        info!(processed = results.len(), "Drain finished");
        Ok(results)
    }

    async fn run(&self) -> Result<Option<RunResult>> {
        let ctx = &self.ctx;
        let mut state = PipelineState::Idle;

        let selected = ctx
            .selector
            .select_one(&ctx.dirs.pending_dir, ctx.newest_first)
            .await
            .inspect_err(|e| error!(error = %e, fatal = e.is_fatal(), "File selection failed"))?;

        let Some(file) = selected else {
            info!(dir = %ctx.dirs.pending_dir.display(), "No files to process");
            advance(&mut state, PipelineState::Done);
            return Ok(None);
        };

        advance(&mut state, PipelineState::Selected);
        info!(file = %file.name, path = %file.full_path.display(), "Selected file");
        ctx.queue.track(&file).await;

        let outcome = self.process(&file, &mut state).await;

        let fault = match &outcome {
            Ok(result) => result.failure.clone(),
            Err(e) => Some(e.to_string()),
        };
        ctx.queue.release(&file, fault.as_deref()).await;

        match outcome {
            Ok(result) => {
                if state != PipelineState::Errored {
                    advance(&mut state, PipelineState::Done);
                }
                Ok(Some(result))
            },
            Err(e) if e.is_fatal() => {
                error!(file = %file.name, error = %e, "Attempt aborted before a job existed");
                Err(e)
            },
            Err(e) => {
                warn!(file = %file.name, error = %e, "Attempt failed");
                Ok(Some(RunResult {
                    file_name: file.name.clone(),
                    job_id: None,
                    result: None,
                    failure: Some(e.to_string()),
                    relocation: None,
                }))
            },
        }
    }

    /// Everything from job creation to the terminal update
    async fn process(&self, file: &PendingFile, state: &mut PipelineState) -> Result<RunResult> {
        let ctx = &self.ctx;
        let started_at = ctx.metrics.now();
        let input = fingerprint(file).await;

        let record = JobRecord::started(ctx.process_id.clone(), file.name.clone(), started_at, input);
        let job_id = match ctx.recorder.create(&record).await {
            Ok(id) => id,
            Err(e) => {
                advance(state, PipelineState::Errored);
                return Err(e);
            },
        };

        let mut relocation = None;
        let attempt =
            AssertUnwindSafe(self.complete(file, &job_id, started_at, state, &mut relocation))
                .catch_unwind()
                .await;

        match attempt {
            Ok(result) => Ok(result),
            Err(payload) => {
                let message = format!("pipeline fault: {}", panic_message(&*payload));
                error!(file = %file.name, job_id = %job_id, error = %message, "Attempt failed");
                advance(state, PipelineState::Errored);

                if !ctx.recorder.record_failure(&job_id, &message).await {
                    warn!(job_id = %job_id, "Failure could not be recorded on job");
                }

                Ok(RunResult {
                    file_name: file.name.clone(),
                    job_id: Some(job_id),
                    result: None,
                    failure: Some(message),
                    relocation,
                })
            },
        }
    }

    async fn transform(&self, file: &PendingFile, job_id: &JobId) -> ProcessingSummary {
        let transformer = &self.ctx.transformer;
        info!(file = %file.name, job_id = %job_id, transformer = transformer.name(), "Transforming");

        match AssertUnwindSafe(transformer.transform(file, job_id)).catch_unwind().await {
            Ok(summary) => summary,
            Err(payload) => {
                let message = format!(
                    "transformer '{}' panicked: {}",
                    transformer.name(),
                    panic_message(&*payload)
                );
                error!(file = %file.name, job_id = %job_id, error = %message, "Transformer panicked");
                ProcessingSummary::failed(message)
            },
        }
    }

    async fn complete(
        &self,
        file: &PendingFile,
        job_id: &JobId,
        started_at: DateTime<Utc>,
        state: &mut PipelineState,
        relocation: &mut Option<RelocationOutcome>,
    ) -> RunResult {
        let ctx = &self.ctx;

        let summary = self.transform(file, job_id).await;
        advance(state, PipelineState::Transformed);

        let failed = summary.is_failure();
        let to_dir = if failed {
            &ctx.dirs.error_dir
        } else {
            &ctx.dirs.success_dir
        };

        let outcome = ctx.relocator.relocate(&file.name, file.dir(), to_dir).await;
        let relocation_failure = match &outcome {
            RelocationOutcome::Moved(dest) => {
                info!(file = %file.name, to = %dest.display(), "Relocated file");
                None
            },
            RelocationOutcome::AlreadyAbsent => {
                warn!(file = %file.name, from = %file.dir().display(), "File was already gone");
                None
            },
            RelocationOutcome::Failed(reason) => {
                warn!(file = %file.name, error = %reason, "File left in place");
                Some(format!("relocation failed: {}", reason))
            },
        };
        let destination = outcome.destination().map(|p| p.to_path_buf());
        *relocation = Some(outcome);
        advance(state, PipelineState::Routed);

        let metrics = ctx.metrics.compute(started_at, &summary);
        let (tag, document) = summary.into_result_document();
        let status = if failed {
            JobStatus::Error
        } else {
            JobStatus::Finished
        };

        info!(
            file = %file.name,
            job_id = %job_id,
            status = %status,
            raw_lines = document.totals.raw_lines,
            records_ok = document.totals.records_ok,
            valid_record_percent = metrics.valid_record_percent,
            throughput_per_sec = metrics.throughput_per_sec,
            elapsed_millis = metrics.elapsed_millis,
            "Processed file"
        );

        let stage = StageRecord {
            start_time: started_at,
            status,
            tag,
            summary: Some(document.clone()),
            metrics: Some(metrics),
            destination,
            failure: relocation_failure.clone(),
        };
        if !ctx.recorder.finish(job_id, &stage).await {
            warn!(file = %file.name, job_id = %job_id, "Job outcome was not persisted");
        }
        advance(state, PipelineState::Recorded);

        RunResult {
            file_name: file.name.clone(),
            job_id: Some(job_id.clone()),
            result: Some(document),
            failure: relocation_failure,
            relocation: relocation.clone(),
        }
    }
}
