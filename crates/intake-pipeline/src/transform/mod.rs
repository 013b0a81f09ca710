//! Feed transformation
//!
//! A [`Transformer`] turns one pending file into a [`ProcessingSummary`].
//! Failures are reported inside the summary (`error.kind = FAIL`) and never
//! raised, so a single bad file cannot stop the queue.

pub mod csv_feed;
pub mod rules;

use async_trait::async_trait;

use crate::types::{JobId, PendingFile, ProcessingSummary};

pub use csv_feed::{CsvFeedTransformer, FeedSchema};
pub use rules::{Check, ColumnRule};

/// Domain-specific import of one file
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Process the file and report what was found
    ///
    /// `job_id` is only used for correlation in logs.
    async fn transform(&self, file: &PendingFile, job_id: &JobId) -> ProcessingSummary;

    /// Short name used in logs
    fn name(&self) -> &str;
}
