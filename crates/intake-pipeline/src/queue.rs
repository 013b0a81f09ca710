//! In-flight tracking of selected files

use async_trait::async_trait;
use std::collections::HashSet;
use std::io::ErrorKind as IoErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::types::PendingFile;

/// Tracks files between selection and cleanup
#[async_trait]
pub trait ProcessQueue: Send + Sync {
    /// Mark a freshly selected file as in flight
    async fn track(&self, file: &PendingFile);

    /// Cleanup step; runs on every exit path after selection
    ///
    /// `error` carries the fault that ended the attempt, if any.
    async fn release(&self, file: &PendingFile, error: Option<&str>);

    /// Names currently in flight
    fn in_flight(&self) -> Vec<String>;
}

/// Queue that returns abandoned claims to the pending directory
///
/// A file that is still in its claimed location at release time was never
/// relocated, so it is moved back to `pending_dir` for a later attempt.
#[derive(Debug)]
pub struct InFlightQueue {
    pending_dir: PathBuf,
    names: Mutex<HashSet<String>>,
}

impl InFlightQueue {
    pub fn new(pending_dir: impl Into<PathBuf>) -> Self {
        Self {
            pending_dir: pending_dir.into(),
            names: Mutex::new(HashSet::new()),
        }
    }

    async fn restore(&self, file: &PendingFile) {
        if file.dir() == self.pending_dir.as_path() {
            return;
        }

        let target = self.pending_dir.join(&file.name);
        match tokio::fs::rename(&file.full_path, &target).await {
            Ok(()) => info!(file = %file.name, "Returned unprocessed file to pending directory"),
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                debug!(file = %file.name, "Claimed file already relocated");
            },
            Err(e) => warn!(file = %file.name, error = %e, "Could not return claimed file"),
        }
    }
}

#[async_trait]
impl ProcessQueue for InFlightQueue {
    async fn track(&self, file: &PendingFile) {
        if let Ok(mut names) = self.names.lock() {
            names.insert(file.name.clone());
        }
        debug!(file = %file.name, "Tracking in-flight file");
    }

    async fn release(&self, file: &PendingFile, error: Option<&str>) {
        if let Some(error) = error {
            warn!(file = %file.name, error = %error, "Releasing file after failed attempt");
        }

        self.restore(file).await;

        if let Ok(mut names) = self.names.lock() {
            names.remove(&file.name);
        }
        debug!(file = %file.name, "Released in-flight file");
    }

    fn in_flight(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .names
            .lock()
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}
