//! Pending file selection
//!
//! Picks exactly one file from the pending directory. Names are compared
//! lexicographically, so feeds named with a sortable timestamp come out
//! oldest-first by default.

use async_trait::async_trait;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::types::PendingFile;

/// Sub-directory of the pending directory holding claimed files
pub const INFLIGHT_DIR_NAME: &str = ".inflight";

/// Attempts before giving up on a contended claim
pub const DEFAULT_MAX_CLAIM_ATTEMPTS: usize = 5;

/// Where claimed files live for a given pending directory
pub fn inflight_dir(pending_dir: &Path) -> PathBuf {
    pending_dir.join(INFLIGHT_DIR_NAME)
}

/// Locates the next file to process
#[async_trait]
pub trait FileSelector: Send + Sync {
    /// Return one pending file, or `None` when there is nothing to do
    ///
    /// A missing directory is an empty queue, not an error.
    async fn select_one(&self, watch_dir: &Path, newest_first: bool)
        -> Result<Option<PendingFile>>;
}

/// Selects regular files directly inside a local directory
#[derive(Debug, Clone)]
pub struct DirectorySelector {
    claim: bool,
    max_claim_attempts: usize,
}

impl DirectorySelector {
    /// Selector that leaves the file where it is
    pub fn new() -> Self {
        Self {
            claim: false,
            max_claim_attempts: DEFAULT_MAX_CLAIM_ATTEMPTS,
        }
    }

    /// Selector that renames the chosen file into the in-flight directory
    ///
    /// Safe to run from several processes against the same pending directory.
    pub fn claiming() -> Self {
        Self {
            claim: true,
            ..Self::new()
        }
    }

    pub fn with_max_claim_attempts(mut self, attempts: usize) -> Self {
        self.max_claim_attempts = attempts.max(1);
        self
    }

    pub fn claims(&self) -> bool {
        self.claim
    }

    /// Sorted names of the selectable files in `dir`
    async fn list_candidates(dir: &Path) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                debug!(dir = %dir.display(), "Pending directory does not exist");
                return Ok(Vec::new());
            },
            Err(e) => {
                return Err(PipelineError::selection(format!(
                    "cannot list {}: {}",
                    dir.display(),
                    e
                )))
            },
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            PipelineError::selection(format!("cannot read entry in {}: {}", dir.display(), e))
        })? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!(name = ?raw, "Skipping file with non UTF-8 name");
                    continue;
                },
            };

            if name.starts_with('.') {
                continue;
            }

            // Follows symlinks, so a link to a regular file is selectable
            match tokio::fs::metadata(entry.path()).await {
                Ok(meta) if meta.is_file() => names.push(name),
                Ok(_) => {},
                // Vanished between listing and stat
                Err(e) if e.kind() == IoErrorKind::NotFound => {},
                Err(e) => warn!(file = %name, error = %e, "Skipping unreadable entry"),
            }
        }

        names.sort();
        Ok(names)
    }

    fn pick(names: Vec<String>, newest_first: bool) -> Option<String> {
        if newest_first {
            names.into_iter().next_back()
        } else {
            names.into_iter().next()
        }
    }

    async fn claim_one(&self, watch_dir: &Path, newest_first: bool) -> Result<Option<PendingFile>> {
        let claim_dir = inflight_dir(watch_dir);

        for attempt in 1..=self.max_claim_attempts {
            let Some(name) = Self::pick(Self::list_candidates(watch_dir).await?, newest_first) else {
                return Ok(None);
            };

            tokio::fs::create_dir_all(&claim_dir).await.map_err(|e| {
                PipelineError::selection(format!("cannot create {}: {}", claim_dir.display(), e))
            })?;

            let claimed = PendingFile::new(&claim_dir, &name);
            match tokio::fs::rename(watch_dir.join(&name), &claimed.full_path).await {
                Ok(()) => {
                    debug!(file = %name, attempt, "Claimed pending file");
                    return Ok(Some(claimed));
                },
                Err(e) if e.kind() == IoErrorKind::NotFound => {
                    debug!(file = %name, attempt, "Lost claim race, re-listing");
                },
                Err(e) => {
                    return Err(PipelineError::selection(format!("cannot claim {}: {}", name, e)));
                },
            }
        }

        Err(PipelineError::selection(format!(
            "gave up claiming a file in {} after {} attempts",
            watch_dir.display(),
            self.max_claim_attempts
        )))
    }
}

impl Default for DirectorySelector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSelector for DirectorySelector {
    async fn select_one(
        &self,
        watch_dir: &Path,
        newest_first: bool,
    ) -> Result<Option<PendingFile>> {
        if self.claim {
            return self.claim_one(watch_dir, newest_first).await;
        }

        let names = Self::list_candidates(watch_dir).await?;
        Ok(Self::pick(names, newest_first).map(|name| PendingFile::new(watch_dir, name)))
    }
}
