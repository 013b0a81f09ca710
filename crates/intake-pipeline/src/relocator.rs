//! Moving processed files out of the pending directory

use async_trait::async_trait;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What happened to a relocation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelocationOutcome {
    /// File now lives at the contained path
    Moved(PathBuf),
    /// Source was already gone
    AlreadyAbsent,
    /// Any other I/O fault
    Failed(String),
}

impl RelocationOutcome {
    pub fn destination(&self) -> Option<&Path> {
        match self {
            RelocationOutcome::Moved(dest) => Some(dest),
            _ => None,
        }
    }

    pub fn is_moved(&self) -> bool {
        matches!(self, RelocationOutcome::Moved(_))
    }

    /// Whether the file is out of the source directory afterwards
    pub fn is_settled(&self) -> bool {
        !matches!(self, RelocationOutcome::Failed(_))
    }
}

/// Moves a named file between directories
///
/// Never fails: problems are reported through [`RelocationOutcome`].
#[async_trait]
pub trait FileRelocator: Send + Sync {
    async fn relocate(&self, file_name: &str, from_dir: &Path, to_dir: &Path) -> RelocationOutcome;
}

/// Rename-based relocator for a local filesystem
///
/// `from_dir` and `to_dir` must be on the same filesystem. An existing file at
/// the destination is replaced.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRelocator;

impl LocalRelocator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileRelocator for LocalRelocator {
    async fn relocate(&self, file_name: &str, from_dir: &Path, to_dir: &Path) -> RelocationOutcome {
        let source = from_dir.join(file_name);
        let destination = to_dir.join(file_name);

        match tokio::fs::try_exists(&source).await {
            Ok(true) => {},
            Ok(false) => {
                debug!(file = %file_name, from = %from_dir.display(), "Source already absent");
                return RelocationOutcome::AlreadyAbsent;
            },
            Err(e) => {
                warn!(file = %file_name, error = %e, "Cannot check source file");
                return RelocationOutcome::Failed(format!("cannot stat {}: {}", source.display(), e));
            },
        }

        if let Err(e) = tokio::fs::create_dir_all(to_dir).await {
            warn!(dir = %to_dir.display(), error = %e, "Cannot create destination directory");
            return RelocationOutcome::Failed(format!("cannot create {}: {}", to_dir.display(), e));
        }

        match tokio::fs::rename(&source, &destination).await {
            Ok(()) => RelocationOutcome::Moved(destination),
            // Lost the file between the existence check and the rename
            Err(e) if e.kind() == IoErrorKind::NotFound => RelocationOutcome::AlreadyAbsent,
            Err(e) => {
                warn!(
                    file = %file_name,
                    to = %to_dir.display(),
                    error = %e,
                    "Relocation failed"
                );
                RelocationOutcome::Failed(format!(
                    "cannot move {} to {}: {}",
                    source.display(),
                    destination.display(),
                    e
                ))
            },
        }
    }
}
