//! Capabilities handed to the orchestrator

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{Config, StoreBackend, DEFAULT_PROCESS_ID};
use crate::error::Result;
use crate::metrics::{MetricsComputer, StandardMetrics};
use crate::queue::{InFlightQueue, ProcessQueue};
use crate::recorder::{JobRecorder, JobStore, MemoryJobStore, SqliteJobStore};
use crate::relocator::{FileRelocator, LocalRelocator};
use crate::selector::{DirectorySelector, FileSelector};
use crate::transform::{CsvFeedTransformer, Transformer};

/// The three directories a pipeline works with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchDirs {
    pub pending_dir: PathBuf,
    pub success_dir: PathBuf,
    pub error_dir: PathBuf,
}

impl WatchDirs {
    pub fn new(
        pending_dir: impl Into<PathBuf>,
        success_dir: impl Into<PathBuf>,
        error_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pending_dir: pending_dir.into(),
            success_dir: success_dir.into(),
            error_dir: error_dir.into(),
        }
    }
}

/// Everything one `run_once` needs
///
/// Each capability is a trait object so tests can swap in fakes.
#[derive(Clone)]
pub struct PipelineContext {
    pub selector: Arc<dyn FileSelector>,
    pub transformer: Arc<dyn Transformer>,
    pub recorder: JobRecorder,
    pub relocator: Arc<dyn FileRelocator>,
    pub metrics: Arc<dyn MetricsComputer>,
    pub queue: Arc<dyn ProcessQueue>,
    pub dirs: WatchDirs,
    pub newest_first: bool,
    pub process_id: String,
}

impl PipelineContext {
    /// Context with the local-filesystem defaults for everything but the
    /// transformer and the job store
    pub fn new(dirs: WatchDirs, transformer: Arc<dyn Transformer>, store: Arc<dyn JobStore>) -> Self {
        let queue = Arc::new(InFlightQueue::new(dirs.pending_dir.clone()));
        Self {
            selector: Arc::new(DirectorySelector::new()),
            transformer,
            recorder: JobRecorder::new(store),
            relocator: Arc::new(LocalRelocator::new()),
            metrics: Arc::new(StandardMetrics::new()),
            queue,
            dirs,
            newest_first: false,
            process_id: DEFAULT_PROCESS_ID.to_string(),
        }
    }

    /// Production context described by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let store: Arc<dyn JobStore> = match config.store.backend {
            StoreBackend::Memory => Arc::new(MemoryJobStore::new()),
            StoreBackend::Sqlite => Arc::new(SqliteJobStore::open(&config.store.path)?),
        };

        let selector = if config.selection.claim {
            DirectorySelector::claiming()
        } else {
            DirectorySelector::new()
        };

        let dirs = WatchDirs::new(
            config.directories.pending_dir.clone(),
            config.directories.success_dir.clone(),
            config.directories.error_dir.clone(),
        );

        Ok(Self::new(dirs, Arc::new(CsvFeedTransformer::new(config.feed.clone())), store)
            .with_selector(Arc::new(selector))
            .with_newest_first(config.selection.newest_first)
            .with_process_id(config.process_id.clone()))
    }

    pub fn with_selector(mut self, selector: Arc<dyn FileSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_relocator(mut self, relocator: Arc<dyn FileRelocator>) -> Self {
        self.relocator = relocator;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsComputer>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_queue(mut self, queue: Arc<dyn ProcessQueue>) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_newest_first(mut self, newest_first: bool) -> Self {
        self.newest_first = newest_first;
        self
    }

    pub fn with_process_id(mut self, process_id: impl Into<String>) -> Self {
        self.process_id = process_id.into();
        self
    }
}
