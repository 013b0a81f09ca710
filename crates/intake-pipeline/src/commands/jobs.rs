//! `intake jobs` command implementation
//!
//! Reads the SQLite job store; the memory store does not outlive a process.

use crate::config::{Config, StoreBackend};
use crate::error::{PipelineError, Result};
use crate::recorder::{JobStore, SqliteJobStore};
use crate::types::JobId;
use crate::JobsCommand;

/// Execute jobs command
pub async fn run(config: &Config, command: &JobsCommand) -> Result<()> {
    if config.store.backend != StoreBackend::Sqlite {
        return Err(PipelineError::config(
            "job inspection requires the sqlite job store",
        ));
    }

    if !config.store.path.exists() {
        println!("No job database found at {}", config.store.path.display());
        return Ok(());
    }

    let store = SqliteJobStore::open(&config.store.path)?;

    match command {
        JobsCommand::List { limit } => list(&store, *limit).await,
        JobsCommand::Show { id } => show(&store, id).await,
    }
}

/// List recent jobs
async fn list(store: &SqliteJobStore, limit: usize) -> Result<()> {
    let jobs = store.list_recent(limit).await?;

    if jobs.is_empty() {
        println!("No jobs recorded");
        return Ok(());
    }

    println!("{:<10} {:<10} {:<26} FILE", "ID", "STATUS", "CREATED");
    for job in jobs {
        println!(
            "{:<10} {:<10} {:<26} {}",
            job.id.as_str(),
            job.status,
            job.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            job.file_name
        );
    }

    Ok(())
}

/// Print one job document
async fn show(store: &SqliteJobStore, id: &str) -> Result<()> {
    let job = store
        .get(&JobId::new(id))
        .await?
        .ok_or_else(|| PipelineError::job_store(format!("Job '{}' not found", id)))?;

    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}
