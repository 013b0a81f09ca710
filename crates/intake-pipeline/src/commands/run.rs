//! `intake run` and `intake drain`

use tracing::info;

use crate::config::Config;
use crate::context::PipelineContext;
use crate::error::Result;
use crate::orchestrator::PipelineOrchestrator;

fn orchestrator(config: &Config) -> Result<PipelineOrchestrator> {
    Ok(PipelineOrchestrator::new(PipelineContext::from_config(config)?))
}

/// Process one file and print its result document
pub async fn run(config: &Config) -> Result<()> {
    if let Some(result) = orchestrator(config)?.run_once().await? {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Ok(())
}

/// Process files until the queue is empty, printing all result documents
pub async fn drain(config: &Config, max: Option<usize>) -> Result<()> {
    let results = orchestrator(config)?.drain(max).await?;

    let failed = results.iter().filter(|r| r.failure.is_some()).count();
    info!(processed = results.len(), failed, "Queue drained");

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
