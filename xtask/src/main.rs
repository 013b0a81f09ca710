//! Build automation tasks for the intake workspace
//!
//! - Generating the CLI reference from the clap definitions

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for intake", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<intake_pipeline::Cli>();

    let content = format!(
        r#"# Intake CLI Reference

Generated from the CLI source code on {}.

## Overview

`intake` processes one delimited feed file per invocation. It picks the oldest
file in the pending directory, validates every row, moves the file to the
success or error directory and records the attempt as a job.

## Quick Start

```bash
# Process a single file
intake run --pending-dir data/pending --success-dir data/success --error-dir data/error

# Process everything that is waiting, at most 100 files
intake drain --max 100

# Inspect recorded jobs
intake jobs list --limit 10
intake jobs show JOB_12
```

## Commands

{}

## Environment Variables

- `INTAKE_CONFIG` - TOML configuration file
- `INTAKE_PENDING_DIR`, `INTAKE_SUCCESS_DIR`, `INTAKE_ERROR_DIR` - watched directories
- `INTAKE_NEWEST_FIRST` - take the lexicographically last file first
- `INTAKE_CLAIM` - claim files into `.inflight/` before processing
- `INTAKE_STORE` - job store backend (`memory` or `sqlite`)
- `INTAKE_STORE_PATH` - SQLite job database (default: `data/jobs.db`)
- `INTAKE_PROCESS_ID` - name recorded on every job
- `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_DIR`, `LOG_FILTER` - logging

## Configuration

Example `intake.toml`:

```toml
process_id = "orders-intake"

[directories]
pending_dir = "data/pending"
success_dir = "data/success"
error_dir = "data/error"

[selection]
newest_first = false
claim = true

[store]
backend = "sqlite"
path = "data/jobs.db"

[feed]
required_columns = ["order_id", "order_date"]
unique_column = "order_id"
transaction_column = "order_id"
tag_column = "site_name"

[[feed.rules]]
column = "order_date"
check = "timestamp"

[[feed.rules]]
column = "total_amount"
check = "non_negative"

[[feed.rules]]
column = "status"
check = "one_of"
values = ["pending", "paid", "cancelled", "shipped"]
```

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
