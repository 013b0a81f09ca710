//! SQLite schema for the job store

use crate::error::Result;
use rusqlite::Connection;

/// Initialize job database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_name TEXT NOT NULL,
            status TEXT NOT NULL,

            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,

            document TEXT NOT NULL  -- JSON
        )
        "#,
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_jobs_file_name ON jobs(file_name)",
        [],
    )?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)", [])?;

    Ok(())
}
