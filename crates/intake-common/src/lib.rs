//! Intake Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling, logging setup and file fingerprinting for the
//! intake workspace.
//!
//! - **Error Handling**: [`IntakeError`] and the [`Result`] alias
//! - **Logging**: `tracing` subscriber configuration ([`logging`])
//! - **Checksums**: SHA-256 fingerprints of feed files ([`checksum`])
//!
//! # Example
//!
//! ```no_run
//! use intake_common::checksum::FileDigest;
//! use intake_common::Result;
//!
//! fn fingerprint(path: &str) -> Result<()> {
//!     let digest = FileDigest::from_file(path)?;
//!     tracing::info!(sha256 = %digest.sha256, size = digest.size_bytes, "Fingerprinted feed");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

pub use error::{IntakeError, Result};
