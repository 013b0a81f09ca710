//! CLI command implementations
//!
//! Each subcommand has its own module. Command results go to stdout; logs go
//! to stderr.

pub mod jobs;
pub mod run;
