//! SHA-256 fingerprints for feed files
//!
//! Job records carry the digest of the file they describe so an operator can
//! tell whether two attempts saw the same bytes.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

const READ_BUFFER_SIZE: usize = 8192;

/// Digest and size of a file at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDigest {
    /// Lowercase hex SHA-256
    pub sha256: String,
    /// Number of bytes hashed
    pub size_bytes: u64,
}

impl FileDigest {
    /// Hash a file on disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = std::fs::File::open(path)?;
        Self::from_reader(&mut file)
    }

    /// Hash any readable source
    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        let mut size_bytes = 0u64;

        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
            size_bytes += bytes_read as u64;
        }

        Ok(Self {
            sha256: hex::encode(hasher.finalize()),
            size_bytes,
        })
    }
}

impl std::fmt::Display for FileDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sha256:{} ({} bytes)", self.sha256, self.size_bytes)
    }
}
