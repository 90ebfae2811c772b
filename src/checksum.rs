//! Document fingerprints used to tell whether a migration step changed anything

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA256 fingerprint of a JSON document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Fingerprint of a document
    ///
    /// `serde_json::Map` keeps keys sorted, so equal documents always
    /// serialize to the same bytes. The document is written straight into
    /// the hasher.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let mut hasher = Sha256::new();
        // Writing a Value to a hasher has no failure path
        let _ = serde_json::to_writer(&mut hasher, value);
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
