//! Content checksums for fragment sources

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA256 checksum of a fragment's source text
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    pub fn of_text(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `content` still hashes to this checksum
    pub fn verify(&self, content: &str) -> bool {
        Self::of_text(content) == *self
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_consistency() {
        let content = "#%RAML 1.0 Library\ntypes:\n  Foo: string\n";
        assert_eq!(Checksum::of_text(content), Checksum::of_text(content));
        assert_eq!(Checksum::of_text(content).as_str().len(), 64);
    }

    #[test]
    fn test_checksum_verification() {
        let content = "#%RAML 1.0 DataType\ntype: string\n";
        let checksum = Checksum::of_text(content);
        assert!(checksum.verify(content));
        assert!(!checksum.verify("#%RAML 1.0 DataType\ntype: integer\n"));
    }
}
