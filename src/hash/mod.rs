//! Hash Engine
//!
//! Content digests for whole files and individual chunks.
//! MD5 is the default because the ledger stores `md5_checksum`;
//! SHA-256 is available for servers that accept it.

use std::fmt;
use std::path::Path;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

/// Read buffer for streaming file digests: 64KB
const READ_BUFFER_SIZE: usize = 64 * 1024;

// ============================================================================
// Types
// ============================================================================

/// Digest algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Md5,
    Sha256,
}

impl HashAlgorithm {
    /// Length of the hex-encoded digest
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha256 => 64,
        }
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            other => Err(format!("unknown hash algorithm: {}", other)),
        }
    }
}

/// Lower-case hex digest tagged with the algorithm that produced it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash {
    algorithm: HashAlgorithm,
    hex: String,
}

impl ContentHash {
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn as_str(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

/// Hash engine errors
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("Failed to read source bytes from {path}: {source}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// Hash Engine
// ============================================================================

/// Stateless digest calculator
#[derive(Debug, Clone, Copy, Default)]
pub struct HashEngine {
    algorithm: HashAlgorithm,
}

impl HashEngine {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Digest a byte range
    pub fn digest(&self, data: &[u8]) -> ContentHash {
        let hex = match self.algorithm {
            HashAlgorithm::Md5 => hex::encode(Md5::digest(data)),
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
        };

        ContentHash {
            algorithm: self.algorithm,
            hex,
        }
    }

    /// Digest a file without loading it into memory
    pub async fn digest_file(&self, path: &Path) -> Result<ContentHash, HashError> {
        let read_error = |source| HashError::ReadError {
            path: path.display().to_string(),
            source,
        };

        let mut file = tokio::fs::File::open(path).await.map_err(read_error)?;
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        let mut hasher = StreamingHasher::new(self.algorithm);

        loop {
            let n = file.read(&mut buffer).await.map_err(read_error)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(hasher.finish())
    }

    /// Recompute and compare against an expected hex digest
    pub fn verify(&self, data: &[u8], expected: &str) -> bool {
        // A digest of the wrong width was produced by another algorithm
        if expected.len() != self.algorithm.hex_len() {
            return false;
        }

        self.digest(data).as_str().eq_ignore_ascii_case(expected)
    }
}

enum StreamingHasher {
    Md5(Md5),
    Sha256(Sha256),
}

impl StreamingHasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => Self::Md5(Md5::new()),
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
        }
    }

    fn finish(self) -> ContentHash {
        match self {
            Self::Md5(h) => ContentHash {
                algorithm: HashAlgorithm::Md5,
                hex: hex::encode(h.finalize()),
            },
            Self::Sha256(h) => ContentHash {
                algorithm: HashAlgorithm::Sha256,
                hex: hex::encode(h.finalize()),
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_md5_known_value() {
        let engine = HashEngine::default();
        let hash = engine.digest(b"testData");
        assert_eq!(hash.as_str(), "3a760fae784d30a1b50e304e97a17355");
        assert_eq!(hash.as_str().len(), HashAlgorithm::Md5.hex_len());
    }

    #[test]
    fn test_sha256_length() {
        let engine = HashEngine::new(HashAlgorithm::Sha256);
        let hash = engine.digest(b"Hello, World!");
        assert_eq!(hash.as_str().len(), 64);
        assert_eq!(hash.algorithm(), HashAlgorithm::Sha256);
    }

    #[test]
    fn test_empty_input_is_hashable() {
        let engine = HashEngine::default();
        assert_eq!(engine.digest(b"").as_str(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_digest_is_repeatable() {
        let engine = HashEngine::default();
        let payload = vec![7u8; 4096];
        assert_eq!(engine.digest(&payload), engine.digest(&payload));
        assert!(engine.verify(&payload, engine.digest(&payload).as_str()));
        assert!(!engine.verify(&payload, "00000000000000000000000000000000"));
    }

    #[tokio::test]
    async fn test_digest_file_matches_in_memory() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        file.write_all(&content).unwrap();

        for algorithm in [HashAlgorithm::Md5, HashAlgorithm::Sha256] {
            let engine = HashEngine::new(algorithm);
            let from_file = engine.digest_file(file.path()).await.unwrap();
            assert_eq!(from_file, engine.digest(&content));
        }
    }

    #[tokio::test]
    async fn test_digest_missing_file_is_read_error() {
        let engine = HashEngine::default();
        let result = engine.digest_file(Path::new("/nonexistent/chunkferry.bin")).await;
        assert!(matches!(result, Err(HashError::ReadError { .. })));
    }

    #[test]
    fn test_content_hashes_key_a_set() {
        let md5 = HashEngine::new(HashAlgorithm::Md5);
        let sha = HashEngine::new(HashAlgorithm::Sha256);

        let mut seen = std::collections::HashSet::new();
        assert!(seen.insert(md5.digest(b"chunk")));
        assert!(seen.insert(sha.digest(b"chunk")));
        assert!(!seen.insert(md5.digest(b"chunk")));
    }

    #[test]
    fn test_verify_rejects_digest_of_other_width() {
        let md5 = HashEngine::new(HashAlgorithm::Md5);
        let sha = HashEngine::new(HashAlgorithm::Sha256);
        let sha_hex = sha.digest(b"payload").to_string();

        assert!(sha.verify(b"payload", &sha_hex));
        assert!(!md5.verify(b"payload", &sha_hex));
        assert!(!md5.verify(b"payload", &sha_hex[..32]));
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!("MD5".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Md5);
        assert_eq!("sha256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert!("crc32".parse::<HashAlgorithm>().is_err());
    }
}
