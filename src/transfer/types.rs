//! Transfer session types

use std::io::SeekFrom;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::hash::{ContentHash, HashAlgorithm, HashEngine, HashError};
use crate::ledger::{Credential, TransferId};
use super::plan::DEFAULT_TOTAL_CHUNKS;

// ============================================================================
// Source
// ============================================================================

/// Bytes handed to the uploader by a front end.
///
/// File-backed sources are never loaded whole: the file hash is streamed
/// and each chunk is read from its byte range when it is pushed or staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSource {
    pub file_name: String,
    content: SourceContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SourceContent {
    Memory(Vec<u8>),
    File { path: PathBuf, size: u64 },
}

impl UploadSource {
    pub fn new(file_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content: SourceContent::Memory(data),
        }
    }

    /// Reference a file on disk; only its metadata is read here
    pub async fn from_path(path: &Path) -> Result<Self, HashError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|source| read_error(path, source))?;

        if !metadata.is_file() {
            return Err(read_error(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());

        Ok(Self {
            file_name,
            content: SourceContent::File {
                path: path.to_path_buf(),
                size: metadata.len(),
            },
        })
    }

    pub fn len(&self) -> u64 {
        match &self.content {
            SourceContent::Memory(data) => data.len() as u64,
            SourceContent::File { size, .. } => *size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        match &self.content {
            SourceContent::Memory(_) => None,
            SourceContent::File { path, .. } => Some(path),
        }
    }

    /// Whole-source digest; files are hashed in streamed reads
    pub async fn digest(&self, engine: &HashEngine) -> Result<ContentHash, HashError> {
        match &self.content {
            SourceContent::Memory(data) => Ok(engine.digest(data)),
            SourceContent::File { path, .. } => engine.digest_file(path).await,
        }
    }

    /// Bytes in `range`, which must lie within the source
    pub async fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>, HashError> {
        match &self.content {
            SourceContent::Memory(data) => Ok(data[range.start as usize..range.end as usize].to_vec()),
            SourceContent::File { path, .. } => {
                let mut file = tokio::fs::File::open(path)
                    .await
                    .map_err(|source| read_error(path, source))?;
                file.seek(SeekFrom::Start(range.start))
                    .await
                    .map_err(|source| read_error(path, source))?;

                let mut buffer = vec![0u8; (range.end - range.start) as usize];
                file.read_exact(&mut buffer)
                    .await
                    .map_err(|source| read_error(path, source))?;

                Ok(buffer)
            }
        }
    }
}

fn read_error(path: &Path, source: std::io::Error) -> HashError {
    HashError::ReadError {
        path: path.display().to_string(),
        source,
    }
}

/// One contiguous piece of a file, ready to push
#[derive(Debug, Clone)]
pub struct Chunk {
    pub transfer_id: TransferId,
    pub chunk_number: u32,
    pub byte_range: Range<u64>,
    pub payload: Vec<u8>,
    pub content_hash: ContentHash,
}

// ============================================================================
// Configuration
// ============================================================================

/// Simulated connectivity failures, scoped to one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultInjection {
    /// Pushing this chunk number fails as if the network were down
    pub network_failure_at: Option<u32>,
}

impl FaultInjection {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn network_failure_at(chunk_number: u32) -> Self {
        Self {
            network_failure_at: Some(chunk_number),
        }
    }
}

/// Per-session policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub total_chunks: u32,
    pub hash_algorithm: HashAlgorithm,
    pub fault_injection: FaultInjection,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            total_chunks: DEFAULT_TOTAL_CHUNKS,
            hash_algorithm: HashAlgorithm::default(),
            fault_injection: FaultInjection::none(),
        }
    }
}

/// Receives `(chunks_acknowledged, total_chunks)` after every acknowledgment
pub type ProgressSink = Arc<dyn Fn(u32, u32) + Send + Sync>;

// ============================================================================
// State
// ============================================================================

/// Where a session is in the transfer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    NotStarted,
    RecordCreated,
    ChunkInFlight(u32),
    ChunkAcked(u32),
    AllAcked,
    /// Connectivity lost; the unsent tail is in the staging store
    Staged,
    Completed,
}

/// In-memory state of the active upload
#[derive(Debug, Clone)]
pub struct SessionState {
    pub transfer_id: TransferId,
    pub total_chunks: u32,
    pub chunk_size: u64,
    pub next_chunk_index: u32,
    pub credential: Credential,
}

/// Result of a run that reached `Completed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSummary {
    pub transfer_id: TransferId,
    /// Chunks pushed during this run
    pub chunks_sent: u32,
    pub total_chunks: u32,
    /// Staged rows purged after completion
    pub staged_cleared: u64,
}
