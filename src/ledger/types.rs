//! Remote ledger types

use std::fmt;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

// ============================================================================
// Identifiers
// ============================================================================

/// Server-assigned transfer identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(pub i64);

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TransferId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(TransferId)
    }
}

/// Token sent with every mutating request
#[derive(Clone, Default)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

// ============================================================================
// Transfer Record
// ============================================================================

/// Server-side transfer status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    InProgress,
    Completed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Wire Types
// ============================================================================

/// Body of `POST /transfers`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransferRequest {
    pub file_name: String,
    pub md5_checksum: String,
    pub number_of_chunks: u32,
}

/// Response of `POST /transfers`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTransferResponse {
    pub id: TransferId,
}

/// Response of `GET /transfers/{id}/last-chunk`
#[derive(Debug, Clone, Deserialize)]
pub struct LastChunkResponse {
    #[serde(default)]
    pub chunk_number: Option<u32>,
}

/// Body of `PATCH /transfers/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TransferStatus,
}

/// Server acknowledgment of one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkAck {
    pub chunk_number: u32,
    /// Whatever the server returned; `Null` for an empty body
    pub body: serde_json::Value,
}

/// Assembled file streamed back from the ledger
pub struct AssembledFile {
    /// Suggested file name from `Content-Disposition`, or a default
    pub file_name: String,
    pub stream: BoxStream<'static, Result<Vec<u8>, LedgerError>>,
}

impl fmt::Debug for AssembledFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssembledFile")
            .field("file_name", &self.file_name)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Remote ledger error types
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The server answered with a non-success status
    #[error("Remote rejected request ({status}): {reason}")]
    RemoteRejected { status: u16, reason: String },

    /// No response was received
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// A success response could not be understood
    #[error("Invalid response from ledger: {0}")]
    InvalidResponse(String),

    /// The HTTP client could not be configured
    #[error("Ledger client setup failed: {0}")]
    ClientSetup(String),
}

impl LedgerError {
    /// Only connectivity failures send the remaining chunks to staging
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::NetworkUnavailable(_))
    }
}
