//! Durable Staging Store
//!
//! Local persistence for chunks the ledger has not acknowledged yet.
//! Rows are partitioned by transfer id; a transfer's rows are purged only
//! once the ledger marks it completed.

mod schema;
mod store;

pub use schema::initialize_schema;
pub use store::StagingStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ledger::TransferId;

// ============================================================================
// Types
// ============================================================================

/// A chunk persisted after a failed delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedChunk {
    /// Auto-assigned row key
    pub key: i64,
    pub transfer_id: TransferId,
    pub chunk_number: u32,
    pub file_name: String,
    pub payload: Vec<u8>,
    /// RFC 3339 timestamp of when the chunk was staged
    pub staged_at: String,
}

/// Summary of a transfer that still has staged chunks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingTransfer {
    pub transfer_id: TransferId,
    pub file_name: String,
    pub staged_chunks: u64,
}

/// Staging store errors
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("Staging store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Staging store I/O error: {0}")]
    StoreIo(#[from] sqlx::Error),
}

// ============================================================================
// Staging Trait
// ============================================================================

/// Storage seam consumed by the transfer session
#[async_trait]
pub trait ChunkStaging: Send + Sync {
    /// Insert one staged chunk. Never overwrites; duplicates accumulate.
    async fn put(
        &self,
        transfer_id: TransferId,
        chunk_number: u32,
        file_name: &str,
        payload: &[u8],
    ) -> Result<(), StagingError>;

    /// All staged chunks for a transfer, in no particular order
    async fn list(&self, transfer_id: TransferId) -> Result<Vec<StagedChunk>, StagingError>;

    /// Delete every row staged for one chunk, returning how many were removed
    async fn remove(&self, transfer_id: TransferId, chunk_number: u32) -> Result<u64, StagingError>;

    /// Delete every staged chunk for a transfer, returning how many were removed
    async fn clear(&self, transfer_id: TransferId) -> Result<u64, StagingError>;

    /// Number of staged rows for a transfer
    async fn count(&self, transfer_id: TransferId) -> Result<u64, StagingError>;

    /// Transfers that still hold staged data
    async fn pending_transfers(&self) -> Result<Vec<PendingTransfer>, StagingError>;
}
