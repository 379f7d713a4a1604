//! Remote Ledger Client
//!
//! Thin HTTP boundary to the server that records transfers and chunks.
//! Every operation is a single round trip.
//!
//! Endpoints:
//! - POST /transfers - Create a transfer record
//! - POST /transfers/{id}/chunks - Push one chunk (multipart)
//! - GET /transfers/{id}/last-chunk - Last acknowledged chunk number
//! - PATCH /transfers/{id} - Update transfer status
//! - GET /transfers/{id}/download - Stream the assembled file

pub mod client;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use client::{LedgerClient, DEFAULT_DOWNLOAD_PREFIX};
pub use types::*;

use async_trait::async_trait;

/// Operations the transfer session needs from the ledger
#[async_trait]
pub trait RemoteLedger: Send + Sync {
    /// Create the server-side record for a new transfer
    async fn create_transfer(
        &self,
        file_name: &str,
        total_chunks: u32,
        file_hash: &str,
        credential: &Credential,
    ) -> Result<TransferId, LedgerError>;

    /// Deliver one chunk
    async fn push_chunk(
        &self,
        transfer_id: TransferId,
        chunk_number: u32,
        payload: &[u8],
        chunk_hash: &str,
        credential: &Credential,
    ) -> Result<ChunkAck, LedgerError>;

    /// Highest acknowledged chunk, or `None` when nothing was acknowledged
    async fn last_acknowledged_chunk(
        &self,
        transfer_id: TransferId,
    ) -> Result<Option<u32>, LedgerError>;

    /// Set the transfer status
    async fn update_status(
        &self,
        transfer_id: TransferId,
        status: TransferStatus,
        credential: &Credential,
    ) -> Result<(), LedgerError>;

    /// Stream back the assembled file
    async fn fetch_assembled(&self, transfer_id: TransferId) -> Result<AssembledFile, LedgerError>;
}
