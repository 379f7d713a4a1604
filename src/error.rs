//! Error types for chunkferry

use thiserror::Error;

use crate::hash::HashError;
use crate::ledger::{LedgerError, TransferId};
use crate::staging::StagingError;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, TransferError>;

/// Transfer error type
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Chunk count must be at least 1 (got {0})")]
    InvalidChunkCount(u32),

    #[error(transparent)]
    Read(#[from] HashError),

    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Connectivity was lost mid-upload; the unsent tail is staged locally
    #[error("Upload paused at chunk {next_chunk} of transfer {transfer_id} ({staged} chunks staged): {source}")]
    Paused {
        transfer_id: TransferId,
        next_chunk: u32,
        staged: u32,
        #[source]
        source: LedgerError,
    },

    #[error("Nothing to resume for transfer {0}: no staged chunks and no source file")]
    NothingToResume(TransferId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// Whether a later resume can continue this transfer
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Paused { .. })
    }
}
