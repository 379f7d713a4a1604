//! Chunkferry Library
//!
//! Resumable chunked upload of large files with durable local staging of
//! unsent data.
//!
//! # Modules
//!
//! - `hash`: Content digests for files and chunks
//! - `staging`: SQLite store for chunks the ledger has not acknowledged
//! - `ledger`: HTTP client for the server-side transfer ledger
//! - `transfer`: Splitting policy and the chunk transfer state machine
//! - `orchestrator`: `Uploader` entry points used by front ends

pub mod config;
pub mod error;
pub mod hash;
pub mod ledger;
pub mod orchestrator;
pub mod staging;
pub mod transfer;

pub use error::{Result, TransferError};
pub use ledger::{Credential, LedgerClient, RemoteLedger, TransferId, TransferStatus};
pub use orchestrator::{DownloadOutcome, UploadOutcome, Uploader};
pub use staging::{ChunkStaging, StagingStore};
pub use transfer::{SessionConfig, UploadSource};
