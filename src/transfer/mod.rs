//! Transfer Session Module
//!
//! Splits a file into a fixed number of chunks and pushes them to the
//! ledger one at a time, falling back to the staging store when the
//! network goes away.
//!
//! Resume paths:
//! 1. Ledger progress: ask the ledger for the last acknowledged chunk and
//!    continue from the next one (no local record needed)
//! 2. Local staging: replay the staged tail in chunk order (same client,
//!    earlier run failed mid-upload)

pub mod plan;
pub mod session;
pub mod types;

pub use plan::{ChunkPlan, DEFAULT_TOTAL_CHUNKS};
pub use session::TransferSession;
pub use types::*;
