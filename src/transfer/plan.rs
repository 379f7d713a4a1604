//! Splitting policy
//!
//! A file is cut into exactly `total_chunks` pieces of
//! `ceil(file_size / total_chunks)` bytes; the last piece holds whatever
//! remains and trailing pieces may be empty for tiny files.

use std::ops::Range;

use crate::error::TransferError;

/// Default number of pieces per file
pub const DEFAULT_TOTAL_CHUNKS: u32 = 5;

/// Chunk boundaries for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    file_size: u64,
    total_chunks: u32,
    chunk_size: u64,
}

impl ChunkPlan {
    pub fn new(file_size: u64, total_chunks: u32) -> Result<Self, TransferError> {
        if total_chunks == 0 {
            return Err(TransferError::InvalidChunkCount(total_chunks));
        }

        Ok(Self {
            file_size,
            total_chunks,
            chunk_size: file_size.div_ceil(total_chunks as u64),
        })
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Byte range of chunk `index`, clamped to the file size
    pub fn range(&self, index: u32) -> Range<u64> {
        let start = (index as u64 * self.chunk_size).min(self.file_size);
        let end = (start + self.chunk_size).min(self.file_size);
        start..end
    }

    /// All ranges in chunk order
    pub fn ranges(&self) -> impl Iterator<Item = Range<u64>> + '_ {
        (0..self.total_chunks).map(|i| self.range(i))
    }
}
