//! Transfer Session
//!
//! Drives one file through the ledger a chunk at a time:
//!
//! `NotStarted → RecordCreated → ChunkInFlight → ChunkAcked → AllAcked → Completed`
//!
//! A connectivity failure on any push stages every chunk from the failing
//! index to the end and leaves the session in `Staged`. Nothing is retried
//! within a run; a later resume picks the transfer up again, either from the
//! ledger's last acknowledged chunk or from the staged tail.

use std::cmp::Reverse;
use std::sync::Arc;

use crate::error::{Result, TransferError};
use crate::hash::HashEngine;
use crate::ledger::{ChunkAck, Credential, LedgerError, RemoteLedger, TransferId, TransferStatus};
use crate::staging::{ChunkStaging, StagedChunk};

use super::plan::ChunkPlan;
use super::types::{
    Chunk, ProgressSink, SessionConfig, SessionState, TransferState, TransferSummary, UploadSource,
};

// ============================================================================
// Transfer Session
// ============================================================================

/// One upload run against one transfer
pub struct TransferSession {
    ledger: Arc<dyn RemoteLedger>,
    staging: Arc<dyn ChunkStaging>,
    config: SessionConfig,
    engine: HashEngine,
    credential: Credential,
    state: TransferState,
    session: Option<SessionState>,
    progress: Option<ProgressSink>,
}

impl TransferSession {
    pub fn new(
        ledger: Arc<dyn RemoteLedger>,
        staging: Arc<dyn ChunkStaging>,
        config: SessionConfig,
        credential: Credential,
    ) -> Self {
        Self {
            ledger,
            staging,
            engine: HashEngine::new(config.hash_algorithm),
            config,
            credential,
            state: TransferState::NotStarted,
            session: None,
            progress: None,
        }
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn session_state(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    fn transition(&mut self, next: TransferState) {
        tracing::debug!(from = ?self.state, to = ?next, "Transfer state change");
        self.state = next;
    }

    // ========================================================================
    // Entry Points
    // ========================================================================

    /// Create a transfer record and send every chunk
    pub async fn start_new(&mut self, source: &UploadSource) -> Result<TransferSummary> {
        let plan = ChunkPlan::new(source.len(), self.config.total_chunks)?;
        let file_hash = source.digest(&self.engine).await?;

        let transfer_id = self
            .ledger
            .create_transfer(
                &source.file_name,
                plan.total_chunks(),
                file_hash.as_str(),
                &self.credential,
            )
            .await?;

        self.transition(TransferState::RecordCreated);

        self.run_from(transfer_id, source, plan, 0).await
    }

    /// Continue from the chunk after the ledger's last acknowledgment
    pub async fn resume_from_ledger(
        &mut self,
        transfer_id: TransferId,
        source: &UploadSource,
    ) -> Result<TransferSummary> {
        let plan = ChunkPlan::new(source.len(), self.config.total_chunks)?;

        let start = match self.ledger.last_acknowledged_chunk(transfer_id).await? {
            Some(last) if last < plan.total_chunks() => last + 1,
            Some(last) => {
                return Err(LedgerError::InvalidResponse(format!(
                    "last acknowledged chunk {} is outside a {}-chunk transfer",
                    last,
                    plan.total_chunks()
                ))
                .into());
            }
            None => 0,
        };

        tracing::info!(
            transfer_id = %transfer_id,
            start_chunk = start,
            total_chunks = plan.total_chunks(),
            "Resuming from ledger progress"
        );

        self.transition(TransferState::RecordCreated);

        self.run_from(transfer_id, source, plan, start).await
    }

    /// Replay the locally staged chunks, lowest chunk number first
    pub async fn resume_from_staging(&mut self, transfer_id: TransferId) -> Result<TransferSummary> {
        let staged = replay_order(self.staging.list(transfer_id).await?);
        if staged.is_empty() {
            return Err(TransferError::NothingToResume(transfer_id));
        }

        let total = staged.len() as u32;
        let highest = staged.last().map(|c| c.chunk_number).unwrap_or(0);

        tracing::info!(
            transfer_id = %transfer_id,
            staged_chunks = total,
            first_chunk = staged[0].chunk_number,
            "Replaying staged chunks"
        );

        self.session = Some(SessionState {
            transfer_id,
            total_chunks: highest + 1,
            chunk_size: staged.iter().map(|c| c.payload.len() as u64).max().unwrap_or(0),
            next_chunk_index: staged[0].chunk_number,
            credential: self.credential.clone(),
        });
        self.transition(TransferState::RecordCreated);

        let mut cleared = 0u64;

        for (sent, chunk) in staged.iter().enumerate() {
            let hash = self.engine.digest(&chunk.payload);

            // Staged rows stay in place on failure; they are still the unsent tail
            if let Err(e) = self
                .push(transfer_id, chunk.chunk_number, &chunk.payload, hash.as_str())
                .await
            {
                if e.is_connectivity() {
                    self.transition(TransferState::Staged);
                    return Err(TransferError::Paused {
                        transfer_id,
                        next_chunk: chunk.chunk_number,
                        staged: total - sent as u32,
                        source: e,
                    });
                }
                return Err(e.into());
            }

            // Acknowledged chunks leave the store, duplicates included
            cleared += self.staging.remove(transfer_id, chunk.chunk_number).await?;
            self.acknowledge(chunk.chunk_number, sent as u32 + 1, total);
        }

        self.finish(transfer_id, total, cleared).await
    }

    // ========================================================================
    // Chunk Loop
    // ========================================================================

    async fn run_from(
        &mut self,
        transfer_id: TransferId,
        source: &UploadSource,
        plan: ChunkPlan,
        start: u32,
    ) -> Result<TransferSummary> {
        let total = plan.total_chunks();

        self.session = Some(SessionState {
            transfer_id,
            total_chunks: total,
            chunk_size: plan.chunk_size(),
            next_chunk_index: start,
            credential: self.credential.clone(),
        });

        let mut sent = 0u32;

        for index in start..total {
            let chunk = self.chunk(transfer_id, source, &plan, index).await?;

            match self
                .push(transfer_id, index, &chunk.payload, chunk.content_hash.as_str())
                .await
            {
                Ok(_) => {
                    sent += 1;
                    self.acknowledge(index, index + 1, total);

                    // Marks the transfer as started once per run
                    if sent == 1 {
                        self.ledger
                            .update_status(transfer_id, TransferStatus::InProgress, &self.credential)
                            .await?;
                    }
                }
                Err(e) if e.is_connectivity() => {
                    tracing::warn!(
                        transfer_id = %transfer_id,
                        chunk_number = index,
                        error = %e,
                        "Connectivity lost, staging remaining chunks"
                    );

                    let staged = self.stage_tail(transfer_id, source, &plan, index).await?;
                    self.transition(TransferState::Staged);

                    return Err(TransferError::Paused {
                        transfer_id,
                        next_chunk: index,
                        staged,
                        source: e,
                    });
                }
                Err(e) => {
                    tracing::error!(
                        transfer_id = %transfer_id,
                        chunk_number = index,
                        error = %e,
                        "Chunk rejected by ledger"
                    );
                    return Err(e.into());
                }
            }
        }

        self.finish(transfer_id, sent, 0).await
    }

    async fn chunk(
        &self,
        transfer_id: TransferId,
        source: &UploadSource,
        plan: &ChunkPlan,
        index: u32,
    ) -> Result<Chunk> {
        let byte_range = plan.range(index);
        let payload = source.read_range(byte_range.clone()).await?;

        Ok(Chunk {
            transfer_id,
            chunk_number: index,
            content_hash: self.engine.digest(&payload),
            byte_range,
            payload,
        })
    }

    async fn push(
        &mut self,
        transfer_id: TransferId,
        chunk_number: u32,
        payload: &[u8],
        chunk_hash: &str,
    ) -> std::result::Result<ChunkAck, LedgerError> {
        self.transition(TransferState::ChunkInFlight(chunk_number));

        if self.config.fault_injection.network_failure_at == Some(chunk_number) {
            return Err(LedgerError::NetworkUnavailable(format!(
                "simulated network failure at chunk {}",
                chunk_number
            )));
        }

        self.ledger
            .push_chunk(transfer_id, chunk_number, payload, chunk_hash, &self.credential)
            .await
    }

    fn acknowledge(&mut self, chunk_number: u32, acknowledged: u32, total: u32) {
        self.transition(TransferState::ChunkAcked(chunk_number));

        if let Some(session) = self.session.as_mut() {
            session.next_chunk_index = chunk_number + 1;
        }

        if let Some(progress) = &self.progress {
            progress(acknowledged, total);
        }
    }

    /// Stage chunks `from..total` in order
    async fn stage_tail(
        &self,
        transfer_id: TransferId,
        source: &UploadSource,
        plan: &ChunkPlan,
        from: u32,
    ) -> Result<u32> {
        for index in from..plan.total_chunks() {
            let payload = source.read_range(plan.range(index)).await?;

            self.staging
                .put(transfer_id, index, &source.file_name, &payload)
                .await?;
        }

        let staged = plan.total_chunks() - from;
        tracing::info!(
            transfer_id = %transfer_id,
            from_chunk = from,
            staged = staged,
            "Remaining chunks staged for resume"
        );

        Ok(staged)
    }

    /// Mark completed, then purge the staged rows
    async fn finish(
        &mut self,
        transfer_id: TransferId,
        chunks_sent: u32,
        cleared_during_run: u64,
    ) -> Result<TransferSummary> {
        self.transition(TransferState::AllAcked);

        self.ledger
            .update_status(transfer_id, TransferStatus::Completed, &self.credential)
            .await?;

        let staged_cleared = cleared_during_run + self.staging.clear(transfer_id).await?;
        self.transition(TransferState::Completed);

        let total_chunks = self
            .session
            .as_ref()
            .map(|s| s.total_chunks)
            .unwrap_or(chunks_sent);

        tracing::info!(
            transfer_id = %transfer_id,
            chunks_sent = chunks_sent,
            staged_cleared = staged_cleared,
            "Transfer completed"
        );

        Ok(TransferSummary {
            transfer_id,
            chunks_sent,
            total_chunks,
            staged_cleared,
        })
    }
}

/// Sort by chunk number and keep only the newest row per chunk
fn replay_order(mut staged: Vec<StagedChunk>) -> Vec<StagedChunk> {
    staged.sort_by_key(|c| (c.chunk_number, Reverse(c.key)));
    staged.dedup_by_key(|c| c.chunk_number);
    staged
}

// ============================================================================
// Tests
// ============================================================================
