//! Upload orchestrator
//!
//! Top-level entry points for front ends. Every call returns an outcome
//! value; failures are logged here and never escape as errors or panics.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{Result, TransferError};
use crate::ledger::{Credential, RemoteLedger, TransferId};
use crate::staging::{ChunkStaging, PendingTransfer, StagingError};
use crate::transfer::{ProgressSink, SessionConfig, TransferSession, TransferSummary, UploadSource};

// ============================================================================
// Outcomes
// ============================================================================

/// What the caller gets back from an upload or resume
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Every chunk acknowledged and the transfer marked completed
    Completed(TransferSummary),

    /// Connectivity lost; the remaining chunks are staged for a later resume
    Paused {
        transfer_id: TransferId,
        next_chunk: u32,
        staged: u32,
    },

    /// Anything else
    Failed {
        transfer_id: Option<TransferId>,
        reason: String,
    },
}

impl UploadOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn transfer_id(&self) -> Option<TransferId> {
        match self {
            Self::Completed(summary) => Some(summary.transfer_id),
            Self::Paused { transfer_id, .. } => Some(*transfer_id),
            Self::Failed { transfer_id, .. } => *transfer_id,
        }
    }
}

/// What the caller gets back from a download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved { path: PathBuf, bytes: u64 },
    Failed { reason: String },
}

// ============================================================================
// Uploader
// ============================================================================

/// Entry point owning the ledger, the staging store and the session policy
#[derive(Clone)]
pub struct Uploader {
    ledger: Arc<dyn RemoteLedger>,
    staging: Arc<dyn ChunkStaging>,
    config: SessionConfig,
    progress: Option<ProgressSink>,
}

impl Uploader {
    pub fn new(
        ledger: Arc<dyn RemoteLedger>,
        staging: Arc<dyn ChunkStaging>,
        config: SessionConfig,
    ) -> Self {
        Self {
            ledger,
            staging,
            config,
            progress: None,
        }
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn session(&self, credential: &Credential) -> TransferSession {
        let session = TransferSession::new(
            self.ledger.clone(),
            self.staging.clone(),
            self.config,
            credential.clone(),
        );

        match &self.progress {
            Some(sink) => session.with_progress(sink.clone()),
            None => session,
        }
    }

    /// Upload a file from disk, resuming `prior` when given
    pub async fn upload_path(
        &self,
        path: &Path,
        credential: &Credential,
        prior: Option<TransferId>,
    ) -> UploadOutcome {
        let source = match UploadSource::from_path(path).await {
            Ok(source) => source,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Cannot read upload source");
                return UploadOutcome::Failed {
                    transfer_id: prior,
                    reason: e.to_string(),
                };
            }
        };

        match prior {
            Some(transfer_id) => self.resume_upload(transfer_id, Some(&source), credential).await,
            None => self.upload_file(&source, credential).await,
        }
    }

    /// Start a new transfer for `source`
    pub async fn upload_file(&self, source: &UploadSource, credential: &Credential) -> UploadOutcome {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("upload", run_id = %run_id, file_name = %source.file_name);

        async {
            tracing::info!(size = source.len(), "Starting upload");

            let mut session = self.session(credential);
            let result = session.start_new(source).await;
            let transfer_id = session.session_state().map(|s| s.transfer_id);

            into_outcome(result, transfer_id)
        }
        .instrument(span)
        .await
    }

    /// Continue an interrupted transfer.
    ///
    /// Staged chunks for `transfer_id` take priority; without them the
    /// ledger's progress is used, which needs the original `source`.
    pub async fn resume_upload(
        &self,
        transfer_id: TransferId,
        source: Option<&UploadSource>,
        credential: &Credential,
    ) -> UploadOutcome {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("resume", run_id = %run_id, transfer_id = %transfer_id);

        async {
            let staged = match self.staging.count(transfer_id).await {
                Ok(count) => count,
                Err(e) => return into_outcome(Err(e.into()), Some(transfer_id)),
            };

            let mut session = self.session(credential);

            let result = if staged > 0 {
                tracing::info!(staged = staged, "Resuming from staged chunks");
                session.resume_from_staging(transfer_id).await
            } else if let Some(source) = source {
                tracing::info!("Resuming from ledger progress");
                session.resume_from_ledger(transfer_id, source).await
            } else {
                Err(TransferError::NothingToResume(transfer_id))
            };

            into_outcome(result, Some(transfer_id))
        }
        .instrument(span)
        .await
    }

    /// Fetch the assembled file into `dest_dir`
    pub async fn download(&self, transfer_id: TransferId, dest_dir: &Path) -> DownloadOutcome {
        match self.save_assembled(transfer_id, dest_dir).await {
            Ok((path, bytes)) => {
                tracing::info!(
                    transfer_id = %transfer_id,
                    path = %path.display(),
                    bytes = bytes,
                    "Download complete"
                );
                DownloadOutcome::Saved { path, bytes }
            }
            Err(e) => {
                tracing::error!(transfer_id = %transfer_id, error = %e, "Download failed");
                DownloadOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Transfers that still hold staged chunks
    pub async fn pending(&self) -> std::result::Result<Vec<PendingTransfer>, StagingError> {
        self.staging.pending_transfers().await
    }

    async fn save_assembled(&self, transfer_id: TransferId, dest_dir: &Path) -> Result<(PathBuf, u64)> {
        let mut assembled = self.ledger.fetch_assembled(transfer_id).await?;

        tokio::fs::create_dir_all(dest_dir).await?;
        let path = dest_dir.join(&assembled.file_name);
        let mut file = tokio::fs::File::create(&path).await?;

        let mut written = 0u64;
        while let Some(piece) = assembled.stream.next().await {
            let piece = piece?;
            file.write_all(&piece).await?;
            written += piece.len() as u64;
        }
        file.flush().await?;

        Ok((path, written))
    }
}

fn into_outcome(result: Result<TransferSummary>, transfer_id: Option<TransferId>) -> UploadOutcome {
    match result {
        Ok(summary) => {
            tracing::info!(
                transfer_id = %summary.transfer_id,
                chunks_sent = summary.chunks_sent,
                "Upload completed"
            );
            UploadOutcome::Completed(summary)
        }
        Err(TransferError::Paused {
            transfer_id,
            next_chunk,
            staged,
            source,
        }) => {
            tracing::warn!(
                transfer_id = %transfer_id,
                next_chunk = next_chunk,
                staged = staged,
                error = %source,
                "Upload paused, will resume"
            );
            UploadOutcome::Paused {
                transfer_id,
                next_chunk,
                staged,
            }
        }
        Err(e) => {
            tracing::error!(transfer_id = ?transfer_id, error = %e, "Upload failed");
            UploadOutcome::Failed {
                transfer_id,
                reason: e.to_string(),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
