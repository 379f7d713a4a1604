//! HTTP implementation of the remote ledger

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};

use super::types::{
    AssembledFile, ChunkAck, CreateTransferRequest, CreateTransferResponse, Credential,
    LastChunkResponse, LedgerError, TransferId, TransferStatus, UpdateStatusRequest,
};
use super::RemoteLedger;

/// Header carrying the credential token
pub const CREDENTIAL_HEADER: &str = "X-CSRFToken";

/// Prefix for downloads without a usable `Content-Disposition`
pub const DEFAULT_DOWNLOAD_PREFIX: &str = "transfer";

// ============================================================================
// Ledger Client
// ============================================================================

/// reqwest-backed ledger client
#[derive(Clone)]
pub struct LedgerClient {
    http: reqwest::Client,
    base_url: String,
}

impl LedgerClient {
    /// Create a client for the given base URL
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, LedgerError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let http = builder
            .build()
            .map_err(|e| LedgerError::ClientSetup(e.to_string()))?;

        Ok(Self::with_client(http, base_url))
    }

    /// Wrap an existing reqwest client
    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl RemoteLedger for LedgerClient {
    async fn create_transfer(
        &self,
        file_name: &str,
        total_chunks: u32,
        file_hash: &str,
        credential: &Credential,
    ) -> Result<TransferId, LedgerError> {
        let request = CreateTransferRequest {
            file_name: file_name.to_string(),
            md5_checksum: file_hash.to_string(),
            number_of_chunks: total_chunks,
        };

        let response = send(
            self.http
                .post(self.url("/transfers"))
                .header(CREDENTIAL_HEADER, credential.token())
                .json(&request),
        )
        .await?;

        let created: CreateTransferResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(format!("create transfer: {}", e)))?;

        tracing::info!(
            transfer_id = %created.id,
            file_name = %file_name,
            total_chunks = total_chunks,
            "Transfer record created"
        );

        Ok(created.id)
    }

    async fn push_chunk(
        &self,
        transfer_id: TransferId,
        chunk_number: u32,
        payload: &[u8],
        chunk_hash: &str,
        credential: &Credential,
    ) -> Result<ChunkAck, LedgerError> {
        let part = Part::bytes(payload.to_vec())
            .file_name(format!("chunk-{}-{}", transfer_id, chunk_number));

        let form = Form::new()
            .part("file", part)
            .text("chunk_number", chunk_number.to_string())
            .text("master_file", transfer_id.to_string())
            .text("md5_checksum", chunk_hash.to_string());

        let response = send(
            self.http
                .post(self.url(&format!("/transfers/{}/chunks", transfer_id)))
                .header(CREDENTIAL_HEADER, credential.token())
                .multipart(form),
        )
        .await?;

        let body = response
            .bytes()
            .await
            .map_err(|e| LedgerError::NetworkUnavailable(e.to_string()))?;

        let body = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body)
                .map_err(|e| LedgerError::InvalidResponse(format!("chunk ack: {}", e)))?
        };

        Ok(ChunkAck { chunk_number, body })
    }

    async fn last_acknowledged_chunk(
        &self,
        transfer_id: TransferId,
    ) -> Result<Option<u32>, LedgerError> {
        let response = self
            .http
            .get(self.url(&format!("/transfers/{}/last-chunk", transfer_id)))
            .send()
            .await
            .map_err(network_error)?;

        // Not found means nothing has been acknowledged yet
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(transfer_id = %transfer_id, "No acknowledged chunks on ledger");
            return Ok(None);
        }

        let last: LastChunkResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(format!("last chunk: {}", e)))?;

        Ok(last.chunk_number)
    }

    async fn update_status(
        &self,
        transfer_id: TransferId,
        status: TransferStatus,
        credential: &Credential,
    ) -> Result<(), LedgerError> {
        send(
            self.http
                .patch(self.url(&format!("/transfers/{}", transfer_id)))
                .header(CREDENTIAL_HEADER, credential.token())
                .json(&UpdateStatusRequest { status }),
        )
        .await?;

        tracing::debug!(transfer_id = %transfer_id, status = %status, "Transfer status updated");

        Ok(())
    }

    async fn fetch_assembled(&self, transfer_id: TransferId) -> Result<AssembledFile, LedgerError> {
        let response = send(
            self.http
                .get(self.url(&format!("/transfers/{}/download", transfer_id))),
        )
        .await?;

        let file_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| default_download_name(transfer_id));

        let stream = response
            .bytes_stream()
            .map(|item| {
                item.map(|bytes| bytes.to_vec())
                    .map_err(|e| LedgerError::NetworkUnavailable(e.to_string()))
            })
            .boxed();

        Ok(AssembledFile { file_name, stream })
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn send(request: RequestBuilder) -> Result<Response, LedgerError> {
    let response = request.send().await.map_err(network_error)?;
    check_status(response).await
}

async fn check_status(response: Response) -> Result<Response, LedgerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let reason = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("unknown").to_string()
    } else {
        body
    };

    Err(LedgerError::RemoteRejected {
        status: status.as_u16(),
        reason,
    })
}

fn network_error(e: reqwest::Error) -> LedgerError {
    if e.is_timeout() {
        LedgerError::NetworkUnavailable(format!("request timed out: {}", e))
    } else {
        LedgerError::NetworkUnavailable(e.to_string())
    }
}

/// Default name used when the server suggests none
pub fn default_download_name(transfer_id: TransferId) -> String {
    format!("{}-{}.bin", DEFAULT_DOWNLOAD_PREFIX, transfer_id)
}

/// Extract a file name from a `Content-Disposition` value.
///
/// `filename*` (RFC 5987) wins over `filename`. Directory components are
/// stripped so the name can be joined onto a destination directory.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in value.split(';').map(str::trim) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };

        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                // charset'language'percent-encoded
                if let Some(encoded) = raw.trim().splitn(3, '\'').nth(2) {
                    extended = urlencoding::decode(encoded).ok().map(|s| s.into_owned());
                }
            }
            "filename" => {
                plain = Some(raw.trim().trim_matches('"').to_string());
            }
            _ => {}
        }
    }

    extended
        .or(plain)
        .and_then(|name| {
            Path::new(&name)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .filter(|name| !name.is_empty())
}

// ============================================================================
// Tests
// ============================================================================
