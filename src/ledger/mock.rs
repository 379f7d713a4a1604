//! Recording ledger for unit tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;

use super::types::{AssembledFile, ChunkAck, Credential, LedgerError, TransferId, TransferStatus};
use super::RemoteLedger;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create { file_name: String, total_chunks: u32, file_hash: String },
    Push { transfer_id: TransferId, chunk_number: u32, chunk_hash: String },
    LastChunk(TransferId),
    Status(TransferId, TransferStatus),
    Fetch(TransferId),
}

#[derive(Debug, Clone, Copy)]
pub enum MockFailure {
    Network,
    Rejected(u16),
}

pub struct MockLedger {
    transfer_id: TransferId,
    last_ack: Option<u32>,
    calls: Mutex<Vec<Call>>,
    payloads: Mutex<Vec<(u32, Vec<u8>)>>,
    push_failures: Mutex<HashMap<u32, MockFailure>>,
}

impl MockLedger {
    pub fn new(transfer_id: i64) -> Self {
        Self {
            transfer_id: TransferId(transfer_id),
            last_ack: None,
            calls: Mutex::new(Vec::new()),
            payloads: Mutex::new(Vec::new()),
            push_failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_last_ack(mut self, last_ack: Option<u32>) -> Self {
        self.last_ack = last_ack;
        self
    }

    pub fn fail_push(self, chunk_number: u32, failure: MockFailure) -> Self {
        self.push_failures.lock().unwrap().insert(chunk_number, failure);
        self
    }

    pub fn heal(&self) {
        self.push_failures.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Chunk numbers of pushes that were acknowledged, in order
    pub fn acked_chunks(&self) -> Vec<u32> {
        self.payloads.lock().unwrap().iter().map(|(n, _)| *n).collect()
    }

    pub fn payloads(&self) -> Vec<(u32, Vec<u8>)> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<TransferStatus> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Status(_, status) => Some(status),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RemoteLedger for MockLedger {
    async fn create_transfer(
        &self,
        file_name: &str,
        total_chunks: u32,
        file_hash: &str,
        _credential: &Credential,
    ) -> Result<TransferId, LedgerError> {
        self.record(Call::Create {
            file_name: file_name.to_string(),
            total_chunks,
            file_hash: file_hash.to_string(),
        });
        Ok(self.transfer_id)
    }

    async fn push_chunk(
        &self,
        transfer_id: TransferId,
        chunk_number: u32,
        payload: &[u8],
        chunk_hash: &str,
        _credential: &Credential,
    ) -> Result<ChunkAck, LedgerError> {
        self.record(Call::Push {
            transfer_id,
            chunk_number,
            chunk_hash: chunk_hash.to_string(),
        });

        let failure = self.push_failures.lock().unwrap().get(&chunk_number).copied();
        match failure {
            Some(MockFailure::Network) => {
                Err(LedgerError::NetworkUnavailable("connection refused".to_string()))
            }
            Some(MockFailure::Rejected(status)) => Err(LedgerError::RemoteRejected {
                status,
                reason: "checksum mismatch".to_string(),
            }),
            None => {
                self.payloads.lock().unwrap().push((chunk_number, payload.to_vec()));
                Ok(ChunkAck {
                    chunk_number,
                    body: serde_json::json!({ "success": true }),
                })
            }
        }
    }

    async fn last_acknowledged_chunk(
        &self,
        transfer_id: TransferId,
    ) -> Result<Option<u32>, LedgerError> {
        self.record(Call::LastChunk(transfer_id));
        Ok(self.last_ack)
    }

    async fn update_status(
        &self,
        transfer_id: TransferId,
        status: TransferStatus,
        _credential: &Credential,
    ) -> Result<(), LedgerError> {
        self.record(Call::Status(transfer_id, status));
        Ok(())
    }

    async fn fetch_assembled(&self, transfer_id: TransferId) -> Result<AssembledFile, LedgerError> {
        self.record(Call::Fetch(transfer_id));

        let data: Vec<u8> = self
            .payloads()
            .into_iter()
            .flat_map(|(_, payload)| payload)
            .collect();

        Ok(AssembledFile {
            file_name: format!("assembled-{}.bin", transfer_id),
            stream: futures::stream::iter(vec![Ok(data)]).boxed(),
        })
    }
}
