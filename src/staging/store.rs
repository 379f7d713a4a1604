//! SQLite-backed staging store
//!
//! The pool is opened lazily on first use and shared by every clone of the
//! store, so concurrent first callers perform exactly one open and one
//! schema initialization.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use tokio::sync::OnceCell;

use super::schema::initialize_schema;
use super::{ChunkStaging, PendingTransfer, StagedChunk, StagingError};
use crate::ledger::TransferId;

// ============================================================================
// Staging Store
// ============================================================================

/// Process-wide durable staging store
#[derive(Clone)]
pub struct StagingStore {
    inner: Arc<StagingStoreInner>,
}

struct StagingStoreInner {
    /// Where the database lives
    location: StoreLocation,

    /// Opened on first use
    pool: OnceCell<SqlitePool>,
}

#[derive(Debug, Clone)]
enum StoreLocation {
    Url(String),
    Path(PathBuf),
}

#[derive(sqlx::FromRow)]
struct StagedChunkRow {
    id: i64,
    transfer_id: i64,
    chunk_number: i64,
    file_name: String,
    payload: Vec<u8>,
    staged_at: String,
}

impl From<StagedChunkRow> for StagedChunk {
    fn from(row: StagedChunkRow) -> Self {
        Self {
            key: row.id,
            transfer_id: TransferId(row.transfer_id),
            chunk_number: row.chunk_number as u32,
            file_name: row.file_name,
            payload: row.payload,
            staged_at: row.staged_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PendingTransferRow {
    transfer_id: i64,
    file_name: String,
    staged_chunks: i64,
}

impl StagingStore {
    /// Create a store for a `sqlite:` URL; nothing is opened until first use
    pub fn lazy(database_url: impl Into<String>) -> Self {
        Self::with_location(StoreLocation::Url(database_url.into()))
    }

    /// Create a store for a database file path; nothing is opened until first use
    pub fn lazy_at(path: impl AsRef<Path>) -> Self {
        Self::with_location(StoreLocation::Path(path.as_ref().to_path_buf()))
    }

    /// Open eagerly, surfacing `StoreUnavailable` immediately
    pub async fn connect(database_url: impl Into<String>) -> Result<Self, StagingError> {
        let store = Self::lazy(database_url);
        store.pool().await?;
        Ok(store)
    }

    fn with_location(location: StoreLocation) -> Self {
        Self {
            inner: Arc::new(StagingStoreInner {
                location,
                pool: OnceCell::new(),
            }),
        }
    }

    /// Get the pool, opening it and initializing the schema on first call
    async fn pool(&self) -> Result<&SqlitePool, StagingError> {
        self.inner
            .pool
            .get_or_try_init(|| open_pool(&self.inner.location))
            .await
    }
}

async fn open_pool(location: &StoreLocation) -> Result<SqlitePool, StagingError> {
    let options = match location {
        StoreLocation::Url(url) => SqliteConnectOptions::from_str(url)
            .map_err(|e| StagingError::StoreUnavailable(format!("{}: {}", url, e)))?,
        StoreLocation::Path(path) => SqliteConnectOptions::new().filename(path),
    }
    .create_if_missing(true)
    .journal_mode(SqliteJournalMode::Wal)
    .synchronous(SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| StagingError::StoreUnavailable(format!("{:?}: {}", location, e)))?;

    initialize_schema(&pool).await?;

    tracing::debug!(location = ?location, "Staging store opened");

    Ok(pool)
}

#[async_trait]
impl ChunkStaging for StagingStore {
    async fn put(
        &self,
        transfer_id: TransferId,
        chunk_number: u32,
        file_name: &str,
        payload: &[u8],
    ) -> Result<(), StagingError> {
        let pool = self.pool().await?;

        sqlx::query(
            r#"
            INSERT INTO staged_chunks (transfer_id, chunk_number, file_name, payload, staged_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(transfer_id.0)
        .bind(chunk_number as i64)
        .bind(file_name)
        .bind(payload)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;

        tracing::debug!(
            transfer_id = %transfer_id,
            chunk_number = chunk_number,
            size = payload.len(),
            "Chunk staged"
        );

        Ok(())
    }

    async fn list(&self, transfer_id: TransferId) -> Result<Vec<StagedChunk>, StagingError> {
        let pool = self.pool().await?;

        let rows = sqlx::query_as::<_, StagedChunkRow>(
            r#"
            SELECT id, transfer_id, chunk_number, file_name, payload, staged_at
            FROM staged_chunks
            WHERE transfer_id = ?
            "#,
        )
        .bind(transfer_id.0)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(StagedChunk::from).collect())
    }

    async fn remove(&self, transfer_id: TransferId, chunk_number: u32) -> Result<u64, StagingError> {
        let pool = self.pool().await?;

        let result = sqlx::query(
            "DELETE FROM staged_chunks WHERE transfer_id = ? AND chunk_number = ?",
        )
        .bind(transfer_id.0)
        .bind(chunk_number as i64)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn clear(&self, transfer_id: TransferId) -> Result<u64, StagingError> {
        let pool = self.pool().await?;

        let result = sqlx::query("DELETE FROM staged_chunks WHERE transfer_id = ?")
            .bind(transfer_id.0)
            .execute(pool)
            .await?;

        let removed = result.rows_affected();
        tracing::debug!(transfer_id = %transfer_id, removed = removed, "Staged chunks cleared");

        Ok(removed)
    }

    async fn count(&self, transfer_id: TransferId) -> Result<u64, StagingError> {
        let pool = self.pool().await?;

        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM staged_chunks WHERE transfer_id = ?",
        )
        .bind(transfer_id.0)
        .fetch_one(pool)
        .await?;

        Ok(count as u64)
    }

    async fn pending_transfers(&self) -> Result<Vec<PendingTransfer>, StagingError> {
        let pool = self.pool().await?;

        let rows = sqlx::query_as::<_, PendingTransferRow>(
            r#"
            SELECT transfer_id, MIN(file_name) AS file_name, COUNT(*) AS staged_chunks
            FROM staged_chunks
            GROUP BY transfer_id
            ORDER BY transfer_id
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PendingTransfer {
                transfer_id: TransferId(row.transfer_id),
                file_name: row.file_name,
                staged_chunks: row.staged_chunks as u64,
            })
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, StagingStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = StagingStore::lazy_at(temp_dir.path().join("staging.db"));
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_put_and_list() {
        let (_dir, store) = temp_store();
        let id = TransferId(1);

        store.put(id, 0, "testFile", b"testChunk").await.unwrap();

        let chunks = store.list(id).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].file_name, "testFile");
        assert_eq!(chunks[0].chunk_number, 0);
        assert_eq!(chunks[0].payload, b"testChunk");
        assert_eq!(chunks[0].transfer_id, id);
    }

    #[tokio::test]
    async fn test_duplicates_accumulate_and_clear_removes_all() {
        let (_dir, store) = temp_store();
        let id = TransferId(7);

        store.put(id, 3, "big.bin", b"same").await.unwrap();
        store.put(id, 3, "big.bin", b"same").await.unwrap();
        assert_eq!(store.count(id).await.unwrap(), 2);

        let removed = store.clear(id).await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.list(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_drops_every_row_for_one_chunk() {
        let (_dir, store) = temp_store();
        let id = TransferId(3);

        store.put(id, 2, "big.bin", b"old").await.unwrap();
        store.put(id, 2, "big.bin", b"new").await.unwrap();
        store.put(id, 3, "big.bin", b"next").await.unwrap();
        store.put(TransferId(4), 2, "other.bin", b"keep").await.unwrap();

        assert_eq!(store.remove(id, 2).await.unwrap(), 2);
        assert_eq!(store.remove(id, 2).await.unwrap(), 0);

        let left: Vec<u32> = store.list(id).await.unwrap().iter().map(|c| c.chunk_number).collect();
        assert_eq!(left, vec![3]);
        assert_eq!(store.count(TransferId(4)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transfers_are_partitioned() {
        let (_dir, store) = temp_store();

        store.put(TransferId(1), 0, "a.bin", b"a0").await.unwrap();
        store.put(TransferId(2), 0, "b.bin", b"b0").await.unwrap();
        store.put(TransferId(2), 1, "b.bin", b"b1").await.unwrap();

        store.clear(TransferId(1)).await.unwrap();

        assert!(store.list(TransferId(1)).await.unwrap().is_empty());
        assert_eq!(store.list(TransferId(2)).await.unwrap().len(), 2);

        let pending = store.pending_transfers().await.unwrap();
        assert_eq!(
            pending,
            vec![PendingTransfer {
                transfer_id: TransferId(2),
                file_name: "b.bin".to_string(),
                staged_chunks: 2,
            }]
        );
    }

    #[tokio::test]
    async fn test_reopen_keeps_existing_data() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("staging.db");

        {
            let store = StagingStore::lazy_at(&path);
            store.put(TransferId(9), 2, "keep.bin", b"payload").await.unwrap();
        }

        let reopened = StagingStore::lazy_at(&path);
        let chunks = reopened.list(TransferId(9)).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_number, 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_open() {
        let (_dir, store) = temp_store();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.put(TransferId(i), 0, "c.bin", b"x").await.unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.pending_transfers().await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_unopenable_location_is_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let store = StagingStore::lazy_at(temp_dir.path().join("missing-dir").join("staging.db"));

        let result = store.count(TransferId(1)).await;
        assert!(matches!(result, Err(StagingError::StoreUnavailable(_))));
    }
}
