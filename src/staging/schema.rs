//! Staging schema initialization

use sqlx::SqlitePool;

use super::StagingError;

/// Initialize the staging schema. Safe to run against an existing store.
pub async fn initialize_schema(pool: &SqlitePool) -> Result<(), StagingError> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Chunks waiting for delivery to the ledger
CREATE TABLE IF NOT EXISTS staged_chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    transfer_id INTEGER NOT NULL,
    chunk_number INTEGER NOT NULL,
    file_name TEXT NOT NULL,
    payload BLOB NOT NULL,
    staged_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_staged_chunks_transfer ON staged_chunks(transfer_id);
CREATE INDEX IF NOT EXISTS idx_staged_chunks_number ON staged_chunks(transfer_id, chunk_number);
"#;
