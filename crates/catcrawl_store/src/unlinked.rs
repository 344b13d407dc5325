//! Journal of datasets the catalog marks scanned without a file id link.
//!
//! An entry is written when the store insert fails (no `file_id` yet) or when
//! the link patch fails after a successful insert.

use crate::error::{Result, StoreError};
use crate::files::path_text;
use crate::types::{FileId, UnlinkedDataset, UnlinkedEntry};
use crate::MetadataDb;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

impl MetadataDb {
    /// Journal a failed attempt.
    ///
    /// Recording the same dataset again replaces the details and bumps
    /// `attempts`. A known `file_id` is never cleared by a later entry
    /// without one.
    pub async fn record_unlinked(&self, entry: &UnlinkedEntry) -> Result<()> {
        let file_path = path_text(&entry.file.path)?;
        let size = i64::try_from(entry.file.size).map_err(|_| {
            StoreError::invalid_data(format!("file too large: {} bytes", entry.file.size))
        })?;

        sqlx::query(
            r#"INSERT INTO unlinked_datasets
                   (dataset_path, version_id, file_path, size, checksum, file_id, error,
                    attempts, recorded_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?)
               ON CONFLICT(dataset_path) DO UPDATE SET
                   version_id = excluded.version_id,
                   file_path = excluded.file_path,
                   size = excluded.size,
                   checksum = excluded.checksum,
                   file_id = COALESCE(excluded.file_id, unlinked_datasets.file_id),
                   error = excluded.error,
                   attempts = unlinked_datasets.attempts + 1,
                   recorded_at = excluded.recorded_at"#,
        )
        .bind(&entry.dataset_path)
        .bind(&entry.version_id)
        .bind(&file_path)
        .bind(size)
        .bind(&entry.file.checksum)
        .bind(entry.file_id.map(|id| id.get()))
        .bind(&entry.error)
        .bind(Self::now_millis())
        .execute(&self.pool)
        .await?;

        debug!(
            dataset = %entry.dataset_path,
            file_id = ?entry.file_id.map(|id| id.get()),
            "Journaled unlinked dataset"
        );
        Ok(())
    }

    /// All journaled datasets, oldest first.
    pub async fn list_unlinked(&self) -> Result<Vec<UnlinkedDataset>> {
        let rows = sqlx::query(
            r#"SELECT dataset_path, version_id, file_path, size, checksum, file_id, error,
                      attempts, recorded_at
               FROM unlinked_datasets
               ORDER BY recorded_at, dataset_path"#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_unlinked).collect()
    }

    /// Remove a dataset from the journal once its link is attached.
    ///
    /// Returns whether an entry was removed.
    pub async fn resolve_unlinked(&self, dataset_path: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM unlinked_datasets WHERE dataset_path = ?")
            .bind(dataset_path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_unlinked(row: &SqliteRow) -> Result<UnlinkedDataset> {
    let attempts: i64 = row.get("attempts");
    let size: i64 = row.get("size");
    let file_id: Option<i64> = row.get("file_id");
    Ok(UnlinkedDataset {
        dataset_path: row.get("dataset_path"),
        version_id: row.get("version_id"),
        file_path: row.get("file_path"),
        size: u64::try_from(size)
            .map_err(|_| StoreError::invalid_data(format!("negative file size: {}", size)))?,
        checksum: row.get("checksum"),
        file_id: file_id.map(FileId::new),
        error: row.get("error"),
        attempts: u32::try_from(attempts)
            .map_err(|_| StoreError::invalid_data(format!("invalid attempt count: {}", attempts)))?,
        recorded_at: MetadataDb::millis_to_datetime(row.get("recorded_at")),
    })
}
