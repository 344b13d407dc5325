//! File record operations.

use crate::error::{Result, StoreError};
use crate::types::{FileId, FileRecord, NewFileRecord, UpsertResult};
use crate::MetadataDb;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::path::Path;
use tracing::debug;

impl MetadataDb {
    /// Insert a verified file, or refresh the existing row for the same path.
    ///
    /// Returns the file id either way, so recording a file twice yields the
    /// same id.
    pub async fn upsert_file(&self, file: &NewFileRecord) -> Result<UpsertResult> {
        let path = path_text(&file.path)?;
        let size = i64::try_from(file.size)
            .map_err(|_| StoreError::invalid_data(format!("file too large: {} bytes", file.size)))?;
        let now = Self::now_millis();

        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> = sqlx::query_scalar("SELECT file_id FROM files WHERE path = ?")
            .bind(&path)
            .fetch_optional(&mut *tx)
            .await?;

        let result = match existing {
            Some(id) => {
                sqlx::query(
                    "UPDATE files SET size = ?, checksum = ?, updated_at = ? WHERE file_id = ?",
                )
                .bind(size)
                .bind(&file.checksum)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
                UpsertResult {
                    file_id: FileId::new(id),
                    is_new: false,
                }
            }
            None => {
                let id: i64 = sqlx::query_scalar(
                    r#"INSERT INTO files (path, size, checksum, inserted_at, updated_at)
                       VALUES (?, ?, ?, ?, ?)
                       RETURNING file_id"#,
                )
                .bind(&path)
                .bind(size)
                .bind(&file.checksum)
                .bind(now)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;
                UpsertResult {
                    file_id: FileId::new(id),
                    is_new: true,
                }
            }
        };

        tx.commit().await?;

        debug!(path = %path, file_id = %result.file_id, is_new = result.is_new, "Recorded file");
        Ok(result)
    }

    /// Look up the record for a filesystem path.
    pub async fn get_file(&self, path: impl AsRef<Path>) -> Result<Option<FileRecord>> {
        let path = path_text(path.as_ref())?;
        let row = sqlx::query(
            "SELECT file_id, path, size, checksum, inserted_at, updated_at
             FROM files WHERE path = ?",
        )
        .bind(&path)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_file(&r)).transpose()
    }

    /// Look up a record by id.
    pub async fn get_file_by_id(&self, file_id: FileId) -> Result<Option<FileRecord>> {
        let row = sqlx::query(
            "SELECT file_id, path, size, checksum, inserted_at, updated_at
             FROM files WHERE file_id = ?",
        )
        .bind(file_id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_file(&r)).transpose()
    }

    /// Whether a file with this path has been recorded.
    pub async fn file_exists(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path_text(path.as_ref())?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE path = ?")
            .bind(&path)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// Number of recorded files.
    pub async fn count_files(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

pub(crate) fn path_text(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| {
            StoreError::invalid_data(format!("path is not valid UTF-8: {}", path.display()))
        })
}

fn row_to_file(row: &SqliteRow) -> Result<FileRecord> {
    let size: i64 = row.get("size");
    Ok(FileRecord {
        file_id: FileId::new(row.get("file_id")),
        path: row.get("path"),
        size: u64::try_from(size)
            .map_err(|_| StoreError::invalid_data(format!("negative file size: {}", size)))?,
        checksum: row.get("checksum"),
        inserted_at: MetadataDb::millis_to_datetime(row.get("inserted_at")),
        updated_at: MetadataDb::millis_to_datetime(row.get("updated_at")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, size: u64, checksum: &str) -> NewFileRecord {
        NewFileRecord {
            path: path.into(),
            size,
            checksum: checksum.to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_assigns_distinct_ids() {
        let db = MetadataDb::open_in_memory().await.unwrap();

        let a = db.upsert_file(&record("/data/a.fits", 1, "aa")).await.unwrap();
        let b = db.upsert_file(&record("/data/b.fits", 2, "bb")).await.unwrap();

        assert!(a.is_new);
        assert!(b.is_new);
        assert_ne!(a.file_id, b.file_id);
        assert_eq!(db.count_files().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upsert_same_path_returns_same_id() {
        let db = MetadataDb::open_in_memory().await.unwrap();

        let first = db.upsert_file(&record("/data/a.fits", 1, "aa")).await.unwrap();
        let second = db.upsert_file(&record("/data/a.fits", 5, "cc")).await.unwrap();

        assert_eq!(first.file_id, second.file_id);
        assert!(!second.is_new);
        assert_eq!(db.count_files().await.unwrap(), 1);

        let stored = db.get_file("/data/a.fits").await.unwrap().unwrap();
        assert_eq!(stored.size, 5);
        assert_eq!(stored.checksum, "cc");
    }

    #[tokio::test]
    async fn test_file_exists_and_lookup() {
        let db = MetadataDb::open_in_memory().await.unwrap();
        assert!(!db.file_exists("/data/a.fits").await.unwrap());
        assert!(db.get_file("/data/a.fits").await.unwrap().is_none());

        let inserted = db.upsert_file(&record("/data/a.fits", 3, "dd")).await.unwrap();

        assert!(db.file_exists("/data/a.fits").await.unwrap());
        let by_id = db.get_file_by_id(inserted.file_id).await.unwrap().unwrap();
        assert_eq!(by_id.path, "/data/a.fits");
        assert_eq!(by_id.size, 3);
    }
}
