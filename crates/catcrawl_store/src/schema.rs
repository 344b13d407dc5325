//! Table definitions for the metadata store.

use crate::error::Result;
use crate::MetadataDb;
use tracing::debug;

impl MetadataDb {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        // Verified files, one row per filesystem path
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS files (
                file_id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                size INTEGER NOT NULL,
                checksum TEXT NOT NULL,
                inserted_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        // Datasets scanned in the catalog but missing their file id link
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS unlinked_datasets (
                dataset_path TEXT PRIMARY KEY,
                version_id TEXT NOT NULL,
                file_path TEXT NOT NULL,
                size INTEGER NOT NULL,
                checksum TEXT NOT NULL,
                file_id INTEGER REFERENCES files(file_id),
                error TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 1,
                recorded_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        debug!("Metadata store schema verified");
        Ok(())
    }
}
