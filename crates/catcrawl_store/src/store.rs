//! Store abstraction used by the crawler.

use crate::error::Result;
use crate::types::{FileId, NewFileRecord, UnlinkedDataset, UnlinkedEntry};
use crate::MetadataDb;
use async_trait::async_trait;

/// Operations the crawler needs from a metadata store.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Record a verified file and return its id. Idempotent per path.
    async fn insert_file(&self, file: &NewFileRecord) -> Result<FileId>;

    async fn record_unlinked(&self, entry: &UnlinkedEntry) -> Result<()>;

    async fn list_unlinked(&self) -> Result<Vec<UnlinkedDataset>>;

    async fn resolve_unlinked(&self, dataset_path: &str) -> Result<bool>;
}

#[async_trait]
impl MetadataStore for MetadataDb {
    async fn insert_file(&self, file: &NewFileRecord) -> Result<FileId> {
        Ok(self.upsert_file(file).await?.file_id)
    }

    async fn record_unlinked(&self, entry: &UnlinkedEntry) -> Result<()> {
        MetadataDb::record_unlinked(self, entry).await
    }

    async fn list_unlinked(&self) -> Result<Vec<UnlinkedDataset>> {
        MetadataDb::list_unlinked(self).await
    }

    async fn resolve_unlinked(&self, dataset_path: &str) -> Result<bool> {
        MetadataDb::resolve_unlinked(self, dataset_path).await
    }
}
