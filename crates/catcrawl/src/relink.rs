//! Repair datasets in the unlinked journal.
//!
//! Entries without a `file_id` first get their file recorded in the store;
//! every entry then gets the `fileId` link patch again.

use crate::error::Result;
use crate::metrics::METRICS;
use catcrawl_catalog::{CatalogClient, DatasetPatch, VersionId};
use catcrawl_store::{FileId, MetadataStore, UnlinkedDataset, UnlinkedEntry};
use tracing::{info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelinkReport {
    pub attempted: usize,
    pub relinked: usize,
    pub still_unlinked: usize,
}

/// Retry every journaled dataset once.
///
/// Successful entries leave the journal; failures stay with their attempt
/// count bumped. Only errors reading or writing the journal abort the run.
pub async fn relink_unlinked(
    catalog: &dyn CatalogClient,
    store: &dyn MetadataStore,
) -> Result<RelinkReport> {
    let entries = store.list_unlinked().await?;
    let mut report = RelinkReport {
        attempted: entries.len(),
        ..Default::default()
    };

    for entry in entries {
        match relink_one(catalog, store, &entry).await {
            Ok(file_id) => {
                store.resolve_unlinked(&entry.dataset_path).await?;
                METRICS.datasets_relinked.inc();
                report.relinked += 1;
                info!(dataset = %entry.dataset_path, file_id = %file_id, "Relinked dataset");
            }
            Err((file_id, error)) => {
                warn!(
                    dataset = %entry.dataset_path,
                    attempts = entry.attempts + 1,
                    error = %error,
                    "Relink failed"
                );
                store
                    .record_unlinked(&UnlinkedEntry {
                        dataset_path: entry.dataset_path.clone(),
                        version_id: entry.version_id.clone(),
                        file: entry.file_record(),
                        file_id,
                        error,
                    })
                    .await?;
                report.still_unlinked += 1;
            }
        }
    }

    Ok(report)
}

/// On failure, returns the file id known so far and the error text.
async fn relink_one(
    catalog: &dyn CatalogClient,
    store: &dyn MetadataStore,
    entry: &UnlinkedDataset,
) -> std::result::Result<FileId, (Option<FileId>, String)> {
    let file_id = match entry.file_id {
        Some(file_id) => file_id,
        None => store
            .insert_file(&entry.file_record())
            .await
            .map_err(|e| (None, format!("metadata store insert failed: {}", e)))?,
    };

    let version_id = VersionId::new(entry.version_id.as_str());
    catalog
        .patch_dataset(
            &entry.dataset_path,
            &DatasetPatch::file_link(file_id.get()),
            &version_id,
            None,
        )
        .await
        .map_err(|e| (Some(file_id), format!("link patch failed: {}", e)))?;

    Ok(file_id)
}
