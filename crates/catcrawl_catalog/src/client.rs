//! The catalog operations the crawler depends on.

use crate::error::Result;
use crate::types::{Dataset, DatasetPatch, SearchQuery, VersionId};
use async_trait::async_trait;

/// Query and patch access to the dataset catalog.
///
/// [`crate::HttpCatalogClient`] talks to the real service; tests substitute
/// in-memory fakes.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Run a search and return at most `query.max_num` datasets, in catalog order.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Dataset>>;

    /// Apply a partial update to one version of a dataset.
    ///
    /// When `site` is given the update is scoped to the dataset's location at
    /// that site.
    async fn patch_dataset(
        &self,
        path: &str,
        patch: &DatasetPatch,
        version_id: &VersionId,
        site: Option<&str>,
    ) -> Result<()>;
}
