//! Crawler error types.

use catcrawl_catalog::CatalogError;
use catcrawl_store::StoreError;
use thiserror::Error;

/// Crawler result type.
pub type Result<T> = std::result::Result<T, CrawlError>;

#[derive(Debug, Error)]
pub enum CrawlError {
    /// The unscanned-dataset search failed; the cycle cannot proceed.
    #[error("catalog query failed: {0}")]
    CatalogQuery(#[source] CatalogError),

    #[error("metadata store error: {0}")]
    Store(#[from] StoreError),
}
