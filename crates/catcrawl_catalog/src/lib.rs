//! Dataset catalog access for catcrawl
//!
//! The catalog is the system of record for dataset existence, versions and
//! scan status. This crate holds the entities exchanged with it, the
//! [`CatalogClient`] seam used by the scan cycle, and an HTTP implementation.

pub mod client;
pub mod error;
pub mod http;
pub mod types;

pub use client::CatalogClient;
pub use error::{CatalogError, Result};
pub use http::{HttpCatalogClient, DEFAULT_TIMEOUT};
pub use types::{
    format_scan_timestamp, unpack, unpack_page, Dataset, DatasetPatch, FileLinkMetadata,
    FileLinkPatch, Location, MalformedEntry, Metadata, NewDataset, ScanResult, ScanStatus,
    SearchPage, SearchQuery, VersionId, SCAN_TIMESTAMP_FORMAT, UNSCANNED_FILTER,
};
