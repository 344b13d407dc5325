//! Catalog entities as exchanged with the dataset catalog.
//!
//! Field names follow the catalog's JSON documents (camelCase).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Free-form version metadata attached to a dataset version.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// `locationScanned` format: UTC, second precision, explicit `Z`.
pub const SCAN_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Filter selecting datasets that have never been scanned.
pub const UNSCANNED_FILTER: &str = "scanStatus = 'UNSCANNED'";

/// Format a timestamp the way the catalog expects `locationScanned`.
pub fn format_scan_timestamp(at: DateTime<Utc>) -> String {
    at.format(SCAN_TIMESTAMP_FORMAT).to_string()
}

// ============================================================================
// Datasets
// ============================================================================

/// Version token of a dataset.
///
/// Concrete versions arrive as numbers, aliases (`current`, `new`) as strings.
/// Both are kept as their textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawVersionId", into = "String")]
pub struct VersionId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVersionId {
    Number(i64),
    Text(String),
}

impl From<RawVersionId> for VersionId {
    fn from(raw: RawVersionId) -> Self {
        match raw {
            RawVersionId::Number(n) => Self(n.to_string()),
            RawVersionId::Text(s) => Self(s),
        }
    }
}

impl From<VersionId> for String {
    fn from(version: VersionId) -> Self {
        version.0
    }
}

impl VersionId {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// The `current` alias.
    pub fn current() -> Self {
        Self("current".to_string())
    }

    /// The `new` alias, used when registering a dataset.
    pub fn new_version() -> Self {
        Self("new".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a copy of a dataset's bytes lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Storage site name
    pub site: String,
    /// Filesystem path when `site` is the local watch site
    pub resource: String,
}

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(default)]
    pub name: String,
    /// Logical catalog path (unique)
    pub path: String,
    pub version_id: VersionId,
    #[serde(default)]
    pub locations: Vec<Location>,
}

impl Dataset {
    /// First location stored at `site`, if any.
    pub fn location_at(&self, site: &str) -> Option<&Location> {
        self.locations.iter().find(|location| location.site == site)
    }
}

// ============================================================================
// Patches
// ============================================================================

/// Scan status of a dataset location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    Unscanned,
    Ok,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unscanned => "UNSCANNED",
            Self::Ok => "OK",
        }
    }
}

/// Result of verifying one dataset location, sent to the catalog as a patch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub size: u64,
    pub checksum: String,
    pub location_scanned: String,
    pub scan_status: ScanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_metadata: Option<Metadata>,
}

impl ScanResult {
    /// A successful scan of `size` bytes hashing to `checksum`, observed at `scanned_at`.
    pub fn verified(size: u64, checksum: impl Into<String>, scanned_at: DateTime<Utc>) -> Self {
        Self {
            size,
            checksum: checksum.into(),
            location_scanned: format_scan_timestamp(scanned_at),
            scan_status: ScanStatus::Ok,
            version_metadata: None,
        }
    }

    /// Attach extracted metadata. Empty maps are dropped.
    pub fn with_version_metadata(mut self, metadata: Option<Metadata>) -> Self {
        self.version_metadata = metadata.filter(|md| !md.is_empty());
        self
    }
}

/// Version metadata carrying the metadata-store cross reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileLinkMetadata {
    pub file_id: i64,
}

/// Second-phase patch attaching only the file id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileLinkPatch {
    pub version_metadata: FileLinkMetadata,
}

/// Body of a `patch_dataset` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DatasetPatch {
    Scan(ScanResult),
    FileLink(FileLinkPatch),
}

impl DatasetPatch {
    pub fn file_link(file_id: i64) -> Self {
        Self::FileLink(FileLinkPatch {
            version_metadata: FileLinkMetadata { file_id },
        })
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scan(_) => "scan_result",
            Self::FileLink(_) => "file_link",
        }
    }
}

// ============================================================================
// Search
// ============================================================================

/// Parameters of a catalog search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Folder to search under
    pub folder: String,
    pub version: String,
    /// Site filter (`all` for every site)
    pub site: String,
    /// Filter expression over dataset fields
    pub filter: String,
    /// Page size cap
    pub max_num: usize,
}

impl SearchQuery {
    /// Current versions of datasets under `folder` that have never been scanned, at any site.
    pub fn unscanned(folder: impl Into<String>, max_num: usize) -> Self {
        Self {
            folder: folder.into(),
            version: "current".to_string(),
            site: "all".to_string(),
            filter: UNSCANNED_FILTER.to_string(),
            max_num,
        }
    }
}

#[derive(Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

/// A search result entry that looked like a dataset but did not decode.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedEntry {
    /// The entry's `path`, when it has one
    pub path: Option<String>,
    pub error: String,
}

/// Decoded search page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    /// Datasets in catalog order
    pub datasets: Vec<Dataset>,
    pub malformed: Vec<MalformedEntry>,
}

/// Decode a search response body entry by entry.
///
/// Entries typed as something other than a dataset (folders, groups) are
/// ignored. A dataset entry that fails to decode lands in
/// [`SearchPage::malformed`] without affecting its neighbours; only a body
/// that is not a search envelope is an error.
pub fn unpack_page(body: &[u8]) -> Result<SearchPage, serde_json::Error> {
    let envelope: SearchEnvelope = serde_json::from_slice(body)?;
    let mut page = SearchPage::default();
    for entry in envelope.results.into_iter().filter(is_dataset_entry) {
        let path = entry
            .get("path")
            .and_then(|p| p.as_str())
            .map(str::to_string);
        match serde_json::from_value::<Dataset>(entry) {
            Ok(dataset) => page.datasets.push(dataset),
            Err(e) => page.malformed.push(MalformedEntry {
                path,
                error: e.to_string(),
            }),
        }
    }
    Ok(page)
}

/// Decode a search response body into datasets, in catalog order.
///
/// Malformed dataset entries are logged and skipped.
pub fn unpack(body: &[u8]) -> Result<Vec<Dataset>, serde_json::Error> {
    let page = unpack_page(body)?;
    for entry in &page.malformed {
        warn!(
            path = entry.path.as_deref().unwrap_or("unknown"),
            error = %entry.error,
            "Skipping malformed catalog entry"
        );
    }
    if !page.malformed.is_empty() {
        warn!(
            skipped = page.malformed.len(),
            decoded = page.datasets.len(),
            "Search page contained malformed entries"
        );
    }
    Ok(page.datasets)
}

fn is_dataset_entry(entry: &serde_json::Value) -> bool {
    match entry.get("_type").and_then(|t| t.as_str()) {
        Some(kind) => kind.starts_with("dataset"),
        None => true,
    }
}

// ============================================================================
// Registration
// ============================================================================

/// A dataset to create in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDataset {
    pub name: String,
    pub data_type: String,
    pub file_format: String,
    pub version_id: VersionId,
    pub locations: Vec<Location>,
}

impl NewDataset {
    /// A FITS image stored at `resource` on `site`.
    pub fn fits_image(
        name: impl Into<String>,
        site: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            data_type: "FITSIMAGE".to_string(),
            file_format: "fits".to_string(),
            version_id: VersionId::new_version(),
            locations: vec![Location {
                site: site.into(),
                resource: resource.into(),
            }],
        }
    }
}
