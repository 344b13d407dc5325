//! One scan-and-reconcile pass over the unscanned datasets at the watch site.
//!
//! For every dataset the write-back runs in two phases:
//!
//! 1. patch the catalog with the scan result (size, checksum, timestamp,
//!    status), scoped to the watch site;
//! 2. record the file in the metadata store and patch the catalog again with
//!    the store's `fileId`.
//!
//! The catalog treats a dataset as scanned once phase 1 lands. Anything that
//! fails after that point leaves the catalog and the store out of step and is
//! reported as *inconsistent* and journaled in the store, so the link can be
//! repaired later by relinking.

use crate::cancel::CancellationToken;
use crate::checksum::ChecksumComputer;
use crate::clock::{Clock, SystemClock};
use crate::config::CrawlerConfig;
use crate::error::{CrawlError, Result};
use crate::extractor::{MetadataExtractor, NoMetadata};
use crate::metrics::METRICS;
use catcrawl_catalog::{
    CatalogClient, CatalogError, Dataset, DatasetPatch, ScanResult, SearchQuery,
};
use catcrawl_store::{FileId, MetadataStore, NewFileRecord, StoreError, UnlinkedEntry};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// How far a dataset's write-back got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteBackState {
    /// Nothing written to the catalog
    Pending,
    /// Scan result patched; not yet linked to a store record
    Phase1Done,
    /// Scan result patched and `fileId` attached
    Phase2Done,
}

impl WriteBackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Phase1Done => "phase1_done",
            Self::Phase2Done => "phase2_done",
        }
    }
}

impl fmt::Display for WriteBackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a failure left the catalog and the store consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Dataset left unscanned; the next cycle picks it up again
    Recoverable,
    /// Dataset marked scanned in the catalog without a store link
    Inconsistent,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recoverable => "recoverable",
            Self::Inconsistent => "inconsistent",
        }
    }
}

/// Why a single dataset could not be fully processed.
#[derive(Debug, Error)]
pub enum DatasetFailure {
    #[error("no location at watch site {site}")]
    NoWatchLocation { site: String },

    #[error("cannot stat {path}: {source}")]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("checksum of {path} failed: {source}")]
    ChecksumFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("scan result patch failed: {0}")]
    Phase1PatchFailed(#[source] CatalogError),

    #[error("metadata store insert failed: {source}")]
    StoreInsertFailed {
        record: NewFileRecord,
        #[source]
        source: StoreError,
    },

    #[error("metadata store insert timed out after {timeout:?}")]
    StoreInsertTimeout {
        record: NewFileRecord,
        timeout: Duration,
    },

    #[error("file id {file_id} link patch failed: {source}")]
    Phase2PatchFailed {
        record: NewFileRecord,
        file_id: FileId,
        #[source]
        source: CatalogError,
    },
}

impl DatasetFailure {
    /// Stable outcome code for logs and reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoWatchLocation { .. } => "no_watch_location",
            Self::FileUnreadable { .. } => "file_unreadable",
            Self::ChecksumFailed { .. } => "checksum_failed",
            Self::Phase1PatchFailed(_) => "phase1_patch_failed",
            Self::StoreInsertFailed { .. } => "store_insert_failed",
            Self::StoreInsertTimeout { .. } => "store_insert_timeout",
            Self::Phase2PatchFailed { .. } => "phase2_patch_failed",
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            Self::StoreInsertFailed { .. }
            | Self::StoreInsertTimeout { .. }
            | Self::Phase2PatchFailed { .. } => FailureClass::Inconsistent,
            _ => FailureClass::Recoverable,
        }
    }

    /// Write-back state at the moment of failure.
    pub fn state(&self) -> WriteBackState {
        match self.class() {
            FailureClass::Recoverable => WriteBackState::Pending,
            FailureClass::Inconsistent => WriteBackState::Phase1Done,
        }
    }

    /// Whether the local file was hashed before the failure.
    pub fn file_hashed(&self) -> bool {
        !matches!(
            self,
            Self::NoWatchLocation { .. } | Self::FileUnreadable { .. } | Self::ChecksumFailed { .. }
        )
    }

    /// Journal entry for failures that leave the dataset scanned but unlinked.
    fn unlinked_entry(&self, dataset: &Dataset) -> Option<UnlinkedEntry> {
        let (record, file_id) = match self {
            Self::StoreInsertFailed { record, .. } => (record, None),
            Self::StoreInsertTimeout { record, .. } => (record, None),
            Self::Phase2PatchFailed {
                record, file_id, ..
            } => (record, Some(*file_id)),
            _ => return None,
        };
        Some(UnlinkedEntry {
            dataset_path: dataset.path.clone(),
            version_id: dataset.version_id.to_string(),
            file: record.clone(),
            file_id,
            error: self.to_string(),
        })
    }
}

/// Result of processing one dataset.
#[derive(Debug)]
pub enum DatasetOutcome {
    Linked { file_id: FileId },
    Failed(DatasetFailure),
}

#[derive(Debug)]
pub struct DatasetReport {
    pub dataset_path: String,
    pub state: WriteBackState,
    pub outcome: DatasetOutcome,
}

impl DatasetReport {
    /// Outcome code; `linked` for fully processed datasets.
    pub fn code(&self) -> &'static str {
        match &self.outcome {
            DatasetOutcome::Linked { .. } => "linked",
            DatasetOutcome::Failed(failure) => failure.code(),
        }
    }

    pub fn file_id(&self) -> Option<FileId> {
        match &self.outcome {
            DatasetOutcome::Linked { file_id } => Some(*file_id),
            DatasetOutcome::Failed(DatasetFailure::Phase2PatchFailed { file_id, .. }) => {
                Some(*file_id)
            }
            DatasetOutcome::Failed(_) => None,
        }
    }
}

/// Summary of one cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Datasets returned by the catalog query
    pub found: usize,
    /// Datasets whose local file was hashed, whatever happened afterwards
    pub scanned: usize,
    pub linked: usize,
    /// Datasets without a location at the watch site
    pub skipped: usize,
    /// Recoverable failures other than skips
    pub failed: usize,
    pub inconsistent: usize,
    /// Cancellation stopped the cycle before every dataset was processed
    pub interrupted: bool,
    pub datasets: Vec<DatasetReport>,
}

impl CycleReport {
    fn record(&mut self, report: DatasetReport) {
        let hashed = match &report.outcome {
            DatasetOutcome::Linked { .. } => true,
            DatasetOutcome::Failed(failure) => failure.file_hashed(),
        };
        if hashed {
            self.scanned += 1;
        }
        match &report.outcome {
            DatasetOutcome::Linked { .. } => self.linked += 1,
            DatasetOutcome::Failed(DatasetFailure::NoWatchLocation { .. }) => self.skipped += 1,
            DatasetOutcome::Failed(failure) => match failure.class() {
                FailureClass::Recoverable => self.failed += 1,
                FailureClass::Inconsistent => self.inconsistent += 1,
            },
        }
        self.datasets.push(report);
    }
}

/// Where and how much to scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSettings {
    pub watch_folder: String,
    pub watch_site: String,
    pub page_size: usize,
    pub store_timeout: Duration,
}

impl CycleSettings {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            watch_folder: config.watch.folder.clone(),
            watch_site: config.watch.site.clone(),
            page_size: config.page_size,
            store_timeout: config.store_timeout(),
        }
    }
}

/// Stat, checksum and metadata gathered for a dataset's local file.
struct Verified {
    path: PathBuf,
    size: u64,
    checksum: String,
    scan: ScanResult,
}

pub struct ScanCycle {
    catalog: Arc<dyn CatalogClient>,
    store: Arc<dyn MetadataStore>,
    checksum: ChecksumComputer,
    extractor: Box<dyn MetadataExtractor>,
    clock: Arc<dyn Clock>,
    settings: CycleSettings,
}

impl ScanCycle {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        store: Arc<dyn MetadataStore>,
        settings: CycleSettings,
    ) -> Self {
        Self {
            catalog,
            store,
            checksum: ChecksumComputer::default(),
            extractor: Box::new(NoMetadata),
            clock: Arc::new(SystemClock),
            settings,
        }
    }

    /// Build a cycle with the checksum algorithm and extractor named in `config`.
    pub fn from_config(
        config: &CrawlerConfig,
        catalog: Arc<dyn CatalogClient>,
        store: Arc<dyn MetadataStore>,
    ) -> Self {
        Self::new(catalog, store, CycleSettings::from_config(config))
            .with_checksum(ChecksumComputer::new(config.checksum))
            .with_extractor(config.extractor.build())
    }

    pub fn with_checksum(mut self, checksum: ChecksumComputer) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_extractor(mut self, extractor: Box<dyn MetadataExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    /// Run one cycle.
    ///
    /// Only a failed catalog query fails the cycle; per-dataset failures are
    /// logged and reported in the returned [`CycleReport`].
    pub async fn run(&self, cancel: &CancellationToken) -> Result<CycleReport> {
        let start = Instant::now();
        METRICS.cycles_run.inc();

        let query =
            SearchQuery::unscanned(self.settings.watch_folder.as_str(), self.settings.page_size);
        let datasets = match self.catalog.search(&query).await {
            Ok(datasets) => datasets,
            Err(err) => {
                let cause = err.cause();
                warn!(
                    folder = %self.settings.watch_folder,
                    error_message = %err.message(),
                    error_type = err.kind(),
                    error_cause = cause.as_deref().unwrap_or("none"),
                    "Catalog query failed"
                );
                METRICS.cycles_aborted.inc();
                METRICS.record_cycle_time(start);
                return Err(CrawlError::CatalogQuery(err));
            }
        };

        METRICS.datasets_found.add(datasets.len() as u64);
        debug!(
            count = datasets.len(),
            folder = %self.settings.watch_folder,
            "Unscanned datasets found"
        );

        let mut report = CycleReport {
            found: datasets.len(),
            ..Default::default()
        };

        for dataset in &datasets {
            if cancel.is_cancelled() {
                info!(
                    remaining = datasets.len() - report.datasets.len(),
                    "Cycle interrupted by shutdown"
                );
                report.interrupted = true;
                break;
            }
            let dataset_report = self.process_dataset(dataset).await;
            report.record(dataset_report);
        }

        METRICS.record_cycle_time(start);
        if report.found > 0 {
            info!(
                found = report.found,
                linked = report.linked,
                skipped = report.skipped,
                failed = report.failed,
                inconsistent = report.inconsistent,
                "Scan cycle complete"
            );
        }
        Ok(report)
    }

    async fn process_dataset(&self, dataset: &Dataset) -> DatasetReport {
        let outcome = match self.write_back(dataset).await {
            Ok(file_id) => {
                METRICS.datasets_linked.inc();
                DatasetOutcome::Linked { file_id }
            }
            Err(failure) => {
                self.log_failure(dataset, &failure);
                if let Some(entry) = failure.unlinked_entry(dataset) {
                    self.journal_unlinked(&entry).await;
                }
                DatasetOutcome::Failed(failure)
            }
        };

        let state = match &outcome {
            DatasetOutcome::Linked { .. } => WriteBackState::Phase2Done,
            DatasetOutcome::Failed(failure) => failure.state(),
        };

        DatasetReport {
            dataset_path: dataset.path.clone(),
            state,
            outcome,
        }
    }

    async fn write_back(&self, dataset: &Dataset) -> std::result::Result<FileId, DatasetFailure> {
        let verified = self.verify(dataset)?;
        METRICS.datasets_scanned.inc();

        // Phase 1
        debug!(dataset = %dataset.path, path = %verified.path.display(), "Patching scan result");
        self.catalog
            .patch_dataset(
                &dataset.path,
                &DatasetPatch::Scan(verified.scan),
                &dataset.version_id,
                Some(self.settings.watch_site.as_str()),
            )
            .await
            .map_err(DatasetFailure::Phase1PatchFailed)?;

        let record = NewFileRecord {
            path: verified.path.clone(),
            size: verified.size,
            checksum: verified.checksum,
        };
        let timeout = self.settings.store_timeout;
        let inserted = tokio::time::timeout(timeout, self.store.insert_file(&record)).await;
        let file_id = match inserted {
            Ok(Ok(file_id)) => file_id,
            Ok(Err(source)) => return Err(DatasetFailure::StoreInsertFailed { record, source }),
            Err(_) => return Err(DatasetFailure::StoreInsertTimeout { record, timeout }),
        };

        // Phase 2
        self.catalog
            .patch_dataset(
                &dataset.path,
                &DatasetPatch::file_link(file_id.get()),
                &dataset.version_id,
                None,
            )
            .await
            .map_err(|source| DatasetFailure::Phase2PatchFailed {
                record,
                file_id,
                source,
            })?;

        info!(
            dataset = %dataset.path,
            file_id = %file_id,
            path = %verified.path.display(),
            "Linked dataset"
        );
        Ok(file_id)
    }

    fn verify(&self, dataset: &Dataset) -> std::result::Result<Verified, DatasetFailure> {
        let location = dataset
            .location_at(&self.settings.watch_site)
            .ok_or_else(|| DatasetFailure::NoWatchLocation {
                site: self.settings.watch_site.clone(),
            })?;
        let path = PathBuf::from(&location.resource);

        let size = stat_regular_file(&path).map_err(|source| DatasetFailure::FileUnreadable {
            path: path.clone(),
            source,
        })?;

        let checksum = self
            .checksum
            .compute(&path)
            .map_err(|source| DatasetFailure::ChecksumFailed {
                path: path.clone(),
                source,
            })?;

        let metadata = self.extractor.extract(&path);
        let scan = ScanResult::verified(size, checksum.clone(), self.clock.now())
            .with_version_metadata(metadata);

        Ok(Verified {
            path,
            size,
            checksum,
            scan,
        })
    }

    fn log_failure(&self, dataset: &Dataset, failure: &DatasetFailure) {
        match failure.class() {
            FailureClass::Recoverable => {
                match failure {
                    DatasetFailure::NoWatchLocation { .. } => METRICS.datasets_skipped.inc(),
                    DatasetFailure::Phase1PatchFailed(_) => METRICS.phase1_failures.inc(),
                    _ => METRICS.scan_failures.inc(),
                }
                warn!(
                    dataset = %dataset.path,
                    version = %dataset.version_id,
                    code = failure.code(),
                    state = %failure.state(),
                    error = %failure,
                    "Dataset left unscanned"
                );
            }
            FailureClass::Inconsistent => {
                match failure {
                    DatasetFailure::Phase2PatchFailed { .. } => METRICS.phase2_failures.inc(),
                    _ => METRICS.store_failures.inc(),
                }
                warn!(
                    dataset = %dataset.path,
                    version = %dataset.version_id,
                    code = failure.code(),
                    class = FailureClass::Inconsistent.as_str(),
                    state = %failure.state(),
                    error = %failure,
                    "Dataset marked scanned but not linked to the metadata store"
                );
            }
        }
    }

    async fn journal_unlinked(&self, entry: &UnlinkedEntry) {
        if let Err(e) = self.store.record_unlinked(entry).await {
            error!(
                dataset = %entry.dataset_path,
                file = %entry.file.path.display(),
                error = %e,
                "Failed to journal unlinked dataset"
            );
        }
    }
}

/// Size of the regular file at `path`.
fn stat_regular_file(path: &Path) -> io::Result<u64> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"));
    }
    Ok(metadata.len())
}
