//! Shared fixtures for crawler integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use catcrawl::{CancellationToken, CycleSettings};
use catcrawl_catalog::{
    CatalogClient, CatalogError, Dataset, DatasetPatch, Location, SearchQuery, VersionId,
};
use catcrawl_store::{
    FileId, MetadataStore, NewFileRecord, StoreError, UnlinkedDataset, UnlinkedEntry,
};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::field::Field;
use tracing::span::{Attributes, Id, Record};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Subscriber};

pub const WATCH_FOLDER: &str = "/LSST";
pub const WATCH_SITE: &str = "SLAC";

pub fn settings() -> CycleSettings {
    CycleSettings {
        watch_folder: WATCH_FOLDER.to_string(),
        watch_site: WATCH_SITE.to_string(),
        page_size: 1000,
        store_timeout: Duration::from_secs(10),
    }
}

/// A dataset with the given `(site, resource)` locations.
pub fn dataset(path: &str, version: &str, locations: &[(&str, &str)]) -> Dataset {
    Dataset {
        name: path.rsplit('/').next().unwrap_or(path).to_string(),
        path: path.to_string(),
        version_id: VersionId::new(version),
        locations: locations
            .iter()
            .map(|(site, resource)| Location {
                site: site.to_string(),
                resource: resource.to_string(),
            })
            .collect(),
    }
}

/// Write `len` bytes of deterministic content to `dir/name`.
pub fn write_file(dir: &Path, name: &str, len: usize) -> PathBuf {
    let path = dir.join(name);
    let data: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
    std::fs::write(&path, data).unwrap();
    path
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug, Clone)]
pub struct PatchCall {
    pub path: String,
    pub kind: &'static str,
    pub body: serde_json::Value,
    pub version_id: String,
    pub site: Option<String>,
}

#[derive(Debug, Clone)]
struct SearchFailure {
    status: u16,
    message: String,
    kind: Option<String>,
    cause: Option<String>,
}

/// In-memory catalog that records every call.
#[derive(Default)]
pub struct FakeCatalog {
    datasets: Mutex<Vec<Dataset>>,
    search_failure: Mutex<Option<SearchFailure>>,
    failing_patches: Mutex<HashSet<(String, &'static str)>>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
    searches: AtomicUsize,
    search_times: Mutex<Vec<tokio::time::Instant>>,
    patches: Mutex<Vec<PatchCall>>,
}

impl FakeCatalog {
    pub fn with_datasets(datasets: Vec<Dataset>) -> Self {
        Self {
            datasets: Mutex::new(datasets),
            ..Default::default()
        }
    }

    /// Make every search fail with this error document.
    pub fn fail_searches(
        &self,
        status: u16,
        message: &str,
        kind: Option<&str>,
        cause: Option<&str>,
    ) {
        *self.search_failure.lock().unwrap() = Some(SearchFailure {
            status,
            message: message.to_string(),
            kind: kind.map(str::to_string),
            cause: cause.map(str::to_string),
        });
    }

    /// Fail patches of `kind` (`scan_result` or `file_link`) for `path`.
    pub fn fail_patch(&self, path: &str, kind: &'static str) {
        self.failing_patches
            .lock()
            .unwrap()
            .insert((path.to_string(), kind));
    }

    /// Cancel `token` during the `n`th search.
    pub fn cancel_on_search(&self, n: usize, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((n, token));
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn search_times(&self) -> Vec<tokio::time::Instant> {
        self.search_times.lock().unwrap().clone()
    }

    pub fn patches(&self) -> Vec<PatchCall> {
        self.patches.lock().unwrap().clone()
    }

    pub fn patches_for(&self, path: &str) -> Vec<PatchCall> {
        self.patches()
            .into_iter()
            .filter(|call| call.path == path)
            .collect()
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn search(&self, query: &SearchQuery) -> catcrawl_catalog::Result<Vec<Dataset>> {
        let n = self.searches.fetch_add(1, Ordering::SeqCst) + 1;
        self.search_times
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());

        if let Some((after, token)) = self.cancel_after.lock().unwrap().as_ref() {
            if n >= *after {
                token.cancel();
            }
        }

        if let Some(failure) = self.search_failure.lock().unwrap().clone() {
            return Err(CatalogError::api(
                failure.status,
                failure.message,
                failure.kind.as_deref(),
                failure.cause.as_deref(),
            ));
        }

        let datasets = self.datasets.lock().unwrap();
        Ok(datasets
            .iter()
            .filter(|d| d.path.starts_with(&query.folder))
            .take(query.max_num)
            .cloned()
            .collect())
    }

    async fn patch_dataset(
        &self,
        path: &str,
        patch: &DatasetPatch,
        version_id: &VersionId,
        site: Option<&str>,
    ) -> catcrawl_catalog::Result<()> {
        self.patches.lock().unwrap().push(PatchCall {
            path: path.to_string(),
            kind: patch.kind(),
            body: serde_json::to_value(patch).unwrap(),
            version_id: version_id.to_string(),
            site: site.map(str::to_string),
        });

        let failing = self
            .failing_patches
            .lock()
            .unwrap()
            .contains(&(path.to_string(), patch.kind()));
        if failing {
            return Err(CatalogError::api(
                503,
                "Service Unavailable",
                Some("ServiceUnavailableException"),
                None,
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Store
// ============================================================================

/// In-memory metadata store with injectable failures.
#[derive(Default)]
pub struct FakeStore {
    files: Mutex<HashMap<PathBuf, FileId>>,
    unlinked: Mutex<Vec<UnlinkedDataset>>,
    inserts: AtomicUsize,
    fail_inserts: AtomicBool,
    insert_delay: Option<Duration>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_inserts: AtomicBool::new(true),
            ..Default::default()
        }
    }

    /// Let inserts succeed from now on.
    pub fn recover(&self) {
        self.fail_inserts.store(false, Ordering::SeqCst);
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            insert_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn file_id(&self, path: &Path) -> Option<FileId> {
        self.files.lock().unwrap().get(path).copied()
    }

    pub fn unlinked(&self) -> Vec<UnlinkedDataset> {
        self.unlinked.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataStore for FakeStore {
    async fn insert_file(&self, file: &NewFileRecord) -> catcrawl_store::Result<FileId> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.insert_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::invalid_data("disk full"));
        }
        let mut files = self.files.lock().unwrap();
        let next = FileId::new(files.len() as i64 + 1);
        Ok(*files.entry(file.path.clone()).or_insert(next))
    }

    async fn record_unlinked(&self, entry: &UnlinkedEntry) -> catcrawl_store::Result<()> {
        let mut unlinked = self.unlinked.lock().unwrap();
        if let Some(existing) = unlinked
            .iter_mut()
            .find(|u| u.dataset_path == entry.dataset_path)
        {
            existing.error = entry.error.clone();
            existing.file_id = entry.file_id.or(existing.file_id);
            existing.attempts += 1;
            return Ok(());
        }
        unlinked.push(UnlinkedDataset {
            dataset_path: entry.dataset_path.clone(),
            version_id: entry.version_id.clone(),
            file_path: entry.file.path.to_string_lossy().into_owned(),
            size: entry.file.size,
            checksum: entry.file.checksum.clone(),
            file_id: entry.file_id,
            error: entry.error.clone(),
            attempts: 1,
            recorded_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_unlinked(&self) -> catcrawl_store::Result<Vec<UnlinkedDataset>> {
        Ok(self.unlinked())
    }

    async fn resolve_unlinked(&self, dataset_path: &str) -> catcrawl_store::Result<bool> {
        let mut unlinked = self.unlinked.lock().unwrap();
        let before = unlinked.len();
        unlinked.retain(|u| u.dataset_path != dataset_path);
        Ok(unlinked.len() != before)
    }
}

/// Shared handles for a cycle under test.
pub fn shared(catalog: FakeCatalog, store: FakeStore) -> (Arc<FakeCatalog>, Arc<FakeStore>) {
    (Arc::new(catalog), Arc::new(store))
}

// ============================================================================
// Tracing capture
// ============================================================================

/// Captures tracing events as `key = value; ` strings while alive.
///
/// Installed as the thread's default subscriber; `#[tokio::test]` runs on the
/// test thread so every event from the code under test lands here.
pub struct TracingCapture {
    logs: Arc<Mutex<Vec<String>>>,
    _guard: DefaultGuard,
}

impl TracingCapture {
    pub fn new() -> Self {
        let logs = Arc::new(Mutex::new(Vec::new()));
        let subscriber = CaptureSubscriber {
            logs: Arc::clone(&logs),
        };
        let guard = tracing::subscriber::set_default(subscriber);
        Self {
            logs,
            _guard: guard,
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.logs.lock().unwrap().clone()
    }

    /// Captured lines containing every one of `needles`.
    pub fn matching(&self, needles: &[&str]) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| needles.iter().all(|needle| line.contains(needle)))
            .collect()
    }
}

impl fmt::Display for TracingCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lines().join("\n"))
    }
}

struct CaptureSubscriber {
    logs: Arc<Mutex<Vec<String>>>,
}

impl Subscriber for CaptureSubscriber {
    fn enabled(&self, _metadata: &tracing::Metadata<'_>) -> bool {
        true
    }

    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        Id::from_u64(1)
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let mut visitor = StringVisitor::default();
        visitor.record_kv("level", &event.metadata().level().to_string());
        event.record(&mut visitor);
        self.logs.lock().unwrap().push(visitor.string);
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

#[derive(Default)]
struct StringVisitor {
    string: String,
}

impl StringVisitor {
    fn record_kv(&mut self, key: &str, value: &str) {
        use std::fmt::Write;
        let _ = write!(self.string, "{} = {}; ", key, value);
    }
}

impl tracing::field::Visit for StringVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_kv(field.name(), value)
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_kv(field.name(), &format!("{:?}", value))
    }
}
