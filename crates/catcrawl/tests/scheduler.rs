//! Scheduler loop: pacing, cancellation and query-failure policy.

mod common;

use catcrawl::{CancellationToken, CrawlError, QueryErrorPolicy, ScanCycle, Scheduler};
use common::{dataset, settings, shared, write_file, FakeCatalog, FakeStore, TracingCapture};
use std::time::Duration;

const INTERVAL: Duration = Duration::from_secs(5);

#[tokio::test(start_paused = true)]
async fn test_cycles_repeat_after_interval_until_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "a.fits", 10);
    let cancel = CancellationToken::new();

    let catalog = FakeCatalog::with_datasets(vec![dataset(
        "/LSST/a.fits",
        "1",
        &[("SLAC", file.to_str().unwrap())],
    )]);
    catalog.cancel_on_search(3, cancel.clone());
    let (catalog, store) = shared(catalog, FakeStore::new());

    let cycle = ScanCycle::new(catalog.clone(), store.clone(), settings());
    let scheduler =
        Scheduler::new(cycle, INTERVAL, QueryErrorPolicy::AbortCycle).with_cancellation(cancel);

    scheduler.start().await.unwrap();

    assert_eq!(catalog.search_count(), 3);
    let times = catalog.search_times();
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= INTERVAL);
    }
    // Cancelled during the third search, so its dataset was not processed
    assert_eq!(store.insert_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_query_failure_aborts_cycle_and_keeps_scheduling() {
    let capture = TracingCapture::new();
    let cancel = CancellationToken::new();
    let catalog = FakeCatalog::default();
    catalog.fail_searches(500, "Database unavailable", Some("SQLException"), Some("timeout"));
    catalog.cancel_on_search(2, cancel.clone());
    let (catalog, store) = shared(catalog, FakeStore::new());

    let cycle = ScanCycle::new(catalog.clone(), store, settings());
    let scheduler =
        Scheduler::new(cycle, INTERVAL, QueryErrorPolicy::AbortCycle).with_cancellation(cancel);

    scheduler.start().await.unwrap();

    assert_eq!(catalog.search_count(), 2);
    assert_eq!(
        capture.matching(&["Catalog query failed", "Database unavailable", "SQLException"]).len(),
        2,
        "{}",
        capture
    );
    assert_eq!(capture.matching(&["Cycle aborted"]).len(), 2, "{}", capture);
}

#[tokio::test(start_paused = true)]
async fn test_query_failure_stops_scheduler_under_exit_policy() {
    let catalog = FakeCatalog::default();
    catalog.fail_searches(500, "Database unavailable", None, None);
    let (catalog, store) = shared(catalog, FakeStore::new());

    let cycle = ScanCycle::new(catalog.clone(), store, settings());
    let scheduler = Scheduler::new(cycle, INTERVAL, QueryErrorPolicy::Exit);

    let err = scheduler.start().await.unwrap_err();

    assert!(matches!(err, CrawlError::CatalogQuery(_)));
    assert_eq!(catalog.search_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_sleep() {
    let (catalog, store) = shared(FakeCatalog::default(), FakeStore::new());
    let cycle = ScanCycle::new(catalog.clone(), store, settings());
    let scheduler = Scheduler::new(cycle, Duration::from_secs(3600), QueryErrorPolicy::AbortCycle);
    let cancel = scheduler.cancellation_token();

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    });

    let started = tokio::time::Instant::now();
    scheduler.start().await.unwrap();
    stopper.await.unwrap();

    assert_eq!(catalog.search_count(), 1);
    assert!(started.elapsed() < Duration::from_secs(3600));
}

#[tokio::test]
async fn test_run_once_runs_a_single_cycle() {
    let (catalog, store) = shared(FakeCatalog::default(), FakeStore::new());
    let cycle = ScanCycle::new(catalog.clone(), store, settings());
    let scheduler = Scheduler::new(cycle, INTERVAL, QueryErrorPolicy::AbortCycle);

    let report = scheduler.run_once().await.unwrap();

    assert_eq!(report.found, 0);
    assert_eq!(catalog.search_count(), 1);
}

#[tokio::test]
async fn test_already_cancelled_scheduler_runs_nothing() {
    let (catalog, store) = shared(FakeCatalog::default(), FakeStore::new());
    let cycle = ScanCycle::new(catalog.clone(), store, settings());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let scheduler =
        Scheduler::new(cycle, INTERVAL, QueryErrorPolicy::AbortCycle).with_cancellation(cancel);

    scheduler.start().await.unwrap();

    assert_eq!(catalog.search_count(), 0);
}
