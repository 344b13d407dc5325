//! Polling crawler for cataloged datasets.
//!
//! Every cycle asks the catalog for datasets that have never been scanned,
//! verifies the copy at the local watch site (size and checksum), writes the
//! scan result back, records the file in the metadata store, and links the
//! store's `fileId` into the catalog entry.
//!
//! ```rust,ignore
//! let cycle = ScanCycle::from_config(&config, catalog, store);
//! let scheduler = Scheduler::new(cycle, config.rerun_interval(), config.on_query_error);
//! scheduler.start().await?;
//! ```

pub mod cancel;
pub mod checksum;
pub mod clock;
pub mod config;
pub mod cycle;
pub mod error;
pub mod extractor;
pub mod metrics;
pub mod register;
pub mod relink;
pub mod scheduler;

pub use cancel::CancellationToken;
pub use checksum::{ChecksumAlgorithm, ChecksumComputer};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, CrawlerConfig, QueryErrorPolicy};
pub use cycle::{
    CycleReport, CycleSettings, DatasetFailure, DatasetOutcome, DatasetReport, FailureClass,
    ScanCycle, WriteBackState,
};
pub use error::{CrawlError, Result};
pub use extractor::{ExtractorKind, FitsHeaderExtractor, MetadataExtractor, NoMetadata};
pub use relink::{relink_unlinked, RelinkReport};
pub use scheduler::Scheduler;
