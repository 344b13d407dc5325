//! Metadata store for files verified by the crawler.
//!
//! Each verified file gets one row keyed by its filesystem path; the
//! generated `file_id` is what the catalog links back to. Datasets whose
//! link could not be attached are journaled in `unlinked_datasets` until a
//! relink succeeds.
//!
//! ```rust,ignore
//! use catcrawl_store::{MetadataDb, NewFileRecord};
//!
//! let db = MetadataDb::open("~/.catcrawl/metadata.sqlite3").await?;
//! let result = db.upsert_file(&record).await?;
//! ```

mod error;
mod files;
mod schema;
mod store;
mod types;
mod unlinked;

pub use error::{Result, StoreError};
pub use store::MetadataStore;
pub use types::*;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// SQLite-backed metadata store.
#[derive(Clone)]
pub struct MetadataDb {
    pool: SqlitePool,
}

impl MetadataDb {
    /// Open the store file at `path` in WAL mode, creating the file, its
    /// parent directory and the tables on first use.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;

        info!(path = %path.display(), "Metadata store opened");

        Ok(db)
    }

    /// Open a private in-memory database.
    ///
    /// The pool holds a single connection that never expires, since every
    /// SQLite memory connection is its own database.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Wait for pooled connections to close.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

// Timestamp utilities
impl MetadataDb {
    /// Wall clock in Unix milliseconds, the unit of every stored timestamp.
    pub fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    pub fn millis_to_datetime(millis: i64) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(millis).unwrap_or_else(chrono::Utc::now)
    }
}
