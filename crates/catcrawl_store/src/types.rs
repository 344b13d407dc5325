//! Records owned by the metadata store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Store-generated identifier of a file record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(i64);

impl FileId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A verified file to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFileRecord {
    pub path: PathBuf,
    pub size: u64,
    pub checksum: String,
}

/// A stored file record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub file_id: FileId,
    pub path: String,
    pub size: u64,
    pub checksum: String,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of upserting a file record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertResult {
    pub file_id: FileId,
    pub is_new: bool,
}

/// A dataset the catalog reports as scanned but whose file id link was never attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlinkedEntry {
    pub dataset_path: String,
    pub version_id: String,
    /// The verified file, kept so the record can be inserted again
    pub file: NewFileRecord,
    /// `None` when the store insert itself failed
    pub file_id: Option<FileId>,
    /// Error from the failed attempt
    pub error: String,
}

/// A journal row for an unlinked dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlinkedDataset {
    pub dataset_path: String,
    pub version_id: String,
    pub file_path: String,
    pub size: u64,
    pub checksum: String,
    pub file_id: Option<FileId>,
    pub error: String,
    /// Failed link attempts so far
    pub attempts: u32,
    /// Time of the latest failed attempt
    pub recorded_at: DateTime<Utc>,
}

impl UnlinkedDataset {
    /// The verified file as it was recorded before the link failed.
    pub fn file_record(&self) -> NewFileRecord {
        NewFileRecord {
            path: PathBuf::from(&self.file_path),
            size: self.size,
            checksum: self.checksum.clone(),
        }
    }
}
