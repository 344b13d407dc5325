//! Register local FITS files as catalog datasets, and remove them again.
//!
//! Dataset names are derived from the file's absolute path with `/` replaced
//! by `.`, optionally prefixed: `raw` + `/data/a.fits` gives `raw.data.a.fits`.
//! A single file can also be registered under a name chosen by the caller.

use crate::extractor::is_fits_file;
use catcrawl_catalog::{HttpCatalogClient, NewDataset};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Where registered datasets go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterTarget {
    /// Catalog folder the datasets are created in
    pub folder: String,
    /// Site recorded on each dataset's location
    pub site: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegisterReport {
    pub found: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// All FITS files under `root`, in a stable order.
pub fn find_fits_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_fits_file(path))
        .collect();
    files.sort();
    files
}

/// Dataset name for a file path.
pub fn dataset_name(prefix: &str, file: &Path) -> String {
    let joined = file
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(".");
    if prefix.is_empty() {
        joined
    } else {
        format!("{}.{}", prefix, joined)
    }
}

/// Full catalog path of a dataset in `folder`.
pub fn dataset_path(folder: &str, name: &str) -> String {
    format!("{}/{}", folder.trim_end_matches('/'), name)
}

/// Register every FITS file under `root`.
///
/// Per-file failures are logged and counted; they do not stop the walk.
pub async fn register_directory(
    client: &HttpCatalogClient,
    target: &RegisterTarget,
    root: &Path,
    prefix: &str,
) -> RegisterReport {
    let files = find_fits_files(root);
    let mut report = RegisterReport {
        found: files.len(),
        ..Default::default()
    };

    for file in files {
        let name = dataset_name(prefix, &file);
        if register_file(client, target, &file, &name).await {
            report.succeeded += 1;
        } else {
            report.failed += 1;
        }
    }

    report
}

/// Register one file as dataset `name`. Returns whether the catalog accepted it.
pub async fn register_file(
    client: &HttpCatalogClient,
    target: &RegisterTarget,
    file: &Path,
    name: &str,
) -> bool {
    let resource = file.to_string_lossy().into_owned();
    let dataset = NewDataset::fits_image(name, target.site.as_str(), resource);

    match client.create_dataset(&target.folder, &dataset).await {
        Ok(()) => {
            info!(file = %file.display(), dataset = %name, "Registered dataset");
            true
        }
        Err(e) => {
            warn!(
                file = %file.display(),
                dataset = %name,
                error = %e,
                "Failed to register dataset"
            );
            false
        }
    }
}

/// Delete the datasets [`register_directory`] would have created for `root`.
pub async fn deregister_directory(
    client: &HttpCatalogClient,
    target: &RegisterTarget,
    root: &Path,
    prefix: &str,
) -> RegisterReport {
    let files = find_fits_files(root);
    let mut report = RegisterReport {
        found: files.len(),
        ..Default::default()
    };

    for file in files {
        let name = dataset_name(prefix, &file);
        debug!(file = %file.display(), dataset = %name, "Deregistering");
        if deregister_dataset(client, target, &name).await {
            report.succeeded += 1;
        } else {
            report.failed += 1;
        }
    }

    report
}

/// Delete one dataset by name. Returns whether the catalog accepted the delete.
pub async fn deregister_dataset(
    client: &HttpCatalogClient,
    target: &RegisterTarget,
    name: &str,
) -> bool {
    let path = dataset_path(&target.folder, name);
    match client.delete_dataset(&path).await {
        Ok(()) => {
            info!(dataset = %path, "Deleted dataset");
            true
        }
        Err(e) => {
            warn!(dataset = %path, error = %e, "Failed to delete dataset");
            false
        }
    }
}
