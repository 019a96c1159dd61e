use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::models::Dataset;

/// Load and validate a dataset file. Any parse or structural problem is a
/// `MalformedDataset` error naming the file.
pub fn load_dataset(path: &Path) -> Result<Dataset> {
    let bytes = fs::read(path)?;
    let dataset: Dataset =
        serde_json::from_slice(&bytes).map_err(|e| CoreError::MalformedDataset {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    dataset
        .validate()
        .map_err(|detail| CoreError::MalformedDataset {
            path: path.to_path_buf(),
            detail,
        })?;
    Ok(dataset)
}

/// Serialized form of a dataset. Stable for equal datasets.
pub fn dataset_to_bytes(dataset: &Dataset) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(dataset)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Save a dataset atomically: readers see either the old file or the new one.
pub fn save_dataset(path: &Path, dataset: &Dataset) -> Result<()> {
    let bytes = dataset_to_bytes(dataset)?;
    write_atomic(path, &bytes)?;
    debug!(path = %path.display(), records = dataset.len(), "dataset saved");
    Ok(())
}

/// Write to a temporary file in the target directory, fsync it, then rename over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| {
        CoreError::Persistence(format!("failed to replace '{}': {}", path.display(), e.error))
    })?;

    // Make the rename itself durable where the platform allows opening directories.
    if let Ok(handle) = fs::File::open(&dir)
        && let Err(e) = handle.sync_all()
    {
        debug!(dir = %dir.display(), "directory fsync skipped: {e}");
    }
    Ok(())
}

/// `results.json` -> `results_backup.json`, in the same directory.
pub fn backup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{stem}_backup.{}", ext.to_string_lossy()),
        None => format!("{stem}_backup"),
    };
    path.with_file_name(name)
}

/// Copy the current on-disk dataset to its backup path.
pub fn write_backup(path: &Path) -> Result<PathBuf> {
    let bytes = fs::read(path)?;
    let backup = backup_path(path);
    write_atomic(&backup, &bytes)?;
    debug!(backup = %backup.display(), "backup written");
    Ok(backup)
}
