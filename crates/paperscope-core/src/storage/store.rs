use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::Dataset;

use super::dataset_file::{load_dataset, save_dataset};

/// Durable sink for a dataset. Each `save` must be all-or-nothing.
pub trait DatasetStore {
    fn save(&mut self, dataset: &Dataset) -> Result<()>;
}

impl<S: DatasetStore + ?Sized> DatasetStore for &mut S {
    fn save(&mut self, dataset: &Dataset) -> Result<()> {
        (**self).save(dataset)
    }
}

/// Dataset file on disk, replaced atomically on every save.
///
/// Single writer only: two stores pointed at the same file overwrite each
/// other's changes.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Dataset> {
        load_dataset(&self.path)
    }
}

impl DatasetStore for FileStore {
    fn save(&mut self, dataset: &Dataset) -> Result<()> {
        save_dataset(&self.path, dataset)
    }
}

/// Keeps every saved snapshot in memory. Used for headless runs and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub snapshots: Vec<Dataset>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&Dataset> {
        self.snapshots.last()
    }
}

impl DatasetStore for MemoryStore {
    fn save(&mut self, dataset: &Dataset) -> Result<()> {
        self.snapshots.push(dataset.clone());
        Ok(())
    }
}
