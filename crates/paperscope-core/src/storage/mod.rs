pub mod dataset_file;
pub mod store;

pub use dataset_file::{
    backup_path, dataset_to_bytes, load_dataset, save_dataset, write_atomic, write_backup,
};
pub use store::{DatasetStore, FileStore, MemoryStore};
