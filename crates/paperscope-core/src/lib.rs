pub mod config;
pub mod error;
pub mod models;
pub mod review;
pub mod storage;

pub use config::{AppConfig, CategoryConfig};
pub use error::{CoreError, ExitCode, Result};
pub use models::*;

pub use review::{Highlighter, ReviewAction, ReviewSession, SessionEnd, Transition};
pub use storage::{DatasetStore, FileStore, MemoryStore, load_dataset, save_dataset};
