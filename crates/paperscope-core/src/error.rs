use std::path::PathBuf;

use thiserror::Error;

/// All errors that can occur in paperscope-core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Conflicting or inconsistent record data. Fatal to the run.
    #[error("data quality error in record {record}: {detail}")]
    DataQuality { record: String, detail: String },

    #[error("malformed dataset {}: {detail}", path.display())]
    MalformedDataset { path: PathBuf, detail: String },

    #[error("invalid category assignment: {category} = {label}")]
    InvalidCategory { category: String, label: String },

    #[error("dataset has no records")]
    EmptyDataset,

    #[error("review session already finished")]
    SessionFinished,

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl CoreError {
    /// Local, recoverable conditions. The review session keeps running after these.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidCategory { .. } | Self::EmptyDataset)
    }
}

/// Exit codes used by the CLI.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    NotFound = 2,
    InvalidArgs = 3,
    FileSystemError = 4,
    NetworkError = 6,
    Conflict = 7,
}

impl From<&CoreError> for ExitCode {
    fn from(err: &CoreError) -> Self {
        match err {
            CoreError::DataQuality { .. } | CoreError::MalformedDataset { .. } => Self::Conflict,
            CoreError::InvalidCategory { .. } | CoreError::ConfigError(_) => Self::InvalidArgs,
            CoreError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => Self::NotFound,
            CoreError::Io(_) | CoreError::Persistence(_) => Self::FileSystemError,
            _ => Self::GeneralError,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
