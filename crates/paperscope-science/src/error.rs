use paperscope_core::{CoreError, IdentifierKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScienceError {
    #[error("invalid DOI: {0}")]
    InvalidDoi(String),

    #[error("invalid arXiv ID: {0}")]
    InvalidArxivId(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error from {0}: {1}")]
    ApiError(String, String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("{lookup} cannot resolve {target} from {source_kind}")]
    UnsupportedLookup {
        lookup: String,
        source_kind: IdentifierKind,
        target: IdentifierKind,
    },

    /// Merge conflicts in strict mode.
    #[error("data quality error in record {record}: {detail}")]
    DataQuality { record: String, detail: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ScienceError {
    pub fn exit_code(&self) -> paperscope_core::ExitCode {
        use paperscope_core::ExitCode;
        match self {
            Self::Core(e) => ExitCode::from(e),
            Self::DataQuality { .. } => ExitCode::Conflict,
            Self::Http(_) | Self::ApiError(..) => ExitCode::NetworkError,
            Self::UnsupportedLookup { .. } | Self::InvalidDoi(_) | Self::InvalidArxivId(_) => {
                ExitCode::InvalidArgs
            }
            Self::Parse(_) => ExitCode::GeneralError,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScienceError>;
