use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Schema validation error: {0}")]
    SchemaValidation(String),

    #[error("Path resolution error: {0}")]
    PathResolution(String),

    #[error("Signal compatibility error: {0}")]
    SignalCompatibility(String),

    #[error("Materialization conflict: {0}")]
    MaterializationConflict(String),

    #[error("Signal not found: {0}")]
    SignalNotFound(String),

    #[error("Signal already registered: {0}")]
    SignalExists(String),

    #[error("Invalid signal output: {0}")]
    InvalidSignalOutput(String),

    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("Dataset already exists: {0}")]
    DatasetExists(String),

    #[error("Row not found: {0}")]
    RowNotFound(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// True for failures of the underlying storage rather than of the request.
    #[inline]
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Io(_))
    }
}
