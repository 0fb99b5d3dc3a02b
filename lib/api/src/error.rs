// Error surface handed to the serving layer
use serde::{Deserialize, Serialize};
use thiserror::Error;

use strata_core::Error;

/// How a serving layer should classify a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Conflict,
    Internal,
}

/// A failed request: `{"kind": ..., "error": ...}` on the wire.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{error}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub error: String,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn new(kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            error: error.into(),
        }
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, error)
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, error)
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let kind = match &e {
            Error::DatasetNotFound(_) | Error::RowNotFound(_) | Error::SignalNotFound(_) => {
                ErrorKind::NotFound
            }
            Error::MaterializationConflict(_)
            | Error::DatasetExists(_)
            | Error::SignalExists(_) => ErrorKind::Conflict,
            Error::Storage(_) | Error::Io(_) | Error::InvalidSignalOutput(_) => ErrorKind::Internal,
            Error::SchemaValidation(_)
            | Error::PathResolution(_)
            | Error::SignalCompatibility(_)
            | Error::InvalidQuery(_)
            | Error::Serialization(_)
            | Error::InvalidConfig(_) => ErrorKind::BadRequest,
        };
        Self::new(kind, e.to_string())
    }
}
