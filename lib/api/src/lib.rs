//! # strata API
//!
//! The request/response surface a serving layer wraps, one method per operation:
//!
//! - Datasets: create, list, manifest, config, settings, delete
//! - Materialization: `compute_signal` / `compute_embedding` return a task id, `delete_signal`
//!   answers with a completion flag
//! - Queries: stats, select_rows, select_rows_schema, select_groups, media
//!
//! Failures come back as [`ApiError`] with an [`ErrorKind`] a transport maps to its own status
//! codes.

pub mod error;
pub mod models;
pub mod service;

pub use error::{ApiError, ApiResult, ErrorKind};
pub use models::{
    ComputeEmbeddingRequest, ComputeSignalRequest, CreateDatasetRequest, DeleteSignalRequest,
    DeleteSignalResponse, MediaRequest, SelectRowsResponse, SelectRowsSchemaRequest, SignalInfo,
    SourceRequest, StatsRequest, TaskResponse,
};
pub use service::DatasetService;
