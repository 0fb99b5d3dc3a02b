//! # strata Query
//!
//! Read access to a dataset snapshot:
//!
//! - [`select_rows`] - Filtered, sorted and paginated rows, with searches and query-time signal
//!   columns
//! - [`select_rows_schema`] - The schema a [`select_rows`] call would return, without reading rows
//! - [`select_groups`] - Value or bin counts of one leaf
//! - [`stats`] / [`media`] - Column statistics and raw bytes of binary leaves
//!
//! Queries never mutate a dataset and may run concurrently with each other and with a
//! materialization; each reads the snapshot it was handed.

pub mod column;
pub mod filter;
pub mod groups;
pub mod select;
pub mod stats;
mod udf;

pub use column::{Column, Search, SelectRowsOptions, SortOrder};
pub use filter::{BinaryOp, CompiledFilter, Filter, ListOp, UnaryOp};
pub use groups::{select_groups, BinsInput, GroupsSortBy, SelectGroupsOptions, SelectGroupsResult};
pub use select::{
    select_rows, select_rows_schema, SearchResultInfo, SelectRowsResult, SelectRowsSchemaResult,
    SortResult, UdfInfo,
};
pub use stats::{media, stats};
