//! # strata
//!
//! A dataset curation engine: nested schemas, filtered queries and materialized signal columns.
//!
//! Rows with nested text, numeric and binary fields are described by a typed, path-addressed
//! schema. Signals computed over a leaf are attached to the dataset as new branches without
//! rewriting the source rows, and every query sees them as ordinary columns.
//!
//! ## Quick Start
//!
//! ### From the command line
//!
//! ```bash
//! strata create local docs --source '{"source_name": "json", "filepaths": ["docs.jsonl"]}'
//! strata compute-signal local docs text '{"signal_name": "text_length"}'
//! strata select-rows local docs \
//!     '{"filters": [{"path": "text.text_length", "op": "greater", "value": 5}]}'
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use strata::prelude::*;
//!
//! let manager = DatasetManager::new("./data").unwrap();
//! let dataset = manager
//!     .create_dataset("local", "docs", &DictSource::from_json(&[json!({"text": "hello world"})]))
//!     .unwrap();
//!
//! let registry = Arc::new(strata::signals::default_registry().unwrap());
//! let pipeline = SignalPipeline::new(registry.clone());
//! pipeline
//!     .compute_signal(&dataset, &SignalDescriptor::new("text_length"), &Path::from(["text"]))
//!     .unwrap();
//!
//! let options = SelectRowsOptions {
//!     filters: vec![Filter::binary(Path::from(["text", "text_length"]), BinaryOp::Greater, 5)],
//!     ..Default::default()
//! };
//! let result = select_rows(&dataset.snapshot(), &registry, &options).unwrap();
//! assert_eq!(result.total_num_rows, 1);
//! ```
//!
//! ## Crate Structure
//!
//! - `strata-core` - Schema, paths, items, signal traits, the error type
//! - `strata-signals` - Built-in signals and the default registry
//! - `strata-storage` - Dataset files, config, manifests and the dataset manager
//! - `strata-query` - Row, group and stats queries
//! - `strata-pipeline` - Signal materialization and the task runner
//! - `strata-api` - Request/response surface for a serving layer

// Re-export core types
pub use strata_core::{
    DataType, Error, Field, Item, Path, Result, Schema, Signal, SignalDescriptor, SignalRegistry,
    StatsResult,
};

// Re-export storage
pub use strata_storage::{
    Dataset, DatasetConfig, DatasetManager, DatasetManifest, DatasetSettings, DictSource,
    JsonSource,
};

// Re-export query
pub use strata_query::{
    select_groups, select_rows, select_rows_schema, BinaryOp, Column, Filter, Search,
    SelectGroupsOptions, SelectRowsOptions, SortOrder,
};

// Re-export pipeline and API
pub use strata_api::{ApiError, DatasetService};
pub use strata_pipeline::{SignalPipeline, TaskManager, TaskStatus};

/// Built-in signals
pub mod signals {
    pub use strata_signals::*;
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        select_groups, select_rows, select_rows_schema, BinaryOp, Column, DataType, Dataset,
        DatasetConfig, DatasetManager, DatasetManifest, DatasetService, DatasetSettings, DictSource,
        Error, Field, Filter, Item, JsonSource, Path, Result, Schema, Search, SelectGroupsOptions,
        SelectRowsOptions, SignalDescriptor, SignalPipeline, SignalRegistry, SortOrder,
    };
}
