//! # strata Core
//!
//! Core library for strata datasets.
//!
//! This crate provides the schema model and the value types every other crate builds on:
//!
//! - [`Schema`] / [`Field`] - The typed, path-addressed field tree
//! - [`Path`] - Field names, concrete indices and wildcards
//! - [`Item`] - A value tree shaped like a schema
//! - [`Signal`] / [`EmbeddingSignal`] - Pluggable computations and their [`SignalRegistry`]
//! - [`schema_to_arrow`] / [`arrow_to_schema`] - Physical columnar conversion
//!
//! ## Example
//!
//! ```rust
//! use serde_json::json;
//! use strata_core::{DataType, Path, Schema};
//!
//! let schema = Schema::from_literal(&json!({
//!     "title": "string",
//!     "comments": [{"text": "string"}]
//! }))
//! .unwrap();
//!
//! let leafs = schema.leafs();
//! let text = leafs[&Path::parse("comments.*.text").unwrap()];
//! assert_eq!(text.dtype(), Some(DataType::String));
//! ```

pub mod dtype;
pub mod error;
pub mod field;
pub mod item;
pub mod nested;
pub mod ordered_map;
pub mod path;
pub mod physical;
pub mod schema;
pub mod signal;
pub mod stats;
pub mod vector;

pub use dtype::DataType;
pub use error::{Error, Result};
pub use field::{check_bins, Bin, Field, FieldKind, RawField};
pub use item::{Item, ItemKey};
pub use ordered_map::OrderedMap;
pub use path::{Path, PathSegment, PATH_WILDCARD, ROWID, VALUE_KEY};
pub use physical::{arrow_to_schema, schema_to_arrow};
pub use schema::{infer_schema, make_schema_from_path, merge_schemas, Schema};
pub use signal::{
    embedding_fields, embedding_item, EmbeddingSignal, ResolvedSignal, Signal, SignalConstructor,
    SignalDescriptor, SignalInputType, SignalRegistry, SpanVector, EMBEDDING_KEY,
};
pub use stats::{compute_stats, StatsResult};
pub use vector::cosine_similarity;
