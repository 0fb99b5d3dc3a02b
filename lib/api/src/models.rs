// Request and response bodies of the dataset surface
use serde::{Deserialize, Serialize};
use serde_json::Value;

use strata_core::{Item, Path, SignalDescriptor};
use strata_pipeline::TaskId;
use strata_query::{Column, Filter, Search, SelectRowsOptions, SelectRowsResult, SortOrder};
use strata_storage::{DictSource, JsonSource, Source};

/// Where the rows of a new dataset come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source_name", rename_all = "snake_case")]
pub enum SourceRequest {
    Json { filepaths: Vec<String> },
    Dict { items: Vec<Value> },
}

impl SourceRequest {
    pub fn into_source(self) -> Box<dyn Source> {
        match self {
            SourceRequest::Json { filepaths } => Box::new(JsonSource::new(filepaths)),
            SourceRequest::Dict { items } => Box::new(DictSource::from_json(&items)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateDatasetRequest {
    pub namespace: String,
    pub dataset_name: String,
    pub source: SourceRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeSignalRequest {
    pub signal: SignalDescriptor,
    pub leaf_path: Path,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeEmbeddingRequest {
    pub embedding: String,
    pub leaf_path: Path,
}

/// A queued materialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task_id: TaskId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteSignalRequest {
    pub signal_path: Path,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteSignalResponse {
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRequest {
    pub leaf_path: Path,
}

/// [`SelectRowsOptions`] without pagination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectRowsSchemaRequest {
    pub columns: Vec<Column>,
    pub searches: Vec<Search>,
    pub filters: Vec<Filter>,
    pub sort_by: Vec<Path>,
    pub sort_order: Option<SortOrder>,
    pub combine_columns: bool,
}

impl From<SelectRowsSchemaRequest> for SelectRowsOptions {
    fn from(request: SelectRowsSchemaRequest) -> Self {
        SelectRowsOptions {
            columns: request.columns,
            searches: request.searches,
            filters: request.filters,
            sort_by: request.sort_by,
            sort_order: request.sort_order,
            limit: None,
            offset: 0,
            combine_columns: request.combine_columns,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectRowsResponse {
    pub rows: Vec<Value>,
    pub total_num_rows: usize,
}

impl From<SelectRowsResult> for SelectRowsResponse {
    fn from(result: SelectRowsResult) -> Self {
        Self {
            rows: result.rows.iter().map(Item::to_json).collect(),
            total_num_rows: result.total_num_rows,
        }
    }
}

/// `media` addresses its leaf with a dotted string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRequest {
    pub item_id: String,
    pub leaf_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalInfo {
    pub name: String,
    pub is_embedding: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_request() {
        let request: CreateDatasetRequest = serde_json::from_value(json!({
            "namespace": "local",
            "dataset_name": "docs",
            "source": {"source_name": "dict", "items": [{"text": "a"}]}
        }))
        .unwrap();
        assert!(matches!(request.source, SourceRequest::Dict { ref items } if items.len() == 1));
        assert_eq!(request.source.into_source().process().unwrap().len(), 1);
    }

    #[test]
    fn test_compute_signal_request_accepts_dotted_path() {
        let request: ComputeSignalRequest = serde_json::from_value(json!({
            "signal": {"signal_name": "substring_search", "query": "hi"},
            "leaf_path": "text"
        }))
        .unwrap();
        assert_eq!(request.leaf_path, Path::from(["text"]));
        assert_eq!(request.signal.param_str("query"), Some("hi"));
    }

    #[test]
    fn test_schema_request_has_no_pagination() {
        let request: SelectRowsSchemaRequest = serde_json::from_value(json!({
            "columns": ["text"],
            "combine_columns": true
        }))
        .unwrap();
        let options = SelectRowsOptions::from(request);
        assert_eq!(options.limit, None);
        assert_eq!(options.offset, 0);
        assert!(options.combine_columns);
    }
}
