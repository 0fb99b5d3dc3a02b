use serde::{Deserialize, Serialize};

use strata_core::{Path, SignalDescriptor};

use crate::filter::Filter;

/// Signal a keyword search runs over its path.
pub const KEYWORD_SIGNAL: &str = "substring_search";
/// Name of the UDF a semantic search runs.
pub const SEMANTIC_SIMILARITY: &str = "semantic_similarity";
/// Child key of a semantic search result holding the similarity.
pub const SCORE_KEY: &str = "score";

/// A selected path, optionally renamed or computed on the fly by a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ColumnRepr")]
pub struct Column {
    pub path: Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_udf: Option<SignalDescriptor>,
}

/// Columns are accepted either as a bare path or as an object.
#[derive(Deserialize)]
#[serde(untagged)]
enum ColumnRepr {
    Path(Path),
    Full {
        path: Path,
        #[serde(default)]
        alias: Option<String>,
        #[serde(default)]
        signal_udf: Option<SignalDescriptor>,
    },
}

impl From<ColumnRepr> for Column {
    fn from(repr: ColumnRepr) -> Self {
        match repr {
            ColumnRepr::Path(path) => Column::new(path),
            ColumnRepr::Full {
                path,
                alias,
                signal_udf,
            } => Column {
                path,
                alias,
                signal_udf,
            },
        }
    }
}

impl Column {
    pub fn new(path: Path) -> Self {
        Self {
            path,
            alias: None,
            signal_udf: None,
        }
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn with_udf(mut self, signal: SignalDescriptor) -> Self {
        self.signal_udf = Some(signal);
        self
    }
}

impl From<Path> for Column {
    fn from(path: Path) -> Self {
        Column::new(path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Search {
    /// Keeps rows whose text at `path` contains `query`, case-insensitively.
    Keyword { path: Path, query: String },
    /// Ranks rows by similarity of their spans at `path` to `query` under `embedding`.
    Semantic {
        path: Path,
        query: String,
        embedding: String,
    },
}

impl Search {
    #[inline]
    pub fn path(&self) -> &Path {
        match self {
            Search::Keyword { path, .. } | Search::Semantic { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[default]
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectRowsOptions {
    pub columns: Vec<Column>,
    pub searches: Vec<Search>,
    pub filters: Vec<Filter>,
    pub sort_by: Vec<Path>,
    pub sort_order: Option<SortOrder>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub combine_columns: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_column_forms() {
        let columns: Vec<Column> = serde_json::from_value(json!([
            "text",
            ["text", "len"],
            {"path": ["text"], "alias": "t", "signal_udf": {"signal_name": "text_length"}}
        ]))
        .unwrap();
        assert_eq!(columns[0], Column::new(Path::from(["text"])));
        assert_eq!(columns[1], Column::new(Path::from(["text", "len"])));
        assert_eq!(columns[2].alias.as_deref(), Some("t"));
        assert_eq!(columns[2].signal_udf, Some(SignalDescriptor::new("text_length")));
    }

    #[test]
    fn test_options_defaults() {
        let options: SelectRowsOptions = serde_json::from_value(json!({
            "searches": [{"type": "keyword", "path": ["text"], "query": "hi"}],
            "sort_order": "ASC",
            "limit": 5
        }))
        .unwrap();
        assert!(options.columns.is_empty());
        assert_eq!(options.sort_order, Some(SortOrder::Asc));
        assert_eq!(options.offset, 0);
        assert_eq!(options.searches[0].path(), &Path::from(["text"]));
    }
}
