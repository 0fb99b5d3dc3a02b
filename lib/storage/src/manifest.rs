use serde::{Deserialize, Serialize};

use strata_core::{Path, Schema, SignalDescriptor};

/// Describes the source rows file of a dataset (`source.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceManifest {
    pub files: Vec<String>,
    pub data_schema: Schema,
    pub num_items: usize,
}

/// One materialized signal or embedding branch (an entry of `branches.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalManifest {
    pub id: String,
    pub file: String,
    /// The leaf the signal was computed over.
    pub source_path: Path,
    /// Root of the branch: `source_path` plus the signal key.
    pub output_path: Path,
    pub signal: SignalDescriptor,
    #[serde(default)]
    pub is_embedding: bool,
    /// The branch wrapped under its output path.
    pub data_schema: Schema,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestSummary {
    pub num_leafs: usize,
    pub num_signals: usize,
    pub num_embeddings: usize,
}

/// The served view of a dataset: the merged schema of source and branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub namespace: String,
    pub dataset_name: String,
    pub data_schema: Schema,
    pub num_items: usize,
    pub summary: ManifestSummary,
}

impl DatasetManifest {
    pub fn new(
        namespace: &str,
        dataset_name: &str,
        data_schema: Schema,
        num_items: usize,
        branches: &[SignalManifest],
    ) -> Self {
        let num_embeddings = branches.iter().filter(|b| b.is_embedding).count();
        let summary = ManifestSummary {
            num_leafs: data_schema.leafs().len(),
            num_signals: branches.len() - num_embeddings,
            num_embeddings,
        };
        Self {
            namespace: namespace.to_string(),
            dataset_name: dataset_name.to_string(),
            data_schema,
            num_items,
            summary,
        }
    }
}
