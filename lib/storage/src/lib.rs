pub mod config;
pub mod dataset;
pub mod manager;
pub mod manifest;
pub mod rows;
pub mod source;

pub use config::{
    ConfigStore, DatasetConfig, DatasetSettings, DatasetUISettings, EmbeddingConfig, SignalConfig,
};
pub use dataset::{default_settings, Branch, Dataset, DatasetSnapshot, NewBranch};
pub use manager::{DatasetInfo, DatasetManager};
pub use manifest::{DatasetManifest, ManifestSummary, SignalManifest, SourceManifest};
pub use source::{DictSource, JsonSource, Source, SourceConfig};
