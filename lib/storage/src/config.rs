// Per-dataset configuration: an immutable value replaced wholesale on every change
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use strata_core::{Error, Path, Result, SignalDescriptor};

use crate::rows;
use crate::source::SourceConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    pub path: Path,
    pub signal: SignalDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub path: Path,
    pub embedding: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetUISettings {
    #[serde(default)]
    pub media_paths: Vec<Path>,
    #[serde(default)]
    pub markdown_paths: Vec<Path>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<DatasetUISettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_embedding: Option<String>,
}

/// Everything registered against a dataset. Mutators return a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub namespace: String,
    pub name: String,
    pub source: SourceConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<DatasetSettings>,
    #[serde(default)]
    pub signals: Vec<SignalConfig>,
    #[serde(default)]
    pub embeddings: Vec<EmbeddingConfig>,
}

impl DatasetConfig {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        source: SourceConfig,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            source,
            settings: None,
            signals: Vec::new(),
            embeddings: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_settings(&self, settings: DatasetSettings) -> Self {
        Self {
            settings: Some(settings),
            ..self.clone()
        }
    }

    /// Registers `signal` at `path`. Returns `false` with an unchanged config when an identical
    /// descriptor is already registered there.
    #[must_use]
    pub fn with_signal(&self, path: &Path, signal: &SignalDescriptor) -> (Self, bool) {
        let entry = SignalConfig {
            path: path.clone(),
            signal: signal.clone(),
        };
        if self.signals.contains(&entry) {
            return (self.clone(), false);
        }
        let mut next = self.clone();
        next.signals.push(entry);
        (next, true)
    }

    #[must_use]
    pub fn without_signal(&self, path: &Path, signal: &SignalDescriptor) -> Self {
        let mut next = self.clone();
        next.signals.retain(|s| !(s.path == *path && s.signal == *signal));
        next
    }

    #[must_use]
    pub fn with_embedding(&self, path: &Path, embedding: &str) -> (Self, bool) {
        let entry = EmbeddingConfig {
            path: path.clone(),
            embedding: embedding.to_string(),
        };
        if self.embeddings.contains(&entry) {
            return (self.clone(), false);
        }
        let mut next = self.clone();
        next.embeddings.push(entry);
        (next, true)
    }

    #[must_use]
    pub fn without_embedding(&self, path: &Path, embedding: &str) -> Self {
        let mut next = self.clone();
        next.embeddings
            .retain(|e| !(e.path == *path && e.embedding == embedding));
        next
    }
}

/// Holds the current config and persists every replacement to `config.json`.
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Arc<DatasetConfig>>,
}

impl ConfigStore {
    pub fn create<P: AsRef<FsPath>>(path: P, config: DatasetConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        rows::write_json(&path, &config).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(Self {
            path,
            current: RwLock::new(Arc::new(config)),
        })
    }

    pub fn load<P: AsRef<FsPath>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let config: DatasetConfig =
            rows::read_json(&path).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(Self {
            path,
            current: RwLock::new(Arc::new(config)),
        })
    }

    #[inline]
    pub fn get(&self) -> Arc<DatasetConfig> {
        self.current.read().clone()
    }

    /// Persists `config`, then makes it current. On a write failure the previous value stays.
    pub fn replace(&self, config: DatasetConfig) -> Result<Arc<DatasetConfig>> {
        self.persist(&config)?;
        Ok(self.install(config))
    }

    /// Writes `config.json` without changing the current value.
    pub fn persist(&self, config: &DatasetConfig) -> Result<()> {
        rows::write_json(&self.path, config).map_err(|e| Error::Storage(e.to_string()))
    }

    pub fn install(&self, config: DatasetConfig) -> Arc<DatasetConfig> {
        let config = Arc::new(config);
        *self.current.write() = config.clone();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> DatasetConfig {
        DatasetConfig::new("local", "docs", SourceConfig::Dict)
    }

    #[test]
    fn test_with_signal_is_idempotent() {
        let path = Path::from(["text"]);
        let signal = SignalDescriptor::new("text_length");
        let (once, added) = config().with_signal(&path, &signal);
        assert!(added);
        let (twice, added) = once.with_signal(&path, &signal);
        assert!(!added);
        assert_eq!(twice.signals.len(), 1);
    }

    #[test]
    fn test_different_params_append() {
        let path = Path::from(["text"]);
        let a = SignalDescriptor::new("param_signal").with_param("param", "a");
        let b = SignalDescriptor::new("param_signal").with_param("param", "b");
        let (config, _) = config().with_signal(&path, &a);
        let (config, added) = config.with_signal(&path, &b);
        assert!(added);
        assert_eq!(config.signals.len(), 2);
        assert_eq!(config.without_signal(&path, &a).signals.len(), 1);
    }

    #[test]
    fn test_settings_replace_wholesale() {
        let first = DatasetSettings {
            ui: Some(DatasetUISettings {
                media_paths: vec![Path::from(["text"])],
                markdown_paths: vec![],
            }),
            preferred_embedding: Some("hash_embedding".to_string()),
        };
        let second = DatasetSettings::default();
        let config = config().with_settings(first).with_settings(second.clone());
        assert_eq!(config.settings, Some(second));
    }

    #[test]
    fn test_store_persists_replacements() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::create(&path, config()).unwrap();
        let (next, _) = store.get().with_embedding(&Path::from(["text"]), "hash_embedding");
        store.replace(next.clone()).unwrap();

        let reopened = ConfigStore::load(&path).unwrap();
        assert_eq!(*reopened.get(), next);
        assert_eq!(reopened.get().embeddings.len(), 1);
    }

    #[test]
    fn test_config_json_shape() {
        let (config, _) =
            config().with_signal(&Path::from(["text"]), &SignalDescriptor::new("text_length"));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["source"]["source_name"], "dict");
        assert_eq!(json["signals"][0]["path"], serde_json::json!(["text"]));
        assert_eq!(json["signals"][0]["signal"]["signal_name"], "text_length");
    }
}
