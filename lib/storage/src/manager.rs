use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use strata_core::{Error, Result};

use crate::dataset::{Dataset, CONFIG_FILE};
use crate::source::Source;

const DATASETS_DIR: &str = "datasets";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub namespace: String,
    pub dataset_name: String,
}

/// Manages datasets under a data directory. Datasets load lazily on first access.
pub struct DatasetManager {
    datasets: Arc<RwLock<HashMap<String, Arc<Dataset>>>>,
    data_dir: PathBuf,
}

fn key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

fn check_name(kind: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value != "."
        && value != ".."
        && value
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!("invalid {} name \"{}\"", kind, value)))
    }
}

impl DatasetManager {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(data_dir.join(DATASETS_DIR))?;
        Ok(Self {
            datasets: Arc::new(RwLock::new(HashMap::new())),
            data_dir,
        })
    }

    fn dataset_dir(&self, namespace: &str, name: &str) -> PathBuf {
        self.data_dir.join(DATASETS_DIR).join(namespace).join(name)
    }

    pub fn create_dataset(
        &self,
        namespace: &str,
        name: &str,
        source: &dyn Source,
    ) -> Result<Arc<Dataset>> {
        check_name("namespace", namespace)?;
        check_name("dataset", name)?;
        let mut datasets = self.datasets.write();
        if datasets.contains_key(&key(namespace, name)) {
            return Err(Error::DatasetExists(key(namespace, name)));
        }

        let dir = self.dataset_dir(namespace, name);
        let dataset = Arc::new(Dataset::create(dir, namespace, name, source)?);
        datasets.insert(key(namespace, name), dataset.clone());
        Ok(dataset)
    }

    pub fn get_dataset(&self, namespace: &str, name: &str) -> Result<Arc<Dataset>> {
        if let Some(dataset) = self.datasets.read().get(&key(namespace, name)) {
            return Ok(dataset.clone());
        }

        let mut datasets = self.datasets.write();
        if let Some(dataset) = datasets.get(&key(namespace, name)) {
            return Ok(dataset.clone());
        }
        let dir = self.dataset_dir(namespace, name);
        if check_name("namespace", namespace).is_err()
            || check_name("dataset", name).is_err()
            || !dir.join(CONFIG_FILE).exists()
        {
            return Err(Error::DatasetNotFound(key(namespace, name)));
        }
        let dataset = Arc::new(Dataset::open(&dir)?);
        info!("Loaded dataset {}", key(namespace, name));
        datasets.insert(key(namespace, name), dataset.clone());
        Ok(dataset)
    }

    pub fn delete_dataset(&self, namespace: &str, name: &str) -> Result<()> {
        let mut datasets = self.datasets.write();
        let dir = self.dataset_dir(namespace, name);
        let cached = datasets.remove(&key(namespace, name));
        if cached.is_none() && !dir.join(CONFIG_FILE).exists() {
            return Err(Error::DatasetNotFound(key(namespace, name)));
        }
        // A running materialization finishes first; queued ones fail once they get the lock.
        let _writer = cached.as_ref().map(|dataset| dataset.mark_deleted());
        fs::remove_dir_all(&dir)?;
        if let Some(namespace_dir) = dir.parent() {
            if fs::read_dir(namespace_dir).map_or(false, |mut entries| entries.next().is_none()) {
                if let Err(e) = fs::remove_dir(namespace_dir) {
                    warn!("Failed to remove empty namespace {}: {}", namespace_dir.display(), e);
                }
            }
        }
        info!("Deleted dataset {}", key(namespace, name));
        Ok(())
    }

    /// Every dataset on disk, sorted by namespace then name.
    pub fn list_datasets(&self) -> Result<Vec<DatasetInfo>> {
        let mut result = Vec::new();
        for namespace in fs::read_dir(self.data_dir.join(DATASETS_DIR))? {
            let namespace = namespace?;
            if !namespace.file_type()?.is_dir() {
                continue;
            }
            for dataset in fs::read_dir(namespace.path())? {
                let dataset = dataset?;
                if dataset.path().join(CONFIG_FILE).exists() {
                    result.push(DatasetInfo {
                        namespace: namespace.file_name().to_string_lossy().into_owned(),
                        dataset_name: dataset.file_name().to_string_lossy().into_owned(),
                    });
                }
            }
        }
        result.sort();
        Ok(result)
    }

    #[inline]
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
