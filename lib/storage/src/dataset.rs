// Dataset state: source rows plus materialized branches, swapped atomically on publish
use ahash::AHashMap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use rayon::prelude::*;
use std::fs;
use std::path::{Path as FsPath, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use strata_core::nested::{merge_items, values_at};
use strata_core::{
    infer_schema, make_schema_from_path, merge_schemas, DataType, Error, Field, Item, OrderedMap,
    Path, Result, Schema, SignalDescriptor, ROWID,
};

use crate::config::{ConfigStore, DatasetConfig, DatasetSettings, DatasetUISettings};
use crate::manifest::{DatasetManifest, SignalManifest, SourceManifest};
use crate::rows;
use crate::source::Source;

pub const CONFIG_FILE: &str = "config.json";
pub const SOURCE_MANIFEST_FILE: &str = "source.json";
pub const BRANCHES_FILE: &str = "branches.json";
pub const BRANCHES_DIR: &str = "branches";

fn storage(e: anyhow::Error) -> Error {
    Error::Storage(format!("{:#}", e))
}

/// A materialized branch: per-row values already wrapped under the branch's output path.
#[derive(Debug)]
pub struct Branch {
    pub manifest: SignalManifest,
    values: AHashMap<String, Item>,
}

impl Branch {
    #[inline]
    pub fn value(&self, rowid: &str) -> Option<&Item> {
        self.values.get(rowid)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A branch ready to be published.
#[derive(Debug, Clone)]
pub struct NewBranch {
    pub source_path: Path,
    pub output_path: Path,
    pub signal: SignalDescriptor,
    pub is_embedding: bool,
    pub data_schema: Schema,
    /// `(rowid, wrapped value)` for every annotated row.
    pub values: Vec<(String, Item)>,
}

/// An immutable view of a dataset. Readers hold one for the duration of a query.
#[derive(Debug)]
pub struct DatasetSnapshot {
    manifest: DatasetManifest,
    source: SourceManifest,
    rows: Arc<Vec<Item>>,
    rowid_index: Arc<AHashMap<String, usize>>,
    branches: Vec<Arc<Branch>>,
}

impl DatasetSnapshot {
    fn build(
        namespace: &str,
        name: &str,
        source: SourceManifest,
        rows: Arc<Vec<Item>>,
        rowid_index: Arc<AHashMap<String, usize>>,
        branches: Vec<Arc<Branch>>,
    ) -> Result<Self> {
        let manifests: Vec<SignalManifest> = branches.iter().map(|b| b.manifest.clone()).collect();
        let schema = merged_schema(&source, &manifests)?;
        let manifest = DatasetManifest::new(namespace, name, schema, rows.len(), &manifests);
        Ok(Self {
            manifest,
            source,
            rows,
            rowid_index,
            branches,
        })
    }

    #[inline]
    pub fn manifest(&self) -> &DatasetManifest {
        &self.manifest
    }

    /// The merged schema of source and branches.
    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.manifest.data_schema
    }

    #[inline]
    pub fn source_schema(&self) -> &Schema {
        &self.source.data_schema
    }

    #[inline]
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn source_rows(&self) -> &[Item] {
        &self.rows
    }

    pub fn row_id(&self, index: usize) -> Option<&str> {
        self.rows.get(index)?.get(ROWID)?.as_str()
    }

    #[inline]
    pub fn row_index(&self, rowid: &str) -> Option<usize> {
        self.rowid_index.get(rowid).copied()
    }

    #[inline]
    pub fn branches(&self) -> &[Arc<Branch>] {
        &self.branches
    }

    pub fn branch(&self, output_path: &Path) -> Option<&Arc<Branch>> {
        self.branches.iter().find(|b| b.manifest.output_path == *output_path)
    }

    /// The source row with every branch value merged in.
    pub fn merged_item(&self, index: usize) -> Option<Item> {
        let row = self.rows.get(index)?;
        let Some(rowid) = row.get(ROWID).and_then(Item::as_str) else {
            return Some(row.clone());
        };
        Some(self.branches.iter().fold(row.clone(), |acc, branch| match branch.value(rowid) {
            Some(value) => merge_items(acc, value.clone()),
            None => acc,
        }))
    }

    pub fn merged_items(&self) -> Vec<Item> {
        (0..self.rows.len())
            .into_par_iter()
            .filter_map(|i| self.merged_item(i))
            .collect()
    }
}

fn merged_schema(source: &SourceManifest, branches: &[SignalManifest]) -> Result<Schema> {
    merge_schemas(
        std::iter::once(source.data_schema.clone())
            .chain(branches.iter().map(|b| b.data_schema.clone())),
    )
}

fn index_rows(rows: &[Item]) -> AHashMap<String, usize> {
    rows.iter()
        .enumerate()
        .filter_map(|(i, row)| Some((row.get(ROWID)?.as_str()?.to_string(), i)))
        .collect()
}

/// Puts a row id first in every row, keeping one the row already carries.
fn assign_row_ids(items: Vec<Item>) -> Result<Vec<Item>> {
    items
        .into_iter()
        .map(|item| {
            let Item::Struct(map) = item else {
                return Err(Error::SchemaValidation(format!(
                    "dataset rows must be structs, got {}",
                    item.kind_name()
                )));
            };
            let rowid = match map.get(ROWID) {
                Some(Item::String(id)) => id.clone(),
                _ => Uuid::new_v4().to_string(),
            };
            let mut row = OrderedMap::with_capacity(map.len() + 1);
            row.insert(ROWID, Item::String(rowid));
            for (key, value) in map {
                if key != ROWID {
                    row.insert(key, value);
                }
            }
            Ok(Item::Struct(row))
        })
        .collect()
}

/// Default settings: the string leaf with the longest average text becomes the media path.
pub fn default_settings(schema: &Schema, rows: &[Item]) -> DatasetSettings {
    let rowid = Path::from([ROWID]);
    let candidates: Vec<Path> = schema
        .leafs()
        .into_iter()
        .filter(|(path, field)| field.dtype() == Some(DataType::String) && *path != rowid)
        .map(|(path, _)| path)
        .collect();

    let lengths: Vec<(Path, f64)> = candidates
        .into_par_iter()
        .map(|path| {
            let (total, count) = rows
                .iter()
                .flat_map(|row| values_at(row, &path))
                .flatten()
                .filter_map(Item::as_str)
                .fold((0usize, 0usize), |(total, count), text| {
                    (total + text.chars().count(), count + 1)
                });
            let avg = if count == 0 { 0.0 } else { total as f64 / count as f64 };
            (path, avg)
        })
        .collect();

    let mut best: Option<(Path, f64)> = None;
    for (path, avg) in lengths {
        if best.as_ref().map_or(true, |(_, best_avg)| avg > *best_avg) {
            best = Some((path, avg));
        }
    }

    DatasetSettings {
        ui: best.map(|(path, _)| DatasetUISettings {
            media_paths: vec![path],
            markdown_paths: Vec::new(),
        }),
        preferred_embedding: None,
    }
}

/// A dataset on disk under `<data_dir>/datasets/<namespace>/<name>/`.
pub struct Dataset {
    namespace: String,
    name: String,
    dir: PathBuf,
    config: ConfigStore,
    state: RwLock<Arc<DatasetSnapshot>>,
    writer: Mutex<()>,
    deleted: AtomicBool,
}

impl Dataset {
    /// Creates a dataset from `source`. `config.json` is written last and marks the dataset
    /// complete.
    pub fn create<P: AsRef<FsPath>>(
        dir: P,
        namespace: &str,
        name: &str,
        source: &dyn Source,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if dir.join(CONFIG_FILE).exists() {
            return Err(Error::DatasetExists(format!("{}/{}", namespace, name)));
        }
        fs::create_dir_all(dir.join(BRANCHES_DIR))?;

        let rows = assign_row_ids(source.process()?)?;
        let rowid_schema =
            make_schema_from_path(&Path::from([ROWID]), Field::leaf(DataType::String))?;
        let schema = merge_schemas([rowid_schema, infer_schema(&rows)?])?;

        let file = format!("source-{}.bin", Uuid::new_v4());
        rows::write_rows(&dir.join(&file), &rows).map_err(storage)?;
        let source_manifest = SourceManifest {
            files: vec![file],
            data_schema: schema,
            num_items: rows.len(),
        };
        rows::write_json(&dir.join(SOURCE_MANIFEST_FILE), &source_manifest).map_err(storage)?;
        rows::write_json(&dir.join(BRANCHES_FILE), &Vec::<SignalManifest>::new()).map_err(storage)?;

        let settings = default_settings(&source_manifest.data_schema, &rows);
        let config = DatasetConfig::new(namespace, name, source.config()).with_settings(settings);
        let config = ConfigStore::create(dir.join(CONFIG_FILE), config)?;

        let rows = Arc::new(rows);
        let rowid_index = Arc::new(index_rows(&rows));
        let snapshot = DatasetSnapshot::build(
            namespace,
            name,
            source_manifest,
            rows,
            rowid_index,
            Vec::new(),
        )?;
        info!("Created dataset {}/{} with {} rows", namespace, name, snapshot.num_rows());

        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            dir,
            config,
            state: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
            deleted: AtomicBool::new(false),
        })
    }

    pub fn open<P: AsRef<FsPath>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let config = ConfigStore::load(dir.join(CONFIG_FILE))?;
        let (namespace, name) = {
            let current = config.get();
            (current.namespace.clone(), current.name.clone())
        };

        let source: SourceManifest =
            rows::read_json(&dir.join(SOURCE_MANIFEST_FILE)).map_err(storage)?;
        let mut source_rows = Vec::with_capacity(source.num_items);
        for file in &source.files {
            let mut part: Vec<Item> = rows::read_rows(&dir.join(file)).map_err(storage)?;
            source_rows.append(&mut part);
        }

        let branches_path = dir.join(BRANCHES_FILE);
        let manifests: Vec<SignalManifest> = if branches_path.exists() {
            rows::read_json(&branches_path).map_err(storage)?
        } else {
            Vec::new()
        };
        let branches = manifests
            .into_par_iter()
            .map(|manifest| {
                let values: Vec<(String, Item)> =
                    rows::read_rows(&dir.join(&manifest.file)).map_err(storage)?;
                Ok(Arc::new(Branch {
                    manifest,
                    values: values.into_iter().collect(),
                }))
            })
            .collect::<Result<Vec<_>>>()?;

        let rows = Arc::new(source_rows);
        let rowid_index = Arc::new(index_rows(&rows));
        let snapshot =
            DatasetSnapshot::build(&namespace, &name, source, rows, rowid_index, branches)?;
        debug!(
            "Loaded dataset {}/{}: {} rows, {} branches",
            namespace,
            name,
            snapshot.num_rows(),
            snapshot.branches().len()
        );

        Ok(Self {
            namespace,
            name,
            dir,
            config,
            state: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
            deleted: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn dir(&self) -> &FsPath {
        &self.dir
    }

    #[inline]
    pub fn snapshot(&self) -> Arc<DatasetSnapshot> {
        self.state.read().clone()
    }

    pub fn manifest(&self) -> DatasetManifest {
        self.snapshot().manifest().clone()
    }

    #[inline]
    pub fn config(&self) -> Arc<DatasetConfig> {
        self.config.get()
    }

    pub fn replace_config(&self, config: DatasetConfig) -> Result<Arc<DatasetConfig>> {
        self.check_live()?;
        self.config.replace(config)
    }

    /// At most one materialization runs per dataset; writers hold this for their whole run.
    /// Fails once the dataset has been deleted, including for writers queued before the delete.
    pub fn lock_writer(&self) -> Result<MutexGuard<'_, ()>> {
        let guard = self.writer.lock();
        self.check_live()?;
        Ok(guard)
    }

    /// Waits for the running writer and marks the dataset deleted. The returned guard keeps
    /// writers out while the files are removed.
    pub(crate) fn mark_deleted(&self) -> MutexGuard<'_, ()> {
        let guard = self.writer.lock();
        self.deleted.store(true, Ordering::Release);
        guard
    }

    #[inline]
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    fn check_live(&self) -> Result<()> {
        if self.is_deleted() {
            return Err(Error::DatasetNotFound(format!("{}/{}", self.namespace, self.name)));
        }
        Ok(())
    }

    fn write_branch_index(&self, branches: &[Arc<Branch>]) -> Result<()> {
        let manifests: Vec<&SignalManifest> = branches.iter().map(|b| &b.manifest).collect();
        rows::write_json(&self.dir.join(BRANCHES_FILE), &manifests).map_err(storage)
    }

    fn rollback_config(&self, previous: &DatasetConfig) {
        if let Err(e) = self.config.persist(previous) {
            warn!("Failed to restore config of {}/{}: {}", self.namespace, self.name, e);
        }
    }

    /// Installs the snapshot, then the config, so a config reader never sees an entry whose
    /// branch is not yet visible.
    fn swap(&self, next: DatasetSnapshot, config: Option<DatasetConfig>) {
        let mut state = self.state.write();
        *state = Arc::new(next);
        if let Some(config) = config {
            self.config.install(config);
        }
    }

    fn remove_file(&self, file: &str) {
        if let Err(e) = fs::remove_file(self.dir.join(file)) {
            warn!("Failed to remove {} of {}/{}: {}", file, self.namespace, self.name, e);
        }
    }

    /// Writes a branch, then makes it visible together with `config` (when given).
    /// A branch with the same output path is replaced. On failure the previous state stays.
    pub fn publish_branch(
        &self,
        branch: NewBranch,
        config: Option<DatasetConfig>,
    ) -> Result<SignalManifest> {
        self.check_live()?;
        let current = self.snapshot();
        let id = Uuid::new_v4().to_string();
        let manifest = SignalManifest {
            file: format!("{}/{}.bin", BRANCHES_DIR, id),
            id,
            source_path: branch.source_path,
            output_path: branch.output_path,
            signal: branch.signal,
            is_embedding: branch.is_embedding,
            data_schema: branch.data_schema,
        };

        let superseded = current.branch(&manifest.output_path).map(|b| b.manifest.file.clone());
        let mut branches: Vec<Arc<Branch>> = current
            .branches()
            .iter()
            .filter(|b| b.manifest.output_path != manifest.output_path)
            .cloned()
            .collect();
        let mut manifests: Vec<SignalManifest> =
            branches.iter().map(|b| b.manifest.clone()).collect();
        manifests.push(manifest.clone());
        merged_schema(&current.source, &manifests)?;

        rows::write_rows(&self.dir.join(&manifest.file), &branch.values).map_err(storage)?;

        branches.push(Arc::new(Branch {
            manifest: manifest.clone(),
            values: branch.values.into_iter().collect(),
        }));
        let next = match DatasetSnapshot::build(
            &self.namespace,
            &self.name,
            current.source.clone(),
            current.rows.clone(),
            current.rowid_index.clone(),
            branches,
        ) {
            Ok(next) => next,
            Err(e) => {
                self.remove_file(&manifest.file);
                return Err(e);
            }
        };

        let previous = self.config.get();
        if let Some(config) = &config {
            if let Err(e) = self.config.persist(config) {
                self.remove_file(&manifest.file);
                return Err(e);
            }
        }
        if let Err(e) = self.write_branch_index(next.branches()) {
            warn!(
                "Rolling back branch {} of {}/{}: {}",
                manifest.output_path, self.namespace, self.name, e
            );
            if config.is_some() {
                self.rollback_config(&previous);
            }
            self.remove_file(&manifest.file);
            return Err(e);
        }

        self.swap(next, config);
        info!("Published branch {} on {}/{}", manifest.output_path, self.namespace, self.name);

        if let Some(file) = superseded {
            self.remove_file(&file);
        }
        Ok(manifest)
    }

    /// Removes the branch at `output_path` together with every branch computed over it. `config`
    /// receives the current config and the removed manifests and returns the config to persist.
    pub fn remove_branch<F>(&self, output_path: &Path, config: F) -> Result<Vec<SignalManifest>>
    where
        F: FnOnce(&DatasetConfig, &[SignalManifest]) -> DatasetConfig,
    {
        self.check_live()?;
        let current = self.snapshot();
        if current.branch(output_path).is_none() {
            return Err(Error::MaterializationConflict(format!(
                "no materialized signal at \"{}\"",
                output_path
            )));
        }

        let (removed, kept): (Vec<Arc<Branch>>, Vec<Arc<Branch>>) =
            current.branches().iter().cloned().partition(|b| {
                b.manifest.output_path == *output_path
                    || b.manifest.source_path.starts_with(output_path)
            });
        let removed: Vec<SignalManifest> = removed.iter().map(|b| b.manifest.clone()).collect();

        let next = DatasetSnapshot::build(
            &self.namespace,
            &self.name,
            current.source.clone(),
            current.rows.clone(),
            current.rowid_index.clone(),
            kept,
        )?;

        let previous = self.config.get();
        let config = config(&previous, &removed);
        self.config.persist(&config)?;
        if let Err(e) = self.write_branch_index(next.branches()) {
            self.rollback_config(&previous);
            return Err(e);
        }

        self.swap(next, Some(config));
        info!("Removed branch {} from {}/{}", output_path, self.namespace, self.name);

        for manifest in &removed {
            self.remove_file(&manifest.file);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::DictSource;
    use serde_json::json;
    use tempfile::tempdir;

    fn source() -> DictSource {
        DictSource::from_json(&[json!({"text": "hello"}), json!({"text": "hello world", "n": 2})])
    }

    fn length_branch(snapshot: &DatasetSnapshot) -> NewBranch {
        let values = (0..snapshot.num_rows())
            .map(|i| {
                let text = snapshot.source_rows()[i].get("text").unwrap().as_str().unwrap();
                let value = Item::from_json(&json!({"text": {"len": text.len()}}));
                (snapshot.row_id(i).unwrap().to_string(), value)
            })
            .collect();
        NewBranch {
            source_path: Path::from(["text"]),
            output_path: Path::from(["text", "len"]),
            signal: SignalDescriptor::new("len"),
            is_embedding: false,
            data_schema: Schema::from_literal(&json!({"text": {"len": "int32"}})).unwrap(),
            values,
        }
    }

    #[test]
    fn test_create_assigns_row_ids_and_settings() {
        let dir = tempdir().unwrap();
        let dataset = Dataset::create(dir.path().join("ds"), "local", "docs", &source()).unwrap();
        let snapshot = dataset.snapshot();
        assert_eq!(snapshot.num_rows(), 2);
        let first = snapshot.source_rows()[0].as_struct().unwrap();
        assert_eq!(first.keys().next().map(String::as_str), Some(ROWID));
        assert_eq!(snapshot.schema().fields().keys().next().map(String::as_str), Some(ROWID));

        let settings = dataset.config().settings.clone().unwrap();
        assert_eq!(settings.ui.unwrap().media_paths, vec![Path::from(["text"])]);
    }

    #[test]
    fn test_create_twice_fails() {
        let dir = tempdir().unwrap();
        Dataset::create(dir.path().join("ds"), "local", "docs", &source()).unwrap();
        assert!(matches!(
            Dataset::create(dir.path().join("ds"), "local", "docs", &source()),
            Err(Error::DatasetExists(_))
        ));
    }

    #[test]
    fn test_publish_merges_and_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ds");
        let dataset = Dataset::create(&path, "local", "docs", &source()).unwrap();
        let branch = length_branch(&dataset.snapshot());
        dataset.publish_branch(branch, None).unwrap();

        let snapshot = dataset.snapshot();
        let merged = snapshot.merged_item(1).unwrap();
        assert_eq!(merged.get("text").unwrap().leaf_value(), &Item::from("hello world"));
        assert_eq!(merged.get("text").unwrap().get("len"), Some(&Item::Int(11)));
        assert!(snapshot.schema().has_field(&Path::from(["text", "len"])));
        assert_eq!(snapshot.manifest().summary.num_signals, 1);

        let reopened = Dataset::open(&path).unwrap();
        assert_eq!(reopened.manifest(), dataset.manifest());
        assert_eq!(reopened.snapshot().merged_item(1), Some(merged));
    }

    #[test]
    fn test_republish_replaces_branch_file() {
        let dir = tempdir().unwrap();
        let dataset = Dataset::create(dir.path().join("ds"), "local", "docs", &source()).unwrap();
        let first = dataset.publish_branch(length_branch(&dataset.snapshot()), None).unwrap();
        let second = dataset.publish_branch(length_branch(&dataset.snapshot()), None).unwrap();
        assert_eq!(dataset.snapshot().branches().len(), 1);
        assert!(!dataset.dir().join(&first.file).exists());
        assert!(dataset.dir().join(&second.file).exists());
    }

    #[test]
    fn test_conflicting_branch_keeps_previous_state() {
        let dir = tempdir().unwrap();
        let dataset = Dataset::create(dir.path().join("ds"), "local", "docs", &source()).unwrap();
        let before = dataset.manifest();
        let mut branch = length_branch(&dataset.snapshot());
        branch.data_schema = Schema::from_literal(&json!({"text": "int32"})).unwrap();
        assert!(dataset.publish_branch(branch, None).is_err());
        assert_eq!(dataset.manifest(), before);
        assert_eq!(fs::read_dir(dataset.dir().join(BRANCHES_DIR)).unwrap().count(), 0);
    }

    #[test]
    fn test_publish_after_delete_recreates_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ds");
        let dataset = Dataset::create(&path, "local", "docs", &source()).unwrap();
        let branch = length_branch(&dataset.snapshot());
        drop(dataset.mark_deleted());
        fs::remove_dir_all(&path).unwrap();

        assert!(matches!(dataset.publish_branch(branch, None), Err(Error::DatasetNotFound(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_index_write_keeps_config() {
        let dir = tempdir().unwrap();
        let dataset = Dataset::create(dir.path().join("ds"), "local", "docs", &source()).unwrap();
        let before = dataset.config();
        let (config, _) = before.with_signal(&Path::from(["text"]), &SignalDescriptor::new("len"));

        let index = dataset.dir().join(BRANCHES_FILE);
        fs::remove_file(&index).unwrap();
        fs::create_dir(&index).unwrap();
        let branch = length_branch(&dataset.snapshot());
        assert!(dataset.publish_branch(branch, Some(config.clone())).is_err());
        assert_eq!(dataset.config(), before);
        let on_disk: DatasetConfig = rows::read_json(&dataset.dir().join(CONFIG_FILE)).unwrap();
        assert_eq!(on_disk, *before);
        assert!(dataset.snapshot().branches().is_empty());

        fs::remove_dir(&index).unwrap();
        dataset
            .publish_branch(length_branch(&dataset.snapshot()), Some(config.clone()))
            .unwrap();
        assert_eq!(*dataset.config(), config);
        assert_eq!(dataset.snapshot().branches().len(), 1);
    }

    #[test]
    fn test_remove_branch() {
        let dir = tempdir().unwrap();
        let dataset = Dataset::create(dir.path().join("ds"), "local", "docs", &source()).unwrap();
        let manifest = dataset.publish_branch(length_branch(&dataset.snapshot()), None).unwrap();
        let removed = dataset
            .remove_branch(&Path::from(["text", "len"]), |config, _| config.clone())
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert!(!dataset.snapshot().schema().has_field(&Path::from(["text", "len"])));
        assert!(!dataset.dir().join(&manifest.file).exists());

        assert!(matches!(
            dataset.remove_branch(&Path::from(["text", "len"]), |config, _| config.clone()),
            Err(Error::MaterializationConflict(_))
        ));
    }
}
