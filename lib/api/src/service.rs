// Dataset operations for a serving layer: one call per request, no transport
use std::path::Path as FsPath;
use std::sync::Arc;
use tracing::info;

use strata_core::{Path, ResolvedSignal, SignalRegistry, StatsResult};
use strata_pipeline::{check_compatibility, SignalPipeline, TaskId, TaskInfo, TaskManager};
use strata_query::{
    select_groups, select_rows, select_rows_schema, SelectGroupsOptions, SelectGroupsResult,
    SelectRowsOptions, SelectRowsSchemaResult,
};
use strata_storage::{
    Dataset, DatasetConfig, DatasetInfo, DatasetManager, DatasetManifest, DatasetSettings,
};

use crate::error::{ApiError, ApiResult};
use crate::models::{
    ComputeEmbeddingRequest, ComputeSignalRequest, CreateDatasetRequest, DeleteSignalRequest,
    DeleteSignalResponse, MediaRequest, SelectRowsResponse, SelectRowsSchemaRequest, SignalInfo,
    StatsRequest, TaskResponse,
};

/// Entry point of every dataset operation. Materializations run on the task worker and return a
/// task id; everything else answers synchronously.
pub struct DatasetService {
    manager: Arc<DatasetManager>,
    pipeline: SignalPipeline,
    tasks: TaskManager,
}

impl DatasetService {
    pub fn new(manager: Arc<DatasetManager>, registry: Arc<SignalRegistry>) -> ApiResult<Self> {
        Ok(Self {
            manager,
            pipeline: SignalPipeline::new(registry),
            tasks: TaskManager::new()?,
        })
    }

    /// A service over `data_dir` with the built-in signals.
    pub fn open<P: AsRef<FsPath>>(data_dir: P) -> ApiResult<Self> {
        let manager = Arc::new(DatasetManager::new(data_dir)?);
        let registry = Arc::new(strata_signals::default_registry()?);
        Self::new(manager, registry)
    }

    #[inline]
    pub fn manager(&self) -> &DatasetManager {
        &self.manager
    }

    #[inline]
    pub fn registry(&self) -> &SignalRegistry {
        self.pipeline.registry()
    }

    fn dataset(&self, namespace: &str, name: &str) -> ApiResult<Arc<Dataset>> {
        Ok(self.manager.get_dataset(namespace, name)?)
    }

    pub fn create_dataset(&self, request: CreateDatasetRequest) -> ApiResult<DatasetManifest> {
        let source = request.source.into_source();
        let dataset = self
            .manager
            .create_dataset(&request.namespace, &request.dataset_name, source.as_ref())?;
        Ok(dataset.manifest())
    }

    pub fn list_datasets(&self) -> ApiResult<Vec<DatasetInfo>> {
        Ok(self.manager.list_datasets()?)
    }

    pub fn manifest(&self, namespace: &str, name: &str) -> ApiResult<DatasetManifest> {
        Ok(self.dataset(namespace, name)?.manifest())
    }

    pub fn delete_dataset(&self, namespace: &str, name: &str) -> ApiResult<()> {
        Ok(self.manager.delete_dataset(namespace, name)?)
    }

    pub fn config(&self, namespace: &str, name: &str) -> ApiResult<DatasetConfig> {
        Ok((*self.dataset(namespace, name)?.config()).clone())
    }

    pub fn settings(&self, namespace: &str, name: &str) -> ApiResult<DatasetSettings> {
        Ok(self
            .dataset(namespace, name)?
            .config()
            .settings
            .clone()
            .unwrap_or_default())
    }

    pub fn update_settings(
        &self,
        namespace: &str,
        name: &str,
        settings: DatasetSettings,
    ) -> ApiResult<()> {
        let dataset = self.dataset(namespace, name)?;
        self.pipeline.update_settings(&dataset, settings)?;
        Ok(())
    }

    /// Queues a signal computation. Unknown signals and incompatible leaves fail here, before a
    /// task is created.
    pub fn compute_signal(
        &self,
        namespace: &str,
        name: &str,
        request: ComputeSignalRequest,
    ) -> ApiResult<TaskResponse> {
        let dataset = self.dataset(namespace, name)?;
        let (signal_name, input_type) = match self.registry().resolve(&request.signal)? {
            ResolvedSignal::Signal(signal) => (signal.name().to_string(), signal.input_type()),
            ResolvedSignal::Embedding(embedding) => {
                (embedding.name().to_string(), embedding.input_type())
            }
        };
        check_compatibility(
            dataset.snapshot().schema(),
            &signal_name,
            input_type,
            &request.leaf_path,
        )?;

        let task_name = format!(
            "[{}/{}] Compute signal {} on \"{}\"",
            namespace,
            name,
            request.signal.key(),
            request.leaf_path
        );
        let pipeline = self.pipeline.clone();
        let task_id = self.tasks.submit(task_name, move || {
            pipeline
                .compute_signal(&dataset, &request.signal, &request.leaf_path)
                .map(|_| ())
        });
        Ok(TaskResponse { task_id })
    }

    pub fn compute_embedding(
        &self,
        namespace: &str,
        name: &str,
        request: ComputeEmbeddingRequest,
    ) -> ApiResult<TaskResponse> {
        let dataset = self.dataset(namespace, name)?;
        let embedder = self.registry().resolve_embedding(&request.embedding)?;
        check_compatibility(
            dataset.snapshot().schema(),
            embedder.name(),
            embedder.input_type(),
            &request.leaf_path,
        )?;

        let task_name = format!(
            "[{}/{}] Compute embedding {} on \"{}\"",
            namespace, name, request.embedding, request.leaf_path
        );
        let pipeline = self.pipeline.clone();
        let task_id = self.tasks.submit(task_name, move || {
            pipeline
                .compute_embedding(&dataset, &request.embedding, &request.leaf_path)
                .map(|_| ())
        });
        Ok(TaskResponse { task_id })
    }

    pub fn delete_signal(
        &self,
        namespace: &str,
        name: &str,
        request: DeleteSignalRequest,
    ) -> ApiResult<DeleteSignalResponse> {
        let dataset = self.dataset(namespace, name)?;
        let removed = self.pipeline.delete_signal(&dataset, &request.signal_path)?;
        info!("Deleted {} from {}/{}", request.signal_path, namespace, name);
        Ok(DeleteSignalResponse {
            completed: !removed.is_empty(),
        })
    }

    pub fn stats(
        &self,
        namespace: &str,
        name: &str,
        request: StatsRequest,
    ) -> ApiResult<StatsResult> {
        let snapshot = self.dataset(namespace, name)?.snapshot();
        Ok(strata_query::stats(&snapshot, &request.leaf_path)?)
    }

    pub fn select_rows(
        &self,
        namespace: &str,
        name: &str,
        options: &SelectRowsOptions,
    ) -> ApiResult<SelectRowsResponse> {
        let snapshot = self.dataset(namespace, name)?.snapshot();
        Ok(select_rows(&snapshot, self.registry(), options)?.into())
    }

    pub fn select_rows_schema(
        &self,
        namespace: &str,
        name: &str,
        request: SelectRowsSchemaRequest,
    ) -> ApiResult<SelectRowsSchemaResult> {
        let snapshot = self.dataset(namespace, name)?.snapshot();
        Ok(select_rows_schema(&snapshot, self.registry(), &request.into())?)
    }

    pub fn select_groups(
        &self,
        namespace: &str,
        name: &str,
        options: &SelectGroupsOptions,
    ) -> ApiResult<SelectGroupsResult> {
        let snapshot = self.dataset(namespace, name)?.snapshot();
        Ok(select_groups(&snapshot, options)?)
    }

    pub fn media(&self, namespace: &str, name: &str, request: &MediaRequest) -> ApiResult<Vec<u8>> {
        let path = Path::parse(&request.leaf_path)?;
        let snapshot = self.dataset(namespace, name)?.snapshot();
        Ok(strata_query::media(&snapshot, &request.item_id, &path)?)
    }

    pub fn task(&self, task_id: &str) -> ApiResult<TaskInfo> {
        self.tasks
            .task(task_id)
            .ok_or_else(|| ApiError::not_found(format!("task \"{}\" not found", task_id)))
    }

    /// Blocks until the task finishes.
    pub fn wait(&self, task_id: &str) -> ApiResult<TaskInfo> {
        self.tasks
            .wait(task_id)
            .ok_or_else(|| ApiError::not_found(format!("task \"{}\" not found", task_id)))
    }

    pub fn tasks(&self) -> Vec<(TaskId, TaskInfo)> {
        self.tasks.tasks()
    }

    pub fn signals(&self) -> Vec<SignalInfo> {
        let registry = self.registry();
        registry
            .names()
            .into_iter()
            .map(|name| SignalInfo {
                is_embedding: registry.is_embedding(&name),
                name,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::SourceRequest;
    use serde_json::json;
    use strata_core::{Item, SignalDescriptor, ROWID};
    use strata_pipeline::TaskStatus;
    use strata_query::{BinaryOp, Column, Filter};
    use tempfile::{tempdir, TempDir};

    fn service() -> (TempDir, DatasetService) {
        let dir = tempdir().unwrap();
        let service = DatasetService::open(dir.path()).unwrap();
        service
            .create_dataset(CreateDatasetRequest {
                namespace: "local".to_string(),
                dataset_name: "docs".to_string(),
                source: SourceRequest::Dict {
                    items: vec![
                        json!({"text": "hello"}),
                        json!({"text": "hello world"}),
                    ],
                },
            })
            .unwrap();
        (dir, service)
    }

    #[test]
    fn test_compute_signal_task_then_filter() {
        let (_dir, service) = service();
        let response = service
            .compute_signal(
                "local",
                "docs",
                ComputeSignalRequest {
                    signal: SignalDescriptor::new("text_length"),
                    leaf_path: Path::from(["text"]),
                },
            )
            .unwrap();
        let info = service.wait(&response.task_id).unwrap();
        assert_eq!(info.status, TaskStatus::Completed, "{:?}", info.error);

        let manifest = service.manifest("local", "docs").unwrap();
        assert_eq!(manifest.summary.num_signals, 1);

        let options = SelectRowsOptions {
            columns: vec![Column::new(Path::from(["text"]))],
            filters: vec![Filter::binary(
                Path::from(["text", "text_length"]),
                BinaryOp::Greater,
                json!(5),
            )],
            ..Default::default()
        };
        let result = service.select_rows("local", "docs", &options).unwrap();
        assert_eq!(result.total_num_rows, 1);
        assert_eq!(result.rows[0]["text"], json!("hello world"));
        assert!(result.rows[0][ROWID].is_string());
    }

    #[test]
    fn test_queued_compute_after_delete_fails() {
        let (_dir, service) = service();
        let (release, blocked) = std::sync::mpsc::channel::<()>();
        let blocker = service.tasks.submit("blocker", move || {
            blocked.recv().ok();
            Ok(())
        });
        let response = service
            .compute_signal(
                "local",
                "docs",
                ComputeSignalRequest {
                    signal: SignalDescriptor::new("text_length"),
                    leaf_path: Path::from(["text"]),
                },
            )
            .unwrap();

        service.delete_dataset("local", "docs").unwrap();
        release.send(()).unwrap();
        assert_eq!(service.wait(&blocker).unwrap().status, TaskStatus::Completed);

        let info = service.wait(&response.task_id).unwrap();
        assert_eq!(info.status, TaskStatus::Error);
        assert!(info.error.unwrap().contains("not found"));
        assert!(service.list_datasets().unwrap().is_empty());
        assert!(!service.manager().data_dir().join("datasets/local/docs").exists());
        assert_eq!(service.manifest("local", "docs").unwrap_err().kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_failures_before_queueing() {
        let (_dir, service) = service();
        let unknown = service.compute_signal(
            "local",
            "docs",
            ComputeSignalRequest {
                signal: SignalDescriptor::new("nope"),
                leaf_path: Path::from(["text"]),
            },
        );
        assert_eq!(unknown.unwrap_err().kind, ErrorKind::NotFound);

        let incompatible = service.compute_embedding(
            "local",
            "docs",
            ComputeEmbeddingRequest {
                embedding: "hash_embedding".to_string(),
                leaf_path: Path::from([ROWID, "missing"]),
            },
        );
        assert_eq!(incompatible.unwrap_err().kind, ErrorKind::BadRequest);
        assert!(service.tasks().is_empty());

        assert_eq!(service.manifest("local", "other").unwrap_err().kind, ErrorKind::NotFound);
        assert_eq!(service.task("missing").unwrap_err().kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_delete_signal_conflict() {
        let (_dir, service) = service();
        let result = service.delete_signal(
            "local",
            "docs",
            DeleteSignalRequest {
                signal_path: Path::from(["text", "text_length"]),
            },
        );
        assert_eq!(result.unwrap_err().kind, ErrorKind::Conflict);
    }

    #[test]
    fn test_settings_round_trip() {
        let (_dir, service) = service();
        let defaults = service.settings("local", "docs").unwrap();
        assert!(defaults.ui.is_some());

        service
            .update_settings("local", "docs", DatasetSettings::default())
            .unwrap();
        assert_eq!(service.settings("local", "docs").unwrap(), DatasetSettings::default());
        assert_eq!(
            service.config("local", "docs").unwrap().settings,
            Some(DatasetSettings::default())
        );
    }

    #[test]
    fn test_media_uses_dotted_path() {
        let dir = tempdir().unwrap();
        let service = DatasetService::open(dir.path()).unwrap();
        let dataset = service
            .manager()
            .create_dataset(
                "local",
                "images",
                &strata_storage::DictSource::new(vec![Item::from_pairs([
                    (ROWID, Item::from("r1")),
                    ("image", Item::from_pairs([("bytes", Item::Binary(vec![7, 8]))])),
                ])]),
            )
            .unwrap();
        assert_eq!(dataset.manifest().num_items, 1);

        let request = MediaRequest {
            item_id: "r1".to_string(),
            leaf_path: "image.bytes".to_string(),
        };
        assert_eq!(service.media("local", "images", &request).unwrap(), vec![7, 8]);
    }

    #[test]
    fn test_signals_listing() {
        let dir = tempdir().unwrap();
        let service = DatasetService::open(dir.path()).unwrap();
        let signals = service.signals();
        assert_eq!(signals.len(), 5);
        assert!(signals.iter().any(|s| s.name == "hash_embedding" && s.is_embedding));
        assert!(service.list_datasets().unwrap().is_empty());
    }
}
