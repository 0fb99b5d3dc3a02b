// Materializes signals and embeddings as dataset branches
use std::sync::Arc;
use tracing::{debug, info};

use strata_core::nested::BatchInputs;
use strata_core::{
    embedding_fields, embedding_item, make_schema_from_path, DataType, Error, Item, Path,
    ResolvedSignal, Result, Schema, SignalDescriptor, SignalInputType, SignalRegistry, ROWID,
};
use strata_storage::{Dataset, DatasetConfig, DatasetSettings, NewBranch, SignalManifest};

/// A source leaf resolved for a signal.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    /// The requested path without a trailing value key.
    pub path: Path,
    /// Innermost leaf under `path`.
    pub leaf_path: Path,
    pub dtype: DataType,
    /// The text a span leaf points into.
    pub text_path: Option<Path>,
}

/// Resolves `path` to a leaf whose values `input_type` accepts.
pub fn check_compatibility(
    schema: &Schema,
    signal_name: &str,
    input_type: SignalInputType,
    path: &Path,
) -> Result<ResolvedSource> {
    let path = path.strip_value_key();
    let (leaf_path, field) = schema.resolve_leaf(&path).map_err(|e| {
        Error::SignalCompatibility(format!("\"{}\" cannot run on \"{}\": {}", signal_name, path, e))
    })?;
    let dtype = field.dtype().unwrap_or(DataType::Null);
    if !input_type.accepts(dtype) {
        return Err(Error::SignalCompatibility(format!(
            "\"{}\" expects {:?} input but \"{}\" holds {} values",
            signal_name, input_type, leaf_path, dtype
        )));
    }
    let text_path = match dtype {
        DataType::StringSpan => schema.derived_from_path(&leaf_path),
        _ => None,
    };
    Ok(ResolvedSource {
        path,
        leaf_path,
        dtype,
        text_path,
    })
}

fn row_values(items: &[Item], wrapped: Vec<Option<Item>>) -> Vec<(String, Item)> {
    items
        .iter()
        .zip(wrapped)
        .filter_map(|(item, value)| Some((item.get(ROWID)?.as_str()?.to_string(), value?)))
        .collect()
}

/// Computes signals over dataset leaves and publishes the results. Every operation holds the
/// dataset's writer lock for its whole run; readers keep the previous snapshot until publish.
#[derive(Clone)]
pub struct SignalPipeline {
    registry: Arc<SignalRegistry>,
}

impl SignalPipeline {
    pub fn new(registry: Arc<SignalRegistry>) -> Self {
        Self { registry }
    }

    #[inline]
    pub fn registry(&self) -> &SignalRegistry {
        &self.registry
    }

    /// Computes `signal` over the leaf at `source_path` and publishes it at `leaf + signal key`.
    /// An embedding name delegates to [`Self::compute_embedding`].
    pub fn compute_signal(
        &self,
        dataset: &Dataset,
        signal: &SignalDescriptor,
        source_path: &Path,
    ) -> Result<SignalManifest> {
        let signal = match self.registry.resolve(signal)? {
            ResolvedSignal::Signal(signal) => signal,
            ResolvedSignal::Embedding(embedding) => {
                return self.compute_embedding(dataset, embedding.name(), source_path)
            }
        };

        let _writer = dataset.lock_writer()?;
        let snapshot = dataset.snapshot();
        let source = check_compatibility(
            snapshot.schema(),
            signal.name(),
            signal.input_type(),
            source_path,
        )?;
        let descriptor = signal.descriptor();
        let key = signal.key();
        let output_path = source.leaf_path.child(key.as_str());
        let data_schema =
            make_schema_from_path(&output_path, signal.fields().with_signal(descriptor.clone()))?;

        let items = snapshot.merged_items();
        let inputs = BatchInputs::collect(&items, &source.leaf_path, source.text_path.as_ref());
        debug!(
            "Computing {} over {} values of {}/{}",
            key,
            inputs.len(),
            dataset.namespace(),
            dataset.name()
        );
        let outputs = signal.compute(inputs.values())?;
        let values = row_values(&items, inputs.wrap(&items, &source.leaf_path, &key, outputs)?);

        let (config, added) = dataset.config().with_signal(&source.path, &descriptor);
        let manifest = dataset.publish_branch(
            NewBranch {
                source_path: source.path,
                output_path,
                signal: descriptor,
                is_embedding: false,
                data_schema,
                values,
            },
            added.then_some(config),
        )?;
        info!(
            "Computed signal {} on {}/{} ({} rows annotated)",
            manifest.output_path,
            dataset.namespace(),
            dataset.name(),
            dataset.snapshot().branch(&manifest.output_path).map_or(0, |b| b.len())
        );
        Ok(manifest)
    }

    /// Embeds the leaf at `source_path` into `[span {embedding}]` and publishes it at `leaf + key`.
    pub fn compute_embedding(
        &self,
        dataset: &Dataset,
        embedding: &str,
        source_path: &Path,
    ) -> Result<SignalManifest> {
        let embedder = self.registry.resolve_embedding(embedding)?;

        let _writer = dataset.lock_writer()?;
        let snapshot = dataset.snapshot();
        let source = check_compatibility(
            snapshot.schema(),
            embedder.name(),
            embedder.input_type(),
            source_path,
        )?;
        let descriptor = embedder.descriptor();
        let key = embedder.key();
        let output_path = source.leaf_path.child(key.as_str());
        let fields = embedding_fields().with_signal(descriptor.clone());
        let data_schema = make_schema_from_path(&output_path, fields)?;

        let items = snapshot.merged_items();
        let inputs = BatchInputs::collect(&items, &source.leaf_path, source.text_path.as_ref());
        let outputs = embedder
            .embed(inputs.values())?
            .into_iter()
            .map(|spans| match spans {
                Some(spans) if !spans.is_empty() => embedding_item(spans).map(Some),
                _ => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;
        let values = row_values(&items, inputs.wrap(&items, &source.leaf_path, &key, outputs)?);

        let (config, added) = dataset.config().with_embedding(&source.path, embedder.name());
        let manifest = dataset.publish_branch(
            NewBranch {
                source_path: source.path,
                output_path,
                signal: descriptor,
                is_embedding: true,
                data_schema,
                values,
            },
            added.then_some(config),
        )?;
        info!(
            "Computed embedding {} on {}/{}",
            manifest.output_path,
            dataset.namespace(),
            dataset.name()
        );
        Ok(manifest)
    }

    /// Removes the branch at `signal_path`, branches computed over it and their config entries.
    pub fn delete_signal(
        &self,
        dataset: &Dataset,
        signal_path: &Path,
    ) -> Result<Vec<SignalManifest>> {
        let _writer = dataset.lock_writer()?;
        let removed = dataset.remove_branch(&signal_path.strip_value_key(), |config, removed| {
            removed.iter().fold(config.clone(), |config, manifest| {
                if manifest.is_embedding {
                    config.without_embedding(&manifest.source_path, &manifest.signal.signal_name)
                } else {
                    config.without_signal(&manifest.source_path, &manifest.signal)
                }
            })
        })?;
        info!(
            "Deleted {} branch(es) at {} from {}/{}",
            removed.len(),
            signal_path,
            dataset.namespace(),
            dataset.name()
        );
        Ok(removed)
    }

    /// Replaces the dataset settings wholesale.
    pub fn update_settings(
        &self,
        dataset: &Dataset,
        settings: DatasetSettings,
    ) -> Result<Arc<DatasetConfig>> {
        let _writer = dataset.lock_writer()?;
        dataset.replace_config(dataset.config().with_settings(settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::{Field, Signal, VALUE_KEY};
    use strata_storage::dataset::CONFIG_FILE;
    use strata_storage::DictSource;
    use tempfile::{tempdir, TempDir};

    fn pipeline() -> SignalPipeline {
        SignalPipeline::new(Arc::new(strata_signals::default_registry().unwrap()))
    }

    /// Fails outright, or returns one output too few.
    struct Broken {
        short: bool,
    }

    impl Signal for Broken {
        fn name(&self) -> &str {
            if self.short {
                "short"
            } else {
                "failing"
            }
        }

        fn input_type(&self) -> SignalInputType {
            SignalInputType::Text
        }

        fn fields(&self) -> Field {
            Field::leaf(DataType::Int32)
        }

        fn descriptor(&self) -> SignalDescriptor {
            SignalDescriptor::new(self.name())
        }

        fn compute(&self, data: &[Item]) -> Result<Vec<Option<Item>>> {
            if self.short {
                Ok(vec![Some(Item::Int(1)); data.len().saturating_sub(1)])
            } else {
                Err(Error::InvalidConfig("model unavailable".to_string()))
            }
        }
    }

    fn failing(_: &SignalDescriptor) -> Result<Box<dyn Signal>> {
        Ok(Box::new(Broken { short: false }))
    }

    fn short(_: &SignalDescriptor) -> Result<Box<dyn Signal>> {
        Ok(Box::new(Broken { short: true }))
    }

    fn dataset() -> (TempDir, Dataset) {
        let dir = tempdir().unwrap();
        let source = DictSource::from_json(&[
            json!({"text": "Hello there. How are you?", "n": 1}),
            json!({"text": "Fine.", "n": 2}),
            json!({"text": null, "n": 3}),
        ]);
        let dataset = Dataset::create(dir.path().join("ds"), "local", "test", &source).unwrap();
        (dir, dataset)
    }

    #[test]
    fn test_compute_signal_extends_schema_and_config() {
        let (_dir, dataset) = dataset();
        let pipeline = pipeline();
        let manifest = pipeline
            .compute_signal(&dataset, &SignalDescriptor::new("text_length"), &Path::from(["text"]))
            .unwrap();
        assert_eq!(manifest.output_path, Path::from(["text", "text_length"]));

        let snapshot = dataset.snapshot();
        let field = snapshot.schema().get_field(&manifest.output_path).unwrap();
        assert_eq!(field.dtype(), Some(DataType::Int32));
        assert_eq!(field.signal(), Some(&SignalDescriptor::new("text_length")));
        let merged = snapshot.merged_item(1).unwrap();
        assert_eq!(merged.get("text").unwrap().get("text_length"), Some(&Item::Int(5)));
        // No annotation for the null text.
        assert_eq!(snapshot.branch(&manifest.output_path).unwrap().len(), 2);
        assert_eq!(dataset.config().signals.len(), 1);
    }

    #[test]
    fn test_recompute_keeps_single_config_entry() {
        let (_dir, dataset) = dataset();
        let pipeline = pipeline();
        let signal = SignalDescriptor::new("text_length");
        pipeline.compute_signal(&dataset, &signal, &Path::from(["text"])).unwrap();
        let config = dataset.config();
        pipeline.compute_signal(&dataset, &signal, &Path::from(["text", VALUE_KEY])).unwrap();
        assert_eq!(*dataset.config(), *config);
        assert_eq!(dataset.snapshot().branches().len(), 1);
    }

    #[test]
    fn test_incompatible_leaf() {
        let (_dir, dataset) = dataset();
        let before = dataset.manifest();
        let pipeline = pipeline();
        let length = SignalDescriptor::new("text_length");
        let result = pipeline.compute_signal(&dataset, &length, &Path::from(["n"]));
        assert!(matches!(result, Err(Error::SignalCompatibility(_))));
        let bytes = SignalDescriptor::new("byte_length");
        let result = pipeline.compute_signal(&dataset, &bytes, &Path::from(["text"]));
        assert!(matches!(result, Err(Error::SignalCompatibility(_))));
        assert_eq!(dataset.manifest(), before);
    }

    #[test]
    fn test_failed_compute_leaves_dataset_unchanged() {
        let (_dir, dataset) = dataset();
        let mut registry = strata_signals::default_registry().unwrap();
        registry.register_signal("failing", failing).unwrap();
        registry.register_signal("short", short).unwrap();
        let pipeline = SignalPipeline::new(Arc::new(registry));
        pipeline
            .compute_signal(&dataset, &SignalDescriptor::new("text_length"), &Path::from(["text"]))
            .unwrap();

        let manifest = dataset.manifest();
        let config = dataset.config();
        let config_file = std::fs::read_to_string(dataset.dir().join(CONFIG_FILE)).unwrap();
        let branches: Vec<SignalManifest> = dataset
            .snapshot()
            .branches()
            .iter()
            .map(|b| b.manifest.clone())
            .collect();

        let text = Path::from(["text"]);
        let result = pipeline.compute_signal(&dataset, &SignalDescriptor::new("failing"), &text);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
        let result = pipeline.compute_signal(&dataset, &SignalDescriptor::new("short"), &text);
        assert!(matches!(result, Err(Error::InvalidSignalOutput(_))));

        assert_eq!(dataset.manifest(), manifest);
        assert_eq!(dataset.config(), config);
        assert_eq!(
            std::fs::read_to_string(dataset.dir().join(CONFIG_FILE)).unwrap(),
            config_file
        );
        let after: Vec<SignalManifest> = dataset
            .snapshot()
            .branches()
            .iter()
            .map(|b| b.manifest.clone())
            .collect();
        assert_eq!(after, branches);
    }

    #[test]
    fn test_signal_over_spans_offsets_back() {
        let (_dir, dataset) = dataset();
        let pipeline = pipeline();
        let sentences = pipeline
            .compute_signal(&dataset, &SignalDescriptor::new("sentences"), &Path::from(["text"]))
            .unwrap();
        let search = SignalDescriptor::new("substring_search").with_param("query", "how");
        let manifest = pipeline
            .compute_signal(&dataset, &search, &sentences.output_path)
            .unwrap();
        assert_eq!(
            manifest.output_path,
            Path::from(["text", "sentences", "*", "substring_search(query=how)"])
        );

        let merged = dataset.snapshot().merged_item(0).unwrap();
        let spans = merged.get("text").unwrap().get("sentences").unwrap().as_list().unwrap();
        // "How" starts at byte 13 of the full text, inside the second sentence.
        assert_eq!(spans[0].get("substring_search(query=how)"), None);
        let matches = spans[1].get("substring_search(query=how)").unwrap();
        assert_eq!(matches, &Item::List(vec![Item::Span { start: 13, end: 16 }]));
    }

    #[test]
    fn test_compute_embedding_via_signal_name() {
        let (_dir, dataset) = dataset();
        let manifest = pipeline()
            .compute_signal(
                &dataset,
                &SignalDescriptor::new("hash_embedding"),
                &Path::from(["text"]),
            )
            .unwrap();
        assert!(manifest.is_embedding);
        assert_eq!(dataset.config().embeddings.len(), 1);
        assert!(dataset.config().signals.is_empty());

        let merged = dataset.snapshot().merged_item(0).unwrap();
        let spans = merged.get("text").unwrap().get("hash_embedding").unwrap().as_list().unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].get(VALUE_KEY), Some(&Item::Span { start: 0, end: 12 }));
        assert!(matches!(spans[0].get("embedding"), Some(Item::Embedding(v)) if v.len() == 128));
    }

    #[test]
    fn test_delete_signal() {
        let (_dir, dataset) = dataset();
        let pipeline = pipeline();
        let sentences = pipeline
            .compute_signal(&dataset, &SignalDescriptor::new("sentences"), &Path::from(["text"]))
            .unwrap();
        pipeline
            .compute_signal(&dataset, &SignalDescriptor::new("text_length"), &sentences.output_path)
            .unwrap();
        assert_eq!(dataset.config().signals.len(), 2);

        let removed = pipeline.delete_signal(&dataset, &sentences.output_path).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(dataset.config().signals.is_empty());
        assert!(!dataset.snapshot().schema().has_field(&sentences.output_path));

        assert!(matches!(
            pipeline.delete_signal(&dataset, &sentences.output_path),
            Err(Error::MaterializationConflict(_))
        ));
    }

    #[test]
    fn test_update_settings_replaces() {
        let (_dir, dataset) = dataset();
        let settings = DatasetSettings {
            ui: None,
            preferred_embedding: Some("hash_embedding".to_string()),
        };
        let config = pipeline().update_settings(&dataset, settings.clone()).unwrap();
        assert_eq!(config.settings, Some(settings));
    }

    #[test]
    fn test_check_compatibility_resolves_span_text() {
        let schema = Schema::from_literal(&json!({
            "text": {"__value__": "string", "sentences": ["string_span"]}
        }))
        .unwrap();
        let resolved = check_compatibility(
            &schema,
            "text_length",
            SignalInputType::Text,
            &Path::from(["text", "sentences"]),
        )
        .unwrap();
        assert_eq!(resolved.leaf_path, Path::from(["text", "sentences", "*"]));
        assert_eq!(resolved.text_path, Some(Path::from(["text"])));
    }
}
