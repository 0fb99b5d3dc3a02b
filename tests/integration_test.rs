// Integration tests for strata
use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;

use strata_core::{DataType, Error, Item, Path, SignalDescriptor, ROWID};
use strata_pipeline::SignalPipeline;
use strata_query::{
    select_groups, select_rows, select_rows_schema, BinaryOp, Column, Filter, Search,
    SelectGroupsOptions, SelectRowsOptions, SortOrder,
};
use strata_storage::{DatasetManager, DatasetSettings, DatasetUISettings, DictSource, JsonSource};

fn pipeline() -> SignalPipeline {
    SignalPipeline::new(Arc::new(strata_signals::default_registry().unwrap()))
}

fn hello_source() -> DictSource {
    DictSource::from_json(&[json!({"text": "hello"}), json!({"text": "hello world"})])
}

#[test]
fn test_length_signal_end_to_end() {
    let dir = tempdir().unwrap();
    let manager = DatasetManager::new(dir.path()).unwrap();
    let dataset = manager.create_dataset("local", "hello", &hello_source()).unwrap();

    let settings = dataset.config().settings.clone().unwrap();
    assert_eq!(settings.ui.unwrap().media_paths, vec![Path::from(["text"])]);

    let pipeline = pipeline();
    pipeline
        .compute_signal(&dataset, &SignalDescriptor::new("text_length"), &Path::from(["text"]))
        .unwrap();
    let config = dataset.config();
    assert_eq!(config.signals.len(), 1);
    assert_eq!(config.signals[0].path, Path::from(["text"]));

    let options = SelectRowsOptions {
        columns: vec![Column::new(Path::from(["text"]))],
        filters: vec![Filter::binary(Path::from(["text", "text_length"]), BinaryOp::Greater, 5)],
        ..Default::default()
    };
    let result = select_rows(&dataset.snapshot(), pipeline.registry(), &options).unwrap();
    assert_eq!(result.total_num_rows, 1);
    assert_eq!(result.rows[0].get("text"), Some(&Item::from("hello world")));
}

#[test]
fn test_recompute_and_parameter_identity() {
    let dir = tempdir().unwrap();
    let manager = DatasetManager::new(dir.path()).unwrap();
    let dataset = manager.create_dataset("local", "hello", &hello_source()).unwrap();
    let pipeline = pipeline();

    let search = |query: &str| SignalDescriptor::new("substring_search").with_param("query", query);
    pipeline.compute_signal(&dataset, &search("world"), &Path::from(["text"])).unwrap();
    pipeline.compute_signal(&dataset, &search("world"), &Path::from(["text"])).unwrap();
    assert_eq!(dataset.config().signals.len(), 1);

    pipeline.compute_signal(&dataset, &search("hello"), &Path::from(["text"])).unwrap();
    let config = dataset.config();
    assert_eq!(config.signals.len(), 2);
    assert_ne!(config.signals[0].signal, config.signals[1].signal);
    assert_eq!(dataset.snapshot().branches().len(), 2);
}

#[test]
fn test_update_settings_replaces_wholesale() {
    let dir = tempdir().unwrap();
    let manager = DatasetManager::new(dir.path()).unwrap();
    let dataset = manager.create_dataset("local", "hello", &hello_source()).unwrap();
    let pipeline = pipeline();

    let first = DatasetSettings {
        ui: Some(DatasetUISettings {
            media_paths: vec![Path::from(["text"])],
            markdown_paths: vec![Path::from(["text"])],
        }),
        preferred_embedding: Some("hash_embedding".to_string()),
    };
    pipeline.update_settings(&dataset, first).unwrap();

    let second = DatasetSettings {
        ui: None,
        preferred_embedding: None,
    };
    pipeline.update_settings(&dataset, second.clone()).unwrap();
    assert_eq!(dataset.config().settings, Some(second));
}

#[test]
fn test_delete_signal_drops_schema_and_config() {
    let dir = tempdir().unwrap();
    let manager = DatasetManager::new(dir.path()).unwrap();
    let dataset = manager.create_dataset("local", "hello", &hello_source()).unwrap();
    let pipeline = pipeline();

    let manifest = pipeline
        .compute_signal(&dataset, &SignalDescriptor::new("text_length"), &Path::from(["text"]))
        .unwrap();
    pipeline.delete_signal(&dataset, &manifest.output_path).unwrap();
    assert!(dataset.config().signals.is_empty());

    let schema = select_rows_schema(
        &dataset.snapshot(),
        pipeline.registry(),
        &SelectRowsOptions {
            combine_columns: true,
            ..Default::default()
        },
    )
    .unwrap()
    .data_schema;
    assert!(!schema.has_field(&manifest.output_path));
    assert!(schema.has_field(&Path::from(["text"])));

    assert!(matches!(
        pipeline.delete_signal(&dataset, &manifest.output_path),
        Err(Error::MaterializationConflict(_))
    ));
}

#[test]
fn test_branches_survive_reopen() {
    let dir = tempdir().unwrap();
    let rows = dir.path().join("rows.jsonl");
    std::fs::write(
        &rows,
        concat!(
            "{\"text\": \"The cat sat. A dog ran!\", \"label\": \"pets\"}\n",
            "{\"text\": \"Stocks fell.\", \"label\": \"news\"}\n",
        ),
    )
    .unwrap();

    {
        let manager = DatasetManager::new(dir.path().join("data")).unwrap();
        let dataset = manager
            .create_dataset("local", "docs", &JsonSource::new([rows.clone()]))
            .unwrap();
        let pipeline = pipeline();
        pipeline
            .compute_signal(&dataset, &SignalDescriptor::new("sentences"), &Path::from(["text"]))
            .unwrap();
        pipeline
            .compute_embedding(&dataset, "hash_embedding", &Path::from(["text"]))
            .unwrap();
    }

    let manager = DatasetManager::new(dir.path().join("data")).unwrap();
    let dataset = manager.get_dataset("local", "docs").unwrap();
    let manifest = dataset.manifest();
    assert_eq!(manifest.num_items, 2);
    assert_eq!(manifest.summary.num_signals, 1);
    assert_eq!(manifest.summary.num_embeddings, 1);
    let sentences = manifest
        .data_schema
        .get_field(&Path::from(["text", "sentences", "*"]))
        .unwrap();
    assert_eq!(sentences.dtype(), Some(DataType::StringSpan));

    let options = SelectGroupsOptions::new(Path::from(["label"]));
    let groups = select_groups(&dataset.snapshot(), &options).unwrap();
    assert_eq!(groups.counts, vec![(json!("news"), 1), (json!("pets"), 1)]);

    let registry = strata_signals::default_registry().unwrap();
    let options = SelectRowsOptions {
        columns: vec![Column::new(Path::from(["label"]))],
        searches: vec![Search::Semantic {
            path: Path::from(["text"]),
            query: "the cat sat".to_string(),
            embedding: "hash_embedding".to_string(),
        }],
        limit: Some(1),
        ..Default::default()
    };
    let result = select_rows(&dataset.snapshot(), &registry, &options).unwrap();
    assert_eq!(result.total_num_rows, 2);
    assert_eq!(result.rows[0].get("label"), Some(&Item::from("pets")));
}

#[test]
fn test_sort_and_paginate_over_signal() {
    let dir = tempdir().unwrap();
    let manager = DatasetManager::new(dir.path()).unwrap();
    let source = DictSource::from_json(&[
        json!({"text": "bb"}),
        json!({"text": "a"}),
        json!({"text": "dddd"}),
        json!({"text": "ccc"}),
    ]);
    let dataset = manager.create_dataset("local", "sort", &source).unwrap();
    let pipeline = pipeline();
    pipeline
        .compute_signal(&dataset, &SignalDescriptor::new("text_length"), &Path::from(["text"]))
        .unwrap();

    let options = SelectRowsOptions {
        columns: vec![Column::new(Path::from([ROWID])), Column::new(Path::from(["text"]))],
        sort_by: vec![Path::from(["text", "text_length"])],
        sort_order: Some(SortOrder::Asc),
        limit: Some(2),
        offset: 1,
        ..Default::default()
    };
    let result = select_rows(&dataset.snapshot(), pipeline.registry(), &options).unwrap();
    assert_eq!(result.total_num_rows, 4);
    let texts: Vec<&Item> = result.rows.iter().filter_map(|row| row.get("text")).collect();
    assert_eq!(texts, vec![&Item::from("bb"), &Item::from("ccc")]);
}
