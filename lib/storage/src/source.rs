// Data sources a dataset is created from
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

use strata_core::{Error, Item, Result};

/// Persisted descriptor of where a dataset's rows came from, tagged by `source_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source_name", rename_all = "snake_case")]
pub enum SourceConfig {
    Json { filepaths: Vec<String> },
    Dict,
}

/// Produces the rows of a new dataset.
pub trait Source: Send + Sync {
    fn process(&self) -> Result<Vec<Item>>;

    fn config(&self) -> SourceConfig;
}

/// Reads JSON arrays or JSON-lines files.
pub struct JsonSource {
    filepaths: Vec<PathBuf>,
}

impl JsonSource {
    pub fn new<I, P>(filepaths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            filepaths: filepaths.into_iter().map(Into::into).collect(),
        }
    }

    fn read_file(path: &PathBuf) -> Result<Vec<Value>> {
        let content = fs::read_to_string(path)?;
        let trimmed = content.trim_start();
        if trimmed.starts_with('[') {
            return serde_json::from_str(trimmed).map_err(|e| {
                Error::Serialization(format!("invalid JSON array in {}: {}", path.display(), e))
            });
        }
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|e| {
                    Error::Serialization(format!(
                        "invalid JSON on line {} of {}: {}",
                        i + 1,
                        path.display(),
                        e
                    ))
                })
            })
            .collect()
    }
}

impl Source for JsonSource {
    fn process(&self) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        for path in &self.filepaths {
            for value in Self::read_file(path)? {
                if !value.is_object() {
                    return Err(Error::SchemaValidation(format!(
                        "rows of {} must be JSON objects",
                        path.display()
                    )));
                }
                items.push(Item::from_json(&value));
            }
        }
        Ok(items)
    }

    fn config(&self) -> SourceConfig {
        SourceConfig::Json {
            filepaths: self.filepaths.iter().map(|p| p.display().to_string()).collect(),
        }
    }
}

/// Rows handed over in memory.
pub struct DictSource {
    items: Vec<Item>,
}

impl DictSource {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    pub fn from_json(values: &[Value]) -> Self {
        Self::new(values.iter().map(Item::from_json).collect())
    }
}

impl Source for DictSource {
    fn process(&self) -> Result<Vec<Item>> {
        if let Some(bad) = self.items.iter().find(|item| item.as_struct().is_none()) {
            return Err(Error::SchemaValidation(format!(
                "dict rows must be structs, got {}",
                bad.kind_name()
            )));
        }
        Ok(self.items.clone())
    }

    fn config(&self) -> SourceConfig {
        SourceConfig::Dict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_json_array_and_lines() {
        let dir = tempdir().unwrap();
        let array = dir.path().join("rows.json");
        let lines = dir.path().join("rows.jsonl");
        fs::write(&array, r#"[{"text": "a"}, {"text": "b"}]"#).unwrap();
        fs::write(&lines, "{\"text\": \"c\"}\n\n{\"text\": \"d\"}\n").unwrap();

        let source = JsonSource::new([array, lines]);
        let items = source.process().unwrap();
        let texts: Vec<&str> = items
            .iter()
            .map(|i| i.get("text").unwrap().as_str().unwrap())
            .collect();
        assert_eq!(texts, vec!["a", "b", "c", "d"]);
        assert!(matches!(
            source.config(),
            SourceConfig::Json { filepaths } if filepaths.len() == 2
        ));
    }

    #[test]
    fn test_json_rejects_non_objects() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.json");
        fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(JsonSource::new([path]).process(), Err(Error::SchemaValidation(_))));
    }

    #[test]
    fn test_source_config_tag() {
        let config = SourceConfig::Json {
            filepaths: vec!["a.json".to_string()],
        };
        assert_eq!(
            serde_json::to_value(&config).unwrap(),
            json!({"source_name": "json", "filepaths": ["a.json"]})
        );
        assert_eq!(
            serde_json::to_value(SourceConfig::Dict).unwrap(),
            json!({"source_name": "dict"})
        );
    }

    #[test]
    fn test_dict_source() {
        let source = DictSource::from_json(&[json!({"text": "hello"})]);
        assert_eq!(source.process().unwrap().len(), 1);
        assert!(DictSource::new(vec![Item::Int(1)]).process().is_err());
    }
}
