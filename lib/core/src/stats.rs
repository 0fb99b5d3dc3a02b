// Column statistics over the values of a single leaf
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dtype::DataType;
use crate::item::Item;
use crate::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsResult {
    pub path: Path,
    /// Number of non-null values.
    pub total_count: usize,
    pub approx_count_distinct: usize,
    pub null_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_val: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_val: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_text_length: Option<f64>,
}

pub fn compute_stats(path: Path, dtype: DataType, values: &[Option<&Item>]) -> StatsResult {
    let mut distinct = AHashSet::new();
    let mut null_count = 0;
    let mut total_count = 0;
    let mut min: Option<&Item> = None;
    let mut max: Option<&Item> = None;
    let mut text_length = 0usize;

    for value in values {
        let Some(value) = value else {
            null_count += 1;
            continue;
        };
        total_count += 1;
        if let Some(key) = value.key() {
            distinct.insert(key);
        }
        match value {
            Item::String(s) => text_length += s.chars().count(),
            Item::Span { start, end } => text_length += (end - start) as usize,
            _ => {}
        }
        if dtype.is_ordinal() && !matches!(value, Item::Float(f) if f.is_nan()) {
            if min.map_or(true, |m| value.compare(m) == Some(std::cmp::Ordering::Less)) {
                min = Some(value);
            }
            if max.map_or(true, |m| value.compare(m) == Some(std::cmp::Ordering::Greater)) {
                max = Some(value);
            }
        }
    }

    let avg_text_length = match dtype {
        DataType::String | DataType::StringSpan if total_count > 0 => {
            Some(text_length as f64 / total_count as f64)
        }
        _ => None,
    };

    StatsResult {
        path,
        total_count,
        approx_count_distinct: distinct.len(),
        null_count,
        min_val: min.map(Item::to_json),
        max_val: max.map(Item::to_json),
        avg_text_length,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_stats() {
        let items = [Item::Int(3), Item::Int(1), Item::Int(3)];
        let values: Vec<Option<&Item>> = items.iter().map(Some).chain([None]).collect();
        let stats = compute_stats(Path::from(["n"]), DataType::Int64, &values);
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.null_count, 1);
        assert_eq!(stats.approx_count_distinct, 2);
        assert_eq!(stats.min_val, Some(json!(1)));
        assert_eq!(stats.max_val, Some(json!(3)));
        assert_eq!(stats.avg_text_length, None);
    }

    #[test]
    fn test_text_stats() {
        let items = [Item::from("hello"), Item::from("hello world")];
        let values: Vec<Option<&Item>> = items.iter().map(Some).collect();
        let stats = compute_stats(Path::from(["text"]), DataType::String, &values);
        assert_eq!(stats.avg_text_length, Some(8.0));
        assert_eq!(stats.min_val, None);
    }

    #[test]
    fn test_nan_is_skipped_for_min_max() {
        let items = [Item::Float(f64::NAN), Item::Float(2.5), Item::Float(-1.0)];
        let values: Vec<Option<&Item>> = items.iter().map(Some).collect();
        let stats = compute_stats(Path::from(["f"]), DataType::Float64, &values);
        assert_eq!(stats.min_val, Some(json!(-1.0)));
        assert_eq!(stats.max_val, Some(json!(2.5)));
    }
}
