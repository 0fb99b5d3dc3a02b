// Grouping a single leaf into value or bin counts
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use strata_core::{check_bins, Bin, DataType, Error, Item, ItemKey, Path, Result};
use strata_storage::DatasetSnapshot;

use crate::column::SortOrder;
use crate::filter::Filter;
use crate::stats::leaf_values;

/// Exact-value grouping gives up at this many distinct values.
pub const TOO_MANY_DISTINCT: usize = 500_000;
pub const NUM_AUTO_BINS: usize = 15;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupsSortBy {
    #[default]
    Count,
    Value,
}

/// Caller bins: boundaries `[b0, b1, ...]` or explicit named bins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BinsInput {
    Boundaries(Vec<f64>),
    Named(Vec<Bin>),
}

impl BinsInput {
    /// Boundaries become bins named `"0".."n"`, open-ended at both extremes. Either form must
    /// pass the same checks as bins declared on a field.
    pub fn into_bins(self) -> Result<Vec<Bin>> {
        let bins = match self {
            BinsInput::Named(bins) => bins,
            BinsInput::Boundaries(bounds) => (0..=bounds.len())
                .map(|i| {
                    let start = i.checked_sub(1).map(|j| bounds[j]);
                    let end = bounds.get(i).copied();
                    Bin::new(i.to_string(), start, end)
                })
                .collect(),
        };
        check_bins(&bins).map_err(|e| match e {
            Error::SchemaValidation(msg) => Error::InvalidQuery(msg),
            other => other,
        })?;
        Ok(bins)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectGroupsOptions {
    pub leaf_path: Path,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub sort_by: Option<GroupsSortBy>,
    #[serde(default)]
    pub sort_order: Option<SortOrder>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub bins: Option<BinsInput>,
}

impl SelectGroupsOptions {
    pub fn new(leaf_path: Path) -> Self {
        Self {
            leaf_path,
            filters: Vec::new(),
            sort_by: None,
            sort_order: None,
            limit: None,
            bins: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectGroupsResult {
    pub too_many_distinct: bool,
    /// `(value or bin name, count)`; `null` collects the missing values.
    pub counts: Vec<(Value, usize)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bins: Option<Vec<Bin>>,
}

struct Group {
    value: Option<Item>,
    /// Position of the bin, when grouping by bins.
    rank: Option<usize>,
    count: usize,
}

fn auto_bins(values: &[Option<Item>], num_bins: usize) -> Vec<Bin> {
    let numbers = values
        .iter()
        .flatten()
        .filter_map(Item::as_f64)
        .filter(|v| !v.is_nan());
    let Some((min, max)) = numbers.fold(None, |range: Option<(f64, f64)>, v| match range {
        None => Some((v, v)),
        Some((min, max)) => Some((min.min(v), max.max(v))),
    }) else {
        return Vec::new();
    };
    let width = (max - min) / num_bins as f64;
    (0..num_bins)
        .map(|i| {
            let start = (i > 0).then(|| min + i as f64 * width);
            let end = (i + 1 < num_bins).then(|| min + (i + 1) as f64 * width);
            Bin::new(i.to_string(), start, end)
        })
        .collect()
}

fn bin_groups(values: &[Option<Item>], bins: &[Bin]) -> Vec<Group> {
    let mut counts = vec![0usize; bins.len()];
    let mut nulls = 0;
    for value in values {
        let bin = value
            .as_ref()
            .and_then(Item::as_f64)
            .filter(|v| !v.is_nan())
            .and_then(|v| bins.iter().position(|bin| bin.contains(v)));
        match bin {
            Some(i) => counts[i] += 1,
            None => nulls += 1,
        }
    }

    let mut groups: Vec<Group> = bins
        .iter()
        .zip(counts)
        .enumerate()
        .filter(|(_, (_, count))| *count > 0)
        .map(|(rank, (bin, count))| Group {
            value: Some(Item::from(bin.name.as_str())),
            rank: Some(rank),
            count,
        })
        .collect();
    if nulls > 0 {
        groups.push(Group {
            value: None,
            rank: None,
            count: nulls,
        });
    }
    groups
}

/// `None` when there are too many distinct values to group exactly.
fn value_groups(values: Vec<Option<Item>>) -> Option<Vec<Group>> {
    let mut counts: AHashMap<ItemKey, (Item, usize)> = AHashMap::new();
    let mut nulls = 0;
    for value in values {
        match value.and_then(|v| v.key().map(|key| (key, v))) {
            Some((key, value)) => counts.entry(key).or_insert((value, 0)).1 += 1,
            None => nulls += 1,
        }
        if counts.len() >= TOO_MANY_DISTINCT {
            return None;
        }
    }

    let mut groups: Vec<Group> = counts
        .into_values()
        .map(|(value, count)| Group {
            value: Some(value),
            rank: None,
            count,
        })
        .collect();
    if nulls > 0 {
        groups.push(Group {
            value: None,
            rank: None,
            count: nulls,
        });
    }
    Some(groups)
}

/// Orders group values ascending with the null group last.
fn compare_values(a: &Group, b: &Group) -> Ordering {
    match (&a.value, &b.value) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => match (a.rank, b.rank) {
            (Some(i), Some(j)) => i.cmp(&j),
            _ => x.compare(y).unwrap_or(Ordering::Equal),
        },
    }
}

fn sort_groups(groups: &mut [Group], sort_by: GroupsSortBy, order: SortOrder) {
    groups.sort_by(|a, b| match sort_by {
        GroupsSortBy::Count => {
            let by_count = match order {
                SortOrder::Asc => a.count.cmp(&b.count),
                SortOrder::Desc => b.count.cmp(&a.count),
            };
            by_count.then_with(|| compare_values(a, b))
        }
        GroupsSortBy::Value => match (&a.value, &b.value, order) {
            (Some(_), Some(_), SortOrder::Desc) => compare_values(b, a),
            _ => compare_values(a, b),
        },
    });
}

/// Groups the values of one leaf. Numeric leaves that are not categorical group into bins: the
/// caller's, else the schema's, else equal-width bins over the value range. Everything else groups
/// by exact value.
pub fn select_groups(
    snapshot: &DatasetSnapshot,
    options: &SelectGroupsOptions,
) -> Result<SelectGroupsResult> {
    let schema = snapshot.schema();
    let (leaf_path, field) = schema.resolve_leaf(&options.leaf_path)?;
    let dtype = field.dtype().unwrap_or(DataType::Null);
    if dtype == DataType::Embedding {
        return Err(Error::InvalidQuery(format!(
            "embeddings at \"{}\" cannot be grouped",
            leaf_path
        )));
    }
    let filters = options
        .filters
        .iter()
        .map(|filter| filter.compile(schema))
        .collect::<Result<Vec<_>>>()?;
    let values = leaf_values(snapshot, &leaf_path, &filters);

    let (mut groups, bins) = if dtype.is_numeric() && !field.is_categorical() {
        let bins = match &options.bins {
            Some(bins) => bins.clone().into_bins()?,
            None => match field.bins() {
                Some(bins) => bins.to_vec(),
                None => auto_bins(&values, NUM_AUTO_BINS),
            },
        };
        (bin_groups(&values, &bins), Some(bins))
    } else {
        match value_groups(values) {
            Some(groups) => (groups, None),
            None => {
                return Ok(SelectGroupsResult {
                    too_many_distinct: true,
                    counts: Vec::new(),
                    bins: None,
                })
            }
        }
    };

    sort_groups(
        &mut groups,
        options.sort_by.unwrap_or_default(),
        options.sort_order.unwrap_or_default(),
    );
    if let Some(limit) = options.limit {
        groups.truncate(limit);
    }
    Ok(SelectGroupsResult {
        too_many_distinct: false,
        counts: groups
            .into_iter()
            .map(|group| (group.value.map_or(Value::Null, |v| v.to_json()), group.count))
            .collect(),
        bins,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::BinaryOp;
    use serde_json::json;
    use strata_storage::{Dataset, DictSource};
    use tempfile::{tempdir, TempDir};

    fn dataset() -> (TempDir, Dataset) {
        let dir = tempdir().unwrap();
        let source = DictSource::from_json(&[
            json!({"label": "a", "score": 0.0, "tags": ["x", "y"]}),
            json!({"label": "b", "score": 1.5, "tags": ["x"]}),
            json!({"label": "a", "score": 9.0, "tags": []}),
            json!({"label": null, "score": 10.0, "tags": ["x"]}),
        ]);
        let dataset = Dataset::create(dir.path().join("ds"), "local", "test", &source).unwrap();
        (dir, dataset)
    }

    #[test]
    fn test_value_groups_with_null_group() {
        let (_dir, dataset) = dataset();
        let options = SelectGroupsOptions::new(Path::from(["label"]));
        let result = select_groups(&dataset.snapshot(), &options).unwrap();
        assert!(!result.too_many_distinct);
        assert_eq!(result.counts, vec![(json!("a"), 2), (json!("b"), 1), (Value::Null, 1)]);
        assert!(result.bins.is_none());
    }

    #[test]
    fn test_repeated_leaf_descends() {
        let (_dir, dataset) = dataset();
        let options = SelectGroupsOptions {
            sort_by: Some(GroupsSortBy::Value),
            sort_order: Some(SortOrder::Asc),
            ..SelectGroupsOptions::new(Path::from(["tags"]))
        };
        let result = select_groups(&dataset.snapshot(), &options).unwrap();
        assert_eq!(result.counts, vec![(json!("x"), 3), (json!("y"), 1)]);
    }

    #[test]
    fn test_caller_boundaries() {
        let (_dir, dataset) = dataset();
        let options = SelectGroupsOptions {
            bins: Some(BinsInput::Boundaries(vec![1.0, 5.0])),
            sort_by: Some(GroupsSortBy::Value),
            sort_order: Some(SortOrder::Asc),
            ..SelectGroupsOptions::new(Path::from(["score"]))
        };
        let result = select_groups(&dataset.snapshot(), &options).unwrap();
        assert_eq!(result.counts, vec![(json!("0"), 1), (json!("1"), 1), (json!("2"), 2)]);
        let bins = result.bins.unwrap();
        assert_eq!(bins[0], Bin::new("0", None, Some(1.0)));
        assert_eq!(bins[2], Bin::new("2", Some(5.0), None));
    }

    #[test]
    fn test_invalid_caller_bins_rejected() {
        let (_dir, dataset) = dataset();
        let invalid = [
            BinsInput::Named(vec![
                Bin::new("low", None, Some(1.0)),
                Bin::new("high", Some(2.0), None),
            ]),
            BinsInput::Named(vec![Bin::new("all", None, None)]),
            BinsInput::Boundaries(vec![]),
            BinsInput::Boundaries(vec![5.0, 1.0]),
        ];
        for bins in invalid {
            let options = SelectGroupsOptions {
                bins: Some(bins.clone()),
                ..SelectGroupsOptions::new(Path::from(["score"]))
            };
            assert!(
                matches!(select_groups(&dataset.snapshot(), &options), Err(Error::InvalidQuery(_))),
                "{:?}",
                bins
            );
        }

        let named = BinsInput::Named(vec![
            Bin::new("low", None, Some(2.0)),
            Bin::new("high", Some(2.0), None),
        ]);
        let options = SelectGroupsOptions {
            bins: Some(named),
            sort_by: Some(GroupsSortBy::Value),
            sort_order: Some(SortOrder::Asc),
            ..SelectGroupsOptions::new(Path::from(["score"]))
        };
        let result = select_groups(&dataset.snapshot(), &options).unwrap();
        assert_eq!(result.counts, vec![(json!("low"), 2), (json!("high"), 2)]);
    }

    #[test]
    fn test_auto_bins() {
        let (_dir, dataset) = dataset();
        let options = SelectGroupsOptions::new(Path::from(["score"]));
        let result = select_groups(&dataset.snapshot(), &options).unwrap();
        let bins = result.bins.unwrap();
        assert_eq!(bins.len(), NUM_AUTO_BINS);
        assert_eq!(bins[0].start, None);
        assert_eq!(bins[NUM_AUTO_BINS - 1].end, None);
        let total: usize = result.counts.iter().map(|(_, count)| count).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_filters_and_limit() {
        let (_dir, dataset) = dataset();
        let options = SelectGroupsOptions {
            filters: vec![Filter::binary(Path::from(["score"]), BinaryOp::Less, 5.0)],
            limit: Some(1),
            ..SelectGroupsOptions::new(Path::from(["label"]))
        };
        let result = select_groups(&dataset.snapshot(), &options).unwrap();
        assert_eq!(result.counts.len(), 1);
    }

    #[test]
    fn test_boundaries_deserialize() {
        let bins: BinsInput = serde_json::from_value(json!([0.5])).unwrap();
        assert_eq!(
            bins.into_bins().unwrap(),
            vec![Bin::new("0", None, Some(0.5)), Bin::new("1", Some(0.5), None)]
        );
        let named: BinsInput =
            serde_json::from_value(json!([{"name": "low", "start": null, "end": 1.0}])).unwrap();
        assert!(matches!(named, BinsInput::Named(_)));
    }
}
