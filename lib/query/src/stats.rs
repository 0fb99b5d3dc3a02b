// Column statistics and raw media access
use rayon::prelude::*;

use strata_core::nested::values_at;
use strata_core::{compute_stats, DataType, Error, Item, Path, Result, StatsResult};
use strata_storage::DatasetSnapshot;

use crate::filter::CompiledFilter;

static NULL: Item = Item::Null;

fn owned_values(item: &Item, path: &Path) -> Vec<Option<Item>> {
    values_at(item, path).into_iter().map(|v| v.cloned()).collect()
}

/// Every value of `leaf_path` in row order, one per row for a path without wildcards.
/// Without filters the values are read from the layout that owns the leaf instead of merged rows.
pub(crate) fn leaf_values(
    snapshot: &DatasetSnapshot,
    leaf_path: &Path,
    filters: &[CompiledFilter],
) -> Vec<Option<Item>> {
    if filters.is_empty() {
        if snapshot.source_schema().has_field(leaf_path) {
            return snapshot
                .source_rows()
                .par_iter()
                .flat_map_iter(|row| owned_values(row, leaf_path))
                .collect();
        }
        let owner = snapshot
            .branches()
            .iter()
            .filter(|branch| leaf_path.starts_with(&branch.manifest.output_path))
            .max_by_key(|branch| branch.manifest.output_path.len());
        if let Some(branch) = owner {
            return (0..snapshot.num_rows())
                .into_par_iter()
                .flat_map_iter(|index| {
                    let value = snapshot
                        .row_id(index)
                        .and_then(|rowid| branch.value(rowid))
                        .unwrap_or(&NULL);
                    owned_values(value, leaf_path)
                })
                .collect();
        }
    }

    (0..snapshot.num_rows())
        .into_par_iter()
        .filter_map(|index| snapshot.merged_item(index))
        .filter(|item| filters.iter().all(|filter| filter.matches(item)))
        .flat_map_iter(|item| owned_values(&item, leaf_path))
        .collect()
}

/// Statistics over the full column of a leaf. A repeated leaf descends to its elements.
pub fn stats(snapshot: &DatasetSnapshot, leaf_path: &Path) -> Result<StatsResult> {
    let (leaf_path, field) = snapshot.schema().resolve_leaf(leaf_path)?;
    let dtype = field.dtype().unwrap_or(DataType::Null);
    if dtype == DataType::Embedding {
        return Err(Error::InvalidQuery(format!(
            "no statistics for the embedding at \"{}\"",
            leaf_path
        )));
    }
    let values = leaf_values(snapshot, &leaf_path, &[]);
    let refs: Vec<Option<&Item>> = values.iter().map(Option::as_ref).collect();
    Ok(compute_stats(leaf_path, dtype, &refs))
}

/// Raw bytes of a binary leaf in one row.
pub fn media(snapshot: &DatasetSnapshot, rowid: &str, leaf_path: &Path) -> Result<Vec<u8>> {
    let path = leaf_path.strip_value_key();
    if path.has_wildcard() {
        return Err(Error::InvalidQuery(format!(
            "media path \"{}\" must address a single value",
            path
        )));
    }
    let field = snapshot.schema().get_field(&path)?;
    if field.dtype() != Some(DataType::Binary) {
        return Err(Error::InvalidQuery(format!("\"{}\" is not a binary leaf", path)));
    }
    let item = snapshot
        .row_index(rowid)
        .and_then(|index| snapshot.merged_item(index))
        .ok_or_else(|| Error::RowNotFound(rowid.to_string()))?;
    match item.get_path(&path).map(Item::leaf_value) {
        Ok(Item::Binary(bytes)) => Ok(bytes.clone()),
        _ => Err(Error::InvalidQuery(format!(
            "row \"{}\" has no media at \"{}\"",
            rowid, path
        ))),
    }
}
