// Row selection: filters, query-time columns, sorting and pagination
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use strata_core::nested::{merge_items, project, select_value, values_at};
use strata_core::{
    make_schema_from_path, merge_schemas, DataType, Error, Field, Item, OrderedMap, Path,
    PathSegment, Result, Schema, SignalDescriptor, SignalRegistry, ROWID,
};
use strata_storage::DatasetSnapshot;

use crate::column::{Column, Search, SelectRowsOptions, SortOrder, KEYWORD_SIGNAL, SCORE_KEY};
use crate::filter::{CompiledFilter, Filter};
use crate::udf::Udf;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectRowsResult {
    pub rows: Vec<Item>,
    /// Rows matching the query before `offset` and `limit`.
    pub total_num_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UdfInfo {
    pub path: Path,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultInfo {
    pub search_path: Path,
    pub result_path: Path,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortResult {
    pub path: Path,
    pub order: SortOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectRowsSchemaResult {
    pub data_schema: Schema,
    pub udfs: Vec<UdfInfo>,
    pub search_results: Vec<SearchResultInfo>,
    pub sorts: Vec<SortResult>,
}

/// A query resolved against one snapshot.
struct Plan {
    columns: Vec<Column>,
    udfs: Vec<Udf>,
    search_results: Vec<SearchResultInfo>,
    filters: Vec<CompiledFilter>,
    sorts: Vec<SortResult>,
    sort_leafs: Vec<Path>,
    /// The snapshot schema plus every UDF output.
    schema: Schema,
    combine: bool,
}

fn is_star(path: &Path) -> bool {
    matches!(path.segments(), [PathSegment::Wildcard])
}

fn column_key(alias: Option<&str>, path: &Path) -> String {
    alias.map_or_else(|| path.to_string(), str::to_string)
}

/// Every top-level source field except the row id. Separate columns also list each signal root.
fn default_columns(snapshot: &DatasetSnapshot, combine: bool) -> Vec<Column> {
    let mut columns: Vec<Column> = snapshot
        .source_schema()
        .fields()
        .keys()
        .filter(|name| name.as_str() != ROWID)
        .map(|name| Column::new(Path::from([name.as_str()])))
        .collect();
    if !combine {
        columns.extend(
            snapshot
                .branches()
                .iter()
                .filter(|branch| !branch.manifest.is_embedding)
                .map(|branch| Column::new(branch.manifest.output_path.clone())),
        );
    }
    columns
}

fn wrap_repeated(field: Field, path: &Path) -> Field {
    path.iter()
        .filter(|segment| segment.is_wildcard())
        .fold(field, |field, _| Field::repeated(field))
}

impl Plan {
    fn new(
        snapshot: &DatasetSnapshot,
        registry: &SignalRegistry,
        options: &SelectRowsOptions,
    ) -> Result<Plan> {
        let base_schema = snapshot.schema();
        let mut columns = Vec::new();
        let mut udfs: Vec<Udf> = Vec::new();
        let mut star = options.columns.is_empty();
        for column in &options.columns {
            match &column.signal_udf {
                Some(descriptor) => {
                    udfs.push(Udf::signal(base_schema, registry, column, descriptor)?)
                }
                None if is_star(&column.path) => star = true,
                None if options.combine_columns && column.alias.is_some() => {
                    return Err(Error::InvalidQuery(format!(
                        "column \"{}\" has an alias, which combined columns do not support",
                        column.path
                    )))
                }
                None => columns.push(column.clone()),
            }
        }
        if star {
            columns.extend(default_columns(snapshot, options.combine_columns));
        }

        let mut filters = options.filters.clone();
        let mut search_results = Vec::with_capacity(options.searches.len());
        let mut search_sort = None;
        for search in &options.searches {
            let udf = match search {
                Search::Keyword { path, query } => {
                    let descriptor =
                        SignalDescriptor::new(KEYWORD_SIGNAL).with_param("query", query.as_str());
                    let column = Column::new(path.clone());
                    let udf = Udf::signal(base_schema, registry, &column, &descriptor)?;
                    filters.push(Filter::exists(udf.output_path.clone()));
                    udf
                }
                Search::Semantic {
                    path,
                    query,
                    embedding,
                } => {
                    let udf = Udf::semantic(snapshot, registry, path, query, embedding)?;
                    search_sort.get_or_insert_with(|| {
                        udf.output_path.child(PathSegment::Wildcard).child(SCORE_KEY)
                    });
                    udf
                }
            };
            search_results.push(SearchResultInfo {
                search_path: search.path().clone(),
                result_path: udf.output_path.clone(),
            });
            udfs.push(udf);
        }
        let mut seen = Vec::with_capacity(udfs.len());
        udfs.retain(|udf| {
            if seen.contains(&udf.output_path) {
                false
            } else {
                seen.push(udf.output_path.clone());
                true
            }
        });

        let schema = merge_schemas(
            std::iter::once(base_schema.clone()).chain(udfs.iter().map(|u| u.schema.clone())),
        )?;
        for column in &columns {
            schema.get_field(&column.path.strip_value_key())?;
        }
        let filters = filters
            .iter()
            .map(|filter| filter.compile(&schema))
            .collect::<Result<Vec<_>>>()?;

        // Without an explicit sort key, search results rank best first whatever `sort_order` says.
        let sorts: Vec<SortResult> = if options.sort_by.is_empty() {
            search_sort
                .into_iter()
                .map(|path| SortResult {
                    path,
                    order: SortOrder::Desc,
                })
                .collect()
        } else {
            let order = options.sort_order.unwrap_or_default();
            options
                .sort_by
                .iter()
                .map(|path| SortResult {
                    path: path.clone(),
                    order,
                })
                .collect()
        };
        let sort_leafs = sorts
            .iter()
            .map(|sort| schema.resolve_leaf(&sort.path).map(|(path, _)| path))
            .collect::<Result<Vec<_>>>()?;

        Ok(Plan {
            columns,
            udfs,
            search_results,
            filters,
            sorts,
            sort_leafs,
            schema,
            combine: options.combine_columns,
        })
    }

    fn is_udf_path(&self, path: &Path) -> bool {
        self.udfs.iter().any(|udf| path.starts_with(&udf.output_path))
    }

    fn output_paths(&self) -> impl Iterator<Item = &Path> {
        self.columns
            .iter()
            .map(|c| &c.path)
            .chain(self.udfs.iter().map(|u| &u.output_path))
    }

    fn output_schema(&self, snapshot: &DatasetSnapshot) -> Result<Schema> {
        let rowid = Field::leaf(DataType::String);
        if self.combine {
            let mut parts = vec![make_schema_from_path(&Path::from([ROWID]), rowid)?];
            for path in self.output_paths() {
                let path = path.strip_value_key();
                parts.push(make_schema_from_path(&path, self.schema.get_field(&path)?.clone())?);
            }
            return merge_schemas(parts);
        }

        let mut fields = OrderedMap::with_capacity(self.columns.len() + self.udfs.len() + 1);
        fields.insert(ROWID, rowid);
        for column in &self.columns {
            let path = column.path.strip_value_key();
            let field = match snapshot.source_schema().get_field(&path) {
                Ok(field) => field,
                Err(_) => self.schema.get_field(&path)?,
            };
            fields.insert(
                column_key(column.alias.as_deref(), &column.path),
                wrap_repeated(field.clone(), &path),
            );
        }
        for udf in &self.udfs {
            let field = self.schema.get_field(&udf.output_path)?;
            fields.insert(
                column_key(udf.alias.as_deref(), &udf.output_path),
                wrap_repeated(field.clone(), &udf.output_path),
            );
        }
        Schema::new(fields)
    }

    fn output_row(&self, snapshot: &DatasetSnapshot, index: usize, item: &Item) -> Item {
        let rowid = item.get(ROWID).cloned().unwrap_or(Item::Null);
        let row = if self.combine {
            let paths = self.output_paths();
            paths.fold(Item::from_pairs([(ROWID, rowid)]), |row, path| {
                match project(item, &path.strip_value_key()) {
                    Some(projected) => merge_items(row, projected),
                    None => row,
                }
            })
        } else {
            let source = snapshot.source_rows().get(index).unwrap_or(item);
            let mut map = OrderedMap::with_capacity(self.columns.len() + self.udfs.len() + 1);
            map.insert(ROWID, rowid);
            for column in &self.columns {
                let path = column.path.strip_value_key();
                let owner = if snapshot.source_schema().has_field(&path) {
                    source
                } else {
                    item
                };
                map.insert(
                    column_key(column.alias.as_deref(), &column.path),
                    select_value(owner, &path),
                );
            }
            for udf in &self.udfs {
                map.insert(
                    column_key(udf.alias.as_deref(), &udf.output_path),
                    select_value(item, &udf.output_path),
                );
            }
            Item::Struct(map)
        };
        row.without_embeddings()
    }
}

fn is_nan(item: &Item) -> bool {
    matches!(item, Item::Float(f) if f.is_nan())
}

fn compare_items(a: &Item, b: &Item) -> Ordering {
    a.compare(b).unwrap_or(Ordering::Equal)
}

/// The value a row sorts by: the smallest element ascending, the largest descending.
fn sort_key(item: &Item, leaf_path: &Path, order: SortOrder) -> Option<Item> {
    let values = values_at(item, leaf_path)
        .into_iter()
        .flatten()
        .filter(|value| !is_nan(value));
    let key = match order {
        SortOrder::Asc => values.min_by(|a, b| compare_items(a, b)),
        SortOrder::Desc => values.max_by(|a, b| compare_items(a, b)),
    };
    key.cloned()
}

fn compare_keys(a: &[Option<Item>], b: &[Option<Item>], sorts: &[SortResult]) -> Ordering {
    for ((a, b), sort) in a.iter().zip(b).zip(sorts) {
        // Nulls sort last in either order.
        let ordering = match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => match sort.order {
                SortOrder::Asc => compare_items(a, b),
                SortOrder::Desc => compare_items(a, b).reverse(),
            },
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Runs a query: filters, computes query-time columns over the survivors, filters on their outputs,
/// sorts and paginates.
pub fn select_rows(
    snapshot: &DatasetSnapshot,
    registry: &SignalRegistry,
    options: &SelectRowsOptions,
) -> Result<SelectRowsResult> {
    let plan = Plan::new(snapshot, registry, options)?;
    let (udf_filters, base_filters): (Vec<&CompiledFilter>, Vec<&CompiledFilter>) =
        plan.filters.iter().partition(|filter| plan.is_udf_path(filter.path()));

    let mut rows: Vec<(usize, Item)> = (0..snapshot.num_rows())
        .into_par_iter()
        .filter_map(|index| {
            let item = snapshot.merged_item(index)?;
            base_filters
                .iter()
                .all(|filter| filter.matches(&item))
                .then_some((index, item))
        })
        .collect();

    for udf in &plan.udfs {
        let (indices, items): (Vec<usize>, Vec<Item>) = rows.into_iter().unzip();
        let outputs = udf.compute(&items)?;
        rows = indices
            .into_iter()
            .zip(items.into_iter().zip(outputs).map(|(item, output)| match output {
                Some(output) => merge_items(item, output),
                None => item,
            }))
            .collect();
    }
    if !udf_filters.is_empty() {
        rows.retain(|(_, item)| udf_filters.iter().all(|filter| filter.matches(item)));
    }
    let total_num_rows = rows.len();

    if !plan.sorts.is_empty() {
        let mut keyed: Vec<(Vec<Option<Item>>, (usize, Item))> = rows
            .into_par_iter()
            .map(|row| {
                let keys = plan
                    .sort_leafs
                    .iter()
                    .zip(&plan.sorts)
                    .map(|(leaf, sort)| sort_key(&row.1, leaf, sort.order))
                    .collect();
                (keys, row)
            })
            .collect();
        keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b, &plan.sorts));
        rows = keyed.into_iter().map(|(_, row)| row).collect();
    }

    let rows: Vec<Item> = rows
        .into_iter()
        .skip(options.offset)
        .take(options.limit.unwrap_or(usize::MAX))
        .map(|(index, item)| plan.output_row(snapshot, index, &item))
        .collect();
    debug!(
        "Selected {} of {} rows from {}/{}",
        rows.len(),
        total_num_rows,
        snapshot.manifest().namespace,
        snapshot.manifest().dataset_name
    );
    Ok(SelectRowsResult { rows, total_num_rows })
}

/// Resolves a query like [`select_rows`] without reading any row.
pub fn select_rows_schema(
    snapshot: &DatasetSnapshot,
    registry: &SignalRegistry,
    options: &SelectRowsOptions,
) -> Result<SelectRowsSchemaResult> {
    let plan = Plan::new(snapshot, registry, options)?;
    Ok(SelectRowsSchemaResult {
        data_schema: plan.output_schema(snapshot)?,
        udfs: plan
            .udfs
            .iter()
            .map(|udf| UdfInfo {
                path: udf.output_path.clone(),
                alias: udf.alias.clone(),
            })
            .collect(),
        search_results: plan.search_results,
        sorts: plan.sorts,
    })
}
