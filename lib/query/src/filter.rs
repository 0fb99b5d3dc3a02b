use serde::{Deserialize, Serialize};
use serde_json::Value;

use strata_core::nested::values_at;
use strata_core::{DataType, Error, Item, Path, Result, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Equals,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListOp {
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Exists,
}

/// A row predicate on one path. Over a wildcard path a row matches when any element does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Filter {
    Binary { path: Path, op: BinaryOp, value: Value },
    List { path: Path, op: ListOp, value: Vec<Value> },
    Unary { path: Path, op: UnaryOp },
}

impl Filter {
    pub fn binary(path: Path, op: BinaryOp, value: impl Into<Value>) -> Self {
        Filter::Binary {
            path,
            op,
            value: value.into(),
        }
    }

    pub fn is_in(path: Path, values: Vec<Value>) -> Self {
        Filter::List {
            path,
            op: ListOp::In,
            value: values,
        }
    }

    pub fn exists(path: Path) -> Self {
        Filter::Unary {
            path,
            op: UnaryOp::Exists,
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        match self {
            Filter::Binary { path, .. }
            | Filter::List { path, .. }
            | Filter::Unary { path, .. } => path,
        }
    }

    /// Resolves the path against `schema` and coerces the operands to the leaf type.
    pub fn compile(&self, schema: &Schema) -> Result<CompiledFilter> {
        match self {
            Filter::Unary { path, .. } => {
                let path = path.strip_value_key();
                schema.get_field(&path)?;
                Ok(CompiledFilter {
                    path,
                    condition: Condition::Exists,
                })
            }
            Filter::Binary { path, op, value } => {
                let (path, dtype) = comparable_leaf(schema, path)?;
                let value = Item::coerce_json(value, dtype)?;
                if value.is_null() {
                    return Err(Error::InvalidQuery(format!(
                        "filter on \"{}\" compares against null; use \"exists\"",
                        path
                    )));
                }
                Ok(CompiledFilter {
                    path,
                    condition: Condition::Binary(*op, value),
                })
            }
            Filter::List { path, value, .. } => {
                let (path, dtype) = comparable_leaf(schema, path)?;
                let values = value
                    .iter()
                    .map(|v| Item::coerce_json(v, dtype))
                    .collect::<Result<Vec<_>>>()?;
                Ok(CompiledFilter {
                    path,
                    condition: Condition::In(values),
                })
            }
        }
    }
}

fn comparable_leaf(schema: &Schema, path: &Path) -> Result<(Path, DataType)> {
    let (path, field) = schema.resolve_leaf(path)?;
    match field.dtype() {
        Some(DataType::Embedding) | None => Err(Error::InvalidQuery(format!(
            "values at \"{}\" cannot be compared",
            path
        ))),
        Some(dtype) => Ok((path, dtype)),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Binary(BinaryOp, Item),
    In(Vec<Item>),
    Exists,
}

/// A filter resolved against a schema, ready to test rows.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    path: Path,
    condition: Condition,
}

fn is_nan(item: &Item) -> bool {
    matches!(item, Item::Float(f) if f.is_nan())
}

fn compare(op: BinaryOp, value: &Item, target: &Item) -> bool {
    use std::cmp::Ordering::*;
    if is_nan(value) {
        return false;
    }
    match op {
        BinaryOp::Equals => value.loosely_equals(target),
        BinaryOp::NotEqual => !value.loosely_equals(target),
        BinaryOp::Greater => value.compare(target) == Some(Greater),
        BinaryOp::GreaterEqual => matches!(value.compare(target), Some(Greater | Equal)),
        BinaryOp::Less => value.compare(target) == Some(Less),
        BinaryOp::LessEqual => matches!(value.compare(target), Some(Less | Equal)),
    }
}

impl CompiledFilter {
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn matches(&self, item: &Item) -> bool {
        let values = values_at(item, &self.path);
        match &self.condition {
            Condition::Exists => values.into_iter().flatten().any(|value| match value {
                Item::List(items) => !items.is_empty(),
                Item::Struct(map) => !map.is_empty(),
                _ => true,
            }),
            Condition::Binary(op, target) => values
                .into_iter()
                .flatten()
                .any(|value| compare(*op, value, target)),
            Condition::In(targets) => values
                .into_iter()
                .flatten()
                .any(|value| {
                    !is_nan(value) && targets.iter().any(|target| value.loosely_equals(target))
                }),
        }
    }
}
