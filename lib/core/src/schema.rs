use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};

use crate::dtype::DataType;
use crate::error::{Error, Result};
use crate::field::{Field, FieldKind};
use crate::item::Item;
use crate::ordered_map::OrderedMap;
use crate::path::{Path, PathSegment, VALUE_KEY};

#[derive(Deserialize)]
struct RawSchema {
    fields: OrderedMap<Field>,
}

impl TryFrom<RawSchema> for Schema {
    type Error = Error;

    fn try_from(raw: RawSchema) -> Result<Self> {
        Schema::new(raw.fields)
    }
}

/// The root of a dataset's field tree. Always struct-shaped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSchema")]
pub struct Schema {
    fields: OrderedMap<Field>,
}

impl Schema {
    pub fn new(fields: OrderedMap<Field>) -> Result<Self> {
        if fields.contains_key(VALUE_KEY) {
            return Err(Error::SchemaValidation(format!(
                "\"{}\" is a reserved field name",
                VALUE_KEY
            )));
        }
        Ok(Self { fields })
    }

    /// Builds a schema from a struct literal, see [`Field::from_literal`].
    pub fn from_literal(literal: &Value) -> Result<Self> {
        if !literal.is_object() || literal.get(VALUE_KEY).is_some() {
            return Err(Error::SchemaValidation(
                "a schema literal must be a map of fields".to_string(),
            ));
        }
        match Field::from_literal(literal)?.into_parts().0 {
            FieldKind::Struct(fields) => Schema::new(fields),
            _ => Err(Error::SchemaValidation(
                "a schema literal must be a map of fields".to_string(),
            )),
        }
    }

    #[inline]
    #[must_use]
    pub fn fields(&self) -> &OrderedMap<Field> {
        &self.fields
    }

    pub fn to_field(&self) -> Field {
        Field::from_kind(FieldKind::Struct(self.fields.clone()))
    }

    /// Every node exposing a dtype, keyed by path. Repeated fields contribute one wildcard per
    /// level.
    pub fn leafs(&self) -> BTreeMap<Path, &Field> {
        self.all_fields()
            .into_iter()
            .filter(|(_, field)| field.is_leaf())
            .collect()
    }

    /// Every node in breadth-first order.
    pub fn all_fields(&self) -> Vec<(Path, &Field)> {
        let mut result = Vec::new();
        let mut queue: VecDeque<(Path, &Field)> = self
            .fields
            .iter()
            .map(|(name, field)| (Path::new().child(name.as_str()), field))
            .collect();

        while let Some((path, field)) = queue.pop_front() {
            match field.kind() {
                FieldKind::Leaf { fields, .. } => {
                    if let Some(children) = fields {
                        for (name, child) in children.iter() {
                            queue.push_back((path.child(PathSegment::Name(name.clone())), child));
                        }
                    }
                }
                FieldKind::Struct(children) => {
                    for (name, child) in children.iter() {
                        queue.push_back((path.child(PathSegment::Name(name.clone())), child));
                    }
                }
                FieldKind::Repeated(child) => {
                    queue.push_back((path.child(PathSegment::Wildcard), child));
                }
            }
            result.push((path, field));
        }
        result
    }

    pub fn get_field(&self, path: &Path) -> Result<&Field> {
        let not_found = || Error::PathResolution(format!("path \"{}\" not found in schema", path));
        let mut segments = path.iter();
        let first = segments
            .next()
            .and_then(PathSegment::as_name)
            .ok_or_else(not_found)?;
        let mut current = self.fields.get(first).ok_or_else(not_found)?;

        for segment in segments {
            current = match (segment, current.kind()) {
                (PathSegment::Wildcard, FieldKind::Repeated(child)) => child,
                (PathSegment::Index(_), FieldKind::Repeated(child)) => child,
                (PathSegment::Name(_), FieldKind::Repeated(child))
                    if segment.as_index().is_some() =>
                {
                    child
                }
                (PathSegment::Name(name), _) => current
                    .fields()
                    .and_then(|f| f.get(name))
                    .ok_or_else(not_found)?,
                _ => return Err(not_found()),
            };
        }
        Ok(current)
    }

    #[inline]
    pub fn has_field(&self, path: &Path) -> bool {
        self.get_field(path).is_ok()
    }

    /// Resolves a leaf, descending into repeated fields so the returned path ends at the innermost
    /// element.
    pub fn resolve_leaf(&self, path: &Path) -> Result<(Path, &Field)> {
        let path = path.strip_value_key();
        let mut field = self.get_field(&path)?;
        let mut path = path;
        while let Some(child) = field.repeated_field() {
            field = child;
            path.push(PathSegment::Wildcard);
        }
        if field.dtype().is_none() {
            return Err(Error::PathResolution(format!("path \"{}\" is not a leaf", path)));
        }
        Ok((path, field))
    }

    /// The text a span leaf points into: the nearest ancestor string leaf, or the parent of the
    /// nearest ancestor produced by a signal.
    pub fn derived_from_path(&self, path: &Path) -> Option<Path> {
        for len in (1..path.len()).rev() {
            let prefix = path.prefix(len);
            let field = self.get_field(&prefix).ok()?;
            if field.dtype() == Some(DataType::String) {
                return Some(prefix);
            }
            if field.signal().is_some() {
                return prefix.parent();
            }
        }
        None
    }

    /// Adds `other` into `self`, see [`merge_fields`].
    pub fn merge(self, other: Schema) -> Result<Schema> {
        Schema::new(merge_field_maps(self.fields, other.fields)?)
    }
}

pub fn merge_schemas<I: IntoIterator<Item = Schema>>(schemas: I) -> Result<Schema> {
    schemas
        .into_iter()
        .try_fold(Schema::default(), |acc, schema| acc.merge(schema))
}

fn merge_field_maps(
    mut dest: OrderedMap<Field>,
    src: OrderedMap<Field>,
) -> Result<OrderedMap<Field>> {
    for (name, field) in src {
        dest.merge_with(name, field, merge_fields)?;
    }
    Ok(dest)
}

/// Structural union of two fields. A leaf merged with a struct keeps its dtype and gains the
/// struct's children.
pub fn merge_fields(a: Field, b: Field) -> Result<Field> {
    let (a_kind, a_signal, a_bins, a_categorical) = a.into_parts();
    let (b_kind, b_signal, b_bins, b_categorical) = b.into_parts();

    let kind = match (a_kind, b_kind) {
        (FieldKind::Struct(x), FieldKind::Struct(y)) => FieldKind::Struct(merge_field_maps(x, y)?),
        (FieldKind::Leaf { dtype, fields }, FieldKind::Struct(y))
        | (FieldKind::Struct(y), FieldKind::Leaf { dtype, fields }) => FieldKind::Leaf {
            dtype,
            fields: Some(merge_field_maps(fields.unwrap_or_default(), y)?)
                .filter(|f| !f.is_empty()),
        },
        (FieldKind::Leaf { dtype: d1, fields: f1 }, FieldKind::Leaf { dtype: d2, fields: f2 }) => {
            if d1 != d2 {
                return Err(Error::SchemaValidation(format!(
                    "cannot merge conflicting dtypes {} and {}",
                    d1, d2
                )));
            }
            let fields = match (f1, f2) {
                (Some(x), Some(y)) => Some(merge_field_maps(x, y)?),
                (x, y) => x.or(y),
            };
            FieldKind::Leaf { dtype: d1, fields }
        }
        (FieldKind::Repeated(x), FieldKind::Repeated(y)) => {
            FieldKind::Repeated(Box::new(merge_fields(*x, *y)?))
        }
        (x, y) => {
            return Err(Error::SchemaValidation(format!(
                "cannot merge a {} field with a {} field",
                kind_name(&x),
                kind_name(&y)
            )))
        }
    };

    Ok(Field::from_parts(
        kind,
        b_signal.or(a_signal),
        b_bins.or(a_bins),
        b_categorical.or(a_categorical),
    ))
}

fn kind_name(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Leaf { .. } => "leaf",
        FieldKind::Struct(_) => "struct",
        FieldKind::Repeated(_) => "repeated",
    }
}

/// Wraps `field` under `path`: names become structs and wildcards become repeated fields.
pub fn make_schema_from_path(path: &Path, field: Field) -> Result<Schema> {
    let segments = path.segments();
    let first = segments
        .first()
        .and_then(PathSegment::as_name)
        .ok_or_else(|| {
            Error::PathResolution(format!("path \"{}\" must start with a field name", path))
        })?;

    let mut current = field;
    for segment in segments[1..].iter().rev() {
        current = match segment {
            PathSegment::Name(name) => {
                let mut fields = OrderedMap::with_capacity(1);
                fields.insert(name.clone(), current);
                Field::structure(fields)?
            }
            PathSegment::Wildcard => Field::repeated(current),
            PathSegment::Index(i) => {
                return Err(Error::PathResolution(format!(
                    "schema path \"{}\" cannot hold the concrete index {}",
                    path, i
                )))
            }
        };
    }
    let mut fields = OrderedMap::with_capacity(1);
    fields.insert(first, current);
    Schema::new(fields)
}

/// Infers a schema from struct items. Nulls carry no type; integers widen to floats when mixed.
pub fn infer_schema(items: &[Item]) -> Result<Schema> {
    let mut fields: OrderedMap<Field> = OrderedMap::new();
    for item in items {
        let map = item.as_struct().ok_or_else(|| {
            Error::SchemaValidation(format!("expected a struct row, got {}", item.kind_name()))
        })?;
        for (name, value) in map.iter() {
            if let Some(inferred) = infer_field(value)? {
                fields.merge_with(name.clone(), inferred, merge_inferred)?;
            } else if !fields.contains_key(name) {
                fields.insert(name.clone(), Field::leaf(DataType::Null));
            }
        }
    }
    Schema::new(fields)
}

fn infer_field(item: &Item) -> Result<Option<Field>> {
    let dtype = match item {
        Item::Null => return Ok(None),
        Item::Bool(_) => DataType::Boolean,
        Item::Int(_) => DataType::Int64,
        Item::UInt(_) => DataType::Uint64,
        Item::Float(_) => DataType::Float64,
        Item::String(_) => DataType::String,
        Item::Binary(_) => DataType::Binary,
        Item::Span { .. } => DataType::StringSpan,
        Item::Embedding(_) => DataType::Embedding,
        Item::Date(_) => DataType::Date,
        Item::Time(_) => DataType::Time,
        Item::Timestamp(_) => DataType::Timestamp,
        Item::Interval(_) => DataType::Interval,
        Item::List(items) => {
            let mut element: Option<Field> = None;
            for item in items {
                if let Some(inferred) = infer_field(item)? {
                    element = Some(match element {
                        Some(existing) => merge_inferred(existing, inferred)?,
                        None => inferred,
                    });
                }
            }
            return Ok(element.map(Field::repeated));
        }
        Item::Struct(map) => {
            let mut children = OrderedMap::with_capacity(map.len());
            let mut value_dtype = None;
            for (name, child) in map.iter() {
                match infer_field(child)? {
                    Some(field) if name == VALUE_KEY => value_dtype = field.dtype(),
                    Some(field) => {
                        children.insert(name.clone(), field);
                    }
                    None => {}
                }
            }
            return match value_dtype {
                Some(dtype) => Field::leaf_with_fields(dtype, children).map(Some),
                None => Field::structure(children).map(Some),
            };
        }
    };
    Ok(Some(Field::leaf(dtype)))
}

fn merge_inferred(a: Field, b: Field) -> Result<Field> {
    match (a.into_parts().0, b.into_parts().0) {
        (FieldKind::Leaf { dtype: DataType::Null, .. }, other)
        | (other, FieldKind::Leaf { dtype: DataType::Null, .. }) => Ok(Field::from_kind(other)),
        (FieldKind::Leaf { dtype: x, fields: None }, FieldKind::Leaf { dtype: y, fields: None })
            if x != y && x.is_numeric() && y.is_numeric() =>
        {
            let widened = if x.is_float() || y.is_float() {
                DataType::Float64
            } else {
                DataType::Int64
            };
            Ok(Field::leaf(widened))
        }
        (FieldKind::Repeated(x), FieldKind::Repeated(y)) => {
            Ok(Field::repeated(merge_inferred(*x, *y)?))
        }
        (FieldKind::Struct(mut x), FieldKind::Struct(y)) => {
            for (name, field) in y {
                x.merge_with(name, field, merge_inferred)?;
            }
            Ok(Field::from_kind(FieldKind::Struct(x)))
        }
        (x, y) => merge_fields(Field::from_kind(x), Field::from_kind(y)),
    }
}
