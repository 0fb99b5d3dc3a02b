// Conversion between the schema tree and the Arrow columnar schema
use arrow_schema::{
    DataType as ArrowType, Field as ArrowField, Fields as ArrowFields, Schema as ArrowSchema,
    TimeUnit,
};
use std::sync::Arc;

use crate::dtype::DataType;
use crate::error::{Error, Result};
use crate::field::{Field, FieldKind};
use crate::ordered_map::OrderedMap;
use crate::path::VALUE_KEY;
use crate::schema::Schema;

const SPAN_START: &str = "start";
const SPAN_END: &str = "end";
const LIST_ITEM: &str = "item";

/// The physical layout of a span: `{start: int32, end: int32}`.
fn span_type() -> ArrowType {
    ArrowType::Struct(ArrowFields::from(vec![
        ArrowField::new(SPAN_START, ArrowType::Int32, true),
        ArrowField::new(SPAN_END, ArrowType::Int32, true),
    ]))
}

/// Primitive mapping of a leaf dtype. Embeddings have no physical column and map to null.
/// A span maps to its bare offsets; as a column it is always wrapped under the value key.
pub fn dtype_to_arrow(dtype: DataType) -> ArrowType {
    match dtype {
        DataType::String => ArrowType::Utf8,
        DataType::StringSpan => span_type(),
        DataType::Boolean => ArrowType::Boolean,
        DataType::Int8 => ArrowType::Int8,
        DataType::Int16 => ArrowType::Int16,
        DataType::Int32 => ArrowType::Int32,
        DataType::Int64 => ArrowType::Int64,
        DataType::Uint8 => ArrowType::UInt8,
        DataType::Uint16 => ArrowType::UInt16,
        DataType::Uint32 => ArrowType::UInt32,
        DataType::Uint64 => ArrowType::UInt64,
        DataType::Float16 => ArrowType::Float16,
        DataType::Float32 => ArrowType::Float32,
        DataType::Float64 => ArrowType::Float64,
        DataType::Time => ArrowType::Time64(TimeUnit::Microsecond),
        DataType::Date => ArrowType::Date64,
        DataType::Timestamp => ArrowType::Timestamp(TimeUnit::Microsecond, None),
        DataType::Interval => ArrowType::Duration(TimeUnit::Microsecond),
        DataType::Binary => ArrowType::Binary,
        DataType::Embedding | DataType::Null => ArrowType::Null,
    }
}

fn arrow_to_dtype(arrow: &ArrowType) -> Result<DataType> {
    Ok(match arrow {
        ArrowType::Utf8 | ArrowType::LargeUtf8 => DataType::String,
        ArrowType::Boolean => DataType::Boolean,
        ArrowType::Int8 => DataType::Int8,
        ArrowType::Int16 => DataType::Int16,
        ArrowType::Int32 => DataType::Int32,
        ArrowType::Int64 => DataType::Int64,
        ArrowType::UInt8 => DataType::Uint8,
        ArrowType::UInt16 => DataType::Uint16,
        ArrowType::UInt32 => DataType::Uint32,
        ArrowType::UInt64 => DataType::Uint64,
        ArrowType::Float16 => DataType::Float16,
        ArrowType::Float32 => DataType::Float32,
        ArrowType::Float64 => DataType::Float64,
        ArrowType::Time64(TimeUnit::Microsecond) => DataType::Time,
        ArrowType::Date64 => DataType::Date,
        ArrowType::Timestamp(TimeUnit::Microsecond, None) => DataType::Timestamp,
        ArrowType::Duration(TimeUnit::Microsecond) => DataType::Interval,
        ArrowType::Binary | ArrowType::LargeBinary => DataType::Binary,
        ArrowType::Null => DataType::Null,
        other => {
            return Err(Error::SchemaValidation(format!(
                "unsupported physical type {}",
                other
            )))
        }
    })
}

pub fn field_to_arrow(name: &str, field: &Field) -> ArrowField {
    ArrowField::new(name, field_type(field), true)
}

fn field_type(field: &Field) -> ArrowType {
    match field.kind() {
        FieldKind::Leaf {
            dtype: DataType::StringSpan,
            fields: None,
        } => ArrowType::Struct(ArrowFields::from(vec![ArrowField::new(
            VALUE_KEY,
            span_type(),
            true,
        )])),
        FieldKind::Leaf { dtype, fields: None } => dtype_to_arrow(*dtype),
        FieldKind::Leaf { dtype, fields: Some(children) } => {
            let mut columns = Vec::with_capacity(children.len() + 1);
            columns.push(ArrowField::new(VALUE_KEY, dtype_to_arrow(*dtype), true));
            columns.extend(children.iter().map(|(name, child)| field_to_arrow(name, child)));
            ArrowType::Struct(ArrowFields::from(columns))
        }
        FieldKind::Struct(children) => ArrowType::Struct(ArrowFields::from(
            children
                .iter()
                .map(|(name, child)| field_to_arrow(name, child))
                .collect::<Vec<_>>(),
        )),
        FieldKind::Repeated(child) => {
            ArrowType::List(Arc::new(ArrowField::new(LIST_ITEM, field_type(child), true)))
        }
    }
}

/// Converts a schema to its physical Arrow schema.
///
/// A `string_span` leaf becomes a struct holding the value key over `{start, end}`. Its attached
/// children sit next to the value key, just like those of any other leaf with children.
pub fn schema_to_arrow(schema: &Schema) -> ArrowSchema {
    let fields: Vec<ArrowField> = schema
        .fields()
        .iter()
        .map(|(name, field)| field_to_arrow(name, field))
        .collect();
    ArrowSchema::new(fields)
}

/// The structural inverse of [`schema_to_arrow`]. Embedding leaves come back as null leaves and
/// field metadata (signal, bins, categorical) is not carried.
pub fn arrow_to_schema(arrow: &ArrowSchema) -> Result<Schema> {
    let mut fields = OrderedMap::with_capacity(arrow.fields().len());
    for column in arrow.fields().iter() {
        fields.insert(column.name().clone(), arrow_to_field(column.data_type())?);
    }
    Schema::new(fields)
}

pub fn arrow_to_field(arrow: &ArrowType) -> Result<Field> {
    match arrow {
        ArrowType::Struct(columns) => {
            let mut value = None;
            let mut children = OrderedMap::with_capacity(columns.len());
            for column in columns.iter() {
                if column.name() == VALUE_KEY {
                    value = Some(if is_span(column.data_type()) {
                        DataType::StringSpan
                    } else {
                        arrow_to_dtype(column.data_type())?
                    });
                } else {
                    children.insert(column.name().clone(), arrow_to_field(column.data_type())?);
                }
            }
            match value {
                Some(dtype) => Field::leaf_with_fields(dtype, children),
                None => Field::structure(children),
            }
        }
        ArrowType::List(item) | ArrowType::LargeList(item) => {
            Ok(Field::repeated(arrow_to_field(item.data_type())?))
        }
        primitive => Ok(Field::leaf(arrow_to_dtype(primitive)?)),
    }
}

fn is_span(arrow: &ArrowType) -> bool {
    match arrow {
        ArrowType::Struct(columns) => {
            columns.len() == 2
                && columns
                    .iter()
                    .any(|c| c.name() == SPAN_START && c.data_type() == &ArrowType::Int32)
                && columns
                    .iter()
                    .any(|c| c.name() == SPAN_END && c.data_type() == &ArrowType::Int32)
        }
        _ => false,
    }
}
