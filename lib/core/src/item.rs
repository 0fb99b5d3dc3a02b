use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cmp::Ordering;

use crate::dtype::DataType;
use crate::error::{Error, Result};
use crate::ordered_map::OrderedMap;
use crate::path::{Path, PathSegment, VALUE_KEY};

const SPAN_START: &str = "start";
const SPAN_END: &str = "end";

/// A value tree whose shape follows a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Binary(Vec<u8>),
    /// Byte offsets into a sibling or ancestor string.
    Span { start: u32, end: u32 },
    Embedding(Vec<f32>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    /// Microseconds.
    Interval(i64),
    List(Vec<Item>),
    Struct(OrderedMap<Item>),
}

/// Hashable identity of a scalar item, used for distinct counts and grouping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemKey {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(OrderedFloat<f64>),
    String(String),
    Binary(Vec<u8>),
    Span(u32, u32),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Interval(i64),
}

impl Item {
    /// A span, checked for `start <= end`.
    pub fn span(start: u32, end: u32) -> Result<Item> {
        if start > end {
            return Err(Error::SchemaValidation(format!(
                "span start {} is after its end {}",
                start, end
            )));
        }
        Ok(Item::Span { start, end })
    }

    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Item)>) -> Item {
        Item::Struct(pairs.into_iter().collect())
    }

    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Item::Null)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Item::Null => "null",
            Item::Bool(_) => "boolean",
            Item::Int(_) => "int",
            Item::UInt(_) => "uint",
            Item::Float(_) => "float",
            Item::String(_) => "string",
            Item::Binary(_) => "binary",
            Item::Span { .. } => "string_span",
            Item::Embedding(_) => "embedding",
            Item::Date(_) => "date",
            Item::Time(_) => "time",
            Item::Timestamp(_) => "timestamp",
            Item::Interval(_) => "interval",
            Item::List(_) => "list",
            Item::Struct(_) => "struct",
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Item::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Item::Binary(b) => Some(b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Item::Int(i) => Some(*i as f64),
            Item::UInt(u) => Some(*u as f64),
            Item::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[inline]
    pub fn as_span(&self) -> Option<(u32, u32)> {
        match self {
            Item::Span { start, end } => Some((*start, *end)),
            _ => None,
        }
    }

    #[inline]
    pub fn as_list(&self) -> Option<&[Item]> {
        match self {
            Item::List(items) => Some(items),
            _ => None,
        }
    }

    #[inline]
    pub fn as_struct(&self) -> Option<&OrderedMap<Item>> {
        match self {
            Item::Struct(map) => Some(map),
            _ => None,
        }
    }

    /// Child of a struct item.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Item> {
        self.as_struct().and_then(|map| map.get(name))
    }

    /// The leaf's own value: a struct carrying the value key unwraps to that value.
    #[inline]
    pub fn leaf_value(&self) -> &Item {
        match self {
            Item::Struct(map) => map.get(VALUE_KEY).unwrap_or(self),
            _ => self,
        }
    }

    /// Navigates to a single value. Wildcards are rejected: they address a set of values.
    pub fn get_path(&self, path: &Path) -> Result<&Item> {
        if path.has_wildcard() {
            return Err(Error::PathResolution(format!(
                "path \"{}\" contains a wildcard and cannot address a single value",
                path
            )));
        }
        let mut current = self;
        for segment in path {
            current = match (segment, current) {
                (PathSegment::Name(name), Item::Struct(map)) => map.get(name).ok_or_else(|| {
                    Error::PathResolution(format!("segment \"{}\" of \"{}\" not found", name, path))
                })?,
                (segment, Item::List(items)) => {
                    let index = segment.as_index().ok_or_else(|| {
                        Error::PathResolution(format!(
                            "segment \"{}\" of \"{}\" is not a list index",
                            segment, path
                        ))
                    })?;
                    items.get(index).ok_or_else(|| {
                        Error::PathResolution(format!(
                            "index {} of \"{}\" is out of bounds ({} elements)",
                            index,
                            path,
                            items.len()
                        ))
                    })?
                }
                (segment, other) => {
                    return Err(Error::PathResolution(format!(
                        "cannot navigate \"{}\" into a {} value at \"{}\"",
                        segment,
                        other.kind_name(),
                        path
                    )))
                }
            };
        }
        Ok(current)
    }

    /// Orders comparable scalars. Numbers compare across representations; NaN is unordered.
    pub fn compare(&self, other: &Item) -> Option<Ordering> {
        match (self, other) {
            (Item::Int(a), Item::Int(b)) => Some(a.cmp(b)),
            (Item::UInt(a), Item::UInt(b)) => Some(a.cmp(b)),
            (Item::String(a), Item::String(b)) => Some(a.cmp(b)),
            (Item::Bool(a), Item::Bool(b)) => Some(a.cmp(b)),
            (Item::Date(a), Item::Date(b)) => Some(a.cmp(b)),
            (Item::Time(a), Item::Time(b)) => Some(a.cmp(b)),
            (Item::Timestamp(a), Item::Timestamp(b)) => Some(a.cmp(b)),
            (Item::Interval(a), Item::Interval(b)) => Some(a.cmp(b)),
            (Item::Span { start: s1, end: e1 }, Item::Span { start: s2, end: e2 }) => {
                Some((s1, e1).cmp(&(s2, e2)))
            }
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// Equality used by filters: numbers compare by value.
    pub fn loosely_equals(&self, other: &Item) -> bool {
        match self.compare(other) {
            Some(ordering) => ordering == Ordering::Equal,
            None => self == other,
        }
    }

    pub fn key(&self) -> Option<ItemKey> {
        Some(match self {
            Item::Null => ItemKey::Null,
            Item::Bool(b) => ItemKey::Bool(*b),
            Item::Int(i) => ItemKey::Int(*i),
            Item::UInt(u) => ItemKey::UInt(*u),
            Item::Float(f) => ItemKey::Float(OrderedFloat(*f)),
            Item::String(s) => ItemKey::String(s.clone()),
            Item::Binary(b) => ItemKey::Binary(b.clone()),
            Item::Span { start, end } => ItemKey::Span(*start, *end),
            Item::Date(d) => ItemKey::Date(*d),
            Item::Time(t) => ItemKey::Time(*t),
            Item::Timestamp(t) => ItemKey::Timestamp(*t),
            Item::Interval(i) => ItemKey::Interval(*i),
            Item::Embedding(_) | Item::List(_) | Item::Struct(_) => return None,
        })
    }

    /// Replaces embedding vectors with nulls.
    #[must_use]
    pub fn without_embeddings(self) -> Item {
        match self {
            Item::Embedding(_) => Item::Null,
            Item::List(items) => {
                Item::List(items.into_iter().map(Item::without_embeddings).collect())
            }
            Item::Struct(map) => Item::Struct(
                map.into_iter()
                    .map(|(k, v)| (k, v.without_embeddings()))
                    .collect(),
            ),
            other => other,
        }
    }

    /// Shifts every span in the tree by `offset`. Fails when a shifted bound leaves `u32`.
    pub fn offset_spans(&mut self, offset: u32) -> Result<()> {
        match self {
            Item::Span { start, end } => {
                let shifted = start.checked_add(offset).zip(end.checked_add(offset));
                let Some((shifted_start, shifted_end)) = shifted else {
                    return Err(Error::InvalidSignalOutput(format!(
                        "span {}..{} shifted by {} overflows",
                        start, end, offset
                    )));
                };
                *start = shifted_start;
                *end = shifted_end;
                Ok(())
            }
            Item::List(items) => items.iter_mut().try_for_each(|item| item.offset_spans(offset)),
            Item::Struct(map) => map.iter_mut().try_for_each(|(_, item)| item.offset_spans(offset)),
            _ => Ok(()),
        }
    }

    pub fn from_json(value: &Value) -> Item {
        match value {
            Value::Null => Item::Null,
            Value::Bool(b) => Item::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Item::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Item::UInt(u)
                } else {
                    Item::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Item::String(s.clone()),
            Value::Array(items) => Item::List(items.iter().map(Item::from_json).collect()),
            Value::Object(map) => {
                let mut fields = OrderedMap::with_capacity(map.len());
                for (key, child) in map {
                    let child = match (key.as_str(), span_from_json(child)) {
                        (VALUE_KEY, Some(span)) => span,
                        _ => Item::from_json(child),
                    };
                    fields.insert(key.clone(), child);
                }
                match (fields.len(), fields.get(VALUE_KEY)) {
                    (1, Some(Item::Span { .. })) => fields.remove(VALUE_KEY).unwrap_or(Item::Null),
                    _ => Item::Struct(fields),
                }
            }
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Item::Null => Value::Null,
            Item::Bool(b) => Value::Bool(*b),
            Item::Int(i) => json!(i),
            Item::UInt(u) => json!(u),
            Item::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Item::String(s) => Value::String(s.clone()),
            Item::Binary(bytes) => json!(bytes),
            Item::Span { start, end } => json!({ VALUE_KEY: span_json(*start, *end) }),
            Item::Embedding(vector) => json!(vector),
            Item::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            Item::Time(t) => Value::String(t.format("%H:%M:%S%.f").to_string()),
            Item::Timestamp(t) => Value::String(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Item::Interval(micros) => json!(micros),
            Item::List(items) => Value::Array(items.iter().map(Item::to_json).collect()),
            Item::Struct(map) => {
                let mut object = serde_json::Map::with_capacity(map.len());
                for (key, child) in map.iter() {
                    let value = match (key.as_str(), child) {
                        (VALUE_KEY, Item::Span { start, end }) => span_json(*start, *end),
                        _ => child.to_json(),
                    };
                    object.insert(key.clone(), value);
                }
                Value::Object(object)
            }
        }
    }

    /// Converts a JSON literal into an item of `dtype`, parsing temporal strings.
    pub fn coerce_json(value: &Value, dtype: DataType) -> Result<Item> {
        let invalid = || Error::InvalidQuery(format!("{} is not a valid {} value", value, dtype));
        match (dtype, value) {
            (_, Value::Null) => Ok(Item::Null),
            (DataType::Date, Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(Item::Date)
                .map_err(|_| invalid()),
            (DataType::Time, Value::String(s)) => {
                s.parse::<NaiveTime>().map(Item::Time).map_err(|_| invalid())
            }
            (DataType::Timestamp, Value::String(s)) => s
                .parse::<NaiveDateTime>()
                .ok()
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
                .map(Item::Timestamp)
                .ok_or_else(invalid),
            (DataType::Interval, Value::Number(n)) => {
                n.as_i64().map(Item::Interval).ok_or_else(invalid)
            }
            (dtype, Value::Number(n)) if dtype.is_float() => {
                n.as_f64().map(Item::Float).ok_or_else(invalid)
            }
            _ => Ok(Item::from_json(value)),
        }
    }
}

fn span_json(start: u32, end: u32) -> Value {
    json!({ SPAN_START: start, SPAN_END: end })
}

fn span_from_json(value: &Value) -> Option<Item> {
    let map = value.as_object()?;
    if map.len() != 2 {
        return None;
    }
    let start = u32::try_from(map.get(SPAN_START)?.as_u64()?).ok()?;
    let end = u32::try_from(map.get(SPAN_END)?.as_u64()?).ok()?;
    Item::span(start, end).ok()
}

impl From<&str> for Item {
    fn from(s: &str) -> Self {
        Item::String(s.to_string())
    }
}

impl From<String> for Item {
    fn from(s: String) -> Self {
        Item::String(s)
    }
}

impl From<i64> for Item {
    fn from(i: i64) -> Self {
        Item::Int(i)
    }
}

impl From<f64> for Item {
    fn from(f: f64) -> Self {
        Item::Float(f)
    }
}

impl From<bool> for Item {
    fn from(b: bool) -> Self {
        Item::Bool(b)
    }
}

impl From<Vec<Item>> for Item {
    fn from(items: Vec<Item>) -> Self {
        Item::List(items)
    }
}
