use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dtype::DataType;
use crate::error::{Error, Result};
use crate::ordered_map::OrderedMap;
use crate::path::VALUE_KEY;
use crate::signal::SignalDescriptor;

/// A named numeric bucket. `start` is inclusive, `end` exclusive; `None` is unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    pub name: String,
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl Bin {
    pub fn new(name: impl Into<String>, start: Option<f64>, end: Option<f64>) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        self.start.map_or(true, |start| value >= start) && self.end.map_or(true, |end| value < end)
    }
}

/// The payload shape of a schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// A concrete dtype, optionally with derived children attached to it.
    Leaf {
        dtype: DataType,
        fields: Option<OrderedMap<Field>>,
    },
    Struct(OrderedMap<Field>),
    Repeated(Box<Field>),
}

/// A schema node. Construction goes through [`RawField`] validation or the checked builders below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawField", into = "RawField")]
pub struct Field {
    kind: FieldKind,
    signal: Option<SignalDescriptor>,
    bins: Option<Vec<Bin>>,
    categorical: Option<bool>,
}

/// The serialized form of a [`Field`]: every shape is optional and validated on conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<OrderedMap<Field>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeated_field: Option<Box<Field>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<DataType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<SignalDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bins: Option<Vec<Bin>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categorical: Option<bool>,
}

impl TryFrom<RawField> for Field {
    type Error = Error;

    fn try_from(raw: RawField) -> Result<Self> {
        if raw.fields.is_some() && raw.repeated_field.is_some() {
            return Err(Error::SchemaValidation(
                "both \"fields\" and \"repeated_field\" are defined".to_string(),
            ));
        }
        if raw.dtype.is_some() && raw.repeated_field.is_some() {
            return Err(Error::SchemaValidation(
                "both \"dtype\" and \"repeated_field\" are defined".to_string(),
            ));
        }
        if let Some(fields) = &raw.fields {
            check_field_names(fields)?;
        }

        let kind = match (raw.dtype, raw.fields, raw.repeated_field) {
            (Some(dtype), fields, None) => FieldKind::Leaf {
                dtype,
                fields: fields.filter(|f| !f.is_empty()),
            },
            (None, Some(fields), None) => FieldKind::Struct(fields),
            (None, None, Some(child)) => FieldKind::Repeated(child),
            _ => {
                return Err(Error::SchemaValidation(
                    "one of \"fields\", \"repeated_field\" or \"dtype\" must be defined".into(),
                ))
            }
        };

        let field = Field {
            kind,
            signal: raw.signal,
            bins: None,
            categorical: None,
        };
        let field = match raw.bins {
            Some(bins) => field.with_bins(bins)?,
            None => field,
        };
        match raw.categorical {
            Some(categorical) => field.with_categorical(categorical),
            None => Ok(field),
        }
    }
}

impl From<Field> for RawField {
    fn from(field: Field) -> Self {
        let mut raw = RawField {
            signal: field.signal,
            bins: field.bins,
            categorical: field.categorical,
            ..RawField::default()
        };
        match field.kind {
            FieldKind::Leaf { dtype, fields } => {
                raw.dtype = Some(dtype);
                raw.fields = fields;
            }
            FieldKind::Struct(fields) => raw.fields = Some(fields),
            FieldKind::Repeated(child) => raw.repeated_field = Some(child),
        }
        raw
    }
}

fn check_field_names(fields: &OrderedMap<Field>) -> Result<()> {
    if fields.contains_key(VALUE_KEY) {
        return Err(Error::SchemaValidation(format!(
            "\"{}\" is a reserved field name",
            VALUE_KEY
        )));
    }
    Ok(())
}

/// Bins must cover the number line: at least two, open at both ends, each starting where the
/// previous one ends.
pub fn check_bins(bins: &[Bin]) -> Result<()> {
    if bins.len() < 2 {
        return Err(Error::SchemaValidation("at least 2 bins are required".to_string()));
    }
    if bins[0].start.is_some() {
        return Err(Error::SchemaValidation("the first bin must not have a start".to_string()));
    }
    if bins[bins.len() - 1].end.is_some() {
        return Err(Error::SchemaValidation("the last bin must not have an end".to_string()));
    }
    for bin in bins {
        if let (Some(start), Some(end)) = (bin.start, bin.end) {
            if start.partial_cmp(&end) != Some(std::cmp::Ordering::Less) {
                return Err(Error::SchemaValidation(format!(
                    "bin \"{}\" must end after it starts",
                    bin.name
                )));
            }
        }
    }
    for pair in bins.windows(2) {
        if pair[1].start != pair[0].end {
            return Err(Error::SchemaValidation(format!(
                "bin \"{}\" must start where bin \"{}\" ends",
                pair[1].name, pair[0].name
            )));
        }
    }
    Ok(())
}

impl Field {
    pub(crate) fn from_kind(kind: FieldKind) -> Self {
        Self {
            kind,
            signal: None,
            bins: None,
            categorical: None,
        }
    }

    pub fn leaf(dtype: DataType) -> Self {
        Self::from_kind(FieldKind::Leaf { dtype, fields: None })
    }

    pub fn repeated(child: Field) -> Self {
        Self::from_kind(FieldKind::Repeated(Box::new(child)))
    }

    pub fn structure(fields: OrderedMap<Field>) -> Result<Self> {
        check_field_names(&fields)?;
        Ok(Self::from_kind(FieldKind::Struct(fields)))
    }

    /// A leaf carrying derived children, e.g. a text leaf annotated with its length.
    pub fn leaf_with_fields(dtype: DataType, fields: OrderedMap<Field>) -> Result<Self> {
        check_field_names(&fields)?;
        Ok(Self::from_kind(FieldKind::Leaf {
            dtype,
            fields: if fields.is_empty() { None } else { Some(fields) },
        }))
    }

    /// Builds a field from a literal: a dtype name, a one-element list for a repeated field,
    /// or a map for a struct. A map holding the value key is a leaf with attached children.
    pub fn from_literal(literal: &Value) -> Result<Self> {
        match literal {
            Value::String(name) => Ok(Field::leaf(name.parse()?)),
            Value::Array(items) => match items.as_slice() {
                [child] => Ok(Field::repeated(Field::from_literal(child)?)),
                _ => Err(Error::SchemaValidation(format!(
                    "a repeated field literal wraps exactly one element, got {}",
                    items.len()
                ))),
            },
            Value::Object(map) => {
                let mut children = OrderedMap::with_capacity(map.len());
                let mut dtype = None;
                for (name, child) in map {
                    if name == VALUE_KEY {
                        let dtype_name = child.as_str().ok_or_else(|| {
                            Error::SchemaValidation(format!("\"{}\" must name a dtype", VALUE_KEY))
                        })?;
                        dtype = Some(dtype_name.parse::<DataType>()?);
                    } else {
                        children.insert(name.clone(), Field::from_literal(child)?);
                    }
                }
                match dtype {
                    Some(dtype) => Field::leaf_with_fields(dtype, children),
                    None => Field::structure(children),
                }
            }
            other => Err(Error::SchemaValidation(format!("invalid field literal {}", other))),
        }
    }

    #[must_use]
    pub fn with_signal(mut self, signal: SignalDescriptor) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_bins(mut self, bins: Vec<Bin>) -> Result<Self> {
        check_bins(&bins)?;
        self.bins = Some(bins);
        Ok(self)
    }

    pub fn with_categorical(mut self, categorical: bool) -> Result<Self> {
        if categorical && self.dtype().map_or(false, DataType::is_float) {
            return Err(Error::SchemaValidation(
                "a floating-point field cannot be categorical".to_string(),
            ));
        }
        self.categorical = Some(categorical);
        Ok(self)
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub(crate) fn into_parts(
        self,
    ) -> (FieldKind, Option<SignalDescriptor>, Option<Vec<Bin>>, Option<bool>) {
        (self.kind, self.signal, self.bins, self.categorical)
    }

    pub(crate) fn from_parts(
        kind: FieldKind,
        signal: Option<SignalDescriptor>,
        bins: Option<Vec<Bin>>,
        categorical: Option<bool>,
    ) -> Self {
        Self {
            kind,
            signal,
            bins,
            categorical,
        }
    }

    #[inline]
    #[must_use]
    pub fn dtype(&self) -> Option<DataType> {
        match &self.kind {
            FieldKind::Leaf { dtype, .. } => Some(*dtype),
            _ => None,
        }
    }

    /// Struct children, or the children attached to a leaf.
    #[inline]
    #[must_use]
    pub fn fields(&self) -> Option<&OrderedMap<Field>> {
        match &self.kind {
            FieldKind::Struct(fields) => Some(fields),
            FieldKind::Leaf { fields, .. } => fields.as_ref(),
            FieldKind::Repeated(_) => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn repeated_field(&self) -> Option<&Field> {
        match &self.kind {
            FieldKind::Repeated(child) => Some(child),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn signal(&self) -> Option<&SignalDescriptor> {
        self.signal.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn bins(&self) -> Option<&[Bin]> {
        self.bins.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn is_categorical(&self) -> bool {
        self.categorical.unwrap_or(false)
    }

    #[inline]
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, FieldKind::Leaf { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literal_shapes() {
        let field = Field::from_literal(&json!({"text": "string", "tags": ["string"]})).unwrap();
        let fields = field.fields().unwrap();
        assert_eq!(fields.get("text").unwrap().dtype(), Some(DataType::String));
        let tags = fields.get("tags").unwrap();
        assert_eq!(tags.repeated_field().unwrap().dtype(), Some(DataType::String));
    }

    #[test]
    fn test_nested_repeated_literal() {
        let field = Field::from_literal(&json!([["float32"]])).unwrap();
        let inner = field.repeated_field().unwrap().repeated_field().unwrap();
        assert_eq!(inner.dtype(), Some(DataType::Float32));
    }

    #[test]
    fn test_leaf_with_children_literal() {
        let field = Field::from_literal(&json!({"__value__": "string", "len": "int32"})).unwrap();
        assert_eq!(field.dtype(), Some(DataType::String));
        assert_eq!(field.fields().unwrap().get("len").unwrap().dtype(), Some(DataType::Int32));
    }

    #[test]
    fn test_raw_field_rejects_multiple_shapes() {
        let both: std::result::Result<Field, _> = serde_json::from_value(json!({
            "fields": {"a": {"dtype": "string"}},
            "repeated_field": {"dtype": "string"}
        }));
        assert!(both.is_err());

        let dtype_and_repeated = RawField {
            dtype: Some(DataType::String),
            repeated_field: Some(Box::new(Field::leaf(DataType::Int32))),
            ..RawField::default()
        };
        assert!(matches!(Field::try_from(dtype_and_repeated), Err(Error::SchemaValidation(_))));

        assert!(matches!(Field::try_from(RawField::default()), Err(Error::SchemaValidation(_))));
    }

    #[test]
    fn test_reserved_key_rejected() {
        let mut fields = OrderedMap::new();
        fields.insert(VALUE_KEY, Field::leaf(DataType::String));
        assert!(matches!(Field::structure(fields), Err(Error::SchemaValidation(_))));

        let raw: std::result::Result<Field, _> =
            serde_json::from_value(json!({"fields": {"__value__": {"dtype": "string"}}}));
        assert!(raw.is_err());
    }

    #[test]
    fn test_leaf_with_fields_is_allowed_in_raw_form() {
        let field: Field = serde_json::from_value(json!({
            "dtype": "string",
            "fields": {"len": {"dtype": "int32"}}
        }))
        .unwrap();
        assert_eq!(field.dtype(), Some(DataType::String));
        assert!(field.fields().unwrap().contains_key("len"));
    }

    #[test]
    fn test_bins_validation() {
        let good = vec![
            Bin::new("low", None, Some(1.0)),
            Bin::new("mid", Some(1.0), Some(2.0)),
            Bin::new("high", Some(2.0), None),
        ];
        assert!(Field::leaf(DataType::Float32).with_bins(good).is_ok());

        let gap = vec![Bin::new("a", None, Some(1.0)), Bin::new("b", Some(1.5), None)];
        assert!(Field::leaf(DataType::Float32).with_bins(gap).is_err());

        let single = vec![Bin::new("a", None, None)];
        assert!(Field::leaf(DataType::Float32).with_bins(single).is_err());

        let reversed = vec![
            Bin::new("low", None, Some(2.0)),
            Bin::new("mid", Some(2.0), Some(1.0)),
            Bin::new("high", Some(1.0), None),
        ];
        assert!(check_bins(&reversed).is_err());
    }

    #[test]
    fn test_categorical_float_rejected() {
        assert!(Field::leaf(DataType::Float64).with_categorical(true).is_err());
        assert!(Field::leaf(DataType::Int32).with_categorical(true).unwrap().is_categorical());
    }

    #[test]
    fn test_serde_roundtrip_keeps_signal() {
        let field = Field::leaf(DataType::Int32).with_signal(SignalDescriptor::new("text_length"));
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json, json!({"dtype": "int32", "signal": {"signal_name": "text_length"}}));
        let back: Field = serde_json::from_value(json).unwrap();
        assert_eq!(back, field);
    }
}
