use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Leaf data types of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    /// A `(start, end)` offset pair into a sibling or ancestor string.
    StringSpan,
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float16,
    Float32,
    Float64,
    Time,
    Date,
    Timestamp,
    Interval,
    Binary,
    Embedding,
    Null,
}

impl DataType {
    pub const ALL: [DataType; 21] = [
        DataType::String,
        DataType::StringSpan,
        DataType::Boolean,
        DataType::Int8,
        DataType::Int16,
        DataType::Int32,
        DataType::Int64,
        DataType::Uint8,
        DataType::Uint16,
        DataType::Uint32,
        DataType::Uint64,
        DataType::Float16,
        DataType::Float32,
        DataType::Float64,
        DataType::Time,
        DataType::Date,
        DataType::Timestamp,
        DataType::Interval,
        DataType::Binary,
        DataType::Embedding,
        DataType::Null,
    ];

    #[inline]
    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, DataType::Float16 | DataType::Float32 | DataType::Float64)
    }

    #[inline]
    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::Uint8
                | DataType::Uint16
                | DataType::Uint32
                | DataType::Uint64
        )
    }

    #[inline]
    #[must_use]
    pub fn is_numeric(self) -> bool {
        self.is_float() || self.is_integer()
    }

    #[inline]
    #[must_use]
    pub fn is_temporal(self) -> bool {
        matches!(self, DataType::Time | DataType::Date | DataType::Timestamp | DataType::Interval)
    }

    /// Types with a meaningful min/max.
    #[inline]
    #[must_use]
    pub fn is_ordinal(self) -> bool {
        self.is_numeric() || self.is_temporal()
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::StringSpan => "string_span",
            DataType::Boolean => "boolean",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Uint8 => "uint8",
            DataType::Uint16 => "uint16",
            DataType::Uint32 => "uint32",
            DataType::Uint64 => "uint64",
            DataType::Float16 => "float16",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::Time => "time",
            DataType::Date => "date",
            DataType::Timestamp => "timestamp",
            DataType::Interval => "interval",
            DataType::Binary => "binary",
            DataType::Embedding => "embedding",
            DataType::Null => "null",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .iter()
            .copied()
            .find(|dtype| dtype.name() == s)
            .ok_or_else(|| Error::SchemaValidation(format!("unknown dtype \"{}\"", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip() {
        for dtype in DataType::ALL {
            assert_eq!(dtype.name().parse::<DataType>().unwrap(), dtype);
            let json = serde_json::to_value(dtype).unwrap();
            assert_eq!(json, serde_json::json!(dtype.name()));
        }
    }

    #[test]
    fn test_classification() {
        assert!(DataType::Float16.is_float());
        assert!(DataType::Uint8.is_integer());
        assert!(DataType::Date.is_ordinal());
        assert!(!DataType::String.is_ordinal());
        assert!("varchar".parse::<DataType>().is_err());
    }
}
