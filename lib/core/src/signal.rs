// Signal traits and the name -> constructor registry
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::dtype::DataType;
use crate::error::{Error, Result};
use crate::field::Field;
use crate::item::Item;
use crate::ordered_map::OrderedMap;
use crate::path::VALUE_KEY;

/// Child key holding the vector of an embedded span.
pub const EMBEDDING_KEY: &str = "embedding";

/// The data shape a signal consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalInputType {
    Text,
    TextEmbedding,
    Image,
}

impl SignalInputType {
    pub fn accepts(self, dtype: DataType) -> bool {
        match self {
            SignalInputType::Text => matches!(dtype, DataType::String | DataType::StringSpan),
            SignalInputType::TextEmbedding => dtype == DataType::Embedding,
            SignalInputType::Image => dtype == DataType::Binary,
        }
    }
}

/// A signal name plus its declared parameters. The whole descriptor is the signal's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalDescriptor {
    pub signal_name: String,
    #[serde(flatten)]
    pub params: BTreeMap<String, Value>,
}

impl SignalDescriptor {
    pub fn new(signal_name: impl Into<String>) -> Self {
        Self {
            signal_name: signal_name.into(),
            params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(Value::as_u64)
    }

    /// Column key of the signal output: `name`, or `name(k=v,...)` when parameterized.
    pub fn key(&self) -> String {
        if self.params.is_empty() {
            return self.signal_name.clone();
        }
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{}={}", k, s),
                other => format!("{}={}", k, other),
            })
            .collect();
        format!("{}({})", self.signal_name, params.join(","))
    }
}

/// A pluggable computation mapping leaf values to derived values.
pub trait Signal: Send + Sync {
    fn name(&self) -> &str;

    fn input_type(&self) -> SignalInputType;

    /// Shape of the value produced for one input.
    fn fields(&self) -> Field;

    fn descriptor(&self) -> SignalDescriptor;

    fn key(&self) -> String {
        self.descriptor().key()
    }

    /// One output per input, in order. `None` means "no annotation" for that input.
    fn compute(&self, data: &[Item]) -> Result<Vec<Option<Item>>>;
}

/// A vector attached to a span of the input text.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanVector {
    pub start: u32,
    pub end: u32,
    pub vector: Vec<f32>,
}

pub trait EmbeddingSignal: Send + Sync {
    fn name(&self) -> &str;

    fn input_type(&self) -> SignalInputType {
        SignalInputType::Text
    }

    fn descriptor(&self) -> SignalDescriptor;

    fn key(&self) -> String {
        self.descriptor().key()
    }

    fn dim(&self) -> usize;

    /// Span vectors per input, in order.
    fn embed(&self, data: &[Item]) -> Result<Vec<Option<Vec<SpanVector>>>>;

    /// Embeds free text, e.g. a search query.
    fn embed_query(&self, query: &str) -> Result<Vec<f32>>;
}

/// Shape of an embedding branch: `[string_span {embedding: embedding}]`.
pub fn embedding_fields() -> Field {
    let mut children = OrderedMap::new();
    children.insert(EMBEDDING_KEY, Field::leaf(DataType::Embedding));
    let span = Field::leaf_with_fields(DataType::StringSpan, children)
        .unwrap_or_else(|_| Field::leaf(DataType::StringSpan));
    Field::repeated(span)
}

pub fn embedding_item(spans: Vec<SpanVector>) -> Result<Item> {
    let items = spans
        .into_iter()
        .map(|sv| {
            Ok(Item::from_pairs([
                (VALUE_KEY, Item::span(sv.start, sv.end)?),
                (EMBEDDING_KEY, Item::Embedding(sv.vector)),
            ]))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Item::List(items))
}

pub type SignalFactory = fn(&SignalDescriptor) -> Result<Box<dyn Signal>>;
pub type EmbeddingFactory = fn(&SignalDescriptor) -> Result<Box<dyn EmbeddingSignal>>;

#[derive(Clone, Copy)]
pub enum SignalConstructor {
    Signal(SignalFactory),
    Embedding(EmbeddingFactory),
}

pub enum ResolvedSignal {
    Signal(Box<dyn Signal>),
    Embedding(Box<dyn EmbeddingSignal>),
}

/// Maps signal names to constructors.
#[derive(Default, Clone)]
pub struct SignalRegistry {
    constructors: AHashMap<String, SignalConstructor>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, constructor: SignalConstructor) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidConfig("signal name must not be empty".to_string()));
        }
        if self.constructors.contains_key(name) {
            return Err(Error::SignalExists(name.to_string()));
        }
        self.constructors.insert(name.to_string(), constructor);
        Ok(())
    }

    pub fn register_signal(&mut self, name: &str, factory: SignalFactory) -> Result<()> {
        self.register(name, SignalConstructor::Signal(factory))
    }

    pub fn register_embedding(&mut self, name: &str, factory: EmbeddingFactory) -> Result<()> {
        self.register(name, SignalConstructor::Embedding(factory))
    }

    pub fn resolve(&self, descriptor: &SignalDescriptor) -> Result<ResolvedSignal> {
        match self.constructors.get(&descriptor.signal_name) {
            Some(SignalConstructor::Signal(factory)) => {
                Ok(ResolvedSignal::Signal(factory(descriptor)?))
            }
            Some(SignalConstructor::Embedding(factory)) => {
                Ok(ResolvedSignal::Embedding(factory(descriptor)?))
            }
            None => Err(Error::SignalNotFound(descriptor.signal_name.clone())),
        }
    }

    pub fn resolve_embedding(&self, name: &str) -> Result<Box<dyn EmbeddingSignal>> {
        match self.resolve(&SignalDescriptor::new(name))? {
            ResolvedSignal::Embedding(embedding) => Ok(embedding),
            ResolvedSignal::Signal(_) => Err(Error::SignalCompatibility(format!(
                "\"{}\" is not an embedding signal",
                name
            ))),
        }
    }

    #[inline]
    pub fn is_embedding(&self, name: &str) -> bool {
        matches!(self.constructors.get(name), Some(SignalConstructor::Embedding(_)))
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }
}
