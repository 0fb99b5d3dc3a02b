// Columns computed at query time: signal UDFs and semantic similarity
use rayon::prelude::*;

use strata_core::nested::{concretize, indexed_values_at, wrap_outputs, BatchInputs};
use strata_core::{
    cosine_similarity, make_schema_from_path, DataType, Error, Field, Item, OrderedMap, Path,
    ResolvedSignal, Result, Schema, Signal, SignalDescriptor, SignalRegistry, EMBEDDING_KEY,
    VALUE_KEY,
};
use strata_storage::DatasetSnapshot;

use crate::column::{Column, SEMANTIC_SIMILARITY, SCORE_KEY};

enum UdfKind {
    Signal {
        signal: Box<dyn Signal>,
        text_path: Option<Path>,
    },
    Semantic {
        embedding_key: String,
        query: Vec<f32>,
    },
}

/// A column computed over the rows of a query. Its output lands at `leaf_path + key`.
pub(crate) struct Udf {
    pub alias: Option<String>,
    pub leaf_path: Path,
    pub output_path: Path,
    pub schema: Schema,
    key: String,
    kind: UdfKind,
}

impl Udf {
    pub fn signal(
        schema: &Schema,
        registry: &SignalRegistry,
        column: &Column,
        descriptor: &SignalDescriptor,
    ) -> Result<Udf> {
        let signal = match registry.resolve(descriptor)? {
            ResolvedSignal::Signal(signal) => signal,
            ResolvedSignal::Embedding(embedding) => {
                return Err(Error::SignalCompatibility(format!(
                    "embedding \"{}\" cannot run as a query column; compute it first",
                    embedding.name()
                )))
            }
        };
        let (leaf_path, field) = schema.resolve_leaf(&column.path)?;
        let dtype = field.dtype().unwrap_or(DataType::Null);
        if !signal.input_type().accepts(dtype) {
            return Err(Error::SignalCompatibility(format!(
                "signal \"{}\" does not accept {} values at \"{}\"",
                signal.name(),
                dtype,
                leaf_path
            )));
        }
        let text_path = match dtype {
            DataType::StringSpan => schema.derived_from_path(&leaf_path),
            _ => None,
        };

        let key = signal.key();
        let output_path = leaf_path.child(key.as_str());
        let output_field = signal.fields().with_signal(signal.descriptor());
        let schema = make_schema_from_path(&output_path, output_field)?;
        Ok(Udf {
            alias: column.alias.clone(),
            leaf_path,
            output_path,
            schema,
            key,
            kind: UdfKind::Signal { signal, text_path },
        })
    }

    /// Scores the spans of an embedding already materialized at `path` against `query`.
    pub fn semantic(
        snapshot: &DatasetSnapshot,
        registry: &SignalRegistry,
        path: &Path,
        query: &str,
        embedding: &str,
    ) -> Result<Udf> {
        let (leaf_path, _) = snapshot.schema().resolve_leaf(path)?;
        let embedder = registry.resolve_embedding(embedding)?;
        let embedding_key = embedder.key();
        let embedding_path = leaf_path.child(embedding_key.as_str());
        if snapshot.branch(&embedding_path).is_none() {
            return Err(Error::InvalidQuery(format!(
                "embedding \"{}\" has not been computed for \"{}\"",
                embedding, leaf_path
            )));
        }

        let descriptor = SignalDescriptor::new(SEMANTIC_SIMILARITY)
            .with_param("embedding", embedding)
            .with_param("query", query);
        let key = descriptor.key();
        let output_path = leaf_path.child(key.as_str());
        let mut children = OrderedMap::new();
        children.insert(SCORE_KEY, Field::leaf(DataType::Float32));
        let field = Field::repeated(Field::leaf_with_fields(DataType::StringSpan, children)?)
            .with_signal(descriptor);
        Ok(Udf {
            alias: None,
            leaf_path,
            schema: make_schema_from_path(&output_path, field)?,
            output_path,
            key,
            kind: UdfKind::Semantic {
                embedding_key,
                query: embedder.embed_query(query)?,
            },
        })
    }

    /// The wrapped output of every row, ready to merge into it.
    pub fn compute(&self, items: &[Item]) -> Result<Vec<Option<Item>>> {
        match &self.kind {
            UdfKind::Signal { signal, text_path } => {
                let inputs = BatchInputs::collect(items, &self.leaf_path, text_path.as_ref());
                let outputs = signal.compute(inputs.values())?;
                inputs.wrap(items, &self.leaf_path, &self.key, outputs)
            }
            UdfKind::Semantic { embedding_key, query } => {
                let embedding_path = self.leaf_path.child(embedding_key.as_str());
                Ok(items
                    .par_iter()
                    .map(|item| {
                        let mut scores = indexed_values_at(item, &self.leaf_path)
                            .into_iter()
                            .map(|(indices, _)| {
                                score_spans(item, &concretize(&embedding_path, &indices), query)
                            });
                        wrap_outputs(item, &self.leaf_path, &self.key, &mut scores)
                    })
                    .collect())
            }
        }
    }
}

fn score_spans(item: &Item, embedding_path: &Path, query: &[f32]) -> Option<Item> {
    let spans = item.get_path(embedding_path).ok()?.as_list()?;
    let scored: Vec<Item> = spans
        .iter()
        .filter_map(|span| {
            let value = span.get(VALUE_KEY)?.clone();
            let Item::Embedding(vector) = span.get(EMBEDDING_KEY)? else {
                return None;
            };
            Some(Item::from_pairs([
                (VALUE_KEY, value),
                (SCORE_KEY, Item::Float(f64::from(cosine_similarity(vector, query)))),
            ]))
        })
        .collect();
    if scored.is_empty() {
        None
    } else {
        Some(Item::List(scored))
    }
}
