// Hashed bag-of-trigrams embedding, one vector per sentence
use ahash::{AHashSet, RandomState};
use rayon::prelude::*;
use std::hash::BuildHasher;

use strata_core::vector::normalize;
use strata_core::{EmbeddingSignal, Error, Item, Result, SignalDescriptor, SpanVector};

use crate::text::split_sentences;

pub const HASH_EMBEDDING: &str = "hash_embedding";
pub const DEFAULT_DIM: usize = 128;

// Fixed seeds keep vectors stable across processes.
const SEEDS: [u64; 4] = [
    0x5d58_8b65_6c07_8965,
    0x2a3f_c2a1_e0b3_4f17,
    0x9e37_79b9_7f4a_7c15,
    0x1b87_3593_cc9e_2d51,
];

fn hasher() -> RandomState {
    RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3])
}

/// Generate character trigrams from a string
fn generate_trigrams(s: &str) -> AHashSet<String> {
    let padded = format!("  {}  ", s);
    let chars: Vec<char> = padded.chars().collect();
    chars.windows(3).map(|w| w.iter().collect::<String>()).collect()
}

/// Hash a string to a fixed-size unit vector. Words weigh twice as much as trigrams.
pub fn hash_text_to_vector(text: &str, dim: usize) -> Vec<f32> {
    let state = hasher();
    let mut vector = vec![0.0f32; dim];
    if dim == 0 {
        return vector;
    }
    let normalized = text.to_lowercase();

    for trigram in generate_trigrams(&normalized) {
        let pos = (BuildHasher::hash_one(&state, &trigram) as usize) % dim;
        vector[pos] += 1.0;
    }
    for word in normalized.split_whitespace() {
        let pos = (BuildHasher::hash_one(&state, word) as usize) % dim;
        vector[pos] += 2.0;
    }

    normalize(&mut vector);
    vector
}

/// Embeds each sentence of a text into a hashed vector.
pub struct HashEmbedding {
    descriptor: SignalDescriptor,
    dim: usize,
}

impl HashEmbedding {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "{} needs a positive dimension",
                HASH_EMBEDDING
            )));
        }
        let mut descriptor = SignalDescriptor::new(HASH_EMBEDDING);
        if dim != DEFAULT_DIM {
            descriptor = descriptor.with_param("dim", dim as u64);
        }
        Ok(Self { descriptor, dim })
    }

    pub fn create(descriptor: &SignalDescriptor) -> Result<Box<dyn EmbeddingSignal>> {
        let dim = descriptor.param_u64("dim").map_or(DEFAULT_DIM, |d| d as usize);
        let mut embedding = Self::new(dim)?;
        embedding.descriptor = descriptor.clone();
        Ok(Box::new(embedding))
    }
}

impl EmbeddingSignal for HashEmbedding {
    fn name(&self) -> &str {
        HASH_EMBEDDING
    }

    fn descriptor(&self) -> SignalDescriptor {
        self.descriptor.clone()
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, data: &[Item]) -> Result<Vec<Option<Vec<SpanVector>>>> {
        data.par_iter()
            .map(|item| {
                let Some(text) = item.as_str() else {
                    return Ok(None);
                };
                let spans = split_sentences(text)
                    .into_iter()
                    .map(|(start, end)| {
                        Ok(SpanVector {
                            start: offset(start)?,
                            end: offset(end)?,
                            vector: hash_text_to_vector(&text[start..end], self.dim),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(if spans.is_empty() { None } else { Some(spans) })
            })
            .collect()
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        Ok(hash_text_to_vector(query, self.dim))
    }
}

fn offset(value: usize) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::InvalidSignalOutput(format!("offset {} overflows", value)))
}
