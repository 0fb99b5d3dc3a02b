//! # strata Signals
//!
//! Built-in signal implementations.
//!
//! - `text_length` - character count of a text leaf
//! - `substring_search` - spans of every match of a query
//! - `sentences` - sentence boundary spans
//! - `byte_length` - size of a binary leaf
//! - `hash_embedding` - hashed per-sentence vectors
//!
//! ## Example
//!
//! ```rust
//! use strata_core::{Item, ResolvedSignal, SignalDescriptor};
//!
//! let registry = strata_signals::default_registry().unwrap();
//! let ResolvedSignal::Signal(signal) = registry
//!     .resolve(&SignalDescriptor::new("text_length"))
//!     .unwrap()
//! else {
//!     panic!("text_length is a plain signal");
//! };
//! let out = signal.compute(&[Item::from("hello")]).unwrap();
//! assert_eq!(out, vec![Some(Item::Int(5))]);
//! ```

pub mod embedding;
pub mod image;
pub mod text;

pub use embedding::{hash_text_to_vector, HashEmbedding, HASH_EMBEDDING};
pub use image::{ByteLength, BYTE_LENGTH};
pub use text::{Sentences, SubstringSearch, TextLength, SENTENCES, SUBSTRING_SEARCH, TEXT_LENGTH};

use strata_core::{Result, SignalRegistry};

/// A registry holding every built-in signal.
pub fn default_registry() -> Result<SignalRegistry> {
    let mut registry = SignalRegistry::new();
    registry.register_signal(TEXT_LENGTH, TextLength::create)?;
    registry.register_signal(SUBSTRING_SEARCH, SubstringSearch::create)?;
    registry.register_signal(SENTENCES, Sentences::create)?;
    registry.register_signal(BYTE_LENGTH, ByteLength::create)?;
    registry.register_embedding(HASH_EMBEDDING, HashEmbedding::create)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = default_registry().unwrap();
        assert_eq!(
            registry.names(),
            vec!["byte_length", "hash_embedding", "sentences", "substring_search", "text_length"]
        );
        assert!(registry.is_embedding(HASH_EMBEDDING));
        assert!(registry.resolve_embedding(HASH_EMBEDDING).is_ok());
    }
}
