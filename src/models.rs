//! Core data models used throughout the retrieval engine.
//!
//! These types represent the chunks, search results and answer context that
//! flow through the indexing and query pipeline.

use serde::{Deserialize, Serialize};

/// A retrievable fragment of a source document.
///
/// Serialized one per line in `chunks.jsonl`. Position within the corpus is
/// significant: row `i` of the embedding matrix and index belongs to the
/// chunk at position `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub text: String,
}

impl Chunk {
    pub fn new(
        chunk_id: impl Into<String>,
        doc_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            doc_id: doc_id.into(),
            text: text.into(),
        }
    }
}

/// A single ranked hit returned by the search engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub doc_id: String,
    pub text: String,
    /// Cosine similarity (normalized inner product), roughly in `[-1, 1]`.
    pub score: f32,
}

/// Attribution entry for an answer context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub doc_id: String,
    pub score: f32,
}

/// Bounded text context handed to the external generator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerContext {
    pub context: String,
    pub sources: Vec<Source>,
}

impl AnswerContext {
    /// True when retrieval found nothing and `context` holds the sentinel text.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
