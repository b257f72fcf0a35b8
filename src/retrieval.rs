//! Answer-context assembly.
//!
//! The orchestrator runs a fixed-size search and turns the hits into the
//! bounded context block handed to an external text generator, together
//! with per-source attribution. It does not call the generator.

use std::sync::Arc;

use crate::cache::SnapshotCache;
use crate::config::RetrievalConfig;
use crate::error::{RagError, Result};
use crate::models::{AnswerContext, SearchResult, Source};
use crate::search::SearchEngine;

/// Context text used when retrieval finds nothing.
pub const NO_CONTEXT: &str = "No relevant information found.";

const SEPARATOR: &str = "\n\n";

pub struct RetrievalOrchestrator {
    engine: Arc<SearchEngine>,
    cache: Arc<SnapshotCache>,
    settings: RetrievalConfig,
}

impl RetrievalOrchestrator {
    pub fn new(
        engine: Arc<SearchEngine>,
        cache: Arc<SnapshotCache>,
        settings: &RetrievalConfig,
    ) -> Self {
        Self {
            engine,
            cache,
            settings: settings.clone(),
        }
    }

    /// Search for `query` and assemble the answer context.
    ///
    /// A missing index is not an error here: the caller gets the
    /// [`NO_CONTEXT`] sentinel and empty sources.
    pub async fn answer_context(&self, query: &str) -> Result<AnswerContext> {
        let engine = self.engine.clone();
        let snapshot = match self.cache.get_or_load(move || engine.open()).await {
            Ok(snapshot) => snapshot,
            Err(RagError::RetrievalUnavailable(path)) => {
                tracing::warn!(path = %path.display(), "no index built; answering without context");
                return Ok(empty_context());
            }
            Err(e) => return Err(e),
        };

        let results = self
            .engine
            .search(&snapshot, query, self.settings.context_k)
            .await?;
        Ok(compose_context(&results, self.settings.context_chars))
    }
}

fn empty_context() -> AnswerContext {
    AnswerContext {
        context: NO_CONTEXT.to_string(),
        sources: Vec::new(),
    }
}

/// Join result texts, each cut to `char_budget` characters, in result order.
pub fn compose_context(results: &[SearchResult], char_budget: usize) -> AnswerContext {
    if results.is_empty() {
        return empty_context();
    }

    let context = results
        .iter()
        .map(|r| truncate_chars(&r.text, char_budget))
        .collect::<Vec<_>>()
        .join(SEPARATOR);

    let sources = results
        .iter()
        .map(|r| Source {
            doc_id: r.doc_id.clone(),
            score: r.score,
        })
        .collect();

    AnswerContext { context, sources }
}

/// Render the generator prompt for `question` over `context`.
pub fn render_prompt(question: &str, context: &str) -> String {
    format!(
        "You are an AI assistant helping employees with HR, IT, and Finance queries.\n\
         Use only the context below to answer accurately and concisely.\n\
         \n\
         Question:\n{question}\n\
         \n\
         Context:\n{context}\n\
         \n\
         Answer in a polite, professional tone:\n"
    )
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(doc: &str, text: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk_id: format!("{}-id", doc),
            doc_id: doc.to_string(),
            text: text.to_string(),
            score,
        }
    }

    #[test]
    fn test_empty_results_give_sentinel() {
        let ctx = compose_context(&[], 500);
        assert_eq!(ctx.context, NO_CONTEXT);
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_join_and_sources_in_order() {
        let ctx = compose_context(&[hit("a", "first", 0.9), hit("b", "second", 0.5)], 500);
        assert_eq!(ctx.context, "first\n\nsecond");
        assert_eq!(ctx.sources.len(), 2);
        assert_eq!(ctx.sources[0].doc_id, "a");
        assert_eq!(ctx.sources[1].score, 0.5);
    }

    #[test]
    fn test_truncates_per_result() {
        let long = "x".repeat(800);
        let ctx = compose_context(&[hit("a", &long, 1.0), hit("b", "tail", 0.1)], 500);
        assert_eq!(ctx.context.len(), 500 + 2 + 4);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("日本語", 5), "日本語");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn test_render_prompt() {
        let prompt = render_prompt("How do I reset my password?", "IT password reset steps");
        assert!(prompt.contains("Question:\nHow do I reset my password?\n"));
        assert!(prompt.contains("Context:\nIT password reset steps\n"));
        assert!(prompt.ends_with("Answer in a polite, professional tone:\n"));
    }
}
