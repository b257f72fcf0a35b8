//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and its two implementations:
//! - **[`DeterministicProvider`]**: seeded pseudo-random vectors derived from
//!   a stable hash of the text. No I/O, never fails, identical output across
//!   processes and platforms.
//! - **[`RemoteProvider`]**: calls an OpenAI-compatible `/embeddings`
//!   endpoint with batching, timeout, retry and backoff.
//!
//! # Provider Selection
//!
//! Use [`create_provider`] to instantiate the appropriate provider based on
//! the configuration:
//!
//! ```rust
//! # use ragcore::config::EmbeddingConfig;
//! # use ragcore::embedding::create_provider;
//! let config = EmbeddingConfig::default(); // no API key resolved
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.model_name(), "deterministic");
//! assert_eq!(provider.dims(), 512);
//! ```
//!
//! # Mixing policy
//!
//! The fallback is a whole-corpus mode. Every index records the
//! [`provider_key`](EmbeddingProvider::provider_key) it was built with, and
//! a query embedded by any other provider is rejected. A remote failure is
//! never papered over with fallback vectors.

mod deterministic;
mod remote;

pub use deterministic::DeterministicProvider;
pub use remote::RemoteProvider;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

/// A source of fixed-dimension text embeddings.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Vector dimensionality. Constant for the lifetime of the provider.
    fn dims(&self) -> usize;

    /// Stable key identifying what produced a vector. Two providers whose
    /// vectors may not be compared must return different keys.
    fn provider_key(&self) -> String;

    /// Embed `texts`, returning one vector per input in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        match (out.pop(), out.is_empty()) {
            (Some(v), true) => Ok(v),
            _ => Err(RagError::provider("expected exactly one embedding for query")),
        }
    }
}

/// Embed a corpus and check the shape of what came back.
///
/// Fails with [`RagError::Validation`] unless there is exactly one vector per
/// text and every vector has `provider.dims()` elements.
pub async fn embed_checked(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let vectors = provider.embed_batch(texts).await?;
    if vectors.len() != texts.len() {
        return Err(RagError::validation(format!(
            "provider returned {} embeddings for {} texts",
            vectors.len(),
            texts.len()
        )));
    }
    let dims = provider.dims();
    if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dims) {
        return Err(RagError::validation(format!(
            "embedding {} has dimension {}, provider declares {}",
            i,
            v.len(),
            dims
        )));
    }
    Ok(vectors)
}

/// Create the provider implied by `config`.
///
/// An API key selects [`RemoteProvider`]; without one the engine falls back
/// to [`DeterministicProvider`] and logs a warning, since retrieval quality
/// is then lexical at best.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.remote_api_key() {
        Some(key) => {
            let provider = RemoteProvider::new(config, key.to_string())?;
            tracing::info!(
                model = %config.model,
                dims = config.dims,
                url = %config.url,
                "using remote embedding provider"
            );
            Ok(Arc::new(provider))
        }
        None => {
            tracing::warn!(
                env = %config.api_key_env,
                dims = config.dims,
                "no embedding API key set; using deterministic fallback embeddings"
            );
            Ok(Arc::new(DeterministicProvider::new(config.dims)))
        }
    }
}
