//! Collaborator-facing facade.
//!
//! [`RagService`] wires the components together for one data directory:
//! a chunk store, an index builder whose rebuild callback invalidates the
//! shared [`SnapshotCache`], a search engine and a retrieval orchestrator.
//! Builds are serialized by an async mutex; searches run concurrently and
//! never wait on a build.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::builder::IndexBuilder;
use crate::cache::SnapshotCache;
use crate::chunk_store::ChunkStore;
use crate::config::Config;
use crate::documents::{chunk_documents, load_corpus, Document};
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::error::Result;
use crate::models::{AnswerContext, Chunk, SearchResult};
use crate::retrieval::RetrievalOrchestrator;
use crate::search::SearchEngine;

pub struct RagService {
    config: Config,
    provider: Arc<dyn EmbeddingProvider>,
    store: ChunkStore,
    builder: IndexBuilder,
    engine: Arc<SearchEngine>,
    cache: Arc<SnapshotCache>,
    orchestrator: RetrievalOrchestrator,
    build_lock: Mutex<()>,
}

impl RagService {
    /// Create a service using the provider implied by `config`.
    pub fn new(config: Config) -> Result<Self> {
        let provider = create_provider(&config.embedding)?;
        Ok(Self::with_provider(config, provider))
    }

    /// Create a service with an explicit provider.
    pub fn with_provider(config: Config, provider: Arc<dyn EmbeddingProvider>) -> Self {
        let cache = Arc::new(SnapshotCache::new());
        let mut builder = IndexBuilder::new(&config.data);
        let invalidate = cache.clone();
        builder.on_rebuild(move |_| invalidate.invalidate());

        let engine = Arc::new(SearchEngine::new(&config.data, provider.clone()));
        let orchestrator =
            RetrievalOrchestrator::new(engine.clone(), cache.clone(), &config.retrieval);

        Self {
            store: ChunkStore::new(config.data.chunks_path()),
            provider,
            builder,
            engine,
            cache,
            orchestrator,
            build_lock: Mutex::new(()),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Chunk every document under `corpus_dir` and build the index over it.
    pub async fn build_index(&self, corpus_dir: &Path) -> Result<usize> {
        let chunks = load_corpus(corpus_dir, &self.config.chunking)?;
        self.build_from_chunks(&chunks).await
    }

    /// Build the index over an explicit corpus.
    pub async fn build_from_chunks(&self, chunks: &[Chunk]) -> Result<usize> {
        let _guard = self.build_lock.lock().await;
        self.builder.build(chunks, self.provider.as_ref()).await
    }

    /// Re-embed the stored corpus and rebuild the index.
    pub async fn rebuild(&self) -> Result<usize> {
        let _guard = self.build_lock.lock().await;
        let chunks = self.store.load()?;
        self.builder.build(&chunks, self.provider.as_ref()).await
    }

    /// Chunk `docs` into the stored corpus and rebuild the index.
    ///
    /// Chunks of a document with the same `doc_id` are replaced, so
    /// uploading a file twice does not duplicate it. Returns the number of
    /// chunks added.
    pub async fn add_documents(&self, docs: &[Document]) -> Result<usize> {
        let _guard = self.build_lock.lock().await;
        let added = chunk_documents(docs, &self.config.chunking);

        let mut corpus = self.store.load()?;
        corpus.retain(|c| !docs.iter().any(|d| d.doc_id == c.doc_id));
        corpus.extend(added.iter().cloned());

        let total = self.builder.build(&corpus, self.provider.as_ref()).await?;
        tracing::info!(documents = docs.len(), added = added.len(), total, "added documents");
        Ok(added.len())
    }

    /// Rebuild the index from the stored corpus and matrix, without
    /// re-embedding.
    pub async fn rebuild_from_saved(&self) -> Result<usize> {
        let _guard = self.build_lock.lock().await;
        self.builder.rebuild_from_saved(self.provider.as_ref())
    }

    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let engine = self.engine.clone();
        let snapshot = self.cache.get_or_load(move || engine.open()).await?;
        self.engine.search(&snapshot, query, top_k).await
    }

    pub async fn answer_context(&self, query: &str) -> Result<AnswerContext> {
        self.orchestrator.answer_context(query).await
    }

    pub fn load_chunks(&self) -> Result<Vec<Chunk>> {
        self.store.load()
    }

    /// Replace the stored corpus. The index is not rebuilt; searches fail
    /// with a validation error until [`rebuild`](Self::rebuild) runs.
    pub async fn save_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let _guard = self.build_lock.lock().await;
        self.store.save(chunks)?;
        self.cache.invalidate();
        Ok(())
    }
}
