//! Nearest-neighbor search over a persisted snapshot.
//!
//! [`SearchEngine::open`] loads the corpus, embedding matrix and index from
//! the data directory and checks that they describe the same build.
//! [`SearchEngine::search`] embeds a query with the provider the index was
//! built with and maps the best rows back to chunks.

use std::sync::Arc;
use std::time::Duration;

use crate::config::DataConfig;
use crate::chunk_store::ChunkStore;
use crate::embedding::EmbeddingProvider;
use crate::error::{IoContext, RagError, Result};
use crate::index::{corpus_fingerprint, FlatIndex};
use crate::models::{Chunk, SearchResult};
use crate::vector::{decode_npy, l2_normalize};

/// Reads of the data directory made by [`SearchEngine::open`] before a
/// persistent mismatch is reported.
pub const OPEN_ATTEMPTS: u32 = 10;

const OPEN_RETRY_DELAY: Duration = Duration::from_millis(10);

enum Read {
    Consistent(Snapshot),
    Mismatch(RagError),
}

/// An immutable, self-consistent view of one build.
#[derive(Debug)]
pub struct Snapshot {
    chunks: Vec<Chunk>,
    index: FlatIndex,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn dim(&self) -> usize {
        self.index.dim()
    }

    pub fn provider_key(&self) -> &str {
        self.index.provider_key()
    }
}

pub struct SearchEngine {
    data: DataConfig,
    provider: Arc<dyn EmbeddingProvider>,
}

impl SearchEngine {
    pub fn new(data: &DataConfig, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            data: data.clone(),
            provider,
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Load the persisted snapshot.
    ///
    /// A build renames its three files one after another, so a read that
    /// overlaps a commit can pair files from two builds. Such a read is
    /// detected by the count and fingerprint checks and retried after a
    /// short pause; a mismatch that outlasts [`OPEN_ATTEMPTS`] reads is
    /// reported.
    ///
    /// Blocks on file I/O; async callers go through
    /// [`SnapshotCache::get_or_load`](crate::cache::SnapshotCache::get_or_load),
    /// which runs it on the blocking pool.
    ///
    /// # Errors
    ///
    /// - [`RagError::RetrievalUnavailable`] when no index has been built.
    /// - [`RagError::Validation`] when the corpus, matrix and index on disk
    ///   do not belong to the same build.
    pub fn open(&self) -> Result<Arc<Snapshot>> {
        let mut attempt = 1;
        loop {
            match self.read_snapshot()? {
                Read::Consistent(snapshot) => return Ok(Arc::new(snapshot)),
                Read::Mismatch(err) if attempt >= OPEN_ATTEMPTS => return Err(err),
                Read::Mismatch(err) => {
                    tracing::debug!(attempt, error = %err, "snapshot changed while reading; retrying");
                    attempt += 1;
                    std::thread::sleep(OPEN_RETRY_DELAY);
                }
            }
        }
    }

    fn read_snapshot(&self) -> Result<Read> {
        let index_path = self.data.index_path();
        if !index_path.exists() {
            return Err(RagError::RetrievalUnavailable(index_path));
        }

        let index = FlatIndex::load(&index_path)?;
        let chunks = ChunkStore::new(self.data.chunks_path()).load()?;

        if chunks.len() != index.ntotal() {
            return Ok(Read::Mismatch(RagError::validation(format!(
                "index holds {} vectors but corpus has {} chunks; rebuild the index",
                index.ntotal(),
                chunks.len()
            ))));
        }
        if &corpus_fingerprint(&chunks) != index.fingerprint() {
            return Ok(Read::Mismatch(RagError::validation(
                "corpus on disk does not match the one the index was built from; rebuild the index",
            )));
        }

        let matrix_path = self.data.embeddings_path();
        if matrix_path.exists() {
            let bytes = std::fs::read(&matrix_path).at(&matrix_path)?;
            let matrix = decode_npy(&bytes, &matrix_path)?;
            if matrix.rows() != index.ntotal() || matrix.dim() != index.dim() {
                return Ok(Read::Mismatch(RagError::validation(format!(
                    "embedding matrix is {}x{} but index is {}x{}; rebuild the index",
                    matrix.rows(),
                    matrix.dim(),
                    index.ntotal(),
                    index.dim()
                ))));
            }
        } else {
            tracing::warn!(path = %matrix_path.display(), "embedding matrix missing; index still usable");
        }

        tracing::debug!(
            chunks = chunks.len(),
            dim = index.dim(),
            provider = %index.provider_key(),
            "opened snapshot"
        );
        Ok(Read::Consistent(Snapshot { chunks, index }))
    }

    /// Return up to `top_k` chunks most similar to `query`, best first.
    pub async fn search(
        &self,
        snapshot: &Snapshot,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(RagError::validation("top_k must be at least 1"));
        }
        if query.trim().is_empty() {
            return Err(RagError::validation("query must not be empty"));
        }

        let key = self.provider.provider_key();
        if key != snapshot.provider_key() || self.provider.dims() != snapshot.dim() {
            return Err(RagError::validation(format!(
                "index was built with '{}' (dimension {}) but the active provider is '{}' (dimension {}); rebuild the index",
                snapshot.provider_key(),
                snapshot.dim(),
                key,
                self.provider.dims()
            )));
        }

        if snapshot.is_empty() {
            return Ok(Vec::new());
        }

        let mut vector = self.provider.embed_query(query).await?;
        l2_normalize(&mut vector);

        let n = snapshot.len();
        let neighbors = snapshot.index.search(&vector, top_k.min(n))?;

        let results = neighbors
            .into_iter()
            .filter(|nb| nb.id >= 0 && (nb.id as usize) < n)
            .map(|nb| {
                let chunk = &snapshot.chunks[nb.id as usize];
                SearchResult {
                    chunk_id: chunk.chunk_id.clone(),
                    doc_id: chunk.doc_id.clone(),
                    text: chunk.text.clone(),
                    score: nb.score,
                }
            })
            .collect();

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IndexBuilder;
    use crate::embedding::DeterministicProvider;
    use tempfile::TempDir;

    fn corpus() -> Vec<Chunk> {
        vec![
            Chunk::new("1", "fin.txt", "refund policy is 30 days"),
            Chunk::new("2", "it.txt", "IT password reset steps"),
            Chunk::new("3", "hr.txt", "vacation accrual policy"),
        ]
    }

    async fn built(tmp: &TempDir, dims: usize) -> (DataConfig, SearchEngine) {
        let data = DataConfig {
            dir: tmp.path().to_path_buf(),
        };
        let provider = Arc::new(DeterministicProvider::new(dims));
        IndexBuilder::new(&data)
            .build(&corpus(), provider.as_ref())
            .await
            .unwrap();
        let engine = SearchEngine::new(&data, provider);
        (data, engine)
    }

    #[tokio::test]
    async fn test_open_without_index() {
        let tmp = TempDir::new().unwrap();
        let data = DataConfig {
            dir: tmp.path().to_path_buf(),
        };
        let engine = SearchEngine::new(&data, Arc::new(DeterministicProvider::new(8)));
        assert!(matches!(
            engine.open().unwrap_err(),
            RagError::RetrievalUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_top_hit_and_bounds() {
        let tmp = TempDir::new().unwrap();
        let (_, engine) = built(&tmp, 512).await;
        let snap = engine.open().unwrap();

        let hits = engine.search(&snap, "password reset", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, "2");

        let hits = engine.search(&snap, "nonexistent topic xyz", 5).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_zero_top_k_rejected() {
        let tmp = TempDir::new().unwrap();
        let (_, engine) = built(&tmp, 32).await;
        let snap = engine.open().unwrap();
        assert!(matches!(
            engine.search(&snap, "x", 0).await.unwrap_err(),
            RagError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_provider_mismatch_rejected() {
        let tmp = TempDir::new().unwrap();
        let (data, _) = built(&tmp, 32).await;
        let other = SearchEngine::new(&data, Arc::new(DeterministicProvider::new(64)));
        let snap = other.open().unwrap();
        let err = other.search(&snap, "refund", 1).await.unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }

    #[tokio::test]
    async fn test_corpus_edited_after_build_is_detected() {
        let tmp = TempDir::new().unwrap();
        let (data, engine) = built(&tmp, 32).await;
        let mut edited = corpus();
        edited[0].text = "refund policy is 60 days".to_string();
        ChunkStore::new(data.chunks_path()).save(&edited).unwrap();
        assert!(matches!(engine.open().unwrap_err(), RagError::Validation(_)));
    }
}
