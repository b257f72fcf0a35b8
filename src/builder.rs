//! Index construction.
//!
//! [`IndexBuilder::build`] turns a corpus into the three persisted artifacts
//! (`embeddings.npy`, `index.flat`, `chunks.jsonl`). Every build is a full
//! replacement:
//!
//! 1. embed every chunk text in corpus order;
//! 2. check one vector per chunk, each of the provider's dimension;
//! 3. L2-normalize the rows and build a [`FlatIndex`] over them;
//! 4. write all three files to temp files in the data directory;
//! 5. rename them into place (matrix, then index, then corpus);
//! 6. notify the registered rebuild callbacks.
//!
//! Any failure before step 5 leaves the previously persisted files
//! untouched. The index records a fingerprint of the corpus it was built
//! from, so a reader that catches the rename sequence half-way sees a
//! mismatch rather than silently pairing old chunks with new vectors.

use std::sync::Arc;

use crate::atomic::Staged;
use crate::chunk_store::{check_unique_ids, ChunkStore};
use crate::config::DataConfig;
use crate::embedding::{embed_checked, EmbeddingProvider};
use crate::error::{IoContext, RagError, Result};
use crate::index::{corpus_fingerprint, FlatIndex};
use crate::models::Chunk;
use crate::vector::{decode_npy, encode_npy, Matrix};

/// Summary passed to rebuild callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub vectors: usize,
    pub dim: usize,
    pub provider_key: String,
}

pub type RebuildCallback = Arc<dyn Fn(&BuildReport) + Send + Sync>;

pub struct IndexBuilder {
    data: DataConfig,
    callbacks: Vec<RebuildCallback>,
}

impl IndexBuilder {
    pub fn new(data: &DataConfig) -> Self {
        Self {
            data: data.clone(),
            callbacks: Vec::new(),
        }
    }

    /// Register a function to run after every successful build.
    pub fn on_rebuild<F>(&mut self, f: F)
    where
        F: Fn(&BuildReport) + Send + Sync + 'static,
    {
        self.callbacks.push(Arc::new(f));
    }

    /// Embed `chunks` with `provider` and replace the persisted index.
    /// Returns the number of vectors indexed.
    pub async fn build(&self, chunks: &[Chunk], provider: &dyn EmbeddingProvider) -> Result<usize> {
        check_unique_ids(chunks)?;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            embed_checked(provider, &texts).await?
        };

        let matrix = Matrix::from_rows(vectors, provider.dims())?;
        self.write_snapshot(chunks, matrix, &provider.provider_key(), true)
    }

    /// Rebuild the index from the stored corpus and matrix without calling
    /// the provider. `provider` only supplies the key and dimension to record.
    pub fn rebuild_from_saved(&self, provider: &dyn EmbeddingProvider) -> Result<usize> {
        let matrix_path = self.data.embeddings_path();
        if !matrix_path.exists() {
            return Err(RagError::RetrievalUnavailable(matrix_path));
        }

        let chunks = ChunkStore::new(self.data.chunks_path()).load()?;
        let bytes = std::fs::read(&matrix_path).at(&matrix_path)?;
        let matrix = decode_npy(&bytes, &matrix_path)?;

        if matrix.rows() != chunks.len() {
            return Err(RagError::validation(format!(
                "saved matrix has {} rows but corpus has {} chunks; run a full build",
                matrix.rows(),
                chunks.len()
            )));
        }
        if matrix.dim() != provider.dims() {
            return Err(RagError::validation(format!(
                "saved matrix has dimension {}, provider declares {}",
                matrix.dim(),
                provider.dims()
            )));
        }

        self.write_snapshot(&chunks, matrix, &provider.provider_key(), false)
    }

    fn write_snapshot(
        &self,
        chunks: &[Chunk],
        mut matrix: Matrix,
        provider_key: &str,
        write_chunks: bool,
    ) -> Result<usize> {
        if matrix.rows() != chunks.len() {
            return Err(RagError::validation(format!(
                "{} embeddings for {} chunks",
                matrix.rows(),
                chunks.len()
            )));
        }

        matrix.normalize_rows();
        let index = FlatIndex::new(matrix.clone(), provider_key, corpus_fingerprint(chunks));

        let staged_matrix = Staged::write(&self.data.embeddings_path(), &encode_npy(&matrix))?;
        let staged_index = Staged::write(&self.data.index_path(), &index.encode()?)?;
        let staged_chunks = if write_chunks {
            Some(ChunkStore::new(self.data.chunks_path()).stage(chunks)?)
        } else {
            None
        };

        staged_matrix.commit()?;
        staged_index.commit()?;
        if let Some(staged) = staged_chunks {
            staged.commit()?;
        }

        let report = BuildReport {
            vectors: index.ntotal(),
            dim: index.dim(),
            provider_key: provider_key.to_string(),
        };
        tracing::info!(
            vectors = report.vectors,
            dim = report.dim,
            provider = %report.provider_key,
            dir = %self.data.dir.display(),
            "index built"
        );

        for cb in &self.callbacks {
            cb(&report);
        }

        Ok(report.vectors)
    }
}
