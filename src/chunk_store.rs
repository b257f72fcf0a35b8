//! Durable storage of the ordered chunk corpus (`chunks.jsonl`).
//!
//! One JSON object per line, in corpus order. Saves replace the whole file
//! atomically; a failed save leaves the previous file intact.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::atomic::{write_atomic, Staged};
use crate::error::{IoContext, RagError, Result};
use crate::models::Chunk;

#[derive(Debug, Clone)]
pub struct ChunkStore {
    path: PathBuf,
}

impl ChunkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the corpus. A missing file is an empty corpus.
    pub fn load(&self) -> Result<Vec<Chunk>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path).at(&self.path)?;
        parse_jsonl(&content, &self.path)
    }

    /// Replace the stored corpus with `chunks`.
    pub fn save(&self, chunks: &[Chunk]) -> Result<()> {
        check_unique_ids(chunks)?;
        write_atomic(&self.path, &encode_jsonl(chunks)?)?;
        tracing::debug!(path = %self.path.display(), chunks = chunks.len(), "saved corpus");
        Ok(())
    }

    /// Write the corpus to a temp file without replacing the target yet.
    pub(crate) fn stage(&self, chunks: &[Chunk]) -> Result<Staged> {
        check_unique_ids(chunks)?;
        Staged::write(&self.path, &encode_jsonl(chunks)?)
    }
}

/// Reject a corpus that repeats a `chunk_id`.
pub fn check_unique_ids(chunks: &[Chunk]) -> Result<()> {
    let mut seen = HashSet::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        if !seen.insert(chunk.chunk_id.as_str()) {
            return Err(RagError::validation(format!(
                "duplicate chunk_id '{}' at position {}",
                chunk.chunk_id, i
            )));
        }
    }
    Ok(())
}

fn encode_jsonl(chunks: &[Chunk]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for chunk in chunks {
        serde_json::to_writer(&mut out, chunk)
            .map_err(|e| RagError::validation(format!("cannot serialize chunk: {}", e)))?;
        out.push(b'\n');
    }
    Ok(out)
}

fn parse_jsonl(content: &str, path: &Path) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let chunk: Chunk =
            serde_json::from_str(line).map_err(|source| RagError::Serialization {
                path: path.to_path_buf(),
                line: i + 1,
                source,
            })?;
        chunks.push(chunk);
    }
    Ok(chunks)
}
