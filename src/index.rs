//! Exact inner-product similarity index.
//!
//! [`FlatIndex`] stores L2-normalized vectors and scores a query against
//! every row, so inner product equals cosine similarity. Row ids are corpus
//! positions.
//!
//! # File format (`index.flat`)
//!
//! | Field | Encoding |
//! |-------|----------|
//! | magic | `RAGFLAT\0` |
//! | version | u32 LE (currently 1) |
//! | metric | u32 LE (0 = inner product) |
//! | dim | u32 LE |
//! | ntotal | u64 LE |
//! | provider key | u32 LE length + UTF-8 bytes |
//! | corpus fingerprint | 32 bytes (SHA-256) |
//! | vectors | `ntotal × dim` f32 LE |
//!
//! All integers are little-endian. Loading validates the declared count and
//! dimension against the payload length.

use std::cmp::Ordering;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{IoContext, RagError, Result};
use crate::models::Chunk;
use crate::vector::{dot, f32s_to_le_bytes, le_bytes_to_f32s, Matrix};

const MAGIC: &[u8; 8] = b"RAGFLAT\0";
const VERSION: u32 = 1;
const METRIC_INNER_PRODUCT: u32 = 0;

/// Row id reported for an unfilled result slot.
pub const NO_NEIGHBOR: i64 = -1;

/// SHA-256 over the ordered chunk ids and texts.
pub type Fingerprint = [u8; 32];

/// Fingerprint a corpus so an index can tell whether the chunks on disk are
/// the ones it was built from.
pub fn corpus_fingerprint(chunks: &[Chunk]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update((chunks.len() as u64).to_le_bytes());
    for chunk in chunks {
        for field in [&chunk.chunk_id, &chunk.text] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
    }
    hasher.finalize().into()
}

/// A scored neighbor. `id` is [`NO_NEIGHBOR`] when fewer than `k` rows exist.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: i64,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    provider_key: String,
    fingerprint: Fingerprint,
    vectors: Matrix,
}

impl FlatIndex {
    /// Wrap already-normalized `vectors`.
    pub fn new(vectors: Matrix, provider_key: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self {
            provider_key: provider_key.into(),
            fingerprint,
            vectors,
        }
    }

    pub fn dim(&self) -> usize {
        self.vectors.dim()
    }

    pub fn ntotal(&self) -> usize {
        self.vectors.rows()
    }

    pub fn provider_key(&self) -> &str {
        &self.provider_key
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Return the `k` best rows for `query`, best first, ties broken by
    /// ascending row id. Slots beyond `ntotal` are padded with
    /// [`NO_NEIGHBOR`].
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dim() {
            return Err(RagError::validation(format!(
                "query has dimension {}, index has {}",
                query.len(),
                self.dim()
            )));
        }

        let mut scored: Vec<Neighbor> = self
            .vectors
            .iter_rows()
            .enumerate()
            .map(|(i, row)| Neighbor {
                id: i as i64,
                score: dot(query, row),
            })
            .collect();

        let take = k.min(scored.len());
        if take > 0 && take < scored.len() {
            scored.select_nth_unstable_by(take - 1, rank);
        }
        scored.truncate(take);
        scored.sort_by(rank);

        scored.resize(
            k,
            Neighbor {
                id: NO_NEIGHBOR,
                score: f32::NEG_INFINITY,
            },
        );
        Ok(scored)
    }

    /// Serialize to the `index.flat` layout.
    ///
    /// Fails with [`RagError::Validation`] when the dimension or the provider
    /// key length does not fit the header's `u32` fields.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let key = self.provider_key.as_bytes();
        let dim = header_u32(self.dim(), "dimension")?;
        let key_len = header_u32(key.len(), "provider key length")?;
        let mut out = Vec::with_capacity(64 + key.len() + self.vectors.as_slice().len() * 4);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&METRIC_INNER_PRODUCT.to_le_bytes());
        out.extend_from_slice(&dim.to_le_bytes());
        out.extend_from_slice(&(self.ntotal() as u64).to_le_bytes());
        out.extend_from_slice(&key_len.to_le_bytes());
        out.extend_from_slice(key);
        out.extend_from_slice(&self.fingerprint);
        out.extend_from_slice(&f32s_to_le_bytes(self.vectors.as_slice()));
        Ok(out)
    }

    pub fn decode(bytes: &[u8], path: &Path) -> Result<Self> {
        let mut r = Reader { bytes, pos: 0, path };

        if r.take(MAGIC.len())? != MAGIC {
            return Err(RagError::corrupt(path, "bad magic; not a flat index file"));
        }
        let version = r.u32()?;
        if version != VERSION {
            return Err(RagError::corrupt(path, format!("unsupported index version {}", version)));
        }
        let metric = r.u32()?;
        if metric != METRIC_INNER_PRODUCT {
            return Err(RagError::corrupt(path, format!("unsupported metric {}", metric)));
        }
        let dim = r.u32()? as usize;
        let ntotal = usize::try_from(r.u64()?)
            .map_err(|_| RagError::corrupt(path, "ntotal does not fit in memory"))?;
        let key_len = r.u32()? as usize;
        let provider_key = std::str::from_utf8(r.take(key_len)?)
            .map_err(|_| RagError::corrupt(path, "provider key is not UTF-8"))?
            .to_string();
        let mut fingerprint = [0u8; 32];
        fingerprint.copy_from_slice(r.take(32)?);

        let payload = r.rest();
        let expected = ntotal
            .checked_mul(dim)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| RagError::corrupt(path, "declared size overflows"))?;
        if payload.len() != expected {
            return Err(RagError::corrupt(
                path,
                format!(
                    "declares {} vectors of dimension {} but holds {} payload bytes",
                    ntotal,
                    dim,
                    payload.len()
                ),
            ));
        }

        let vectors = Matrix::from_flat(ntotal, dim, le_bytes_to_f32s(payload))?;
        Ok(Self {
            provider_key,
            fingerprint,
            vectors,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).at(path)?;
        Self::decode(&bytes, path)
    }
}

fn header_u32(value: usize, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        RagError::validation(format!("index {} {} does not fit in the file header", field, value))
    })
}

fn rank(a: &Neighbor, b: &Neighbor) -> Ordering {
    b.score.total_cmp(&a.score).then(a.id.cmp(&b.id))
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    path: &'a Path,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| RagError::corrupt(self.path, "truncated header"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn index(rows: Vec<Vec<f32>>) -> FlatIndex {
        let dim = rows.first().map(Vec::len).unwrap_or(2);
        let mut m = Matrix::from_rows(rows, dim).unwrap();
        m.normalize_rows();
        FlatIndex::new(m, "test:key", [7u8; 32])
    }

    #[test]
    fn test_search_ranks_by_score() {
        let idx = index(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]]);
        let hits = idx.search(&[1.0, 0.0], 3).unwrap();
        let ids: Vec<i64> = hits.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![0, 2, 1]);
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_ties_by_ascending_id() {
        let idx = index(vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 0.0]]);
        let hits = idx.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].id, 1);
        assert_eq!(hits[1].id, 2);
    }

    #[test]
    fn test_pads_with_sentinel() {
        let idx = index(vec![vec![1.0, 0.0]]);
        let hits = idx.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[1].id, NO_NEIGHBOR);
        assert_eq!(hits[2].id, NO_NEIGHBOR);
    }

    #[test]
    fn test_empty_index() {
        let idx = FlatIndex::new(Matrix::empty(4), "k", [0u8; 32]);
        let hits = idx.search(&[0.0; 4], 2).unwrap();
        assert!(hits.iter().all(|n| n.id == NO_NEIGHBOR));
    }

    #[test]
    fn test_dimension_mismatch() {
        let idx = index(vec![vec![1.0, 0.0]]);
        assert!(matches!(
            idx.search(&[1.0, 0.0, 0.0], 1).unwrap_err(),
            RagError::Validation(_)
        ));
    }

    #[test]
    fn test_encode_decode() {
        let idx = index(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let bytes = idx.encode().unwrap();
        assert_eq!(&bytes[..8], b"RAGFLAT\0");
        let back = FlatIndex::decode(&bytes, &PathBuf::from("index.flat")).unwrap();
        assert_eq!(back, idx);
        assert_eq!(back.provider_key(), "test:key");
    }

    #[test]
    fn test_decode_rejects_short_payload() {
        let idx = index(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let mut bytes = idx.encode().unwrap();
        bytes.truncate(bytes.len() - 4);
        let err = FlatIndex::decode(&bytes, &PathBuf::from("index.flat")).unwrap_err();
        assert!(matches!(err, RagError::Corrupt { .. }));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_header_field_overflow() {
        assert_eq!(header_u32(512, "dimension").unwrap(), 512);
        let err = header_u32(u32::MAX as usize + 1, "dimension").unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = FlatIndex::decode(b"RAGF", &PathBuf::from("index.flat")).unwrap_err();
        assert!(matches!(err, RagError::Corrupt { .. }));
    }

    #[test]
    fn test_fingerprint_sensitive_to_order_and_text() {
        let a = Chunk::new("1", "d", "alpha");
        let b = Chunk::new("2", "d", "beta");
        let fp = corpus_fingerprint(&[a.clone(), b.clone()]);
        assert_ne!(fp, corpus_fingerprint(&[b.clone(), a.clone()]));
        assert_ne!(fp, corpus_fingerprint(&[a, Chunk::new("2", "d", "beta!")]));
        assert_eq!(corpus_fingerprint(&[]), corpus_fingerprint(&[]));
    }
}
