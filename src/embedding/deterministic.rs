use std::hash::Hasher;

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use twox_hash::XxHash64;

use super::EmbeddingProvider;
use crate::error::Result;
use crate::vector::l2_normalize;

/// Offline embedding provider.
///
/// Each lowercase alphanumeric token of the text is hashed with xxHash64
/// (seed 0) over its UTF-8 bytes; the hash seeds a ChaCha8 generator that
/// draws `dims` uniform values in `[-1, 1)`. One more draw of the same kind,
/// seeded from the exact UTF-8 text, is added to the token vectors and the
/// sum is L2-normalized.
///
/// Texts sharing words land near each other, the same text always yields
/// bit-identical output, and two different texts never share a vector even
/// when their words are the same.
#[derive(Debug, Clone)]
pub struct DeterministicProvider {
    dims: usize,
}

impl DeterministicProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    /// Embed one text synchronously.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut acc = vec![0.0f32; self.dims];
        for token in tokens(text) {
            add_draws(&mut acc, &token);
        }
        add_draws(&mut acc, text);
        l2_normalize(&mut acc);
        acc
    }
}

/// Add `acc.len()` uniform draws seeded from `key`.
fn add_draws(acc: &mut [f32], key: &str) {
    let mut rng = ChaCha8Rng::seed_from_u64(stable_hash(key));
    for slot in acc.iter_mut() {
        *slot += rng.random_range(-1.0f32..1.0f32);
    }
}

/// xxHash64 with seed 0 over the UTF-8 bytes of `s`.
pub(crate) fn stable_hash(s: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(s.as_bytes());
    hasher.finish()
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for DeterministicProvider {
    fn model_name(&self) -> &str {
        "deterministic"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn provider_key(&self) -> String {
        format!("deterministic:xxh64-chacha8:d{}", self.dims)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
