use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

/// Embedding provider backed by an OpenAI-compatible HTTP API.
///
/// Calls `POST {url}/embeddings` once per batch of at most `batch_size`
/// texts.
///
/// Retry strategy:
/// - HTTP 429 or 5xx → retry with exponential backoff
/// - HTTP 4xx (not 429) → fail immediately
/// - Network error or timeout → retry
/// - Backoff: 1s, 2s, 4s, ... (capped at 2^5 times the base)
///
/// Any failure aborts the whole call with [`RagError::Provider`]; partial
/// results are discarded.
pub struct RemoteProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
    backoff_base: Duration,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl RemoteProvider {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::provider(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            dims: config.dims,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            backoff_base: Duration::from_secs(1),
        })
    }

    /// Override the first retry delay.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    async fn embed_one_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: batch,
        };

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff_base * (1u32 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
                            RagError::provider(format!("malformed embeddings response: {}", e))
                        })?;
                        return self.collect(parsed, batch.len());
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = RagError::provider(format!(
                        "embeddings API error {}: {}",
                        status, body_text
                    ));

                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(%status, attempt, "embedding request failed; will retry");
                        last_err = Some(err);
                        continue;
                    }

                    return Err(err);
                }
                Err(e) => {
                    let kind = if e.is_timeout() { "timed out" } else { "failed" };
                    tracing::warn!(error = %e, attempt, "embedding request {}", kind);
                    last_err = Some(RagError::provider(format!(
                        "embedding request {}: {}",
                        kind, e
                    )));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| RagError::provider("embedding failed after retries")))
    }

    fn collect(&self, parsed: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
        if parsed.data.len() != expected {
            return Err(RagError::provider(format!(
                "embeddings API returned {} vectors for {} inputs",
                parsed.data.len(),
                expected
            )));
        }

        let with_index = parsed.data.iter().filter(|d| d.index.is_some()).count();
        let ordered: Vec<Vec<f32>> = if with_index == 0 {
            parsed.data.into_iter().map(|d| d.embedding).collect()
        } else if with_index == expected {
            place_by_index(parsed.data, expected)?
        } else {
            return Err(RagError::provider(
                "embeddings API returned indices for only some items",
            ));
        };

        let mut out = Vec::with_capacity(expected);
        for (i, embedding) in ordered.into_iter().enumerate() {
            if embedding.len() != self.dims {
                return Err(RagError::provider(format!(
                    "embedding {} has dimension {}, expected {}",
                    i,
                    embedding.len(),
                    self.dims
                )));
            }
            out.push(embedding);
        }
        Ok(out)
    }
}

/// Put each item at its `index`; the indices must be a permutation of `0..n`.
fn place_by_index(data: Vec<EmbeddingData>, n: usize) -> Result<Vec<Vec<f32>>> {
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; n];
    for item in data {
        let index = item.index.unwrap_or(usize::MAX);
        let slot = slots.get_mut(index).ok_or_else(|| {
            RagError::provider(format!(
                "embeddings API returned index {} for {} inputs",
                index, n
            ))
        })?;
        if slot.replace(item.embedding).is_some() {
            return Err(RagError::provider(format!(
                "embeddings API returned index {} twice",
                index
            )));
        }
    }
    // n items, none out of range, none repeated: every slot is filled
    Ok(slots.into_iter().flatten().collect())
}

#[async_trait]
impl EmbeddingProvider for RemoteProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn provider_key(&self) -> String {
        format!("remote:{}:d{}", self.model, self.dims)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_one_batch(batch).await?);
        }
        Ok(out)
    }
}
