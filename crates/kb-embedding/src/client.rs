use kb_core::{EmbeddingConfig, KbError, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::rate_limiter::RateLimiter;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_SECS: u64 = 5;

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

/// OpenAI-compatible embedding client (§4.4): talks `POST
/// {base_url}/embeddings` over a pooled `reqwest::Client`, throttled by a
/// [`RateLimiter`] and retried with linear backoff on rate-limit signals.
pub struct EmbeddingClient {
    http: reqwest::Client,
    config: EmbeddingConfig,
    limiter: RateLimiter,
}

impl EmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Self {
        let limiter = RateLimiter::new(config.rpm);
        Self {
            http: reqwest::Client::new(),
            config,
            limiter,
        }
    }

    pub fn vector_dim(&self) -> usize {
        self.config.vector_dim
    }

    /// Embeds a single query string (e.g. for retrieval, §4.7).
    pub async fn embed_query(&self, text: &str) -> Result<Vec<u8>> {
        let mut vectors = self.embed_documents(std::slice::from_ref(&text.to_string())).await?;
        vectors
            .pop()
            .ok_or_else(|| KbError::FatalIngest("embedding endpoint returned no vectors".into()))
    }

    /// Embeds a batch of chunk texts, returning raw little-endian float32
    /// bytes per chunk in input order (I-C2 byte-length invariant).
    pub async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<u8>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.limiter.wait().await;

            match self.request_once(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(KbError::RateLimited(msg)) if attempt < MAX_ATTEMPTS => {
                    let backoff = BACKOFF_BASE_SECS * attempt as u64;
                    warn!(attempt, backoff, %msg, "embedding request rate-limited, retrying");
                    tokio::time::sleep(std::time::Duration::from_secs(backoff)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn request_once(&self, texts: &[String]) -> Result<Vec<Vec<u8>>> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let body = EmbeddingsRequest {
            model: &self.config.model,
            input: texts,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| KbError::Storage(format!("embedding request failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 429 || status.as_u16() == 403 {
            let text = response.text().await.unwrap_or_default();
            return Err(KbError::RateLimited(format!("status {status}: {text}")));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(KbError::FatalIngest(format!("embedding endpoint returned {status}: {text}")));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| KbError::FatalIngest(format!("malformed embedding response: {e}")))?;

        let mut ordered: Vec<(usize, Vec<f32>)> = parsed.data.into_iter().map(|d| (d.index, d.embedding)).collect();
        ordered.sort_by_key(|(index, _)| *index);

        Ok(ordered.into_iter().map(|(_, vec)| f32_to_le_bytes(&vec)).collect())
    }
}

fn f32_to_le_bytes(values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * std::mem::size_of::<f32>());
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_to_le_bytes_produces_four_bytes_per_dimension() {
        let bytes = f32_to_le_bytes(&[1.0, -2.5, 0.0]);
        assert_eq!(bytes.len(), 12);
    }
}
