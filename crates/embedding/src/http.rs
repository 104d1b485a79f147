//! The `Embedder` external collaborator (§6): `Embed(text) -> float[dim]`, implemented the
//! same way as the `db` crate's `VectorStore` client — one shared `reqwest::Client`, JSON
//! request/response structs, explicit status-code checking, no bespoke protocol crate.

use crate::{EmbeddingError, EmbeddingProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
  text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
  embedding: Vec<f32>,
}

/// `reqwest`-based client against a deploy-time embedder HTTP endpoint (`embedder_url`).
/// `dimensions` is the deploy-time constant from §6 (`embedding_dim`, default 384); callers
/// that need the I2/§4.4-step-3 fail-fast-on-mismatch check compare `embed`'s output length
/// against it themselves, since the dimension assertion is the Indexer's responsibility, not
/// the client's.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingProvider {
  client: reqwest::Client,
  base_url: String,
  dimensions: usize,
  timeout: Duration,
}

impl HttpEmbeddingProvider {
  pub fn new(base_url: impl Into<String>, dimensions: usize, timeout: Duration) -> Self {
    Self {
      client: reqwest::Client::new(),
      base_url: base_url.into(),
      dimensions,
      timeout,
    }
  }

  fn embed_url(&self) -> String {
    format!("{}/embed", self.base_url.trim_end_matches('/'))
  }

  fn health_url(&self) -> String {
    format!("{}/health", self.base_url.trim_end_matches('/'))
  }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
  fn name(&self) -> &str {
    "http"
  }

  fn model_id(&self) -> &str {
    &self.base_url
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    debug!("embedding {} chars via {}", text.len(), self.base_url);

    let response = self
      .client
      .post(self.embed_url())
      .timeout(self.timeout)
      .json(&EmbedRequest { text })
      .send()
      .await
      .map_err(|e| {
        if e.is_timeout() {
          EmbeddingError::Timeout
        } else {
          EmbeddingError::Network(e.to_string())
        }
      })?;

    let status = response.status();
    if status.as_u16() == 400 {
      let body = response.text().await.unwrap_or_default();
      return Err(EmbeddingError::ProviderError(format!("bad_request: {body}")));
    }
    if !status.is_success() {
      return Err(EmbeddingError::ProviderError(format!("embedder returned {status}")));
    }

    let parsed: EmbedResponse = response
      .json()
      .await
      .map_err(|e| EmbeddingError::ProviderError(e.to_string()))?;
    Ok(parsed.embedding)
  }

  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let mut out = Vec::with_capacity(texts.len());
    for text in texts {
      out.push(self.embed(text).await?);
    }
    Ok(out)
  }

  async fn is_available(&self) -> bool {
    match self.client.get(self.health_url()).timeout(Duration::from_secs(5)).send().await {
      Ok(response) => response.status().is_success(),
      Err(_) => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn embed_url_trims_trailing_slash() {
    let provider = HttpEmbeddingProvider::new("http://localhost:8081/", 384, Duration::from_secs(30));
    assert_eq!(provider.embed_url(), "http://localhost:8081/embed");
    assert_eq!(provider.health_url(), "http://localhost:8081/health");
  }

  #[test]
  fn dimensions_match_configured_value() {
    let provider = HttpEmbeddingProvider::new("http://localhost:8081", 384, Duration::from_secs(30));
    assert_eq!(provider.dimensions(), 384);
  }

  // Requires a running embedder; skips gracefully when unreachable.
  #[tokio::test]
  async fn embed_skips_without_reachable_server() {
    let provider = HttpEmbeddingProvider::new("http://127.0.0.1:1", 384, Duration::from_secs(1));
    if provider.is_available().await {
      return;
    }
    let err = provider.embed("hello").await.unwrap_err();
    assert!(matches!(err, EmbeddingError::Network(_) | EmbeddingError::Timeout));
  }
}
