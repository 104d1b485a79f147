//! `VectorStore` (§6): a `reqwest`-based HTTP client against a Qdrant-shaped REST API
//! (`PUT /collections/{name}/points`, `POST /collections/{name}/points/search`). Built the
//! same way as the core's other outbound HTTP adapters: one shared client, JSON
//! request/response structs, explicit status-code checking, no bespoke protocol crate.

use etl_core::{Embedding, EmbeddingMetadata};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum VectorStoreError {
  #[error("vector store unavailable: {0}")]
  Unavailable(String),
  #[error("vector store request timed out")]
  Timeout,
  #[error("vector store returned status {status}: {body}")]
  HttpStatus { status: u16, body: String },
  #[error("unknown collection: {0}")]
  UnknownCollection(String),
  #[error("malformed response: {0}")]
  Malformed(String),
}

impl VectorStoreError {
  pub fn kind(&self) -> etl_core::ErrorKind {
    match self {
      VectorStoreError::Unavailable(_) | VectorStoreError::HttpStatus { .. } | VectorStoreError::Malformed(_) => {
        etl_core::ErrorKind::VectorStoreUnavailable
      }
      VectorStoreError::Timeout => etl_core::ErrorKind::Timeout,
      VectorStoreError::UnknownCollection(_) => etl_core::ErrorKind::Validation,
    }
  }
}

pub type Result<T> = std::result::Result<T, VectorStoreError>;

#[derive(Debug, Clone)]
pub struct VectorStore {
  client: reqwest::Client,
  base_url: String,
  timeout: Duration,
}

#[derive(Debug, Serialize)]
struct UpsertRequest {
  points: Vec<PointUpsert>,
}

#[derive(Debug, Serialize)]
struct PointUpsert {
  id: String,
  vector: Vec<f32>,
  payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct SearchRequest {
  vector: Vec<f32>,
  limit: usize,
  with_payload: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
  result: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
  id: String,
  score: f32,
  payload: serde_json::Value,
}

/// One result row from [`VectorStore::top_k`], score already normalised into `[0, 1]`
/// (§ GLOSSARY: cosine similarity normalised so 1 means identical direction).
#[derive(Debug, Clone)]
pub struct VectorHit {
  pub vector_id: String,
  pub score: f32,
  pub metadata: EmbeddingMetadata,
}

impl VectorStore {
  pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
    Self {
      client: reqwest::Client::new(),
      base_url: base_url.into(),
      timeout,
    }
  }

  fn points_url(&self, collection: &str) -> String {
    format!("{}/collections/{}/points", self.base_url.trim_end_matches('/'), collection)
  }

  fn search_url(&self, collection: &str) -> String {
    format!(
      "{}/collections/{}/points/search",
      self.base_url.trim_end_matches('/'),
      collection
    )
  }

  fn collections_url(&self, collection: &str) -> String {
    format!("{}/collections/{}", self.base_url.trim_end_matches('/'), collection)
  }

  fn point_url(&self, collection: &str, vector_id: &str) -> String {
    format!(
      "{}/collections/{}/points/{}",
      self.base_url.trim_end_matches('/'),
      collection,
      vector_id
    )
  }

  /// Whether `vector_id` already has a point in `collection`. Used by the orphan
  /// reconciliation pass (§9) to find Documents with no corresponding Embedding.
  pub async fn exists(&self, collection: &str, vector_id: &str) -> Result<bool> {
    let response = self
      .client
      .get(self.point_url(collection, vector_id))
      .timeout(self.timeout)
      .send()
      .await
      .map_err(|e| {
        if e.is_timeout() {
          VectorStoreError::Timeout
        } else {
          VectorStoreError::Unavailable(e.to_string())
        }
      })?;

    Ok(response.status().is_success())
  }

  /// Auto-creates the collection on first upsert (§6): `PUT /collections/{name}` is issued
  /// best-effort before the points write; a 4xx response (collection already exists) is not
  /// an error.
  async fn ensure_collection(&self, collection: &str, dim: usize) -> Result<()> {
    #[derive(Serialize)]
    struct CreateCollection {
      vectors: VectorParams,
    }
    #[derive(Serialize)]
    struct VectorParams {
      size: usize,
      distance: &'static str,
    }

    let response = self
      .client
      .put(self.collections_url(collection))
      .timeout(self.timeout)
      .json(&CreateCollection {
        vectors: VectorParams { size: dim, distance: "Cosine" },
      })
      .send()
      .await;

    match response {
      Ok(_) => Ok(()),
      Err(e) if e.is_timeout() => Err(VectorStoreError::Timeout),
      Err(e) => Err(VectorStoreError::Unavailable(e.to_string())),
    }
  }

  /// `Upsert(collection, vector_id, vector, metadata)` (§6). Deterministic: the same
  /// `vector_id` replaces any prior vector under that id.
  pub async fn upsert(&self, collection: &str, embedding: &Embedding) -> Result<()> {
    self.ensure_collection(collection, embedding.vector.len()).await?;

    let payload = serde_json::to_value(&embedding.metadata).map_err(|e| VectorStoreError::Malformed(e.to_string()))?;
    let body = UpsertRequest {
      points: vec![PointUpsert {
        id: embedding.vector_id.clone(),
        vector: embedding.vector.clone(),
        payload,
      }],
    };

    debug!("upserting vector_id={} into collection={}", embedding.vector_id, collection);

    let response = self
      .client
      .put(self.points_url(collection))
      .timeout(self.timeout)
      .json(&body)
      .send()
      .await
      .map_err(|e| {
        if e.is_timeout() {
          VectorStoreError::Timeout
        } else {
          VectorStoreError::Unavailable(e.to_string())
        }
      })?;

    let status = response.status();
    if !status.is_success() {
      let text = response.text().await.unwrap_or_default();
      warn!("vector store upsert failed: {} - {}", status, text);
      return Err(VectorStoreError::HttpStatus { status: status.as_u16(), body: text });
    }

    Ok(())
  }

  /// `TopK(collection, vector, k)` (§6). Results are ordered by descending score with ties
  /// broken by ascending `doc_id`, per §5's ordering guarantee (the store's own ordering is
  /// assumed descending-by-score; the ascending-doc_id tiebreak is applied here since a
  /// generic Qdrant-shaped API doesn't guarantee one).
  pub async fn top_k(&self, collection: &str, vector: &[f32], k: usize) -> Result<Vec<VectorHit>> {
    let response = self
      .client
      .post(self.search_url(collection))
      .timeout(self.timeout)
      .json(&SearchRequest {
        vector: vector.to_vec(),
        limit: k,
        with_payload: true,
      })
      .send()
      .await
      .map_err(|e| {
        if e.is_timeout() {
          VectorStoreError::Timeout
        } else {
          VectorStoreError::Unavailable(e.to_string())
        }
      })?;

    let status = response.status();
    if status.as_u16() == 404 {
      return Err(VectorStoreError::UnknownCollection(collection.to_string()));
    }
    if !status.is_success() {
      let text = response.text().await.unwrap_or_default();
      return Err(VectorStoreError::HttpStatus { status: status.as_u16(), body: text });
    }

    let parsed: SearchResponse = response.json().await.map_err(|e| VectorStoreError::Malformed(e.to_string()))?;

    let mut hits = Vec::with_capacity(parsed.result.len());
    for hit in parsed.result {
      let metadata: EmbeddingMetadata =
        serde_json::from_value(hit.payload).map_err(|e| VectorStoreError::Malformed(e.to_string()))?;
      hits.push(VectorHit {
        vector_id: hit.id,
        score: normalize_cosine(hit.score),
        metadata,
      });
    }

    order_hits(&mut hits);
    Ok(hits)
  }
}

/// Maps a raw cosine similarity in `[-1, 1]` (what `ensure_collection`'s `distance: "Cosine"`
/// collection actually returns) into the `[0, 1]` range the Glossary and §4.7 define `score`
/// as, clamping for float error at the boundaries.
fn normalize_cosine(raw: f32) -> f32 {
  ((raw + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Descending score, ties broken by ascending `doc_id` (§5 ordering guarantee). Exposed
/// standalone so the sort itself is benchable without a live vector store.
pub fn order_hits(hits: &mut [VectorHit]) {
  hits.sort_by(|a, b| {
    b.score
      .partial_cmp(&a.score)
      .unwrap_or(std::cmp::Ordering::Equal)
      .then(a.metadata.doc_id.cmp(&b.metadata.doc_id))
  });
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn urls_are_well_formed() {
    let store = VectorStore::new("http://localhost:6333/", Duration::from_secs(10));
    assert_eq!(store.points_url("etl_documents"), "http://localhost:6333/collections/etl_documents/points");
    assert_eq!(
      store.search_url("etl_documents"),
      "http://localhost:6333/collections/etl_documents/points/search"
    );
  }

  fn hit(doc_id: i64, score: f32) -> VectorHit {
    VectorHit {
      vector_id: format!("etl_doc:{doc_id}"),
      score,
      metadata: EmbeddingMetadata {
        doc_id,
        file_name: "a.pdf".into(),
        lot_id: "lot-1".into(),
        source: "etl_documents".into(),
      },
    }
  }

  #[test]
  fn normalize_cosine_maps_into_unit_range() {
    assert_eq!(normalize_cosine(1.0), 1.0);
    assert_eq!(normalize_cosine(-1.0), 0.0);
    assert_eq!(normalize_cosine(0.0), 0.5);
    // float error past the raw cosine's theoretical bounds still clamps into [0, 1].
    assert_eq!(normalize_cosine(1.0001), 1.0);
    assert_eq!(normalize_cosine(-1.0001), 0.0);
  }

  #[test]
  fn order_hits_breaks_ties_by_ascending_doc_id() {
    let mut hits = vec![hit(3, 0.9), hit(1, 0.9), hit(2, 0.95)];
    order_hits(&mut hits);
    let ids: Vec<i64> = hits.iter().map(|h| h.metadata.doc_id).collect();
    assert_eq!(ids, vec![2, 1, 3]);
  }

  // Requires a running Qdrant-shaped server; skips gracefully when unreachable.
  #[tokio::test]
  async fn upsert_skips_without_reachable_server() {
    let store = VectorStore::new("http://127.0.0.1:1", Duration::from_millis(200));
    let embedding = Embedding {
      vector_id: "etl_doc:1".into(),
      vector: vec![0.1, 0.2],
      metadata: EmbeddingMetadata {
        doc_id: 1,
        file_name: "a.pdf".into(),
        lot_id: "lot-1".into(),
        source: "etl_documents".into(),
      },
    };
    let err = store.upsert("etl_documents", &embedding).await.unwrap_err();
    assert_eq!(err.kind(), etl_core::ErrorKind::VectorStoreUnavailable);
  }
}
