//! Idempotent dual-sink persistence (§4.4): the only component that writes to either the
//! RelationalStore or the VectorStore.

use db::{InsertOutcome, RelationalStore, VectorStore};
use embedding::EmbeddingProvider;
use etl_core::{AttachmentType, Embedding, EmbeddingMetadata, ErrorKind, ExtractionMode, IngestAction};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum IndexError {
  #[error("relational store unavailable: {0}")]
  DbUnavailable(String),
  #[error("embedder unavailable: {0}")]
  EmbedUnavailable(String),
  #[error("vector store unavailable: {0}")]
  VectorStoreUnavailable(String),
  #[error("embedding dimension mismatch: expected {expected}, got {got}")]
  EmbeddingDimMismatch { expected: usize, got: usize },
}

impl IndexError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      IndexError::DbUnavailable(_) => ErrorKind::DbUnavailable,
      IndexError::EmbedUnavailable(_) => ErrorKind::EmbedUnavailable,
      IndexError::VectorStoreUnavailable(_) => ErrorKind::VectorStoreUnavailable,
      IndexError::EmbeddingDimMismatch { .. } => ErrorKind::Validation,
    }
  }
}

/// §4.4 output: the assigned `doc_id`, the vector store id it is embedded under, and
/// whether this call inserted a new row or kept an existing one in place (I1).
#[derive(Debug, Clone)]
pub struct IndexOutcome {
  pub doc_id: i64,
  pub vector_id: String,
  pub action: IngestAction,
  /// `true` when a Document was persisted but its Embedding could not be (step 3/4
  /// failed); §8 scenario 6 surfaces this as `embedding_pending` on the HTTP response.
  pub embedding_pending: bool,
}

pub struct Indexer {
  relational: Arc<RelationalStore>,
  vector: Arc<VectorStore>,
  embedder: Arc<dyn EmbeddingProvider>,
  embedding_dim: usize,
  collection: String,
}

impl Indexer {
  pub fn new(
    relational: Arc<RelationalStore>,
    vector: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    embedding_dim: usize,
    collection: impl Into<String>,
  ) -> Self {
    Self {
      relational,
      vector,
      embedder,
      embedding_dim,
      collection: collection.into(),
    }
  }

  /// §4.4 algorithm. `content` must already satisfy I3 (non-empty after trim); the
  /// Extractor is responsible for that invariant, not this step.
  pub async fn index(
    &self,
    lot_id: &str,
    file_name: &str,
    file_type: AttachmentType,
    content: &str,
    extraction_mode: ExtractionMode,
  ) -> Result<IndexOutcome, IndexError> {
    let outcome = self
      .relational
      .insert(lot_id, file_name, file_type, content, extraction_mode)
      .await
      .map_err(|e| IndexError::DbUnavailable(e.to_string()))?;

    let action = outcome.action();
    let doc = outcome.document().clone();

    // §4.4 step 2: embedding/vector-write only happens on a fresh insert. A duplicate_kept
    // row already has its embedding from the original ingestion.
    if !matches!(outcome, InsertOutcome::Inserted(_)) {
      debug!("duplicate_kept for ({lot_id}, {file_name}); skipping re-embed");
      return Ok(IndexOutcome {
        doc_id: doc.doc_id,
        vector_id: doc.vector_id(),
        action,
        embedding_pending: false,
      });
    }

    info!("inserted doc_id={} for ({lot_id}, {file_name})", doc.doc_id);

    let embedding_pending = match self.embed_and_upsert(&doc).await {
      Ok(()) => false,
      Err(e) => {
        warn!("embedding/vector-upsert failed for doc_id={}: {e}", doc.doc_id);
        true
      }
    };

    Ok(IndexOutcome {
      doc_id: doc.doc_id,
      vector_id: doc.vector_id(),
      action,
      embedding_pending,
    })
  }

  async fn embed_and_upsert(&self, doc: &etl_core::Document) -> Result<(), IndexError> {
    let vector = self
      .embedder
      .embed(&doc.content)
      .await
      .map_err(|e| IndexError::EmbedUnavailable(e.to_string()))?;

    if vector.len() != self.embedding_dim {
      return Err(IndexError::EmbeddingDimMismatch {
        expected: self.embedding_dim,
        got: vector.len(),
      });
    }

    let embedding = Embedding {
      vector_id: doc.vector_id(),
      vector,
      metadata: EmbeddingMetadata::for_document(doc, &self.collection),
    };

    self
      .vector
      .upsert(&self.collection, &embedding)
      .await
      .map_err(|e| IndexError::VectorStoreUnavailable(e.to_string()))
  }

  /// Re-embed a single orphan Document (no Embedding yet). Used by `reconcile_once` and
  /// directly testable without going through `index()`'s insert path.
  pub async fn reembed(&self, doc: &etl_core::Document) -> Result<(), IndexError> {
    self.embed_and_upsert(doc).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn error_kinds_map_to_taxonomy() {
    assert_eq!(IndexError::DbUnavailable("x".into()).kind(), ErrorKind::DbUnavailable);
    assert_eq!(
      IndexError::EmbeddingDimMismatch { expected: 384, got: 256 }.kind(),
      ErrorKind::Validation
    );
    assert_eq!(
      IndexError::VectorStoreUnavailable("x".into()).kind(),
      ErrorKind::VectorStoreUnavailable
    );
  }
}
