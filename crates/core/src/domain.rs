//! Core domain types shared across the ingestion pipeline and the query service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A procurement lot as emitted by the upstream `LotFeed`. Treated as an immutable snapshot:
/// nothing in this core ever mutates a `Lot` after it is read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lot {
  pub lot_id: String,
  pub title: String,
  pub description: String,
  /// Decimal amount, currency implied KZT; kept as a string to avoid float drift across
  /// the feed/store boundary (the core never performs arithmetic on it).
  pub amount: String,
  pub customer_bin: String,
  pub attachment_refs: Vec<AttachmentRef>,
}

impl Lot {
  /// Whether any of `keywords` is a case-insensitive substring of title or description.
  pub fn matches_keywords(&self, keywords: &[String]) -> bool {
    if keywords.is_empty() {
      return true;
    }
    let title = self.title.to_lowercase();
    let description = self.description.to_lowercase();
    keywords
      .iter()
      .any(|k| title.contains(k.as_str()) || description.contains(k.as_str()))
  }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentType {
  Pdf,
  Zip,
}

impl AttachmentType {
  pub fn as_str(&self) -> &'static str {
    match self {
      AttachmentType::Pdf => "pdf",
      AttachmentType::Zip => "zip",
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttachmentRef {
  pub url: String,
  pub declared_name: String,
  pub declared_type: AttachmentType,
}

/// Which path the Extractor took to produce a Document's content.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
  TextLayer,
  Ocr,
  Mixed,
}

impl ExtractionMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      ExtractionMode::TextLayer => "text_layer",
      ExtractionMode::Ocr => "ocr",
      ExtractionMode::Mixed => "mixed",
    }
  }
}

/// A persisted row in the relational store. `doc_id` is assigned by the store itself
/// (`serial` primary key); this type represents it after assignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
  pub doc_id: i64,
  pub lot_id: String,
  pub file_name: String,
  pub file_type: AttachmentType,
  pub content: String,
  pub created_at: DateTime<Utc>,
}

impl Document {
  /// First 240 chars of `content`, used as the `Search` response's `content_preview`.
  pub fn preview(&self) -> String {
    self.content.chars().take(240).collect()
  }

  /// The vector store id this document's embedding is stored under (I2 pairing key).
  pub fn vector_id(&self) -> String {
    vector_id_for(self.doc_id)
  }
}

/// Deterministic vector-store id derived from a relational row id, per §4.4 step 4.
pub fn vector_id_for(doc_id: i64) -> String {
  format!("etl_doc:{doc_id}")
}

/// Parse a `doc_id` back out of a `vector_id` produced by [`vector_id_for`]. Returns `None`
/// if the string isn't in the expected `"etl_doc:<id>"` shape.
pub fn doc_id_from_vector_id(vector_id: &str) -> Option<i64> {
  vector_id.strip_prefix("etl_doc:")?.parse().ok()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embedding {
  pub vector_id: String,
  pub vector: Vec<f32>,
  pub metadata: EmbeddingMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingMetadata {
  pub doc_id: i64,
  pub file_name: String,
  pub lot_id: String,
  pub source: String,
}

impl EmbeddingMetadata {
  pub fn for_document(doc: &Document, collection: &str) -> Self {
    Self {
      doc_id: doc.doc_id,
      file_name: doc.file_name.clone(),
      lot_id: doc.lot_id.clone(),
      source: collection.to_string(),
    }
  }
}

/// Outcome of an Indexer upsert: whether a new row was inserted, or the existing row
/// at the same `(lot_id, file_name)` key was kept in place (I1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IngestAction {
  Inserted,
  DuplicateKept,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
  Pending,
  Fetching,
  Extracting,
  Indexing,
  Done,
  Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestJob {
  pub job_id: Uuid,
  pub lot_id: String,
  pub attachment_ref: AttachmentRef,
  pub status: JobStatus,
  pub error_kind: Option<String>,
  pub started_at: Option<DateTime<Utc>>,
  pub finished_at: Option<DateTime<Utc>>,
}

impl IngestJob {
  pub fn new(lot_id: impl Into<String>, attachment_ref: AttachmentRef) -> Self {
    Self {
      job_id: Uuid::new_v4(),
      lot_id: lot_id.into(),
      attachment_ref,
      status: JobStatus::Pending,
      error_kind: None,
      started_at: None,
      finished_at: None,
    }
  }
}

/// Summary of one `RunBatch` call, aggregated across every enqueued `IngestJob`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchReport {
  pub batch_id: Uuid,
  pub lots_fetched: u64,
  pub lots_matched: u64,
  pub attachments_enqueued: u64,
  pub documents_inserted: u64,
  pub documents_duplicate: u64,
  pub failures_by_kind: HashMap<String, u64>,
}

impl BatchReport {
  pub fn new() -> Self {
    Self {
      batch_id: Uuid::new_v4(),
      ..Default::default()
    }
  }

  pub fn record_failure(&mut self, kind: &str) {
    *self.failures_by_kind.entry(kind.to_string()).or_insert(0) += 1;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lot_matches_keywords_case_insensitive() {
    let lot = Lot {
      lot_id: "1".into(),
      title: "Поставка Лаковых покрытий".into(),
      description: String::new(),
      amount: "1000".into(),
      customer_bin: "123456789012".into(),
      attachment_refs: vec![],
    };
    assert!(lot.matches_keywords(&["лаковых".into()]));
    assert!(!lot.matches_keywords(&["гвозди".into()]));
  }

  #[test]
  fn empty_keywords_match_everything() {
    let lot = Lot {
      lot_id: "1".into(),
      title: "anything".into(),
      description: String::new(),
      amount: "0".into(),
      customer_bin: "123456789012".into(),
      attachment_refs: vec![],
    };
    assert!(lot.matches_keywords(&[]));
  }

  #[test]
  fn vector_id_roundtrip() {
    let id = vector_id_for(42);
    assert_eq!(id, "etl_doc:42");
    assert_eq!(doc_id_from_vector_id(&id), Some(42));
  }

  #[test]
  fn doc_id_from_vector_id_rejects_garbage() {
    assert_eq!(doc_id_from_vector_id("not_a_vector_id"), None);
    assert_eq!(doc_id_from_vector_id("etl_doc:abc"), None);
  }

  #[test]
  fn batch_report_records_failures_by_kind() {
    let mut report = BatchReport::new();
    report.record_failure("too_large");
    report.record_failure("too_large");
    report.record_failure("timeout");
    assert_eq!(report.failures_by_kind.get("too_large"), Some(&2));
    assert_eq!(report.failures_by_kind.get("timeout"), Some(&1));
  }
}
