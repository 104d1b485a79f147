//! `RelationalStore::insert`/`get_by_doc_id` (§4.4, §6): the composite-key idempotent upsert
//! that implements I1, and the read path the Query Service uses to hydrate search hits.

use crate::connection::{RelationalStore, Result};
use chrono::{DateTime, Utc};
use etl_core::{AttachmentType, Document};
use sqlx::Row;
use tracing::warn;

/// Outcome of [`RelationalStore::insert`]: whether a new row was created, or an existing
/// row at the same `(lot_id, file_name)` key was kept in place untouched (I1).
#[derive(Debug, Clone)]
pub enum InsertOutcome {
  Inserted(Document),
  DuplicateKept(Document),
}

impl InsertOutcome {
  pub fn document(&self) -> &Document {
    match self {
      InsertOutcome::Inserted(d) | InsertOutcome::DuplicateKept(d) => d,
    }
  }

  pub fn action(&self) -> etl_core::IngestAction {
    match self {
      InsertOutcome::Inserted(_) => etl_core::IngestAction::Inserted,
      InsertOutcome::DuplicateKept(_) => etl_core::IngestAction::DuplicateKept,
    }
  }
}

fn row_to_document(
  id: i64,
  lot_id: String,
  file_name: String,
  file_type: String,
  content: String,
  created_at: DateTime<Utc>,
) -> Document {
  Document {
    doc_id: id,
    lot_id,
    file_name,
    file_type: if file_type == "zip" { AttachmentType::Zip } else { AttachmentType::Pdf },
    content,
    created_at,
  }
}

impl RelationalStore {
  /// §4.4 step 1: attempt `INSERT ... ON CONFLICT (lot_id, file_name) DO NOTHING`, then read
  /// back the row under the same key. Content is byte-exact-compared after trim; I1 never
  /// overwrites an existing row regardless of whether the content matches.
  pub async fn insert(
    &self,
    lot_id: &str,
    file_name: &str,
    file_type: AttachmentType,
    content: &str,
    extraction_mode: etl_core::ExtractionMode,
  ) -> Result<InsertOutcome> {
    let trimmed = content.trim();
    let mut tx = self.pool.begin().await?;

    let inserted = sqlx::query(
      "INSERT INTO etl_documents (lot_id, file_name, file_type, content, extraction_mode)
       VALUES ($1, $2, $3, $4, $5)
       ON CONFLICT (lot_id, file_name) DO NOTHING
       RETURNING id, lot_id, file_name, file_type, content, created_at",
    )
    .bind(lot_id)
    .bind(file_name)
    .bind(file_type.as_str())
    .bind(trimmed)
    .bind(extraction_mode.as_str())
    .fetch_optional(&mut *tx)
    .await?;

    let outcome = if let Some(row) = inserted {
      let doc = row_to_document(
        row.get("id"),
        row.get("lot_id"),
        row.get("file_name"),
        row.get("file_type"),
        row.get("content"),
        row.get("created_at"),
      );
      InsertOutcome::Inserted(doc)
    } else {
      let row = sqlx::query(
        "SELECT id, lot_id, file_name, file_type, content, created_at
         FROM etl_documents WHERE lot_id = $1 AND file_name = $2",
      )
      .bind(lot_id)
      .bind(file_name)
      .fetch_one(&mut *tx)
      .await?;
      let doc = row_to_document(
        row.get("id"),
        row.get("lot_id"),
        row.get("file_name"),
        row.get("file_type"),
        row.get("content"),
        row.get("created_at"),
      );
      if !content_matches(&doc.content, trimmed) {
        warn!(
          "duplicate_kept for ({lot_id}, {file_name}): stored content differs from re-extracted content, stored row wins (I1)"
        );
      }
      InsertOutcome::DuplicateKept(doc)
    };

    tx.commit().await?;
    Ok(outcome)
  }

  pub async fn get_by_doc_id(&self, doc_id: i64) -> Result<Option<Document>> {
    let row = sqlx::query(
      "SELECT id, lot_id, file_name, file_type, content, created_at FROM etl_documents WHERE id = $1",
    )
    .bind(doc_id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(row.map(|row| {
      row_to_document(
        row.get("id"),
        row.get("lot_id"),
        row.get("file_name"),
        row.get("file_type"),
        row.get("content"),
        row.get("created_at"),
      )
    }))
  }

  pub async fn get_by_key(&self, lot_id: &str, file_name: &str) -> Result<Option<Document>> {
    let row = sqlx::query(
      "SELECT id, lot_id, file_name, file_type, content, created_at
       FROM etl_documents WHERE lot_id = $1 AND file_name = $2",
    )
    .bind(lot_id)
    .bind(file_name)
    .fetch_optional(&self.pool)
    .await?;

    Ok(row.map(|row| {
      row_to_document(
        row.get("id"),
        row.get("lot_id"),
        row.get("file_name"),
        row.get("file_type"),
        row.get("content"),
        row.get("created_at"),
      )
    }))
  }

  /// All `doc_id`s currently in the relational store. Used by the orphan-reconciliation
  /// pass (§9) to diff against the vector store's known ids.
  pub async fn all_doc_ids(&self) -> Result<Vec<i64>> {
    let rows = sqlx::query("SELECT id FROM etl_documents ORDER BY id ASC")
      .fetch_all(&self.pool)
      .await?;
    Ok(rows.into_iter().map(|r| r.get("id")).collect())
  }

  /// Row count for a lot, used by tests asserting I1 holds across duplicate ingestion.
  pub async fn count_for_lot(&self, lot_id: &str) -> Result<i64> {
    let row = sqlx::query("SELECT count(*) as c FROM etl_documents WHERE lot_id = $1")
      .bind(lot_id)
      .fetch_one(&self.pool)
      .await?;
    Ok(row.get("c"))
  }
}

/// Whether two content strings are byte-exact equal after trimming, per I1's duplicate
/// comparison rule.
pub fn content_matches(existing: &str, new_content: &str) -> bool {
  existing.trim() == new_content.trim()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn content_matches_ignores_surrounding_whitespace() {
    assert!(content_matches("hello\n", "  hello  "));
    assert!(!content_matches("hello", "goodbye"));
  }
}
