//! Orphan-reconciliation pass (§9, §4.4): Documents persisted without a matching Embedding
//! (the VectorStore upsert failed after the relational insert succeeded). Implemented as an
//! explicit, operator-invoked pass rather than an always-on background loop — the `reconcile`
//! CLI subcommand calls this once and prints the summary.

use crate::indexer::Indexer;
use db::RelationalStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
  pub documents_checked: u64,
  pub orphans_found: u64,
  pub orphans_reembedded: u64,
  pub orphans_failed: u64,
}

/// Scans every `doc_id` in the relational store, checks whether its vector exists, and
/// re-embeds any that don't. One pass; the caller decides whether/when to run it again.
pub async fn reconcile_once(
  relational: &Arc<RelationalStore>,
  vector: &db::VectorStore,
  collection: &str,
  indexer: &Indexer,
) -> Result<ReconcileReport, db::DbError> {
  let doc_ids = relational.all_doc_ids().await?;
  let mut report = ReconcileReport::default();

  for doc_id in doc_ids {
    report.documents_checked += 1;

    let vector_id = etl_core::vector_id_for(doc_id);
    let exists = match vector.exists(collection, &vector_id).await {
      Ok(exists) => exists,
      Err(e) => {
        warn!("reconcile: could not check vector existence for doc_id={doc_id}: {e}");
        continue;
      }
    };
    if exists {
      continue;
    }

    report.orphans_found += 1;
    let Some(doc) = relational.get_by_doc_id(doc_id).await? else {
      continue;
    };

    match indexer.reembed(&doc).await {
      Ok(()) => {
        info!("reconcile: re-embedded orphan doc_id={doc_id}");
        report.orphans_reembedded += 1;
      }
      Err(e) => {
        warn!("reconcile: failed to re-embed doc_id={doc_id}: {e}");
        report.orphans_failed += 1;
      }
    }
  }

  Ok(report)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn report_defaults_to_zero() {
    let report = ReconcileReport::default();
    assert_eq!(report.documents_checked, 0);
    assert_eq!(report.orphans_found, 0);
  }
}
