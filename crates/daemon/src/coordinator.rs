//! Ingestion Coordinator (§4.6): drives one `RunBatch` call end-to-end, from lot feed to
//! `BatchReport`, appending an `import_logs` audit row when it's done.

use crate::lot_feed::{LotFeed, LotFeedError};
use crate::pool::{PoolDeps, WorkerPool};
use chrono::{DateTime, Utc};
use db::RelationalStore;
use etl_core::{BatchReport, IngestJob};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum CoordinatorError {
  #[error("lot feed unavailable: {0}")]
  LotFeedUnavailable(String),
}

impl CoordinatorError {
  pub fn kind(&self) -> etl_core::ErrorKind {
    etl_core::ErrorKind::Network
  }
}

impl From<LotFeedError> for CoordinatorError {
  fn from(e: LotFeedError) -> Self {
    CoordinatorError::LotFeedUnavailable(e.to_string())
  }
}

pub struct Coordinator {
  lot_feed: Arc<dyn LotFeed>,
  relational: Arc<RelationalStore>,
  max_workers: usize,
  queue_capacity: usize,
  pool_deps: PoolDeps,
}

impl Coordinator {
  pub fn new(
    lot_feed: Arc<dyn LotFeed>,
    relational: Arc<RelationalStore>,
    max_workers: usize,
    queue_capacity: usize,
    pool_deps: PoolDeps,
  ) -> Self {
    Self {
      lot_feed,
      relational,
      max_workers,
      queue_capacity,
      pool_deps,
    }
  }

  /// §4.6 algorithm. Only raises when the initial `LotFeed.Fetch` itself fails; every
  /// downstream job failure is aggregated into `failures_by_kind` instead.
  pub async fn run_batch(
    &self,
    keywords: Vec<String>,
    max_lots: usize,
    since: Option<DateTime<Utc>>,
  ) -> Result<BatchReport, CoordinatorError> {
    let started_at = Utc::now();
    let mut report = BatchReport::new();

    let lots = self.lot_feed.fetch(since, max_lots).await?;
    report.lots_fetched = lots.len() as u64;

    let matched: Vec<_> = lots.into_iter().filter(|lot| lot.matches_keywords(&keywords)).collect();
    report.lots_matched = matched.len() as u64;

    let pool = WorkerPool::spawn(self.max_workers, self.queue_capacity, self.pool_deps.clone());

    for lot in &matched {
      for attachment in &lot.attachment_refs {
        report.attachments_enqueued += 1;
        pool.enqueue(IngestJob::new(lot.lot_id.clone(), attachment.clone())).await;
      }
    }

    let job_result = pool.drain().await;
    report.documents_inserted = job_result.documents_inserted;
    report.documents_duplicate = job_result.documents_duplicate;
    report.failures_by_kind = job_result.failures_by_kind;

    let finished_at = Utc::now();
    info!(
      "batch {} complete: fetched={} matched={} enqueued={} inserted={} duplicate={}",
      report.batch_id, report.lots_fetched, report.lots_matched, report.attachments_enqueued, report.documents_inserted, report.documents_duplicate
    );

    if let Err(e) = self.relational.append_import_log(report.batch_id, started_at, finished_at, &report).await {
      warn!("failed to append import_logs row for batch {}: {}", report.batch_id, e);
    }

    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lot_feed_error_maps_to_network_kind() {
    let err = CoordinatorError::from(LotFeedError::Unavailable("refused".into()));
    assert_eq!(err.kind(), etl_core::ErrorKind::Network);
  }
}
