//! Worker Pool (§4.5): bounded-concurrency executor driving Fetcher -> Unpacker -> Extractor
//! -> Indexer per `IngestJob`. Built on a bounded `tokio::sync::mpsc` channel for the job
//! queue and a `tokio::sync::broadcast` channel for the cooperative stop signal, the same
//! primitive the shutdown-handle idiom elsewhere in this core uses.

use async_trait::async_trait;
use db::{RelationalStore, VectorStore};
use embedding::EmbeddingProvider;
use etl_core::{AttachmentType, ErrorKind, IngestJob, JobStatus};
use extract::ocr::OcrEngine;
use extract::Extractor;
use fetch::{FetchError, Fetcher, UnpackError, Unpacker};
use index::{IndexError, Indexer};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-job status transitions, published to a [`JobSink`]. Default is a no-op; tests
/// substitute a recording sink (§4.5 observability hooks).
#[async_trait]
pub trait JobSink: Send + Sync {
  async fn on_transition(&self, job_id: Uuid, status: JobStatus);
}

pub struct NoopSink;

#[async_trait]
impl JobSink for NoopSink {
  async fn on_transition(&self, _job_id: Uuid, _status: JobStatus) {}
}

/// Aggregated outcome of one `IngestJob`, folded into the Coordinator's `BatchReport`.
#[derive(Debug, Clone, Default)]
pub struct JobResult {
  pub documents_inserted: u64,
  pub documents_duplicate: u64,
  pub failures_by_kind: HashMap<String, u64>,
}

impl JobResult {
  fn record_failure(&mut self, kind: ErrorKind) {
    *self.failures_by_kind.entry(kind.as_str().to_string()).or_insert(0) += 1;
  }

  fn merge(&mut self, other: JobResult) {
    self.documents_inserted += other.documents_inserted;
    self.documents_duplicate += other.documents_duplicate;
    for (kind, count) in other.failures_by_kind {
      *self.failures_by_kind.entry(kind).or_insert(0) += count;
    }
  }
}

#[derive(Debug, thiserror::Error)]
enum PipelineError {
  #[error(transparent)]
  Fetch(#[from] FetchError),
  #[error(transparent)]
  Unpack(#[from] UnpackError),
  #[error(transparent)]
  Extract(#[from] extract::ExtractError),
  #[error(transparent)]
  Index(#[from] IndexError),
  #[error("cancelled")]
  Cancelled,
}

impl PipelineError {
  fn kind(&self) -> ErrorKind {
    match self {
      PipelineError::Fetch(e) => e.kind(),
      PipelineError::Unpack(e) => e.kind(),
      PipelineError::Extract(e) => e.kind(),
      PipelineError::Index(e) => e.kind(),
      PipelineError::Cancelled => ErrorKind::Cancelled,
    }
  }
}

/// Shared adapters + policy every worker needs. Constructed once by the Coordinator and
/// cloned (cheaply, behind `Arc`s) into each spawned task.
#[derive(Clone)]
pub struct PoolDeps {
  pub fetcher: Fetcher,
  pub unpacker: Unpacker,
  pub ocr_engine: Arc<dyn OcrEngine>,
  pub indexer: Arc<Indexer>,
  pub text_threshold_chars: usize,
  pub render_scale: f64,
  pub ocr_languages: String,
  pub retry_config: etl_core::retry::RetryConfig,
  pub sink: Arc<dyn JobSink>,
  pub lot_feed_auth: Option<String>,
}

pub struct WorkerPool {
  job_tx: mpsc::Sender<IngestJob>,
  stop_tx: broadcast::Sender<()>,
  cancelled: Arc<AtomicBool>,
  workers: Vec<JoinHandle<JobResult>>,
}

impl WorkerPool {
  /// Spawns `max_workers` tasks sharing one `mpsc::Receiver` behind a `Mutex`, per §4.5's
  /// internals note. `queue_capacity` gives the "enqueue blocks once full" semantics for free.
  pub fn spawn(max_workers: usize, queue_capacity: usize, deps: PoolDeps) -> Self {
    let (job_tx, job_rx) = mpsc::channel(queue_capacity);
    let (stop_tx, _) = broadcast::channel(1);
    let job_rx = Arc::new(Mutex::new(job_rx));
    let cancelled = Arc::new(AtomicBool::new(false));

    let workers = (0..max_workers.max(1))
      .map(|_| {
        let job_rx = job_rx.clone();
        let stop_rx = stop_tx.subscribe();
        let deps = deps.clone();
        let cancelled = cancelled.clone();
        tokio::spawn(worker_loop(job_rx, stop_rx, cancelled, deps))
      })
      .collect();

    Self { job_tx, stop_tx, cancelled, workers }
  }

  /// Blocks the caller once `queue_capacity` is reached, per §4.5's enqueue contract.
  pub async fn enqueue(&self, job: IngestJob) {
    if self.job_tx.send(job).await.is_err() {
      warn!("worker pool enqueue failed: all workers have exited");
    }
  }

  /// Cooperative stop: in addition to the broadcast signal that stops dequeueing, sets a
  /// shared flag that `run_job`/`process_unit` poll at each suspension point so the job
  /// currently in flight on each worker aborts with `cancelled` rather than running to
  /// completion (§5).
  pub fn stop(&self) {
    self.cancelled.store(true, Ordering::SeqCst);
    let _ = self.stop_tx.send(());
  }

  /// Closes the queue and waits for every worker to drain, merging their partial reports
  /// into one. Must be called after the last `enqueue`.
  pub async fn drain(self) -> JobResult {
    drop(self.job_tx);
    let mut total = JobResult::default();
    for handle in self.workers {
      match handle.await {
        Ok(partial) => total.merge(partial),
        Err(e) => warn!("worker task panicked: {e}"),
      }
    }
    total
  }
}

async fn worker_loop(
  job_rx: Arc<Mutex<mpsc::Receiver<IngestJob>>>,
  mut stop_rx: broadcast::Receiver<()>,
  cancelled: Arc<AtomicBool>,
  deps: PoolDeps,
) -> JobResult {
  let mut result = JobResult::default();

  loop {
    let job = {
      if stop_rx.try_recv().is_ok() {
        break;
      }
      let mut rx = job_rx.lock().await;
      tokio::select! {
        biased;
        _ = stop_rx.recv() => None,
        job = rx.recv() => job,
      }
    };

    let Some(job) = job else { break };
    run_job(job, &deps, &cancelled, &mut result).await;
  }

  result
}

/// Runs the full pipeline for one `IngestJob` (one `AttachmentRef`). For a ZIP, every
/// contained PDF is processed sequentially within this call to preserve I5 ordering and
/// keep the archive's decompression buffer local to one worker. A failure on one unit does
/// not abort the remaining units in the same job (I6's isolation extended to sub-job units).
///
/// `cancelled` is polled at each suspension point (fetch, unpack, per-unit extract, per-unit
/// index): once `WorkerPool::stop` sets it, the job in flight aborts with `cancelled` instead
/// of running to completion or being retried (§5).
async fn run_job(job: IngestJob, deps: &PoolDeps, cancelled: &Arc<AtomicBool>, result: &mut JobResult) {
  deps.sink.on_transition(job.job_id, JobStatus::Fetching).await;

  let units = match fetch_and_unpack(&job, deps, cancelled).await {
    Ok(units) => units,
    Err(e) => {
      warn!("job {} failed at fetch/unpack: {}", job.job_id, e);
      result.record_failure(e.kind());
      deps.sink.on_transition(job.job_id, JobStatus::Failed).await;
      return;
    }
  };

  let declared_zip = job.attachment_ref.declared_type == AttachmentType::Zip;

  for unit in units {
    if cancelled.load(Ordering::SeqCst) {
      warn!("job {} unit {} cancelled before start", job.job_id, unit.file_name);
      result.record_failure(ErrorKind::Cancelled);
      continue;
    }

    deps.sink.on_transition(job.job_id, JobStatus::Extracting).await;
    match process_unit(&job, &unit, declared_zip, deps, cancelled).await {
      Ok(outcome) => {
        match outcome.action {
          etl_core::IngestAction::Inserted => result.documents_inserted += 1,
          etl_core::IngestAction::DuplicateKept => result.documents_duplicate += 1,
        }
        debug!(
          "job {} unit {} -> doc_id={} action={:?} embedding_pending={}",
          job.job_id, unit.file_name, outcome.doc_id, outcome.action, outcome.embedding_pending
        );
      }
      Err(e) => {
        warn!("job {} unit {} failed: {}", job.job_id, unit.file_name, e);
        result.record_failure(e.kind());
      }
    }
  }

  deps.sink.on_transition(job.job_id, JobStatus::Done).await;
}

async fn fetch_and_unpack(
  job: &IngestJob,
  deps: &PoolDeps,
  cancelled: &Arc<AtomicBool>,
) -> Result<Vec<fetch::PdfUnit>, PipelineError> {
  let outcome = with_retry(&deps.retry_config, cancelled, || async {
    deps
      .fetcher
      .fetch(&job.attachment_ref.url, deps.lot_feed_auth.as_deref())
      .await
      .map_err(PipelineError::from)
  })
  .await?;

  if cancelled.load(Ordering::SeqCst) {
    return Err(PipelineError::Cancelled);
  }

  deps
    .unpacker
    .unpack(&outcome.bytes, &job.attachment_ref.declared_name)
    .map_err(PipelineError::from)
}

struct UnitOutcome {
  doc_id: i64,
  action: etl_core::IngestAction,
  embedding_pending: bool,
}

async fn process_unit(
  job: &IngestJob,
  unit: &fetch::PdfUnit,
  declared_zip: bool,
  deps: &PoolDeps,
  cancelled: &Arc<AtomicBool>,
) -> Result<UnitOutcome, PipelineError> {
  let file_type = if declared_zip { AttachmentType::Zip } else { AttachmentType::Pdf };

  let extracted = with_retry(&deps.retry_config, cancelled, || async {
    let extractor = Extractor::new(
      deps.ocr_engine.as_ref(),
      deps.text_threshold_chars,
      deps.render_scale,
      deps.ocr_languages.clone(),
    );
    extractor.extract(&unit.pdf_bytes).await.map_err(PipelineError::from)
  })
  .await?;

  if cancelled.load(Ordering::SeqCst) {
    return Err(PipelineError::Cancelled);
  }

  deps.sink.on_transition(job.job_id, JobStatus::Indexing).await;

  let outcome = with_retry(&deps.retry_config, cancelled, || async {
    deps
      .indexer
      .index(
        &job.lot_id,
        &unit.file_name,
        file_type,
        &extracted.text,
        extracted.extraction_mode,
      )
      .await
      .map_err(PipelineError::from)
  })
  .await?;

  Ok(UnitOutcome {
    doc_id: outcome.doc_id,
    action: outcome.action,
    embedding_pending: outcome.embedding_pending,
  })
}

/// Retries `f` up to `config.max_retries` times when the error kind is retriable (§7),
/// sleeping for the configured backoff between attempts. Checks `cancelled` before each
/// attempt so a stop requested mid-backoff short-circuits into `Cancelled` rather than
/// firing another retry (§5: cancelled jobs are not retried).
async fn with_retry<T, F, Fut>(
  config: &etl_core::retry::RetryConfig,
  cancelled: &Arc<AtomicBool>,
  mut f: F,
) -> Result<T, PipelineError>
where
  F: FnMut() -> Fut,
  Fut: std::future::Future<Output = Result<T, PipelineError>>,
{
  let mut attempt = 0;
  loop {
    if cancelled.load(Ordering::SeqCst) {
      return Err(PipelineError::Cancelled);
    }
    match f().await {
      Ok(v) => return Ok(v),
      Err(e) if e.kind().is_retriable() && attempt < config.max_retries => {
        let backoff = config.backoff_for_attempt(attempt);
        warn!("retriable error ({}), attempt {}: {}", e.kind(), attempt + 1, e);
        tokio::time::sleep(backoff).await;
        attempt += 1;
      }
      Err(e) => return Err(e),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use etl_core::AttachmentRef;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct CountingSink {
    count: AtomicUsize,
  }

  #[async_trait]
  impl JobSink for CountingSink {
    async fn on_transition(&self, _job_id: Uuid, _status: JobStatus) {
      self.count.fetch_add(1, Ordering::SeqCst);
    }
  }

  #[test]
  fn job_result_merges_failure_counts() {
    let mut a = JobResult::default();
    a.record_failure(ErrorKind::Timeout);
    let mut b = JobResult::default();
    b.record_failure(ErrorKind::Timeout);
    a.merge(b);
    assert_eq!(a.failures_by_kind.get("timeout"), Some(&2));
  }

  #[tokio::test]
  async fn pool_enqueues_and_drains_with_no_jobs() {
    let sink = Arc::new(NoopSink);
    let deps = PoolDeps {
      fetcher: Fetcher::new(),
      unpacker: Unpacker::new(1024 * 1024),
      ocr_engine: Arc::new(extract::ocr::NullOcrEngine),
      indexer: Arc::new(unreachable_indexer()),
      text_threshold_chars: 200,
      render_scale: 2.0,
      ocr_languages: "eng".into(),
      retry_config: etl_core::retry::RetryConfig::default(),
      sink,
      lot_feed_auth: None,
    };
    let pool = WorkerPool::spawn(2, 8, deps);
    let result = pool.drain().await;
    assert_eq!(result.documents_inserted, 0);
  }

  // Never actually called: no jobs are enqueued in the test above, so the pool's workers
  // never touch the relational/vector store. `connect_lazy` avoids a real connection attempt.
  fn unreachable_indexer() -> Indexer {
    let pool = sqlx::postgres::PgPoolOptions::new()
      .connect_lazy("postgres://localhost/nonexistent")
      .expect("lazy pool construction never fails");
    let relational = Arc::new(RelationalStore::from_pool(pool));
    let vector = Arc::new(VectorStore::new("http://127.0.0.1:1", std::time::Duration::from_millis(50)));
    let embedder: Arc<dyn EmbeddingProvider> =
      Arc::new(embedding::HttpEmbeddingProvider::new("http://127.0.0.1:1", 384, std::time::Duration::from_millis(50)));
    Indexer::new(relational, vector, embedder, 384, "test_collection")
  }

  #[test]
  fn attachment_ref_declared_type_round_trips() {
    let attachment = AttachmentRef {
      url: "http://example.invalid/a.zip".into(),
      declared_name: "a.zip".into(),
      declared_type: AttachmentType::Zip,
    };
    assert_eq!(attachment.declared_type, AttachmentType::Zip);
  }

  #[allow(dead_code)]
  fn sink_type_check() -> Arc<dyn JobSink> {
    Arc::new(CountingSink { count: AtomicUsize::new(0) })
  }
}
