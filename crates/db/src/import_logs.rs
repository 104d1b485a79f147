//! Append-only batch audit trail (§6, §4.6): one row per `RunBatch` call, written by the
//! Coordinator after it aggregates the `BatchReport`.

use crate::connection::{RelationalStore, Result};
use chrono::{DateTime, Utc};
use etl_core::BatchReport;
use uuid::Uuid;

impl RelationalStore {
  pub async fn append_import_log(
    &self,
    batch_id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    report: &BatchReport,
  ) -> Result<()> {
    let report_json = serde_json::to_value(report)?;
    sqlx::query(
      "INSERT INTO import_logs (batch_id, started_at, finished_at, report_json) VALUES ($1, $2, $3, $4)",
    )
    .bind(batch_id)
    .bind(started_at)
    .bind(finished_at)
    .bind(report_json)
    .execute(&self.pool)
    .await?;
    Ok(())
  }
}
