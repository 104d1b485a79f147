//! `RelationalStore` connection handling: a pooled `sqlx::PgPool` plus the embedded-migration
//! startup sequence (§6). Generalizes the teacher lineage's "pool-holder struct with a
//! `*Error` enum and `default_*_dir` env-precedence helpers" idiom from an embedded LanceDB
//! connection to a networked Postgres pool.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum DbError {
  #[error("postgres error: {0}")]
  Sqlx(#[from] sqlx::Error),
  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
  #[error("database unavailable: {0}")]
  Unavailable(String),
  #[error("not found: {0}")]
  NotFound(String),
}

impl DbError {
  /// Classification into the shared §7 error taxonomy. Every failure this store can raise
  /// is, from the worker pool's point of view, a `db_unavailable` the retry policy can act
  /// on; connection-pool exhaustion, timeouts, and transport errors all collapse to it.
  pub fn kind(&self) -> etl_core::ErrorKind {
    etl_core::ErrorKind::DbUnavailable
  }
}

pub type Result<T> = std::result::Result<T, DbError>;

/// `RelationalStore`: a pooled Postgres connection plus the migration runner. Pool size is
/// `max_workers + 2` per §5's shared-resource policy; callers compute that and pass it in,
/// this module doesn't know about worker counts.
#[derive(Clone)]
pub struct RelationalStore {
  pub(crate) pool: PgPool,
}

impl RelationalStore {
  /// Connect to `dsn` with `pool_size` connections, then apply embedded migrations.
  pub async fn connect(dsn: &str, pool_size: u32, timeout: Duration) -> Result<Self> {
    info!("connecting to relational store, pool_size={pool_size}");
    let pool = PgPoolOptions::new()
      .max_connections(pool_size)
      .acquire_timeout(timeout)
      .connect(dsn)
      .await
      .map_err(|e| DbError::Unavailable(e.to_string()))?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(Self { pool })
  }

  /// Construct directly from an already-open pool, skipping migrations (used by tests that
  /// manage their own schema, or by callers that already ran migrations elsewhere).
  pub fn from_pool(pool: PgPool) -> Self {
    Self { pool }
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }

  /// Cheap reachability probe for `GET /health`.
  pub async fn is_reachable(&self) -> bool {
    sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
  }
}

/// Connection pool size per §5: one per worker plus headroom for the Coordinator's
/// `import_logs` append and the Query Service's own connections.
pub fn pool_size_for_workers(max_workers: usize) -> u32 {
  (max_workers as u32).saturating_add(2)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pool_size_adds_headroom() {
    assert_eq!(pool_size_for_workers(4), 6);
    assert_eq!(pool_size_for_workers(1), 3);
  }

  #[test]
  fn error_kind_is_db_unavailable() {
    assert_eq!(
      DbError::Unavailable("refused".into()).kind(),
      etl_core::ErrorKind::DbUnavailable
    );
  }
}
