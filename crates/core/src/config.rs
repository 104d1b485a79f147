//! Configuration system for the ETL core.
//!
//! Precedence: explicit `ETL_*` environment variable > value in the loaded TOML file >
//! built-in default. Config is read once at process start (see `daemon`/`cli`) and handed
//! down by `Arc`; nothing re-reads it at runtime.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A string that never prints its contents via `Debug`, so a `{:?}` of `EtlConfig` (which
/// ends up in logs on startup) can never leak `lot_feed_auth`.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Secret(pub String);

impl std::fmt::Debug for Secret {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    if self.0.is_empty() {
      write!(f, "<empty>")
    } else {
      write!(f, "<redacted>")
    }
  }
}

impl Secret {
  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl From<String> for Secret {
  fn from(s: String) -> Self {
    Self(s)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
  pub max_file_bytes: u64,
  pub fetch_timeout_sec: u64,
  pub ocr_timeout_sec: u64,
  pub ocr_languages: String,
  pub text_threshold_chars: usize,
  pub render_scale: f64,
  pub max_workers: usize,
  pub queue_capacity: usize,
  pub embedding_dim: usize,
  pub relational_dsn: String,
  pub vector_store_url: String,
  pub embedder_url: String,
  pub lot_feed_url: String,
  pub lot_feed_auth: Secret,
  pub collection_name: String,
  pub retries_max: u32,
  pub retry_backoff_base_ms: u64,
  pub retry_backoff_cap_ms: u64,
  pub retry_jitter_pct: u32,
  pub http_bind_addr: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub log_dir: Option<PathBuf>,
  pub db_timeout_sec: u64,
  pub embed_timeout_sec: u64,
  pub vector_timeout_sec: u64,
}

impl Default for EtlConfig {
  fn default() -> Self {
    Self {
      max_file_bytes: 50 * 1024 * 1024,
      fetch_timeout_sec: 60,
      ocr_timeout_sec: 120,
      ocr_languages: "rus+eng".to_string(),
      text_threshold_chars: 200,
      render_scale: 2.0,
      max_workers: 4,
      queue_capacity: 256,
      embedding_dim: 384,
      relational_dsn: "postgres://localhost/zakupai_etl".to_string(),
      vector_store_url: "http://localhost:6333".to_string(),
      embedder_url: "http://localhost:8081".to_string(),
      lot_feed_url: "http://localhost:8082".to_string(),
      lot_feed_auth: Secret::default(),
      collection_name: "etl_documents".to_string(),
      retries_max: 2,
      retry_backoff_base_ms: 500,
      retry_backoff_cap_ms: 8_000,
      retry_jitter_pct: 20,
      http_bind_addr: "0.0.0.0:8080".to_string(),
      log_dir: None,
      db_timeout_sec: 10,
      embed_timeout_sec: 30,
      vector_timeout_sec: 10,
    }
  }
}

impl EtlConfig {
  /// Load from an optional TOML file, then apply `ETL_*` environment overrides.
  pub fn load(path: Option<&Path>) -> Self {
    let mut config = match path {
      Some(p) if p.exists() => std::fs::read_to_string(p)
        .ok()
        .and_then(|content| toml::from_str(&content).ok())
        .unwrap_or_default(),
      _ => Self::default(),
    };
    config.apply_env_overrides();
    config
  }

  /// Default user-level config file path, following the `XDG_CONFIG_HOME` / platform-default
  /// precedence used elsewhere in this crate's dependency on `dirs`.
  pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("ETL_CONFIG_DIR") {
      return Some(PathBuf::from(path).join("config.toml"));
    }
    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join("zakupai-etl").join("config.toml"));
    }
    dirs::config_dir().map(|p| p.join("zakupai-etl").join("config.toml"))
  }

  fn apply_env_overrides(&mut self) {
    macro_rules! env_u64 {
      ($field:expr, $name:expr) => {
        if let Ok(v) = std::env::var($name) {
          if let Ok(parsed) = v.parse() {
            $field = parsed;
          }
        }
      };
    }

    env_u64!(self.max_file_bytes, "ETL_MAX_FILE_BYTES");
    env_u64!(self.fetch_timeout_sec, "ETL_FETCH_TIMEOUT_SEC");
    env_u64!(self.ocr_timeout_sec, "ETL_OCR_TIMEOUT_SEC");
    env_u64!(self.text_threshold_chars, "ETL_TEXT_THRESHOLD_CHARS");
    env_u64!(self.max_workers, "ETL_MAX_WORKERS");
    env_u64!(self.queue_capacity, "ETL_QUEUE_CAPACITY");
    env_u64!(self.embedding_dim, "ETL_EMBEDDING_DIM");
    env_u64!(self.retries_max, "ETL_RETRIES_MAX");
    env_u64!(self.retry_backoff_base_ms, "ETL_RETRY_BACKOFF_BASE_MS");
    env_u64!(self.retry_backoff_cap_ms, "ETL_RETRY_BACKOFF_CAP_MS");
    env_u64!(self.retry_jitter_pct, "ETL_RETRY_JITTER_PCT");
    env_u64!(self.db_timeout_sec, "ETL_DB_TIMEOUT_SEC");
    env_u64!(self.embed_timeout_sec, "ETL_EMBED_TIMEOUT_SEC");
    env_u64!(self.vector_timeout_sec, "ETL_VECTOR_TIMEOUT_SEC");

    if let Ok(v) = std::env::var("ETL_RENDER_SCALE") {
      if let Ok(parsed) = v.parse() {
        self.render_scale = parsed;
      }
    }
    if let Ok(v) = std::env::var("ETL_OCR_LANGUAGES") {
      self.ocr_languages = v;
    }
    if let Ok(v) = std::env::var("ETL_RELATIONAL_DSN") {
      self.relational_dsn = v;
    }
    if let Ok(v) = std::env::var("ETL_VECTOR_STORE_URL") {
      self.vector_store_url = v;
    }
    if let Ok(v) = std::env::var("ETL_EMBEDDER_URL") {
      self.embedder_url = v;
    }
    if let Ok(v) = std::env::var("ETL_LOT_FEED_URL") {
      self.lot_feed_url = v;
    }
    if let Ok(v) = std::env::var("ETL_LOT_FEED_AUTH") {
      self.lot_feed_auth = Secret(v);
    }
    if let Ok(v) = std::env::var("ETL_COLLECTION_NAME") {
      self.collection_name = v;
    }
    if let Ok(v) = std::env::var("ETL_HTTP_BIND_ADDR") {
      self.http_bind_addr = v;
    }
    if let Ok(v) = std::env::var("ETL_LOG_DIR") {
      self.log_dir = Some(PathBuf::from(v));
    }
  }

  pub fn fetch_timeout(&self) -> std::time::Duration {
    std::time::Duration::from_secs(self.fetch_timeout_sec)
  }

  pub fn ocr_timeout(&self) -> std::time::Duration {
    std::time::Duration::from_secs(self.ocr_timeout_sec)
  }

  pub fn db_timeout(&self) -> std::time::Duration {
    std::time::Duration::from_secs(self.db_timeout_sec)
  }

  pub fn embed_timeout(&self) -> std::time::Duration {
    std::time::Duration::from_secs(self.embed_timeout_sec)
  }

  pub fn vector_timeout(&self) -> std::time::Duration {
    std::time::Duration::from_secs(self.vector_timeout_sec)
  }

  pub fn retry_config(&self) -> crate::retry::RetryConfig {
    crate::retry::RetryConfig {
      max_retries: self.retries_max,
      initial_backoff: std::time::Duration::from_millis(self.retry_backoff_base_ms),
      max_backoff: std::time::Duration::from_millis(self.retry_backoff_cap_ms),
      backoff_multiplier: 2.0,
      jitter_pct: self.retry_jitter_pct as f64 / 100.0,
    }
  }

  /// Max archive-bomb declared-uncompressed-size threshold (§4.2): `max_file_bytes * 10`.
  pub fn archive_bomb_threshold(&self) -> u64 {
    self.max_file_bytes.saturating_mul(10)
  }

  /// Commented default TOML, written by `zakupai-etl config init`.
  pub fn generate_template() -> String {
    r#"# zakupai-etl configuration
# Every key here can also be set via an ETL_<UPPER_SNAKE_CASE> environment variable,
# which takes precedence over this file.

max_file_bytes = 52428800       # 50 MiB
fetch_timeout_sec = 60
ocr_timeout_sec = 120
ocr_languages = "rus+eng"
text_threshold_chars = 200
render_scale = 2.0
max_workers = 4
queue_capacity = 256
embedding_dim = 384

relational_dsn = "postgres://localhost/zakupai_etl"
vector_store_url = "http://localhost:6333"
embedder_url = "http://localhost:8081"
lot_feed_url = "http://localhost:8082"
# lot_feed_auth = "..."        # prefer ETL_LOT_FEED_AUTH in the environment instead

collection_name = "etl_documents"

retries_max = 2
retry_backoff_base_ms = 500
retry_backoff_cap_ms = 8000
retry_jitter_pct = 20

http_bind_addr = "0.0.0.0:8080"
# log_dir = "/var/log/zakupai-etl"

db_timeout_sec = 10
embed_timeout_sec = 30
vector_timeout_sec = 10
"#
    .to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn defaults_match_spec() {
    let config = EtlConfig::default();
    assert_eq!(config.max_file_bytes, 50 * 1024 * 1024);
    assert_eq!(config.fetch_timeout_sec, 60);
    assert_eq!(config.ocr_timeout_sec, 120);
    assert_eq!(config.text_threshold_chars, 200);
    assert_eq!(config.render_scale, 2.0);
    assert_eq!(config.max_workers, 4);
    assert_eq!(config.queue_capacity, 256);
    assert_eq!(config.embedding_dim, 384);
    assert_eq!(config.retries_max, 2);
  }

  #[test]
  fn secret_debug_is_redacted() {
    let secret = Secret("super-sensitive-token".to_string());
    let rendered = format!("{:?}", secret);
    assert!(!rendered.contains("super-sensitive-token"));
    assert_eq!(rendered, "<redacted>");
  }

  #[test]
  fn toml_roundtrip() {
    let config = EtlConfig {
      max_workers: 8,
      ..Default::default()
    };
    let toml_str = toml::to_string_pretty(&config).unwrap();
    let parsed: EtlConfig = toml::from_str(&toml_str).unwrap();
    assert_eq!(parsed.max_workers, 8);
  }

  #[test]
  fn env_override_takes_precedence_over_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "max_workers = 2\n").unwrap();

    unsafe {
      std::env::set_var("ETL_MAX_WORKERS", "16");
    }
    let config = EtlConfig::load(Some(&path));
    unsafe {
      std::env::remove_var("ETL_MAX_WORKERS");
    }

    assert_eq!(config.max_workers, 16);
  }

  #[test]
  fn load_missing_file_falls_back_to_default() {
    let config = EtlConfig::load(Some(Path::new("/nonexistent/path/config.toml")));
    assert_eq!(config.max_workers, EtlConfig::default().max_workers);
  }

  #[test]
  fn archive_bomb_threshold_is_ten_times_cap() {
    let config = EtlConfig::default();
    assert_eq!(config.archive_bomb_threshold(), config.max_file_bytes * 10);
  }

  #[test]
  fn retry_config_matches_policy_fields() {
    let config = EtlConfig::default();
    let retry = config.retry_config();
    assert_eq!(retry.max_retries, 2);
    assert_eq!(retry.initial_backoff, std::time::Duration::from_millis(500));
    assert_eq!(retry.max_backoff, std::time::Duration::from_millis(8000));
  }

  #[test]
  fn generate_template_contains_every_key() {
    let template = EtlConfig::generate_template();
    assert!(template.contains("max_file_bytes"));
    assert!(template.contains("relational_dsn"));
    assert!(template.contains("retries_max"));
  }
}
