//! The `LotFeed` external collaborator (§6): `Fetch(since, limit) -> list<Lot>`. Modeled the
//! same "trait + real HTTP impl + in-memory test double" way as the `Embedder`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use etl_core::{ErrorKind, Lot};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LotFeedError {
  #[error("lot feed unavailable: {0}")]
  Unavailable(String),
  #[error("lot feed rejected credentials")]
  AuthRejected,
}

impl LotFeedError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      LotFeedError::Unavailable(_) => ErrorKind::Network,
      LotFeedError::AuthRejected => ErrorKind::Validation,
    }
  }
}

#[async_trait]
pub trait LotFeed: Send + Sync {
  async fn fetch(&self, since: Option<DateTime<Utc>>, limit: usize) -> Result<Vec<Lot>, LotFeedError>;
}

#[derive(Debug, Deserialize)]
struct LotFeedResponse {
  lots: Vec<Lot>,
}

/// `reqwest`-based implementation pointed at `lot_feed_url`, bearer-style `lot_feed_auth`.
pub struct HttpLotFeed {
  client: reqwest::Client,
  base_url: String,
  auth: Option<String>,
  timeout: Duration,
}

impl HttpLotFeed {
  pub fn new(base_url: impl Into<String>, auth: Option<String>, timeout: Duration) -> Self {
    Self {
      client: reqwest::Client::new(),
      base_url: base_url.into(),
      auth,
      timeout,
    }
  }

  fn lots_url(&self) -> String {
    format!("{}/lots", self.base_url.trim_end_matches('/'))
  }
}

#[async_trait]
impl LotFeed for HttpLotFeed {
  async fn fetch(&self, since: Option<DateTime<Utc>>, limit: usize) -> Result<Vec<Lot>, LotFeedError> {
    debug!("fetching up to {} lots since={:?} from {}", limit, since, self.base_url);

    let mut request = self.client.get(self.lots_url()).timeout(self.timeout).query(&[("limit", limit)]);
    if let Some(since) = since {
      request = request.query(&[("since", since.to_rfc3339())]);
    }
    if let Some(auth) = &self.auth {
      if !auth.is_empty() {
        request = request.header("Authorization", format!("Bearer {auth}"));
      }
    }

    let response = request.send().await.map_err(|e| LotFeedError::Unavailable(e.to_string()))?;

    let status = response.status();
    if status.as_u16() == 401 || status.as_u16() == 403 {
      return Err(LotFeedError::AuthRejected);
    }
    if !status.is_success() {
      return Err(LotFeedError::Unavailable(format!("status {status}")));
    }

    let parsed: LotFeedResponse = response.json().await.map_err(|e| LotFeedError::Unavailable(e.to_string()))?;
    Ok(parsed.lots)
  }
}

/// In-memory test double returning a fixed list, optionally filtered by `limit`.
pub struct StaticLotFeed {
  lots: Vec<Lot>,
}

impl StaticLotFeed {
  pub fn new(lots: Vec<Lot>) -> Self {
    Self { lots }
  }
}

#[async_trait]
impl LotFeed for StaticLotFeed {
  async fn fetch(&self, _since: Option<DateTime<Utc>>, limit: usize) -> Result<Vec<Lot>, LotFeedError> {
    Ok(self.lots.iter().take(limit).cloned().collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use etl_core::Lot;

  fn lot(id: &str) -> Lot {
    Lot {
      lot_id: id.into(),
      title: "title".into(),
      description: String::new(),
      amount: "0".into(),
      customer_bin: "123456789012".into(),
      attachment_refs: vec![],
    }
  }

  #[tokio::test]
  async fn static_feed_respects_limit() {
    let feed = StaticLotFeed::new(vec![lot("1"), lot("2"), lot("3")]);
    let lots = feed.fetch(None, 2).await.unwrap();
    assert_eq!(lots.len(), 2);
    assert_eq!(lots[0].lot_id, "1");
  }

  #[test]
  fn lots_url_trims_trailing_slash() {
    let feed = HttpLotFeed::new("http://localhost:8082/", None, Duration::from_secs(5));
    assert_eq!(feed.lots_url(), "http://localhost:8082/lots");
  }
}
