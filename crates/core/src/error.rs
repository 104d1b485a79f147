use thiserror::Error;

/// Closed classification of every failure the ETL core can produce, independent of which
/// crate raised it. The worker pool's retry policy and the HTTP layer's status-code mapping
/// both dispatch on this instead of matching on individual crate error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  Validation,
  TooLarge,
  UnsupportedType,
  Network,
  Timeout,
  HttpStatus,
  HttpStatusClient,
  CorruptArchive,
  ArchiveBomb,
  UnreadablePdf,
  EmptyAfterOcr,
  OcrFailed,
  EmbedUnavailable,
  VectorStoreUnavailable,
  DbUnavailable,
  Cancelled,
}

impl ErrorKind {
  /// Whether the worker pool should retry an error of this kind (§7 taxonomy). `HttpStatus`
  /// (5xx upstream) is retriable; `HttpStatusClient` (4xx upstream) is not — a 404/403 on an
  /// attachment URL will not succeed on a second attempt.
  pub fn is_retriable(&self) -> bool {
    matches!(
      self,
      ErrorKind::Network
        | ErrorKind::Timeout
        | ErrorKind::HttpStatus
        | ErrorKind::OcrFailed
        | ErrorKind::EmbedUnavailable
        | ErrorKind::VectorStoreUnavailable
        | ErrorKind::DbUnavailable
    )
  }

  /// `snake_case` name used in HTTP error bodies and `failures_by_kind` report keys.
  pub fn as_str(&self) -> &'static str {
    match self {
      ErrorKind::Validation => "validation",
      ErrorKind::TooLarge => "too_large",
      ErrorKind::UnsupportedType => "unsupported_type",
      ErrorKind::Network => "network",
      ErrorKind::Timeout => "timeout",
      ErrorKind::HttpStatus => "http_status",
      ErrorKind::HttpStatusClient => "http_status_client",
      ErrorKind::CorruptArchive => "corrupt_archive",
      ErrorKind::ArchiveBomb => "archive_bomb",
      ErrorKind::UnreadablePdf => "unreadable_pdf",
      ErrorKind::EmptyAfterOcr => "empty_after_ocr",
      ErrorKind::OcrFailed => "ocr_failed",
      ErrorKind::EmbedUnavailable => "embed_unavailable",
      ErrorKind::VectorStoreUnavailable => "vector_store_unavailable",
      ErrorKind::DbUnavailable => "db_unavailable",
      ErrorKind::Cancelled => "cancelled",
    }
  }
}

impl std::fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

#[derive(Error, Debug)]
pub enum Error {
  #[error("not found: {entity} {id}")]
  NotFound { entity: &'static str, id: String },

  #[error("validation: {0}")]
  Validation(String),

  #[error("config: {0}")]
  Config(String),

  #[error("IO: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
