pub mod config;
pub mod domain;
pub mod error;
pub mod retry;
pub mod validation;

pub use config::EtlConfig;
pub use domain::{
  AttachmentRef, AttachmentType, BatchReport, Document, Embedding, EmbeddingMetadata, ExtractionMode, IngestAction,
  IngestJob, JobStatus, Lot, doc_id_from_vector_id, vector_id_for,
};
pub use error::{Error, ErrorKind, Result};
pub use retry::{RetryConfig, backoff_for_attempt};
pub use validation::{
  ValidationError, ValidationResult, optional_array, optional_bool, optional_enum, optional_f64, optional_f64_range,
  optional_i64, optional_i64_range, optional_string, optional_string_array, optional_string_min, optional_u64,
  require_array, require_bool, require_enum, require_f64, require_f64_range, require_i64, require_i64_range,
  require_string, require_string_array, require_string_min, require_string_range, require_u64,
};
