pub mod http;
pub mod provider;
pub mod resilient;

pub use http::HttpEmbeddingProvider;
pub use provider::{EmbeddingError, EmbeddingProvider};
pub use resilient::{ResilientProvider, RetryConfig, is_retryable_error, wrap_resilient, wrap_resilient_arc};
