//! `RelationalStore` (Postgres via `sqlx`) and `VectorStore` (Qdrant-shaped HTTP client)
//! adapters (§6). The Indexer is the only component that writes to either.

pub mod connection;
pub mod documents;
pub mod import_logs;
pub mod vector;

pub use connection::{DbError, RelationalStore, Result, pool_size_for_workers};
pub use documents::InsertOutcome;
pub use vector::{VectorHit, VectorStore, VectorStoreError};
