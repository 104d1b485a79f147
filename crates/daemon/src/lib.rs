//! Worker Pool, Ingestion Coordinator, and Query Service (§4.5-§4.7): the orchestration
//! layer that wires the leaf crates (`fetch`, `extract`, `index`) into a running service.

pub mod coordinator;
pub mod http;
pub mod lot_feed;
pub mod pool;

pub use coordinator::{Coordinator, CoordinatorError};
pub use http::{run, AppState};
pub use lot_feed::{HttpLotFeed, LotFeed, LotFeedError, StaticLotFeed};
pub use pool::{JobResult, JobSink, NoopSink, PoolDeps, WorkerPool};
