//! The Indexer (§4.4): idempotent dual-sink persistence, plus the orphan-reconciliation
//! pass (§9).

pub mod indexer;
pub mod reconcile;

pub use indexer::{IndexError, IndexOutcome, Indexer};
pub use reconcile::{ReconcileReport, reconcile_once};
