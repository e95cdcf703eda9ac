//! Document store behind the persistence interface.
//!
//! Collections of JSON documents keyed by string, with shallow-merge
//! writes, field filters, and optimistic transactions.  Every document
//! carries a version that transactions re-check at commit time, so a
//! read-modify-write that raced another writer is retried instead of
//! silently overwriting it.
//!
//! When a state path is configured each collection is mirrored to
//! `<state_path>/store/<collection>.json` after every commit.

pub mod filter;
pub mod store;
pub mod transaction;

pub use filter::{Filter, FilterOp};
pub use store::{Document, DocumentStore};
pub use transaction::Transaction;
