//! Append-only transaction log for the saga coordinator.
//!
//! Every transaction owns one ordered stream of envelopes. Entries are
//! appended with optional optimistic sequence checks and never mutated;
//! the log is read back for audit and recovery only.

pub mod entry;
pub mod error;
pub mod log;
pub mod memory;
pub mod postgres;

pub use entry::{EntryId, LogEntry, Sequence};
pub use error::{Result, TransactionLogError};
pub use log::{AppendOptions, EntryStream, TransactionLog, TransactionLogExt};
pub use memory::InMemoryTransactionLog;
pub use postgres::PostgresTransactionLog;
