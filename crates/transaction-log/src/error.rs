use common::TransactionId;
use thiserror::Error;

use crate::Sequence;

/// Errors that can occur when interacting with the transaction log.
#[derive(Debug, Error)]
pub enum TransactionLogError {
    /// The stream was not at the expected sequence when appending.
    #[error(
        "Sequence conflict for transaction {transaction_id}: expected {expected}, found {actual}"
    )]
    SequenceConflict {
        transaction_id: TransactionId,
        expected: Sequence,
        actual: Sequence,
    },

    /// The append request itself is unusable.
    #[error("Invalid append: {0}")]
    InvalidAppend(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored envelope could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for transaction log operations.
pub type Result<T> = std::result::Result<T, TransactionLogError>;
