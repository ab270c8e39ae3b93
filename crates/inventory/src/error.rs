use thiserror::Error;

/// Errors raised by a resource store.
///
/// A missing resource or hold is not an error; see the outcome enums.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The request cannot be evaluated at all.
    #[error("Invalid booking request: {0}")]
    InvalidRequest(String),

    /// A database error occurred; the transaction was rolled back.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
