//! Startup errors. Any of these stops the process before it serves traffic.

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Broker unavailable: {0}")]
    Transport(#[from] messaging::TransportError),

    #[error("Database unavailable: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Inventory store error: {0}")]
    Inventory(#[from] inventory::InventoryError),

    #[error("Transaction log error: {0}")]
    TransactionLog(#[from] transaction_log::TransactionLogError),

    #[error("Saga service error: {0}")]
    Saga(#[from] saga::SagaError),

    #[error("Metrics exporter error: {0}")]
    Metrics(String),

    #[error("Role {0} needs database settings")]
    MissingDatabase(crate::config::Role),
}

pub type Result<T> = std::result::Result<T, NodeError>;
