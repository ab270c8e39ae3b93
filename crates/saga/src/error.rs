//! Saga error types.

use inventory::InventoryError;
use messaging::{EnvelopeError, MessageKind, SagaState, Stage, TransportError};
use thiserror::Error;
use transaction_log::TransactionLogError;

/// Errors that can occur while running a saga step or service.
///
/// Business failures (no capacity, no hold) are not errors: they are reply
/// states. Step errors make the triggering envelope drop without a reply.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The envelope is not addressed to this stage.
    #[error("Stage {stage} does not handle {kind}")]
    WrongKind { stage: Stage, kind: MessageKind },

    /// The state does not trigger any action of this stage.
    #[error("Stage {stage} has no action for state {state}")]
    UnhandledState { stage: Stage, state: SagaState },

    /// The action needs booking parameters and the envelope has none.
    #[error("Envelope of kind {0} has no body")]
    MissingBody(MessageKind),

    /// Resource store error; the store transaction was rolled back.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Transaction log error.
    #[error("Transaction log error: {0}")]
    TransactionLog(#[from] TransactionLogError),

    /// Broker error.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Envelope codec error.
    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
}

impl SagaError {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            SagaError::WrongKind { .. } => "wrong_kind",
            SagaError::UnhandledState { .. } => "unhandled_state",
            SagaError::MissingBody(_) => "missing_body",
            SagaError::Inventory(InventoryError::InvalidRequest(_)) => "invalid_request",
            SagaError::Inventory(_) => "store",
            SagaError::TransactionLog(_) => "transaction_log",
            SagaError::Transport(_) => "transport",
            SagaError::Envelope(_) => "envelope",
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
