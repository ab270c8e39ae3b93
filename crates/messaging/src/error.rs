use thiserror::Error;

use crate::kind::MessageKind;

/// Errors raised while decoding or encoding an envelope.
///
/// Every variant makes a delivery unroutable; none of them is retried.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The payload is not a well-formed envelope, or names an unknown kind or state.
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The body does not deserialize as the payload type of the declared kind.
    #[error("Invalid body for {kind}: {source}")]
    InvalidBody {
        kind: MessageKind,
        source: serde_json::Error,
    },

    /// The body variant disagrees with the envelope kind.
    #[error("Body of kind {body} does not match envelope kind {kind}")]
    BodyMismatch {
        kind: MessageKind,
        body: MessageKind,
    },
}

/// Result type for envelope operations.
pub type Result<T> = std::result::Result<T, EnvelopeError>;

/// Errors raised by a [`Transport`](crate::Transport) implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The broker could not be reached or the connection was lost.
    #[error("Broker unreachable: {0}")]
    Connection(String),

    /// A queue could not be declared.
    #[error("Failed to declare queue '{queue}': {reason}")]
    Declare { queue: String, reason: String },

    /// A message could not be published.
    #[error("Failed to publish to '{queue}': {reason}")]
    Publish { queue: String, reason: String },

    /// A consumer could not be started.
    #[error("Failed to consume from '{queue}': {reason}")]
    Consume { queue: String, reason: String },

    /// An ack or reject could not be delivered to the broker.
    #[error("Failed to settle delivery {tag}: {reason}")]
    Settle { tag: u64, reason: String },
}
