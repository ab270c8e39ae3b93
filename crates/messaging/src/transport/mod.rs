//! Broker contract: durable named queues, publish, consume, ack/reject.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::TransportError;

#[cfg(feature = "amqp")]
pub mod amqp;
mod memory;

pub use memory::InMemoryTransport;

/// Settles a single delivery with the broker.
#[async_trait]
pub trait Acknowledge: Send + Sync {
    /// Positive ack: the broker removes the message from the queue.
    async fn ack(&self) -> Result<(), TransportError>;

    /// Negative ack. With `requeue == false` the broker drops or dead-letters the message.
    async fn reject(&self, requeue: bool) -> Result<(), TransportError>;
}

/// A message received from a queue, still awaiting settlement.
pub struct Delivery {
    /// Broker-assigned delivery tag.
    pub tag: u64,
    /// Raw message payload.
    pub data: Vec<u8>,
    acker: Box<dyn Acknowledge>,
}

impl Delivery {
    /// Wraps a payload with the handle used to settle it.
    pub fn new(tag: u64, data: Vec<u8>, acker: impl Acknowledge + 'static) -> Self {
        Self {
            tag,
            data,
            acker: Box::new(acker),
        }
    }

    /// Acknowledges the delivery.
    pub async fn ack(self) -> Result<(), TransportError> {
        self.acker.ack().await
    }

    /// Rejects the delivery.
    pub async fn reject(self, requeue: bool) -> Result<(), TransportError> {
        self.acker.reject(requeue).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("tag", &self.tag)
            .field("len", &self.data.len())
            .finish()
    }
}

/// A stream of deliveries from one queue.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, TransportError>> + Send>>;

/// Core trait for broker adapters.
///
/// Queues are durable and addressed by name. Delivery is at-least-once:
/// consumers settle every delivery with [`Delivery::ack`] or [`Delivery::reject`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Declares a durable queue; declaring an existing queue is a no-op.
    async fn declare_queue(&self, queue: &str) -> Result<(), TransportError>;

    /// Publishes a payload to the named queue.
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Starts consuming the named queue.
    async fn consume(&self, queue: &str) -> Result<DeliveryStream, TransportError>;
}
