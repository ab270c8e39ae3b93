//! Message plumbing shared by every saga service.
//!
//! This crate provides:
//! - The [`Envelope`] exchanged between services, with its closed
//!   [`MessageKind`] and [`SagaState`] vocabularies and a [`Body`] tagged by kind
//! - The JSON wire codec (unknown kinds/states and mismatched bodies are rejected)
//! - The [`Transport`] contract (publish, consume, ack/reject) with an
//!   in-memory implementation and an AMQP one behind the `amqp` feature
//! - The inbound [`Router`] and the [`OutboundPublisher`]

pub mod body;
pub mod envelope;
pub mod error;
pub mod kind;
pub mod publisher;
pub mod router;
pub mod state;
pub mod transport;

pub use body::{
    BackendRequest, Body, FlightRequest, HotelRequest, OrderRequest, PaymentRequest, Reply,
};
pub use envelope::Envelope;
pub use error::{EnvelopeError, Result, TransportError};
pub use kind::{MessageKind, Stage};
pub use publisher::OutboundPublisher;
pub use router::{RouteOutcome, Router};
pub use state::{Phase, SagaState};
pub use transport::{Acknowledge, Delivery, DeliveryStream, InMemoryTransport, Transport};

#[cfg(feature = "amqp")]
pub use transport::amqp::{AmqpConfig, AmqpTransport};
