//! The envelope exchanged between saga services and its JSON codec.

use chrono::{DateTime, Utc};
use common::TransactionId;
use serde::{Deserialize, Serialize};

use crate::body::{Body, FlightRequest, HotelRequest, PaymentRequest};
use crate::error::{EnvelopeError, Result};
use crate::kind::MessageKind;
use crate::state::SagaState;

/// The unit of communication between services.
///
/// `body`, when present, always agrees with `kind`; [`Envelope::decode`]
/// and [`Envelope::encode`] both enforce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireEnvelope")]
pub struct Envelope {
    /// Correlates every envelope of one saga instance.
    pub transaction_id: TransactionId,

    /// Incremented by the producer of each new envelope in the transaction.
    /// Used for ordering and debugging, not for deduplication.
    pub message_id: u64,

    /// Discriminator selecting the body type.
    pub kind: MessageKind,

    /// Saga state tag.
    pub state: SagaState,

    /// Payload; absent bodies are legal on the wire but no participant acts on them.
    pub body: Option<Body>,

    /// When the producer created this envelope.
    pub created_at: DateTime<Utc>,
}

/// Raw wire shape; the body stays untyped until `kind` is known.
#[derive(Debug, Deserialize)]
struct WireEnvelope {
    transaction_id: TransactionId,
    message_id: u64,
    kind: MessageKind,
    state: SagaState,
    #[serde(default)]
    body: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = EnvelopeError;

    fn try_from(wire: WireEnvelope) -> Result<Self> {
        let body = match wire.body {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => Some(Body::from_value(wire.kind, value)?),
        };

        Ok(Envelope {
            transaction_id: wire.transaction_id,
            message_id: wire.message_id,
            kind: wire.kind,
            state: wire.state,
            body,
            created_at: wire.created_at,
        })
    }
}

impl Envelope {
    /// Creates the first envelope of a new saga.
    pub fn begin(transaction_id: TransactionId, body: Body) -> Self {
        Self {
            transaction_id,
            message_id: 0,
            kind: body.kind(),
            state: SagaState::Begin,
            body: Some(body),
            created_at: Utc::now(),
        }
    }

    /// Creates an envelope with an explicit state; `kind` follows the body.
    pub fn new(transaction_id: TransactionId, message_id: u64, state: SagaState, body: Body) -> Self {
        Self {
            transaction_id,
            message_id,
            kind: body.kind(),
            state,
            body: Some(body),
            created_at: Utc::now(),
        }
    }

    /// Produces the next envelope of this transaction.
    ///
    /// Keeps the transaction ID, increments the message ID (wrapping at
    /// `u64::MAX`), takes the kind from `body` and stamps a fresh creation
    /// time.
    pub fn advance(&self, state: SagaState, body: Body) -> Self {
        Self {
            transaction_id: self.transaction_id,
            message_id: self.message_id.wrapping_add(1),
            kind: body.kind(),
            state,
            body: Some(body),
            created_at: Utc::now(),
        }
    }

    /// Checks that the body, if any, belongs to the declared kind.
    pub fn validate(&self) -> Result<()> {
        match &self.body {
            Some(body) if body.kind() != self.kind => Err(EnvelopeError::BodyMismatch {
                kind: self.kind,
                body: body.kind(),
            }),
            _ => Ok(()),
        }
    }

    /// Serializes the envelope to its JSON wire form.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses an envelope from its JSON wire form.
    ///
    /// Unknown kinds or states, and bodies that do not fit the declared
    /// kind, are errors.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let wire: WireEnvelope = serde_json::from_slice(bytes)?;
        Envelope::try_from(wire)
    }

    /// Returns the flight booking parameters, if this is a flight request with a body.
    pub fn flight_request(&self) -> Option<&FlightRequest> {
        match &self.body {
            Some(Body::FlightRequest(req)) => Some(req),
            _ => None,
        }
    }

    /// Returns the hotel booking parameters, if this is a hotel request with a body.
    pub fn hotel_request(&self) -> Option<&HotelRequest> {
        match &self.body {
            Some(Body::HotelRequest(req)) => Some(req),
            _ => None,
        }
    }

    /// Returns the payment parameters, if this is a payment request with a body.
    pub fn payment_request(&self) -> Option<&PaymentRequest> {
        match &self.body {
            Some(Body::PaymentRequest(req)) => Some(req),
            _ => None,
        }
    }
}
