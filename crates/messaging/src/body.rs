//! Envelope payloads, one type per message kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EnvelopeError, Result};
use crate::kind::MessageKind;

/// Booking parameters for a flight hold.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlightRequest {
    /// Departure city.
    pub city_from: String,
    /// Arrival city.
    pub city_to: String,
    /// Departure time of the outbound flight.
    pub book_from: DateTime<Utc>,
    /// End of the trip.
    pub book_to: DateTime<Utc>,
    /// Seats to hold.
    pub passenger_count: i32,
}

/// Booking parameters for a hotel room hold.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HotelRequest {
    /// City the hotel is in.
    pub city: String,
    /// Room category name.
    pub room_type: String,
    /// Number of rooms to hold.
    pub rooms: i32,
    /// First night.
    pub book_from: DateTime<Utc>,
    /// Checkout day.
    pub book_to: DateTime<Utc>,
}

/// Parameters of the payment step.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Amount to charge, in cents.
    #[serde(default)]
    pub amount_cents: i64,
}

/// A complete booking as submitted by the order service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderRequest {
    pub flight: FlightRequest,
    pub hotel: HotelRequest,
    pub payment: PaymentRequest,
}

/// Parameters for the backend stage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BackendRequest {}

/// Outcome carried by every reply kind.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Reply {
    /// Whether the step succeeded.
    pub accepted: bool,
    /// Human readable reason for a refusal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Reply {
    /// A successful outcome.
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    /// A refused outcome with a reason.
    pub fn refused(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
        }
    }
}

/// Envelope body, tagged by the envelope's [`MessageKind`].
///
/// On the wire only the inner payload is written; the kind travels in the
/// envelope's `kind` field and selects the type on the way back in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Body {
    OrderRequest(OrderRequest),
    OrderReply(Reply),
    PaymentRequest(PaymentRequest),
    PaymentReply(Reply),
    HotelRequest(HotelRequest),
    HotelReply(Reply),
    FlightRequest(FlightRequest),
    FlightReply(Reply),
    BackendRequest(BackendRequest),
    BackendReply(Reply),
}

impl Body {
    /// Returns the kind this body belongs to.
    pub fn kind(&self) -> MessageKind {
        match self {
            Body::OrderRequest(_) => MessageKind::OrderRequest,
            Body::OrderReply(_) => MessageKind::OrderReply,
            Body::PaymentRequest(_) => MessageKind::PaymentRequest,
            Body::PaymentReply(_) => MessageKind::PaymentReply,
            Body::HotelRequest(_) => MessageKind::HotelRequest,
            Body::HotelReply(_) => MessageKind::HotelReply,
            Body::FlightRequest(_) => MessageKind::FlightRequest,
            Body::FlightReply(_) => MessageKind::FlightReply,
            Body::BackendRequest(_) => MessageKind::BackendRequest,
            Body::BackendReply(_) => MessageKind::BackendReply,
        }
    }

    /// Deserializes a raw body as the payload type selected by `kind`.
    pub fn from_value(kind: MessageKind, value: serde_json::Value) -> Result<Self> {
        fn parse<T: serde::de::DeserializeOwned>(
            kind: MessageKind,
            value: serde_json::Value,
        ) -> Result<T> {
            serde_json::from_value(value).map_err(|source| EnvelopeError::InvalidBody { kind, source })
        }

        let body = match kind {
            MessageKind::OrderRequest => Body::OrderRequest(parse(kind, value)?),
            MessageKind::OrderReply => Body::OrderReply(parse(kind, value)?),
            MessageKind::PaymentRequest => Body::PaymentRequest(parse(kind, value)?),
            MessageKind::PaymentReply => Body::PaymentReply(parse(kind, value)?),
            MessageKind::HotelRequest => Body::HotelRequest(parse(kind, value)?),
            MessageKind::HotelReply => Body::HotelReply(parse(kind, value)?),
            MessageKind::FlightRequest => Body::FlightRequest(parse(kind, value)?),
            MessageKind::FlightReply => Body::FlightReply(parse(kind, value)?),
            MessageKind::BackendRequest => Body::BackendRequest(parse(kind, value)?),
            MessageKind::BackendReply => Body::BackendReply(parse(kind, value)?),
        };
        Ok(body)
    }

    /// Returns an empty payload of the given kind.
    ///
    /// Used when a stage advances the envelope to the next stage's request
    /// kind without knowing that stage's booking parameters.
    pub fn empty(kind: MessageKind) -> Self {
        match kind {
            MessageKind::OrderRequest => Body::OrderRequest(OrderRequest::default()),
            MessageKind::OrderReply => Body::OrderReply(Reply::default()),
            MessageKind::PaymentRequest => Body::PaymentRequest(PaymentRequest::default()),
            MessageKind::PaymentReply => Body::PaymentReply(Reply::default()),
            MessageKind::HotelRequest => Body::HotelRequest(HotelRequest::default()),
            MessageKind::HotelReply => Body::HotelReply(Reply::default()),
            MessageKind::FlightRequest => Body::FlightRequest(FlightRequest::default()),
            MessageKind::FlightReply => Body::FlightReply(Reply::default()),
            MessageKind::BackendRequest => Body::BackendRequest(BackendRequest::default()),
            MessageKind::BackendReply => Body::BackendReply(Reply::default()),
        }
    }

    /// Builds the reply payload of the given reply kind.
    ///
    /// Returns `None` when `kind` is a request kind.
    pub fn reply(kind: MessageKind, reply: Reply) -> Option<Self> {
        let body = match kind {
            MessageKind::OrderReply => Body::OrderReply(reply),
            MessageKind::PaymentReply => Body::PaymentReply(reply),
            MessageKind::HotelReply => Body::HotelReply(reply),
            MessageKind::FlightReply => Body::FlightReply(reply),
            MessageKind::BackendReply => Body::BackendReply(reply),
            _ => return None,
        };
        Some(body)
    }

    /// Returns the reply outcome, if this is a reply body.
    pub fn as_reply(&self) -> Option<&Reply> {
        match self {
            Body::OrderReply(r)
            | Body::PaymentReply(r)
            | Body::HotelReply(r)
            | Body::FlightReply(r)
            | Body::BackendReply(r) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_of_every_empty_body_matches() {
        for kind in MessageKind::ALL {
            assert_eq!(Body::empty(kind).kind(), kind);
        }
    }

    #[test]
    fn from_value_selects_type_by_kind() {
        let value = serde_json::json!({
            "city": "Gdansk",
            "room_type": "double",
            "rooms": 2,
            "book_from": "2024-07-01T00:00:00Z",
            "book_to": "2024-07-08T00:00:00Z"
        });

        let body = Body::from_value(MessageKind::HotelRequest, value.clone()).unwrap();
        match body {
            Body::HotelRequest(req) => {
                assert_eq!(req.room_type, "double");
                assert_eq!(req.rooms, 2);
            }
            other => panic!("unexpected body {other:?}"),
        }

        let err = Body::from_value(MessageKind::FlightRequest, value).unwrap_err();
        assert!(matches!(
            err,
            EnvelopeError::InvalidBody {
                kind: MessageKind::FlightRequest,
                ..
            }
        ));
    }

    #[test]
    fn serializes_inner_payload_only() {
        let body = Body::FlightReply(Reply::refused("no seats"));
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"accepted": false, "reason": "no seats"})
        );
    }

    #[test]
    fn reply_rejects_request_kinds() {
        assert!(Body::reply(MessageKind::HotelRequest, Reply::accepted()).is_none());
        let body = Body::reply(MessageKind::HotelReply, Reply::accepted()).unwrap();
        assert_eq!(body.kind(), MessageKind::HotelReply);
        assert!(body.as_reply().unwrap().accepted);
    }
}
