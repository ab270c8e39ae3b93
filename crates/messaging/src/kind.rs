//! Message kinds and the saga stage pipeline.

use serde::{Deserialize, Serialize};

/// A service taking part in the booking saga.
///
/// The forward pipeline is:
/// ```text
/// Order ──► Flight ──► Hotel ──► Payment ──► Backend
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Order,
    Flight,
    Hotel,
    Payment,
    Backend,
}

impl Stage {
    /// Returns the stage that follows this one, if any.
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Order => Some(Stage::Flight),
            Stage::Flight => Some(Stage::Hotel),
            Stage::Hotel => Some(Stage::Payment),
            Stage::Payment => Some(Stage::Backend),
            Stage::Backend => None,
        }
    }

    /// Kind of the requests this stage consumes.
    pub fn request_kind(&self) -> MessageKind {
        match self {
            Stage::Order => MessageKind::OrderRequest,
            Stage::Flight => MessageKind::FlightRequest,
            Stage::Hotel => MessageKind::HotelRequest,
            Stage::Payment => MessageKind::PaymentRequest,
            Stage::Backend => MessageKind::BackendRequest,
        }
    }

    /// Kind of the replies this stage produces.
    pub fn reply_kind(&self) -> MessageKind {
        match self {
            Stage::Order => MessageKind::OrderReply,
            Stage::Flight => MessageKind::FlightReply,
            Stage::Hotel => MessageKind::HotelReply,
            Stage::Payment => MessageKind::PaymentReply,
            Stage::Backend => MessageKind::BackendReply,
        }
    }

    /// Returns the stage name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Order => "Order",
            Stage::Flight => "Flight",
            Stage::Hotel => "Hotel",
            Stage::Payment => "Payment",
            Stage::Backend => "Backend",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Discriminator of an envelope; decides which payload type the body holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    OrderRequest,
    OrderReply,
    PaymentRequest,
    PaymentReply,
    HotelRequest,
    HotelReply,
    FlightRequest,
    FlightReply,
    BackendRequest,
    BackendReply,
}

impl MessageKind {
    /// All kinds, in declaration order.
    pub const ALL: [MessageKind; 10] = [
        MessageKind::OrderRequest,
        MessageKind::OrderReply,
        MessageKind::PaymentRequest,
        MessageKind::PaymentReply,
        MessageKind::HotelRequest,
        MessageKind::HotelReply,
        MessageKind::FlightRequest,
        MessageKind::FlightReply,
        MessageKind::BackendRequest,
        MessageKind::BackendReply,
    ];

    /// Returns the stage this kind belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            MessageKind::OrderRequest | MessageKind::OrderReply => Stage::Order,
            MessageKind::PaymentRequest | MessageKind::PaymentReply => Stage::Payment,
            MessageKind::HotelRequest | MessageKind::HotelReply => Stage::Hotel,
            MessageKind::FlightRequest | MessageKind::FlightReply => Stage::Flight,
            MessageKind::BackendRequest | MessageKind::BackendReply => Stage::Backend,
        }
    }

    /// Returns true for request kinds.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            MessageKind::OrderRequest
                | MessageKind::PaymentRequest
                | MessageKind::HotelRequest
                | MessageKind::FlightRequest
                | MessageKind::BackendRequest
        )
    }

    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::OrderRequest => "OrderRequest",
            MessageKind::OrderReply => "OrderReply",
            MessageKind::PaymentRequest => "PaymentRequest",
            MessageKind::PaymentReply => "PaymentReply",
            MessageKind::HotelRequest => "HotelRequest",
            MessageKind::HotelReply => "HotelReply",
            MessageKind::FlightRequest => "FlightRequest",
            MessageKind::FlightReply => "FlightReply",
            MessageKind::BackendRequest => "BackendRequest",
            MessageKind::BackendReply => "BackendReply",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
