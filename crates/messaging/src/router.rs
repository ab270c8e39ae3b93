//! Demultiplexes inbound deliveries into per-kind internal queues.

use std::collections::HashMap;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};

use crate::envelope::Envelope;
use crate::kind::MessageKind;
use crate::transport::Delivery;

/// What happened to one inbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Enqueued on the internal queue for this kind.
    Routed(MessageKind),
    /// Not a valid envelope.
    Malformed,
    /// Valid envelope of a kind this router has no queue for.
    Unroutable(MessageKind),
    /// The internal queue is at capacity.
    QueueFull(MessageKind),
    /// The consumer of the internal queue has gone away.
    Closed(MessageKind),
}

impl RouteOutcome {
    /// Returns true if the envelope reached an internal queue.
    pub fn is_routed(&self) -> bool {
        matches!(self, RouteOutcome::Routed(_))
    }

    fn label(&self) -> &'static str {
        match self {
            RouteOutcome::Routed(_) => "routed",
            RouteOutcome::Malformed => "malformed",
            RouteOutcome::Unroutable(_) => "unroutable",
            RouteOutcome::QueueFull(_) => "queue_full",
            RouteOutcome::Closed(_) => "closed",
        }
    }
}

/// Routes envelopes by kind.
///
/// The set of recognised kinds is fixed at construction. Enqueueing never
/// blocks: a full queue is reported instead, so the broker can redeliver
/// or dead-letter.
#[derive(Debug, Clone)]
pub struct Router {
    routes: HashMap<MessageKind, mpsc::Sender<Envelope>>,
}

impl Router {
    /// Creates a router over the given kind-to-queue table.
    pub fn new(routes: impl IntoIterator<Item = (MessageKind, mpsc::Sender<Envelope>)>) -> Self {
        Self {
            routes: routes.into_iter().collect(),
        }
    }

    /// Returns true if this router has a queue for `kind`.
    pub fn recognises(&self, kind: MessageKind) -> bool {
        self.routes.contains_key(&kind)
    }

    /// Decodes a raw payload and enqueues it on its kind's queue.
    pub fn route(&self, payload: &[u8]) -> RouteOutcome {
        let envelope = match Envelope::decode(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable delivery");
                return RouteOutcome::Malformed;
            }
        };

        self.route_envelope(envelope)
    }

    /// Enqueues an already decoded envelope.
    pub fn route_envelope(&self, envelope: Envelope) -> RouteOutcome {
        let kind = envelope.kind;
        let Some(sender) = self.routes.get(&kind) else {
            warn!(
                transaction_id = %envelope.transaction_id,
                %kind,
                "No internal queue for kind"
            );
            return RouteOutcome::Unroutable(kind);
        };

        let transaction_id = envelope.transaction_id;
        match sender.try_send(envelope) {
            Ok(()) => {
                debug!(%transaction_id, %kind, "Routed envelope");
                RouteOutcome::Routed(kind)
            }
            Err(TrySendError::Full(_)) => {
                warn!(%transaction_id, %kind, "Internal queue full");
                RouteOutcome::QueueFull(kind)
            }
            Err(TrySendError::Closed(_)) => {
                error!(%transaction_id, %kind, "Internal queue closed");
                RouteOutcome::Closed(kind)
            }
        }
    }

    /// Routes a delivery and settles it: ack iff routed, otherwise reject
    /// without requeue.
    ///
    /// Rejecting without requeue avoids redelivery storms for payloads that
    /// can never be routed, at the cost of losing them.
    pub async fn handle_delivery(&self, delivery: Delivery) -> RouteOutcome {
        let outcome = self.route(&delivery.data);
        metrics::counter!("router_deliveries_total", "outcome" => outcome.label()).increment(1);

        let tag = delivery.tag;
        let settled = if outcome.is_routed() {
            delivery.ack().await
        } else {
            delivery.reject(false).await
        };

        if let Err(e) = settled {
            error!(tag, error = %e, "Failed to settle delivery");
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{Body, Reply};
    use crate::state::SagaState;
    use crate::transport::{InMemoryTransport, Transport};
    use common::TransactionId;
    use futures_util::StreamExt;

    fn envelope(kind: MessageKind) -> Envelope {
        Envelope::begin(TransactionId::new(), Body::empty(kind))
    }

    #[tokio::test]
    async fn routes_by_kind() {
        let (flight_tx, mut flight_rx) = mpsc::channel(4);
        let (hotel_tx, mut hotel_rx) = mpsc::channel(4);
        let router = Router::new([
            (MessageKind::FlightRequest, flight_tx),
            (MessageKind::HotelRequest, hotel_tx),
        ]);

        let env = envelope(MessageKind::HotelRequest);
        let outcome = router.route(&env.encode().unwrap());

        assert_eq!(outcome, RouteOutcome::Routed(MessageKind::HotelRequest));
        assert_eq!(hotel_rx.recv().await.unwrap(), env);
        assert!(flight_rx.try_recv().is_err());
    }

    #[test]
    fn unknown_kind_is_unroutable() {
        let (tx, mut rx) = mpsc::channel(4);
        let router = Router::new([(MessageKind::FlightRequest, tx)]);

        let env = envelope(MessageKind::PaymentRequest);
        assert_eq!(
            router.route(&env.encode().unwrap()),
            RouteOutcome::Unroutable(MessageKind::PaymentRequest)
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn garbage_is_malformed() {
        let (tx, _rx) = mpsc::channel(4);
        let router = Router::new([(MessageKind::FlightRequest, tx)]);
        assert_eq!(router.route(b"not json"), RouteOutcome::Malformed);
    }

    #[test]
    fn full_queue_is_reported() {
        let (tx, _rx) = mpsc::channel(1);
        let router = Router::new([(MessageKind::FlightRequest, tx)]);
        let payload = envelope(MessageKind::FlightRequest).encode().unwrap();

        assert!(router.route(&payload).is_routed());
        assert_eq!(
            router.route(&payload),
            RouteOutcome::QueueFull(MessageKind::FlightRequest)
        );
    }

    #[test]
    fn dropped_consumer_is_reported() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let router = Router::new([(MessageKind::FlightRequest, tx)]);
        let payload = envelope(MessageKind::FlightRequest).encode().unwrap();
        assert_eq!(
            router.route(&payload),
            RouteOutcome::Closed(MessageKind::FlightRequest)
        );
    }

    #[tokio::test]
    async fn unroutable_delivery_is_rejected_without_requeue() {
        let transport = InMemoryTransport::new();
        let (tx, mut rx) = mpsc::channel(4);
        let router = Router::new([(MessageKind::FlightRequest, tx)]);

        let routed = envelope(MessageKind::FlightRequest);
        let mut stray = envelope(MessageKind::HotelReply);
        stray.state = SagaState::HotelFullAccept;
        stray.body = Some(Body::HotelReply(Reply::accepted()));

        transport
            .publish("flight", routed.encode().unwrap())
            .await
            .unwrap();
        transport
            .publish("flight", stray.encode().unwrap())
            .await
            .unwrap();

        let mut deliveries = transport.consume("flight").await.unwrap();
        for _ in 0..2 {
            let delivery = deliveries.next().await.unwrap().unwrap();
            router.handle_delivery(delivery).await;
        }

        assert_eq!(transport.acked("flight").await, vec![1]);
        assert_eq!(transport.rejected("flight").await, vec![(2, false)]);
        assert_eq!(rx.recv().await.unwrap(), routed);
        assert!(rx.try_recv().is_err());
    }
}
