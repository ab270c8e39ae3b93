//! Transport → router → publisher, over the in-memory broker.

use std::sync::Arc;

use common::TransactionId;
use futures_util::StreamExt;
use messaging::{
    Body, Envelope, InMemoryTransport, MessageKind, OutboundPublisher, Reply, RouteOutcome,
    Router, SagaState, Transport,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn routed_request_is_answered_on_reply_queue() {
    let transport = Arc::new(InMemoryTransport::new());
    transport.declare_queue("hotel").await.unwrap();
    transport.declare_queue("replies").await.unwrap();

    let (inbound_tx, mut inbound_rx) = mpsc::channel(8);
    let router = Router::new([(MessageKind::HotelRequest, inbound_tx)]);

    let request = Envelope::begin(TransactionId::new(), Body::empty(MessageKind::HotelRequest));
    transport
        .publish("hotel", request.encode().unwrap())
        .await
        .unwrap();

    let mut deliveries = transport.consume("hotel").await.unwrap();
    let delivery = deliveries.next().await.unwrap().unwrap();
    assert_eq!(
        router.handle_delivery(delivery).await,
        RouteOutcome::Routed(MessageKind::HotelRequest)
    );

    let received = inbound_rx.recv().await.unwrap();
    let reply = received.advance(
        SagaState::HotelFullAccept,
        Body::HotelReply(Reply::accepted()),
    );

    let (outbound_tx, outbound_rx) = mpsc::channel(8);
    outbound_tx.send(reply.clone()).await.unwrap();
    drop(outbound_tx);
    OutboundPublisher::new(transport.clone(), "replies")
        .run(outbound_rx, CancellationToken::new())
        .await;

    let published = transport.published("replies").await;
    assert_eq!(published.len(), 1);
    let decoded = Envelope::decode(&published[0]).unwrap();
    assert_eq!(decoded.transaction_id, request.transaction_id);
    assert_eq!(decoded.message_id, 1);
    assert_eq!(decoded.kind, MessageKind::HotelReply);
    assert_eq!(transport.acked("hotel").await, vec![1]);
}

#[tokio::test]
async fn malformed_delivery_never_reaches_a_queue() {
    let transport = InMemoryTransport::new();
    let (tx, mut rx) = mpsc::channel(8);
    let router = Router::new([(MessageKind::FlightRequest, tx)]);

    let json = serde_json::json!({
        "transaction_id": TransactionId::new(),
        "message_id": 0,
        "kind": "FlightRequest",
        "state": "SomewhereElse",
        "created_at": "2024-05-20T08:00:00Z"
    });
    transport
        .publish("flight", serde_json::to_vec(&json).unwrap())
        .await
        .unwrap();

    let mut deliveries = transport.consume("flight").await.unwrap();
    let delivery = deliveries.next().await.unwrap().unwrap();
    assert_eq!(
        router.handle_delivery(delivery).await,
        RouteOutcome::Malformed
    );

    assert!(rx.try_recv().is_err());
    assert_eq!(transport.rejected("flight").await, vec![(1, false)]);
    assert!(transport.acked("flight").await.is_empty());
}
