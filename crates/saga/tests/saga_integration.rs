//! End-to-end tests of participant and coordinator services over the
//! in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::TransactionId;
use inventory::{Flight, InMemoryFlightStore, InventoryStore};
use messaging::{
    Body, Envelope, FlightRequest, InMemoryTransport, MessageKind, OrderRequest, PaymentRequest,
    Reply, SagaState, Transport,
};
use saga::{
    CoordinatorOptions, CoordinatorService, FixedGateway, ParticipantService, PaymentStage,
    ServiceOptions, SweepOptions, TransactionRecorder,
};
use tokio_util::sync::CancellationToken;
use transaction_log::{InMemoryTransactionLog, TransactionLog};

const REPLIES: &str = "replies";

fn departure() -> DateTime<Utc> {
    "2024-06-01T10:00:00Z".parse().unwrap()
}

fn flight_request(passengers: i32) -> FlightRequest {
    FlightRequest {
        city_from: "Warsaw".to_string(),
        city_to: "Lisbon".to_string(),
        book_from: departure(),
        book_to: "2024-06-08T10:00:00Z".parse().unwrap(),
        passenger_count: passengers,
    }
}

fn flight_store(capacity: i32) -> (Arc<InMemoryFlightStore>, uuid::Uuid) {
    let flight = Flight::new("Warsaw", "Lisbon", departure(), capacity);
    let id = flight.id;
    (Arc::new(InMemoryFlightStore::new(vec![flight])), id)
}

async fn publish(transport: &InMemoryTransport, queue: &str, envelope: &Envelope) {
    transport
        .publish(queue, envelope.encode().unwrap())
        .await
        .unwrap();
}

async fn replies(transport: &InMemoryTransport) -> Vec<Envelope> {
    transport
        .published(REPLIES)
        .await
        .iter()
        .map(|payload| Envelope::decode(payload).unwrap())
        .collect()
}

#[tokio::test]
async fn flight_service_reserves_then_confirms() {
    let transport = InMemoryTransport::new();
    let (store, flight_id) = flight_store(10);
    let tx = TransactionId::new();

    publish(
        &transport,
        "flight",
        &Envelope::begin(tx, Body::FlightRequest(flight_request(4))),
    )
    .await;
    publish(
        &transport,
        "flight",
        &Envelope::new(
            tx,
            4,
            SagaState::PaymentAccept,
            Body::empty(MessageKind::FlightRequest),
        ),
    )
    .await;
    transport.close("flight").await;

    let handle = ParticipantService::spawn_resource(
        Arc::new(transport.clone()),
        Arc::clone(&store),
        ServiceOptions::new("flight", REPLIES).with_concurrency(1),
        None,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    handle.join().await;

    let replies = replies(&transport).await;
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].state, SagaState::HotelTimedAccept);
    assert_eq!(replies[0].kind, MessageKind::HotelRequest);
    assert_eq!(replies[1].state, SagaState::FlightFullAccept);
    assert_eq!(replies[1].kind, MessageKind::FlightReply);

    assert_eq!(transport.acked("flight").await, vec![1, 2]);
    assert_eq!(store.capacity(flight_id).await.unwrap(), Some(6));
    assert!(!store.hold(tx).await.unwrap().unwrap().temporary);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_never_oversell() {
    let transport = InMemoryTransport::new();
    let (store, flight_id) = flight_store(10);

    for _ in 0..12 {
        publish(
            &transport,
            "flight",
            &Envelope::begin(TransactionId::new(), Body::FlightRequest(flight_request(3))),
        )
        .await;
    }
    transport.close("flight").await;

    let handle = ParticipantService::spawn_resource(
        Arc::new(transport.clone()),
        Arc::clone(&store),
        ServiceOptions::new("flight", REPLIES),
        None,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    handle.join().await;

    let replies = replies(&transport).await;
    assert_eq!(replies.len(), 12);
    let accepted = replies
        .iter()
        .filter(|r| r.state == SagaState::HotelTimedAccept)
        .count();
    let failed = replies
        .iter()
        .filter(|r| r.state == SagaState::FlightTimedFail)
        .count();
    assert_eq!((accepted, failed), (3, 9));
    assert_eq!(store.capacity(flight_id).await.unwrap(), Some(1));
}

#[tokio::test]
async fn undeliverable_payloads_are_rejected_without_requeue() {
    let transport = InMemoryTransport::new();
    let (store, _) = flight_store(10);

    transport
        .publish("flight", b"not an envelope".to_vec())
        .await
        .unwrap();
    publish(
        &transport,
        "flight",
        &Envelope::begin(
            TransactionId::new(),
            Body::PaymentRequest(PaymentRequest { amount_cents: 1 }),
        ),
    )
    .await;
    publish(
        &transport,
        "flight",
        &Envelope::begin(TransactionId::new(), Body::FlightRequest(flight_request(1))),
    )
    .await;
    transport.close("flight").await;

    let handle = ParticipantService::spawn_resource(
        Arc::new(transport.clone()),
        store,
        ServiceOptions::new("flight", REPLIES),
        None,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    handle.join().await;

    assert_eq!(transport.rejected("flight").await, vec![(1, false), (2, false)]);
    assert_eq!(transport.acked("flight").await, vec![3]);
    assert_eq!(replies(&transport).await.len(), 1);
}

#[tokio::test]
async fn structurally_invalid_request_gets_no_reply() {
    let transport = InMemoryTransport::new();
    let (store, _) = flight_store(10);

    let mut bare = Envelope::begin(TransactionId::new(), Body::FlightRequest(flight_request(1)));
    bare.body = None;
    publish(&transport, "flight", &bare).await;
    transport.close("flight").await;

    let handle = ParticipantService::spawn_resource(
        Arc::new(transport.clone()),
        store,
        ServiceOptions::new("flight", REPLIES),
        None,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    handle.join().await;

    // Routed and acked, then dropped by the participant.
    assert_eq!(transport.acked("flight").await, vec![1]);
    assert!(replies(&transport).await.is_empty());
}

#[tokio::test]
async fn payment_service_replies_with_decision() {
    let transport = InMemoryTransport::new();
    let tx = TransactionId::new();
    publish(
        &transport,
        "payment",
        &Envelope::new(
            tx,
            2,
            SagaState::PaymentTimedAccept,
            Body::empty(MessageKind::PaymentRequest),
        ),
    )
    .await;
    transport.close("payment").await;

    let handle = ParticipantService::spawn(
        Arc::new(transport.clone()),
        Arc::new(PaymentStage::new(FixedGateway::decline())),
        ServiceOptions::new("payment", REPLIES),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    handle.join().await;

    let replies = replies(&transport).await;
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].transaction_id, tx);
    assert_eq!(replies[0].state, SagaState::PaymentFailed);
}

#[tokio::test]
async fn shutdown_stops_an_idle_service() {
    let transport = InMemoryTransport::new();
    let (store, _) = flight_store(10);

    let handle = ParticipantService::spawn_resource(
        Arc::new(transport),
        store,
        ServiceOptions::new("flight", REPLIES),
        Some(SweepOptions {
            ttl: Duration::from_secs(900),
            interval: Duration::from_secs(60),
        }),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(handle.task_count(), 4);

    tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
        .await
        .unwrap();
}

#[tokio::test]
async fn coordinator_records_saga_start() {
    let transport = InMemoryTransport::new();
    let log = Arc::new(InMemoryTransactionLog::new());
    let recorder = Arc::new(TransactionRecorder::new(Arc::clone(&log)));

    let order = Envelope::begin(
        TransactionId::new(),
        Body::OrderRequest(OrderRequest::default()),
    );
    publish(&transport, "orders", &order).await;
    transport.close("orders").await;

    let handle = CoordinatorService::spawn(
        Arc::new(transport.clone()),
        Arc::clone(&recorder),
        CoordinatorOptions::new("orders", REPLIES),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    // Replies keep flowing until shutdown.
    tokio::time::timeout(Duration::from_secs(1), async {
        while log.entry_count().await == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    let reply = order.advance(
        SagaState::FlightFullAccept,
        Body::reply(MessageKind::FlightReply, Reply::accepted()).unwrap(),
    );
    publish(&transport, REPLIES, &reply).await;
    transport.close(REPLIES).await;
    handle.join().await;

    assert_eq!(recorder.replay(order.transaction_id).await.unwrap(), vec![order.clone()]);
    assert_eq!(log.read_stream(order.transaction_id).await.unwrap().len(), 1);
    assert_eq!(transport.acked(REPLIES).await, vec![1]);
}
