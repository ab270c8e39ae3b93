//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container.
//! Run with:
//!
//! ```bash
//! cargo test -p transaction-log --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::TransactionId;
use futures_util::StreamExt;
use messaging::{Body, Envelope, MessageKind, SagaState};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use transaction_log::{
    AppendOptions, PostgresTransactionLog, Sequence, TransactionLog, TransactionLogError,
    TransactionLogExt,
};

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_transaction_log.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_log() -> PostgresTransactionLog {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE transaction_log")
        .execute(&pool)
        .await
        .unwrap();

    PostgresTransactionLog::new(pool)
}

fn order(tx: TransactionId) -> Envelope {
    Envelope::begin(tx, Body::empty(MessageKind::OrderRequest))
}

#[tokio::test]
#[serial]
async fn append_and_read_back() {
    let log = get_test_log().await;
    let tx = TransactionId::new();
    let request = order(tx);

    let sequence = log
        .append_envelope(request.clone(), AppendOptions::expect_new())
        .await
        .unwrap();
    assert_eq!(sequence, Sequence::first());

    let stream = log.read_stream(tx).await.unwrap();
    assert_eq!(stream.len(), 1);
    assert_eq!(stream[0].envelope, request);
    assert_eq!(stream[0].transaction_id, tx);
}

#[tokio::test]
#[serial]
async fn appends_batch_atomically() {
    let log = get_test_log().await;
    let tx = TransactionId::new();
    let first = order(tx);
    let second = first.advance(
        SagaState::HotelTimedAccept,
        Body::empty(MessageKind::HotelRequest),
    );
    let third = second.advance(
        SagaState::PaymentTimedAccept,
        Body::empty(MessageKind::PaymentRequest),
    );

    let last = log
        .append(tx, vec![first, second, third], AppendOptions::expect_new())
        .await
        .unwrap();
    assert_eq!(last, Sequence::new(3));
    assert_eq!(log.stream_position(tx).await.unwrap(), Some(Sequence::new(3)));

    let tail = log.read_stream_from(tx, Sequence::new(2)).await.unwrap();
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[1].state(), SagaState::PaymentTimedAccept);
}

#[tokio::test]
#[serial]
async fn stale_expectation_is_a_conflict() {
    let log = get_test_log().await;
    let tx = TransactionId::new();

    log.append_envelope(order(tx), AppendOptions::expect_new())
        .await
        .unwrap();

    let result = log
        .append_envelope(order(tx), AppendOptions::expect_new())
        .await;
    assert!(matches!(
        result,
        Err(TransactionLogError::SequenceConflict { .. })
    ));
    assert_eq!(log.read_stream(tx).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn unknown_stream_is_empty() {
    let log = get_test_log().await;
    let tx = TransactionId::new();

    assert!(log.read_stream(tx).await.unwrap().is_empty());
    assert_eq!(log.stream_position(tx).await.unwrap(), None);
    assert!(!log.stream_exists(tx).await.unwrap());
}

#[tokio::test]
#[serial]
async fn stream_all_in_insertion_order() {
    let log = get_test_log().await;
    let a = TransactionId::new();
    let b = TransactionId::new();

    log.append_envelope(order(b), AppendOptions::new())
        .await
        .unwrap();
    log.append_envelope(order(a), AppendOptions::new())
        .await
        .unwrap();
    log.append_envelope(order(b), AppendOptions::new())
        .await
        .unwrap();

    let entries: Vec<_> = log
        .stream_all()
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;
    let positions: Vec<_> = entries
        .iter()
        .map(|e| (e.transaction_id, e.sequence.as_i64()))
        .collect();
    assert_eq!(positions, vec![(b, 1), (a, 1), (b, 2)]);
}
