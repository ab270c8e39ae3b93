//! Connects to the broker and stores, then spawns the configured role.

use std::sync::Arc;

use inventory::{PostgresFlightStore, PostgresHotelStore};
use messaging::{AmqpTransport, Transport};
use saga::{
    CoordinatorOptions, CoordinatorService, ParticipantService, PaymentStage, RandomGateway,
    ServiceHandle, ServiceOptions, SweepOptions, TransactionRecorder,
};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tokio_util::sync::CancellationToken;
use transaction_log::PostgresTransactionLog;

use crate::config::{Config, DatabaseConfig, Role};
use crate::error::{NodeError, Result};

/// Opens a connection pool to the role's database.
pub async fn connect_database(db: &DatabaseConfig) -> Result<PgPool> {
    let mut options = PgConnectOptions::new()
        .host(&db.host)
        .username(&db.user)
        .password(&db.password)
        .database(&db.name);
    if let Some(port) = db.port {
        options = options.port(port);
    }

    tracing::info!(host = %db.host, database = %db.name, "connecting to database");
    Ok(PgPoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?)
}

async fn database(config: &Config) -> Result<PgPool> {
    let db = config
        .database
        .as_ref()
        .ok_or(NodeError::MissingDatabase(config.role))?;
    connect_database(db).await
}

/// Starts the service for `config.role`.
///
/// Broker and database failures are returned before any task is spawned.
#[tracing::instrument(skip_all, fields(role = %config.role))]
pub async fn start(config: &Config, cancel: CancellationToken) -> Result<ServiceHandle> {
    let transport: Arc<dyn Transport> = Arc::new(AmqpTransport::connect(&config.broker).await?);

    let options = ServiceOptions::new(&config.inbound_queue, &config.reply_queue)
        .with_concurrency(config.concurrency);
    let sweep = Some(SweepOptions {
        ttl: config.hold_ttl,
        interval: config.sweep_interval,
    });

    let handle = match config.role {
        Role::Flight => {
            let store = PostgresFlightStore::new(database(config).await?);
            store.run_migrations().await?;
            ParticipantService::spawn_resource(transport, Arc::new(store), options, sweep, cancel)
                .await?
        }
        Role::Hotel => {
            let store = PostgresHotelStore::new(database(config).await?);
            store.run_migrations().await?;
            ParticipantService::spawn_resource(transport, Arc::new(store), options, sweep, cancel)
                .await?
        }
        Role::Payment => {
            let stage = PaymentStage::new(RandomGateway::default());
            ParticipantService::spawn(transport, Arc::new(stage), options, cancel).await?
        }
        Role::Coordinator => {
            let log = PostgresTransactionLog::new(database(config).await?);
            log.run_migrations().await?;
            let recorder = Arc::new(TransactionRecorder::new(Arc::new(log)));
            let options = CoordinatorOptions::new(&config.inbound_queue, &config.reply_queue);
            CoordinatorService::spawn(transport, recorder, options, cancel).await?
        }
    };

    tracing::info!(tasks = handle.task_count(), "service started");
    Ok(handle)
}
