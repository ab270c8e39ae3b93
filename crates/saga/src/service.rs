//! Wiring of transport, router, dispatcher and publisher into running services.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use inventory::InventoryStore;
use messaging::{
    DeliveryStream, Envelope, MessageKind, OutboundPublisher, Router, Transport,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use transaction_log::TransactionLog;

use crate::dispatcher::{Dispatcher, StepHandler};
use crate::error::Result;
use crate::participant::{Participant, StageRequest};
use crate::recorder::{RecordOutcome, TransactionRecorder};
use crate::sweeper::HoldSweeper;

/// Default bound on in-flight steps per participant.
pub const DEFAULT_CONCURRENCY: usize = 6;

/// Default capacity of the internal per-kind and outbound queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Queues and limits of one participant service.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Broker queue the participant consumes requests from.
    pub inbound_queue: String,
    /// Broker queue replies are published to.
    pub reply_queue: String,
    pub concurrency: usize,
    pub queue_capacity: usize,
}

impl ServiceOptions {
    pub fn new(inbound_queue: impl Into<String>, reply_queue: impl Into<String>) -> Self {
        Self {
            inbound_queue: inbound_queue.into(),
            reply_queue: reply_queue.into(),
            concurrency: DEFAULT_CONCURRENCY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

/// Expiry settings for a resource participant's sweeper.
#[derive(Debug, Clone, Copy)]
pub struct SweepOptions {
    pub ttl: Duration,
    pub interval: Duration,
}

/// The running tasks of a service and the token that stops them.
#[derive(Debug)]
pub struct ServiceHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ServiceHandle {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            tasks: Vec::new(),
        }
    }

    /// Spawns a task owned by this service.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push(tokio::spawn(task));
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Cancels every task and waits for all of them to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.join().await;
    }

    /// Waits for every task to finish without cancelling.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Service task failed");
            }
        }
    }
}

/// Feeds broker deliveries through a router until cancelled or the
/// delivery stream ends. Dropping the router afterwards closes its queues.
async fn consume(
    queue: String,
    mut deliveries: DeliveryStream,
    router: Router,
    cancel: CancellationToken,
) {
    info!(%queue, "Consumer started");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = deliveries.next() => match next {
                Some(Ok(delivery)) => {
                    router.handle_delivery(delivery).await;
                }
                Some(Err(e)) => {
                    warn!(%queue, error = %e, "Delivery error");
                }
                None => break,
            },
        }
    }
    info!(%queue, "Consumer stopped");
}

/// A saga participant bound to broker queues.
pub struct ParticipantService;

impl ParticipantService {
    /// Declares the queues, starts consuming and spawns the consumer,
    /// dispatcher and publisher tasks.
    ///
    /// Fails only if the broker refuses to declare or consume.
    #[tracing::instrument(skip_all, fields(stage = %handler.stage(), queue = %options.inbound_queue))]
    pub async fn spawn<H>(
        transport: Arc<dyn Transport>,
        handler: Arc<H>,
        options: ServiceOptions,
        cancel: CancellationToken,
    ) -> Result<ServiceHandle>
    where
        H: StepHandler,
    {
        transport.declare_queue(&options.inbound_queue).await?;
        transport.declare_queue(&options.reply_queue).await?;
        let deliveries = transport.consume(&options.inbound_queue).await?;

        let capacity = options.queue_capacity.max(1);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);

        let router = Router::new([(handler.stage().request_kind(), inbound_tx)]);
        let dispatcher = Dispatcher::new(options.concurrency);
        let publisher = OutboundPublisher::new(Arc::clone(&transport), options.reply_queue.clone());

        let mut handle = ServiceHandle::new(cancel.clone());
        handle.spawn(consume(
            options.inbound_queue.clone(),
            deliveries,
            router,
            cancel.clone(),
        ));
        {
            let cancel = cancel.clone();
            handle.spawn(async move {
                dispatcher
                    .run(inbound_rx, handler, outbound_tx, cancel)
                    .await;
            });
        }
        handle.spawn(async move {
            publisher.run(outbound_rx, cancel).await;
        });

        info!("Participant service started");
        Ok(handle)
    }

    /// Spawns a flight or hotel participant over `store`, plus its hold
    /// sweeper when `sweep` is set. Sweeper and rollbacks share a gate.
    pub async fn spawn_resource<S>(
        transport: Arc<dyn Transport>,
        store: Arc<S>,
        options: ServiceOptions,
        sweep: Option<SweepOptions>,
        cancel: CancellationToken,
    ) -> Result<ServiceHandle>
    where
        S: InventoryStore,
        S::Request: StageRequest,
    {
        let participant = Participant::new(Arc::clone(&store));
        let read_gate = participant.gates().read().clone();

        let mut handle =
            Self::spawn(transport, Arc::new(participant), options, cancel.clone()).await?;

        if let Some(sweep) = sweep {
            let sweeper = HoldSweeper::new(store, read_gate, sweep.ttl, sweep.interval);
            handle.spawn(sweeper.run(cancel));
        }
        Ok(handle)
    }
}

/// Queues of the coordinator service.
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Queue new orders arrive on.
    pub order_queue: String,
    /// Queue participants publish replies to.
    pub reply_queue: String,
    pub queue_capacity: usize,
}

impl CoordinatorOptions {
    pub fn new(order_queue: impl Into<String>, reply_queue: impl Into<String>) -> Self {
        Self {
            order_queue: order_queue.into(),
            reply_queue: reply_queue.into(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Records saga starts and reads back streams on every reply.
pub struct CoordinatorService;

impl CoordinatorService {
    #[tracing::instrument(skip_all, fields(orders = %options.order_queue, replies = %options.reply_queue))]
    pub async fn spawn<L>(
        transport: Arc<dyn Transport>,
        recorder: Arc<TransactionRecorder<L>>,
        options: CoordinatorOptions,
        cancel: CancellationToken,
    ) -> Result<ServiceHandle>
    where
        L: TransactionLog + 'static,
    {
        transport.declare_queue(&options.order_queue).await?;
        transport.declare_queue(&options.reply_queue).await?;
        let orders = transport.consume(&options.order_queue).await?;
        let replies = transport.consume(&options.reply_queue).await?;

        let capacity = options.queue_capacity.max(1);
        let (order_tx, order_rx) = mpsc::channel(capacity);
        let (reply_tx, reply_rx) = mpsc::channel(capacity);

        let order_router = Router::new([(MessageKind::OrderRequest, order_tx)]);
        let reply_router = Router::new(
            MessageKind::ALL
                .into_iter()
                .filter(|kind| *kind != MessageKind::OrderRequest)
                .map(|kind| (kind, reply_tx.clone())),
        );
        drop(reply_tx);

        let mut handle = ServiceHandle::new(cancel.clone());
        handle.spawn(consume(
            options.order_queue.clone(),
            orders,
            order_router,
            cancel.clone(),
        ));
        handle.spawn(consume(
            options.reply_queue.clone(),
            replies,
            reply_router,
            cancel.clone(),
        ));
        handle.spawn(record(order_rx, Arc::clone(&recorder), true, cancel.clone()));
        handle.spawn(record(reply_rx, recorder, false, cancel));

        info!("Coordinator service started");
        Ok(handle)
    }
}

async fn record<L: TransactionLog>(
    mut rx: mpsc::Receiver<Envelope>,
    recorder: Arc<TransactionRecorder<L>>,
    remember: bool,
    cancel: CancellationToken,
) {
    loop {
        let envelope = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(envelope) => envelope,
                None => break,
            },
        };

        if remember {
            recorder.remember_request(envelope.clone()).await;
        }
        match recorder.on_reply(&envelope).await {
            Ok(RecordOutcome::Appended(sequence)) => {
                info!(transaction_id = %envelope.transaction_id, %sequence, "Saga recorded");
            }
            Ok(RecordOutcome::History(history)) => {
                info!(
                    transaction_id = %envelope.transaction_id,
                    state = %envelope.state,
                    entries = history.len(),
                    "Reply received"
                );
            }
            Err(e) => {
                error!(transaction_id = %envelope.transaction_id, error = %e, "Failed to record envelope");
                metrics::counter!("saga_record_failures_total").increment(1);
            }
        }
    }
}
