//! Bounded concurrent dispatch of saga steps.

use std::sync::Arc;

use async_trait::async_trait;
use messaging::{Envelope, Stage};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One stage's reaction to an inbound envelope.
///
/// Returns the single reply to publish, or `None` when the envelope is
/// dropped. A handler never produces more than one reply per envelope.
#[async_trait]
pub trait StepHandler: Send + Sync + 'static {
    /// The stage whose request kind this handler consumes.
    fn stage(&self) -> Stage;

    async fn handle(&self, envelope: Envelope) -> Option<Envelope>;
}

/// Admission-controlled worker pool.
///
/// A single loop drains the inbound queue in arrival order. Each envelope
/// waits for a semaphore slot and then runs as its own task; the slot is
/// returned when the task finishes, whatever the outcome. Completion order
/// is not preserved.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
}

impl Dispatcher {
    /// Creates a dispatcher admitting at most `concurrency` steps at once.
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Runs until the inbound queue closes or `cancel` fires.
    ///
    /// Replies are sent to `outbound`. On cancellation no new envelope is
    /// admitted and in-flight steps are abandoned, so uncommitted store
    /// transactions roll back. Returns the number of envelopes dispatched.
    pub async fn run<H>(
        &self,
        mut inbound: mpsc::Receiver<Envelope>,
        handler: Arc<H>,
        outbound: mpsc::Sender<Envelope>,
        cancel: CancellationToken,
    ) -> usize
    where
        H: StepHandler + ?Sized,
    {
        let stage = handler.stage();
        info!(%stage, concurrency = self.concurrency, "Dispatcher started");

        let mut tasks = JoinSet::new();
        let mut dispatched = 0;

        loop {
            let envelope = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = inbound.recv() => match next {
                    Some(envelope) => envelope,
                    None => break,
                },
            };

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            while let Some(finished) = tasks.try_join_next() {
                report(stage, finished);
            }

            debug!(
                %stage,
                transaction_id = %envelope.transaction_id,
                state = %envelope.state,
                "Dispatching step"
            );

            let handler = Arc::clone(&handler);
            let outbound = outbound.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let transaction_id = envelope.transaction_id;

                let reply = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        warn!(%stage, %transaction_id, "Step abandoned on shutdown");
                        None
                    }
                    reply = handler.handle(envelope) => reply,
                };

                if let Some(reply) = reply
                    && outbound.send(reply).await.is_err()
                {
                    error!(%stage, %transaction_id, "Outbound queue closed, reply lost");
                }
            });
            dispatched += 1;
        }

        while let Some(finished) = tasks.join_next().await {
            report(stage, finished);
        }

        info!(%stage, dispatched, "Dispatcher stopped");
        dispatched
    }
}

fn report(stage: Stage, finished: Result<(), tokio::task::JoinError>) {
    if let Err(e) = finished {
        error!(%stage, error = %e, "Step task failed");
        metrics::counter!("saga_step_panics_total", "stage" => stage.as_str()).increment(1);
    }
}
