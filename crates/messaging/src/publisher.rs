//! Republishes produced envelopes through the transport.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::envelope::Envelope;
use crate::transport::Transport;

/// Drains the single outbound queue of a service into one broker queue.
///
/// One queue, one consumer: envelopes leave in the order they were produced.
#[derive(Clone)]
pub struct OutboundPublisher {
    transport: Arc<dyn Transport>,
    queue: String,
}

impl OutboundPublisher {
    /// Creates a publisher targeting `queue`.
    pub fn new(transport: Arc<dyn Transport>, queue: impl Into<String>) -> Self {
        Self {
            transport,
            queue: queue.into(),
        }
    }

    /// Destination queue name.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Encodes and publishes one envelope.
    ///
    /// Returns false if it could not be sent; the error is logged.
    pub async fn publish(&self, envelope: &Envelope) -> bool {
        let payload = match envelope.encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    transaction_id = %envelope.transaction_id,
                    kind = %envelope.kind,
                    error = %e,
                    "Refusing to publish invalid envelope"
                );
                metrics::counter!("publisher_failures_total", "reason" => "encode").increment(1);
                return false;
            }
        };

        match self.transport.publish(&self.queue, payload).await {
            Ok(()) => {
                debug!(
                    transaction_id = %envelope.transaction_id,
                    kind = %envelope.kind,
                    state = %envelope.state,
                    queue = %self.queue,
                    "Published envelope"
                );
                metrics::counter!("publisher_envelopes_total", "state" => envelope.state.as_str())
                    .increment(1);
                true
            }
            Err(e) => {
                error!(
                    transaction_id = %envelope.transaction_id,
                    queue = %self.queue,
                    error = %e,
                    "Failed to publish envelope"
                );
                metrics::counter!("publisher_failures_total", "reason" => "transport").increment(1);
                false
            }
        }
    }

    /// Runs until `rx` closes or `cancel` fires.
    ///
    /// On cancellation, envelopes already queued are still published before
    /// returning. Returns the number of envelopes published.
    pub async fn run(self, mut rx: mpsc::Receiver<Envelope>, cancel: CancellationToken) -> usize {
        info!(queue = %self.queue, "Outbound publisher started");
        let mut published = 0;

        loop {
            tokio::select! {
                biased;
                maybe = rx.recv() => match maybe {
                    Some(envelope) => {
                        if self.publish(&envelope).await {
                            published += 1;
                        }
                    }
                    None => break,
                },
                _ = cancel.cancelled() => {
                    rx.close();
                    while let Some(envelope) = rx.recv().await {
                        if self.publish(&envelope).await {
                            published += 1;
                        }
                    }
                    break;
                }
            }
        }

        info!(queue = %self.queue, published, "Outbound publisher stopped");
        published
    }
}
