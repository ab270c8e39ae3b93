//! Coordinator-side audit trail of each saga.

use std::collections::HashMap;
use std::sync::Arc;

use common::TransactionId;
use messaging::{Envelope, SagaState};
use tokio::sync::RwLock;
use tracing::{debug, info};
use transaction_log::{AppendOptions, LogEntry, Sequence, TransactionLog};

use crate::error::Result;

/// What recording one reply did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new saga started; its request was appended at this sequence.
    Appended(Sequence),
    /// An existing saga progressed; its stream as read back.
    History(Vec<LogEntry>),
}

/// Writes saga starts to the transaction log and reads streams back for
/// every later reply.
///
/// The log is for audit and recovery; nothing here steers the saga.
pub struct TransactionRecorder<L> {
    log: Arc<L>,
    pending: RwLock<HashMap<TransactionId, Envelope>>,
}

impl<L: TransactionLog> TransactionRecorder<L> {
    pub fn new(log: Arc<L>) -> Self {
        Self {
            log,
            pending: RwLock::new(HashMap::new()),
        }
    }

    pub fn log(&self) -> &Arc<L> {
        &self.log
    }

    /// Remembers the request that starts a transaction.
    ///
    /// Only `Begin` envelopes are kept; they are taken back out when the
    /// start is recorded. Returns whether the request was remembered.
    pub async fn remember_request(&self, request: Envelope) -> bool {
        if request.state != SagaState::Begin {
            return false;
        }
        self.pending
            .write()
            .await
            .insert(request.transaction_id, request);
        true
    }

    /// Records one inbound envelope.
    ///
    /// A `Begin` appends the remembered request, or the envelope itself if
    /// none was remembered, expecting the stream to be where it was just
    /// read. Any other state reads the stream back.
    #[tracing::instrument(skip(self, reply), fields(transaction_id = %reply.transaction_id, state = %reply.state))]
    pub async fn on_reply(&self, reply: &Envelope) -> Result<RecordOutcome> {
        let transaction_id = reply.transaction_id;

        if reply.state != SagaState::Begin {
            let history = self.log.read_stream(transaction_id).await?;
            debug!(entries = history.len(), "Read back transaction stream");
            return Ok(RecordOutcome::History(history));
        }

        let request = self
            .pending
            .write()
            .await
            .remove(&transaction_id)
            .unwrap_or_else(|| reply.clone());

        let position = self
            .log
            .stream_position(transaction_id)
            .await?
            .unwrap_or_else(Sequence::initial);

        let sequence = self
            .log
            .append(
                transaction_id,
                vec![request],
                AppendOptions::expect_sequence(position),
            )
            .await?;

        info!(%sequence, "Saga start recorded");
        metrics::counter!("saga_starts_recorded_total").increment(1);
        Ok(RecordOutcome::Appended(sequence))
    }

    /// Returns the envelopes recorded for a transaction, oldest first.
    pub async fn replay(&self, transaction_id: TransactionId) -> Result<Vec<Envelope>> {
        Ok(self
            .log
            .read_stream(transaction_id)
            .await?
            .into_iter()
            .map(|entry| entry.envelope)
            .collect())
    }

    /// Number of requests remembered but not yet recorded.
    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }
}
