use std::sync::Arc;

use async_trait::async_trait;
use common::TransactionId;
use messaging::Envelope;
use tokio::sync::RwLock;

use crate::{
    LogEntry, Result, Sequence, TransactionLogError,
    log::{AppendOptions, EntryStream, TransactionLog, validate_append},
};

/// In-memory transaction log for tests and single-process runs.
///
/// Entries are kept in one vector in insertion order.
#[derive(Clone, Default)]
pub struct InMemoryTransactionLog {
    entries: Arc<RwLock<Vec<LogEntry>>>,
}

impl InMemoryTransactionLog {
    /// Creates a new empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of entries across all transactions.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl TransactionLog for InMemoryTransactionLog {
    async fn append(
        &self,
        transaction_id: TransactionId,
        envelopes: Vec<Envelope>,
        options: AppendOptions,
    ) -> Result<Sequence> {
        validate_append(transaction_id, &envelopes)?;

        let mut entries = self.entries.write().await;

        let current = entries
            .iter()
            .filter(|e| e.transaction_id == transaction_id)
            .map(|e| e.sequence)
            .max()
            .unwrap_or(Sequence::initial());

        if let Some(expected) = options.expected_sequence
            && current != expected
        {
            return Err(TransactionLogError::SequenceConflict {
                transaction_id,
                expected,
                actual: current,
            });
        }

        let mut sequence = current;
        for envelope in envelopes {
            sequence = sequence.next();
            entries.push(LogEntry::new(envelope, sequence));
        }

        Ok(sequence)
    }

    async fn read_stream(&self, transaction_id: TransactionId) -> Result<Vec<LogEntry>> {
        self.read_stream_from(transaction_id, Sequence::first())
            .await
    }

    async fn read_stream_from(
        &self,
        transaction_id: TransactionId,
        from: Sequence,
    ) -> Result<Vec<LogEntry>> {
        let entries = self.entries.read().await;
        let mut stream: Vec<_> = entries
            .iter()
            .filter(|e| e.transaction_id == transaction_id && e.sequence >= from)
            .cloned()
            .collect();
        stream.sort_by_key(|e| e.sequence);
        Ok(stream)
    }

    async fn stream_position(&self, transaction_id: TransactionId) -> Result<Option<Sequence>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.transaction_id == transaction_id)
            .map(|e| e.sequence)
            .max())
    }

    async fn stream_all(&self) -> Result<EntryStream> {
        use futures_util::stream;

        let entries = self.entries.read().await.clone();
        Ok(Box::pin(stream::iter(entries.into_iter().map(Ok))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransactionLogExt;
    use futures_util::StreamExt;
    use messaging::{Body, MessageKind, SagaState};

    fn request(tx: TransactionId) -> Envelope {
        Envelope::begin(tx, Body::empty(MessageKind::FlightRequest))
    }

    #[tokio::test]
    async fn append_assigns_consecutive_sequences() {
        let log = InMemoryTransactionLog::new();
        let tx = TransactionId::new();
        let first = request(tx);
        let second = first.advance(
            SagaState::HotelTimedAccept,
            Body::empty(MessageKind::HotelRequest),
        );

        let last = log
            .append(tx, vec![first, second], AppendOptions::expect_new())
            .await
            .unwrap();
        assert_eq!(last, Sequence::new(2));

        let stream = log.read_stream(tx).await.unwrap();
        assert_eq!(stream.len(), 2);
        assert_eq!(stream[0].sequence, Sequence::first());
        assert_eq!(stream[1].state(), SagaState::HotelTimedAccept);
    }

    #[tokio::test]
    async fn sequence_conflict_on_stale_expectation() {
        let log = InMemoryTransactionLog::new();
        let tx = TransactionId::new();

        log.append_envelope(request(tx), AppendOptions::expect_new())
            .await
            .unwrap();

        let result = log
            .append_envelope(request(tx), AppendOptions::expect_new())
            .await;
        assert!(matches!(
            result,
            Err(TransactionLogError::SequenceConflict { actual, .. }) if actual == Sequence::first()
        ));
        assert_eq!(log.entry_count().await, 1);
    }

    #[tokio::test]
    async fn rejects_empty_and_foreign_appends() {
        let log = InMemoryTransactionLog::new();
        let tx = TransactionId::new();

        assert!(matches!(
            log.append(tx, vec![], AppendOptions::new()).await,
            Err(TransactionLogError::InvalidAppend(_))
        ));
        assert!(matches!(
            log.append(tx, vec![request(TransactionId::new())], AppendOptions::new())
                .await,
            Err(TransactionLogError::InvalidAppend(_))
        ));
    }

    #[tokio::test]
    async fn streams_are_isolated_per_transaction() {
        let log = InMemoryTransactionLog::new();
        let a = TransactionId::new();
        let b = TransactionId::new();

        log.append_envelope(request(a), AppendOptions::new())
            .await
            .unwrap();
        log.append_envelope(request(b), AppendOptions::new())
            .await
            .unwrap();
        log.append_envelope(request(a), AppendOptions::new())
            .await
            .unwrap();

        assert_eq!(log.stream_position(a).await.unwrap(), Some(Sequence::new(2)));
        assert_eq!(log.stream_position(b).await.unwrap(), Some(Sequence::first()));
        assert!(!log.stream_exists(TransactionId::new()).await.unwrap());

        let tail = log.read_stream_from(a, Sequence::new(2)).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].sequence, Sequence::new(2));
    }

    #[tokio::test]
    async fn stream_all_preserves_insertion_order() {
        let log = InMemoryTransactionLog::new();
        let a = TransactionId::new();
        let b = TransactionId::new();

        log.append_envelope(request(b), AppendOptions::new())
            .await
            .unwrap();
        log.append_envelope(request(a), AppendOptions::new())
            .await
            .unwrap();

        let all: Vec<_> = log.stream_all().await.unwrap().collect().await;
        let order: Vec<_> = all
            .into_iter()
            .map(|e| e.unwrap().transaction_id)
            .collect();
        assert_eq!(order, vec![b, a]);
    }
}
