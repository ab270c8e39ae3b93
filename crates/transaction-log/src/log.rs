use std::pin::Pin;

use async_trait::async_trait;
use common::TransactionId;
use futures_core::Stream;
use messaging::Envelope;

use crate::{LogEntry, Result, Sequence, TransactionLogError};

/// Options for appending to a transaction's stream.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Expected position of the stream before the append.
    /// If None, no check is performed.
    pub expected_sequence: Option<Sequence>,
}

impl AppendOptions {
    /// Creates options with no sequence check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the stream to be at `sequence`.
    pub fn expect_sequence(sequence: Sequence) -> Self {
        Self {
            expected_sequence: Some(sequence),
        }
    }

    /// Creates options expecting the stream to be empty.
    pub fn expect_new() -> Self {
        Self {
            expected_sequence: Some(Sequence::initial()),
        }
    }
}

/// A stream of log entries.
pub type EntryStream = Pin<Box<dyn Stream<Item = Result<LogEntry>> + Send>>;

/// Core trait for transaction log implementations.
///
/// The log never updates or deletes an entry. All implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait TransactionLog: Send + Sync {
    /// Appends envelopes to one transaction's stream.
    ///
    /// Envelopes are appended atomically and receive consecutive sequences
    /// after the current end of the stream. If `options.expected_sequence`
    /// is set and the stream is elsewhere, fails with `SequenceConflict`.
    ///
    /// Returns the sequence of the last appended entry.
    async fn append(
        &self,
        transaction_id: TransactionId,
        envelopes: Vec<Envelope>,
        options: AppendOptions,
    ) -> Result<Sequence>;

    /// Retrieves a transaction's stream, oldest first.
    async fn read_stream(&self, transaction_id: TransactionId) -> Result<Vec<LogEntry>>;

    /// Retrieves a transaction's stream starting at `from` (inclusive).
    async fn read_stream_from(
        &self,
        transaction_id: TransactionId,
        from: Sequence,
    ) -> Result<Vec<LogEntry>>;

    /// Returns the last sequence of a transaction, or None if it has no entries.
    async fn stream_position(&self, transaction_id: TransactionId) -> Result<Option<Sequence>>;

    /// Streams every entry in the log in insertion order.
    async fn stream_all(&self) -> Result<EntryStream>;
}

/// Convenience methods for transaction logs.
#[async_trait]
pub trait TransactionLogExt: TransactionLog {
    /// Appends a single envelope to its own transaction's stream.
    async fn append_envelope(&self, envelope: Envelope, options: AppendOptions) -> Result<Sequence> {
        self.append(envelope.transaction_id, vec![envelope], options)
            .await
    }

    /// Checks if a transaction has any entries.
    async fn stream_exists(&self, transaction_id: TransactionId) -> Result<bool> {
        Ok(self.stream_position(transaction_id).await?.is_some())
    }
}

impl<T: TransactionLog + ?Sized> TransactionLogExt for T {}

/// Rejects empty appends and envelopes belonging to another transaction.
pub(crate) fn validate_append(transaction_id: TransactionId, envelopes: &[Envelope]) -> Result<()> {
    if envelopes.is_empty() {
        return Err(TransactionLogError::InvalidAppend(
            "Cannot append an empty envelope list".to_string(),
        ));
    }

    if let Some(stray) = envelopes
        .iter()
        .find(|e| e.transaction_id != transaction_id)
    {
        return Err(TransactionLogError::InvalidAppend(format!(
            "Envelope of transaction {} appended to stream {}",
            stray.transaction_id, transaction_id
        )));
    }

    Ok(())
}
