use chrono::{DateTime, Utc};
use common::TransactionId;
use messaging::{Envelope, MessageKind, SagaState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Creates a new random entry ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an entry ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an entry within its transaction's stream.
///
/// The first entry is at 1; an empty stream is at 0.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Sequence(i64);

impl Sequence {
    /// Creates a sequence from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Position of an empty stream.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Position of the first entry.
    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Sequence {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// One recorded envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub entry_id: EntryId,
    pub transaction_id: TransactionId,
    pub sequence: Sequence,
    pub recorded_at: DateTime<Utc>,
    pub envelope: Envelope,
}

impl LogEntry {
    /// Wraps an envelope for storage at the given position of its stream.
    pub fn new(envelope: Envelope, sequence: Sequence) -> Self {
        Self {
            entry_id: EntryId::new(),
            transaction_id: envelope.transaction_id,
            sequence,
            recorded_at: Utc::now(),
            envelope,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.envelope.kind
    }

    pub fn state(&self) -> SagaState {
        self.envelope.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messaging::Body;

    #[test]
    fn sequence_progression() {
        assert_eq!(Sequence::initial().next(), Sequence::first());
        assert!(Sequence::first() > Sequence::initial());
        assert_eq!(Sequence::new(4).next().as_i64(), 5);
    }

    #[test]
    fn entry_takes_transaction_from_envelope() {
        let tx = TransactionId::new();
        let envelope = Envelope::begin(tx, Body::empty(MessageKind::OrderRequest));
        let entry = LogEntry::new(envelope, Sequence::first());

        assert_eq!(entry.transaction_id, tx);
        assert_eq!(entry.kind(), MessageKind::OrderRequest);
        assert_eq!(entry.state(), SagaState::Begin);
    }
}
