use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::TransactionId;
use uuid::Uuid;

use crate::{BookingRequest, Hold, ResourceTable, Result};

/// Result of a provisional reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// A hold exists for the transaction. Returned unchanged if it already
    /// existed, so a redelivered request never takes capacity twice.
    Reserved(Hold),
    /// No matching resource has enough capacity; nothing changed.
    Unavailable,
}

/// Result of confirming a hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The hold is now confirmed.
    Confirmed(Hold),
    /// The transaction holds nothing here.
    NoHold,
}

/// Result of releasing a hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The hold was deleted and its units restored.
    Released(Hold),
    /// Nothing to release.
    NoHold,
}

/// Transactional persistence of resource and hold rows.
///
/// Every operation is one store transaction: it either commits completely or
/// leaves no trace. Callers serialise capacity changes on the same table
/// with a resource gate; stores additionally lock the rows they mutate.
#[async_trait]
pub trait InventoryStore: Send + Sync + 'static {
    /// Booking parameters this store matches against.
    type Request: BookingRequest;

    /// Table this store mutates.
    fn table(&self) -> ResourceTable;

    /// Places a provisional hold.
    ///
    /// Finds a resource matching the request with `amount - units >= 0`,
    /// decrements it by `units` and inserts a provisional hold recording
    /// the units taken.
    async fn reserve(
        &self,
        transaction_id: TransactionId,
        request: &Self::Request,
    ) -> Result<ReserveOutcome>;

    /// Clears the provisional flag of the transaction's hold.
    async fn confirm(&self, transaction_id: TransactionId) -> Result<ConfirmOutcome>;

    /// Deletes the transaction's hold, provisional or confirmed, and adds
    /// its reserved amount back to the resource.
    async fn release(&self, transaction_id: TransactionId) -> Result<ReleaseOutcome>;

    /// Releases every provisional hold placed before `cutoff`.
    ///
    /// Returns the released holds.
    async fn expire_holds(&self, cutoff: DateTime<Utc>) -> Result<Vec<Hold>>;

    /// Returns the transaction's hold, if any.
    async fn hold(&self, transaction_id: TransactionId) -> Result<Option<Hold>>;

    /// Returns the remaining capacity of a resource row.
    async fn capacity(&self, resource_id: Uuid) -> Result<Option<i32>>;
}
