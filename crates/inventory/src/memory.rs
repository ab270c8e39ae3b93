use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::TransactionId;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    ConfirmOutcome, Flight, Hold, InventoryStore, ReleaseOutcome, ReserveOutcome, Resource,
    ResourceTable, Result, Room, model::validate_units,
};

struct State<R> {
    resources: Vec<R>,
    holds: HashMap<TransactionId, Hold>,
}

impl<R: Resource> State<R> {
    fn restore(&mut self, hold: &Hold) {
        if let Some(resource) = self.resources.iter_mut().find(|r| r.id() == hold.resource_id) {
            let amount = resource.amount() + hold.reserved_amount;
            resource.set_amount(amount);
        }
    }
}

/// In-memory resource store for testing.
///
/// A single lock covers resources and holds, so every operation is atomic.
pub struct InMemoryInventory<R> {
    state: Arc<RwLock<State<R>>>,
    _resource: PhantomData<R>,
}

/// In-memory flight seats.
pub type InMemoryFlightStore = InMemoryInventory<Flight>;

/// In-memory hotel rooms.
pub type InMemoryHotelStore = InMemoryInventory<Room>;

impl<R> Clone for InMemoryInventory<R> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            _resource: PhantomData,
        }
    }
}

impl<R: Resource> Default for InMemoryInventory<R> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<R: Resource> InMemoryInventory<R> {
    /// Creates a store holding the given resource rows.
    pub fn new(resources: Vec<R>) -> Self {
        Self {
            state: Arc::new(RwLock::new(State {
                resources,
                holds: HashMap::new(),
            })),
            _resource: PhantomData,
        }
    }

    /// Adds a resource row.
    pub async fn insert(&self, resource: R) {
        self.state.write().await.resources.push(resource);
    }

    /// Inserts a hold row directly, as if placed at `hold.temporary_at`.
    /// Capacity is not touched.
    pub async fn insert_hold(&self, hold: Hold) {
        self.state
            .write()
            .await
            .holds
            .insert(hold.transaction_id, hold);
    }

    /// Returns all current holds.
    pub async fn holds(&self) -> Vec<Hold> {
        self.state.read().await.holds.values().cloned().collect()
    }
}

#[async_trait]
impl<R: Resource> InventoryStore for InMemoryInventory<R> {
    type Request = R::Request;

    fn table(&self) -> ResourceTable {
        R::TABLE
    }

    async fn reserve(
        &self,
        transaction_id: TransactionId,
        request: &R::Request,
    ) -> Result<ReserveOutcome> {
        let units = validate_units(request)?;
        let mut state = self.state.write().await;

        if let Some(existing) = state.holds.get(&transaction_id) {
            return Ok(ReserveOutcome::Reserved(existing.clone()));
        }

        let Some(resource) = state
            .resources
            .iter_mut()
            .find(|r| r.matches(request) && r.amount() - units >= 0)
        else {
            return Ok(ReserveOutcome::Unavailable);
        };

        let amount = resource.amount() - units;
        resource.set_amount(amount);

        let hold = Hold {
            transaction_id,
            resource_id: resource.id(),
            temporary: true,
            temporary_at: Utc::now(),
            reserved_amount: units,
        };
        state.holds.insert(transaction_id, hold.clone());

        Ok(ReserveOutcome::Reserved(hold))
    }

    async fn confirm(&self, transaction_id: TransactionId) -> Result<ConfirmOutcome> {
        let mut state = self.state.write().await;
        match state.holds.get_mut(&transaction_id) {
            Some(hold) => {
                hold.temporary = false;
                Ok(ConfirmOutcome::Confirmed(hold.clone()))
            }
            None => Ok(ConfirmOutcome::NoHold),
        }
    }

    async fn release(&self, transaction_id: TransactionId) -> Result<ReleaseOutcome> {
        let mut state = self.state.write().await;
        match state.holds.remove(&transaction_id) {
            Some(hold) => {
                state.restore(&hold);
                Ok(ReleaseOutcome::Released(hold))
            }
            None => Ok(ReleaseOutcome::NoHold),
        }
    }

    async fn expire_holds(&self, cutoff: DateTime<Utc>) -> Result<Vec<Hold>> {
        let mut state = self.state.write().await;

        let expired: Vec<TransactionId> = state
            .holds
            .values()
            .filter(|h| h.temporary && h.temporary_at < cutoff)
            .map(|h| h.transaction_id)
            .collect();

        let mut released = Vec::with_capacity(expired.len());
        for transaction_id in expired {
            if let Some(hold) = state.holds.remove(&transaction_id) {
                state.restore(&hold);
                released.push(hold);
            }
        }

        Ok(released)
    }

    async fn hold(&self, transaction_id: TransactionId) -> Result<Option<Hold>> {
        Ok(self.state.read().await.holds.get(&transaction_id).cloned())
    }

    async fn capacity(&self, resource_id: Uuid) -> Result<Option<i32>> {
        Ok(self
            .state
            .read()
            .await
            .resources
            .iter()
            .find(|r| r.id() == resource_id)
            .map(|r| r.amount()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use messaging::{FlightRequest, HotelRequest};

    fn departure() -> DateTime<Utc> {
        "2024-06-01T10:00:00Z".parse().unwrap()
    }

    fn flight_request(passengers: i32) -> FlightRequest {
        FlightRequest {
            city_from: "Warsaw".to_string(),
            city_to: "Lisbon".to_string(),
            book_from: departure(),
            book_to: "2024-06-08T10:00:00Z".parse().unwrap(),
            passenger_count: passengers,
        }
    }

    fn store_with(capacity: i32) -> (InMemoryFlightStore, Uuid) {
        let flight = Flight::new("Warsaw", "Lisbon", departure(), capacity);
        let id = flight.id;
        (InMemoryFlightStore::new(vec![flight]), id)
    }

    #[tokio::test]
    async fn reserve_decrements_and_records_units() {
        let (store, flight_id) = store_with(10);
        let tx = TransactionId::new();

        let outcome = store.reserve(tx, &flight_request(4)).await.unwrap();
        let ReserveOutcome::Reserved(hold) = outcome else {
            panic!("expected a hold");
        };
        assert_eq!(hold.reserved_amount, 4);
        assert!(hold.temporary);
        assert_eq!(store.capacity(flight_id).await.unwrap(), Some(6));
    }

    #[tokio::test]
    async fn reserve_without_capacity_changes_nothing() {
        let (store, flight_id) = store_with(3);
        let tx = TransactionId::new();

        let outcome = store.reserve(tx, &flight_request(4)).await.unwrap();
        assert_eq!(outcome, ReserveOutcome::Unavailable);
        assert_eq!(store.capacity(flight_id).await.unwrap(), Some(3));
        assert!(store.hold(tx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exact_capacity_is_accepted() {
        let (store, flight_id) = store_with(4);
        let outcome = store
            .reserve(TransactionId::new(), &flight_request(4))
            .await
            .unwrap();
        assert!(matches!(outcome, ReserveOutcome::Reserved(_)));
        assert_eq!(store.capacity(flight_id).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn repeated_reserve_returns_existing_hold() {
        let (store, flight_id) = store_with(10);
        let tx = TransactionId::new();

        let first = store.reserve(tx, &flight_request(4)).await.unwrap();
        let second = store.reserve(tx, &flight_request(4)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.capacity(flight_id).await.unwrap(), Some(6));
    }

    #[tokio::test]
    async fn invalid_units_are_rejected() {
        let (store, _) = store_with(10);
        assert!(
            store
                .reserve(TransactionId::new(), &flight_request(0))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn confirm_clears_flag_without_touching_capacity() {
        let (store, flight_id) = store_with(10);
        let tx = TransactionId::new();
        store.reserve(tx, &flight_request(4)).await.unwrap();

        let ConfirmOutcome::Confirmed(hold) = store.confirm(tx).await.unwrap() else {
            panic!("expected confirmation");
        };
        assert!(!hold.temporary);
        assert_eq!(store.capacity(flight_id).await.unwrap(), Some(6));

        assert_eq!(
            store.confirm(TransactionId::new()).await.unwrap(),
            ConfirmOutcome::NoHold
        );
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let (store, flight_id) = store_with(10);
        let tx = TransactionId::new();
        store.reserve(tx, &flight_request(4)).await.unwrap();

        assert!(matches!(
            store.release(tx).await.unwrap(),
            ReleaseOutcome::Released(_)
        ));
        assert_eq!(store.release(tx).await.unwrap(), ReleaseOutcome::NoHold);
        assert_eq!(store.capacity(flight_id).await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn expiry_releases_only_old_provisional_holds() {
        let (store, flight_id) = store_with(10);
        let old = TransactionId::new();
        let confirmed = TransactionId::new();
        let fresh = TransactionId::new();

        store.reserve(old, &flight_request(2)).await.unwrap();
        store.reserve(confirmed, &flight_request(3)).await.unwrap();
        store.confirm(confirmed).await.unwrap();
        store.reserve(fresh, &flight_request(1)).await.unwrap();

        // Age the first hold past the cutoff.
        let mut aged = store.hold(old).await.unwrap().unwrap();
        aged.temporary_at = Utc::now() - Duration::hours(2);
        store.insert_hold(aged).await;

        let released = store
            .expire_holds(Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].transaction_id, old);
        assert_eq!(store.capacity(flight_id).await.unwrap(), Some(6));
        assert!(store.hold(confirmed).await.unwrap().is_some());
        assert!(store.hold(fresh).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn hotel_store_matches_room_type() {
        let double = Room::new("Gdansk", "double", 2);
        let double_id = double.id;
        let store = InMemoryHotelStore::new(vec![Room::new("Gdansk", "single", 5), double]);

        let request = HotelRequest {
            city: "Gdansk".to_string(),
            room_type: "double".to_string(),
            rooms: 2,
            ..Default::default()
        };
        let ReserveOutcome::Reserved(hold) =
            store.reserve(TransactionId::new(), &request).await.unwrap()
        else {
            panic!("expected a hold");
        };
        assert_eq!(hold.resource_id, double_id);
        assert_eq!(store.capacity(double_id).await.unwrap(), Some(0));
        assert_eq!(store.table(), ResourceTable::Rooms);
    }
}
