//! Resource and hold rows.

use chrono::{DateTime, Utc};
use common::TransactionId;
use messaging::{FlightRequest, HotelRequest};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The logical table a store guards. Resource locks are scoped per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceTable {
    Flights,
    Rooms,
}

impl ResourceTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceTable::Flights => "flights",
            ResourceTable::Rooms => "rooms",
        }
    }
}

impl std::fmt::Display for ResourceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request that asks for a number of units of some resource.
pub trait BookingRequest: Clone + Send + Sync + 'static {
    /// Units to hold; must be positive.
    fn units(&self) -> i32;
}

impl BookingRequest for FlightRequest {
    fn units(&self) -> i32 {
        self.passenger_count
    }
}

impl BookingRequest for HotelRequest {
    fn units(&self) -> i32 {
        self.rooms
    }
}

/// A row with a capacity counter that requests can be matched against.
pub trait Resource: Clone + Send + Sync + 'static {
    type Request: BookingRequest;

    /// Table this row lives in.
    const TABLE: ResourceTable;

    fn id(&self) -> Uuid;

    /// Remaining capacity.
    fn amount(&self) -> i32;

    fn set_amount(&mut self, amount: i32);

    /// Whether this row satisfies the request's matching attributes.
    /// Capacity is checked separately.
    fn matches(&self, request: &Self::Request) -> bool;
}

/// A scheduled flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flight {
    pub id: Uuid,
    pub city_from: String,
    pub city_to: String,
    pub departure: DateTime<Utc>,
    /// Seats left.
    pub amount: i32,
}

impl Flight {
    pub fn new(
        city_from: impl Into<String>,
        city_to: impl Into<String>,
        departure: DateTime<Utc>,
        amount: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            city_from: city_from.into(),
            city_to: city_to.into(),
            departure,
            amount,
        }
    }
}

impl Resource for Flight {
    type Request = FlightRequest;

    const TABLE: ResourceTable = ResourceTable::Flights;

    fn id(&self) -> Uuid {
        self.id
    }

    fn amount(&self) -> i32 {
        self.amount
    }

    fn set_amount(&mut self, amount: i32) {
        self.amount = amount;
    }

    fn matches(&self, request: &FlightRequest) -> bool {
        self.city_from == request.city_from
            && self.city_to == request.city_to
            && self.departure == request.book_from
    }
}

/// A room category in a hotel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub city: String,
    /// Room category, matched against the request's room type.
    pub name: String,
    pub min_people: i32,
    pub max_people: i32,
    /// Rooms of this category left.
    pub amount: i32,
}

impl Room {
    pub fn new(city: impl Into<String>, name: impl Into<String>, amount: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            city: city.into(),
            name: name.into(),
            min_people: 1,
            max_people: 2,
            amount,
        }
    }
}

impl Resource for Room {
    type Request = HotelRequest;

    const TABLE: ResourceTable = ResourceTable::Rooms;

    fn id(&self) -> Uuid {
        self.id
    }

    fn amount(&self) -> i32 {
        self.amount
    }

    fn set_amount(&mut self, amount: i32) {
        self.amount = amount;
    }

    fn matches(&self, request: &HotelRequest) -> bool {
        self.city == request.city && self.name == request.room_type
    }
}

/// Units of one resource held by one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    pub transaction_id: TransactionId,
    pub resource_id: Uuid,
    /// True until the hold is confirmed.
    pub temporary: bool,
    /// When the provisional hold was placed; drives expiry.
    pub temporary_at: DateTime<Utc>,
    /// Units taken from the resource, restored on release.
    pub reserved_amount: i32,
}

/// Rejects requests that cannot be evaluated.
pub(crate) fn validate_units<R: BookingRequest>(request: &R) -> crate::Result<i32> {
    let units = request.units();
    if units <= 0 {
        return Err(crate::InventoryError::InvalidRequest(format!(
            "requested units must be positive, got {units}"
        )));
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flight_request(passengers: i32) -> FlightRequest {
        FlightRequest {
            city_from: "Warsaw".to_string(),
            city_to: "Lisbon".to_string(),
            book_from: "2024-06-01T10:00:00Z".parse().unwrap(),
            book_to: "2024-06-08T10:00:00Z".parse().unwrap(),
            passenger_count: passengers,
        }
    }

    #[test]
    fn flight_matches_route_and_departure() {
        let departure = "2024-06-01T10:00:00Z".parse().unwrap();
        let flight = Flight::new("Warsaw", "Lisbon", departure, 10);
        assert!(flight.matches(&flight_request(4)));

        let later = Flight::new("Warsaw", "Lisbon", "2024-06-02T10:00:00Z".parse().unwrap(), 10);
        assert!(!later.matches(&flight_request(4)));

        let reversed = Flight::new("Lisbon", "Warsaw", departure, 10);
        assert!(!reversed.matches(&flight_request(4)));
    }

    #[test]
    fn room_matches_city_and_type() {
        let room = Room::new("Gdansk", "double", 3);
        let request = HotelRequest {
            city: "Gdansk".to_string(),
            room_type: "double".to_string(),
            rooms: 1,
            ..Default::default()
        };
        assert!(room.matches(&request));
        assert!(!Room::new("Gdansk", "single", 3).matches(&request));
    }

    #[test]
    fn non_positive_units_are_invalid() {
        assert!(validate_units(&flight_request(0)).is_err());
        assert!(validate_units(&flight_request(-2)).is_err());
        assert_eq!(validate_units(&flight_request(3)).unwrap(), 3);
    }
}
