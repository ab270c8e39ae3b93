//! Resource store for the booking saga.
//!
//! Resource rows (flights, hotel rooms) carry a capacity counter that is only
//! ever changed by committing a delta. Hold rows record what one transaction
//! took, so a rollback restores exactly that amount.
//!
//! Every store implements [`InventoryStore`]; business outcomes such as "no
//! capacity" are values of [`ReserveOutcome`], [`ConfirmOutcome`] and
//! [`ReleaseOutcome`], never errors.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use error::{InventoryError, Result};
pub use memory::{InMemoryFlightStore, InMemoryHotelStore, InMemoryInventory};
pub use model::{BookingRequest, Flight, Hold, Resource, ResourceTable, Room};
pub use postgres::{PostgresFlightStore, PostgresHotelStore};
pub use store::{ConfirmOutcome, InventoryStore, ReleaseOutcome, ReserveOutcome};
