//! Saga state tags carried by every envelope.

use serde::{Deserialize, Serialize};

use crate::kind::Stage;

/// Phase of a stage's local transaction.
///
/// ```text
///             ┌──► TimedFail
/// TimedAccept ┤                ┌──► FullFail
///             └──► (payment) ──┼──► FullAccept ──► FullRollback
///                              └──► TimedRollback
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Provisional hold placed.
    TimedAccept,
    /// Provisional hold could not be placed.
    TimedFail,
    /// Hold confirmed.
    FullAccept,
    /// Hold could not be confirmed.
    FullFail,
    /// Provisional hold released.
    TimedRollback,
    /// Confirmed hold released.
    FullRollback,
}

/// The saga state tag; drives branching in every participant.
///
/// Serialized by name on the wire. The set is closed: an unknown name makes
/// the envelope unroutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SagaState {
    /// A new saga instance starts.
    Begin,

    FlightTimedAccept,
    FlightTimedFail,
    FlightFullAccept,
    FlightFullFail,
    FlightTimedRollback,
    FlightFullRollback,

    HotelTimedAccept,
    HotelTimedFail,
    HotelFullAccept,
    HotelFullFail,
    HotelTimedRollback,
    HotelFullRollback,

    /// Payment is the next step to run.
    PaymentTimedAccept,
    /// Payment was taken; holds may be confirmed.
    PaymentAccept,
    /// Payment was refused; holds must be rolled back.
    PaymentFailed,
}

impl SagaState {
    /// Returns the state for the given stage and phase, if the vocabulary has one.
    pub fn of(stage: Stage, phase: Phase) -> Option<SagaState> {
        use Phase::*;
        use SagaState::*;

        let state = match (stage, phase) {
            (Stage::Flight, TimedAccept) => FlightTimedAccept,
            (Stage::Flight, TimedFail) => FlightTimedFail,
            (Stage::Flight, FullAccept) => FlightFullAccept,
            (Stage::Flight, FullFail) => FlightFullFail,
            (Stage::Flight, TimedRollback) => FlightTimedRollback,
            (Stage::Flight, FullRollback) => FlightFullRollback,
            (Stage::Hotel, TimedAccept) => HotelTimedAccept,
            (Stage::Hotel, TimedFail) => HotelTimedFail,
            (Stage::Hotel, FullAccept) => HotelFullAccept,
            (Stage::Hotel, FullFail) => HotelFullFail,
            (Stage::Hotel, TimedRollback) => HotelTimedRollback,
            (Stage::Hotel, FullRollback) => HotelFullRollback,
            (Stage::Payment, TimedAccept) => PaymentTimedAccept,
            (Stage::Payment, FullAccept) => PaymentAccept,
            (Stage::Payment, FullFail) => PaymentFailed,
            _ => return None,
        };
        Some(state)
    }

    /// Returns the stage this state talks about. `Begin` belongs to no stage.
    pub fn stage(&self) -> Option<Stage> {
        use SagaState::*;

        match self {
            Begin => None,
            FlightTimedAccept | FlightTimedFail | FlightFullAccept | FlightFullFail
            | FlightTimedRollback | FlightFullRollback => Some(Stage::Flight),
            HotelTimedAccept | HotelTimedFail | HotelFullAccept | HotelFullFail
            | HotelTimedRollback | HotelFullRollback => Some(Stage::Hotel),
            PaymentTimedAccept | PaymentAccept | PaymentFailed => Some(Stage::Payment),
        }
    }

    /// Returns the phase of this state. `Begin` has none.
    pub fn phase(&self) -> Option<Phase> {
        use SagaState::*;

        match self {
            Begin => None,
            FlightTimedAccept | HotelTimedAccept | PaymentTimedAccept => Some(Phase::TimedAccept),
            FlightTimedFail | HotelTimedFail => Some(Phase::TimedFail),
            FlightFullAccept | HotelFullAccept | PaymentAccept => Some(Phase::FullAccept),
            FlightFullFail | HotelFullFail | PaymentFailed => Some(Phase::FullFail),
            FlightTimedRollback | HotelTimedRollback => Some(Phase::TimedRollback),
            FlightFullRollback | HotelFullRollback => Some(Phase::FullRollback),
        }
    }

    /// Returns true if this state reports a failed step.
    pub fn is_failure(&self) -> bool {
        matches!(self.phase(), Some(Phase::TimedFail | Phase::FullFail))
    }

    /// Returns true if this state requests or acknowledges a compensation.
    pub fn is_rollback(&self) -> bool {
        matches!(
            self.phase(),
            Some(Phase::TimedRollback | Phase::FullRollback)
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        use SagaState::*;

        match self {
            Begin => "Begin",
            FlightTimedAccept => "FlightTimedAccept",
            FlightTimedFail => "FlightTimedFail",
            FlightFullAccept => "FlightFullAccept",
            FlightFullFail => "FlightFullFail",
            FlightTimedRollback => "FlightTimedRollback",
            FlightFullRollback => "FlightFullRollback",
            HotelTimedAccept => "HotelTimedAccept",
            HotelTimedFail => "HotelTimedFail",
            HotelFullAccept => "HotelFullAccept",
            HotelFullFail => "HotelFullFail",
            HotelTimedRollback => "HotelTimedRollback",
            HotelFullRollback => "HotelFullRollback",
            PaymentTimedAccept => "PaymentTimedAccept",
            PaymentAccept => "PaymentAccept",
            PaymentFailed => "PaymentFailed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
