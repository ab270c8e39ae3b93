//! The resource-owning saga participant.
//!
//! | Inbound state                                 | Action    | Reply on success        | Reply on failure   |
//! |-----------------------------------------------|-----------|-------------------------|--------------------|
//! | `Begin`, `<This>TimedAccept`                  | reserve   | `<Next>TimedAccept`     | `<This>TimedFail`  |
//! | `PaymentAccept`                               | confirm   | `<This>FullAccept`      | `<This>FullFail`   |
//! | `<This>TimedRollback`, `<This>FullRollback`   | release   | same state, acknowledged | n/a               |
//!
//! Reserve replies carry the next stage's request kind; confirm and rollback
//! replies carry this stage's reply kind.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use inventory::{
    BookingRequest, ConfirmOutcome, InventoryStore, ReleaseOutcome, ReserveOutcome,
};
use messaging::{Body, Envelope, FlightRequest, HotelRequest, Phase, Reply, SagaState, Stage};
use tracing::{debug, info, warn};

use crate::dispatcher::StepHandler;
use crate::error::{Result, SagaError};
use crate::gate::ResourceGates;

/// Booking parameters of a resource-owning stage.
pub trait StageRequest: BookingRequest {
    /// Stage that consumes this request.
    const STAGE: Stage;

    /// Stage a successful reservation advances to.
    const NEXT: Stage;

    /// Borrows the parameters from an envelope of this stage's request kind.
    fn from_envelope(envelope: &Envelope) -> Option<&Self>;
}

impl StageRequest for FlightRequest {
    const STAGE: Stage = Stage::Flight;
    const NEXT: Stage = Stage::Hotel;

    fn from_envelope(envelope: &Envelope) -> Option<&Self> {
        envelope.flight_request()
    }
}

impl StageRequest for HotelRequest {
    const STAGE: Stage = Stage::Hotel;
    const NEXT: Stage = Stage::Payment;

    fn from_envelope(envelope: &Envelope) -> Option<&Self> {
        envelope.hotel_request()
    }
}

/// What a participant does for an inbound state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Reserve,
    Confirm,
    /// Release a provisional or confirmed hold; the phase is echoed back.
    Rollback(Phase),
}

impl Action {
    /// Selects the action `stage` takes for `state`, if any.
    pub fn for_state(stage: Stage, state: SagaState) -> Option<Action> {
        if state == SagaState::Begin {
            return Some(Action::Reserve);
        }
        if state == SagaState::PaymentAccept {
            return Some(Action::Confirm);
        }
        if state.stage() != Some(stage) {
            return None;
        }
        match state.phase()? {
            Phase::TimedAccept => Some(Action::Reserve),
            phase @ (Phase::TimedRollback | Phase::FullRollback) => Some(Action::Rollback(phase)),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Action::Reserve => "reserve",
            Action::Confirm => "confirm",
            Action::Rollback(_) => "rollback",
        }
    }
}

/// A flight or hotel participant over one resource store.
pub struct Participant<S> {
    store: Arc<S>,
    gates: ResourceGates,
}

impl<S> Clone for Participant<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            gates: self.gates.clone(),
        }
    }
}

impl<S> Participant<S>
where
    S: InventoryStore,
    S::Request: StageRequest,
{
    /// Creates a participant with its own pair of resource gates.
    pub fn new(store: Arc<S>) -> Self {
        let gates = ResourceGates::new(S::Request::STAGE, store.table());
        Self::with_gates(store, gates)
    }

    /// Creates a participant sharing existing gates, e.g. with a sweeper.
    pub fn with_gates(store: Arc<S>, gates: ResourceGates) -> Self {
        Self { store, gates }
    }

    pub fn stage(&self) -> Stage {
        S::Request::STAGE
    }

    pub fn gates(&self) -> &ResourceGates {
        &self.gates
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Runs the action selected by the envelope's state and builds its reply.
    ///
    /// Errors mean the envelope is structurally unusable or the store
    /// failed; no state was committed and no reply should be sent.
    pub async fn step(&self, envelope: &Envelope) -> Result<Envelope> {
        let stage = self.stage();
        if envelope.kind != stage.request_kind() {
            return Err(SagaError::WrongKind {
                stage,
                kind: envelope.kind,
            });
        }

        let action = Action::for_state(stage, envelope.state).ok_or(SagaError::UnhandledState {
            stage,
            state: envelope.state,
        })?;

        match action {
            Action::Reserve => self.reserve(envelope).await,
            Action::Confirm => self.confirm(envelope).await,
            Action::Rollback(phase) => self.rollback(envelope, phase).await,
        }
    }

    async fn reserve(&self, envelope: &Envelope) -> Result<Envelope> {
        let request =
            S::Request::from_envelope(envelope).ok_or(SagaError::MissingBody(envelope.kind))?;
        let transaction_id = envelope.transaction_id;

        let outcome = {
            let _gate = self.gates.write().enter().await;
            self.store.reserve(transaction_id, request).await?
        };

        let stage = self.stage();
        let next = S::Request::NEXT;
        let body = Body::empty(next.request_kind());
        match outcome {
            ReserveOutcome::Reserved(hold) => {
                info!(
                    %transaction_id,
                    %stage,
                    resource_id = %hold.resource_id,
                    units = hold.reserved_amount,
                    "Provisional hold placed"
                );
                Ok(envelope.advance(state(next, Phase::TimedAccept)?, body))
            }
            ReserveOutcome::Unavailable => {
                info!(%transaction_id, %stage, units = request.units(), "No capacity");
                Ok(envelope.advance(state(stage, Phase::TimedFail)?, body))
            }
        }
    }

    async fn confirm(&self, envelope: &Envelope) -> Result<Envelope> {
        let transaction_id = envelope.transaction_id;
        let outcome = {
            let _gate = self.gates.read().enter().await;
            self.store.confirm(transaction_id).await?
        };

        let stage = self.stage();
        let (phase, reply) = match outcome {
            ConfirmOutcome::Confirmed(_) => {
                info!(%transaction_id, %stage, "Hold confirmed");
                (Phase::FullAccept, Reply::accepted())
            }
            ConfirmOutcome::NoHold => {
                warn!(%transaction_id, %stage, "Nothing to confirm");
                (Phase::FullFail, Reply::refused("no hold for transaction"))
            }
        };
        self.reply(envelope, state(stage, phase)?, reply)
    }

    async fn rollback(&self, envelope: &Envelope, phase: Phase) -> Result<Envelope> {
        let transaction_id = envelope.transaction_id;
        let outcome = {
            let _gate = self.gates.read().enter().await;
            self.store.release(transaction_id).await?
        };

        let stage = self.stage();
        match outcome {
            ReleaseOutcome::Released(hold) => {
                info!(%transaction_id, %stage, units = hold.reserved_amount, "Hold released");
            }
            ReleaseOutcome::NoHold => {
                debug!(%transaction_id, %stage, "Rollback found no hold");
            }
        }
        self.reply(envelope, state(stage, phase)?, Reply::accepted())
    }

    fn reply(&self, envelope: &Envelope, state: SagaState, reply: Reply) -> Result<Envelope> {
        let stage = self.stage();
        let body = Body::reply(stage.reply_kind(), reply)
            .ok_or(SagaError::UnhandledState { stage, state })?;
        Ok(envelope.advance(state, body))
    }
}

fn state(stage: Stage, phase: Phase) -> Result<SagaState> {
    SagaState::of(stage, phase).ok_or(SagaError::UnhandledState {
        stage,
        state: SagaState::Begin,
    })
}

#[async_trait]
impl<S> StepHandler for Participant<S>
where
    S: InventoryStore,
    S::Request: StageRequest,
{
    fn stage(&self) -> Stage {
        S::Request::STAGE
    }

    #[tracing::instrument(
        skip(self, envelope),
        fields(stage = %self.stage(), transaction_id = %envelope.transaction_id, state = %envelope.state)
    )]
    async fn handle(&self, envelope: Envelope) -> Option<Envelope> {
        let stage = S::Request::STAGE.as_str();
        let started = Instant::now();
        let action = Action::for_state(S::Request::STAGE, envelope.state)
            .map(|a| a.as_str())
            .unwrap_or("none");

        let result = self.step(&envelope).await;
        metrics::histogram!("saga_step_duration_seconds", "stage" => stage, "action" => action)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(reply) => {
                metrics::counter!("saga_replies_total", "stage" => stage, "state" => reply.state.as_str())
                    .increment(1);
                Some(reply)
            }
            Err(e) => {
                warn!(error = %e, kind = %envelope.kind, "Dropping envelope");
                metrics::counter!("saga_dropped_total", "stage" => stage, "reason" => e.label())
                    .increment(1);
                None
            }
        }
    }
}
