//! Choreographed booking saga.
//!
//! Flight and hotel participants place, confirm and release holds on their
//! resource store; the payment stage asks a gateway; the coordinator records
//! each saga in the transaction log.
//!
//! Each participant service runs three tasks:
//! 1. A consumer feeding broker deliveries through a [`messaging::Router`]
//! 2. A [`Dispatcher`] running steps under an admission semaphore
//! 3. An [`messaging::OutboundPublisher`] sending replies to the coordinator
//!
//! Capacity changes on one table are serialised by a [`ResourceGate`].

pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod participant;
pub mod payment;
pub mod recorder;
pub mod service;
pub mod sweeper;

pub use dispatcher::{Dispatcher, StepHandler};
pub use error::{Result, SagaError};
pub use gate::{AccessMode, GateScope, ResourceGate, ResourceGates};
pub use participant::{Action, Participant, StageRequest};
pub use payment::{FixedGateway, GatewayDecision, PaymentGateway, PaymentStage, RandomGateway};
pub use recorder::{RecordOutcome, TransactionRecorder};
pub use service::{
    CoordinatorOptions, CoordinatorService, DEFAULT_CONCURRENCY, ParticipantService,
    ServiceHandle, ServiceOptions, SweepOptions,
};
pub use sweeper::HoldSweeper;
