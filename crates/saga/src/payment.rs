//! Payment stage and its gateway abstraction.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::TransactionId;
use messaging::{Body, Envelope, MessageKind, PaymentRequest, Reply, SagaState, Stage};
use rand::Rng;
use tracing::{info, warn};

use crate::dispatcher::StepHandler;

/// A gateway's verdict and how long it took to reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayDecision {
    pub approved: bool,
    pub latency: Duration,
}

/// Trait for payment authorization.
#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    /// Decides whether the payment goes through.
    async fn authorize(
        &self,
        transaction_id: TransactionId,
        request: &PaymentRequest,
    ) -> GatewayDecision;
}

/// Approves half of all payments after up to `max_latency`.
#[derive(Debug, Clone)]
pub struct RandomGateway {
    approval_rate: f64,
    max_latency: Duration,
}

impl Default for RandomGateway {
    fn default() -> Self {
        Self {
            approval_rate: 0.5,
            max_latency: Duration::from_millis(100),
        }
    }
}

impl RandomGateway {
    pub fn new(approval_rate: f64, max_latency: Duration) -> Self {
        Self {
            approval_rate: approval_rate.clamp(0.0, 1.0),
            max_latency,
        }
    }

    /// Upper bound of the simulated latency, saturating at `u64::MAX`.
    fn max_latency_millis(&self) -> u64 {
        u64::try_from(self.max_latency.as_millis()).unwrap_or(u64::MAX)
    }
}

#[async_trait]
impl PaymentGateway for RandomGateway {
    async fn authorize(&self, _: TransactionId, _: &PaymentRequest) -> GatewayDecision {
        let mut rng = rand::thread_rng();
        let max_ms = self.max_latency_millis();
        GatewayDecision {
            approved: rng.gen_bool(self.approval_rate),
            latency: Duration::from_millis(rng.gen_range(0..=max_ms)),
        }
    }
}

/// Always returns the same decision.
#[derive(Debug, Clone, Copy)]
pub struct FixedGateway(pub GatewayDecision);

impl FixedGateway {
    pub fn approve() -> Self {
        Self(GatewayDecision {
            approved: true,
            latency: Duration::ZERO,
        })
    }

    pub fn decline() -> Self {
        Self(GatewayDecision {
            approved: false,
            latency: Duration::ZERO,
        })
    }
}

#[async_trait]
impl PaymentGateway for FixedGateway {
    async fn authorize(&self, _: TransactionId, _: &PaymentRequest) -> GatewayDecision {
        self.0
    }
}

/// Consumes `PaymentRequest` envelopes and replies with the gateway's verdict.
pub struct PaymentStage<G> {
    gateway: Arc<G>,
}

impl<G: PaymentGateway> PaymentStage<G> {
    pub fn new(gateway: G) -> Self {
        Self {
            gateway: Arc::new(gateway),
        }
    }

    /// Builds the reply, or `None` if the envelope is not a payment instruction.
    pub async fn step(&self, envelope: &Envelope) -> Option<Envelope> {
        if envelope.kind != MessageKind::PaymentRequest
            || !matches!(
                envelope.state,
                SagaState::Begin | SagaState::PaymentTimedAccept
            )
        {
            return None;
        }

        // Amount is informational; the previous stage does not know it.
        let request = envelope.payment_request().cloned().unwrap_or_default();
        let decision = self
            .gateway
            .authorize(envelope.transaction_id, &request)
            .await;
        tokio::time::sleep(decision.latency).await;

        let (state, reply) = if decision.approved {
            (SagaState::PaymentAccept, Reply::accepted())
        } else {
            (SagaState::PaymentFailed, Reply::refused("payment declined"))
        };
        Some(envelope.advance(state, Body::PaymentReply(reply)))
    }
}

#[async_trait]
impl<G: PaymentGateway> StepHandler for PaymentStage<G> {
    fn stage(&self) -> Stage {
        Stage::Payment
    }

    #[tracing::instrument(skip(self, envelope), fields(transaction_id = %envelope.transaction_id))]
    async fn handle(&self, envelope: Envelope) -> Option<Envelope> {
        let started = Instant::now();
        let reply = self.step(&envelope).await;
        metrics::histogram!("saga_step_duration_seconds", "stage" => "Payment", "action" => "authorize")
            .record(started.elapsed().as_secs_f64());

        match &reply {
            Some(reply) => {
                info!(state = %reply.state, "Payment decided");
                metrics::counter!("saga_replies_total", "stage" => "Payment", "state" => reply.state.as_str())
                    .increment(1);
            }
            None => {
                warn!(kind = %envelope.kind, state = %envelope.state, "Dropping envelope");
                metrics::counter!("saga_dropped_total", "stage" => "Payment", "reason" => "unhandled_state")
                    .increment(1);
            }
        }
        reply
    }
}
