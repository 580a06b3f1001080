use super::jsonl::event_reader::CheckoutEvent;
use crate::application::engine::{CheckoutSession, OrderLifecycle};
use crate::application::reconciliation::{Reconciler, SweepReport};
use crate::domain::order::Order;
use crate::error::{OrderError, Result};
use crate::infrastructure::simulated_gateway::SimulatedGateway;
use chrono::Utc;
use std::sync::Arc;

#[derive(Debug)]
pub enum ReplayOutcome {
    Initiated(Box<CheckoutSession>),
    Settled(Box<Order>),
    Swept(SweepReport),
}

/// Feeds checkout events into the lifecycle engine.
pub struct Replayer {
    lifecycle: Arc<OrderLifecycle>,
    reconciler: Reconciler,
    /// Present only when the engine runs against the simulated gateway.
    simulator: Option<Arc<SimulatedGateway>>,
}

impl Replayer {
    pub fn new(
        lifecycle: Arc<OrderLifecycle>,
        reconciler: Reconciler,
        simulator: Option<Arc<SimulatedGateway>>,
    ) -> Self {
        Self {
            lifecycle,
            reconciler,
            simulator,
        }
    }

    pub fn lifecycle(&self) -> &OrderLifecycle {
        &self.lifecycle
    }

    pub async fn apply(&self, event: CheckoutEvent) -> Result<ReplayOutcome> {
        match event {
            CheckoutEvent::Initiate(request) => self
                .lifecycle
                .initiate(request)
                .await
                .map(|session| ReplayOutcome::Initiated(Box::new(session))),
            CheckoutEvent::Pay {
                checkout_token,
                payment_ref,
                captured,
                tamper,
            } => {
                let simulator = self.simulator.as_ref().ok_or_else(|| {
                    OrderError::ValidationError(
                        "pay events need the simulated gateway".to_string(),
                    )
                })?;
                let order = self
                    .lifecycle
                    .get_by_checkout_token(&checkout_token)
                    .await?;
                let gateway_order_ref = order.gateway_order_ref.ok_or_else(|| {
                    OrderError::ValidationError(format!(
                        "checkout {checkout_token} has no payment intent"
                    ))
                })?;
                let mut signature =
                    simulator.record_payment(&gateway_order_ref, &payment_ref, captured);
                if tamper {
                    signature = corrupt(&signature);
                }
                self.settle(&gateway_order_ref, &payment_ref, &signature)
                    .await
            }
            CheckoutEvent::Callback {
                gateway_order_ref,
                payment_ref,
                signature,
            } => {
                self.settle(&gateway_order_ref, &payment_ref, &signature)
                    .await
            }
            CheckoutEvent::Sweep { at } => self
                .reconciler
                .sweep(at.unwrap_or_else(Utc::now))
                .await
                .map(ReplayOutcome::Swept),
        }
    }

    async fn settle(
        &self,
        gateway_order_ref: &str,
        payment_ref: &str,
        signature: &str,
    ) -> Result<ReplayOutcome> {
        self.lifecycle
            .verify(gateway_order_ref, payment_ref, signature)
            .await
            .map(|order| ReplayOutcome::Settled(Box::new(order)))
    }
}

/// Flips the first hex digit so the signature no longer verifies.
fn corrupt(signature: &str) -> String {
    let mut chars = signature.chars();
    match chars.next() {
        Some('0') => format!("1{}", chars.as_str()),
        Some(_) => format!("0{}", chars.as_str()),
        None => "00".to_string(),
    }
}
