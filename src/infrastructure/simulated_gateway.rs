use super::signature::PaymentSignature;
use crate::domain::money::Money;
use crate::domain::ports::{GatewayIntent, PaymentGateway, PaymentStatus};
use crate::error::{OrderError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOperation {
    CreateIntent,
    FetchStatus,
    FindPayments,
}

/// A failure to inject on the next call of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedFailure {
    Unavailable,
    Rejected,
}

#[derive(Debug, Clone)]
struct PaymentRecord {
    gateway_order_ref: String,
    captured: bool,
}

#[derive(Debug, Default)]
struct State {
    intents: HashMap<String, (String, Money)>,
    payments: HashMap<String, PaymentRecord>,
    queued_order_refs: VecDeque<String>,
    failures: HashMap<GatewayOperation, VecDeque<SimulatedFailure>>,
    calls: HashMap<GatewayOperation, usize>,
    latency: Option<Duration>,
    reverse_lookup_disabled: bool,
}

/// In-process stand-in for the payment processor.
///
/// Payments are registered with [`SimulatedGateway::record_payment`], which
/// returns the signature the processor would hand to the payer's browser.
/// Failures and latency can be injected per operation.
#[derive(Debug)]
pub struct SimulatedGateway {
    key_id: String,
    signer: PaymentSignature,
    state: Mutex<State>,
}

impl SimulatedGateway {
    pub fn new(key_id: impl Into<String>, key_secret: impl AsRef<[u8]>) -> Self {
        Self {
            key_id: key_id.into(),
            signer: PaymentSignature::new(key_secret),
            state: Mutex::new(State::default()),
        }
    }

    /// The next intent gets this reference instead of a derived one.
    pub fn queue_order_ref(&self, gateway_order_ref: impl Into<String>) {
        self.state
            .lock()
            .queued_order_refs
            .push_back(gateway_order_ref.into());
    }

    pub fn fail_next(&self, operation: GatewayOperation, failure: SimulatedFailure) {
        self.state
            .lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(failure);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().latency = latency;
    }

    pub fn disable_reverse_lookup(&self) {
        self.state.lock().reverse_lookup_disabled = true;
    }

    pub fn calls(&self, operation: GatewayOperation) -> usize {
        self.state.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Signs a callback payload with the merchant secret.
    pub fn sign(&self, gateway_order_ref: &str, payment_ref: &str) -> String {
        self.signer.sign(gateway_order_ref, payment_ref)
    }

    /// Registers a payer's payment against an intent and returns its signature.
    pub fn record_payment(&self, gateway_order_ref: &str, payment_ref: &str, captured: bool) -> String {
        self.state.lock().payments.insert(
            payment_ref.to_string(),
            PaymentRecord {
                gateway_order_ref: gateway_order_ref.to_string(),
                captured,
            },
        );
        self.sign(gateway_order_ref, payment_ref)
    }

    /// Counts the call, then yields the injected failure (if any) and latency.
    fn begin(&self, operation: GatewayOperation) -> (Option<SimulatedFailure>, Option<Duration>) {
        let mut state = self.state.lock();
        *state.calls.entry(operation).or_default() += 1;
        let failure = state
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);
        (failure, state.latency)
    }

    async fn enter(&self, operation: GatewayOperation) -> Result<()> {
        let (failure, latency) = self.begin(operation);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(SimulatedFailure::Unavailable) => Err(OrderError::GatewayUnavailable(format!(
                "simulated outage during {operation:?}"
            ))),
            Some(SimulatedFailure::Rejected) => Err(OrderError::GatewayRejected(format!(
                "simulated rejection during {operation:?}"
            ))),
            None => Ok(()),
        }
    }

    fn status_of(payment_ref: &str, record: &PaymentRecord) -> PaymentStatus {
        PaymentStatus {
            payment_ref: payment_ref.to_string(),
            gateway_order_ref: Some(record.gateway_order_ref.clone()),
            captured: record.captured,
            raw: json!({
                "id": payment_ref,
                "order_id": record.gateway_order_ref,
                "status": if record.captured { "captured" } else { "failed" },
            }),
        }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    fn public_key(&self) -> &str {
        &self.key_id
    }

    async fn create_intent(&self, amount: &Money, receipt_ref: &str) -> Result<GatewayIntent> {
        self.enter(GatewayOperation::CreateIntent).await?;
        if !amount.is_positive() {
            return Err(OrderError::GatewayRejected(
                "amount must be at least 1 minor unit".to_string(),
            ));
        }
        let mut state = self.state.lock();
        let gateway_order_ref = match state.intents.get(receipt_ref) {
            Some((existing, _)) => existing.clone(),
            None => state
                .queued_order_refs
                .pop_front()
                .unwrap_or_else(|| format!("gw_{}", receipt_ref.replace('-', ""))),
        };
        state
            .intents
            .insert(receipt_ref.to_string(), (gateway_order_ref.clone(), *amount));
        Ok(GatewayIntent {
            raw: json!({
                "id": gateway_order_ref,
                "amount": amount.minor_units,
                "currency": amount.currency.code(),
                "receipt": receipt_ref,
                "status": "created",
            }),
            gateway_order_ref,
            amount: *amount,
        })
    }

    fn verify_signature(&self, gateway_order_ref: &str, payment_ref: &str, signature: &str) -> bool {
        self.signer.verify(gateway_order_ref, payment_ref, signature)
    }

    async fn fetch_payment_status(&self, payment_ref: &str) -> Result<PaymentStatus> {
        self.enter(GatewayOperation::FetchStatus).await?;
        let state = self.state.lock();
        state
            .payments
            .get(payment_ref)
            .map(|record| Self::status_of(payment_ref, record))
            .ok_or_else(|| {
                OrderError::GatewayRejected(format!("The id provided does not exist: {payment_ref}"))
            })
    }

    async fn find_payments_for_order(
        &self,
        gateway_order_ref: &str,
    ) -> Result<Option<Vec<PaymentStatus>>> {
        if self.state.lock().reverse_lookup_disabled {
            return Ok(None);
        }
        self.enter(GatewayOperation::FindPayments).await?;
        let state = self.state.lock();
        let mut payments: Vec<PaymentStatus> = state
            .payments
            .iter()
            .filter(|(_, record)| record.gateway_order_ref == gateway_order_ref)
            .map(|(payment_ref, record)| Self::status_of(payment_ref, record))
            .collect();
        payments.sort_by(|a, b| a.payment_ref.cmp(&b.payment_ref));
        Ok(Some(payments))
    }
}
