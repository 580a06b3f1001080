use crate::domain::address::{AddressForm, ShippingAddress};
use crate::domain::audit::{AuditEvent, TransitionEvent};
use crate::domain::money::{Currency, Money};
use crate::domain::order::{
    CartLine, CheckoutToken, FailureReason, NewOrder, Order, OrderId, OrderStatus, OwnerId,
    StatusPatch, price_cart,
};
use crate::domain::ports::{AuditSinkRef, OrderRepositoryRef, PaymentGatewayRef};
use crate::error::{OrderError, Result};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Currency every cart is priced in.
    pub currency: Currency,
    /// Label shown by the client-side checkout widget.
    pub merchant_name: String,
    /// Upper bound on any single payment gateway call.
    pub gateway_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            currency: Currency::INR,
            merchant_name: "SportX".to_string(),
            gateway_timeout: Duration::from_secs(10),
        }
    }
}

/// Checkout initiation input, as forwarded by the HTTP layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    #[serde(alias = "checkoutToken")]
    pub checkout_token: CheckoutToken,
    #[serde(alias = "ownerId")]
    pub owner_id: OwnerId,
    #[serde(alias = "cart")]
    pub items: Vec<CartLine>,
    #[serde(alias = "shippingAddress")]
    pub address: AddressForm,
}

/// What the client-side payment widget needs to collect payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutSession {
    pub order: Order,
    pub gateway_order_ref: String,
    pub gateway_amount: Money,
    pub gateway_public_key: String,
    pub merchant_name: String,
}

/// Terminal decision for a pending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Settlement {
    Capture { payment_ref: String },
    Fail(FailureReason),
}

/// Serializes intent creation per order within this process.
#[derive(Default)]
struct IntentGate {
    inflight: Mutex<HashMap<OrderId, Arc<tokio::sync::Mutex<()>>>>,
}

impl IntentGate {
    fn slot(&self, id: OrderId) -> Arc<tokio::sync::Mutex<()>> {
        self.inflight.lock().entry(id).or_default().clone()
    }

    /// Drops the slot once no other caller is waiting on it.
    fn release(&self, id: OrderId, slot: Arc<tokio::sync::Mutex<()>>) {
        let mut inflight = self.inflight.lock();
        // One handle in the map, one held here.
        if Arc::strong_count(&slot) <= 2 {
            inflight.remove(&id);
        }
    }
}

/// Drives orders through `pending -> completed | failed`.
///
/// Settlement holds no locks. Every transition is a conditional write in the
/// repository, so concurrent `verify` calls and reconciliation sweeps on the
/// same order converge on a single terminal state. Only opening the gateway
/// intent is serialized per order.
#[derive(Clone)]
pub struct OrderLifecycle {
    repository: OrderRepositoryRef,
    gateway: PaymentGatewayRef,
    audit: AuditSinkRef,
    config: EngineConfig,
    intents: Arc<IntentGate>,
}

impl OrderLifecycle {
    pub fn new(
        repository: OrderRepositoryRef,
        gateway: PaymentGatewayRef,
        audit: AuditSinkRef,
        config: EngineConfig,
    ) -> Self {
        Self {
            repository,
            gateway,
            audit,
            config,
            intents: Arc::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn repository(&self) -> &OrderRepositoryRef {
        &self.repository
    }

    pub(crate) fn gateway(&self) -> &PaymentGatewayRef {
        &self.gateway
    }

    pub(crate) fn audit(&self, event: AuditEvent) {
        self.audit.record(event);
    }

    /// Bounds a gateway call by the configured timeout. Elapsed means unavailable.
    pub(crate) async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.gateway_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(OrderError::GatewayUnavailable(format!(
                "{operation} timed out after {:?}",
                self.config.gateway_timeout
            ))),
        }
    }

    /// Creates (or resumes) the pending order for a checkout attempt and opens
    /// the gateway intent the client pays against.
    #[instrument(
        skip(self, request),
        fields(checkout_token = %request.checkout_token, owner_id = %request.owner_id)
    )]
    pub async fn initiate(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        let (items, amount) = price_cart(&request.items, self.config.currency)?;
        let shipping_address = ShippingAddress::try_from(request.address)?;
        let new_order = NewOrder {
            checkout_token: request.checkout_token,
            owner_id: request.owner_id,
            amount,
            items,
            shipping_address,
        };
        let order = self.find_or_create(new_order).await?;
        if order.gateway_order_ref.is_some() {
            return self.open_intent(order).await;
        }

        let slot = self.intents.slot(order.id);
        let opened = {
            let _turn = slot.lock().await;
            // Another caller may have opened the intent while this one waited.
            match self.repository.find_by_id(order.id).await {
                Ok(order) => self.open_intent(order).await,
                Err(e) => Err(e),
            }
        };
        self.intents.release(order.id, slot);
        opened
    }

    async fn open_intent(&self, order: Order) -> Result<CheckoutSession> {
        if let Some(gateway_order_ref) = order.gateway_order_ref.clone() {
            debug!(order_id = %order.id, "checkout resumed with existing intent");
            return Ok(self.session(order, gateway_order_ref));
        }
        if order.status.is_terminal() {
            return Err(OrderError::GatewayRejected(format!(
                "checkout {} already ended as {}",
                order.checkout_token, order.status
            )));
        }

        let receipt_ref = order.id.to_string();
        let created = self
            .bounded(
                "create_intent",
                self.gateway.create_intent(&order.amount, &receipt_ref),
            )
            .await
            .and_then(|intent| {
                if intent.amount == order.amount {
                    Ok(intent)
                } else {
                    Err(OrderError::GatewayRejected(format!(
                        "gateway opened intent for {} instead of {}",
                        intent.amount, order.amount
                    )))
                }
            });
        let intent = match created {
            Ok(intent) => intent,
            Err(OrderError::GatewayRejected(reason)) => {
                warn!(order_id = %order.id, %reason, "gateway rejected payment intent");
                self.settle(&order, Settlement::Fail(FailureReason::GatewayRejected))
                    .await?;
                return Err(OrderError::GatewayRejected(reason));
            }
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "payment intent not created; order stays pending");
                return Err(e);
            }
        };

        let order = match self
            .repository
            .attach_gateway_order_ref(order.id, &intent.gateway_order_ref)
            .await
        {
            Ok(order) => order,
            Err(OrderError::ConflictError { .. }) => {
                return self.resolve_orphaned_intent(order.id, &intent.gateway_order_ref).await;
            }
            Err(e) => return Err(e),
        };
        info!(
            order_id = %order.id,
            gateway_order_ref = %intent.gateway_order_ref,
            amount = %order.amount,
            "checkout initiated"
        );
        Ok(self.session(order, intent.gateway_order_ref))
    }

    /// The order moved on while its intent was being opened: it was settled
    /// by a sweep, or a concurrent initiate attached a different intent.
    async fn resolve_orphaned_intent(
        &self,
        id: OrderId,
        orphaned_ref: &str,
    ) -> Result<CheckoutSession> {
        let current = self.repository.find_by_id(id).await?;
        self.audit(AuditEvent::Anomaly {
            order_id: current.id,
            detail: format!(
                "gateway intent {orphaned_ref} opened for an order that is now {}",
                current.status
            ),
            timestamp: Utc::now(),
        });
        warn!(order_id = %current.id, orphaned_ref, status = %current.status, "payment intent orphaned");
        match current.gateway_order_ref.clone() {
            Some(gateway_order_ref) if !current.status.is_terminal() => {
                Ok(self.session(current, gateway_order_ref))
            }
            _ => Err(OrderError::GatewayRejected(format!(
                "checkout {} already ended as {}",
                current.checkout_token, current.status
            ))),
        }
    }

    /// Reuses the order already bound to this checkout token, if any.
    async fn find_or_create(&self, new_order: NewOrder) -> Result<Order> {
        if let Some(existing) = self
            .repository
            .find_by_checkout_token(&new_order.checkout_token)
            .await?
        {
            return Self::ensure_same_checkout(existing, &new_order);
        }
        match self.repository.create(new_order.clone()).await {
            Ok(order) => Ok(order),
            // Lost a race with a concurrent initiate for the same token.
            Err(OrderError::ValidationError(msg)) => {
                match self
                    .repository
                    .find_by_checkout_token(&new_order.checkout_token)
                    .await?
                {
                    Some(existing) => Self::ensure_same_checkout(existing, &new_order),
                    None => Err(OrderError::ValidationError(msg)),
                }
            }
            Err(e) => Err(e),
        }
    }

    fn ensure_same_checkout(existing: Order, new_order: &NewOrder) -> Result<Order> {
        if existing.owner_id != new_order.owner_id {
            return Err(OrderError::ValidationError(format!(
                "Checkout token {} belongs to another account",
                new_order.checkout_token
            )));
        }
        if existing.items != new_order.items {
            return Err(OrderError::ValidationError(format!(
                "Checkout token {} was already used for a different cart",
                new_order.checkout_token
            )));
        }
        Ok(existing)
    }

    fn session(&self, order: Order, gateway_order_ref: String) -> CheckoutSession {
        CheckoutSession {
            gateway_amount: order.amount,
            order,
            gateway_order_ref,
            gateway_public_key: self.gateway.public_key().to_string(),
            merchant_name: self.config.merchant_name.clone(),
        }
    }

    /// Handles the gateway's completion callback. Safe to call any number of
    /// times for the same payment: settled orders are returned unchanged.
    #[instrument(skip(self, signature))]
    pub async fn verify(
        &self,
        gateway_order_ref: &str,
        payment_ref: &str,
        signature: &str,
    ) -> Result<Order> {
        let order = self
            .repository
            .find_by_gateway_order_ref(gateway_order_ref)
            .await?;

        if order.status != OrderStatus::Pending {
            if order.status == OrderStatus::Failed
                && self
                    .gateway
                    .verify_signature(gateway_order_ref, payment_ref, signature)
            {
                self.audit(AuditEvent::Anomaly {
                    order_id: order.id,
                    detail: format!(
                        "signed payment {payment_ref} arrived for an order already failed ({})",
                        order.failure_reason.map_or("unknown", FailureReason::as_str)
                    ),
                    timestamp: Utc::now(),
                });
            }
            debug!(order_id = %order.id, status = %order.status, "order already settled");
            return Ok(order);
        }

        if !self
            .gateway
            .verify_signature(gateway_order_ref, payment_ref, signature)
        {
            warn!(order_id = %order.id, "payment signature mismatch");
            self.audit(AuditEvent::SecurityAlert {
                order_id: order.id,
                gateway_order_ref: gateway_order_ref.to_string(),
                timestamp: Utc::now(),
            });
            return self
                .settle(&order, Settlement::Fail(FailureReason::SignatureMismatch))
                .await;
        }

        // Only authenticated refs reach the log the reconciler replays.
        self.repository
            .record_payment_attempt(order.id, payment_ref)
            .await?;

        let status = self
            .bounded(
                "fetch_payment_status",
                self.gateway.fetch_payment_status(payment_ref),
            )
            .await?;

        if status.captured_for(gateway_order_ref) {
            self.settle(
                &order,
                Settlement::Capture {
                    payment_ref: payment_ref.to_string(),
                },
            )
            .await
        } else {
            self.settle(&order, Settlement::Fail(FailureReason::NotCaptured))
                .await
        }
    }

    /// The one place a pending order becomes terminal.
    ///
    /// A `ConflictError` means another caller settled the order first; the
    /// current row is returned instead of an error.
    pub(crate) async fn settle(&self, order: &Order, settlement: Settlement) -> Result<Order> {
        let now = Utc::now();
        let (to, patch) = match settlement {
            Settlement::Capture { payment_ref } => (
                OrderStatus::Completed,
                StatusPatch {
                    gateway_payment_ref: Some(payment_ref),
                    failure_reason: None,
                    completed_at: now,
                },
            ),
            Settlement::Fail(reason) => (
                OrderStatus::Failed,
                StatusPatch {
                    gateway_payment_ref: None,
                    failure_reason: Some(reason),
                    completed_at: now,
                },
            ),
        };
        let reason = patch.failure_reason;

        match self
            .repository
            .update_status(order.id, OrderStatus::Pending, to, patch)
            .await
        {
            Ok(settled) => {
                self.audit(AuditEvent::Transition(TransitionEvent {
                    order_id: settled.id,
                    from: OrderStatus::Pending,
                    to,
                    reason,
                    timestamp: now,
                }));
                info!(order_id = %settled.id, status = %to, reason = reason.map(FailureReason::as_str), "order settled");
                Ok(settled)
            }
            Err(OrderError::ConflictError { actual, .. }) => {
                debug!(order_id = %order.id, %actual, "order settled concurrently");
                let current = self.repository.find_by_id(order.id).await?;
                if to == OrderStatus::Completed && current.status == OrderStatus::Failed {
                    self.audit(AuditEvent::Anomaly {
                        order_id: current.id,
                        detail: "payment captured after the order had failed".to_string(),
                        timestamp: now,
                    });
                }
                Ok(current)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get(&self, id: OrderId) -> Result<Order> {
        self.repository.find_by_id(id).await
    }

    pub async fn get_by_checkout_token(&self, token: &CheckoutToken) -> Result<Order> {
        self.repository
            .find_by_checkout_token(token)
            .await?
            .ok_or_else(|| OrderError::not_found("checkout", token))
    }

    /// Ownership-checked lookup; other owners' orders read as not found.
    pub async fn get_for_owner(&self, id: OrderId, owner_id: &OwnerId) -> Result<Order> {
        let order = self.repository.find_by_id(id).await?;
        if &order.owner_id == owner_id {
            Ok(order)
        } else {
            Err(OrderError::not_found("order", id))
        }
    }

    pub async fn list_for_owner(&self, owner_id: &OwnerId) -> Result<Vec<Order>> {
        self.repository.list_by_owner(owner_id).await
    }

    pub async fn list_all(&self) -> Result<Vec<Order>> {
        self.repository.list_all().await
    }
}
