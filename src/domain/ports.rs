use super::audit::AuditEvent;
use super::money::Money;
use super::order::{CheckoutToken, NewOrder, Order, OrderId, OrderStatus, OwnerId, StatusPatch};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Durable order storage.
///
/// `update_status` must be an atomic check-and-set at the storage layer: it
/// is the only synchronization the lifecycle engine relies on.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create(&self, order: NewOrder) -> Result<Order>;
    async fn find_by_id(&self, id: OrderId) -> Result<Order>;
    async fn find_by_gateway_order_ref(&self, gateway_order_ref: &str) -> Result<Order>;
    async fn find_by_checkout_token(&self, token: &CheckoutToken) -> Result<Option<Order>>;
    async fn attach_gateway_order_ref(&self, id: OrderId, gateway_order_ref: &str)
    -> Result<Order>;
    async fn record_payment_attempt(&self, id: OrderId, payment_ref: &str) -> Result<()>;
    async fn update_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        patch: StatusPatch,
    ) -> Result<Order>;
    /// Newest first.
    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<Order>>;
    /// Newest first.
    async fn list_all(&self) -> Result<Vec<Order>>;
    async fn list_pending_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>>;
}

/// Remote payment intent opened with the processor.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayIntent {
    pub gateway_order_ref: String,
    pub amount: Money,
    pub raw: serde_json::Value,
}

/// Authoritative payment state as reported by the processor.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentStatus {
    pub payment_ref: String,
    pub gateway_order_ref: Option<String>,
    pub captured: bool,
    pub raw: serde_json::Value,
}

impl PaymentStatus {
    /// Captured, and not reported against a different gateway order.
    pub fn captured_for(&self, gateway_order_ref: &str) -> bool {
        self.captured
            && self
                .gateway_order_ref
                .as_deref()
                .is_none_or(|r| r == gateway_order_ref)
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Publishable key handed to the client-side checkout widget.
    fn public_key(&self) -> &str;

    /// `GatewayUnavailable` on network/5xx errors, `GatewayRejected` on 4xx.
    async fn create_intent(&self, amount: &Money, receipt_ref: &str) -> Result<GatewayIntent>;

    /// Constant-time HMAC check over `order_ref|payment_ref`. Never errors.
    fn verify_signature(&self, gateway_order_ref: &str, payment_ref: &str, signature: &str)
    -> bool;

    async fn fetch_payment_status(&self, payment_ref: &str) -> Result<PaymentStatus>;

    /// Reverse lookup of payments by gateway order. `None` when unsupported.
    async fn find_payments_for_order(
        &self,
        _gateway_order_ref: &str,
    ) -> Result<Option<Vec<PaymentStatus>>> {
        Ok(None)
    }
}

/// Best-effort event sink. Must not block or fail the caller.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

pub type OrderRepositoryRef = Arc<dyn OrderRepository>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type AuditSinkRef = Arc<dyn AuditSink>;
