use super::address::ShippingAddress;
use super::money::{Currency, Money};
use crate::error::{OrderError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque account identifier resolved by the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Client-supplied idempotency key for one checkout attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckoutToken(pub String);

impl fmt::Display for CheckoutToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CheckoutToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Completed,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Only `pending -> completed` and `pending -> failed` exist.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed) | (Self::Pending, Self::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    SignatureMismatch,
    NotCaptured,
    Timeout,
    GatewayRejected,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SignatureMismatch => "signature_mismatch",
            Self::NotCaptured => "not_captured",
            Self::Timeout => "timeout",
            Self::GatewayRejected => "gateway_rejected",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the cart as priced by the catalog at add-to-cart time.
///
/// `unit_price` is expressed in minor units of the checkout currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    #[serde(alias = "productId", alias = "product")]
    pub product_id: String,
    #[serde(alias = "qty")]
    pub quantity: u32,
    #[serde(alias = "unitPrice")]
    pub unit_price: Decimal,
}

impl CartLine {
    pub fn new(product_id: impl Into<String>, quantity: u32, unit_price: Decimal) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            unit_price,
        }
    }

    /// Integer line total. Fails if the product does not land on a whole minor unit.
    pub fn total(&self, currency: Currency) -> Result<Money> {
        if self.product_id.trim().is_empty() {
            return Err(OrderError::ValidationError(
                "Cart line is missing a product id".to_string(),
            ));
        }
        if self.quantity == 0 {
            return Err(OrderError::ValidationError(format!(
                "Quantity must be positive for product {}",
                self.product_id
            )));
        }
        if self.unit_price.is_sign_negative() {
            return Err(OrderError::ValidationError(format!(
                "Unit price must not be negative for product {}",
                self.product_id
            )));
        }
        let total = self
            .unit_price
            .checked_mul(Decimal::from(self.quantity))
            .ok_or_else(|| OrderError::ValidationError("Line total overflow".to_string()))?;
        if !total.fract().is_zero() {
            return Err(OrderError::ValidationError(format!(
                "Line total for product {} is not a whole number of minor units: {}",
                self.product_id, total
            )));
        }
        let minor_units = total
            .to_u64()
            .ok_or_else(|| OrderError::ValidationError("Line total overflow".to_string()))?;
        Ok(Money::new(minor_units, currency))
    }
}

/// Immutable snapshot of a purchased line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Money,
}

/// Snapshots a cart into order items and sums the order amount.
pub fn price_cart(lines: &[CartLine], currency: Currency) -> Result<(Vec<OrderItem>, Money)> {
    if lines.is_empty() {
        return Err(OrderError::ValidationError("Cart is empty".to_string()));
    }
    let mut amount = Money::zero(currency);
    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let line_total = line.total(currency)?;
        amount = amount.checked_add(line_total)?;
        items.push(OrderItem {
            product_id: line.product_id.trim().to_string(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total,
        });
    }
    Ok((items, amount))
}

/// An order about to be persisted. The repository assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub checkout_token: CheckoutToken,
    pub owner_id: OwnerId,
    pub amount: Money,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
}

impl NewOrder {
    pub fn validate(&self) -> Result<()> {
        if self.checkout_token.0.trim().is_empty() {
            return Err(OrderError::ValidationError(
                "Checkout token is required".to_string(),
            ));
        }
        if self.owner_id.0.trim().is_empty() {
            return Err(OrderError::ValidationError("Owner id is required".to_string()));
        }
        if self.items.is_empty() {
            return Err(OrderError::ValidationError(
                "Order must contain at least one item".to_string(),
            ));
        }
        if !self.amount.is_positive() {
            return Err(OrderError::ValidationError(
                "Order amount must be positive".to_string(),
            ));
        }
        let sum = self
            .items
            .iter()
            .try_fold(Money::zero(self.amount.currency), |acc, item| {
                acc.checked_add(item.line_total)
            })?;
        if sum != self.amount {
            return Err(OrderError::ValidationError(format!(
                "Order amount {} does not match item total {}",
                self.amount, sum
            )));
        }
        Ok(())
    }

    pub fn into_order(self, created_at: DateTime<Utc>) -> Order {
        Order {
            id: OrderId::new(),
            checkout_token: self.checkout_token,
            owner_id: self.owner_id,
            amount: self.amount,
            items: self.items,
            shipping_address: self.shipping_address,
            status: OrderStatus::Pending,
            failure_reason: None,
            gateway_order_ref: None,
            gateway_payment_ref: None,
            payment_attempts: Vec::new(),
            created_at,
            completed_at: None,
        }
    }
}

/// Fields written together with a terminal status.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusPatch {
    pub gateway_payment_ref: Option<String>,
    pub failure_reason: Option<FailureReason>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub checkout_token: CheckoutToken,
    pub owner_id: OwnerId,
    pub amount: Money,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub status: OrderStatus,
    pub failure_reason: Option<FailureReason>,
    pub gateway_order_ref: Option<String>,
    pub gateway_payment_ref: Option<String>,
    #[serde(default)]
    pub payment_attempts: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Applies a conditional transition in place.
    ///
    /// Storage backends call this inside their atomic section so the
    /// check-and-set rules live in one place.
    pub fn apply_transition(
        &mut self,
        from: OrderStatus,
        to: OrderStatus,
        patch: StatusPatch,
    ) -> Result<()> {
        if !from.can_transition_to(to) {
            return Err(OrderError::ValidationError(format!(
                "Illegal order transition {from} -> {to}"
            )));
        }
        if self.status != from {
            return Err(OrderError::ConflictError {
                id: self.id,
                expected: from,
                actual: self.status,
            });
        }
        self.status = to;
        if let Some(payment_ref) = patch.gateway_payment_ref {
            self.gateway_payment_ref = Some(payment_ref);
        }
        self.failure_reason = patch.failure_reason;
        self.completed_at = Some(patch.completed_at);
        Ok(())
    }

    /// Sets the gateway order reference once. Same value again is a no-op.
    pub fn attach_gateway_order_ref(&mut self, gateway_order_ref: &str) -> Result<()> {
        match &self.gateway_order_ref {
            Some(existing) if existing == gateway_order_ref => Ok(()),
            Some(_) => Err(OrderError::ConflictError {
                id: self.id,
                expected: OrderStatus::Pending,
                actual: self.status,
            }),
            None if self.status != OrderStatus::Pending => Err(OrderError::ConflictError {
                id: self.id,
                expected: OrderStatus::Pending,
                actual: self.status,
            }),
            None => {
                self.gateway_order_ref = Some(gateway_order_ref.to_string());
                Ok(())
            }
        }
    }

    pub fn record_payment_attempt(&mut self, payment_ref: &str) {
        if !self.payment_attempts.iter().any(|p| p == payment_ref) {
            self.payment_attempts.push(payment_ref.to_string());
        }
    }

    /// Maps a settled order onto the caller-facing error taxonomy.
    pub fn outcome(self) -> Result<Self> {
        match (self.status, self.failure_reason) {
            (OrderStatus::Failed, Some(FailureReason::SignatureMismatch)) => Err(
                OrderError::SignatureInvalid(self.gateway_order_ref.unwrap_or_default()),
            ),
            (OrderStatus::Failed, reason) => Err(OrderError::GatewayRejected(format!(
                "order {} failed: {}",
                self.id,
                reason.map_or("unknown", FailureReason::as_str)
            ))),
            _ => Ok(self),
        }
    }
}
