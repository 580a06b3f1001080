use crate::domain::order::{
    CheckoutToken, NewOrder, Order, OrderId, OrderStatus, OwnerId, StatusPatch,
};
use crate::domain::ports::OrderRepository;
use crate::error::{OrderError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    orders: HashMap<OrderId, Order>,
    by_gateway_ref: HashMap<String, OrderId>,
    by_checkout_token: HashMap<CheckoutToken, OrderId>,
}

impl Tables {
    fn get_mut(&mut self, id: OrderId) -> Result<&mut Order> {
        self.orders
            .get_mut(&id)
            .ok_or_else(|| OrderError::not_found("order", id))
    }
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    orders
}

/// A thread-safe in-memory order store.
///
/// All tables sit behind one `tokio::sync::RwLock`; every mutation, including
/// the conditional status update, runs under the write guard and is therefore
/// atomic with respect to concurrent callers.
#[derive(Default, Clone)]
pub struct InMemoryOrderRepository {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryOrderRepository {
    /// Creates a new, empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, new_order: NewOrder) -> Result<Order> {
        new_order.validate()?;
        let mut tables = self.tables.write().await;
        if tables
            .by_checkout_token
            .contains_key(&new_order.checkout_token)
        {
            return Err(OrderError::ValidationError(format!(
                "Checkout token already used: {}",
                new_order.checkout_token
            )));
        }
        let order = new_order.into_order(Utc::now());
        tables
            .by_checkout_token
            .insert(order.checkout_token.clone(), order.id);
        tables.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Order> {
        let tables = self.tables.read().await;
        tables
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| OrderError::not_found("order", id))
    }

    async fn find_by_gateway_order_ref(&self, gateway_order_ref: &str) -> Result<Order> {
        let tables = self.tables.read().await;
        tables
            .by_gateway_ref
            .get(gateway_order_ref)
            .and_then(|id| tables.orders.get(id))
            .cloned()
            .ok_or_else(|| OrderError::not_found("gateway order", gateway_order_ref))
    }

    async fn find_by_checkout_token(&self, token: &CheckoutToken) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_checkout_token
            .get(token)
            .and_then(|id| tables.orders.get(id))
            .cloned())
    }

    async fn attach_gateway_order_ref(
        &self,
        id: OrderId,
        gateway_order_ref: &str,
    ) -> Result<Order> {
        let mut tables = self.tables.write().await;
        if let Some(owner) = tables.by_gateway_ref.get(gateway_order_ref)
            && *owner != id
        {
            return Err(OrderError::ValidationError(format!(
                "Gateway order ref {gateway_order_ref} already belongs to another order"
            )));
        }
        let order = tables.get_mut(id)?;
        order.attach_gateway_order_ref(gateway_order_ref)?;
        let order = order.clone();
        tables
            .by_gateway_ref
            .insert(gateway_order_ref.to_string(), id);
        Ok(order)
    }

    async fn record_payment_attempt(&self, id: OrderId, payment_ref: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.get_mut(id)?.record_payment_attempt(payment_ref);
        Ok(())
    }

    async fn update_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        patch: StatusPatch,
    ) -> Result<Order> {
        let mut tables = self.tables.write().await;
        let order = tables.get_mut(id)?;
        order.apply_transition(from, to, patch)?;
        Ok(order.clone())
    }

    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables
                .orders
                .values()
                .filter(|o| &o.owner_id == owner_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_all(&self) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(newest_first(tables.orders.values().cloned().collect()))
    }

    async fn list_pending_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        let mut stale: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.created_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|o| o.created_at);
        Ok(stale)
    }
}
