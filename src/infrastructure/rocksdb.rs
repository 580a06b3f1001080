use crate::domain::order::{
    CheckoutToken, NewOrder, Order, OrderId, OrderStatus, OwnerId, StatusPatch,
};
use crate::domain::ports::OrderRepository;
use crate::error::{OrderError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, ErrorKind, IteratorMode, OptimisticTransactionDB,
    Options, Transaction,
};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Column Family for order records, keyed by the order UUID bytes.
pub const CF_ORDERS: &str = "orders";
/// Secondary unique index: gateway order ref -> order UUID.
pub const CF_GATEWAY_REFS: &str = "gateway_refs";
/// Secondary unique index: checkout token -> order UUID.
pub const CF_CHECKOUT_TOKENS: &str = "checkout_tokens";

const MAX_COMMIT_ATTEMPTS: usize = 16;

type Txn<'a> = Transaction<'a, OptimisticTransactionDB>;

/// A persistent order store backed by RocksDB.
///
/// Every mutation runs in an optimistic transaction: rows are read with
/// `get_for_update_cf`, so a concurrent writer to the same key makes the
/// commit fail with `Busy`, and the whole read-check-write is retried. This
/// gives `update_status` its check-and-set semantics without process locks.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc`).
#[derive(Clone)]
pub struct RocksDBOrderRepository {
    db: Arc<OptimisticTransactionDB>,
}

fn order_key(id: OrderId) -> [u8; 16] {
    *id.0.as_bytes()
}

fn decode_id(bytes: &[u8]) -> Result<OrderId> {
    Uuid::from_slice(bytes)
        .map(OrderId)
        .map_err(|e| OrderError::InternalError(Box::new(e)))
}

impl RocksDBOrderRepository {
    /// Opens or creates a RocksDB instance at the specified path, ensuring
    /// the order table and both index column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = [CF_ORDERS, CF_GATEWAY_REFS, CF_CHECKOUT_TOKENS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = OptimisticTransactionDB::open_cf_descriptors(&opts, path, cfs)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            OrderError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    /// Runs `body` in an optimistic transaction, retrying on write conflicts.
    fn transact<T>(&self, mut body: impl FnMut(&Txn<'_>) -> Result<T>) -> Result<T> {
        for _ in 0..MAX_COMMIT_ATTEMPTS {
            let txn = self.db.transaction();
            let value = body(&txn)?;
            match txn.commit() {
                Ok(()) => return Ok(value),
                Err(e) if matches!(e.kind(), ErrorKind::Busy | ErrorKind::TryAgain) => {
                    tracing::debug!(error = %e, "optimistic commit conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(OrderError::InternalError(Box::new(std::io::Error::other(
            "transaction retries exhausted",
        ))))
    }

    fn load_for_update(&self, txn: &Txn<'_>, id: OrderId) -> Result<Order> {
        let bytes = txn
            .get_for_update_cf(self.cf(CF_ORDERS)?, order_key(id), true)?
            .ok_or_else(|| OrderError::not_found("order", id))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn put_order(&self, txn: &Txn<'_>, order: &Order) -> Result<()> {
        txn.put_cf(
            self.cf(CF_ORDERS)?,
            order_key(order.id),
            serde_json::to_vec(order)?,
        )?;
        Ok(())
    }

    fn get(&self, id: OrderId) -> Result<Option<Order>> {
        match self.db.get_cf(self.cf(CF_ORDERS)?, order_key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn lookup(&self, index: &str, key: &[u8]) -> Result<Option<Order>> {
        match self.db.get_cf(self.cf(index)?, key)? {
            Some(id) => self.get(decode_id(&id)?),
            None => Ok(None),
        }
    }

    fn scan(&self, mut keep: impl FnMut(&Order) -> bool) -> Result<Vec<Order>> {
        let mut orders = Vec::new();
        for item in self.db.iterator_cf(self.cf(CF_ORDERS)?, IteratorMode::Start) {
            let (_key, value) = item?;
            let order: Order = serde_json::from_slice(&value)?;
            if keep(&order) {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    fn newest_first(&self, keep: impl FnMut(&Order) -> bool) -> Result<Vec<Order>> {
        let mut orders = self.scan(keep)?;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }
}

#[async_trait]
impl OrderRepository for RocksDBOrderRepository {
    async fn create(&self, new_order: NewOrder) -> Result<Order> {
        new_order.validate()?;
        let order = new_order.into_order(Utc::now());
        self.transact(|txn| {
            let tokens = self.cf(CF_CHECKOUT_TOKENS)?;
            let token = order.checkout_token.0.as_bytes();
            if txn.get_for_update_cf(tokens, token, true)?.is_some() {
                return Err(OrderError::ValidationError(format!(
                    "Checkout token already used: {}",
                    order.checkout_token
                )));
            }
            txn.put_cf(tokens, token, order_key(order.id))?;
            self.put_order(txn, &order)
        })?;
        Ok(order)
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Order> {
        self.get(id)?
            .ok_or_else(|| OrderError::not_found("order", id))
    }

    async fn find_by_gateway_order_ref(&self, gateway_order_ref: &str) -> Result<Order> {
        self.lookup(CF_GATEWAY_REFS, gateway_order_ref.as_bytes())?
            .ok_or_else(|| OrderError::not_found("gateway order", gateway_order_ref))
    }

    async fn find_by_checkout_token(&self, token: &CheckoutToken) -> Result<Option<Order>> {
        self.lookup(CF_CHECKOUT_TOKENS, token.0.as_bytes())
    }

    async fn attach_gateway_order_ref(
        &self,
        id: OrderId,
        gateway_order_ref: &str,
    ) -> Result<Order> {
        self.transact(|txn| {
            let refs = self.cf(CF_GATEWAY_REFS)?;
            if let Some(owner) = txn.get_for_update_cf(refs, gateway_order_ref.as_bytes(), true)?
                && decode_id(&owner)? != id
            {
                return Err(OrderError::ValidationError(format!(
                    "Gateway order ref {gateway_order_ref} already belongs to another order"
                )));
            }
            let mut order = self.load_for_update(txn, id)?;
            order.attach_gateway_order_ref(gateway_order_ref)?;
            txn.put_cf(refs, gateway_order_ref.as_bytes(), order_key(id))?;
            self.put_order(txn, &order)?;
            Ok(order)
        })
    }

    async fn record_payment_attempt(&self, id: OrderId, payment_ref: &str) -> Result<()> {
        self.transact(|txn| {
            let mut order = self.load_for_update(txn, id)?;
            order.record_payment_attempt(payment_ref);
            self.put_order(txn, &order)
        })
    }

    async fn update_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        patch: StatusPatch,
    ) -> Result<Order> {
        self.transact(|txn| {
            let mut order = self.load_for_update(txn, id)?;
            order.apply_transition(from, to, patch.clone())?;
            self.put_order(txn, &order)?;
            Ok(order)
        })
    }

    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<Order>> {
        self.newest_first(|o| &o.owner_id == owner_id)
    }

    async fn list_all(&self) -> Result<Vec<Order>> {
        self.newest_first(|_| true)
    }

    async fn list_pending_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let mut stale =
            self.scan(|o| o.status == OrderStatus::Pending && o.created_at < cutoff)?;
        stale.sort_by_key(|o| o.created_at);
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::address::{AddressForm, ShippingAddress};
    use crate::domain::money::Currency;
    use crate::domain::order::{CartLine, price_cart};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn new_order(token: &str) -> NewOrder {
        let (items, amount) =
            price_cart(&[CartLine::new("p1", 2, dec!(500))], Currency::INR).unwrap();
        NewOrder {
            checkout_token: token.into(),
            owner_id: "u1".into(),
            amount,
            items,
            shipping_address: ShippingAddress::try_from(AddressForm {
                full_name: "Asha Rao".into(),
                line1: "12 MG Road".into(),
                line2: None,
                city: "Bengaluru".into(),
                region: "Karnataka".into(),
                postal_code: "560001".into(),
                country: "IN".into(),
                phone: "9876543210".into(),
            })
            .unwrap(),
        }
    }

    fn patch() -> StatusPatch {
        StatusPatch {
            gateway_payment_ref: Some("pay_1".into()),
            failure_reason: None,
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBOrderRepository::open(dir.path()).expect("Failed to open RocksDB");

        assert!(store.db.cf_handle(CF_ORDERS).is_some());
        assert!(store.db.cf_handle(CF_GATEWAY_REFS).is_some());
        assert!(store.db.cf_handle(CF_CHECKOUT_TOKENS).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_order_roundtrip_and_indexes() {
        let dir = tempdir().unwrap();
        let store = RocksDBOrderRepository::open(dir.path()).unwrap();

        let order = store.create(new_order("c1")).await.unwrap();
        assert_eq!(store.find_by_id(order.id).await.unwrap(), order);
        assert!(store.create(new_order("c1")).await.is_err());

        store.attach_gateway_order_ref(order.id, "gw_1").await.unwrap();
        let by_ref = store.find_by_gateway_order_ref("gw_1").await.unwrap();
        assert_eq!(by_ref.id, order.id);
        let by_token = store.find_by_checkout_token(&"c1".into()).await.unwrap();
        assert_eq!(by_token.unwrap().gateway_order_ref.as_deref(), Some("gw_1"));
    }

    #[tokio::test]
    async fn test_rocksdb_conditional_update() {
        let dir = tempdir().unwrap();
        let store = RocksDBOrderRepository::open(dir.path()).unwrap();
        let order = store.create(new_order("c1")).await.unwrap();

        store
            .update_status(order.id, OrderStatus::Pending, OrderStatus::Completed, patch())
            .await
            .unwrap();
        let lost = store
            .update_status(order.id, OrderStatus::Pending, OrderStatus::Failed, patch())
            .await;
        assert!(matches!(lost, Err(OrderError::ConflictError { .. })));
    }

    #[tokio::test]
    async fn test_rocksdb_survives_reopen() {
        let dir = tempdir().unwrap();
        let id = {
            let store = RocksDBOrderRepository::open(dir.path()).unwrap();
            let order = store.create(new_order("c1")).await.unwrap();
            store.record_payment_attempt(order.id, "pay_1").await.unwrap();
            order.id
        };
        let store = RocksDBOrderRepository::open(dir.path()).unwrap();
        let order = store.find_by_id(id).await.unwrap();
        assert_eq!(order.payment_attempts, vec!["pay_1".to_string()]);
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }
}
