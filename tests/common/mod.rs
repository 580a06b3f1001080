#![allow(dead_code)]

use orderflow::application::engine::{CheckoutRequest, EngineConfig, OrderLifecycle};
use orderflow::application::reconciliation::{ReconciliationPolicy, Reconciler};
use orderflow::domain::address::AddressForm;
use orderflow::domain::order::CartLine;
use orderflow::domain::ports::OrderRepositoryRef;
use orderflow::infrastructure::audit::InMemoryAuditSink;
use orderflow::infrastructure::in_memory::InMemoryOrderRepository;
use orderflow::infrastructure::simulated_gateway::SimulatedGateway;
use rust_decimal::Decimal;
use std::fs::File;
use std::io::{Error, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const KEY_SECRET: &str = "test_secret";

pub struct Harness {
    pub lifecycle: Arc<OrderLifecycle>,
    pub reconciler: Arc<Reconciler>,
    pub gateway: Arc<SimulatedGateway>,
    pub audit: InMemoryAuditSink,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_repository(Arc::new(InMemoryOrderRepository::new()))
    }

    pub fn with_repository(repository: OrderRepositoryRef) -> Self {
        let gateway = Arc::new(SimulatedGateway::new("rzp_test_key", KEY_SECRET));
        let audit = InMemoryAuditSink::new();
        let lifecycle = Arc::new(OrderLifecycle::new(
            repository,
            gateway.clone(),
            Arc::new(audit.clone()),
            EngineConfig {
                gateway_timeout: Duration::from_secs(2),
                ..EngineConfig::default()
            },
        ));
        let reconciler = Arc::new(Reconciler::new(
            lifecycle.clone(),
            ReconciliationPolicy {
                pending_timeout: Duration::from_secs(60),
                sweep_interval: Duration::from_secs(1),
            },
        )
        .unwrap());
        Self {
            lifecycle,
            reconciler,
            gateway,
            audit,
        }
    }
}

pub fn address() -> AddressForm {
    AddressForm {
        full_name: "Asha Rao".into(),
        line1: "12 MG Road".into(),
        line2: Some("Near Metro".into()),
        city: "Bengaluru".into(),
        region: "Karnataka".into(),
        postal_code: "560001".into(),
        country: "India".into(),
        phone: "98765-43210".into(),
    }
}

pub fn request(token: &str, owner: &str, items: Vec<CartLine>) -> CheckoutRequest {
    CheckoutRequest {
        checkout_token: token.into(),
        owner_id: owner.into(),
        items,
        address: address(),
    }
}

pub fn single_item(token: &str, unit_price: Decimal) -> CheckoutRequest {
    request(token, "u1", vec![CartLine::new("p1", 1, unit_price)])
}

/// Writes a replay log with `orders` checkouts; every other one is paid.
pub fn generate_event_log(path: &Path, orders: usize) -> Result<(), Error> {
    let mut file = File::create(path)?;
    for i in 1..=orders {
        writeln!(
            file,
            r#"{{"type":"initiate","checkout_token":"c{i}","owner_id":"u{}","items":[{{"product_id":"p{i}","quantity":{},"unit_price":250}}],"address":{{"full_name":"Asha Rao","line1":"12 MG Road","city":"Bengaluru","region":"Karnataka","postal_code":"560001","phone":"9876543210"}}}}"#,
            i % 3,
            i % 4 + 1
        )?;
        if i % 2 == 0 {
            writeln!(
                file,
                r#"{{"type":"pay","checkout_token":"c{i}","payment_ref":"pay_{i}"}}"#
            )?;
        }
    }
    Ok(())
}
