mod common;

use common::{Harness, request, single_item};
use orderflow::domain::audit::AuditEvent;
use orderflow::domain::money::{Currency, Money};
use orderflow::domain::order::{CartLine, FailureReason, OrderStatus};
use orderflow::error::OrderError;
use orderflow::infrastructure::simulated_gateway::GatewayOperation;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_checkout_end_to_end() {
    let h = Harness::new();
    h.gateway.queue_order_ref("gw_abc");

    let session = h
        .lifecycle
        .initiate(request(
            "c1",
            "u1",
            vec![CartLine::new("bat", 1, dec!(800)), CartLine::new("ball", 2, dec!(100))],
        ))
        .await
        .unwrap();
    assert_eq!(session.gateway_order_ref, "gw_abc");
    assert_eq!(session.gateway_amount, Money::new(1000, Currency::INR));
    assert_eq!(session.order.status, OrderStatus::Pending);

    let signature = h.gateway.record_payment("gw_abc", "pay_123", true);
    let order = h
        .lifecycle
        .verify("gw_abc", "pay_123", &signature)
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.gateway_payment_ref.as_deref(), Some("pay_123"));
    assert!(order.completed_at.unwrap() >= order.created_at);
    assert_eq!(order.shipping_address.phone(), "9876543210");

    let listed = h.lifecycle.list_for_owner(&"u1".into()).await.unwrap();
    assert_eq!(listed, vec![order.clone()]);
    assert_eq!(h.lifecycle.get(order.id).await.unwrap(), order);
}

#[tokio::test]
async fn test_repeated_verify_is_idempotent() {
    let h = Harness::new();
    let session = h.lifecycle.initiate(single_item("c1", dec!(1000))).await.unwrap();
    let signature = h
        .gateway
        .record_payment(&session.gateway_order_ref, "pay_1", true);

    let first = h
        .lifecycle
        .verify(&session.gateway_order_ref, "pay_1", &signature)
        .await
        .unwrap();
    for _ in 0..3 {
        let again = h
            .lifecycle
            .verify(&session.gateway_order_ref, "pay_1", &signature)
            .await
            .unwrap();
        assert_eq!(again, first);
    }
    assert_eq!(h.audit.transitions().len(), 1);
}

#[tokio::test]
async fn test_terminal_orders_never_move() {
    let h = Harness::new();
    let completed = h.lifecycle.initiate(single_item("c1", dec!(500))).await.unwrap();
    let failed = h.lifecycle.initiate(single_item("c2", dec!(500))).await.unwrap();

    let sig = h
        .gateway
        .record_payment(&completed.gateway_order_ref, "pay_ok", true);
    h.lifecycle
        .verify(&completed.gateway_order_ref, "pay_ok", &sig)
        .await
        .unwrap();
    h.lifecycle
        .verify(&failed.gateway_order_ref, "pay_bad", "not-a-signature")
        .await
        .unwrap();

    // A tampered callback cannot fail a completed order.
    let still_completed = h
        .lifecycle
        .verify(&completed.gateway_order_ref, "pay_x", "0000")
        .await
        .unwrap();
    assert_eq!(still_completed.status, OrderStatus::Completed);

    // A captured payment cannot complete a failed order.
    let late = h
        .gateway
        .record_payment(&failed.gateway_order_ref, "pay_late", true);
    let still_failed = h
        .lifecycle
        .verify(&failed.gateway_order_ref, "pay_late", &late)
        .await
        .unwrap();
    assert_eq!(still_failed.status, OrderStatus::Failed);

    // Neither is picked up by a sweep.
    let report = h
        .reconciler
        .sweep(chrono::Utc::now() + chrono::Duration::days(1))
        .await
        .unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(h.audit.transitions().len(), 2);
}

#[tokio::test]
async fn test_forged_signature_fails_order_and_raises_alert() {
    let h = Harness::new();
    let session = h.lifecycle.initiate(single_item("c1", dec!(1000))).await.unwrap();
    // Captured at the gateway, but the callback carries a forged signature.
    h.gateway
        .record_payment(&session.gateway_order_ref, "pay_1", true);

    let order = h
        .lifecycle
        .verify(&session.gateway_order_ref, "pay_1", &"ab".repeat(32))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Failed);
    assert_eq!(order.failure_reason, Some(FailureReason::SignatureMismatch));
    assert!(matches!(
        order.clone().outcome(),
        Err(OrderError::SignatureInvalid(ref r)) if *r == session.gateway_order_ref
    ));
    assert!(h.audit.events().iter().any(|e| matches!(
        e,
        AuditEvent::SecurityAlert { order_id, .. } if *order_id == order.id
    )));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_verify_settles_once() {
    let h = Harness::new();
    let session = h.lifecycle.initiate(single_item("c1", dec!(1000))).await.unwrap();
    let gateway_order_ref = session.gateway_order_ref.clone();
    let signature = h.gateway.record_payment(&gateway_order_ref, "pay_1", true);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let lifecycle = h.lifecycle.clone();
        let gateway_order_ref = gateway_order_ref.clone();
        let signature = signature.clone();
        handles.push(tokio::spawn(async move {
            lifecycle
                .verify(&gateway_order_ref, "pay_1", &signature)
                .await
        }));
    }
    for handle in handles {
        let order = handle.await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
    }

    let transitions = h.audit.transitions();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].to, OrderStatus::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_initiate_with_same_token_opens_one_intent() {
    let h = Harness::new();
    h.gateway
        .set_latency(Some(std::time::Duration::from_millis(50)));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let lifecycle = h.lifecycle.clone();
        handles.push(tokio::spawn(async move {
            lifecycle.initiate(single_item("c1", dec!(1000))).await
        }));
    }
    let mut sessions = Vec::new();
    for handle in handles {
        sessions.push(handle.await.unwrap().unwrap());
    }

    let orders = h.lifecycle.list_all().await.unwrap();
    assert_eq!(orders.len(), 1);
    let stored = &orders[0];
    assert_eq!(stored.status, OrderStatus::Pending);
    for session in &sessions {
        assert_eq!(session.order.id, stored.id);
        assert_eq!(Some(&session.gateway_order_ref), stored.gateway_order_ref.as_ref());
    }
    assert_eq!(h.gateway.calls(GatewayOperation::CreateIntent), 1);
    assert!(h.audit.flagged().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_competing_callbacks_converge() {
    let h = Harness::new();
    let session = h.lifecycle.initiate(single_item("c1", dec!(1000))).await.unwrap();
    let gateway_order_ref = session.gateway_order_ref.clone();
    let good = h.gateway.record_payment(&gateway_order_ref, "pay_1", true);

    let honest = {
        let lifecycle = h.lifecycle.clone();
        let gateway_order_ref = gateway_order_ref.clone();
        tokio::spawn(async move { lifecycle.verify(&gateway_order_ref, "pay_1", &good).await })
    };
    let forged = {
        let lifecycle = h.lifecycle.clone();
        let gateway_order_ref = gateway_order_ref.clone();
        tokio::spawn(async move { lifecycle.verify(&gateway_order_ref, "pay_1", "beef").await })
    };

    let a = honest.await.unwrap().unwrap();
    let b = forged.await.unwrap().unwrap();
    let stored = h.lifecycle.get(session.order.id).await.unwrap();

    assert!(stored.status.is_terminal());
    assert_eq!(a.status, stored.status);
    assert_eq!(b.status, stored.status);
    assert_eq!(h.audit.transitions().len(), 1);
}

#[tokio::test]
async fn test_amount_is_server_computed() {
    let h = Harness::new();
    let mut rng = rand::thread_rng();

    for n in 0..25 {
        let lines: Vec<CartLine> = (0..rng.gen_range(1..=5))
            .map(|i| {
                CartLine::new(
                    format!("p{i}"),
                    rng.gen_range(1..=10),
                    Decimal::from(rng.gen_range(1..=50_000u64)),
                )
            })
            .collect();
        let expected: u64 = lines
            .iter()
            .map(|l| u64::from(l.quantity) * l.unit_price.to_string().parse::<u64>().unwrap())
            .sum();

        let session = h
            .lifecycle
            .initiate(request(&format!("c{n}"), "u1", lines))
            .await
            .unwrap();
        assert_eq!(session.order.amount.minor_units, expected);
        assert_eq!(session.gateway_amount, session.order.amount);
        let item_total: u64 = session
            .order
            .items
            .iter()
            .map(|item| item.line_total.minor_units)
            .sum();
        assert_eq!(item_total, expected);
    }
}

#[tokio::test]
async fn test_fractional_minor_units_are_rejected() {
    let h = Harness::new();
    let result = h
        .lifecycle
        .initiate(request("c1", "u1", vec![CartLine::new("p1", 1, dec!(10.5))]))
        .await;
    assert!(matches!(result, Err(OrderError::ValidationError(_))));
}
