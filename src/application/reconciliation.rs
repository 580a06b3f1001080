use super::engine::{OrderLifecycle, Settlement};
use crate::domain::audit::AuditEvent;
use crate::domain::order::{FailureReason, Order, OrderStatus};
use crate::error::{OrderError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationPolicy {
    /// Age after which a pending order is considered stale.
    pub pending_timeout: Duration,
    /// Delay between background sweeps.
    pub sweep_interval: Duration,
}

impl Default for ReconciliationPolicy {
    fn default() -> Self {
        Self {
            pending_timeout: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl ReconciliationPolicy {
    /// A zero interval cannot drive a ticker, and the timeout must be
    /// representable as a calendar offset.
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval.is_zero() {
            return Err(OrderError::ValidationError(
                "Sweep interval must be greater than zero".to_string(),
            ));
        }
        self.stale_after()?;
        Ok(())
    }

    fn stale_after(&self) -> Result<chrono::Duration> {
        chrono::Duration::from_std(self.pending_timeout).map_err(|_| {
            OrderError::ValidationError(format!(
                "Pending timeout of {:?} is out of range",
                self.pending_timeout
            ))
        })
    }
}

/// Tally of a single sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub completed: usize,
    pub failed: usize,
    /// Left pending with an anomaly recorded for manual review.
    pub unresolved: usize,
    /// Left pending because the gateway could not be reached.
    pub deferred: usize,
    pub errors: usize,
}

enum Verdict {
    Captured(String),
    NeverPaid,
    Unknown,
}

/// Settles orders whose completion callback never arrived.
pub struct Reconciler {
    lifecycle: Arc<OrderLifecycle>,
    policy: ReconciliationPolicy,
}

impl Reconciler {
    pub fn new(lifecycle: Arc<OrderLifecycle>, policy: ReconciliationPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self { lifecycle, policy })
    }

    pub fn policy(&self) -> &ReconciliationPolicy {
        &self.policy
    }

    /// Examines every order still pending `pending_timeout` before `now`.
    #[instrument(skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let cutoff = now
            .checked_sub_signed(self.policy.stale_after()?)
            .ok_or_else(|| {
                OrderError::ValidationError(format!(
                    "Pending timeout of {:?} reaches before {now}",
                    self.policy.pending_timeout
                ))
            })?;
        let stale = self
            .lifecycle
            .repository()
            .list_pending_created_before(cutoff)
            .await?;

        let mut report = SweepReport::default();
        for order in stale {
            report.examined += 1;
            match self.reconcile(&order).await {
                Ok(Some(settled)) => match settled.status {
                    OrderStatus::Completed => report.completed += 1,
                    OrderStatus::Failed => report.failed += 1,
                    OrderStatus::Pending => report.unresolved += 1,
                },
                Ok(None) => report.unresolved += 1,
                Err(e) if e.is_retryable() => {
                    debug!(order_id = %order.id, error = %e, "gateway unreachable; retrying next sweep");
                    report.deferred += 1;
                }
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "reconciliation failed");
                    report.errors += 1;
                }
            }
        }
        if report.examined > 0 {
            info!(?report, "reconciliation sweep finished");
        }
        Ok(report)
    }

    /// `Ok(None)` means the order was left pending for manual review.
    async fn reconcile(&self, order: &Order) -> Result<Option<Order>> {
        match self.verdict(order).await? {
            Verdict::Captured(payment_ref) => self
                .lifecycle
                .settle(order, Settlement::Capture { payment_ref })
                .await
                .map(Some),
            Verdict::NeverPaid => self
                .lifecycle
                .settle(order, Settlement::Fail(FailureReason::Timeout))
                .await
                .map(Some),
            Verdict::Unknown => {
                self.lifecycle.audit(AuditEvent::Anomaly {
                    order_id: order.id,
                    detail: format!(
                        "stale pending order with {} unconfirmed payment attempt(s)",
                        order.payment_attempts.len()
                    ),
                    timestamp: Utc::now(),
                });
                Ok(None)
            }
        }
    }

    async fn verdict(&self, order: &Order) -> Result<Verdict> {
        let Some(gateway_order_ref) = order.gateway_order_ref.as_deref() else {
            // No intent was ever opened, so nothing could have been paid.
            return Ok(Verdict::NeverPaid);
        };
        let gateway = self.lifecycle.gateway();

        for payment_ref in &order.payment_attempts {
            match self
                .lifecycle
                .bounded(
                    "fetch_payment_status",
                    gateway.fetch_payment_status(payment_ref),
                )
                .await
            {
                Ok(status) if status.captured_for(gateway_order_ref) => {
                    return Ok(Verdict::Captured(payment_ref.clone()));
                }
                Ok(_) | Err(OrderError::GatewayRejected(_)) => {}
                Err(e) => return Err(e),
            }
        }

        match self
            .lifecycle
            .bounded(
                "find_payments_for_order",
                gateway.find_payments_for_order(gateway_order_ref),
            )
            .await?
        {
            Some(payments) => Ok(payments
                .into_iter()
                .find(|p| p.captured_for(gateway_order_ref))
                .map_or(Verdict::NeverPaid, |p| Verdict::Captured(p.payment_ref))),
            // Every logged attempt was answered and none was captured.
            None if !order.payment_attempts.is_empty() => Ok(Verdict::NeverPaid),
            None => Ok(Verdict::Unknown),
        }
    }

    /// Sweeps every `sweep_interval` until `shutdown` flips to `true` or its
    /// sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.policy.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep(Utc::now()).await {
                        error!(error = %e, "reconciliation sweep aborted");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("reconciler stopped");
                        break;
                    }
                }
            }
        }
    }
}
