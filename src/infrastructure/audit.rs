use crate::domain::audit::{AuditEvent, TransitionEvent};
use crate::domain::ports::{AuditSink, AuditSinkRef};
use parking_lot::Mutex;
use std::sync::Arc;

/// Emits audit events as structured `tracing` records under the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match event {
            AuditEvent::Transition(TransitionEvent {
                order_id,
                from,
                to,
                reason,
                timestamp,
            }) => tracing::info!(
                target: "audit",
                %order_id,
                %from,
                %to,
                reason = reason.map(|r| r.as_str()),
                %timestamp,
                "order transition"
            ),
            AuditEvent::SecurityAlert {
                order_id,
                gateway_order_ref,
                timestamp,
            } => tracing::error!(
                target: "audit",
                %order_id,
                %gateway_order_ref,
                %timestamp,
                "payment signature mismatch"
            ),
            AuditEvent::Anomaly {
                order_id,
                detail,
                timestamp,
            } => tracing::warn!(
                target: "audit",
                %order_id,
                %timestamp,
                detail = %detail,
                "order anomaly requires manual review"
            ),
        }
    }
}

/// Keeps every event in memory so callers can review them after a run.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Security alerts and anomalies, in the order they were recorded.
    pub fn flagged(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.as_transition().is_none())
            .cloned()
            .collect()
    }

    pub fn transitions(&self) -> Vec<TransitionEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(AuditEvent::as_transition)
            .cloned()
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

/// Forwards each event to every inner sink.
#[derive(Default, Clone)]
pub struct FanoutAuditSink {
    sinks: Vec<AuditSinkRef>,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<AuditSinkRef>) -> Self {
        Self { sinks }
    }
}

impl AuditSink for FanoutAuditSink {
    fn record(&self, event: AuditEvent) {
        for sink in &self.sinks {
            sink.record(event.clone());
        }
    }
}
