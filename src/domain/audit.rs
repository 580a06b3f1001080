use super::order::{FailureReason, OrderId, OrderStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionEvent {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub reason: Option<FailureReason>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    Transition(TransitionEvent),
    /// A verification callback carried a signature that did not match.
    SecurityAlert {
        order_id: OrderId,
        gateway_order_ref: String,
        timestamp: DateTime<Utc>,
    },
    /// Needs manual review; the engine does not auto-heal these.
    Anomaly {
        order_id: OrderId,
        detail: String,
        timestamp: DateTime<Utc>,
    },
}

impl AuditEvent {
    pub fn order_id(&self) -> OrderId {
        match self {
            Self::Transition(event) => event.order_id,
            Self::SecurityAlert { order_id, .. } | Self::Anomaly { order_id, .. } => *order_id,
        }
    }

    pub fn as_transition(&self) -> Option<&TransitionEvent> {
        match self {
            Self::Transition(event) => Some(event),
            _ => None,
        }
    }
}
