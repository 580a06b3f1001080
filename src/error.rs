use crate::domain::order::{OrderId, OrderStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },
    #[error("Conflict on order {id}: expected status {expected}, found {actual}")]
    ConflictError {
        id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),
    #[error("Payment gateway rejected the request: {0}")]
    GatewayRejected(String),
    #[error("Payment signature invalid for gateway order {0}")]
    SignatureInvalid(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl OrderError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Transient failures that a caller (or the reconciliation sweep) may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GatewayUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, OrderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_gateway_unavailable_is_retryable() {
        assert!(OrderError::GatewayUnavailable("503".into()).is_retryable());
        assert!(!OrderError::GatewayRejected("400".into()).is_retryable());
        assert!(!OrderError::ValidationError("bad".into()).is_retryable());
        assert!(!OrderError::not_found("order", "x").is_retryable());
    }

    #[test]
    fn test_not_found_message() {
        let err = OrderError::not_found("order", "gw_abc");
        assert_eq!(err.to_string(), "order not found: gw_abc");
    }
}
