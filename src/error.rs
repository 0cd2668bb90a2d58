//! Error types for the order management gateway

use thiserror::Error;

use crate::order::{OrderId, OrderState};

/// Result type for order management operations
pub type OmsResult<T> = Result<T, OmsError>;

/// Order management error types
#[derive(Debug, Error)]
pub enum OmsError {
    /// Request arrived outside the configured trading window
    #[error("Outside trading window{}", order_suffix(.order_id))]
    OutsideTradingWindow {
        /// Order the rejected request targeted, if any
        order_id: Option<OrderId>,
    },

    /// Request arrived while the session is logged out
    #[error("Session is not logged on{}", order_suffix(.order_id))]
    NotLoggedOn {
        /// Order the rejected request targeted, if any
        order_id: Option<OrderId>,
    },

    /// Logon attempted on an active session
    #[error("Session is already logged on")]
    AlreadyLoggedOn,

    /// Credentials were rejected by the authenticator
    #[error("Authentication failed for user {0}")]
    AuthenticationFailed(String),

    /// Another in-flight order already uses this id
    #[error("Duplicate order id: {0}")]
    DuplicateOrderId(OrderId),

    /// No in-flight order carries this id
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Order is in a state that does not allow the operation
    #[error("Order {order_id} in invalid state {current_state} for {operation}")]
    InvalidStateTransition {
        /// Order ID
        order_id: OrderId,
        /// Current state
        current_state: OrderState,
        /// Operation attempted
        operation: String,
    },

    /// No dispatch token available; the order stays queued
    #[error("Rate limiter starved ({capacity} orders/sec)")]
    RateLimiterStarved {
        /// Configured orders per second
        capacity: u32,
    },

    /// Order validation failed
    #[error("Order {order_id} failed validation: {message}")]
    ValidationError {
        /// Order ID
        order_id: OrderId,
        /// Error message
        message: String,
    },

    /// Exchange collaborator reported a failure
    #[error("Exchange error during {operation}: {message}")]
    ExchangeError {
        /// Operation attempted
        operation: String,
        /// Error message
        message: String,
    },

    /// Response log append failed
    #[error("Response log error: {0}")]
    ResponseLogError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML configuration parse error
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OmsError {
    /// Check if the same request may succeed later without changes
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OmsError::OutsideTradingWindow { .. }
                | OmsError::NotLoggedOn { .. }
                | OmsError::RateLimiterStarved { .. }
                | OmsError::ExchangeError { .. }
                | OmsError::IoError(_)
        )
    }

    /// Check if the error only reports a condition rather than a failure
    pub fn is_informational(&self) -> bool {
        matches!(self, OmsError::RateLimiterStarved { .. })
    }

    /// Check if the error was raised by the trading window gate
    pub fn is_gate_rejection(&self) -> bool {
        matches!(
            self,
            OmsError::OutsideTradingWindow { .. } | OmsError::NotLoggedOn { .. }
        )
    }

    /// Attach the targeted order to a gate rejection raised without one
    pub fn for_order(self, id: OrderId) -> Self {
        match self {
            OmsError::OutsideTradingWindow { order_id: None } => OmsError::OutsideTradingWindow {
                order_id: Some(id),
            },
            OmsError::NotLoggedOn { order_id: None } => OmsError::NotLoggedOn {
                order_id: Some(id),
            },
            other => other,
        }
    }

    /// Order the rejection refers to, if any
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            OmsError::DuplicateOrderId(id) | OmsError::OrderNotFound(id) => Some(*id),
            OmsError::OutsideTradingWindow { order_id } | OmsError::NotLoggedOn { order_id } => {
                *order_id
            }
            OmsError::InvalidStateTransition { order_id, .. }
            | OmsError::ValidationError { order_id, .. } => Some(*order_id),
            _ => None,
        }
    }
}

fn order_suffix(order_id: &Option<OrderId>) -> String {
    order_id
        .map(|id| format!(" (order {})", id))
        .unwrap_or_default()
}

impl<T> From<std::sync::PoisonError<T>> for OmsError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        OmsError::InternalError(format!("Failed to acquire lock: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_retryable() {
        assert!(OmsError::OutsideTradingWindow { order_id: None }.is_retryable());
        assert!(OmsError::RateLimiterStarved { capacity: 5 }.is_retryable());

        let duplicate = OmsError::DuplicateOrderId(OrderId(1));
        assert!(!duplicate.is_retryable());

        let invalid = OmsError::InvalidStateTransition {
            order_id: OrderId(1),
            current_state: OrderState::Dispatched,
            operation: "modify".to_string(),
        };
        assert!(!invalid.is_retryable());
    }

    #[test]
    fn test_starved_is_informational() {
        assert!(OmsError::RateLimiterStarved { capacity: 2 }.is_informational());
        assert!(!OmsError::OrderNotFound(OrderId(9)).is_informational());
    }

    #[test]
    fn test_rejections_carry_order_id() {
        assert_eq!(OmsError::OrderNotFound(OrderId(9)).order_id(), Some(OrderId(9)));
        assert_eq!(
            OmsError::ValidationError {
                order_id: OrderId(4),
                message: "price".to_string(),
            }
            .order_id(),
            Some(OrderId(4))
        );
        assert!(OmsError::NotLoggedOn { order_id: None }.is_gate_rejection());
    }

    #[test]
    fn test_gate_rejection_tagged_with_order() {
        let err = OmsError::OutsideTradingWindow { order_id: None };
        assert_eq!(err.order_id(), None);
        assert_eq!(err.to_string(), "Outside trading window");

        let err = err.for_order(OrderId(7));
        assert_eq!(err.order_id(), Some(OrderId(7)));
        assert_eq!(err.to_string(), "Outside trading window (order 7)");

        let err = OmsError::NotLoggedOn { order_id: None }.for_order(OrderId(3));
        assert_eq!(err.order_id(), Some(OrderId(3)));

        // other errors keep their own id
        let err = OmsError::OrderNotFound(OrderId(1)).for_order(OrderId(2));
        assert_eq!(err.order_id(), Some(OrderId(1)));
    }

    #[test]
    fn test_error_display() {
        let err = OmsError::InvalidStateTransition {
            order_id: OrderId(12),
            current_state: OrderState::Dispatched,
            operation: "cancel".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Order 12 in invalid state DISPATCHED for cancel"
        );
    }
}
