//! Order validation logic
//!
//! This module checks order fields before a request touches the pending store.

use serde::{Deserialize, Serialize};

use crate::error::{OmsError, OmsResult};
use crate::order::{NewOrder, OrderId};

/// Validation limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Exclusive lower price bound
    #[serde(default)]
    pub min_price: f64,

    /// Inclusive upper price bound
    #[serde(default = "default_max_price")]
    pub max_price: f64,

    /// Largest accepted quantity
    #[serde(default = "default_max_quantity")]
    pub max_quantity: u64,
}

fn default_max_price() -> f64 {
    1_000_000.0
}

fn default_max_quantity() -> u64 {
    1_000_000
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_price: 0.0,
            max_price: default_max_price(),
            max_quantity: default_max_quantity(),
        }
    }
}

/// Order validator
#[derive(Debug, Clone)]
pub struct OrderValidator {
    config: ValidationConfig,
}

impl OrderValidator {
    /// Create a new order validator with default limits
    pub fn new() -> Self {
        Self::from_config(ValidationConfig::default())
    }

    /// Create a custom validator
    pub fn custom(min_price: f64, max_price: f64, max_quantity: u64) -> Self {
        Self::from_config(ValidationConfig {
            min_price,
            max_price,
            max_quantity,
        })
    }

    pub fn from_config(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a new order
    pub fn validate(&self, order: &NewOrder) -> OmsResult<()> {
        self.validate_terms(order.order_id, order.price, order.quantity)
    }

    /// Validate the price and quantity carried by a new order or a modification
    pub fn validate_terms(&self, order_id: OrderId, price: f64, quantity: u64) -> OmsResult<()> {
        let reject = |message: String| {
            Err(OmsError::ValidationError {
                order_id,
                message,
            })
        };

        if !price.is_finite() {
            return reject(format!("Price {} is not a finite number", price));
        }

        if price <= self.config.min_price {
            return reject(format!(
                "Price {} must be above {}",
                price, self.config.min_price
            ));
        }

        if price > self.config.max_price {
            return reject(format!(
                "Price {} exceeds maximum {}",
                price, self.config.max_price
            ));
        }

        if quantity == 0 {
            return reject("Quantity must be positive".to_string());
        }

        if quantity > self.config.max_quantity {
            return reject(format!(
                "Quantity {} exceeds maximum {}",
                quantity, self.config.max_quantity
            ));
        }

        Ok(())
    }
}

impl Default for OrderValidator {
    fn default() -> Self {
        Self::new()
    }
}
