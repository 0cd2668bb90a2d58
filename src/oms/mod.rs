//! Order Management System (OMS)
//!
//! Pending order store, dispatch queue, the ledger that guards them together
//! with the rate limiter, and order validation.

pub mod ledger;
pub mod queue;
pub mod store;
pub mod validator;

pub use ledger::{DispatchBatch, LedgerSnapshot, OrderLedger};
pub use queue::DispatchQueue;
pub use store::PendingOrderStore;
pub use validator::{OrderValidator, ValidationConfig};
