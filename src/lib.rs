//! # ag-oms: Order Management Gateway
//!
//! This library admits client orders during a daily trading window, holds
//! them as Pending, dispatches them to an exchange through a token-bucket
//! rate limiter, and correlates exchange responses back to their orders.
//!
//! ## Core Components
//!
//! - **OrderManager**: Facade gating, validating and routing requests
//! - **TradingSession**: Trading window plus logon/logout state
//! - **Order Management System (OMS)**: Pending store, FIFO dispatch queue
//!   with cancellation tombstones, and the ledger guarding them
//! - **Rate Limiting**: Token bucket refilled continuously
//! - **Dispatcher**: Background worker draining the queue
//! - **ResponseCorrelator**: Matches responses, records latency, retires orders
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ag_oms::{shared, Credentials, NewOrder, OmsConfig, OrderManager, PaperExchange, Side,
//!     StaticAuthenticator};
//!
//! #[tokio::main]
//! async fn main() -> ag_oms::OmsResult<()> {
//!     let auth = StaticAuthenticator::new().with_user("trader1", "password123");
//!     let manager = OrderManager::new(
//!         OmsConfig::default(),
//!         shared(PaperExchange::new()),
//!         Arc::new(auth),
//!     )?;
//!
//!     manager.logon(&Credentials::new("trader1", "password123")).await?;
//!     let dispatcher = manager.start_dispatcher();
//!
//!     manager.admit_order(NewOrder::new(1, 7, Side::Buy, 100.5, 10))?;
//!
//!     dispatcher.shutdown().await?;
//!     manager.logout().await
//! }
//! ```

// Public modules
pub mod auth;
pub mod clock;
pub mod config;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod order;
pub mod response_log;
pub mod session;

// Re-export main types
pub use auth::{Authenticator, Credentials, StaticAuthenticator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::OmsConfig;
pub use correlator::ResponseCorrelator;
pub use dispatcher::{DispatchReport, Dispatcher, DispatcherHandle};
pub use error::{OmsError, OmsResult};
pub use order::{
    NewOrder, Order, OrderId, OrderRequest, OrderResponse, OrderState, RequestAck, ResponseKind,
    ResponseRecord, RetireReason, Side, SymbolId,
};
pub use response_log::{JsonlResponseLog, MemoryResponseLog, ResponseLog};
pub use session::{SessionId, SessionState, TradingSession, TradingWindow};

// Internal modules
mod engine;

// OMS modules
pub mod oms;

// Adapter modules
pub mod adapters;

// Rate limiting
pub mod ratelimit;

pub use adapters::{shared, Exchange, PaperExchange, SharedExchange};

// Re-export engine
pub use engine::{OmsStats, OrderManager, OrderManagerBuilder};

// Initialize tracing
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ag_oms=info"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}
