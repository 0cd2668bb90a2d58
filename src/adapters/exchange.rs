//! Exchange adapter trait
//!
//! The wire protocol spoken to the exchange lives behind this trait. The
//! order manager only needs best-effort sends and fire-and-forget session
//! notifications.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::OmsResult;
use crate::order::Order;
use crate::session::SessionId;

/// Exchange adapter trait
///
/// Implementations report failures as errors; the caller decides whether
/// they matter. Nothing in this crate retries a failed call.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Exchange name used in logs
    fn name(&self) -> &str;

    /// Send an order to the exchange
    ///
    /// # Arguments
    /// * `order` - Snapshot of the order taken when it was dispatched
    async fn send_order(&mut self, order: &Order) -> OmsResult<()>;

    /// Notify the exchange that a session logged on
    async fn logon(&mut self, session_id: &SessionId) -> OmsResult<()>;

    /// Notify the exchange that the session logged out
    async fn logout(&mut self, session_id: &SessionId) -> OmsResult<()>;
}

/// Exchange handle shared by the session and the dispatcher
pub type SharedExchange = Arc<Mutex<Box<dyn Exchange>>>;

/// Wrap an adapter for sharing
pub fn shared(exchange: impl Exchange + 'static) -> SharedExchange {
    Arc::new(Mutex::new(Box::new(exchange)))
}

/// Exchange stand-in that accepts everything and only logs
#[derive(Debug, Default)]
pub struct PaperExchange {
    orders_sent: u64,
}

impl PaperExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders accepted so far
    pub fn orders_sent(&self) -> u64 {
        self.orders_sent
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    fn name(&self) -> &str {
        "paper"
    }

    async fn send_order(&mut self, order: &Order) -> OmsResult<()> {
        self.orders_sent += 1;
        info!(
            order_id = %order.id,
            symbol = %order.symbol_id,
            side = %order.side,
            price = order.price,
            quantity = order.quantity,
            "Order sent to paper exchange"
        );
        Ok(())
    }

    async fn logon(&mut self, session_id: &SessionId) -> OmsResult<()> {
        info!(session = %session_id, "Logon message sent to paper exchange");
        Ok(())
    }

    async fn logout(&mut self, session_id: &SessionId) -> OmsResult<()> {
        info!(session = %session_id, "Logout message sent to paper exchange");
        Ok(())
    }
}
