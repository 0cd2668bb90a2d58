//! Order types and related data structures
//!
//! This module defines the order record owned by the pending store, the
//! requests that create and amend it, and the responses that retire it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OmsError, OmsResult};

/// Caller-assigned order identifier
///
/// Unique among currently pending orders; an id may be reused once the
/// previous order carrying it has been retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl OrderId {
    /// Create an OrderId from a raw value
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw identifier
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for OrderId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Instrument identifier as understood by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

impl std::fmt::Display for SymbolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order
    Buy,
    /// Sell order
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Why an order left the pending store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetireReason {
    /// Cancelled by the caller before dispatch
    Cancelled,
    /// Retired by a correlated exchange response
    Completed,
}

/// Order lifecycle state
///
/// The only reachable transitions are `Pending -> Dispatched`,
/// `Pending -> Retired(Cancelled)` and `Dispatched -> Retired(Completed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    /// Admitted and waiting in the dispatch queue
    Pending,
    /// Handed to the exchange, awaiting a response
    Dispatched,
    /// Terminal
    Retired(RetireReason),
}

impl OrderState {
    /// Check whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: OrderState) -> bool {
        matches!(
            (self, next),
            (OrderState::Pending, OrderState::Dispatched)
                | (OrderState::Pending, OrderState::Retired(RetireReason::Cancelled))
                | (OrderState::Dispatched, OrderState::Retired(RetireReason::Completed))
        )
    }

    /// Check if the state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Retired(_))
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderState::Pending => write!(f, "PENDING"),
            OrderState::Dispatched => write!(f, "DISPATCHED"),
            OrderState::Retired(RetireReason::Cancelled) => write!(f, "CANCELLED"),
            OrderState::Retired(RetireReason::Completed) => write!(f, "COMPLETED"),
        }
    }
}

/// A new order as submitted by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    /// Caller-assigned order identifier
    pub order_id: OrderId,

    /// Instrument
    pub symbol_id: SymbolId,

    /// Order side
    pub side: Side,

    /// Limit price
    pub price: f64,

    /// Order quantity
    pub quantity: u64,
}

impl NewOrder {
    /// Create a new order request
    pub fn new(order_id: u64, symbol_id: u32, side: Side, price: f64, quantity: u64) -> Self {
        Self {
            order_id: OrderId(order_id),
            symbol_id: SymbolId(symbol_id),
            side,
            price,
            quantity,
        }
    }
}

/// Inbound request routed by [`crate::OrderManager::handle_request`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderRequest {
    /// Admit a new order
    New(NewOrder),
    /// Amend price and quantity of a pending order
    Modify {
        order_id: OrderId,
        price: f64,
        quantity: u64,
    },
    /// Withdraw a pending order
    Cancel { order_id: OrderId },
}

impl OrderRequest {
    /// Order targeted by this request
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderRequest::New(order) => order.order_id,
            OrderRequest::Modify { order_id, .. } | OrderRequest::Cancel { order_id } => *order_id,
        }
    }
}

/// Acknowledgement returned for an accepted request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAck {
    /// Order ID
    pub order_id: OrderId,

    /// Order state after the request was applied
    pub state: OrderState,
}

/// Order record owned by the pending store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Caller-assigned order identifier
    pub id: OrderId,

    /// Instrument
    pub symbol_id: SymbolId,

    /// Order side
    pub side: Side,

    /// Limit price
    pub price: f64,

    /// Order quantity
    pub quantity: u64,

    /// Admission timestamp
    pub admitted_at: DateTime<Utc>,

    /// Dispatch timestamp, set on `Pending -> Dispatched`
    pub dispatched_at: Option<DateTime<Utc>>,

    /// Current lifecycle state
    pub state: OrderState,
}

impl Order {
    /// Build the pending record for an admitted order
    pub fn admit(request: NewOrder, admitted_at: DateTime<Utc>) -> Self {
        Self {
            id: request.order_id,
            symbol_id: request.symbol_id,
            side: request.side,
            price: request.price,
            quantity: request.quantity,
            admitted_at,
            dispatched_at: None,
            state: OrderState::Pending,
        }
    }

    /// Move to `next`, rejecting anything the lifecycle does not allow
    pub fn transition(&mut self, next: OrderState, operation: &str) -> OmsResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(OmsError::InvalidStateTransition {
                order_id: self.id,
                current_state: self.state,
                operation: operation.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    /// Stamp dispatch time and move to `Dispatched`
    ///
    /// The stamp never precedes admission, even if the wall clock stepped back.
    pub fn mark_dispatched(&mut self, at: DateTime<Utc>) -> OmsResult<()> {
        self.transition(OrderState::Dispatched, "dispatch")?;
        self.dispatched_at = Some(at.max(self.admitted_at));
        Ok(())
    }

    /// Check if the order may still be amended or cancelled
    pub fn is_pending(&self) -> bool {
        self.state == OrderState::Pending
    }
}

/// Exchange verdict on a dispatched order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    Accept,
    Reject,
}

impl std::fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseKind::Accept => write!(f, "ACCEPT"),
            ResponseKind::Reject => write!(f, "REJECT"),
        }
    }
}

/// Inbound response from the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResponse {
    /// Order ID the response refers to
    pub order_id: OrderId,

    /// Accept or reject
    pub kind: ResponseKind,
}

impl OrderResponse {
    pub fn new(order_id: u64, kind: ResponseKind) -> Self {
        Self {
            order_id: OrderId(order_id),
            kind,
        }
    }
}

/// Immutable entry in the response log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    /// Order ID
    pub order_id: OrderId,

    /// Accept or reject
    pub kind: ResponseKind,

    /// Receipt time minus admission time
    pub latency: Duration,

    /// Receipt time minus dispatch time
    pub wire_latency: Duration,

    /// Receipt timestamp
    pub received_at: DateTime<Utc>,
}

impl ResponseRecord {
    /// Build the record for a dispatched order answered at `received_at`
    ///
    /// Both latencies saturate at zero.
    pub fn for_order(order: &Order, kind: ResponseKind, received_at: DateTime<Utc>) -> Self {
        let since = |from: DateTime<Utc>| (received_at - from).to_std().unwrap_or(Duration::ZERO);
        Self {
            order_id: order.id,
            kind,
            latency: since(order.admitted_at),
            wire_latency: order.dispatched_at.map(since).unwrap_or(Duration::ZERO),
            received_at,
        }
    }
}
