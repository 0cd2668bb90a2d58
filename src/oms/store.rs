//! Order Management System - Pending order store
//!
//! Authoritative map of in-flight orders paired with the dispatch queue.
//! An order id is queued exactly while its record is Pending; the queue only
//! ever holds ids, so a modification is visible to the dispatcher without
//! touching queue position.
//!
//! The store is not synchronized itself; [`crate::oms::OrderLedger`] owns it
//! behind a single lock together with the rate limiter.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::{OmsError, OmsResult};
use crate::oms::queue::{DispatchQueue, Ticket};
use crate::order::{Order, OrderId, OrderState, RetireReason};

#[derive(Debug)]
struct StoreEntry {
    order: Order,
    ticket: Ticket,
}

/// Pending order store
#[derive(Debug, Default)]
pub struct PendingOrderStore {
    orders: HashMap<OrderId, StoreEntry>,
    queue: DispatchQueue,
}

impl PendingOrderStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a Pending order and enqueue its id at the tail
    pub fn add(&mut self, order: Order) -> OmsResult<()> {
        if self.orders.contains_key(&order.id) {
            return Err(OmsError::DuplicateOrderId(order.id));
        }
        if order.state != OrderState::Pending {
            return Err(OmsError::InvalidStateTransition {
                order_id: order.id,
                current_state: order.state,
                operation: "add".to_string(),
            });
        }

        let ticket = self.queue.push(order.id);
        self.orders.insert(order.id, StoreEntry { order, ticket });
        Ok(())
    }

    fn pending_entry_mut(&mut self, order_id: OrderId, operation: &str) -> OmsResult<&mut StoreEntry> {
        let entry = self
            .orders
            .get_mut(&order_id)
            .ok_or(OmsError::OrderNotFound(order_id))?;

        if !entry.order.is_pending() {
            return Err(OmsError::InvalidStateTransition {
                order_id,
                current_state: entry.order.state,
                operation: operation.to_string(),
            });
        }
        Ok(entry)
    }

    /// Amend price and quantity of a Pending order in place
    pub fn modify(&mut self, order_id: OrderId, price: f64, quantity: u64) -> OmsResult<Order> {
        let entry = self.pending_entry_mut(order_id, "modify")?;
        entry.order.price = price;
        entry.order.quantity = quantity;
        Ok(entry.order.clone())
    }

    /// Withdraw a Pending order, returning its retired record
    pub fn cancel(&mut self, order_id: OrderId) -> OmsResult<Order> {
        let ticket = self.pending_entry_mut(order_id, "cancel")?.ticket;

        let mut entry = self
            .orders
            .remove(&order_id)
            .ok_or(OmsError::OrderNotFound(order_id))?;
        self.queue.tombstone(ticket);
        entry
            .order
            .transition(OrderState::Retired(RetireReason::Cancelled), "cancel")?;
        Ok(entry.order)
    }

    /// Drop cancelled entries at the head of the queue
    pub fn skip_cancelled(&mut self) -> usize {
        self.queue.skip_tombstoned()
    }

    /// Pop the next live id in admission order
    pub fn pop_next(&mut self) -> Option<OrderId> {
        self.queue.pop_live()
    }

    /// Transition Pending -> Dispatched and return a snapshot for sending
    ///
    /// Only the dispatcher calls this, with an id it just popped.
    pub fn mark_dispatched(&mut self, order_id: OrderId, at: DateTime<Utc>) -> OmsResult<Order> {
        let entry = self
            .orders
            .get_mut(&order_id)
            .ok_or(OmsError::OrderNotFound(order_id))?;

        entry.order.mark_dispatched(at)?;
        Ok(entry.order.clone())
    }

    /// Borrow a Dispatched order awaiting its response
    pub fn dispatched(&self, order_id: OrderId) -> OmsResult<&Order> {
        match self.orders.get(&order_id) {
            Some(entry) if entry.order.state == OrderState::Dispatched => Ok(&entry.order),
            _ => Err(OmsError::OrderNotFound(order_id)),
        }
    }

    /// Retire a Dispatched order after its response was recorded
    pub fn complete(&mut self, order_id: OrderId) -> OmsResult<Order> {
        self.dispatched(order_id)?;

        let mut entry = self
            .orders
            .remove(&order_id)
            .ok_or(OmsError::OrderNotFound(order_id))?;
        entry
            .order
            .transition(OrderState::Retired(RetireReason::Completed), "complete")?;
        Ok(entry.order)
    }

    /// Get an order by ID
    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.get(order_id).map(|entry| &entry.order)
    }

    /// Check if an id is in flight
    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.orders.contains_key(order_id)
    }

    /// Number of in-flight orders, Pending and Dispatched
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Number of live queue entries
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Check if the id has a live queue entry
    pub fn is_queued(&self, order_id: OrderId) -> bool {
        self.queue.contains(order_id)
    }

    /// Queued ids in dispatch order
    pub fn queued_ids(&self) -> Vec<OrderId> {
        self.queue.live_ids()
    }

    /// Count orders in `state`
    pub fn count_in(&self, state: OrderState) -> usize {
        self.orders
            .values()
            .filter(|entry| entry.order.state == state)
            .count()
    }

    /// Dispatched orders still waiting for a response
    pub fn dispatched_orders(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .values()
            .filter(|entry| entry.order.state == OrderState::Dispatched)
            .map(|entry| entry.order.clone())
            .collect();
        orders.sort_by_key(|order| order.dispatched_at);
        orders
    }
}
