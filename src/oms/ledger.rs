//! Order ledger
//!
//! The pending store (with its dispatch queue) and the rate limiter form one
//! unit behind a single mutex. Every mutation, including the dispatcher's
//! consume-and-pop and the correlator's append-and-retire, runs inside that
//! one critical section. No await happens while the lock is held.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::OmsResult;
use crate::oms::store::PendingOrderStore;
use crate::order::{Order, OrderId, OrderState, ResponseKind, ResponseRecord};
use crate::ratelimit::RateLimiter;
use crate::response_log::ResponseLog;

#[derive(Debug)]
struct LedgerState {
    store: PendingOrderStore,
    limiter: RateLimiter,
}

/// Orders released by one drain of the dispatch queue
#[derive(Debug, Default)]
pub struct DispatchBatch {
    /// Snapshots of orders now in Dispatched state, in admission order
    pub orders: Vec<Order>,
    /// Cancelled queue entries dropped without spending a token
    pub skipped_cancelled: usize,
    /// Drain stopped because the bucket ran dry with orders still queued
    pub starved: bool,
}

/// Point-in-time view of the ledger
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerSnapshot {
    pub pending: usize,
    pub dispatched: usize,
    pub queue_depth: usize,
    pub available_tokens: f64,
}

/// Shared order state
#[derive(Debug)]
pub struct OrderLedger {
    state: Mutex<LedgerState>,
    wake: Notify,
}

impl OrderLedger {
    pub fn new(limiter: RateLimiter) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                store: PendingOrderStore::new(),
                limiter,
            }),
            wake: Notify::new(),
        }
    }

    /// Admit a Pending order and wake the dispatcher
    pub fn add(&self, order: Order) -> OmsResult<()> {
        let order_id = order.id;
        self.state.lock()?.store.add(order)?;

        debug!(order_id = %order_id, "Order queued for dispatch");
        self.wake.notify_one();
        Ok(())
    }

    /// Amend a Pending order in place
    pub fn modify(&self, order_id: OrderId, price: f64, quantity: u64) -> OmsResult<Order> {
        self.state.lock()?.store.modify(order_id, price, quantity)
    }

    /// Withdraw a Pending order
    pub fn cancel(&self, order_id: OrderId) -> OmsResult<Order> {
        self.state.lock()?.store.cancel(order_id)
    }

    /// Release as many queued orders as the bucket allows
    ///
    /// Each released order is Dispatched before the lock is dropped, so a
    /// cancel that loses the race fails instead of succeeding silently.
    pub fn take_dispatch_batch(&self, at: DateTime<Utc>) -> OmsResult<DispatchBatch> {
        let mut guard = self.state.lock()?;
        let LedgerState { store, limiter } = &mut *guard;
        let mut batch = DispatchBatch::default();

        loop {
            batch.skipped_cancelled += store.skip_cancelled();
            if store.queue_len() == 0 {
                break;
            }
            if !limiter.try_consume(1) {
                batch.starved = true;
                break;
            }

            let Some(order_id) = store.pop_next() else {
                limiter.refund(1);
                break;
            };

            match store.mark_dispatched(order_id, at) {
                Ok(order) => batch.orders.push(order),
                Err(e) => {
                    limiter.refund(1);
                    warn!(order_id = %order_id, "Skipping queued order: {}", e);
                }
            }
        }

        Ok(batch)
    }

    /// Append the response record and retire the order in one step
    ///
    /// If the append fails the order stays Dispatched.
    pub fn complete(
        &self,
        order_id: OrderId,
        kind: ResponseKind,
        received_at: DateTime<Utc>,
        log: &dyn ResponseLog,
    ) -> OmsResult<ResponseRecord> {
        let mut guard = self.state.lock()?;

        let record = ResponseRecord::for_order(guard.store.dispatched(order_id)?, kind, received_at);
        log.append(&record)?;
        guard.store.complete(order_id)?;

        Ok(record)
    }

    /// Snapshot of one order
    pub fn get(&self, order_id: OrderId) -> OmsResult<Option<Order>> {
        Ok(self.state.lock()?.store.get(&order_id).cloned())
    }

    /// Check if the id has a live dispatch queue entry
    pub fn is_queued(&self, order_id: OrderId) -> OmsResult<bool> {
        Ok(self.state.lock()?.store.is_queued(order_id))
    }

    /// Queued ids in dispatch order
    pub fn queued_ids(&self) -> OmsResult<Vec<OrderId>> {
        Ok(self.state.lock()?.store.queued_ids())
    }

    /// Dispatched orders still waiting for a response
    pub fn dispatched_orders(&self) -> OmsResult<Vec<Order>> {
        Ok(self.state.lock()?.store.dispatched_orders())
    }

    pub fn snapshot(&self) -> OmsResult<LedgerSnapshot> {
        let mut guard = self.state.lock()?;
        Ok(LedgerSnapshot {
            pending: guard.store.count_in(OrderState::Pending),
            dispatched: guard.store.count_in(OrderState::Dispatched),
            queue_depth: guard.store.queue_len(),
            available_tokens: guard.limiter.available(),
        })
    }

    /// How long the dispatcher should wait before its next drain
    ///
    /// `None` means nothing is queued.
    pub fn next_wake(&self) -> OmsResult<Option<Duration>> {
        let mut guard = self.state.lock()?;
        if guard.store.queue_len() == 0 {
            return Ok(None);
        }
        Ok(Some(guard.limiter.time_until_ready()))
    }

    /// Wait until an order is added or [`OrderLedger::wake`] is called
    pub async fn notified(&self) {
        self.wake.notified().await
    }

    pub fn wake(&self) {
        self.wake.notify_one();
    }
}
