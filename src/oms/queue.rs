//! FIFO dispatch queue
//!
//! Holds order ids only, never order fields. Each push returns a ticket;
//! cancelling marks the ticket as a tombstone so the entry is dropped when it
//! reaches the head, instead of being searched for and removed in place.
//! Tickets rather than ids are tombstoned so that an id reused after
//! cancellation cannot be shadowed by its own stale entry.

use std::collections::{HashSet, VecDeque};

use crate::order::OrderId;

/// Position handle for a queued order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

#[derive(Debug, Default)]
pub struct DispatchQueue {
    entries: VecDeque<(Ticket, OrderId)>,
    tombstones: HashSet<Ticket>,
    next_ticket: u64,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an id at the tail
    pub fn push(&mut self, order_id: OrderId) -> Ticket {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        self.entries.push_back((ticket, order_id));
        ticket
    }

    /// Mark a queued entry as cancelled
    ///
    /// Returns false if the ticket was already tombstoned.
    pub fn tombstone(&mut self, ticket: Ticket) -> bool {
        self.tombstones.insert(ticket)
    }

    /// Drop tombstoned entries sitting at the head, returning how many
    pub fn skip_tombstoned(&mut self) -> usize {
        let mut skipped = 0;
        while let Some((ticket, _)) = self.entries.front() {
            if !self.tombstones.remove(ticket) {
                break;
            }
            self.entries.pop_front();
            skipped += 1;
        }
        skipped
    }

    /// Remove and return the first live id
    pub fn pop_live(&mut self) -> Option<OrderId> {
        self.skip_tombstoned();
        self.entries.pop_front().map(|(_, order_id)| order_id)
    }

    /// Number of live (non-tombstoned) entries
    pub fn len(&self) -> usize {
        self.entries.len().saturating_sub(self.tombstones.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live ids in dispatch order
    pub fn live_ids(&self) -> Vec<OrderId> {
        self.entries
            .iter()
            .filter(|(ticket, _)| !self.tombstones.contains(ticket))
            .map(|(_, order_id)| *order_id)
            .collect()
    }

    /// Check if `order_id` has a live entry
    ///
    /// Linear; for diagnostics and tests, not the dispatch path.
    pub fn contains(&self, order_id: OrderId) -> bool {
        self.entries
            .iter()
            .any(|(ticket, id)| *id == order_id && !self.tombstones.contains(ticket))
    }
}
