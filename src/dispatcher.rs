//! Background dispatcher
//!
//! Drains the dispatch queue through the rate limiter and hands each
//! released order to the exchange. The worker sleeps until an order is
//! added, a token is due, or the idle wait elapses; it never spins.
//!
//! A failed send is logged and counted; the order stays Dispatched and is
//! listed by [`crate::OrderManager::dispatched_orders`] for reconciliation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::adapters::SharedExchange;
use crate::clock::Clock;
use crate::error::{OmsError, OmsResult};
use crate::oms::OrderLedger;

/// Dispatcher configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Upper bound on a single idle wait, in milliseconds
    #[serde(default = "default_idle_wait_ms")]
    pub idle_wait_ms: u64,
}

impl DispatcherConfig {
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

fn default_idle_wait_ms() -> u64 {
    250
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            idle_wait_ms: default_idle_wait_ms(),
        }
    }
}

/// Outcome of one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Orders moved to Dispatched and offered to the exchange
    pub dispatched: usize,
    /// Cancelled entries dropped from the queue
    pub skipped_cancelled: usize,
    /// Sends the exchange reported as failed
    pub send_failures: usize,
    /// Orders remain queued waiting for tokens
    pub starved: bool,
}

/// Lifetime totals across all drains
#[derive(Debug, Default)]
pub struct DispatchCounters {
    dispatched: AtomicU64,
    send_failures: AtomicU64,
}

impl DispatchCounters {
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }
}

/// Rate-limited dispatcher
#[derive(Clone)]
pub struct Dispatcher {
    ledger: Arc<OrderLedger>,
    exchange: SharedExchange,
    clock: Arc<dyn Clock>,
    config: DispatcherConfig,
    counters: Arc<DispatchCounters>,
}

impl Dispatcher {
    pub fn new(
        ledger: Arc<OrderLedger>,
        exchange: SharedExchange,
        clock: Arc<dyn Clock>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            ledger,
            exchange,
            clock,
            config,
            counters: Arc::new(DispatchCounters::default()),
        }
    }

    pub fn counters(&self) -> &Arc<DispatchCounters> {
        &self.counters
    }

    /// Release what the bucket allows and send it, in admission order
    ///
    /// The exchange lock is held from taking the batch until the last send,
    /// so concurrent drains reach the exchange in queue order.
    pub async fn dispatch_batch(&self) -> OmsResult<DispatchReport> {
        let mut exchange = self.exchange.lock().await;
        let batch = self.ledger.take_dispatch_batch(self.clock.now())?;
        let mut report = DispatchReport {
            dispatched: batch.orders.len(),
            skipped_cancelled: batch.skipped_cancelled,
            send_failures: 0,
            starved: batch.starved,
        };

        if batch.skipped_cancelled > 0 {
            debug!("Dropped {} cancelled queue entries", batch.skipped_cancelled);
        }
        if batch.orders.is_empty() {
            return Ok(report);
        }

        for order in &batch.orders {
            match exchange.send_order(order).await {
                Ok(()) => {
                    debug!(order_id = %order.id, exchange = exchange.name(), "Order sent");
                }
                Err(e) => {
                    report.send_failures += 1;
                    error!(
                        order_id = %order.id,
                        exchange = exchange.name(),
                        "Send failed, order left dispatched: {}",
                        e
                    );
                }
            }
        }

        self.counters
            .dispatched
            .fetch_add(report.dispatched as u64, Ordering::Relaxed);
        self.counters
            .send_failures
            .fetch_add(report.send_failures as u64, Ordering::Relaxed);

        if report.starved {
            debug!("Rate limit reached, {} orders sent this drain", report.dispatched);
        }
        Ok(report)
    }

    /// Start the worker on the tokio runtime
    pub fn spawn(self) -> DispatcherHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        DispatcherHandle { stop_tx, task }
    }

    async fn run(self, mut stop: watch::Receiver<bool>) {
        info!(
            "Starting dispatcher (idle wait: {} ms)",
            self.config.idle_wait_ms
        );

        loop {
            if *stop.borrow() {
                break;
            }

            if let Err(e) = self.dispatch_batch().await {
                error!("Dispatch drain failed: {}", e);
            }

            let idle = self.config.idle_wait();
            let wait = match self.ledger.next_wake() {
                Ok(Some(until_token)) => until_token.min(idle),
                Ok(None) => idle,
                Err(e) => {
                    error!("Failed to read dispatch queue: {}", e);
                    idle
                }
            };

            tokio::select! {
                _ = self.ledger.notified() => {}
                _ = tokio::time::sleep(wait) => {}
                changed = stop.changed() => {
                    // a dropped handle also stops the worker
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(
            "Dispatcher stopped: {} orders dispatched, {} send failures",
            self.counters.dispatched(),
            self.counters.send_failures()
        );
    }
}

/// Handle to a running dispatcher
pub struct DispatcherHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Signal the worker to stop and wait for its in-flight drain to finish
    pub async fn shutdown(self) -> OmsResult<()> {
        let _ = self.stop_tx.send(true);
        self.task
            .await
            .map_err(|e| OmsError::InternalError(format!("Dispatcher task failed: {}", e)))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
