//! Response correlation
//!
//! Matches exchange responses to dispatched orders, appends a record to the
//! response log and retires the order. A response for an id that is not
//! Dispatched (unknown, still Pending, or already retired) is an anomaly:
//! it is logged, counted and reported as `OrderNotFound`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::error::{OmsError, OmsResult};
use crate::oms::OrderLedger;
use crate::order::{OrderId, ResponseKind, ResponseRecord};
use crate::response_log::ResponseLog;

/// Response correlator
pub struct ResponseCorrelator {
    ledger: Arc<OrderLedger>,
    log: Arc<dyn ResponseLog>,
    anomalies: AtomicU64,
}

impl ResponseCorrelator {
    pub fn new(ledger: Arc<OrderLedger>, log: Arc<dyn ResponseLog>) -> Self {
        Self {
            ledger,
            log,
            anomalies: AtomicU64::new(0),
        }
    }

    /// Correlate a response received at `received_at`
    pub fn correlate(
        &self,
        order_id: OrderId,
        kind: ResponseKind,
        received_at: DateTime<Utc>,
    ) -> OmsResult<ResponseRecord> {
        match self
            .ledger
            .complete(order_id, kind, received_at, self.log.as_ref())
        {
            Ok(record) => {
                info!(
                    order_id = %order_id,
                    kind = %kind,
                    latency_ms = record.latency.as_millis() as u64,
                    "Response correlated"
                );
                Ok(record)
            }
            Err(OmsError::OrderNotFound(id)) => {
                self.anomalies.fetch_add(1, Ordering::Relaxed);
                warn!(order_id = %id, kind = %kind, "Response for an order that is not in flight");
                Err(OmsError::OrderNotFound(id))
            }
            Err(e) => {
                error!(order_id = %order_id, "Failed to record response: {}", e);
                Err(e)
            }
        }
    }

    /// Responses that matched no in-flight order
    pub fn anomalies(&self) -> u64 {
        self.anomalies.load(Ordering::Relaxed)
    }

    pub fn log(&self) -> &Arc<dyn ResponseLog> {
        &self.log
    }
}
