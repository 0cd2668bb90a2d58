//! Order manager orchestrating the order lifecycle
//!
//! The OrderManager is the main entry point. It gates requests on the
//! trading session, validates them, and coordinates the shared order
//! ledger, the background dispatcher and the response correlator.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::adapters::SharedExchange;
use crate::auth::{Authenticator, Credentials};
use crate::clock::{Clock, SystemClock};
use crate::config::OmsConfig;
use crate::correlator::ResponseCorrelator;
use crate::dispatcher::{DispatchReport, Dispatcher, DispatcherHandle};
use crate::error::{OmsError, OmsResult};
use crate::oms::{OrderLedger, OrderValidator};
use crate::order::{
    NewOrder, Order, OrderId, OrderRequest, OrderResponse, OrderState, RequestAck, ResponseKind,
    ResponseRecord, RetireReason,
};
use crate::response_log::{JsonlResponseLog, MemoryResponseLog, ResponseLog};
use crate::session::{SessionId, SessionState, TradingSession};

/// Order manager statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OmsStats {
    /// Orders admitted and not yet dispatched
    pub pending: usize,
    /// Orders sent and awaiting a response
    pub dispatched: usize,
    /// Live dispatch queue entries
    pub queue_depth: usize,
    /// Tokens currently in the bucket
    pub available_tokens: f64,
    /// Records in the response log
    pub responses_logged: usize,
    /// Responses that matched no in-flight order
    pub correlation_anomalies: u64,
    /// Orders handed to the exchange since start
    pub orders_sent: u64,
    /// Sends the exchange reported as failed
    pub send_failures: u64,
}

/// Builder for [`OrderManager`]
pub struct OrderManagerBuilder {
    config: OmsConfig,
    exchange: SharedExchange,
    authenticator: Arc<dyn Authenticator>,
    clock: Option<Arc<dyn Clock>>,
    response_log: Option<Arc<dyn ResponseLog>>,
}

impl OrderManagerBuilder {
    /// Use a custom wall clock instead of the system clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use this response log instead of the one named in the config
    pub fn response_log(mut self, log: Arc<dyn ResponseLog>) -> Self {
        self.response_log = Some(log);
        self
    }

    pub fn build(self) -> OmsResult<OrderManager> {
        self.config.validate()?;
        let window = self.config.window.trading_window()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let response_log: Arc<dyn ResponseLog> = match (self.response_log, &self.config.response_log.path) {
            (Some(log), _) => log,
            (None, Some(path)) => Arc::new(JsonlResponseLog::open(path)?),
            (None, None) => Arc::new(MemoryResponseLog::new()),
        };

        let ledger = Arc::new(OrderLedger::new(self.config.rate_limit.build()));
        let session = TradingSession::new(
            window,
            clock.clone(),
            self.authenticator,
            self.exchange.clone(),
        );
        let dispatcher = Dispatcher::new(
            ledger.clone(),
            self.exchange,
            clock.clone(),
            self.config.dispatcher,
        );
        let correlator = ResponseCorrelator::new(ledger.clone(), response_log);
        let validator = OrderValidator::from_config(self.config.validation.clone());

        info!(
            "Order manager ready: window {}-{} UTC, {} orders/sec",
            window.start, window.end, self.config.rate_limit.orders_per_second
        );

        Ok(OrderManager {
            config: self.config,
            clock,
            session,
            ledger,
            validator,
            dispatcher,
            correlator,
        })
    }
}

/// Order manager
pub struct OrderManager {
    config: OmsConfig,
    clock: Arc<dyn Clock>,
    session: TradingSession,
    ledger: Arc<OrderLedger>,
    validator: OrderValidator,
    dispatcher: Dispatcher,
    correlator: ResponseCorrelator,
}

impl OrderManager {
    /// Start building an order manager
    pub fn builder(
        config: OmsConfig,
        exchange: SharedExchange,
        authenticator: Arc<dyn Authenticator>,
    ) -> OrderManagerBuilder {
        OrderManagerBuilder {
            config,
            exchange,
            authenticator,
            clock: None,
            response_log: None,
        }
    }

    /// Create an order manager on the system clock
    pub fn new(
        config: OmsConfig,
        exchange: SharedExchange,
        authenticator: Arc<dyn Authenticator>,
    ) -> OmsResult<Self> {
        Self::builder(config, exchange, authenticator).build()
    }

    /// Log on to the exchange session
    pub async fn logon(&self, credentials: &Credentials) -> OmsResult<SessionId> {
        self.session.logon(credentials).await
    }

    /// Log out of the exchange session
    pub async fn logout(&self) -> OmsResult<()> {
        self.session.logout().await
    }

    /// Admit a new order as Pending and queue it for dispatch
    pub fn admit_order(&self, request: NewOrder) -> OmsResult<RequestAck> {
        let order_id = request.order_id;
        let now = self.clock.now();

        self.session
            .check_admission(now)
            .map_err(|e| rejected(order_id, "admit", e))?;
        self.validator
            .validate(&request)
            .map_err(|e| rejected(order_id, "admit", e))?;

        let order = Order::admit(request, now);
        debug!(
            order_id = %order_id,
            symbol = %order.symbol_id,
            side = %order.side,
            price = order.price,
            quantity = order.quantity,
            "Admitting order"
        );
        self.ledger
            .add(order)
            .map_err(|e| rejected(order_id, "admit", e))?;

        info!(order_id = %order_id, "Order admitted");
        Ok(RequestAck {
            order_id,
            state: OrderState::Pending,
        })
    }

    /// Amend price and quantity of a Pending order
    pub fn modify_order(&self, order_id: OrderId, price: f64, quantity: u64) -> OmsResult<RequestAck> {
        self.session
            .check_admission(self.clock.now())
            .map_err(|e| rejected(order_id, "modify", e))?;
        self.validator
            .validate_terms(order_id, price, quantity)
            .map_err(|e| rejected(order_id, "modify", e))?;

        let order = self
            .ledger
            .modify(order_id, price, quantity)
            .map_err(|e| rejected(order_id, "modify", e))?;

        info!(order_id = %order_id, price, quantity, "Order modified");
        Ok(RequestAck {
            order_id,
            state: order.state,
        })
    }

    /// Cancel a Pending order; it will never be sent
    pub fn cancel_order(&self, order_id: OrderId) -> OmsResult<RequestAck> {
        self.session
            .check_admission(self.clock.now())
            .map_err(|e| rejected(order_id, "cancel", e))?;

        self.ledger
            .cancel(order_id)
            .map_err(|e| rejected(order_id, "cancel", e))?;

        info!(order_id = %order_id, "Order cancelled");
        Ok(RequestAck {
            order_id,
            state: OrderState::Retired(RetireReason::Cancelled),
        })
    }

    /// Route an inbound request
    pub fn handle_request(&self, request: OrderRequest) -> OmsResult<RequestAck> {
        match request {
            OrderRequest::New(order) => self.admit_order(order),
            OrderRequest::Modify {
                order_id,
                price,
                quantity,
            } => self.modify_order(order_id, price, quantity),
            OrderRequest::Cancel { order_id } => self.cancel_order(order_id),
        }
    }

    /// Correlate a response received at `now` with its dispatched order
    pub fn correlate(
        &self,
        order_id: OrderId,
        kind: ResponseKind,
        now: DateTime<Utc>,
    ) -> OmsResult<ResponseRecord> {
        self.session
            .check_admission(now)
            .map_err(|e| rejected(order_id, "correlate", e))?;
        self.correlator.correlate(order_id, kind, now)
    }

    /// Correlate a response stamped with the current time
    pub fn handle_response(&self, response: OrderResponse) -> OmsResult<ResponseRecord> {
        self.correlate(response.order_id, response.kind, self.clock.now())
    }

    /// Drain the dispatch queue once without the background task
    pub async fn dispatch_now(&self) -> OmsResult<DispatchReport> {
        self.dispatcher.dispatch_batch().await
    }

    /// Start the background dispatcher
    pub fn start_dispatcher(&self) -> DispatcherHandle {
        self.dispatcher.clone().spawn()
    }

    /// Snapshot of one order, if it is still held
    pub fn order(&self, order_id: OrderId) -> OmsResult<Option<Order>> {
        self.ledger.get(order_id)
    }

    /// Dispatched orders still waiting for a response, oldest dispatch first
    pub fn dispatched_orders(&self) -> OmsResult<Vec<Order>> {
        self.ledger.dispatched_orders()
    }

    /// Queued order ids in dispatch order
    pub fn queued_ids(&self) -> OmsResult<Vec<OrderId>> {
        self.ledger.queued_ids()
    }

    pub fn stats(&self) -> OmsResult<OmsStats> {
        let snapshot = self.ledger.snapshot()?;
        let counters = self.dispatcher.counters();
        Ok(OmsStats {
            pending: snapshot.pending,
            dispatched: snapshot.dispatched,
            queue_depth: snapshot.queue_depth,
            available_tokens: snapshot.available_tokens,
            responses_logged: self.correlator.log().len()?,
            correlation_anomalies: self.correlator.anomalies(),
            orders_sent: counters.dispatched(),
            send_failures: counters.send_failures(),
        })
    }

    /// Check whether the trading window is open right now
    pub fn is_open(&self) -> bool {
        self.session.is_open()
    }

    pub fn session_state(&self) -> OmsResult<SessionState> {
        self.session.state()
    }

    pub fn response_log(&self) -> &Arc<dyn ResponseLog> {
        self.correlator.log()
    }

    pub fn config(&self) -> &OmsConfig {
        &self.config
    }
}

fn rejected(order_id: OrderId, operation: &str, error: OmsError) -> OmsError {
    let error = error.for_order(order_id);
    warn!(order_id = %order_id, operation, "Request rejected: {}", error);
    error
}
