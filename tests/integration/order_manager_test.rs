//! Integration tests for OrderManager

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ag_oms::{
    adapters::{shared, Exchange},
    config::OmsConfig,
    error::{OmsError, OmsResult},
    order::{NewOrder, Order, OrderId, OrderResponse, OrderState, ResponseKind, Side},
    Clock, Credentials, ManualClock, OrderManager, ResponseLog, SessionId, StaticAuthenticator,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio_test::{assert_err, assert_ok};

/// Mock exchange recording every order it is handed
struct MockExchange {
    sent: Arc<Mutex<Vec<OrderId>>>,
    fail_sends: bool,
}

#[async_trait]
impl Exchange for MockExchange {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send_order(&mut self, order: &Order) -> OmsResult<()> {
        self.sent.lock().unwrap().push(order.id);
        if self.fail_sends {
            return Err(OmsError::ExchangeError {
                operation: "send".to_string(),
                message: "link down".to_string(),
            });
        }
        Ok(())
    }

    async fn logon(&mut self, _session_id: &SessionId) -> OmsResult<()> {
        Ok(())
    }

    async fn logout(&mut self, _session_id: &SessionId) -> OmsResult<()> {
        Ok(())
    }
}

struct Harness {
    manager: OrderManager,
    clock: Arc<ManualClock>,
    sent: Arc<Mutex<Vec<OrderId>>>,
}

impl Harness {
    fn sent(&self) -> Vec<OrderId> {
        self.sent.lock().unwrap().clone()
    }
}

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn config_with_rate(orders_per_second: u32) -> OmsConfig {
    let mut config = OmsConfig::default();
    config.rate_limit.orders_per_second = orders_per_second;
    config
}

fn build(config: OmsConfig, fail_sends: bool) -> Harness {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let clock = Arc::new(ManualClock::new(noon()));
    let exchange = shared(MockExchange {
        sent: sent.clone(),
        fail_sends,
    });
    let auth = StaticAuthenticator::new().with_user("trader1", "password123");

    let manager = OrderManager::builder(config, exchange, Arc::new(auth))
        .clock(clock.clone())
        .build()
        .unwrap();

    Harness {
        manager,
        clock,
        sent,
    }
}

async fn logged_on(config: OmsConfig) -> Harness {
    let harness = build(config, false);
    assert_ok!(
        harness
            .manager
            .logon(&Credentials::new("trader1", "password123"))
            .await
    );
    harness
}

#[tokio::test]
async fn test_admit_modify_cancel() {
    let h = logged_on(OmsConfig::default()).await;

    h.manager
        .admit_order(NewOrder::new(1, 7, Side::Buy, 100.5, 10))
        .unwrap();
    let order = h.manager.order(OrderId(1)).unwrap().unwrap();
    assert_eq!(order.state, OrderState::Pending);
    assert_eq!(order.admitted_at, noon());

    h.manager.modify_order(OrderId(1), 101.5, 15).unwrap();
    let order = h.manager.order(OrderId(1)).unwrap().unwrap();
    assert_eq!(order.price, 101.5);
    assert_eq!(order.quantity, 15);
    assert_eq!(order.state, OrderState::Pending);

    h.manager.cancel_order(OrderId(1)).unwrap();
    assert!(h.manager.order(OrderId(1)).unwrap().is_none());
    assert!(!h.manager.queued_ids().unwrap().contains(&OrderId(1)));

    // cancelled order is skipped without being sent
    let report = h.manager.dispatch_now().await.unwrap();
    assert_eq!(report.dispatched, 0);
    assert_eq!(report.skipped_cancelled, 1);
    assert!(h.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_holds_back_third_order() {
    let h = logged_on(config_with_rate(2)).await;

    for id in 1..=3 {
        h.manager
            .admit_order(NewOrder::new(id, 7, Side::Buy, 100.0, 1))
            .unwrap();
    }

    let report = h.manager.dispatch_now().await.unwrap();
    assert_eq!(report.dispatched, 2);
    assert!(report.starved);
    assert_eq!(h.sent(), vec![OrderId(1), OrderId(2)]);
    assert_eq!(h.manager.queued_ids().unwrap(), vec![OrderId(3)]);

    tokio::time::advance(Duration::from_millis(499)).await;
    assert_eq!(h.manager.dispatch_now().await.unwrap().dispatched, 0);

    tokio::time::advance(Duration::from_millis(1)).await;
    assert_eq!(h.manager.dispatch_now().await.unwrap().dispatched, 1);
    assert_eq!(h.sent(), vec![OrderId(1), OrderId(2), OrderId(3)]);
}

#[tokio::test(start_paused = true)]
async fn test_background_dispatch_and_correlation() {
    let h = logged_on(OmsConfig::default()).await;
    let dispatcher = h.manager.start_dispatcher();

    h.manager
        .admit_order(NewOrder::new(1, 7, Side::Sell, 99.5, 4))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let order = h.manager.order(OrderId(1)).unwrap().unwrap();
    assert_eq!(order.state, OrderState::Dispatched);
    assert_eq!(h.sent(), vec![OrderId(1)]);

    h.clock.advance(chrono::Duration::milliseconds(25));
    let record = h
        .manager
        .correlate(OrderId(1), ResponseKind::Accept, h.clock.now())
        .unwrap();
    assert_eq!(record.order_id, OrderId(1));
    assert_eq!(record.latency, Duration::from_millis(25));

    assert_eq!(h.manager.response_log().len().unwrap(), 1);
    assert!(h.manager.order(OrderId(1)).unwrap().is_none());

    let again = h
        .manager
        .correlate(OrderId(1), ResponseKind::Accept, h.clock.now());
    assert!(matches!(again, Err(OmsError::OrderNotFound(OrderId(1)))));
    assert_eq!(h.manager.stats().unwrap().correlation_anomalies, 1);

    dispatcher.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_gate_closed_outside_window() {
    let h = logged_on(OmsConfig::default()).await;
    h.clock
        .set(Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 1).unwrap());

    let result = h
        .manager
        .admit_order(NewOrder::new(1, 7, Side::Buy, 100.5, 10));
    let err = result.unwrap_err();
    assert!(matches!(err, OmsError::OutsideTradingWindow { .. }));
    assert_eq!(err.order_id(), Some(OrderId(1)));
    assert!(h.manager.order(OrderId(1)).unwrap().is_none());
    assert_eq!(h.manager.stats().unwrap().queue_depth, 0);
}

#[tokio::test]
async fn test_modify_dispatched_order_rejected() {
    let h = logged_on(OmsConfig::default()).await;

    h.manager
        .admit_order(NewOrder::new(1, 7, Side::Buy, 100.0, 10))
        .unwrap();
    h.manager.dispatch_now().await.unwrap();

    let result = h.manager.modify_order(OrderId(1), 105.0, 20);
    assert!(matches!(
        result,
        Err(OmsError::InvalidStateTransition {
            current_state: OrderState::Dispatched,
            ..
        })
    ));
    assert_err!(h.manager.cancel_order(OrderId(1)));

    let order = h.manager.order(OrderId(1)).unwrap().unwrap();
    assert_eq!(order.price, 100.0);
    assert_eq!(order.quantity, 10);
}

#[tokio::test]
async fn test_duplicate_id_rejected_until_retired() {
    let h = logged_on(OmsConfig::default()).await;

    h.manager
        .admit_order(NewOrder::new(1, 7, Side::Buy, 100.0, 10))
        .unwrap();
    let duplicate = h
        .manager
        .admit_order(NewOrder::new(1, 8, Side::Sell, 50.0, 1));
    assert!(matches!(duplicate, Err(OmsError::DuplicateOrderId(OrderId(1)))));

    h.manager.dispatch_now().await.unwrap();
    h.manager
        .handle_response(OrderResponse::new(1, ResponseKind::Reject))
        .unwrap();

    // id is free again once the first order retired
    assert_ok!(h
        .manager
        .admit_order(NewOrder::new(1, 8, Side::Sell, 50.0, 1)));
}

#[tokio::test]
async fn test_logout_closes_gate() {
    let h = logged_on(OmsConfig::default()).await;
    h.manager.logout().await.unwrap();

    let result = h
        .manager
        .admit_order(NewOrder::new(1, 7, Side::Buy, 100.0, 10));
    assert!(matches!(
        result,
        Err(OmsError::NotLoggedOn {
            order_id: Some(OrderId(1))
        })
    ));
    assert!(matches!(
        h.manager.logout().await,
        Err(OmsError::NotLoggedOn { order_id: None })
    ));
}

#[tokio::test]
async fn test_failed_send_awaits_reconciliation() {
    let h = build(OmsConfig::default(), true);
    h.manager
        .logon(&Credentials::new("trader1", "password123"))
        .await
        .unwrap();

    h.manager
        .admit_order(NewOrder::new(1, 7, Side::Buy, 100.0, 10))
        .unwrap();
    let report = h.manager.dispatch_now().await.unwrap();
    assert_eq!(report.send_failures, 1);

    let stats = h.manager.stats().unwrap();
    assert_eq!(stats.send_failures, 1);
    assert_eq!(stats.dispatched, 1);

    let in_flight = h.manager.dispatched_orders().unwrap();
    assert_eq!(in_flight.len(), 1);
    assert_eq!(in_flight[0].id, OrderId(1));
    assert_eq!(in_flight[0].dispatched_at, Some(noon()));
}

#[tokio::test]
async fn test_jsonl_response_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("responses.jsonl");

    let mut config = OmsConfig::default();
    config.response_log.path = Some(path.clone());
    let h = logged_on(config).await;

    for id in 1..=2 {
        h.manager
            .admit_order(NewOrder::new(id, 7, Side::Buy, 100.0, 10))
            .unwrap();
    }
    h.manager.dispatch_now().await.unwrap();
    h.manager
        .handle_response(OrderResponse::new(2, ResponseKind::Reject))
        .unwrap();
    h.manager
        .handle_response(OrderResponse::new(1, ResponseKind::Accept))
        .unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 2);

    let records = h.manager.response_log().records().unwrap();
    assert_eq!(records[0].order_id, OrderId(2));
    assert_eq!(records[0].kind, ResponseKind::Reject);
    assert_eq!(records[1].order_id, OrderId(1));
}
