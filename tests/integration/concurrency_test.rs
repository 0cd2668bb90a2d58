//! Concurrency tests: admission, cancellation, dispatch and correlation
//! racing on a multi-threaded runtime

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ag_oms::{
    adapters::{shared, Exchange},
    config::OmsConfig,
    error::{OmsError, OmsResult},
    order::{NewOrder, Order, OrderId, OrderResponse, ResponseKind, Side},
    Credentials, ManualClock, OrderManager, ResponseLog, SessionId, StaticAuthenticator,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};

const ORDERS: u64 = 400;

struct RecordingExchange {
    sent: Arc<Mutex<Vec<OrderId>>>,
}

#[async_trait]
impl Exchange for RecordingExchange {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send_order(&mut self, order: &Order) -> OmsResult<()> {
        self.sent.lock().unwrap().push(order.id);
        Ok(())
    }

    async fn logon(&mut self, _session_id: &SessionId) -> OmsResult<()> {
        Ok(())
    }

    async fn logout(&mut self, _session_id: &SessionId) -> OmsResult<()> {
        Ok(())
    }
}

async fn create_manager(orders_per_second: u32) -> (Arc<OrderManager>, Arc<Mutex<Vec<OrderId>>>) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let mut config = OmsConfig::default();
    config.rate_limit.orders_per_second = orders_per_second;
    config.dispatcher.idle_wait_ms = 5;

    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    ));
    let auth = StaticAuthenticator::new().with_user("trader1", "password123");
    let manager = OrderManager::builder(
        config,
        shared(RecordingExchange { sent: sent.clone() }),
        Arc::new(auth),
    )
    .clock(clock)
    .build()
    .unwrap();

    manager
        .logon(&Credentials::new("trader1", "password123"))
        .await
        .unwrap();
    (Arc::new(manager), sent)
}

async fn wait_until_drained(manager: &OrderManager) {
    for _ in 0..1000 {
        let stats = manager.stats().unwrap();
        if stats.pending == 0 && stats.queue_depth == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("dispatch queue never drained");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancelled_orders_never_sent() {
    let (manager, sent) = create_manager(2_000).await;
    let dispatcher = manager.start_dispatcher();

    let admitter = {
        let manager = manager.clone();
        tokio::spawn(async move {
            for id in 0..ORDERS {
                manager
                    .admit_order(NewOrder::new(id, 1, Side::Buy, 100.0, 1))
                    .unwrap();
                if id % 16 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
    };

    let canceller = {
        let manager = manager.clone();
        tokio::spawn(async move {
            let mut cancelled = HashSet::new();
            for round in 0..4 {
                for id in (round..ORDERS).step_by(3) {
                    match manager.cancel_order(OrderId(id)) {
                        Ok(_) => {
                            cancelled.insert(OrderId(id));
                        }
                        Err(OmsError::OrderNotFound(_))
                        | Err(OmsError::InvalidStateTransition { .. }) => {}
                        Err(e) => panic!("unexpected cancel error: {}", e),
                    }
                }
                tokio::task::yield_now().await;
            }
            cancelled
        })
    };

    admitter.await.unwrap();
    let cancelled = canceller.await.unwrap();
    wait_until_drained(&manager).await;
    dispatcher.shutdown().await.unwrap();

    let sent = sent.lock().unwrap().clone();
    let sent_set: HashSet<OrderId> = sent.iter().copied().collect();

    assert_eq!(sent.len(), sent_set.len(), "an order was sent twice");
    assert!(sent_set.is_disjoint(&cancelled), "a cancelled order was sent");
    assert_eq!(sent_set.len() + cancelled.len(), ORDERS as usize);

    // single admitter, so dispatch order is ascending id order
    assert!(sent.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_responses_race_dispatch() {
    let (manager, sent) = create_manager(5_000).await;
    let dispatcher = manager.start_dispatcher();

    for id in 0..ORDERS {
        manager
            .admit_order(NewOrder::new(id, 2, Side::Sell, 50.0, 3))
            .unwrap();
    }

    // responders race the dispatcher; early responses are anomalies and are retried
    let mut responders = Vec::new();
    for worker in 0..4u64 {
        let manager = manager.clone();
        responders.push(tokio::spawn(async move {
            let mut pending: Vec<u64> = (worker..ORDERS).step_by(4).collect();
            while !pending.is_empty() {
                pending.retain(|&id| {
                    manager
                        .handle_response(OrderResponse::new(id, ResponseKind::Accept))
                        .is_err()
                });
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }));
    }

    for responder in responders {
        responder.await.unwrap();
    }
    dispatcher.shutdown().await.unwrap();

    let log = manager.response_log();
    let records = log.records().unwrap();
    assert_eq!(records.len(), ORDERS as usize);

    let logged: HashSet<OrderId> = records.iter().map(|r| r.order_id).collect();
    assert_eq!(logged.len(), ORDERS as usize);
    assert_eq!(sent.lock().unwrap().len(), ORDERS as usize);

    let stats = manager.stats().unwrap();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.dispatched, 0);
    assert_eq!(stats.responses_logged, ORDERS as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_manual_drain_alongside_worker_keeps_fifo() {
    let (manager, sent) = create_manager(10_000).await;
    let dispatcher = manager.start_dispatcher();

    let manual = {
        let manager = manager.clone();
        tokio::spawn(async move {
            loop {
                manager.dispatch_now().await.unwrap();
                if manager.stats().unwrap().orders_sent >= ORDERS {
                    break;
                }
                tokio::task::yield_now().await;
            }
        })
    };

    for id in 0..ORDERS {
        manager
            .admit_order(NewOrder::new(id, 3, Side::Buy, 10.0, 1))
            .unwrap();
        if id % 8 == 0 {
            tokio::task::yield_now().await;
        }
    }

    tokio::time::timeout(Duration::from_secs(10), manual)
        .await
        .unwrap()
        .unwrap();
    dispatcher.shutdown().await.unwrap();

    let sent = sent.lock().unwrap().clone();
    assert_eq!(sent.len(), ORDERS as usize);
    assert!(sent.windows(2).all(|pair| pair[0] < pair[1]));
}
