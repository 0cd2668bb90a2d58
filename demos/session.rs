//! Example: A trading session against the paper exchange
//!
//! This example demonstrates how to:
//! 1. Configure the order manager
//! 2. Log on (one bad attempt, one good)
//! 3. Admit, modify and cancel orders
//! 4. Let the background dispatcher drain the queue
//! 5. Feed exchange responses back and inspect the response log
//! 6. Log out and stop the dispatcher

use std::sync::Arc;
use std::time::Duration;

use ag_oms::{
    shared, Credentials, ManualClock, NewOrder, OmsConfig, OrderId, OrderManager, OrderResponse,
    PaperExchange, ResponseKind, ResponseLog, Side, StaticAuthenticator,
};
use chrono::Utc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    ag_oms::init_tracing();

    println!("=== Order Manager Session Example ===\n");

    // 1. Configuration from OMS_* environment variables, defaults otherwise
    println!("1. Creating order manager...");
    let config = OmsConfig::from_env()?;
    println!(
        "   ✓ Window {} - {} UTC, {} orders/sec\n",
        config.window.start, config.window.end, config.rate_limit.orders_per_second
    );

    // Pin the clock mid-window so the demo runs at any hour and with any
    // OMS_WINDOW_* override
    let midpoint = config.window.trading_window()?.midpoint();
    let clock = Arc::new(ManualClock::new(
        Utc::now().date_naive().and_time(midpoint).and_utc(),
    ));

    let auth = StaticAuthenticator::new().with_user("trader1", "password123");
    let manager = OrderManager::builder(config, shared(PaperExchange::new()), Arc::new(auth))
        .clock(clock.clone())
        .build()?;
    let dispatcher = manager.start_dispatcher();

    // 2. Log on
    println!("2. Logging on...");
    match manager.logon(&Credentials::new("trader1", "wrongpassword")).await {
        Ok(_) => println!("   ✗ Unexpected logon success"),
        Err(e) => println!("   ✓ Bad credentials rejected: {}", e),
    }
    let session_id = manager.logon(&Credentials::new("trader1", "password123")).await?;
    println!("   ✓ Logged on, session {}\n", session_id);

    // 3. Admit, modify, cancel
    println!("3. Submitting orders...");
    for (id, side, price, quantity) in [
        (1, Side::Buy, 100.5, 10),
        (2, Side::Sell, 101.0, 5),
        (3, Side::Buy, 99.75, 20),
        (4, Side::Sell, 102.25, 8),
    ] {
        let ack = manager.admit_order(NewOrder::new(id, 1, side, price, quantity))?;
        println!("   ✓ Order {} {}", ack.order_id, ack.state);
    }

    match manager.modify_order(OrderId(3), 99.5, 25) {
        Ok(ack) => println!("   ✓ Order {} modified", ack.order_id),
        Err(e) => println!("   - Modify rejected: {}", e),
    }
    match manager.cancel_order(OrderId(4)) {
        Ok(ack) => println!("   ✓ Order {} {}", ack.order_id, ack.state),
        Err(e) => println!("   - Cancel rejected: {}", e),
    }
    println!();

    // 4. Let the dispatcher drain
    println!("4. Dispatching...");
    tokio::time::sleep(Duration::from_millis(200)).await;
    for order in manager.dispatched_orders()? {
        println!("   ✓ Order {} in flight", order.id);
    }
    println!();

    // 5. Responses
    println!("5. Correlating responses...");
    clock.advance(chrono::Duration::milliseconds(40));
    for response in [
        OrderResponse::new(1, ResponseKind::Accept),
        OrderResponse::new(2, ResponseKind::Reject),
        OrderResponse::new(3, ResponseKind::Accept),
        OrderResponse::new(9, ResponseKind::Accept),
    ] {
        match manager.handle_response(response) {
            Ok(record) => println!(
                "   ✓ Order {} {} after {:?}",
                record.order_id, record.kind, record.latency
            ),
            Err(e) => println!("   - Response dropped: {}", e),
        }
    }

    let stats = manager.stats()?;
    println!("\n   Stats: {:?}", stats);
    println!("   Response log holds {} records\n", manager.response_log().len()?);

    // 6. Shut down
    println!("6. Logging out...");
    manager.logout().await?;
    dispatcher.shutdown().await?;
    println!("   ✓ Session closed\n");

    println!("=== Example Complete ===");
    Ok(())
}
