/// Pool registry and lifecycle tests
///
/// One pool per connection name, shared across tasks, plus the
/// process-wide connection maintenance operations.
/// Run with: cargo test --test pool_registry_tests
mod common;

use common::{ScriptedDriver, configurations, entry};
use shardfabric::{DataFabric, FabricOptions, PoolRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;
use tokio_test::assert_ok;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_use_creates_one_pool() {
    let driver = ScriptedDriver::mysql();
    let configs = Arc::new(configurations());
    let mut drivers = shardfabric::DriverRegistry::new();
    drivers.register(driver.clone());
    let drivers = Arc::new(drivers);
    let registry = Arc::new(PoolRegistry::new());

    let num_tasks = 16;
    let barrier = Arc::new(Barrier::new(num_tasks));
    let mut handles = vec![];

    for _ in 0..num_tasks {
        let registry = Arc::clone(&registry);
        let configs = Arc::clone(&configs);
        let drivers = Arc::clone(&drivers);
        let barrier = Arc::clone(&barrier);

        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            registry
                .get_or_create("test_master", configs.as_ref(), &drivers)
                .await
                .unwrap()
        }));
    }

    let mut pools = vec![];
    for handle in handles {
        pools.push(handle.await.unwrap());
    }

    assert!(pools.iter().all(|pool| Arc::ptr_eq(pool, &pools[0])));
    assert_eq!(registry.names(), vec!["test_master"]);
}

#[tokio::test]
async fn test_proxies_share_pools_by_name() {
    let driver = ScriptedDriver::mysql();
    let fabric = common::fabric(&driver);
    let orders = fabric.data_fabric("Order", FabricOptions::new().replicated()).unwrap();
    let invoices = fabric.data_fabric("Invoice", FabricOptions::new().replicated()).unwrap();
    let ctx = fabric.new_context();

    let a = orders.current_pool(&ctx).await.unwrap();
    let b = invoices.current_pool(&ctx).await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    assert_ok!(orders.select(&ctx, "SELECT 1").await);
    assert_ok!(invoices.select(&ctx, "SELECT 1").await);

    // The second read reused the idle connection
    assert_eq!(driver.connects(), 1);
    assert!(orders.is_connected(&ctx).await.unwrap());
}

#[tokio::test]
async fn test_pool_stats_and_connection_checkout() {
    let driver = ScriptedDriver::mysql();
    let fabric = common::fabric(&driver);
    let orders = fabric.data_fabric("Order", FabricOptions::new().replicated()).unwrap();
    let ctx = fabric.new_context();

    assert!(!orders.is_connected(&ctx).await.unwrap());

    let mut conn = orders.connection(&ctx).await.unwrap();
    assert_eq!(conn.pool_name(), "test_slave");
    assert_eq!(conn.adapter_name(), Some("mysql2"));
    assert_ok!(conn.execute("SELECT 1").await);

    let stats = orders.pool_stats(&ctx).await.unwrap();
    assert_eq!(stats.active_connections, 1);
    assert_eq!(stats.max_connections, 5);

    conn.close().await.unwrap();
    let stats = orders.pool_stats(&ctx).await.unwrap();
    assert_eq!(stats.available_connections, 1);
    assert_eq!(stats.active_connections, 0);
}

#[tokio::test]
async fn test_release_keeps_minimum_idle_connections() {
    let driver = ScriptedDriver::mysql();
    let mut configs = configurations();
    configs.insert("test_master", entry("mysql2", "test_master").min_connections(1));
    let fabric = DataFabric::builder("test")
        .configurations(configs)
        .driver(driver.clone())
        .build()
        .unwrap();
    let orders = fabric.data_fabric("Order", FabricOptions::new().replicated()).unwrap();
    let ctx = fabric.new_context();

    assert_ok!(orders.insert(&ctx, "INSERT INTO orders VALUES (1)").await);
    let master = fabric.pools().get("test_master").unwrap();
    assert_eq!(master.stats().await.total_connections, 1);

    let first = master.get_connection().await.unwrap();
    let second = master.get_connection().await.unwrap();
    let third = master.get_connection().await.unwrap();
    for conn in [first, second, third] {
        conn.close().await.unwrap();
    }
    assert_eq!(master.stats().await.available_connections, 3);

    assert_eq!(fabric.clear_active_connections().await, 2);
    assert_eq!(master.stats().await.available_connections, 1);
    assert_eq!(driver.connects(), 3);
}

#[tokio::test]
async fn test_verify_drops_broken_connections() {
    let driver = ScriptedDriver::mysql();
    let fabric = common::fabric(&driver);
    let orders = fabric.data_fabric("Order", FabricOptions::new().replicated()).unwrap();
    let ctx = fabric.new_context();

    assert_ok!(orders.select(&ctx, "SELECT 1").await);
    assert_eq!(fabric.verify_active_connections().await, 0);

    driver.fail_ping(true);
    assert_eq!(fabric.verify_active_connections().await, 1);
    assert!(!orders.is_connected(&ctx).await.unwrap());
}

#[tokio::test]
async fn test_clear_stale_connections() {
    let driver = ScriptedDriver::mysql();
    let mut configs = configurations();
    configs.insert(
        "test_slave",
        entry("mysql2", "test_slave").idle_timeout(Duration::from_secs(1)),
    );
    let fabric = DataFabric::builder("test")
        .configurations(configs)
        .driver(driver.clone())
        .build()
        .unwrap();
    let orders = fabric.data_fabric("Order", FabricOptions::new().replicated()).unwrap();
    let ctx = fabric.new_context();

    assert_ok!(orders.select(&ctx, "SELECT 1").await);
    assert_eq!(fabric.clear_stale_connections().await, 0);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(fabric.clear_stale_connections().await, 1);
}

#[tokio::test]
async fn test_disconnect_and_teardown() {
    let driver = ScriptedDriver::mysql();
    let fabric = common::fabric(&driver);
    let orders = fabric.data_fabric("Order", FabricOptions::new().replicated()).unwrap();
    let ctx = fabric.new_context();

    assert_ok!(orders.select(&ctx, "SELECT 1").await);
    assert_ok!(orders.insert(&ctx, "INSERT INTO orders VALUES (1)").await);
    assert_eq!(fabric.disconnect_all().await, 2);
    assert_eq!(fabric.pools().len(), 2);

    assert_ok!(orders.select(&ctx, "SELECT 1").await);
    let before = fabric.pools().get("test_slave").unwrap();
    assert_eq!(fabric.teardown().await.unwrap(), 1);
    assert!(fabric.pools().is_empty());

    // Next use builds a fresh pool
    assert_ok!(orders.select(&ctx, "SELECT 1").await);
    let after = fabric.pools().get("test_slave").unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
}
