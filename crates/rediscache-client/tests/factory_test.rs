//! Integration tests for named client lookup and lazy connection.

mod helpers;

use std::sync::Arc;

use rediscache_client::RegistrationState;
use rediscache_core::error::ErrorKind;

#[tokio::test]
async fn test_named_clients_connect_lazily_and_once() {
    let cache = helpers::TestCache::new(&["Orders", "Billing"]);
    assert_eq!(cache.factory.client_names(), vec!["Billing", "Default", "Orders"]);
    assert_eq!(cache.connector.connect_count(), 0);

    let orders = cache.factory.create_client(Some("Orders")).await.unwrap();
    let again = cache.factory.create_client(Some("Orders")).await.unwrap();
    assert!(Arc::ptr_eq(&orders, &again));
    assert_eq!(orders.name(), "Orders");
    assert_eq!(cache.connector.connect_count(), 1);

    let billing = cache.factory.create_client(Some("Billing")).await.unwrap();
    assert_eq!(billing.name(), "Billing");
    assert!(!Arc::ptr_eq(&orders, &billing));
    assert_eq!(cache.connector.connect_count(), 2);
}

#[tokio::test]
async fn test_unregistered_name_is_not_found() {
    let cache = helpers::TestCache::new(&["Orders"]);

    let err = cache.factory.create_client(Some("Shipping")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(
        err.message,
        "Unable to find client registration with name 'Shipping'."
    );
    assert_eq!(cache.connector.connect_count(), 0);
}

#[tokio::test]
async fn test_timed_out_first_request_keeps_single_connect() {
    let cache = helpers::TestCache::new(&["Orders"]);

    // A zero timeout drops the first request before its connect is awaited.
    let _ = tokio::time::timeout(
        std::time::Duration::ZERO,
        cache.factory.create_client(Some("Orders")),
    )
    .await;
    let orders = cache.factory.create_client(Some("Orders")).await.unwrap();

    assert_eq!(orders.name(), "Orders");
    assert_eq!(cache.connector.connect_count(), 1);
}

#[tokio::test]
async fn test_default_client_without_name() {
    let cache = helpers::TestCache::new(&[]);
    let client = cache.factory.create_client(None).await.unwrap();
    assert_eq!(client.name(), "Default");
}

#[tokio::test]
async fn test_named_clients_share_one_keyspace() {
    let cache = helpers::TestCache::new(&["Orders", "Billing"]);
    let orders = cache.factory.create_client(Some("Orders")).await.unwrap();
    let billing = cache.factory.create_client(Some("Billing")).await.unwrap();

    orders.set_as("invoice:7", &42u32, 5).await.unwrap();
    assert_eq!(billing.get_as::<u32>("invoice:7").await.unwrap(), Some(42));
}

#[tokio::test]
async fn test_shutdown_closes_connected_clients() {
    let cache = helpers::TestCache::new(&["Orders", "Billing"]);
    let orders = cache.factory.create_client(Some("Orders")).await.unwrap();

    cache.factory.shutdown().await;

    assert!(!orders.is_connected());
    assert!(cache.store("Orders").is_closed());
    // Billing never connected, so shutdown must not have opened it.
    assert!(cache.connector.store("Billing").is_none());
}

#[tokio::test]
async fn test_registration_state_is_observable() {
    let registration = Arc::new(rediscache_client::ClientRegistration::new(
        "Orders".parse().unwrap(),
    ));
    assert_eq!(registration.state(), RegistrationState::Unresolved);

    let connector = Arc::new(rediscache_client::memory::MemoryConnector::new());
    let config = rediscache_core::config::cache::CacheConfiguration::new("cache.example:6380", "s3cr3t");
    registration.get_client(&config, connector).await.unwrap();
    assert_eq!(registration.state(), RegistrationState::Resolved);
}
