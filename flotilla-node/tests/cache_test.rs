// Cache-aside behavior of the caching geo drivers

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use flotilla_common::logging::{Component, Logger};
use flotilla_node::cache::CacheConfig;
use flotilla_node::drivers::{CachingGeoCodeDriver, GeoLocation};
use flotilla_node::Outcome;
use flotilla_test_utils::CountingGeoCodeDriver;

fn logger() -> Arc<Logger> {
    Arc::new(Logger::new_root(Component::Cache, "test"))
}

fn nyc() -> GeoLocation {
    GeoLocation {
        city: Some("New York".to_string()),
        country: Some("US".to_string()),
        ..GeoLocation::default()
    }
}

#[tokio::test]
async fn equivalent_locations_share_one_cache_entry() {
    let inner = Arc::new(CountingGeoCodeDriver::new(0));
    let driver = CachingGeoCodeDriver::new(inner.clone(), CacheConfig::default(), logger());

    driver.cached_lookup(&nyc()).await;
    // differently formatted but equivalent input hits the same entry
    let shouty = GeoLocation {
        city: Some("  NEW YORK ".to_string()),
        country: Some("us".to_string()),
        ..GeoLocation::default()
    };
    let outcome = driver.cached_lookup(&shouty).await;
    assert!(outcome.is_ok());
    assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cached_failure_expires_before_cached_success_would() {
    let config = CacheConfig::new(Duration::from_secs(60), Duration::from_millis(50)).unwrap();
    let inner = Arc::new(CountingGeoCodeDriver::new(1));
    let driver = CachingGeoCodeDriver::new(inner.clone(), config, logger());

    // first lookup fails and the failure is cached
    assert!(driver.cached_lookup(&nyc()).await.is_err());
    assert!(driver.cached_lookup(&nyc()).await.is_err());
    assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

    // past the error TTL the upstream is retried and succeeds
    tokio::time::sleep(Duration::from_millis(80)).await;
    let outcome = driver.cached_lookup(&nyc()).await;
    let Outcome::Ok(result) = outcome else {
        panic!("expected recovery after error ttl");
    };
    assert_eq!(result.lat, "40.7128");
    assert_eq!(inner.calls.load(Ordering::SeqCst), 2);

    // the success now sticks under the long TTL
    assert!(driver.cached_lookup(&nyc()).await.is_ok());
    assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn error_detail_is_preserved_through_the_cache() {
    let config = CacheConfig::new(Duration::from_secs(60), Duration::from_secs(30)).unwrap();
    let inner = Arc::new(CountingGeoCodeDriver::new(usize::MAX));
    let driver = CachingGeoCodeDriver::new(inner, config, logger());

    let Outcome::Err(first) = driver.cached_lookup(&nyc()).await else {
        panic!("expected failure");
    };
    let Outcome::Err(cached) = driver.cached_lookup(&nyc()).await else {
        panic!("expected cached failure");
    };
    assert_eq!(first, cached);
    assert!(cached.message.contains("geocode upstream unavailable"));
}
