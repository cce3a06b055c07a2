// End-to-end delegation over two linked nodes

use std::sync::Arc;
use std::time::Duration;

use flotilla_node::drivers::{
    DnsRecordMatch, DnsType, FleetNode, GeoLocation, NodeState, RenderedMessage,
};
use flotilla_node::{
    DelegationError, DriverInstance, NotificationStore, ProcessingStatus, ServiceType,
};
use flotilla_test_utils::{
    create_linked_nodes, create_linked_nodes_with, stranger, FailingComputeDriver,
    FixedGeoCodeDriver, FixedGeoLocationDriver, FixedGeoTimeDriver, MemoryDnsDriver,
    MockComputeDriver, RecordingMessagingDriver, SlowComputeDriver,
};

fn test_node() -> FleetNode {
    FleetNode::new("fn-1", "alpha", "alpha.fleet.example.com", "nyc1", "small")
}

#[tokio::test]
async fn delegated_start_returns_provider_addresses() {
    let (front, delegate, _hub) = create_linked_nodes(Duration::from_secs(5)).unwrap();
    delegate
        .add_cloud_service(
            "compute-main",
            ServiceType::Compute,
            DriverInstance::Compute(Arc::new(MockComputeDriver::new())),
        )
        .unwrap();
    front
        .add_delegated_service("compute-front", ServiceType::Compute, "delegate", "compute-main")
        .unwrap();

    let driver = front.compute("compute-front").unwrap();
    let started = driver.start(test_node()).await.unwrap();
    assert_eq!(started.ip4.as_deref(), Some("127.0.0.1"));
    assert_eq!(started.ip6.as_deref(), Some("::1"));
    assert_eq!(started.state, NodeState::Running);
    assert!(started.has_addresses());
}

#[tokio::test]
async fn remote_driver_failure_comes_back_as_remote_error() {
    let (front, delegate, _hub) = create_linked_nodes(Duration::from_secs(5)).unwrap();
    delegate
        .add_cloud_service(
            "compute-main",
            ServiceType::Compute,
            DriverInstance::Compute(Arc::new(FailingComputeDriver::new("no credentials"))),
        )
        .unwrap();
    front
        .add_delegated_service("compute-front", ServiceType::Compute, "delegate", "compute-main")
        .unwrap();

    let err = front
        .compute("compute-front")
        .unwrap()
        .get_os()
        .await
        .unwrap_err();
    match err.downcast_ref::<DelegationError>() {
        Some(DelegationError::Remote { message, .. }) => {
            assert!(message.contains("no credentials"), "got: {message}");
        }
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_delegate_fails_fast_as_config_error() {
    let (front, _delegate, _hub) = create_linked_nodes(Duration::from_secs(5)).unwrap();
    front
        .add_delegated_service("compute-front", ServiceType::Compute, "ghost", "compute-main")
        .unwrap();

    let err = front
        .compute("compute-front")
        .unwrap()
        .get_os()
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DelegationError>(),
        Some(DelegationError::Config(_))
    ));
}

#[tokio::test]
async fn region_catalog_is_fetched_once_per_delegate() {
    let (front, delegate, _hub) = create_linked_nodes(Duration::from_secs(5)).unwrap();
    let mock = Arc::new(MockComputeDriver::new());
    delegate
        .add_cloud_service(
            "compute-main",
            ServiceType::Compute,
            DriverInstance::Compute(mock.clone()),
        )
        .unwrap();
    front
        .add_delegated_service("compute-front", ServiceType::Compute, "delegate", "compute-main")
        .unwrap();

    let driver = front.compute("compute-front").unwrap();
    let first = driver.get_regions().await.unwrap();
    let second = driver.get_regions().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(
        mock.region_calls.load(std::sync::atomic::Ordering::SeqCst),
        1
    );
    // sizes are not cached and still round-trip
    assert_eq!(driver.get_sizes().await.unwrap().len(), 2);
}

#[tokio::test]
async fn region_catalog_is_refetched_after_its_ttl() {
    use flotilla_node::NodeConfig;

    let front_config = NodeConfig::new("front", "test-account", "127.0.0.1:7101")
        .with_sync_timeout(Duration::from_secs(5))
        .with_region_cache_ttl(Duration::from_millis(50));
    let delegate_config = NodeConfig::new("delegate", "test-account", "127.0.0.1:7102")
        .with_sync_timeout(Duration::from_secs(5));
    let (front, delegate, _hub) = create_linked_nodes_with(front_config, delegate_config).unwrap();
    let mock = Arc::new(MockComputeDriver::new());
    delegate
        .add_cloud_service(
            "compute-main",
            ServiceType::Compute,
            DriverInstance::Compute(mock.clone()),
        )
        .unwrap();
    front
        .add_delegated_service("compute-front", ServiceType::Compute, "delegate", "compute-main")
        .unwrap();

    let driver = front.compute("compute-front").unwrap();
    driver.get_regions().await.unwrap();
    driver.get_regions().await.unwrap();
    assert_eq!(
        mock.region_calls.load(std::sync::atomic::Ordering::SeqCst),
        1
    );

    // once the cached catalog ages out, the next call goes back to the wire
    tokio::time::sleep(Duration::from_millis(80)).await;
    driver.get_regions().await.unwrap();
    assert_eq!(
        mock.region_calls.load(std::sync::atomic::Ordering::SeqCst),
        2
    );
}

#[tokio::test]
async fn delegated_dns_records_survive_the_round_trip() {
    let (front, delegate, _hub) = create_linked_nodes(Duration::from_secs(5)).unwrap();
    delegate
        .add_cloud_service(
            "dns-main",
            ServiceType::Dns,
            DriverInstance::Dns(Arc::new(MemoryDnsDriver::new())),
        )
        .unwrap();
    front
        .add_delegated_service("dns-front", ServiceType::Dns, "delegate", "dns-main")
        .unwrap();

    let driver = front.dns("dns-front").unwrap();
    let mut node = test_node();
    node.ip4 = Some("203.0.113.7".to_string());
    let written = driver.set_node(&node).await.unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].rtype, DnsType::A);

    let listed = driver
        .list(&DnsRecordMatch {
            rtype: Some(DnsType::A),
            fqdn: Some(node.fqdn.clone()),
            subdomain: None,
        })
        .await
        .unwrap();
    assert_eq!(listed, written);

    let removed = driver.delete_node(&node).await.unwrap();
    assert_eq!(removed.len(), 1);
    assert!(driver
        .list(&DnsRecordMatch::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn delegated_geo_lookups_round_trip() {
    let (front, delegate, _hub) = create_linked_nodes(Duration::from_secs(5)).unwrap();
    delegate
        .add_cloud_service(
            "geo-main",
            ServiceType::GeoCode,
            DriverInstance::GeoCode(Arc::new(FixedGeoCodeDriver::new("40.7128", "-74.0060"))),
        )
        .unwrap();
    delegate
        .add_cloud_service(
            "tz-main",
            ServiceType::GeoTime,
            DriverInstance::GeoTime(Arc::new(FixedGeoTimeDriver::new(
                "America/New_York",
                -18_000_000,
            ))),
        )
        .unwrap();
    front
        .add_delegated_service("geo-front", ServiceType::GeoCode, "delegate", "geo-main")
        .unwrap();
    front
        .add_delegated_service("tz-front", ServiceType::GeoTime, "delegate", "tz-main")
        .unwrap();

    let location = GeoLocation {
        city: Some("New York".to_string()),
        country: Some("US".to_string()),
        ..GeoLocation::default()
    };
    let coded = front
        .geo_code("geo-front")
        .unwrap()
        .lookup(&location)
        .await
        .unwrap();
    assert_eq!(coded.lat, "40.7128");

    let zone = front
        .geo_time("tz-front")
        .unwrap()
        .timezone(&coded.lat, &coded.lon)
        .await
        .unwrap();
    assert_eq!(zone.time_zone_id, "America/New_York");
    assert_eq!(zone.standard_offset_millis, -18_000_000);
}

#[tokio::test]
async fn delegated_geo_ip_lookup_round_trips() {
    let (front, delegate, _hub) = create_linked_nodes(Duration::from_secs(5)).unwrap();
    delegate
        .add_cloud_service(
            "ip-main",
            ServiceType::GeoLocation,
            DriverInstance::GeoLocation(Arc::new(FixedGeoLocationDriver::new("Amsterdam", "NL"))),
        )
        .unwrap();
    front
        .add_delegated_service("ip-front", ServiceType::GeoLocation, "delegate", "ip-main")
        .unwrap();

    let located = front
        .geo_location("ip-front")
        .unwrap()
        .locate("203.0.113.7")
        .await
        .unwrap();
    assert_eq!(located.city.as_deref(), Some("Amsterdam"));
    assert_eq!(located.country.as_deref(), Some("NL"));
}

#[tokio::test]
async fn delegated_send_reports_the_gateway_verdict() {
    let (front, delegate, _hub) = create_linked_nodes(Duration::from_secs(5)).unwrap();
    let gateway = Arc::new(RecordingMessagingDriver::new(true));
    delegate
        .add_cloud_service(
            "email-main",
            ServiceType::Email,
            DriverInstance::Messaging(gateway.clone()),
        )
        .unwrap();
    front
        .add_delegated_service("email-front", ServiceType::Email, "delegate", "email-main")
        .unwrap();

    let accepted = front
        .messaging("email-front")
        .unwrap()
        .send(
            "test-account",
            &RenderedMessage::new(Some("hello".to_string()), "welcome aboard"),
            "user@example.com",
        )
        .await
        .unwrap();
    assert!(accepted);

    let sent = gateway.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, "user@example.com");
}

#[tokio::test]
async fn slow_delegate_turns_into_a_timeout() {
    let (front, delegate, _hub) = create_linked_nodes(Duration::from_millis(100)).unwrap();
    delegate
        .add_cloud_service(
            "compute-main",
            ServiceType::Compute,
            DriverInstance::Compute(Arc::new(SlowComputeDriver::new(Duration::from_secs(2)))),
        )
        .unwrap();
    front
        .add_delegated_service("compute-front", ServiceType::Compute, "delegate", "compute-main")
        .unwrap();

    let err = front
        .compute("compute-front")
        .unwrap()
        .get_os()
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DelegationError>(),
        Some(DelegationError::Timeout(_))
    ));
}

#[tokio::test]
async fn request_from_unknown_node_is_failed_without_a_response() {
    use flotilla_node::{NotificationRecord, NotificationType};

    let (_front, delegate, _hub) = create_linked_nodes(Duration::from_secs(5)).unwrap();
    let unknown = stranger();
    let record = NotificationRecord::new(
        "n-stranger",
        &unknown.node_id,
        "delegate",
        &unknown.account,
        NotificationType::ComputeDriverGetOs,
        "{}",
    );
    delegate.handle_inbound(record).await.unwrap();

    // dispatch runs on its own task; poll until the record settles
    let mut status = None;
    for _ in 0..50 {
        let found = delegate
            .store()
            .find_received_for("n-stranger")
            .await
            .unwrap();
        if let Some(n) = found.first() {
            if n.status != ProcessingStatus::Received && n.status != ProcessingStatus::Processing {
                status = Some(n.status);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, Some(ProcessingStatus::Failed));
}
