// Correlation behavior of the synchronous notification exchange

use std::sync::Arc;
use std::time::Duration;

use flotilla_node::drivers::FleetNode;
use flotilla_node::{DriverInstance, NotificationStore, ProcessingStatus, SendStatus, ServiceType};
use flotilla_test_utils::{create_linked_nodes, MockComputeDriver};

#[tokio::test]
async fn concurrent_calls_resolve_to_their_own_responses() {
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

    // different operations in flight at once; each caller must get the
    // response shape of its own request, not whichever lands first
    let (os, sizes, started) = tokio::join!(
        driver.get_os(),
        driver.get_sizes(),
        driver.start(FleetNode::new(
            "fn-9",
            "iota",
            "iota.fleet.example.com",
            "ams3",
            "medium"
        ))
    );
    assert_eq!(os.unwrap().name, "ubuntu-22-04");
    assert_eq!(sizes.unwrap().len(), 2);
    assert_eq!(started.unwrap().ip4.as_deref(), Some("127.0.0.1"));
}

#[tokio::test]
async fn both_sides_persist_the_exchange() {
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

    front
        .compute("compute-front")
        .unwrap()
        .get_os()
        .await
        .unwrap();

    // the delegate holds exactly one received request, fully processed;
    // that transition settles on the dispatch task shortly after the call
    let mut processed = Vec::new();
    for _ in 0..50 {
        processed = delegate
            .store()
            .find_received_by_status(ProcessingStatus::Processed)
            .await
            .unwrap();
        if !processed.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(processed.len(), 1);
    let request = &processed[0];
    assert_eq!(request.record.from_node, "front");

    // the request's sent record on the caller side reached Sent, and the
    // response reusing its correlation id came back and was processed
    let sent = front
        .store()
        .find_sent_by_id(&request.record.notification_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sent.status, SendStatus::Sent);

    // the response settles on its own task shortly after the call returns
    let mut settled = None;
    for _ in 0..50 {
        let responses = front
            .store()
            .find_received_for(&request.record.notification_id)
            .await
            .unwrap();
        if let Some(r) = responses.first() {
            if r.status == ProcessingStatus::Processed {
                settled = Some(r.clone());
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let response = settled.expect("response never reached Processed");
    assert!(response.record.notification_type.is_response());
}
