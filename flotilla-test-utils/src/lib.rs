// Test fixtures for the Flotilla fleet
//
// INTENTION:
// Provide the mock drivers and pre-wired node pairs the integration tests
// build on, so each test reads as scenario + assertions instead of setup.

pub mod fixtures;

pub use fixtures::{
    CountingGeoCodeDriver, FailingComputeDriver, FixedGeoCodeDriver, FixedGeoLocationDriver,
    FixedGeoTimeDriver, MemoryDnsDriver, MockComputeDriver, RecordingMessagingDriver,
    SlowComputeDriver,
};

use std::sync::Arc;
use std::time::Duration;

use flotilla_node::notify::store::MemoryNotificationStore;
use flotilla_node::transport::LoopbackTransport;
use flotilla_node::{Node, NodeConfig, NodeInfo};

/// Build two nodes joined by a loopback transport, each backed by its own
/// in-memory store, with both peers in both directories.
///
/// Returns `(front, delegate, transport)`: tests register real drivers on
/// the delegate and delegated services on the front.
pub fn create_linked_nodes(
    sync_timeout: Duration,
) -> anyhow::Result<(Arc<Node>, Arc<Node>, Arc<LoopbackTransport>)> {
    create_linked_nodes_with(
        NodeConfig::new("front", "test-account", "127.0.0.1:7101").with_sync_timeout(sync_timeout),
        NodeConfig::new("delegate", "test-account", "127.0.0.1:7102")
            .with_sync_timeout(sync_timeout),
    )
}

/// Same pairing as [`create_linked_nodes`], but with caller-supplied
/// configs, for tests that tune timeouts or cache TTLs per node.
pub fn create_linked_nodes_with(
    front_config: NodeConfig,
    delegate_config: NodeConfig,
) -> anyhow::Result<(Arc<Node>, Arc<Node>, Arc<LoopbackTransport>)> {
    let transport = Arc::new(LoopbackTransport::new());

    let front = Node::new(
        front_config,
        Arc::new(MemoryNotificationStore::new()),
        transport.clone(),
    )?;
    let delegate = Node::new(
        delegate_config,
        Arc::new(MemoryNotificationStore::new()),
        transport.clone(),
    )?;

    transport.register(&front.info().node_id, front.clone());
    transport.register(&delegate.info().node_id, delegate.clone());

    front.add_node(delegate.info().clone());
    delegate.add_node(front.info().clone());

    Ok((front, delegate, transport))
}

/// A `NodeInfo` for a peer that exists in no directory and no transport.
pub fn stranger() -> NodeInfo {
    NodeInfo::new("stranger", "test-account", "127.0.0.1:7999")
}
