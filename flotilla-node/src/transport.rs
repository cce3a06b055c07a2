// Transport Module
//
// INTENTION:
// Abstract the delivery of notification records between nodes behind a
// single trait, so the notification layer never knows whether a record
// crosses a wire or a function call. The in-process loopback hub is the
// shipped implementation; it is also what every multi-node test runs on.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::notify::NotificationRecord;

/// Delivers a record to the node it is addressed to.
#[async_trait]
pub trait RecordTransport: Send + Sync {
    async fn deliver(&self, record: NotificationRecord) -> Result<()>;
}

/// Accepts records arriving at a node.
#[async_trait]
pub trait InboundReceiver: Send + Sync {
    async fn receive(&self, record: NotificationRecord) -> Result<()>;
}

/// In-process transport hub connecting the nodes registered on it.
#[derive(Default)]
pub struct LoopbackTransport {
    endpoints: DashMap<String, Arc<dyn InboundReceiver>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, node_id: impl Into<String>, receiver: Arc<dyn InboundReceiver>) {
        self.endpoints.insert(node_id.into(), receiver);
    }
}

#[async_trait]
impl RecordTransport for LoopbackTransport {
    async fn deliver(&self, record: NotificationRecord) -> Result<()> {
        let receiver = {
            self.endpoints
                .get(&record.to_node)
                .map(|entry| entry.value().clone())
        };
        match receiver {
            Some(receiver) => receiver.receive(record).await,
            None => Err(anyhow!("no endpoint registered for node {}", record.to_node)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationType;
    use std::sync::Mutex;

    struct Recording {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl InboundReceiver for Recording {
        async fn receive(&self, record: NotificationRecord) -> Result<()> {
            self.seen.lock().unwrap().push(record.notification_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivers_to_the_addressed_endpoint_only() {
        let hub = LoopbackTransport::new();
        let receiver = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
        });
        hub.register("node-b", receiver.clone());

        let record = NotificationRecord::new(
            "n-1",
            "node-a",
            "node-b",
            "acct",
            NotificationType::ComputeDriverStatus,
            "{}",
        );
        hub.deliver(record).await.unwrap();
        assert_eq!(*receiver.seen.lock().unwrap(), vec!["n-1".to_string()]);

        let stray = NotificationRecord::new(
            "n-2",
            "node-a",
            "node-z",
            "acct",
            NotificationType::ComputeDriverStatus,
            "{}",
        );
        assert!(hub.deliver(stray).await.is_err());
    }
}
