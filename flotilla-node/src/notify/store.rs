// Notification Store Contract
//
// INTENTION:
// Define the persistence contract for the Sent and Received notification
// streams, and provide the in-memory implementation used by tests and
// single-process fleets. Creation is append-only and status transitions
// never regress; a record must be durably recorded before the transport
// ever sees it.

use anyhow::{bail, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::notify::{
    NotificationRecord, ProcessingStatus, ReceivedNotification, SendStatus, SentNotification,
};

/// Durable Sent/Received tables with status fields and query-by-status.
///
/// Implementations must support concurrent writers without lost updates:
/// `transition_received` is the optimistic guard dispatchers race on, and
/// exactly one caller wins any given transition.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Append a record to the Sent stream in `Created` state.
    async fn create_sent(&self, record: NotificationRecord) -> Result<SentNotification>;

    /// Advance the send status of a sent record. Regressions are rejected.
    async fn update_send_status(&self, record_id: &str, status: SendStatus) -> Result<()>;

    /// Find a sent record by its correlation id.
    async fn find_sent_by_id(&self, notification_id: &str) -> Result<Option<SentNotification>>;

    /// Append a record to the Received stream in `Received` state.
    async fn create_received(&self, record: NotificationRecord) -> Result<ReceivedNotification>;

    /// All received records currently in the given status, oldest first.
    async fn find_received_by_status(
        &self,
        status: ProcessingStatus,
    ) -> Result<Vec<ReceivedNotification>>;

    /// Atomically move a received record from `from` to `to`. Returns false
    /// when the record was not in `from` (another writer won, or the
    /// transition would regress).
    async fn transition_received(
        &self,
        record_id: &str,
        from: ProcessingStatus,
        to: ProcessingStatus,
    ) -> Result<bool>;

    /// Mark a received record failed with an error note. A record already in
    /// a terminal state is left untouched.
    async fn mark_failed(&self, record_id: &str, error: &str) -> Result<()>;

    /// All received records correlated to a notification id (request plus
    /// any duplicate deliveries).
    async fn find_received_for(&self, notification_id: &str)
        -> Result<Vec<ReceivedNotification>>;
}

/// In-memory notification store.
///
/// Backed by DashMap so concurrent dispatchers and the notification service
/// can write without holding a global lock.
pub struct MemoryNotificationStore {
    sent: DashMap<String, SentNotification>,
    received: DashMap<String, ReceivedNotification>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self {
            sent: DashMap::new(),
            received: DashMap::new(),
        }
    }
}

impl Default for MemoryNotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn create_sent(&self, record: NotificationRecord) -> Result<SentNotification> {
        let sent = SentNotification {
            record_id: Uuid::new_v4().to_string(),
            status: SendStatus::Created,
            record,
        };
        self.sent.insert(sent.record_id.clone(), sent.clone());
        Ok(sent)
    }

    async fn update_send_status(&self, record_id: &str, status: SendStatus) -> Result<()> {
        let Some(mut entry) = self.sent.get_mut(record_id) else {
            bail!("no sent record {record_id}");
        };
        if status.rank() <= entry.status.rank() {
            bail!(
                "send status of {record_id} cannot move from {} to {status}",
                entry.status
            );
        }
        entry.status = status;
        Ok(())
    }

    async fn find_sent_by_id(&self, notification_id: &str) -> Result<Option<SentNotification>> {
        Ok(self
            .sent
            .iter()
            .find(|entry| entry.record.notification_id == notification_id)
            .map(|entry| entry.value().clone()))
    }

    async fn create_received(&self, record: NotificationRecord) -> Result<ReceivedNotification> {
        let received = ReceivedNotification {
            record_id: Uuid::new_v4().to_string(),
            status: ProcessingStatus::Received,
            error: None,
            record,
        };
        self.received
            .insert(received.record_id.clone(), received.clone());
        Ok(received)
    }

    async fn find_received_by_status(
        &self,
        status: ProcessingStatus,
    ) -> Result<Vec<ReceivedNotification>> {
        let mut batch: Vec<ReceivedNotification> = self
            .received
            .iter()
            .filter(|entry| entry.status == status)
            .map(|entry| entry.value().clone())
            .collect();
        batch.sort_by(|a, b| a.record.created_at.cmp(&b.record.created_at));
        Ok(batch)
    }

    async fn transition_received(
        &self,
        record_id: &str,
        from: ProcessingStatus,
        to: ProcessingStatus,
    ) -> Result<bool> {
        if to.rank() <= from.rank() {
            bail!("processing status cannot move from {from} to {to}");
        }
        let Some(mut entry) = self.received.get_mut(record_id) else {
            bail!("no received record {record_id}");
        };
        if entry.status != from {
            return Ok(false);
        }
        entry.status = to;
        Ok(true)
    }

    async fn mark_failed(&self, record_id: &str, error: &str) -> Result<()> {
        let Some(mut entry) = self.received.get_mut(record_id) else {
            bail!("no received record {record_id}");
        };
        if matches!(
            entry.status,
            ProcessingStatus::Received | ProcessingStatus::Processing
        ) {
            entry.status = ProcessingStatus::Failed;
            entry.error = Some(error.to_string());
        }
        Ok(())
    }

    async fn find_received_for(
        &self,
        notification_id: &str,
    ) -> Result<Vec<ReceivedNotification>> {
        let mut matches: Vec<ReceivedNotification> = self
            .received
            .iter()
            .filter(|entry| entry.record.notification_id == notification_id)
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_by(|a, b| a.record.created_at.cmp(&b.record.created_at));
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationType;

    fn record(id: &str) -> NotificationRecord {
        NotificationRecord::new(
            id,
            "node-a",
            "node-b",
            "acct",
            NotificationType::ComputeDriverStatus,
            "{}",
        )
    }

    #[tokio::test]
    async fn transition_is_won_exactly_once() {
        let store = MemoryNotificationStore::new();
        let received = store.create_received(record("n-1")).await.unwrap();

        let first = store
            .transition_received(
                &received.record_id,
                ProcessingStatus::Received,
                ProcessingStatus::Processing,
            )
            .await
            .unwrap();
        let second = store
            .transition_received(
                &received.record_id,
                ProcessingStatus::Received,
                ProcessingStatus::Processing,
            )
            .await
            .unwrap();
        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn status_never_regresses() {
        let store = MemoryNotificationStore::new();
        let received = store.create_received(record("n-2")).await.unwrap();
        store
            .transition_received(
                &received.record_id,
                ProcessingStatus::Received,
                ProcessingStatus::Processing,
            )
            .await
            .unwrap();
        store
            .transition_received(
                &received.record_id,
                ProcessingStatus::Processing,
                ProcessingStatus::Processed,
            )
            .await
            .unwrap();

        // terminal records ignore mark_failed
        store.mark_failed(&received.record_id, "late").await.unwrap();
        let processed = store
            .find_received_by_status(ProcessingStatus::Processed)
            .await
            .unwrap();
        assert_eq!(processed.len(), 1);

        // explicit regressions are rejected outright
        assert!(store
            .transition_received(
                &received.record_id,
                ProcessingStatus::Processed,
                ProcessingStatus::Received,
            )
            .await
            .is_err());
    }

    #[tokio::test]
    async fn send_status_advances_monotonically() {
        let store = MemoryNotificationStore::new();
        let sent = store.create_sent(record("n-3")).await.unwrap();
        store
            .update_send_status(&sent.record_id, SendStatus::Sending)
            .await
            .unwrap();
        store
            .update_send_status(&sent.record_id, SendStatus::Sent)
            .await
            .unwrap();
        assert!(store
            .update_send_status(&sent.record_id, SendStatus::Sending)
            .await
            .is_err());

        let found = store.find_sent_by_id("n-3").await.unwrap().unwrap();
        assert_eq!(found.status, SendStatus::Sent);
    }
}
