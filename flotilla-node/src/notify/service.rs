// Notification Service
//
// INTENTION:
// Turn the persisted, at-least-once notification channel into
// synchronous-looking calls. `notify_sync` registers a waiter keyed by a
// fresh correlation id, durably records the request, hands it to the
// transport, and parks on the waiter until the dispatcher resolves it with
// the response payload or the deadline lapses. Every failure mode maps to
// one `DelegationError` variant, so callers get one taxonomy no matter
// where a delegated call broke.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

use flotilla_common::logging::Logger;

use crate::error::{DelegationError, Outcome};
use crate::notify::store::NotificationStore;
use crate::notify::{NotificationRecord, NotificationType, SendStatus};
use crate::registry::NodeInfo;
use crate::transport::RecordTransport;

/// Default deadline for a synchronous delegated call.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends notifications and correlates responses back to parked callers.
pub struct NotificationService {
    node_id: String,
    account: String,
    store: Arc<dyn NotificationStore>,
    transport: Arc<dyn RecordTransport>,
    sync_timeout: Duration,
    waiters: DashMap<String, oneshot::Sender<Outcome<Value>>>,
    logger: Arc<Logger>,
}

impl NotificationService {
    pub fn new(
        node_id: impl Into<String>,
        account: impl Into<String>,
        store: Arc<dyn NotificationStore>,
        transport: Arc<dyn RecordTransport>,
        sync_timeout: Duration,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            account: account.into(),
            store,
            transport,
            sync_timeout,
            waiters: DashMap::new(),
            logger,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Send a request to `target` and wait for its correlated response.
    ///
    /// On success the response payload deserializes into `T`. A remote
    /// failure surfaces as `DelegationError::Remote` with the class and
    /// message the far driver reported; silence past the deadline is
    /// `DelegationError::Timeout`, and a response arriving after that is
    /// discarded with a log line.
    pub async fn notify_sync<T, P>(
        &self,
        target: &NodeInfo,
        notification_type: NotificationType,
        payload: &P,
    ) -> Result<T, DelegationError>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        if notification_type.response_type().is_none() {
            return Err(DelegationError::Config(format!(
                "{notification_type} is a response type and cannot start an exchange"
            )));
        }

        let notification_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(notification_id.clone(), tx);

        let payload_json = match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(err) => {
                self.waiters.remove(&notification_id);
                return Err(DelegationError::Config(format!(
                    "unserializable {notification_type} payload: {err}"
                )));
            }
        };
        let record = NotificationRecord::new(
            notification_id.clone(),
            self.node_id.clone(),
            target.node_id.clone(),
            self.account.clone(),
            notification_type,
            payload_json,
        );

        if let Err(err) = self.send_record(record).await {
            self.waiters.remove(&notification_id);
            return Err(err);
        }
        self.logger.debug(format!(
            "sent {notification_type} {notification_id} to {}, waiting up to {:?}",
            target.node_id, self.sync_timeout
        ));

        match tokio::time::timeout(self.sync_timeout, rx).await {
            Ok(Ok(Outcome::Ok(value))) => serde_json::from_value(value).map_err(|err| {
                DelegationError::Transport(format!(
                    "undecodable response for {notification_id}: {err}"
                ))
            }),
            Ok(Ok(Outcome::Err(remote))) => Err(DelegationError::Remote {
                class: remote.class,
                message: remote.message,
            }),
            Ok(Err(_)) => Err(DelegationError::Transport(format!(
                "response channel closed for {notification_id}"
            ))),
            Err(_) => {
                self.waiters.remove(&notification_id);
                self.logger.warn(format!(
                    "no response for {notification_type} {notification_id} within {:?}",
                    self.sync_timeout
                ));
                Err(DelegationError::Timeout(self.sync_timeout))
            }
        }
    }

    /// Send a notification without waiting for a response.
    pub async fn notify<P>(
        &self,
        target: &NodeInfo,
        notification_type: NotificationType,
        payload: &P,
    ) -> Result<(), DelegationError>
    where
        P: Serialize + ?Sized,
    {
        let payload_json = serde_json::to_string(payload).map_err(|err| {
            DelegationError::Config(format!(
                "unserializable {notification_type} payload: {err}"
            ))
        })?;
        let record = NotificationRecord::new(
            Uuid::new_v4().to_string(),
            self.node_id.clone(),
            target.node_id.clone(),
            self.account.clone(),
            notification_type,
            payload_json,
        );
        self.send_record(record).await
    }

    /// Send the response half of an exchange back to its originator.
    ///
    /// The record carries the request's correlation id with the direction
    /// reversed, which is all the far side needs to resolve its waiter.
    pub async fn respond(
        &self,
        original: &NotificationRecord,
        outcome: Outcome<Value>,
    ) -> Result<(), DelegationError> {
        let response_type = original.notification_type.response_type().ok_or_else(|| {
            DelegationError::Config(format!(
                "{} has no response type to answer with",
                original.notification_type
            ))
        })?;
        let payload_json = serde_json::to_string(&outcome).map_err(|err| {
            DelegationError::Config(format!("unserializable response payload: {err}"))
        })?;
        self.send_record(original.response(response_type, payload_json))
            .await
    }

    /// Resolve the waiter parked on `notification_id`, if it still exists.
    ///
    /// A miss is normal: either the caller already timed out, or this is a
    /// duplicate delivery of a response that already resolved.
    pub fn resolve_reply(&self, notification_id: &str, outcome: Outcome<Value>) {
        match self.waiters.remove(notification_id) {
            Some((_, tx)) => {
                if tx.send(outcome).is_err() {
                    self.logger.debug(format!(
                        "caller for {notification_id} went away before resolution"
                    ));
                }
            }
            None => {
                self.logger.warn(format!(
                    "discarding reply for unknown or expired notification {notification_id}"
                ));
            }
        }
    }

    /// Durably record the outgoing notification, then deliver it.
    ///
    /// The Sent row exists before the transport sees the record, and its
    /// status reflects how far delivery got: Sending when handed over, Sent
    /// on success, Error when the transport refused it.
    async fn send_record(&self, record: NotificationRecord) -> Result<(), DelegationError> {
        let sent = self
            .store
            .create_sent(record)
            .await
            .map_err(|err| DelegationError::Transport(format!("cannot record send: {err:#}")))?;
        self.store
            .update_send_status(&sent.record_id, SendStatus::Sending)
            .await
            .map_err(|err| DelegationError::Transport(format!("cannot mark sending: {err:#}")))?;

        match self.transport.deliver(sent.record.clone()).await {
            Ok(()) => {
                self.store
                    .update_send_status(&sent.record_id, SendStatus::Sent)
                    .await
                    .map_err(|err| {
                        DelegationError::Transport(format!("cannot mark sent: {err:#}"))
                    })?;
                Ok(())
            }
            Err(deliver_err) => {
                if let Err(err) = self
                    .store
                    .update_send_status(&sent.record_id, SendStatus::Error)
                    .await
                {
                    self.logger.warn(format!(
                        "cannot mark send error on {}: {err:#}",
                        sent.record_id
                    ));
                }
                Err(DelegationError::Transport(format!(
                    "delivery to {} failed: {deliver_err:#}",
                    sent.record.to_node
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::notify::store::MemoryNotificationStore;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use flotilla_common::logging::Component;

    struct BlackholeTransport;

    #[async_trait]
    impl RecordTransport for BlackholeTransport {
        async fn deliver(&self, _record: NotificationRecord) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CapturingTransport {
        ids: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RecordTransport for CapturingTransport {
        async fn deliver(&self, record: NotificationRecord) -> anyhow::Result<()> {
            self.ids.lock().unwrap().push(record.notification_id);
            Ok(())
        }
    }

    struct RefusingTransport;

    #[async_trait]
    impl RecordTransport for RefusingTransport {
        async fn deliver(&self, _record: NotificationRecord) -> anyhow::Result<()> {
            Err(anyhow!("wire down"))
        }
    }

    fn service(
        store: Arc<dyn NotificationStore>,
        transport: Arc<dyn RecordTransport>,
        timeout: Duration,
    ) -> NotificationService {
        NotificationService::new(
            "node-a",
            "acct",
            store,
            transport,
            timeout,
            Arc::new(Logger::new_root(Component::Notify, "node-a")),
        )
    }

    fn target() -> NodeInfo {
        NodeInfo::new("node-b", "acct", "127.0.0.1:0")
    }

    #[tokio::test]
    async fn response_types_cannot_start_an_exchange() {
        let svc = service(
            Arc::new(MemoryNotificationStore::new()),
            Arc::new(BlackholeTransport),
            Duration::from_secs(1),
        );
        let result: Result<serde_json::Value, _> = svc
            .notify_sync(&target(), NotificationType::ComputeDriverResponse, "{}")
            .await;
        assert!(matches!(result, Err(DelegationError::Config(_))));
    }

    #[tokio::test]
    async fn silence_times_out_and_late_reply_is_discarded() {
        let store = Arc::new(MemoryNotificationStore::new());
        let transport = Arc::new(CapturingTransport::default());
        let svc = Arc::new(service(
            store.clone(),
            transport.clone(),
            Duration::from_millis(50),
        ));

        let result: Result<serde_json::Value, _> = svc
            .notify_sync(&target(), NotificationType::ComputeDriverGetOs, &())
            .await;
        let Err(DelegationError::Timeout(_)) = result else {
            panic!("expected timeout, got {result:?}");
        };

        // the request was still durably recorded and marked sent
        let id = transport.ids.lock().unwrap()[0].clone();
        let sent = store.find_sent_by_id(&id).await.unwrap().unwrap();
        assert_eq!(sent.status, SendStatus::Sent);

        // a reply after the deadline resolves nothing and does not panic
        svc.resolve_reply(&id, Outcome::Err(RemoteError::new("x", "y")));
    }

    #[tokio::test]
    async fn transport_refusal_maps_to_transport_error_and_error_status() {
        let store = Arc::new(MemoryNotificationStore::new());
        let svc = service(
            store.clone(),
            Arc::new(RefusingTransport),
            Duration::from_secs(1),
        );
        let result: Result<serde_json::Value, _> = svc
            .notify_sync(&target(), NotificationType::ComputeDriverGetOs, &())
            .await;
        assert!(matches!(result, Err(DelegationError::Transport(_))));
    }

    #[tokio::test]
    async fn concurrent_calls_never_cross_resolve() {
        let svc = Arc::new(service(
            Arc::new(MemoryNotificationStore::new()),
            Arc::new(BlackholeTransport),
            Duration::from_secs(5),
        ));

        let a = {
            let svc = svc.clone();
            tokio::spawn(async move {
                svc.notify_sync::<u32, _>(&target(), NotificationType::ComputeDriverGetOs, &"a")
                    .await
            })
        };
        let b = {
            let svc = svc.clone();
            tokio::spawn(async move {
                svc.notify_sync::<u32, _>(&target(), NotificationType::ComputeDriverGetSizes, &"b")
                    .await
            })
        };

        // wait until both waiters are parked, then resolve b's id first
        let (id_a, id_b) = loop {
            if svc.waiters.len() == 2 {
                let keys: Vec<String> =
                    svc.waiters.iter().map(|entry| entry.key().clone()).collect();
                let mut ids: Vec<(String, NotificationType)> = Vec::new();
                for key in keys {
                    let sent = svc.store.find_sent_by_id(&key).await.unwrap().unwrap();
                    ids.push((key, sent.record.notification_type));
                }
                let id_a = ids
                    .iter()
                    .find(|(_, ty)| *ty == NotificationType::ComputeDriverGetOs)
                    .unwrap()
                    .0
                    .clone();
                let id_b = ids
                    .iter()
                    .find(|(_, ty)| *ty == NotificationType::ComputeDriverGetSizes)
                    .unwrap()
                    .0
                    .clone();
                break (id_a, id_b);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };

        svc.resolve_reply(&id_b, Outcome::Ok(serde_json::json!(2)));
        assert_eq!(b.await.unwrap().unwrap(), 2);

        // b's resolution must not have touched a: its waiter is still
        // parked and its call still pending
        assert!(svc.waiters.contains_key(&id_a));
        assert!(!a.is_finished());

        svc.resolve_reply(&id_a, Outcome::Ok(serde_json::json!(1)));
        assert_eq!(a.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn resolved_reply_deserializes_into_the_declared_shape() {
        let svc = Arc::new(service(
            Arc::new(MemoryNotificationStore::new()),
            Arc::new(BlackholeTransport),
            Duration::from_secs(5),
        ));

        let caller = svc.clone();
        let call = tokio::spawn(async move {
            caller
                .notify_sync::<u32, _>(&target(), NotificationType::ComputeDriverGetOs, &())
                .await
        });

        // wait for the waiter to appear, then resolve it
        let id = loop {
            if let Some(entry) = svc.waiters.iter().next() {
                break entry.key().clone();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        svc.resolve_reply(&id, Outcome::Ok(serde_json::json!(17)));

        assert_eq!(call.await.unwrap().unwrap(), 17);
    }
}
