// Notification Dispatcher
//
// INTENTION:
// Drain the Received stream: claim each dispatch-eligible record with an
// optimistic status transition, then process it on its own task. Requests
// run through the handler registry and always produce a response record
// when a directory-verified sender exists; responses resolve the waiter
// parked on their correlation id. Processing status tracks dispatch, not
// the operation: a driver failure still ends Processed, with the failure
// carried in the response payload.

use anyhow::{bail, Result};
use serde_json::Value;
use std::sync::Arc;

use flotilla_common::logging::Logger;

use crate::error::Outcome;
use crate::notify::handlers::{HandlerContext, HandlerRegistry};
use crate::notify::service::NotificationService;
use crate::notify::store::NotificationStore;
use crate::notify::{ProcessingStatus, ReceivedNotification};
use crate::registry::{CloudServiceRegistry, NodeDirectory};

/// Processes received notifications for one node.
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    notify: Arc<NotificationService>,
    handlers: Arc<HandlerRegistry>,
    directory: Arc<NodeDirectory>,
    services: Arc<CloudServiceRegistry>,
    logger: Arc<Logger>,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        notify: Arc<NotificationService>,
        handlers: Arc<HandlerRegistry>,
        directory: Arc<NodeDirectory>,
        services: Arc<CloudServiceRegistry>,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            store,
            notify,
            handlers,
            directory,
            services,
            logger,
        }
    }

    /// Claim and dispatch every record currently in `Received` state.
    ///
    /// Each claimed record is processed on its own task; records another
    /// dispatcher claimed first are skipped silently. Safe to call from
    /// several places at once, which is exactly what happens when inbound
    /// delivery and a periodic sweep overlap.
    pub async fn check_inbox(&self) -> Result<()> {
        let batch = self
            .store
            .find_received_by_status(ProcessingStatus::Received)
            .await?;
        for notification in batch {
            let claimed = self
                .store
                .transition_received(
                    &notification.record_id,
                    ProcessingStatus::Received,
                    ProcessingStatus::Processing,
                )
                .await?;
            if !claimed {
                continue;
            }
            let dispatcher = self.clone();
            tokio::spawn(async move {
                dispatcher.process(notification).await;
            });
        }
        Ok(())
    }

    /// Process one claimed record and settle its terminal status.
    async fn process(&self, notification: ReceivedNotification) {
        let record_id = notification.record_id.clone();
        match self.process_inner(&notification).await {
            Ok(()) => {
                if let Err(err) = self
                    .store
                    .transition_received(
                        &record_id,
                        ProcessingStatus::Processing,
                        ProcessingStatus::Processed,
                    )
                    .await
                {
                    self.logger
                        .warn(format!("cannot mark {record_id} processed: {err:#}"));
                }
            }
            Err(err) => {
                self.logger.warn(format!(
                    "dispatch of {} ({}) failed: {err:#}",
                    notification.record.notification_type, record_id
                ));
                if let Err(mark_err) = self.store.mark_failed(&record_id, &format!("{err:#}")).await
                {
                    self.logger
                        .warn(format!("cannot mark {record_id} failed: {mark_err:#}"));
                }
            }
        }
    }

    async fn process_inner(&self, notification: &ReceivedNotification) -> Result<()> {
        let record = &notification.record;

        if record.notification_type.is_response() {
            let outcome: Outcome<Value> = record.payload()?;
            self.notify.resolve_reply(&record.notification_id, outcome);
            return Ok(());
        }

        // a request from a node we do not know gets no response at all
        let Some(sender) = self.directory.find(&record.from_node) else {
            bail!(
                "request {} from unknown node {}",
                record.notification_id,
                record.from_node
            );
        };
        let Some(handler) = self.handlers.find(record.notification_type) else {
            bail!("no handler for {}", record.notification_type);
        };

        let ctx = HandlerContext {
            sender,
            services: self.services.clone(),
            logger: self.logger.clone(),
        };
        let outcome = match handler.handle(&ctx, record).await {
            Ok(value) => Outcome::Ok(value),
            Err(err) => Outcome::capture(Err(err)),
        };
        self.notify.respond(record, outcome).await?;
        Ok(())
    }
}
