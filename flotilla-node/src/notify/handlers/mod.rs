// Notification Handlers Module
//
// INTENTION:
// One handler per request notification type, resolved from a closed
// registry by the dispatcher. A handler parses the typed request payload,
// resolves the local driver by the service id the payload names, executes
// the operation, and returns the raw success value; capturing failures
// into the response outcome is the dispatcher's job, so a handler error
// still produces a response for the caller.

pub mod compute;
pub mod dns;
pub mod geo;
pub mod messaging;

pub use compute::ComputeDriverHandler;
pub use dns::DnsDriverHandler;
pub use geo::{GeoCodeDriverHandler, GeoLocationDriverHandler, GeoTimeDriverHandler};
pub use messaging::MessagingDriverHandler;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

use flotilla_common::logging::Logger;

use crate::error::DelegationError;
use crate::notify::{NotificationRecord, NotificationType};
use crate::registry::{CloudServiceRegistry, NodeInfo};

/// What a handler sees about the exchange it is serving.
pub struct HandlerContext {
    /// The peer the request came from, already directory-verified
    pub sender: NodeInfo,
    pub services: Arc<CloudServiceRegistry>,
    pub logger: Arc<Logger>,
}

/// Executes one request notification type against a local driver.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, ctx: &HandlerContext, record: &NotificationRecord) -> Result<Value>;
}

/// Handlers keyed by the request type they serve.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<NotificationType, Arc<dyn NotificationHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a request type. Response types carry no
    /// handler, and a type can only be claimed once.
    pub fn register(
        &self,
        notification_type: NotificationType,
        handler: Arc<dyn NotificationHandler>,
    ) -> Result<(), DelegationError> {
        if notification_type.is_response() {
            return Err(DelegationError::Config(format!(
                "{notification_type} is a response type and takes no handler"
            )));
        }
        match self.handlers.entry(notification_type) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(DelegationError::Config(format!(
                "handler already registered for {notification_type}"
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(handler);
                Ok(())
            }
        }
    }

    pub fn find(&self, notification_type: NotificationType) -> Option<Arc<dyn NotificationHandler>> {
        self.handlers
            .get(&notification_type)
            .map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    #[async_trait]
    impl NotificationHandler for Nop {
        async fn handle(
            &self,
            _ctx: &HandlerContext,
            _record: &NotificationRecord,
        ) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn response_types_take_no_handler() {
        let registry = HandlerRegistry::new();
        assert!(matches!(
            registry.register(NotificationType::ComputeDriverResponse, Arc::new(Nop)),
            Err(DelegationError::Config(_))
        ));
    }

    #[test]
    fn a_type_is_claimed_once() {
        let registry = HandlerRegistry::new();
        registry
            .register(NotificationType::ComputeDriverStart, Arc::new(Nop))
            .unwrap();
        assert!(registry
            .register(NotificationType::ComputeDriverStart, Arc::new(Nop))
            .is_err());
        assert!(registry.find(NotificationType::ComputeDriverStart).is_some());
        assert!(registry.find(NotificationType::ComputeDriverStop).is_none());
    }
}
