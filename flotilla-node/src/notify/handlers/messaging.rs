// Messaging request handler

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::notify::handlers::{HandlerContext, NotificationHandler};
use crate::notify::payloads::MessagingDriverRequest;
use crate::notify::{NotificationRecord, NotificationType};

/// Serves the delegated auth/email/SMS send operations. All three request
/// types share the payload shape and the boolean accepted/rejected result.
pub struct MessagingDriverHandler;

#[async_trait]
impl NotificationHandler for MessagingDriverHandler {
    async fn handle(&self, ctx: &HandlerContext, record: &NotificationRecord) -> Result<Value> {
        use NotificationType::*;
        if !matches!(
            record.notification_type,
            EmailDriverSend | SmsDriverSend | AuthenticatorDriverSend
        ) {
            bail!("messaging handler cannot serve {}", record.notification_type);
        }
        let request: MessagingDriverRequest = record.payload()?;
        let driver = ctx.services.local_messaging(&request.messaging_service)?;
        ctx.logger.debug(format!(
            "serving {} for {} via service {}",
            record.notification_type, ctx.sender.node_id, request.messaging_service
        ));
        let accepted = driver
            .send(&request.account, &request.message, &request.contact)
            .await?;
        Ok(Value::Bool(accepted))
    }
}
