// Messaging driver contract and domain types
//
// Email, SMS, and authenticator delivery share one contract: render
// happens upstream, the driver only moves a rendered message to a contact
// and reports whether it went out.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A fully rendered message, ready for a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub subject: Option<String>,
    pub body: String,
}

impl RenderedMessage {
    pub fn new(subject: Option<String>, body: impl Into<String>) -> Self {
        Self {
            subject,
            body: body.into(),
        }
    }
}

/// Messaging capability contract, shared by auth/email/SMS gateways.
#[async_trait]
pub trait MessagingDriver: Send + Sync {
    /// Deliver `message` to `contact` on behalf of `account`. Returns
    /// whether the gateway accepted the message.
    async fn send(&self, account: &str, message: &RenderedMessage, contact: &str) -> Result<bool>;
}
