// DNS request handler

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::notify::handlers::{HandlerContext, NotificationHandler};
use crate::notify::payloads::DnsDriverRequest;
use crate::notify::{NotificationRecord, NotificationType};

/// Serves every delegated DNS operation against the local driver the
/// request's service id names.
pub struct DnsDriverHandler;

#[async_trait]
impl NotificationHandler for DnsDriverHandler {
    async fn handle(&self, ctx: &HandlerContext, record: &NotificationRecord) -> Result<Value> {
        let request: DnsDriverRequest = record.payload()?;
        let driver = ctx.services.local_dns(&request.dns_service)?;
        ctx.logger.debug(format!(
            "serving {} for {} via service {}",
            record.notification_type, ctx.sender.node_id, request.dns_service
        ));

        let missing = |field: &str| anyhow!("{} request carries no {field}", record.notification_type);

        use NotificationType::*;
        let value = match record.notification_type {
            DnsDriverCreate => {
                let domain = request.domain.ok_or_else(|| missing("domain"))?;
                serde_json::to_value(driver.create(&domain).await?)?
            }
            DnsDriverSetNetwork => {
                let network = request.network.ok_or_else(|| missing("network"))?;
                serde_json::to_value(driver.set_network(&network).await?)?
            }
            DnsDriverSetNode => {
                let node = request.node.ok_or_else(|| missing("node"))?;
                serde_json::to_value(driver.set_node(&node).await?)?
            }
            DnsDriverDeleteNode => {
                let node = request.node.ok_or_else(|| missing("node"))?;
                serde_json::to_value(driver.delete_node(&node).await?)?
            }
            DnsDriverUpdate => {
                let dns_record = request.record.ok_or_else(|| missing("record"))?;
                serde_json::to_value(driver.update(&dns_record).await?)?
            }
            DnsDriverRemove => {
                let dns_record = request.record.ok_or_else(|| missing("record"))?;
                serde_json::to_value(driver.remove(&dns_record).await?)?
            }
            DnsDriverList => {
                let matcher = request.matcher.unwrap_or_default();
                serde_json::to_value(driver.list(&matcher).await?)?
            }
            other => bail!("dns handler cannot serve {other}"),
        };
        Ok(value)
    }
}
