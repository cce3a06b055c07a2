// Compute request handler

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::drivers::compute::FleetNode;
use crate::notify::handlers::{HandlerContext, NotificationHandler};
use crate::notify::payloads::ComputeDriverRequest;
use crate::notify::{NotificationRecord, NotificationType};

/// Serves every delegated compute operation against the local driver the
/// request's service id names.
pub struct ComputeDriverHandler;

fn required_node(request: ComputeDriverRequest, op: &str) -> Result<FleetNode> {
    request
        .node
        .ok_or_else(|| anyhow!("{op} request carries no node"))
}

#[async_trait]
impl NotificationHandler for ComputeDriverHandler {
    async fn handle(&self, ctx: &HandlerContext, record: &NotificationRecord) -> Result<Value> {
        let request: ComputeDriverRequest = record.payload()?;
        let driver = ctx.services.local_compute(&request.compute_service)?;
        ctx.logger.debug(format!(
            "serving {} for {} via service {}",
            record.notification_type, ctx.sender.node_id, request.compute_service
        ));

        use NotificationType::*;
        let value = match record.notification_type {
            ComputeDriverGetSizes => serde_json::to_value(driver.get_sizes().await?)?,
            ComputeDriverGetRegions => serde_json::to_value(driver.get_regions().await?)?,
            ComputeDriverGetOs => serde_json::to_value(driver.get_os().await?)?,
            ComputeDriverStart => {
                serde_json::to_value(driver.start(required_node(request, "start")?).await?)?
            }
            ComputeDriverCleanupStart => serde_json::to_value(
                driver
                    .cleanup_start(required_node(request, "cleanup_start")?)
                    .await?,
            )?,
            ComputeDriverStop => {
                serde_json::to_value(driver.stop(required_node(request, "stop")?).await?)?
            }
            ComputeDriverStatus => {
                serde_json::to_value(driver.status(required_node(request, "status")?).await?)?
            }
            other => bail!("compute handler cannot serve {other}"),
        };
        Ok(value)
    }
}
