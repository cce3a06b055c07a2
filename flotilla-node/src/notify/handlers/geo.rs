// Geo request handlers

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::notify::handlers::{HandlerContext, NotificationHandler};
use crate::notify::payloads::{
    GeoCodeDriverRequest, GeoLocationDriverRequest, GeoTimeDriverRequest,
};
use crate::notify::{NotificationRecord, NotificationType};

/// Serves delegated geocode lookups against the local geocode driver.
pub struct GeoCodeDriverHandler;

#[async_trait]
impl NotificationHandler for GeoCodeDriverHandler {
    async fn handle(&self, ctx: &HandlerContext, record: &NotificationRecord) -> Result<Value> {
        if record.notification_type != NotificationType::GeoCodeDriverGeocode {
            bail!("geocode handler cannot serve {}", record.notification_type);
        }
        let request: GeoCodeDriverRequest = record.payload()?;
        let driver = ctx.services.local_geo_code(&request.geo_service)?;
        let result = driver.lookup(&request.location).await?;
        Ok(serde_json::to_value(result)?)
    }
}

/// Serves delegated geo-IP lookups against the local geo-IP driver.
pub struct GeoLocationDriverHandler;

#[async_trait]
impl NotificationHandler for GeoLocationDriverHandler {
    async fn handle(&self, ctx: &HandlerContext, record: &NotificationRecord) -> Result<Value> {
        if record.notification_type != NotificationType::GeoLocationDriverGeolocate {
            bail!("geo-ip handler cannot serve {}", record.notification_type);
        }
        let request: GeoLocationDriverRequest = record.payload()?;
        let driver = ctx.services.local_geo_location(&request.geo_service)?;
        let location = driver.locate(&request.ip).await?;
        Ok(serde_json::to_value(location)?)
    }
}

/// Serves delegated timezone lookups against the local timezone driver.
pub struct GeoTimeDriverHandler;

#[async_trait]
impl NotificationHandler for GeoTimeDriverHandler {
    async fn handle(&self, ctx: &HandlerContext, record: &NotificationRecord) -> Result<Value> {
        if record.notification_type != NotificationType::GeoTimeDriverGeotime {
            bail!("timezone handler cannot serve {}", record.notification_type);
        }
        let request: GeoTimeDriverRequest = record.payload()?;
        let driver = ctx.services.local_geo_time(&request.geo_service)?;
        let zone = driver.timezone(&request.lat, &request.lon).await?;
        Ok(serde_json::to_value(zone)?)
    }
}
