// Notification Module
//
// INTENTION:
// This module defines the durable envelope that carries delegated requests
// and responses between fleet nodes, and the services that turn the
// persisted, at-least-once notification channel into synchronous-looking
// remote calls.
//
// ARCHITECTURAL PRINCIPLES:
// 1. Durability precedes transport - a notification is never considered
//    sent unless it was durably recorded first
// 2. Correlation by id - a response reuses the request's notification id,
//    which is the only thing binding the two records together
// 3. Paired types - every request type declares its response type; the
//    pairing is part of the wire contract
// 4. Status is about dispatch, not about the operation - a failed driver
//    call still produces a Processed record; the failure travels in the
//    response payload

pub mod dispatch;
pub mod handlers;
pub mod payloads;
pub mod service;
pub mod store;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tag identifying the paired request/response shapes of a notification.
///
/// Request types know their paired response type; response types answer
/// `is_response()`. The enum is closed on purpose: handler resolution is a
/// total match, never a reflective lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    // delegated dns driver notifications
    DnsDriverCreate,
    DnsDriverUpdate,
    DnsDriverRemove,
    DnsDriverList,
    DnsDriverSetNetwork,
    DnsDriverSetNode,
    DnsDriverDeleteNode,
    DnsDriverResponse,

    // delegated compute driver notifications
    ComputeDriverGetSizes,
    ComputeDriverGetRegions,
    ComputeDriverGetOs,
    ComputeDriverStart,
    ComputeDriverCleanupStart,
    ComputeDriverStop,
    ComputeDriverStatus,
    ComputeDriverResponse,

    // delegated geo code driver notifications
    GeoCodeDriverGeocode,
    GeoCodeDriverResponse,

    // delegated geo location (ip lookup) driver notifications
    GeoLocationDriverGeolocate,
    GeoLocationDriverResponse,

    // delegated geo time driver notifications
    GeoTimeDriverGeotime,
    GeoTimeDriverResponse,

    // delegated messaging driver notifications
    EmailDriverSend,
    EmailDriverResponse,
    SmsDriverSend,
    SmsDriverResponse,
    AuthenticatorDriverSend,
    AuthenticatorDriverResponse,
}

impl NotificationType {
    /// The paired response type, if this is a request type.
    pub fn response_type(&self) -> Option<NotificationType> {
        use NotificationType::*;
        match self {
            DnsDriverCreate | DnsDriverUpdate | DnsDriverRemove | DnsDriverList
            | DnsDriverSetNetwork | DnsDriverSetNode | DnsDriverDeleteNode => {
                Some(DnsDriverResponse)
            }
            ComputeDriverGetSizes | ComputeDriverGetRegions | ComputeDriverGetOs
            | ComputeDriverStart | ComputeDriverCleanupStart | ComputeDriverStop
            | ComputeDriverStatus => Some(ComputeDriverResponse),
            GeoCodeDriverGeocode => Some(GeoCodeDriverResponse),
            GeoLocationDriverGeolocate => Some(GeoLocationDriverResponse),
            GeoTimeDriverGeotime => Some(GeoTimeDriverResponse),
            EmailDriverSend => Some(EmailDriverResponse),
            SmsDriverSend => Some(SmsDriverResponse),
            AuthenticatorDriverSend => Some(AuthenticatorDriverResponse),
            DnsDriverResponse | ComputeDriverResponse | GeoCodeDriverResponse
            | GeoLocationDriverResponse | GeoTimeDriverResponse | EmailDriverResponse
            | SmsDriverResponse | AuthenticatorDriverResponse => None,
        }
    }

    /// Whether this type tags the response half of an exchange.
    pub fn is_response(&self) -> bool {
        use NotificationType::*;
        matches!(
            self,
            DnsDriverResponse
                | ComputeDriverResponse
                | GeoCodeDriverResponse
                | GeoLocationDriverResponse
                | GeoTimeDriverResponse
                | EmailDriverResponse
                | SmsDriverResponse
                | AuthenticatorDriverResponse
        )
    }

    /// Stable wire/storage name for this type.
    pub fn as_str(&self) -> &'static str {
        use NotificationType::*;
        match self {
            DnsDriverCreate => "dns_driver_create",
            DnsDriverUpdate => "dns_driver_update",
            DnsDriverRemove => "dns_driver_remove",
            DnsDriverList => "dns_driver_list",
            DnsDriverSetNetwork => "dns_driver_set_network",
            DnsDriverSetNode => "dns_driver_set_node",
            DnsDriverDeleteNode => "dns_driver_delete_node",
            DnsDriverResponse => "dns_driver_response",
            ComputeDriverGetSizes => "compute_driver_get_sizes",
            ComputeDriverGetRegions => "compute_driver_get_regions",
            ComputeDriverGetOs => "compute_driver_get_os",
            ComputeDriverStart => "compute_driver_start",
            ComputeDriverCleanupStart => "compute_driver_cleanup_start",
            ComputeDriverStop => "compute_driver_stop",
            ComputeDriverStatus => "compute_driver_status",
            ComputeDriverResponse => "compute_driver_response",
            GeoCodeDriverGeocode => "geo_code_driver_geocode",
            GeoCodeDriverResponse => "geo_code_driver_response",
            GeoLocationDriverGeolocate => "geo_location_driver_geolocate",
            GeoLocationDriverResponse => "geo_location_driver_response",
            GeoTimeDriverGeotime => "geo_time_driver_geotime",
            GeoTimeDriverResponse => "geo_time_driver_response",
            EmailDriverSend => "email_driver_send",
            EmailDriverResponse => "email_driver_response",
            SmsDriverSend => "sms_driver_send",
            SmsDriverResponse => "sms_driver_response",
            AuthenticatorDriverSend => "authenticator_driver_send",
            AuthenticatorDriverResponse => "authenticator_driver_response",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        use NotificationType::*;
        Ok(match s {
            "dns_driver_create" => DnsDriverCreate,
            "dns_driver_update" => DnsDriverUpdate,
            "dns_driver_remove" => DnsDriverRemove,
            "dns_driver_list" => DnsDriverList,
            "dns_driver_set_network" => DnsDriverSetNetwork,
            "dns_driver_set_node" => DnsDriverSetNode,
            "dns_driver_delete_node" => DnsDriverDeleteNode,
            "dns_driver_response" => DnsDriverResponse,
            "compute_driver_get_sizes" => ComputeDriverGetSizes,
            "compute_driver_get_regions" => ComputeDriverGetRegions,
            "compute_driver_get_os" => ComputeDriverGetOs,
            "compute_driver_start" => ComputeDriverStart,
            "compute_driver_cleanup_start" => ComputeDriverCleanupStart,
            "compute_driver_stop" => ComputeDriverStop,
            "compute_driver_status" => ComputeDriverStatus,
            "compute_driver_response" => ComputeDriverResponse,
            "geo_code_driver_geocode" => GeoCodeDriverGeocode,
            "geo_code_driver_response" => GeoCodeDriverResponse,
            "geo_location_driver_geolocate" => GeoLocationDriverGeolocate,
            "geo_location_driver_response" => GeoLocationDriverResponse,
            "geo_time_driver_geotime" => GeoTimeDriverGeotime,
            "geo_time_driver_response" => GeoTimeDriverResponse,
            "email_driver_send" => EmailDriverSend,
            "email_driver_response" => EmailDriverResponse,
            "sms_driver_send" => SmsDriverSend,
            "sms_driver_response" => SmsDriverResponse,
            "authenticator_driver_send" => AuthenticatorDriverSend,
            "authenticator_driver_response" => AuthenticatorDriverResponse,
            other => return Err(anyhow!("unknown notification type: {other}")),
        })
    }
}

/// Processing status of a received notification.
///
/// Transitions are monotonic: Received -> Processing -> Processed | Failed.
/// Only Received records are dispatch-eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Received,
    Processing,
    Processed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Received => "received",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Processed => "processed",
            ProcessingStatus::Failed => "failed",
        }
    }

    /// Ordering rank used to reject regressing transitions.
    pub fn rank(&self) -> u8 {
        match self {
            ProcessingStatus::Received => 0,
            ProcessingStatus::Processing => 1,
            ProcessingStatus::Processed => 2,
            ProcessingStatus::Failed => 2,
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "received" => ProcessingStatus::Received,
            "processing" => ProcessingStatus::Processing,
            "processed" => ProcessingStatus::Processed,
            "failed" => ProcessingStatus::Failed,
            other => return Err(anyhow!("unknown processing status: {other}")),
        })
    }
}

/// Send status of an originated notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Created,
    Sending,
    Sent,
    Error,
}

impl SendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendStatus::Created => "created",
            SendStatus::Sending => "sending",
            SendStatus::Sent => "sent",
            SendStatus::Error => "error",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            SendStatus::Created => 0,
            SendStatus::Sending => 1,
            SendStatus::Sent => 2,
            SendStatus::Error => 2,
        }
    }
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SendStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "created" => SendStatus::Created,
            "sending" => SendStatus::Sending,
            "sent" => SendStatus::Sent,
            "error" => SendStatus::Error,
            other => return Err(anyhow!("unknown send status: {other}")),
        })
    }
}

/// Durable envelope for one request or response exchanged between nodes.
///
/// The `notification_id` is the opaque correlation key: a response record
/// carries the same id as the request it answers, with the direction
/// reversed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub notification_id: String,
    pub from_node: String,
    pub to_node: String,
    pub account: String,
    pub notification_type: NotificationType,
    pub payload_json: String,
    pub created_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn new(
        notification_id: impl Into<String>,
        from_node: impl Into<String>,
        to_node: impl Into<String>,
        account: impl Into<String>,
        notification_type: NotificationType,
        payload_json: impl Into<String>,
    ) -> Self {
        Self {
            notification_id: notification_id.into(),
            from_node: from_node.into(),
            to_node: to_node.into(),
            account: account.into(),
            notification_type,
            payload_json: payload_json.into(),
            created_at: Utc::now(),
        }
    }

    /// Build the response record for this request: same notification id,
    /// reversed direction, paired response type.
    pub fn response(&self, response_type: NotificationType, payload_json: String) -> Self {
        Self {
            notification_id: self.notification_id.clone(),
            from_node: self.to_node.clone(),
            to_node: self.from_node.clone(),
            account: self.account.clone(),
            notification_type: response_type,
            payload_json,
            created_at: Utc::now(),
        }
    }

    /// Deserialize the payload into the request or response shape this
    /// record's type declares.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.payload_json).with_context(|| {
            format!(
                "invalid {} payload for notification {}",
                self.notification_type, self.notification_id
            )
        })
    }
}

/// A notification originated by this node, as persisted in the Sent stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentNotification {
    /// Storage identity of this row, distinct from the correlation id
    pub record_id: String,
    pub status: SendStatus,
    pub record: NotificationRecord,
}

/// A notification received by this node, as persisted in the Received stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedNotification {
    /// Storage identity of this row, distinct from the correlation id
    pub record_id: String,
    pub status: ProcessingStatus,
    pub error: Option<String>,
    pub record: NotificationRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_types_pair_with_their_response_type() {
        assert_eq!(
            NotificationType::ComputeDriverStart.response_type(),
            Some(NotificationType::ComputeDriverResponse)
        );
        assert_eq!(
            NotificationType::DnsDriverList.response_type(),
            Some(NotificationType::DnsDriverResponse)
        );
        assert_eq!(
            NotificationType::GeoLocationDriverGeolocate.response_type(),
            Some(NotificationType::GeoLocationDriverResponse)
        );
        assert_eq!(NotificationType::ComputeDriverResponse.response_type(), None);
        assert!(NotificationType::GeoCodeDriverResponse.is_response());
        assert!(!NotificationType::GeoCodeDriverGeocode.is_response());
    }

    #[test]
    fn type_names_round_trip() {
        let all = [
            NotificationType::DnsDriverCreate,
            NotificationType::ComputeDriverCleanupStart,
            NotificationType::GeoLocationDriverGeolocate,
            NotificationType::GeoTimeDriverGeotime,
            NotificationType::AuthenticatorDriverSend,
        ];
        for ty in all {
            assert_eq!(ty.as_str().parse::<NotificationType>().unwrap(), ty);
        }
    }

    #[test]
    fn response_reverses_direction_and_keeps_id() {
        let request = NotificationRecord::new(
            "n-1",
            "node-a",
            "node-b",
            "acct",
            NotificationType::ComputeDriverStatus,
            "{}",
        );
        let response = request.response(NotificationType::ComputeDriverResponse, "{}".to_string());
        assert_eq!(response.notification_id, "n-1");
        assert_eq!(response.from_node, "node-b");
        assert_eq!(response.to_node, "node-a");
    }
}
