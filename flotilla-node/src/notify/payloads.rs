// Typed payloads for delegated driver notifications
//
// Each capability domain has one request shape. The service id embedded in
// the payload names the cloud service that terminates the call on the
// target node; handlers resolve the real driver by that id, never by node
// identity.

use serde::{Deserialize, Serialize};

use crate::drivers::compute::FleetNode;
use crate::drivers::dns::{DnsRecord, DnsRecordMatch, DomainInfo, NetworkInfo};
use crate::drivers::geo::GeoLocation;
use crate::drivers::messaging::RenderedMessage;

/// Request payload for all delegated compute operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeDriverRequest {
    /// Cloud service id of the real compute driver on the delegate
    pub compute_service: String,
    /// Node argument for lifecycle operations; None for enumerations
    pub node: Option<FleetNode>,
}

impl ComputeDriverRequest {
    pub fn new(compute_service: impl Into<String>, node: Option<FleetNode>) -> Self {
        Self {
            compute_service: compute_service.into(),
            node,
        }
    }
}

/// Request payload for all delegated DNS operations.
///
/// Exactly one of the argument fields is set, matching the operation tagged
/// by the notification type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DnsDriverRequest {
    /// Cloud service id of the real DNS driver on the delegate
    pub dns_service: String,
    pub domain: Option<DomainInfo>,
    pub network: Option<NetworkInfo>,
    pub node: Option<FleetNode>,
    pub record: Option<DnsRecord>,
    pub matcher: Option<DnsRecordMatch>,
}

impl DnsDriverRequest {
    pub fn new(dns_service: impl Into<String>) -> Self {
        Self {
            dns_service: dns_service.into(),
            ..Self::default()
        }
    }

    pub fn with_domain(mut self, domain: DomainInfo) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn with_network(mut self, network: NetworkInfo) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_node(mut self, node: FleetNode) -> Self {
        self.node = Some(node);
        self
    }

    pub fn with_record(mut self, record: DnsRecord) -> Self {
        self.record = Some(record);
        self
    }

    pub fn with_matcher(mut self, matcher: DnsRecordMatch) -> Self {
        self.matcher = Some(matcher);
        self
    }
}

/// Request payload for a delegated geocode lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoCodeDriverRequest {
    /// Cloud service id of the real geocode driver on the delegate
    pub geo_service: String,
    pub location: GeoLocation,
}

/// Request payload for a delegated geo-IP lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocationDriverRequest {
    /// Cloud service id of the real geo-IP driver on the delegate
    pub geo_service: String,
    pub ip: String,
}

/// Request payload for a delegated timezone lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoTimeDriverRequest {
    /// Cloud service id of the real timezone driver on the delegate
    pub geo_service: String,
    pub lat: String,
    pub lon: String,
}

/// Request payload shared by the delegated auth/email/SMS senders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagingDriverRequest {
    /// Cloud service id of the real messaging driver on the delegate
    pub messaging_service: String,
    pub account: String,
    pub message: RenderedMessage,
    pub contact: String,
}
