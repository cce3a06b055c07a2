// Registry Module
//
// INTENTION:
// Track the two lookup tables every node needs for delegation: the
// directory of peer nodes it may exchange notifications with, and the
// catalog of cloud services it hosts, each service either backed by a
// local credential-holding driver or marked as delegating to a peer.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::drivers::{
    ComputeDriver, DnsDriver, GeoCodeDriver, GeoLocationDriver, GeoTimeDriver, MessagingDriver,
};
use crate::error::DelegationError;

/// Identity and address of a fleet node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: String,
    pub account: String,
    pub address: String,
}

impl NodeInfo {
    pub fn new(
        node_id: impl Into<String>,
        account: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            account: account.into(),
            address: address.into(),
        }
    }
}

/// Directory of peer nodes, keyed by node id.
#[derive(Default)]
pub struct NodeDirectory {
    nodes: DashMap<String, NodeInfo>,
}

impl NodeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a peer entry.
    pub fn register(&self, info: NodeInfo) {
        self.nodes.insert(info.node_id.clone(), info);
    }

    pub fn find(&self, node_id: &str) -> Option<NodeInfo> {
        self.nodes.get(node_id).map(|entry| entry.value().clone())
    }

    /// Find a peer or fail with a configuration error.
    pub fn require(&self, node_id: &str) -> Result<NodeInfo, DelegationError> {
        self.find(node_id)
            .ok_or_else(|| DelegationError::Config(format!("unknown node: {node_id}")))
    }
}

/// The capability a cloud service provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Compute,
    Dns,
    GeoCode,
    GeoLocation,
    GeoTime,
    Email,
    Sms,
    Authenticator,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Compute => "compute",
            ServiceType::Dns => "dns",
            ServiceType::GeoCode => "geo_code",
            ServiceType::GeoLocation => "geo_location",
            ServiceType::GeoTime => "geo_time",
            ServiceType::Email => "email",
            ServiceType::Sms => "sms",
            ServiceType::Authenticator => "authenticator",
        }
    }
}

/// The driver behind a registered cloud service.
///
/// One variant per capability contract; the registry accessors unwrap the
/// matching variant and reject a mismatched one as a configuration error.
#[derive(Clone)]
pub enum DriverInstance {
    Compute(Arc<dyn ComputeDriver>),
    Dns(Arc<dyn DnsDriver>),
    GeoCode(Arc<dyn GeoCodeDriver>),
    GeoLocation(Arc<dyn GeoLocationDriver>),
    GeoTime(Arc<dyn GeoTimeDriver>),
    Messaging(Arc<dyn MessagingDriver>),
}

impl DriverInstance {
    fn kind(&self) -> &'static str {
        match self {
            DriverInstance::Compute(_) => "compute",
            DriverInstance::Dns(_) => "dns",
            DriverInstance::GeoCode(_) => "geo_code",
            DriverInstance::GeoLocation(_) => "geo_location",
            DriverInstance::GeoTime(_) => "geo_time",
            DriverInstance::Messaging(_) => "messaging",
        }
    }
}

/// A cloud service hosted (or fronted) by this node.
#[derive(Clone)]
pub struct CloudService {
    pub service_id: String,
    pub service_type: ServiceType,
    /// Peer node holding the real credentials, when this entry delegates.
    pub delegate: Option<String>,
    pub driver: DriverInstance,
}

impl CloudService {
    pub fn local(
        service_id: impl Into<String>,
        service_type: ServiceType,
        driver: DriverInstance,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            service_type,
            delegate: None,
            driver,
        }
    }

    pub fn delegated(
        service_id: impl Into<String>,
        service_type: ServiceType,
        delegate_node: impl Into<String>,
        driver: DriverInstance,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            service_type,
            delegate: Some(delegate_node.into()),
            driver,
        }
    }
}

/// Catalog of cloud services on one node, keyed by service id.
#[derive(Default)]
pub struct CloudServiceRegistry {
    services: DashMap<String, CloudService>,
}

impl CloudServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service. A duplicate id is a configuration error, not a
    /// silent replacement.
    pub fn register(&self, service: CloudService) -> Result<(), DelegationError> {
        match self.services.entry(service.service_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(DelegationError::Config(format!(
                "service already registered: {}",
                service.service_id
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(service);
                Ok(())
            }
        }
    }

    pub fn find(&self, service_id: &str) -> Option<CloudService> {
        self.services
            .get(service_id)
            .map(|entry| entry.value().clone())
    }

    pub fn require(&self, service_id: &str) -> Result<CloudService, DelegationError> {
        self.find(service_id)
            .ok_or_else(|| DelegationError::Config(format!("unknown service: {service_id}")))
    }

    /// Resolve a service that must execute locally. A delegating entry here
    /// means two nodes point at each other, which would loop forever.
    fn require_local(&self, service_id: &str) -> Result<CloudService, DelegationError> {
        let service = self.require(service_id)?;
        if let Some(delegate) = &service.delegate {
            return Err(DelegationError::Config(format!(
                "service {service_id} delegates to {delegate}; refusing to relay a delegated call"
            )));
        }
        Ok(service)
    }

    pub fn local_compute(&self, service_id: &str) -> Result<Arc<dyn ComputeDriver>, DelegationError> {
        match self.require_local(service_id)?.driver {
            DriverInstance::Compute(driver) => Ok(driver),
            other => Err(Self::wrong_driver(service_id, "compute", other.kind())),
        }
    }

    pub fn local_dns(&self, service_id: &str) -> Result<Arc<dyn DnsDriver>, DelegationError> {
        match self.require_local(service_id)?.driver {
            DriverInstance::Dns(driver) => Ok(driver),
            other => Err(Self::wrong_driver(service_id, "dns", other.kind())),
        }
    }

    pub fn local_geo_code(
        &self,
        service_id: &str,
    ) -> Result<Arc<dyn GeoCodeDriver>, DelegationError> {
        match self.require_local(service_id)?.driver {
            DriverInstance::GeoCode(driver) => Ok(driver),
            other => Err(Self::wrong_driver(service_id, "geo_code", other.kind())),
        }
    }

    pub fn local_geo_location(
        &self,
        service_id: &str,
    ) -> Result<Arc<dyn GeoLocationDriver>, DelegationError> {
        match self.require_local(service_id)?.driver {
            DriverInstance::GeoLocation(driver) => Ok(driver),
            other => Err(Self::wrong_driver(service_id, "geo_location", other.kind())),
        }
    }

    pub fn local_geo_time(
        &self,
        service_id: &str,
    ) -> Result<Arc<dyn GeoTimeDriver>, DelegationError> {
        match self.require_local(service_id)?.driver {
            DriverInstance::GeoTime(driver) => Ok(driver),
            other => Err(Self::wrong_driver(service_id, "geo_time", other.kind())),
        }
    }

    pub fn local_messaging(
        &self,
        service_id: &str,
    ) -> Result<Arc<dyn MessagingDriver>, DelegationError> {
        match self.require_local(service_id)?.driver {
            DriverInstance::Messaging(driver) => Ok(driver),
            other => Err(Self::wrong_driver(service_id, "messaging", other.kind())),
        }
    }

    fn wrong_driver(service_id: &str, wanted: &str, found: &str) -> DelegationError {
        DelegationError::Config(format!(
            "service {service_id} holds a {found} driver, expected {wanted}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{GeoCodeResult, GeoLocation};
    use anyhow::Result;
    use async_trait::async_trait;

    struct FixedGeo;

    #[async_trait]
    impl GeoCodeDriver for FixedGeo {
        async fn lookup(&self, _location: &GeoLocation) -> Result<GeoCodeResult> {
            Ok(GeoCodeResult {
                lat: "0".into(),
                lon: "0".into(),
            })
        }
    }

    #[test]
    fn duplicate_service_id_is_rejected() {
        let registry = CloudServiceRegistry::new();
        let service = || {
            CloudService::local(
                "geo-1",
                ServiceType::GeoCode,
                DriverInstance::GeoCode(Arc::new(FixedGeo)),
            )
        };
        registry.register(service()).unwrap();
        assert!(matches!(
            registry.register(service()),
            Err(DelegationError::Config(_))
        ));
    }

    #[test]
    fn delegating_entry_is_not_served_locally() {
        let registry = CloudServiceRegistry::new();
        registry
            .register(CloudService::delegated(
                "geo-1",
                ServiceType::GeoCode,
                "node-b",
                DriverInstance::GeoCode(Arc::new(FixedGeo)),
            ))
            .unwrap();
        assert!(matches!(
            registry.local_geo_code("geo-1"),
            Err(DelegationError::Config(_))
        ));
    }

    #[test]
    fn wrong_driver_kind_is_a_config_error() {
        let registry = CloudServiceRegistry::new();
        registry
            .register(CloudService::local(
                "geo-1",
                ServiceType::GeoCode,
                DriverInstance::GeoCode(Arc::new(FixedGeo)),
            ))
            .unwrap();
        assert!(matches!(
            registry.local_compute("geo-1"),
            Err(DelegationError::Config(_))
        ));
    }

    #[test]
    fn directory_require_reports_unknown_nodes() {
        let directory = NodeDirectory::new();
        directory.register(NodeInfo::new("node-a", "acct", "127.0.0.1:0"));
        assert!(directory.find("node-a").is_some());
        assert!(matches!(
            directory.require("node-z"),
            Err(DelegationError::Config(_))
        ));
    }
}
