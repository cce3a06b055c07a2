// Compute driver contract and domain types

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::drivers::geo::GeoPoint;

/// Lifecycle state of a fleet node as reported by a compute provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Starting,
    Running,
    Stopping,
    Stopped,
    Unreachable,
}

/// A managed fleet node: the unit the compute lifecycle operates on.
///
/// `ip4`/`ip6` are assigned by the provider when the node starts; a node
/// returned by `start` carries the addresses the provider handed out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetNode {
    pub node_id: String,
    pub name: String,
    pub fqdn: String,
    pub region: String,
    pub size: String,
    pub ip4: Option<String>,
    pub ip6: Option<String>,
    pub state: NodeState,
}

impl FleetNode {
    pub fn new(
        node_id: impl Into<String>,
        name: impl Into<String>,
        fqdn: impl Into<String>,
        region: impl Into<String>,
        size: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            name: name.into(),
            fqdn: fqdn.into(),
            region: region.into(),
            size: size.into(),
            ip4: None,
            ip6: None,
            state: NodeState::Pending,
        }
    }

    pub fn has_addresses(&self) -> bool {
        self.ip4.is_some() || self.ip6.is_some()
    }
}

/// A node size offered by a compute provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeNodeSize {
    pub name: String,
    pub internal_name: String,
    pub vcpu: u32,
    pub memory_mb: u32,
    pub disk_gb: u32,
}

/// A region offered by a compute provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudRegion {
    pub name: String,
    pub internal_name: String,
    pub location: GeoPoint,
}

/// An operating-system image offered by a compute provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsImage {
    pub name: String,
    pub image_id: String,
}

/// Compute capability contract.
///
/// Implemented by real provider drivers on the node holding the provider
/// credentials, and by `DelegatedComputeDriver` everywhere else.
#[async_trait]
pub trait ComputeDriver: Send + Sync {
    async fn get_sizes(&self) -> Result<Vec<ComputeNodeSize>>;

    async fn get_regions(&self) -> Result<Vec<CloudRegion>>;

    async fn get_os(&self) -> Result<OsImage>;

    /// Provision and boot a node; the returned node carries the addresses
    /// the provider assigned.
    async fn start(&self, node: FleetNode) -> Result<FleetNode>;

    /// Remove any half-created remnants of a failed start before retrying.
    async fn cleanup_start(&self, node: FleetNode) -> Result<FleetNode>;

    async fn stop(&self, node: FleetNode) -> Result<FleetNode>;

    async fn status(&self, node: FleetNode) -> Result<FleetNode>;
}
