// Node configuration

use std::fmt;
use std::time::Duration;

use flotilla_common::logging::LoggingConfig;

use crate::drivers::delegate::REGION_CACHE_TTL;
use crate::notify::service::DEFAULT_SYNC_TIMEOUT;

/// Configuration for a fleet node.
#[derive(Clone)]
pub struct NodeConfig {
    /// Stable identity of this node in the fleet
    pub node_id: String,
    /// Account every notification from this node is attributed to
    pub account: String,
    /// Address peers reach this node at
    pub address: String,
    /// Deadline for synchronous delegated calls
    pub sync_timeout: Duration,
    /// How long delegated region catalogs stay cached on this node
    pub region_cache_ttl: Duration,
    /// Logging configuration, applied at node creation when present
    pub logging_config: Option<LoggingConfig>,
}

impl NodeConfig {
    pub fn new(
        node_id: impl Into<String>,
        account: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            account: account.into(),
            address: address.into(),
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            region_cache_ttl: REGION_CACHE_TTL,
            logging_config: None,
        }
    }

    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    pub fn with_region_cache_ttl(mut self, ttl: Duration) -> Self {
        self.region_cache_ttl = ttl;
        self
    }

    pub fn with_logging_config(mut self, config: LoggingConfig) -> Self {
        self.logging_config = Some(config);
        self
    }
}

impl fmt::Display for NodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NodeConfig(node_id={}, account={}, address={}, sync_timeout={:?})",
            self.node_id, self.account, self.address, self.sync_timeout
        )
    }
}
