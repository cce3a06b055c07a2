// DNS driver contract and domain types

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::drivers::compute::FleetNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsType {
    A,
    Aaaa,
    Cname,
    Txt,
    Ns,
    Soa,
}

/// One DNS record as the provider sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub rtype: DnsType,
    pub fqdn: String,
    pub value: String,
    pub ttl: u32,
}

impl DnsRecord {
    pub fn new(rtype: DnsType, fqdn: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            rtype,
            fqdn: fqdn.into(),
            value: value.into(),
            ttl: 3600,
        }
    }
}

/// Match criteria for listing records. Unset fields match anything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DnsRecordMatch {
    pub rtype: Option<DnsType>,
    pub fqdn: Option<String>,
    pub subdomain: Option<String>,
}

impl DnsRecordMatch {
    pub fn matches(&self, record: &DnsRecord) -> bool {
        if let Some(rtype) = self.rtype {
            if record.rtype != rtype {
                return false;
            }
        }
        if let Some(fqdn) = &self.fqdn {
            if !record.fqdn.eq_ignore_ascii_case(fqdn) {
                return false;
            }
        }
        if let Some(subdomain) = &self.subdomain {
            let suffix = format!(".{subdomain}");
            if !record.fqdn.eq_ignore_ascii_case(subdomain)
                && !record.fqdn.to_ascii_lowercase().ends_with(&suffix.to_ascii_lowercase())
            {
                return false;
            }
        }
        true
    }
}

/// A domain managed by the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainInfo {
    pub name: String,
}

/// A fleet network living under a managed domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub name: String,
    pub domain: String,
}

impl NetworkInfo {
    pub fn fqdn(&self) -> String {
        format!("{}.{}", self.name, self.domain)
    }
}

/// DNS capability contract.
#[async_trait]
pub trait DnsDriver: Send + Sync {
    /// Create the base records for a newly managed domain.
    async fn create(&self, domain: &DomainInfo) -> Result<Vec<DnsRecord>>;

    /// Write the delegation records for a network under its domain.
    async fn set_network(&self, network: &NetworkInfo) -> Result<Vec<DnsRecord>>;

    /// Write the address records for a node under its fqdn.
    async fn set_node(&self, node: &FleetNode) -> Result<Vec<DnsRecord>>;

    /// Remove the address records for a node.
    async fn delete_node(&self, node: &FleetNode) -> Result<Vec<DnsRecord>>;

    async fn update(&self, record: &DnsRecord) -> Result<DnsRecord>;

    async fn remove(&self, record: &DnsRecord) -> Result<DnsRecord>;

    async fn list(&self, matcher: &DnsRecordMatch) -> Result<Vec<DnsRecord>>;
}
