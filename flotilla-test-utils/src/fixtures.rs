// Mock drivers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use flotilla_node::drivers::{
    CloudRegion, ComputeDriver, ComputeNodeSize, DnsDriver, DnsRecord, DnsRecordMatch, DnsType,
    DomainInfo, FleetNode, GeoCodeDriver, GeoCodeResult, GeoLocation, GeoLocationDriver, GeoPoint,
    GeoTimeDriver, GeoTimeZone, MessagingDriver, NetworkInfo, NodeState, OsImage, RenderedMessage,
};

/// Compute driver that "provisions" instantly: `start` hands out the
/// loopback addresses and reports the node running.
#[derive(Default)]
pub struct MockComputeDriver {
    pub region_calls: AtomicUsize,
}

impl MockComputeDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ComputeDriver for MockComputeDriver {
    async fn get_sizes(&self) -> Result<Vec<ComputeNodeSize>> {
        Ok(vec![
            ComputeNodeSize {
                name: "small".into(),
                internal_name: "s-1vcpu-1gb".into(),
                vcpu: 1,
                memory_mb: 1024,
                disk_gb: 25,
            },
            ComputeNodeSize {
                name: "medium".into(),
                internal_name: "s-2vcpu-4gb".into(),
                vcpu: 2,
                memory_mb: 4096,
                disk_gb: 80,
            },
        ])
    }

    async fn get_regions(&self) -> Result<Vec<CloudRegion>> {
        self.region_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            CloudRegion {
                name: "New York 1".into(),
                internal_name: "nyc1".into(),
                location: GeoPoint::new("40.7128", "-74.0060"),
            },
            CloudRegion {
                name: "Amsterdam 3".into(),
                internal_name: "ams3".into(),
                location: GeoPoint::new("52.3676", "4.9041"),
            },
        ])
    }

    async fn get_os(&self) -> Result<OsImage> {
        Ok(OsImage {
            name: "ubuntu-22-04".into(),
            image_id: "img-1234".into(),
        })
    }

    async fn start(&self, mut node: FleetNode) -> Result<FleetNode> {
        node.ip4 = Some("127.0.0.1".to_string());
        node.ip6 = Some("::1".to_string());
        node.state = NodeState::Running;
        Ok(node)
    }

    async fn cleanup_start(&self, mut node: FleetNode) -> Result<FleetNode> {
        node.ip4 = None;
        node.ip6 = None;
        node.state = NodeState::Pending;
        Ok(node)
    }

    async fn stop(&self, mut node: FleetNode) -> Result<FleetNode> {
        node.ip4 = None;
        node.ip6 = None;
        node.state = NodeState::Stopped;
        Ok(node)
    }

    async fn status(&self, node: FleetNode) -> Result<FleetNode> {
        Ok(node)
    }
}

/// Compute driver whose every operation fails with the given message.
pub struct FailingComputeDriver {
    pub message: String,
}

impl FailingComputeDriver {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn fail<T>(&self) -> Result<T> {
        Err(anyhow!("{}", self.message))
    }
}

#[async_trait]
impl ComputeDriver for FailingComputeDriver {
    async fn get_sizes(&self) -> Result<Vec<ComputeNodeSize>> {
        self.fail()
    }

    async fn get_regions(&self) -> Result<Vec<CloudRegion>> {
        self.fail()
    }

    async fn get_os(&self) -> Result<OsImage> {
        self.fail()
    }

    async fn start(&self, _node: FleetNode) -> Result<FleetNode> {
        self.fail()
    }

    async fn cleanup_start(&self, _node: FleetNode) -> Result<FleetNode> {
        self.fail()
    }

    async fn stop(&self, _node: FleetNode) -> Result<FleetNode> {
        self.fail()
    }

    async fn status(&self, _node: FleetNode) -> Result<FleetNode> {
        self.fail()
    }
}

/// Compute driver that sleeps before answering, for deadline tests.
pub struct SlowComputeDriver {
    pub delay: Duration,
    inner: MockComputeDriver,
}

impl SlowComputeDriver {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: MockComputeDriver::new(),
        }
    }
}

#[async_trait]
impl ComputeDriver for SlowComputeDriver {
    async fn get_sizes(&self) -> Result<Vec<ComputeNodeSize>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_sizes().await
    }

    async fn get_regions(&self) -> Result<Vec<CloudRegion>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_regions().await
    }

    async fn get_os(&self) -> Result<OsImage> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_os().await
    }

    async fn start(&self, node: FleetNode) -> Result<FleetNode> {
        tokio::time::sleep(self.delay).await;
        self.inner.start(node).await
    }

    async fn cleanup_start(&self, node: FleetNode) -> Result<FleetNode> {
        tokio::time::sleep(self.delay).await;
        self.inner.cleanup_start(node).await
    }

    async fn stop(&self, node: FleetNode) -> Result<FleetNode> {
        tokio::time::sleep(self.delay).await;
        self.inner.stop(node).await
    }

    async fn status(&self, node: FleetNode) -> Result<FleetNode> {
        tokio::time::sleep(self.delay).await;
        self.inner.status(node).await
    }
}

/// DNS driver over an in-memory record table.
#[derive(Default)]
pub struct MemoryDnsDriver {
    records: Mutex<Vec<DnsRecord>>,
}

impl MemoryDnsDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn upsert(&self, record: DnsRecord) -> DnsRecord {
        let mut records = self.records.lock().unwrap();
        records.retain(|r| !(r.rtype == record.rtype && r.fqdn == record.fqdn));
        records.push(record.clone());
        record
    }
}

#[async_trait]
impl DnsDriver for MemoryDnsDriver {
    async fn create(&self, domain: &DomainInfo) -> Result<Vec<DnsRecord>> {
        let soa = self.upsert(DnsRecord::new(DnsType::Soa, &domain.name, "ns1"));
        let ns = self.upsert(DnsRecord::new(DnsType::Ns, &domain.name, "ns1"));
        Ok(vec![soa, ns])
    }

    async fn set_network(&self, network: &NetworkInfo) -> Result<Vec<DnsRecord>> {
        Ok(vec![self.upsert(DnsRecord::new(
            DnsType::Ns,
            network.fqdn(),
            "ns1",
        ))])
    }

    async fn set_node(&self, node: &FleetNode) -> Result<Vec<DnsRecord>> {
        let mut written = Vec::new();
        if let Some(ip4) = &node.ip4 {
            written.push(self.upsert(DnsRecord::new(DnsType::A, &node.fqdn, ip4)));
        }
        if let Some(ip6) = &node.ip6 {
            written.push(self.upsert(DnsRecord::new(DnsType::Aaaa, &node.fqdn, ip6)));
        }
        if written.is_empty() {
            bail!("node {} has no addresses to publish", node.node_id);
        }
        Ok(written)
    }

    async fn delete_node(&self, node: &FleetNode) -> Result<Vec<DnsRecord>> {
        let mut records = self.records.lock().unwrap();
        let (removed, kept): (Vec<_>, Vec<_>) = records
            .drain(..)
            .partition(|r| r.fqdn.eq_ignore_ascii_case(&node.fqdn));
        *records = kept;
        Ok(removed)
    }

    async fn update(&self, record: &DnsRecord) -> Result<DnsRecord> {
        Ok(self.upsert(record.clone()))
    }

    async fn remove(&self, record: &DnsRecord) -> Result<DnsRecord> {
        let mut records = self.records.lock().unwrap();
        records.retain(|r| !(r.rtype == record.rtype && r.fqdn == record.fqdn));
        Ok(record.clone())
    }

    async fn list(&self, matcher: &DnsRecordMatch) -> Result<Vec<DnsRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records.iter().filter(|r| matcher.matches(r)).cloned().collect())
    }
}

/// Geocode driver returning a fixed coordinate.
pub struct FixedGeoCodeDriver {
    pub result: GeoCodeResult,
}

impl FixedGeoCodeDriver {
    pub fn new(lat: impl Into<String>, lon: impl Into<String>) -> Self {
        Self {
            result: GeoCodeResult {
                lat: lat.into(),
                lon: lon.into(),
            },
        }
    }
}

#[async_trait]
impl GeoCodeDriver for FixedGeoCodeDriver {
    async fn lookup(&self, _location: &GeoLocation) -> Result<GeoCodeResult> {
        Ok(self.result.clone())
    }
}

/// Geo-IP driver resolving every address to a fixed location.
pub struct FixedGeoLocationDriver {
    pub location: GeoLocation,
}

impl FixedGeoLocationDriver {
    pub fn new(city: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            location: GeoLocation {
                city: Some(city.into()),
                country: Some(country.into()),
                ..GeoLocation::default()
            },
        }
    }
}

#[async_trait]
impl GeoLocationDriver for FixedGeoLocationDriver {
    async fn locate(&self, _ip: &str) -> Result<GeoLocation> {
        Ok(self.location.clone())
    }
}

/// Geocode driver that counts calls and can fail the first N of them.
pub struct CountingGeoCodeDriver {
    pub calls: AtomicUsize,
    pub fail_first: usize,
    result: GeoCodeResult,
}

impl CountingGeoCodeDriver {
    pub fn new(fail_first: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first,
            result: GeoCodeResult {
                lat: "40.7128".into(),
                lon: "-74.0060".into(),
            },
        }
    }
}

#[async_trait]
impl GeoCodeDriver for CountingGeoCodeDriver {
    async fn lookup(&self, _location: &GeoLocation) -> Result<GeoCodeResult> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            bail!("geocode upstream unavailable");
        }
        Ok(self.result.clone())
    }
}

/// Timezone driver returning a fixed zone.
pub struct FixedGeoTimeDriver {
    pub zone: GeoTimeZone,
}

impl FixedGeoTimeDriver {
    pub fn new(time_zone_id: impl Into<String>, standard_offset_millis: i64) -> Self {
        Self {
            zone: GeoTimeZone {
                time_zone_id: time_zone_id.into(),
                standard_offset_millis,
            },
        }
    }
}

#[async_trait]
impl GeoTimeDriver for FixedGeoTimeDriver {
    async fn timezone(&self, _lat: &str, _lon: &str) -> Result<GeoTimeZone> {
        Ok(self.zone.clone())
    }
}

/// Messaging driver that records every send and answers with a fixed
/// accepted/rejected verdict.
pub struct RecordingMessagingDriver {
    pub accept: bool,
    pub sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingMessagingDriver {
    pub fn new(accept: bool) -> Self {
        Self {
            accept,
            sent: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MessagingDriver for RecordingMessagingDriver {
    async fn send(&self, account: &str, message: &RenderedMessage, contact: &str) -> Result<bool> {
        self.sent.lock().unwrap().push((
            account.to_string(),
            contact.to_string(),
            message.body.clone(),
        ));
        Ok(self.accept)
    }
}
