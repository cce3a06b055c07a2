// Delegating driver facades
//
// INTENTION:
// Implement each capability contract by forwarding the call to the peer
// node that holds the real credentials, over the synchronous notification
// exchange. A facade is interchangeable with a credential-backed driver;
// callers never learn which one they hold. Region enumerations are the one
// delegated result cached here, since the region catalog of a provider is
// effectively static.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use flotilla_common::logging::Logger;

use crate::drivers::compute::{CloudRegion, ComputeDriver, ComputeNodeSize, FleetNode, OsImage};
use crate::drivers::dns::{DnsDriver, DnsRecord, DnsRecordMatch, DomainInfo, NetworkInfo};
use crate::drivers::geo::{
    GeoCodeDriver, GeoCodeResult, GeoLocation, GeoLocationDriver, GeoTimeDriver, GeoTimeZone,
};
use crate::drivers::messaging::{MessagingDriver, RenderedMessage};
use crate::error::DelegationError;
use crate::notify::payloads::{
    ComputeDriverRequest, DnsDriverRequest, GeoCodeDriverRequest, GeoLocationDriverRequest,
    GeoTimeDriverRequest, MessagingDriverRequest,
};
use crate::notify::service::NotificationService;
use crate::notify::NotificationType;
use crate::registry::{NodeDirectory, NodeInfo, ServiceType};

/// How long a delegate's region catalog stays cached.
pub const REGION_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Shared plumbing of every delegating facade.
struct DelegateLink {
    delegate_node: String,
    remote_service: String,
    account: String,
    notify: Arc<NotificationService>,
    directory: Arc<NodeDirectory>,
}

impl DelegateLink {
    fn new(
        delegate_node: impl Into<String>,
        remote_service: impl Into<String>,
        account: impl Into<String>,
        notify: Arc<NotificationService>,
        directory: Arc<NodeDirectory>,
    ) -> Self {
        Self {
            delegate_node: delegate_node.into(),
            remote_service: remote_service.into(),
            account: account.into(),
            notify,
            directory,
        }
    }

    /// Resolve the delegate in the directory at call time, so a peer added
    /// or re-addressed after this facade was built is still found.
    fn delegate(&self) -> Result<NodeInfo, DelegationError> {
        self.directory.require(&self.delegate_node)
    }
}

struct CachedRegions {
    fetched_at: Instant,
    regions: Vec<CloudRegion>,
}

/// Compute facade forwarding to the delegate's compute driver.
pub struct DelegatedComputeDriver {
    link: DelegateLink,
    regions: DashMap<String, CachedRegions>,
    region_ttl: Duration,
    logger: Arc<Logger>,
}

impl DelegatedComputeDriver {
    pub fn new(
        delegate_node: impl Into<String>,
        remote_service: impl Into<String>,
        account: impl Into<String>,
        notify: Arc<NotificationService>,
        directory: Arc<NodeDirectory>,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            link: DelegateLink::new(delegate_node, remote_service, account, notify, directory),
            regions: DashMap::new(),
            region_ttl: REGION_CACHE_TTL,
            logger,
        }
    }

    /// Override how long region catalogs stay cached. Mainly for tests and
    /// deployments where the delegate's provider list actually moves.
    pub fn with_region_ttl(mut self, ttl: Duration) -> Self {
        self.region_ttl = ttl;
        self
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        ty: NotificationType,
        node: Option<FleetNode>,
    ) -> Result<T> {
        let target = self.link.delegate()?;
        let request = ComputeDriverRequest::new(self.link.remote_service.clone(), node);
        Ok(self.link.notify.notify_sync(&target, ty, &request).await?)
    }
}

#[async_trait]
impl ComputeDriver for DelegatedComputeDriver {
    async fn get_sizes(&self) -> Result<Vec<ComputeNodeSize>> {
        self.call(NotificationType::ComputeDriverGetSizes, None).await
    }

    async fn get_regions(&self) -> Result<Vec<CloudRegion>> {
        let key = format!("{}:{}", self.link.delegate_node, self.link.account);
        let cached = {
            self.regions.get(&key).and_then(|entry| {
                (entry.fetched_at.elapsed() < self.region_ttl).then(|| entry.regions.clone())
            })
        };
        if let Some(regions) = cached {
            return Ok(regions);
        }

        let regions: Vec<CloudRegion> = self
            .call(NotificationType::ComputeDriverGetRegions, None)
            .await?;
        self.logger.debug(format!(
            "cached {} regions from {}",
            regions.len(),
            self.link.delegate_node
        ));
        self.regions.insert(
            key,
            CachedRegions {
                fetched_at: Instant::now(),
                regions: regions.clone(),
            },
        );
        Ok(regions)
    }

    async fn get_os(&self) -> Result<OsImage> {
        self.call(NotificationType::ComputeDriverGetOs, None).await
    }

    async fn start(&self, node: FleetNode) -> Result<FleetNode> {
        self.call(NotificationType::ComputeDriverStart, Some(node)).await
    }

    async fn cleanup_start(&self, node: FleetNode) -> Result<FleetNode> {
        self.call(NotificationType::ComputeDriverCleanupStart, Some(node))
            .await
    }

    async fn stop(&self, node: FleetNode) -> Result<FleetNode> {
        self.call(NotificationType::ComputeDriverStop, Some(node)).await
    }

    async fn status(&self, node: FleetNode) -> Result<FleetNode> {
        self.call(NotificationType::ComputeDriverStatus, Some(node)).await
    }
}

/// DNS facade forwarding to the delegate's DNS driver.
pub struct DelegatedDnsDriver {
    link: DelegateLink,
}

impl DelegatedDnsDriver {
    pub fn new(
        delegate_node: impl Into<String>,
        remote_service: impl Into<String>,
        account: impl Into<String>,
        notify: Arc<NotificationService>,
        directory: Arc<NodeDirectory>,
    ) -> Self {
        Self {
            link: DelegateLink::new(delegate_node, remote_service, account, notify, directory),
        }
    }

    fn request(&self) -> DnsDriverRequest {
        DnsDriverRequest::new(self.link.remote_service.clone())
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        ty: NotificationType,
        request: DnsDriverRequest,
    ) -> Result<T> {
        let target = self.link.delegate()?;
        Ok(self.link.notify.notify_sync(&target, ty, &request).await?)
    }
}

#[async_trait]
impl DnsDriver for DelegatedDnsDriver {
    async fn create(&self, domain: &DomainInfo) -> Result<Vec<DnsRecord>> {
        self.call(
            NotificationType::DnsDriverCreate,
            self.request().with_domain(domain.clone()),
        )
        .await
    }

    async fn set_network(&self, network: &NetworkInfo) -> Result<Vec<DnsRecord>> {
        self.call(
            NotificationType::DnsDriverSetNetwork,
            self.request().with_network(network.clone()),
        )
        .await
    }

    async fn set_node(&self, node: &FleetNode) -> Result<Vec<DnsRecord>> {
        self.call(
            NotificationType::DnsDriverSetNode,
            self.request().with_node(node.clone()),
        )
        .await
    }

    async fn delete_node(&self, node: &FleetNode) -> Result<Vec<DnsRecord>> {
        self.call(
            NotificationType::DnsDriverDeleteNode,
            self.request().with_node(node.clone()),
        )
        .await
    }

    async fn update(&self, record: &DnsRecord) -> Result<DnsRecord> {
        self.call(
            NotificationType::DnsDriverUpdate,
            self.request().with_record(record.clone()),
        )
        .await
    }

    async fn remove(&self, record: &DnsRecord) -> Result<DnsRecord> {
        self.call(
            NotificationType::DnsDriverRemove,
            self.request().with_record(record.clone()),
        )
        .await
    }

    async fn list(&self, matcher: &DnsRecordMatch) -> Result<Vec<DnsRecord>> {
        self.call(
            NotificationType::DnsDriverList,
            self.request().with_matcher(matcher.clone()),
        )
        .await
    }
}

/// Geocode facade forwarding to the delegate's geocode driver.
pub struct DelegatedGeoCodeDriver {
    link: DelegateLink,
}

impl DelegatedGeoCodeDriver {
    pub fn new(
        delegate_node: impl Into<String>,
        remote_service: impl Into<String>,
        account: impl Into<String>,
        notify: Arc<NotificationService>,
        directory: Arc<NodeDirectory>,
    ) -> Self {
        Self {
            link: DelegateLink::new(delegate_node, remote_service, account, notify, directory),
        }
    }
}

#[async_trait]
impl GeoCodeDriver for DelegatedGeoCodeDriver {
    async fn lookup(&self, location: &GeoLocation) -> Result<GeoCodeResult> {
        let target = self.link.delegate()?;
        let request = GeoCodeDriverRequest {
            geo_service: self.link.remote_service.clone(),
            location: location.clone(),
        };
        Ok(self
            .link
            .notify
            .notify_sync(&target, NotificationType::GeoCodeDriverGeocode, &request)
            .await?)
    }
}

/// Geo-IP facade forwarding to the delegate's geo-IP driver.
pub struct DelegatedGeoLocationDriver {
    link: DelegateLink,
}

impl DelegatedGeoLocationDriver {
    pub fn new(
        delegate_node: impl Into<String>,
        remote_service: impl Into<String>,
        account: impl Into<String>,
        notify: Arc<NotificationService>,
        directory: Arc<NodeDirectory>,
    ) -> Self {
        Self {
            link: DelegateLink::new(delegate_node, remote_service, account, notify, directory),
        }
    }
}

#[async_trait]
impl GeoLocationDriver for DelegatedGeoLocationDriver {
    async fn locate(&self, ip: &str) -> Result<GeoLocation> {
        let target = self.link.delegate()?;
        let request = GeoLocationDriverRequest {
            geo_service: self.link.remote_service.clone(),
            ip: ip.to_string(),
        };
        Ok(self
            .link
            .notify
            .notify_sync(
                &target,
                NotificationType::GeoLocationDriverGeolocate,
                &request,
            )
            .await?)
    }
}

/// Timezone facade forwarding to the delegate's timezone driver.
pub struct DelegatedGeoTimeDriver {
    link: DelegateLink,
}

impl DelegatedGeoTimeDriver {
    pub fn new(
        delegate_node: impl Into<String>,
        remote_service: impl Into<String>,
        account: impl Into<String>,
        notify: Arc<NotificationService>,
        directory: Arc<NodeDirectory>,
    ) -> Self {
        Self {
            link: DelegateLink::new(delegate_node, remote_service, account, notify, directory),
        }
    }
}

#[async_trait]
impl GeoTimeDriver for DelegatedGeoTimeDriver {
    async fn timezone(&self, lat: &str, lon: &str) -> Result<GeoTimeZone> {
        let target = self.link.delegate()?;
        let request = GeoTimeDriverRequest {
            geo_service: self.link.remote_service.clone(),
            lat: lat.to_string(),
            lon: lon.to_string(),
        };
        Ok(self
            .link
            .notify
            .notify_sync(&target, NotificationType::GeoTimeDriverGeotime, &request)
            .await?)
    }
}

/// Messaging facade forwarding to the delegate's messaging driver.
///
/// One facade type covers auth, email, and SMS; the service type picked at
/// construction selects which send notification it emits.
pub struct DelegatedMessagingDriver {
    link: DelegateLink,
    send_type: NotificationType,
}

impl DelegatedMessagingDriver {
    pub fn new(
        service_type: ServiceType,
        delegate_node: impl Into<String>,
        remote_service: impl Into<String>,
        account: impl Into<String>,
        notify: Arc<NotificationService>,
        directory: Arc<NodeDirectory>,
    ) -> Result<Self, DelegationError> {
        let send_type = match service_type {
            ServiceType::Email => NotificationType::EmailDriverSend,
            ServiceType::Sms => NotificationType::SmsDriverSend,
            ServiceType::Authenticator => NotificationType::AuthenticatorDriverSend,
            other => {
                return Err(DelegationError::Config(format!(
                    "{} is not a messaging service type",
                    other.as_str()
                )))
            }
        };
        Ok(Self {
            link: DelegateLink::new(delegate_node, remote_service, account, notify, directory),
            send_type,
        })
    }
}

#[async_trait]
impl MessagingDriver for DelegatedMessagingDriver {
    async fn send(&self, account: &str, message: &RenderedMessage, contact: &str) -> Result<bool> {
        let target = self.link.delegate()?;
        let request = MessagingDriverRequest {
            messaging_service: self.link.remote_service.clone(),
            account: account.to_string(),
            message: message.clone(),
            contact: contact.to_string(),
        };
        Ok(self
            .link
            .notify
            .notify_sync(&target, self.send_type, &request)
            .await?)
    }
}
