// Fleet Node
//
// INTENTION:
// Assemble one node: its notification service and dispatcher over a store
// and a transport, its peer directory, and its cloud service catalog. The
// node is the inbound endpoint the transport delivers to; every arriving
// record is durably recorded before dispatch ever looks at it. Services
// are registered either with a local credential-backed driver or as
// delegated, in which case the node builds the matching facade.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use flotilla_common::logging::{Component, Logger};

use crate::config::NodeConfig;
use crate::drivers::{
    ComputeDriver, DelegatedComputeDriver, DelegatedDnsDriver, DelegatedGeoCodeDriver,
    DelegatedGeoLocationDriver, DelegatedGeoTimeDriver, DelegatedMessagingDriver, DnsDriver,
    GeoCodeDriver, GeoLocationDriver, GeoTimeDriver, MessagingDriver,
};
use crate::error::DelegationError;
use crate::notify::dispatch::NotificationDispatcher;
use crate::notify::handlers::{
    ComputeDriverHandler, DnsDriverHandler, GeoCodeDriverHandler, GeoLocationDriverHandler,
    GeoTimeDriverHandler, HandlerRegistry, MessagingDriverHandler,
};
use crate::notify::service::NotificationService;
use crate::notify::store::NotificationStore;
use crate::notify::{NotificationRecord, NotificationType};
use crate::registry::{
    CloudService, CloudServiceRegistry, DriverInstance, NodeDirectory, NodeInfo, ServiceType,
};
use crate::transport::{InboundReceiver, RecordTransport};

/// One fleet node: notification plumbing plus its service catalog.
pub struct Node {
    config: NodeConfig,
    info: NodeInfo,
    directory: Arc<NodeDirectory>,
    services: Arc<CloudServiceRegistry>,
    notify: Arc<NotificationService>,
    dispatcher: NotificationDispatcher,
    store: Arc<dyn NotificationStore>,
    logger: Arc<Logger>,
}

impl Node {
    /// Build a node over the given store and transport and wire the full
    /// handler set, one handler per request notification type.
    pub fn new(
        config: NodeConfig,
        store: Arc<dyn NotificationStore>,
        transport: Arc<dyn RecordTransport>,
    ) -> Result<Arc<Self>, DelegationError> {
        if let Some(logging) = &config.logging_config {
            logging.apply();
        }
        let logger = Arc::new(Logger::new_root(Component::Node, &config.node_id));

        let directory = Arc::new(NodeDirectory::new());
        let services = Arc::new(CloudServiceRegistry::new());
        let notify = Arc::new(NotificationService::new(
            config.node_id.clone(),
            config.account.clone(),
            store.clone(),
            transport,
            config.sync_timeout,
            Arc::new(logger.with_component(Component::Notify)),
        ));

        let handlers = Arc::new(HandlerRegistry::new());
        use NotificationType::*;
        let compute_handler = Arc::new(ComputeDriverHandler);
        for ty in [
            ComputeDriverGetSizes,
            ComputeDriverGetRegions,
            ComputeDriverGetOs,
            ComputeDriverStart,
            ComputeDriverCleanupStart,
            ComputeDriverStop,
            ComputeDriverStatus,
        ] {
            handlers.register(ty, compute_handler.clone())?;
        }
        let dns_handler = Arc::new(DnsDriverHandler);
        for ty in [
            DnsDriverCreate,
            DnsDriverUpdate,
            DnsDriverRemove,
            DnsDriverList,
            DnsDriverSetNetwork,
            DnsDriverSetNode,
            DnsDriverDeleteNode,
        ] {
            handlers.register(ty, dns_handler.clone())?;
        }
        handlers.register(GeoCodeDriverGeocode, Arc::new(GeoCodeDriverHandler))?;
        handlers.register(GeoLocationDriverGeolocate, Arc::new(GeoLocationDriverHandler))?;
        handlers.register(GeoTimeDriverGeotime, Arc::new(GeoTimeDriverHandler))?;
        let messaging_handler = Arc::new(MessagingDriverHandler);
        for ty in [EmailDriverSend, SmsDriverSend, AuthenticatorDriverSend] {
            handlers.register(ty, messaging_handler.clone())?;
        }

        let dispatcher = NotificationDispatcher::new(
            store.clone(),
            notify.clone(),
            handlers,
            directory.clone(),
            services.clone(),
            Arc::new(logger.with_component(Component::Dispatch)),
        );

        let info = NodeInfo::new(
            config.node_id.clone(),
            config.account.clone(),
            config.address.clone(),
        );
        logger.info(format!("node created: {config}"));

        Ok(Arc::new(Self {
            config,
            info,
            directory,
            services,
            notify,
            dispatcher,
            store,
            logger,
        }))
    }

    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn directory(&self) -> &Arc<NodeDirectory> {
        &self.directory
    }

    pub fn services(&self) -> &Arc<CloudServiceRegistry> {
        &self.services
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    pub fn notification_service(&self) -> &Arc<NotificationService> {
        &self.notify
    }

    /// Make a peer known to this node.
    pub fn add_node(&self, peer: NodeInfo) {
        self.logger
            .debug(format!("peer registered: {}", peer.node_id));
        self.directory.register(peer);
    }

    /// Register a service backed by a local credential-holding driver.
    pub fn add_cloud_service(
        &self,
        service_id: impl Into<String>,
        service_type: ServiceType,
        driver: DriverInstance,
    ) -> Result<(), DelegationError> {
        self.services
            .register(CloudService::local(service_id, service_type, driver))
    }

    /// Register a service that delegates to `delegate_node`, building the
    /// facade that forwards its calls there. `remote_service` is the id the
    /// service is registered under on the delegate.
    pub fn add_delegated_service(
        &self,
        service_id: impl Into<String>,
        service_type: ServiceType,
        delegate_node: impl Into<String>,
        remote_service: impl Into<String>,
    ) -> Result<(), DelegationError> {
        let service_id = service_id.into();
        let delegate_node = delegate_node.into();
        let remote_service = remote_service.into();
        let account = self.config.account.clone();
        let driver_logger = Arc::new(self.logger.with_component(Component::Driver));

        let driver = match service_type {
            ServiceType::Compute => DriverInstance::Compute(Arc::new(
                DelegatedComputeDriver::new(
                    delegate_node.clone(),
                    remote_service,
                    account,
                    self.notify.clone(),
                    self.directory.clone(),
                    driver_logger,
                )
                .with_region_ttl(self.config.region_cache_ttl),
            )),
            ServiceType::Dns => DriverInstance::Dns(Arc::new(DelegatedDnsDriver::new(
                delegate_node.clone(),
                remote_service,
                account,
                self.notify.clone(),
                self.directory.clone(),
            ))),
            ServiceType::GeoCode => DriverInstance::GeoCode(Arc::new(DelegatedGeoCodeDriver::new(
                delegate_node.clone(),
                remote_service,
                account,
                self.notify.clone(),
                self.directory.clone(),
            ))),
            ServiceType::GeoLocation => {
                DriverInstance::GeoLocation(Arc::new(DelegatedGeoLocationDriver::new(
                    delegate_node.clone(),
                    remote_service,
                    account,
                    self.notify.clone(),
                    self.directory.clone(),
                )))
            }
            ServiceType::GeoTime => DriverInstance::GeoTime(Arc::new(DelegatedGeoTimeDriver::new(
                delegate_node.clone(),
                remote_service,
                account,
                self.notify.clone(),
                self.directory.clone(),
            ))),
            ServiceType::Email | ServiceType::Sms | ServiceType::Authenticator => {
                DriverInstance::Messaging(Arc::new(DelegatedMessagingDriver::new(
                    service_type,
                    delegate_node.clone(),
                    remote_service,
                    account,
                    self.notify.clone(),
                    self.directory.clone(),
                )?))
            }
        };
        self.services.register(CloudService::delegated(
            service_id,
            service_type,
            delegate_node,
            driver,
        ))
    }

    /// The compute driver behind a registered service, local or delegating.
    pub fn compute(&self, service_id: &str) -> Result<Arc<dyn ComputeDriver>, DelegationError> {
        match self.services.require(service_id)?.driver {
            DriverInstance::Compute(driver) => Ok(driver),
            _ => Err(Self::not_a(service_id, "compute")),
        }
    }

    pub fn dns(&self, service_id: &str) -> Result<Arc<dyn DnsDriver>, DelegationError> {
        match self.services.require(service_id)?.driver {
            DriverInstance::Dns(driver) => Ok(driver),
            _ => Err(Self::not_a(service_id, "dns")),
        }
    }

    pub fn geo_code(&self, service_id: &str) -> Result<Arc<dyn GeoCodeDriver>, DelegationError> {
        match self.services.require(service_id)?.driver {
            DriverInstance::GeoCode(driver) => Ok(driver),
            _ => Err(Self::not_a(service_id, "geo_code")),
        }
    }

    pub fn geo_location(
        &self,
        service_id: &str,
    ) -> Result<Arc<dyn GeoLocationDriver>, DelegationError> {
        match self.services.require(service_id)?.driver {
            DriverInstance::GeoLocation(driver) => Ok(driver),
            _ => Err(Self::not_a(service_id, "geo_location")),
        }
    }

    pub fn geo_time(&self, service_id: &str) -> Result<Arc<dyn GeoTimeDriver>, DelegationError> {
        match self.services.require(service_id)?.driver {
            DriverInstance::GeoTime(driver) => Ok(driver),
            _ => Err(Self::not_a(service_id, "geo_time")),
        }
    }

    pub fn messaging(&self, service_id: &str) -> Result<Arc<dyn MessagingDriver>, DelegationError> {
        match self.services.require(service_id)?.driver {
            DriverInstance::Messaging(driver) => Ok(driver),
            _ => Err(Self::not_a(service_id, "messaging")),
        }
    }

    fn not_a(service_id: &str, wanted: &str) -> DelegationError {
        DelegationError::Config(format!("service {service_id} is not a {wanted} service"))
    }

    /// Record an arriving notification and kick the dispatcher.
    pub async fn handle_inbound(&self, record: NotificationRecord) -> Result<()> {
        self.logger.debug(format!(
            "inbound {} {} from {}",
            record.notification_type, record.notification_id, record.from_node
        ));
        self.store.create_received(record).await?;
        self.dispatcher.check_inbox().await
    }
}

#[async_trait]
impl InboundReceiver for Node {
    async fn receive(&self, record: NotificationRecord) -> Result<()> {
        self.handle_inbound(record).await
    }
}
