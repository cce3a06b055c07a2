// Public modules
pub mod cache;
pub mod config;
pub mod drivers;
pub mod error;
pub mod node;
pub mod notify;
pub mod registry;
pub mod transport;

// Re-export the main types from the node module
pub use config::NodeConfig;
pub use node::Node;

// Re-export the notification layer
pub use notify::service::NotificationService;
pub use notify::store::{MemoryNotificationStore, NotificationStore};
pub use notify::{
    NotificationRecord, NotificationType, ProcessingStatus, ReceivedNotification, SendStatus,
    SentNotification,
};

// Re-export registries and transport contracts
pub use registry::{
    CloudService, CloudServiceRegistry, DriverInstance, NodeDirectory, NodeInfo, ServiceType,
};
pub use transport::{InboundReceiver, LoopbackTransport, RecordTransport};

// Re-export error and result types used at every boundary
pub use error::{DelegationError, Outcome, RemoteError};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
