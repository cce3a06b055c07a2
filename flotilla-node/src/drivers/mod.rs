// Driver Contracts Module
//
// INTENTION:
// Define the fixed per-domain driver interfaces that real credential-backed
// drivers and delegating facades implement interchangeably. Callers never
// learn whether the driver they hold executes locally or forwards the call
// to the peer that owns the credentials.

pub mod compute;
pub mod delegate;
pub mod dns;
pub mod geo;
pub mod messaging;

pub use compute::{CloudRegion, ComputeDriver, ComputeNodeSize, FleetNode, NodeState, OsImage};
pub use delegate::{
    DelegatedComputeDriver, DelegatedDnsDriver, DelegatedGeoCodeDriver, DelegatedGeoLocationDriver,
    DelegatedGeoTimeDriver, DelegatedMessagingDriver,
};
pub use dns::{DnsDriver, DnsRecord, DnsRecordMatch, DnsType, DomainInfo, NetworkInfo};
pub use geo::{
    CachingGeoCodeDriver, CachingGeoLocationDriver, CachingGeoTimeDriver, GeoCodeDriver,
    GeoCodeResult, GeoLocation, GeoLocationDriver, GeoPoint, GeoTimeDriver, GeoTimeZone,
};
pub use messaging::{MessagingDriver, RenderedMessage};
