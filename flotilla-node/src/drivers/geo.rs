// Geo driver contracts and domain types
//
// Geocoding and timezone lookups are expensive, idempotent, and billed per
// call, so the real driver bases here wrap any inner driver with the
// cache-aside lookup: successes are kept for a long TTL, failures for a
// short one, and a cache read never raises.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use flotilla_common::logging::Logger;

use crate::cache::{CacheConfig, CacheLookup};
use crate::error::Outcome;

/// A bare coordinate pair. Coordinates travel as strings end to end, the
/// way the upstream geo providers hand them out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: String,
    pub lon: String,
}

impl GeoPoint {
    pub fn new(lat: impl Into<String>, lon: impl Into<String>) -> Self {
        Self {
            lat: lat.into(),
            lon: lon.into(),
        }
    }
}

/// A location to geocode. Any subset of fields may be present.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GeoLocation {
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub lat: Option<String>,
    pub lon: Option<String>,
}

impl GeoLocation {
    /// Deterministic cache key from normalized inputs: trimmed, lowercased,
    /// empty fields collapsed, so equivalent requests share one entry.
    pub fn cache_key(&self) -> String {
        let norm = |field: &Option<String>| {
            field
                .as_deref()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .unwrap_or_default()
        };
        format!(
            "{}:{}:{}:{}:{}",
            norm(&self.city),
            norm(&self.region),
            norm(&self.country),
            norm(&self.lat),
            norm(&self.lon)
        )
    }
}

/// Result of a geocode lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoCodeResult {
    pub lat: String,
    pub lon: String,
}

/// Result of a timezone lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoTimeZone {
    /// IANA zone name, e.g. "America/New_York"
    pub time_zone_id: String,
    /// Offset from UTC outside daylight saving, in milliseconds
    pub standard_offset_millis: i64,
}

/// Geocode capability contract.
#[async_trait]
pub trait GeoCodeDriver: Send + Sync {
    async fn lookup(&self, location: &GeoLocation) -> Result<GeoCodeResult>;
}

/// Geo-IP capability contract: resolve an IP address to a location.
#[async_trait]
pub trait GeoLocationDriver: Send + Sync {
    async fn locate(&self, ip: &str) -> Result<GeoLocation>;
}

/// Timezone capability contract.
#[async_trait]
pub trait GeoTimeDriver: Send + Sync {
    async fn timezone(&self, lat: &str, lon: &str) -> Result<GeoTimeZone>;
}

/// Cache-aside front for a geocode driver.
pub struct CachingGeoCodeDriver {
    inner: Arc<dyn GeoCodeDriver>,
    cache: CacheLookup,
}

impl CachingGeoCodeDriver {
    pub fn new(inner: Arc<dyn GeoCodeDriver>, config: CacheConfig, logger: Arc<Logger>) -> Self {
        Self {
            inner,
            cache: CacheLookup::new(config, logger),
        }
    }

    /// Cache-aside lookup. Never raises: a previously cached failure comes
    /// back as the error arm, and a fresh failure is cached under the short
    /// error TTL before being returned.
    pub async fn cached_lookup(&self, location: &GeoLocation) -> Outcome<GeoCodeResult> {
        let key = location.cache_key();
        let inner = self.inner.clone();
        let location = location.clone();
        self.cache
            .lookup(&key, move || async move { inner.lookup(&location).await })
            .await
    }
}

#[async_trait]
impl GeoCodeDriver for CachingGeoCodeDriver {
    async fn lookup(&self, location: &GeoLocation) -> Result<GeoCodeResult> {
        match self.cached_lookup(location).await {
            Outcome::Ok(result) => Ok(result),
            Outcome::Err(err) => Err(err.into()),
        }
    }
}

/// Cache-aside front for a geo-IP driver.
pub struct CachingGeoLocationDriver {
    inner: Arc<dyn GeoLocationDriver>,
    cache: CacheLookup,
}

impl CachingGeoLocationDriver {
    pub fn new(inner: Arc<dyn GeoLocationDriver>, config: CacheConfig, logger: Arc<Logger>) -> Self {
        Self {
            inner,
            cache: CacheLookup::new(config, logger),
        }
    }

    pub async fn cached_locate(&self, ip: &str) -> Outcome<GeoLocation> {
        let key = ip.trim().to_lowercase();
        let inner = self.inner.clone();
        let ip = ip.to_string();
        self.cache
            .lookup(&key, move || async move { inner.locate(&ip).await })
            .await
    }
}

#[async_trait]
impl GeoLocationDriver for CachingGeoLocationDriver {
    async fn locate(&self, ip: &str) -> Result<GeoLocation> {
        match self.cached_locate(ip).await {
            Outcome::Ok(location) => Ok(location),
            Outcome::Err(err) => Err(err.into()),
        }
    }
}

/// Cache-aside front for a timezone driver.
pub struct CachingGeoTimeDriver {
    inner: Arc<dyn GeoTimeDriver>,
    cache: CacheLookup,
}

impl CachingGeoTimeDriver {
    pub fn new(inner: Arc<dyn GeoTimeDriver>, config: CacheConfig, logger: Arc<Logger>) -> Self {
        Self {
            inner,
            cache: CacheLookup::new(config, logger),
        }
    }

    pub async fn cached_timezone(&self, lat: &str, lon: &str) -> Outcome<GeoTimeZone> {
        let key = format!("{}:{}", lat.trim(), lon.trim());
        let inner = self.inner.clone();
        let lat = lat.to_string();
        let lon = lon.to_string();
        self.cache
            .lookup(&key, move || async move { inner.timezone(&lat, &lon).await })
            .await
    }
}

#[async_trait]
impl GeoTimeDriver for CachingGeoTimeDriver {
    async fn timezone(&self, lat: &str, lon: &str) -> Result<GeoTimeZone> {
        match self.cached_timezone(lat, lon).await {
            Outcome::Ok(zone) => Ok(zone),
            Outcome::Err(err) => Err(err.into()),
        }
    }
}
