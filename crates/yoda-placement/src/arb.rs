//! Automatic resource balancing
//!
//! Operators tag resources with a `yoda::arb` status. A write requesting
//! an exempt resource, or a ready resource with enough headroom, lands
//! where it asked. A write requesting a full (or short) resource is
//! redirected to the ready resource with the most free space. Resources
//! without a usable status are invisible to the engine.
//!
//! Statuses and the resource capacity snapshot are both served through a
//! [`CachedDataManager`], so a warm engine decides without catalog reads.

use crate::cache::{CachedDataManager, DataSource};
use crate::metrics::record_decision;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use yoda_common::config::ArbConfig;
use yoda_common::{ArbStatus, Error, HostContext, ResourceName, Result, attrs};
use yoda_host::{Catalog, ResourceInfo};

/// Cache namespace for ARB statuses
pub const ARB_NAMESPACE: &str = "arb";

/// Cache namespace for resource capacity snapshots
pub const CAPACITY_NAMESPACE: &str = "arb_capacity";

/// Reads and writes resource ARB statuses in the catalog
pub struct ArbStatusSource<H: ?Sized> {
    host: Arc<H>,
    context: HostContext,
    populate: bool,
}

impl<H: Catalog + ?Sized> ArbStatusSource<H> {
    pub const fn new(host: Arc<H>, context: HostContext, populate: bool) -> Self {
        Self {
            host,
            context,
            populate,
        }
    }
}

#[async_trait]
impl<H: Catalog + ?Sized> DataSource for ArbStatusSource<H> {
    type Key = ResourceName;
    type Value = ArbStatus;

    fn namespace(&self) -> &str {
        ARB_NAMESPACE
    }

    async fn get_original(&self, resource: &ResourceName) -> Result<ArbStatus> {
        let values = self
            .host
            .resource_metadata(resource, attrs::ARB_STATUS)
            .await?;
        match values.as_slice() {
            [] => Ok(ArbStatus::Ignore),
            [value] => Ok(value.parse().unwrap_or_else(|e| {
                warn!(resource = %resource, error = %e, "Invalid ARB status, treating as IGNORE");
                ArbStatus::Ignore
            })),
            many => {
                warn!(
                    resource = %resource,
                    count = many.len(),
                    "Ambiguous ARB status, treating as IGNORE"
                );
                Ok(ArbStatus::Ignore)
            }
        }
    }

    async fn put_original(&self, resource: &ResourceName, status: &ArbStatus) -> Result<()> {
        self.host
            .set_resource_metadata(resource, attrs::ARB_STATUS, status.as_str())
            .await?;
        Ok(())
    }

    fn context_string(&self, resource: &ResourceName) -> String {
        format!("{}:{resource}", self.context.zone)
    }

    fn should_populate_on_get(&self) -> bool {
        self.populate
    }
}

/// Cached access to resource ARB statuses
pub type ArbDataManager<H> = CachedDataManager<ArbStatusSource<H>>;

/// Observed capacity of every resource in a zone, keyed by zone name
pub struct CapacitySource<H: ?Sized> {
    host: Arc<H>,
    populate: bool,
}

impl<H: Catalog + ?Sized> CapacitySource<H> {
    pub const fn new(host: Arc<H>, populate: bool) -> Self {
        Self { host, populate }
    }
}

#[async_trait]
impl<H: Catalog + ?Sized> DataSource for CapacitySource<H> {
    type Key = String;
    type Value = Vec<ResourceInfo>;

    fn namespace(&self) -> &str {
        CAPACITY_NAMESPACE
    }

    async fn get_original(&self, _zone: &String) -> Result<Vec<ResourceInfo>> {
        Ok(self.host.list_resources().await?)
    }

    async fn put_original(&self, zone: &String, _: &Vec<ResourceInfo>) -> Result<()> {
        // Capacity is observed by the host, never written by the core
        Err(Error::invalid_argument(format!(
            "resource capacity of zone {zone} is read-only"
        )))
    }

    fn context_string(&self, zone: &String) -> String {
        zone.clone()
    }

    fn should_populate_on_get(&self) -> bool {
        self.populate
    }
}

/// Cached access to resource capacity
pub type CapacityManager<H> = CachedDataManager<CapacitySource<H>>;

/// Headroom a resource needs to accept a write
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Threshold {
    pub min_free_bytes: u64,
    /// Percentage of total capacity; 0 disables the check
    pub min_free_percent: f64,
}

impl Threshold {
    #[must_use]
    pub const fn from_config(config: &ArbConfig) -> Self {
        Self {
            min_free_bytes: config.min_free_bytes,
            min_free_percent: config.min_free_percent,
        }
    }

    /// Free bytes required for a write of `size_hint` bytes
    #[must_use]
    pub const fn required(&self, size_hint: Option<u64>) -> u64 {
        match size_hint {
            Some(size) => self.min_free_bytes.saturating_add(size),
            None => self.min_free_bytes,
        }
    }

    /// Whether `info` has room for a write of `size_hint` bytes
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn admits(&self, info: &ResourceInfo, size_hint: Option<u64>) -> bool {
        let free = info.free_bytes.unwrap_or(0);
        if free < self.required(size_hint) {
            return false;
        }
        match info.total_bytes {
            Some(total) if self.min_free_percent > 0.0 && total > 0 => {
                free as f64 * 100.0 / total as f64 >= self.min_free_percent
            }
            _ => true,
        }
    }
}

/// Outcome of resolving a requested resource
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArbDecision {
    /// The requested resource is honored
    Requested(ResourceName),
    /// The resource is not managed by ARB; the request stands unchanged
    NoOpinion(ResourceName),
    /// The write is redirected
    Substitute {
        requested: ResourceName,
        resource: ResourceName,
    },
}

impl ArbDecision {
    /// Resource the write should land on
    #[must_use]
    pub const fn resource(&self) -> &ResourceName {
        match self {
            Self::Requested(r) | Self::NoOpinion(r) | Self::Substitute { resource: r, .. } => r,
        }
    }

    #[must_use]
    pub const fn is_substitute(&self) -> bool {
        matches!(self, Self::Substitute { .. })
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::Requested(_) => "requested",
            Self::NoOpinion(_) => "no_opinion",
            Self::Substitute { .. } => "substitute",
        }
    }
}

/// Resolves write requests to a resource with headroom
pub struct ArbEngine<H: ?Sized> {
    zone: String,
    manager: ArbDataManager<H>,
    capacity: CapacityManager<H>,
    threshold: Threshold,
}

impl<H: Catalog + ?Sized> ArbEngine<H> {
    /// Create an engine with fresh status and capacity caches
    #[must_use]
    pub fn new(host: Arc<H>, context: HostContext, config: &ArbConfig) -> Self {
        let populate = config.populate_cache_on_get;
        let zone = context.zone.clone();
        let capacity = CapacitySource::new(Arc::clone(&host), populate);
        let source = ArbStatusSource::new(host, context, populate);
        Self {
            zone,
            manager: CachedDataManager::new(source),
            capacity: CachedDataManager::new(capacity),
            threshold: Threshold::from_config(config),
        }
    }

    #[must_use]
    pub const fn threshold(&self) -> Threshold {
        self.threshold
    }

    #[must_use]
    pub const fn manager(&self) -> &ArbDataManager<H> {
        &self.manager
    }

    /// Status of a resource, through the cache
    pub async fn status(&self, resource: &ResourceName) -> Result<ArbStatus> {
        self.manager.get(resource).await
    }

    /// Set the status of a resource, original first
    pub async fn set_status(&self, resource: &ResourceName, status: ArbStatus) -> Result<()> {
        info!(resource = %resource, status = %status, "Setting ARB status");
        self.manager.put(resource, &status).await
    }

    #[must_use]
    pub const fn capacity(&self) -> &CapacityManager<H> {
        &self.capacity
    }

    /// Capacity of every resource, through the cache
    pub async fn resources(&self) -> Result<Vec<ResourceInfo>> {
        self.capacity.get(&self.zone).await
    }

    /// Drop cached statuses and capacity
    pub fn invalidate(&self) {
        self.manager.invalidate();
        self.capacity.invalidate();
    }

    /// Every resource with its status and capacity, ordered by name
    pub async fn statuses(&self) -> Result<Vec<(ResourceInfo, ArbStatus)>> {
        let mut out = Vec::new();
        for info in self.resources().await? {
            let status = self.status(&info.name).await?;
            out.push((info, status));
        }
        Ok(out)
    }

    /// Resolve a write of unknown size
    pub async fn resolve(&self, requested: &ResourceName) -> Result<ArbDecision> {
        self.resolve_for(requested, None).await
    }

    /// Resolve a write of `size_hint` bytes on `requested`
    pub async fn resolve_for(
        &self,
        requested: &ResourceName,
        size_hint: Option<u64>,
    ) -> Result<ArbDecision> {
        let decision = self.decide(requested, size_hint).await;
        match &decision {
            Ok(d) => {
                record_decision(d.label());
                debug!(requested = %requested, resource = %d.resource(), "ARB decision");
            }
            Err(Error::NoCapacity { .. }) => record_decision("no_capacity"),
            Err(_) => record_decision("error"),
        }
        decision
    }

    async fn decide(&self, requested: &ResourceName, size_hint: Option<u64>) -> Result<ArbDecision> {
        let status = self.status(requested).await?;
        match status {
            ArbStatus::ExemptFromArb => return Ok(ArbDecision::Requested(requested.clone())),
            ArbStatus::Ignore => return Ok(ArbDecision::NoOpinion(requested.clone())),
            ArbStatus::ReadyForData | ArbStatus::Full => {}
        }

        let resources = self.resources().await?;
        if status == ArbStatus::ReadyForData
            && resources
                .iter()
                .any(|i| &i.name == requested && self.threshold.admits(i, size_hint))
        {
            return Ok(ArbDecision::Requested(requested.clone()));
        }

        let mut candidates = Vec::new();
        for info in resources {
            if &info.name == requested || !self.threshold.admits(&info, size_hint) {
                continue;
            }
            if self.status(&info.name).await? == ArbStatus::ReadyForData {
                candidates.push(info);
            }
        }
        candidates.sort_by(|a, b| {
            b.free_bytes
                .unwrap_or(0)
                .cmp(&a.free_bytes.unwrap_or(0))
                .then_with(|| a.name.cmp(&b.name))
        });

        candidates.into_iter().next().map_or_else(
            || {
                Err(Error::NoCapacity {
                    requested: requested.to_string(),
                    required: self.threshold.required(size_hint),
                })
            },
            |best| {
                Ok(ArbDecision::Substitute {
                    requested: requested.clone(),
                    resource: best.name,
                })
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yoda_host::{HostCall, MemoryHost};

    fn r(name: &str) -> ResourceName {
        ResourceName::new_unchecked(name)
    }

    fn config(min_free_bytes: u64) -> ArbConfig {
        ArbConfig {
            min_free_bytes,
            ..ArbConfig::default()
        }
    }

    fn resource(host: &MemoryHost, name: &str, status: &str, free: u64) {
        host.add_resource(name, Some(free), Some(1000));
        host.add_resource_avu(name, attrs::ARB_STATUS, status);
    }

    fn engine(host: &Arc<MemoryHost>, min_free_bytes: u64) -> ArbEngine<MemoryHost> {
        ArbEngine::new(
            Arc::clone(host),
            HostContext::new("tempZone", "rods"),
            &config(min_free_bytes),
        )
    }

    fn redirect_host() -> Arc<MemoryHost> {
        let host = Arc::new(MemoryHost::new());
        resource(&host, "R1", "FULL", 0);
        resource(&host, "R2", "READY_FOR_DATA", 100);
        resource(&host, "R3", "READY_FOR_DATA", 200);
        host
    }

    #[tokio::test]
    async fn test_full_resource_redirected_to_most_free() {
        let host = redirect_host();
        let engine = engine(&host, 50);
        let decision = engine.resolve(&r("R1")).await.unwrap();
        assert_eq!(
            decision,
            ArbDecision::Substitute {
                requested: r("R1"),
                resource: r("R3"),
            }
        );
        assert!(decision.is_substitute());
    }

    #[tokio::test]
    async fn test_no_capacity_when_nothing_qualifies() {
        let host = redirect_host();
        host.set_free_bytes("R2", 30);
        host.set_free_bytes("R3", 40);
        let engine = engine(&host, 50);
        let err = engine.resolve(&r("R1")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::NoCapacity { ref requested, required: 50 } if requested == "R1"
        ));
    }

    #[tokio::test]
    async fn test_exempt_is_honored() {
        let host = Arc::new(MemoryHost::new());
        resource(&host, "E", "EXEMPT_FROM_ARB", 0);
        resource(&host, "R2", "READY_FOR_DATA", 500);
        let engine = engine(&host, 50);
        assert_eq!(
            engine.resolve(&r("E")).await.unwrap(),
            ArbDecision::Requested(r("E"))
        );
    }

    #[tokio::test]
    async fn test_ready_with_headroom_is_honored() {
        let host = redirect_host();
        let engine = engine(&host, 50);
        assert_eq!(
            engine.resolve(&r("R2")).await.unwrap(),
            ArbDecision::Requested(r("R2"))
        );
    }

    #[tokio::test]
    async fn test_ready_without_headroom_is_redirected() {
        let host = redirect_host();
        let engine = engine(&host, 150);
        assert_eq!(engine.resolve(&r("R2")).await.unwrap().resource(), &r("R3"));
    }

    #[tokio::test]
    async fn test_tie_break_by_name() {
        let host = Arc::new(MemoryHost::new());
        resource(&host, "full", "FULL", 0);
        resource(&host, "b", "READY_FOR_DATA", 100);
        resource(&host, "a", "READY_FOR_DATA", 100);
        let engine = engine(&host, 10);
        assert_eq!(engine.resolve(&r("full")).await.unwrap().resource(), &r("a"));
    }

    #[tokio::test]
    async fn test_unusable_status_never_substitutes() {
        let host = Arc::new(MemoryHost::new());
        resource(&host, "full", "FULL", 0);
        resource(&host, "ambiguous", "READY_FOR_DATA", 900);
        host.add_resource_avu("ambiguous", attrs::ARB_STATUS, "FULL");
        resource(&host, "bogus", "MOSTLY_READY", 900);
        host.add_resource("untagged", Some(900), Some(1000));
        resource(&host, "ok", "READY_FOR_DATA", 20);

        let engine = engine(&host, 10);
        assert_eq!(engine.resolve(&r("full")).await.unwrap().resource(), &r("ok"));
        assert_eq!(engine.status(&r("ambiguous")).await.unwrap(), ArbStatus::Ignore);
        assert_eq!(engine.status(&r("bogus")).await.unwrap(), ArbStatus::Ignore);
        assert_eq!(
            engine.resolve(&r("untagged")).await.unwrap(),
            ArbDecision::NoOpinion(r("untagged"))
        );
    }

    #[tokio::test]
    async fn test_size_hint_raises_threshold() {
        let host = redirect_host();
        resource(&host, "R4", "READY_FOR_DATA", 300);
        let engine = engine(&host, 50);
        assert_eq!(
            engine.resolve_for(&r("R1"), Some(160)).await.unwrap().resource(),
            &r("R4")
        );
        assert!(matches!(
            engine.resolve_for(&r("R1"), Some(400)).await,
            Err(Error::NoCapacity { required: 450, .. })
        ));
    }

    #[test]
    fn test_percent_threshold() {
        let threshold = Threshold {
            min_free_bytes: 0,
            min_free_percent: 25.0,
        };
        let info = |free, total| ResourceInfo {
            name: r("x"),
            free_bytes: Some(free),
            total_bytes: total,
        };
        assert!(threshold.admits(&info(250, Some(1000)), None));
        assert!(!threshold.admits(&info(249, Some(1000)), None));
        assert!(threshold.admits(&info(1, None), None));
    }

    #[tokio::test]
    async fn test_status_cache_populated_on_get() {
        let host = redirect_host();
        let engine = engine(&host, 50);
        assert_eq!(engine.status(&r("R1")).await.unwrap(), ArbStatus::Full);
        assert_eq!(engine.manager().cache().len(ARB_NAMESPACE), 1);

        host.set_resource_avu("R1", attrs::ARB_STATUS, "READY_FOR_DATA");
        assert_eq!(engine.status(&r("R1")).await.unwrap(), ArbStatus::Full);

        engine.invalidate();
        assert_eq!(engine.status(&r("R1")).await.unwrap(), ArbStatus::ReadyForData);
    }

    #[tokio::test]
    async fn test_warm_engine_decides_without_catalog_reads() {
        let host = redirect_host();
        let engine = engine(&host, 50);
        engine.resolve(&r("R1")).await.unwrap();
        engine.resolve(&r("R2")).await.unwrap();
        host.clear_calls();

        assert_eq!(engine.resolve(&r("R1")).await.unwrap().resource(), &r("R3"));
        assert_eq!(
            engine.resolve(&r("R2")).await.unwrap(),
            ArbDecision::Requested(r("R2"))
        );
        assert!(host.calls().is_empty(), "{:?}", host.calls());
    }

    #[tokio::test]
    async fn test_invalidate_refreshes_capacity() {
        let host = redirect_host();
        let engine = engine(&host, 50);
        assert_eq!(engine.resolve(&r("R1")).await.unwrap().resource(), &r("R3"));

        host.set_free_bytes("R3", 10);
        assert_eq!(engine.resolve(&r("R1")).await.unwrap().resource(), &r("R3"));

        engine.invalidate();
        assert_eq!(engine.resolve(&r("R1")).await.unwrap().resource(), &r("R2"));
        assert!(
            host.calls()
                .iter()
                .any(|c| matches!(c, HostCall::ListResources))
        );
    }

    #[tokio::test]
    async fn test_capacity_is_read_only() {
        let host = redirect_host();
        let engine = engine(&host, 50);
        let err = engine
            .capacity()
            .put(&"tempZone".to_string(), &Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_set_status_writes_catalog() {
        let host = redirect_host();
        let engine = engine(&host, 50);
        engine.set_status(&r("R1"), ArbStatus::ReadyForData).await.unwrap();
        assert_eq!(
            host.resource_metadata(&r("R1"), attrs::ARB_STATUS).await.unwrap(),
            vec!["READY_FOR_DATA"]
        );
        assert_eq!(engine.status(&r("R1")).await.unwrap(), ArbStatus::ReadyForData);
    }

    #[tokio::test]
    async fn test_statuses_lists_every_resource() {
        let host = redirect_host();
        let engine = engine(&host, 50);
        let statuses = engine.statuses().await.unwrap();
        let names: Vec<_> = statuses.iter().map(|(i, _)| i.name.as_str()).collect();
        assert_eq!(names, vec!["R1", "R2", "R3"]);
        assert_eq!(statuses[0].1, ArbStatus::Full);
    }
}
