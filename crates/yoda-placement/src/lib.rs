//! Yoda Placement - automatic resource balancing
//!
//! This crate decides where new writes land. It is consulted inline by the
//! host's write path. Statuses and resource capacity are cached, so a warm
//! engine decides without touching the catalog.
//!
//! # Components
//!
//! ## Cached data manager
//! Write-through cache in front of catalog reads ([`CachedDataManager`]).
//! The catalog stays authoritative; cache failures are logged and ignored.
//!
//! ## ARB engine
//! Resolves a requested resource to itself or a substitute with enough
//! headroom, based on the operator-set `yoda::arb` status ([`ArbEngine`]).
//!
//! ## Write admission
//! Policy hook turning ARB decisions into allow/deny answers that never
//! fail ([`WriteAdmissionPolicy`]).
//!
//! # Example
//! ```ignore
//! use yoda_placement::{ArbEngine, WriteAdmissionPolicy, WriteRequest};
//!
//! let engine = ArbEngine::new(host, context, &config.arb);
//! let policy = WriteAdmissionPolicy::new(engine);
//! let admission = policy.admit(&WriteRequest::new("alice", resc, path)).await;
//! ```

pub mod arb;
pub mod cache;
pub mod metrics;
pub mod policy;

pub use arb::{
    ArbDataManager, ArbDecision, ArbEngine, ArbStatusSource, CapacityManager, CapacitySource,
    Threshold,
};
pub use cache::{CacheBackend, CachedDataManager, DataSource, MemoryCache};
pub use policy::{Admission, WriteAdmissionPolicy, WriteRequest};
