//! Yoda Host - the data-grid host as seen by the coordination core
//!
//! The core performs no I/O of its own: every catalog query and every
//! replication, ACL or metadata change goes through the [`Catalog`] and
//! [`Microservices`] traits defined here.
//!
//! Two implementations ship with the crate:
//! - [`LocalHost`]: a single-node host persisting its catalog in redb,
//!   used by the batch drivers and the operator CLI
//! - [`MemoryHost`]: an in-memory host that records every call and
//!   supports fault injection, used by tests
//!
//! Both run the revision retention rule from [`retention`], so the batch
//! driver and the rule share one implementation of the policy.

pub mod api;
pub mod error;
pub mod local;
pub mod memory;
pub mod retention;
pub mod rule;

mod semantics;

pub use api::{Catalog, Host, Microservices, ResourceInfo};
pub use error::{HostError, HostResult};
pub use local::LocalHost;
pub use memory::{HostCall, MemoryHost};
pub use rule::{RuleArg, RuleCall};
