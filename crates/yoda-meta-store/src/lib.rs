//! Yoda Metadata Store - persistent catalog for the local host
//!
//! This crate persists data objects, their replicas, metadata and ACLs,
//! and storage resources with their metadata and capacity figures.

pub mod store;
pub mod tables;
pub mod types;

// Re-exports
pub use store::{MetaStore, MetaStoreError, MetaStoreResult};
pub use types::{StoredDataObject, StoredResource};
