//! Yoda Common - Shared types and utilities
//!
//! This crate provides the types, error definitions and configuration
//! shared by the storage coordination components: the ARB decision engine,
//! the replication batch job and the revision cleanup batch job.

pub mod attrs;
pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
