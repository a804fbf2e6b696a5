//! Configuration types for the coordination core
//!
//! The configuration is a TOML file. Every field has a default, so a
//! missing file or a partial file yields a complete configuration.

use crate::error::{Error, Result};
use crate::types::AclLevel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/yoda/coordinator.toml";

/// Root configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub arb: ArbConfig,
    #[serde(default)]
    pub replication: ReplicationConfig,
    #[serde(default)]
    pub revisions: RevisionConfig,
    #[serde(default)]
    pub jobs: JobConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::configuration(e.to_string()))
    }

    /// Load the configuration file, falling back to defaults when it does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
            .map_err(|e| Error::configuration(format!("{}: {e}", path.display())))
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.replication.max_parallel == 0 {
            return Err(Error::configuration("replication.max_parallel must be at least 1"));
        }
        if self.revisions.batch_size == 0 {
            return Err(Error::configuration("revisions.batch_size must be at least 1"));
        }
        if !(0.0..=100.0).contains(&self.arb.min_free_percent) {
            return Err(Error::configuration("arb.min_free_percent must be within 0..=100"));
        }
        Ok(())
    }
}

/// Host binding configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HostConfig {
    /// Zone name
    #[serde(default = "default_zone")]
    pub zone: String,
    /// Actor the batch jobs run as
    #[serde(default = "default_actor")]
    pub actor: String,
    /// Catalog database used by the local host
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    /// Revision store collection; derived from the zone when unset
    #[serde(default)]
    pub revision_store: Option<String>,
}

impl HostConfig {
    /// Collection holding revisions
    #[must_use]
    pub fn revision_store(&self) -> String {
        self.revision_store
            .clone()
            .unwrap_or_else(|| format!("/{}/yoda/revisions", self.zone))
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            zone: default_zone(),
            actor: default_actor(),
            catalog_path: default_catalog_path(),
            revision_store: None,
        }
    }
}

/// Automatic resource balancing configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArbConfig {
    /// Minimum free bytes for a resource to accept writes
    #[serde(default)]
    pub min_free_bytes: u64,
    /// Minimum free percentage of total capacity; 0 disables the check
    #[serde(default)]
    pub min_free_percent: f64,
    /// Populate the status cache on a miss
    #[serde(default = "default_true")]
    pub populate_cache_on_get: bool,
}

impl Default for ArbConfig {
    fn default() -> Self {
        Self {
            min_free_bytes: 0,
            min_free_percent: 0.0,
            populate_cache_on_get: true,
        }
    }
}

/// Replication batch configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Upper bound on concurrent replication calls
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Pass the admin flag to the replication microservice
    #[serde(default = "default_true")]
    pub admin_mode: bool,
    /// Access level granted to the actor before clearing a flag
    #[serde(default = "default_acl_level")]
    pub acl_level: AclLevel,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            admin_mode: true,
            acl_level: default_acl_level(),
        }
    }
}

/// What revision cleanup does with the final chunk of a run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TailPolicy {
    /// Leave the last `batch_size` entries for the next run
    #[default]
    Hold,
    /// Process every entry
    Drain,
}

/// Revision cleanup configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RevisionConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub tail_policy: TailPolicy,
}

impl Default for RevisionConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            tail_policy: TailPolicy::Hold,
        }
    }
}

/// Batch job configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobConfig {
    /// Directory holding the job lock files
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            lock_dir: default_lock_dir(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_zone() -> String {
    "tempZone".to_string()
}

fn default_actor() -> String {
    "rods".to_string()
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("/var/lib/yoda/catalog.redb")
}

const fn default_true() -> bool {
    true
}

const fn default_max_parallel() -> usize {
    4
}

const fn default_acl_level() -> AclLevel {
    AclLevel::Own
}

const fn default_batch_size() -> usize {
    1
}

fn default_lock_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.host.zone, "tempZone");
        assert_eq!(config.host.revision_store(), "/tempZone/yoda/revisions");
        assert_eq!(config.replication.max_parallel, 4);
        assert_eq!(config.revisions.batch_size, 1);
        assert_eq!(config.revisions.tail_policy, TailPolicy::Hold);
        assert_eq!(config.jobs.lock_dir, PathBuf::from("/tmp"));
        assert!(config.arb.populate_cache_on_get);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_document() {
        let config = Config::from_toml(
            r#"
            [host]
            zone = "nlmumc"

            [arb]
            min_free_bytes = 50

            [revisions]
            batch_size = 20
            tail_policy = "drain"
            "#,
        )
        .unwrap();
        assert_eq!(config.host.zone, "nlmumc");
        assert_eq!(config.host.actor, "rods");
        assert_eq!(config.arb.min_free_bytes, 50);
        assert_eq!(config.revisions.batch_size, 20);
        assert_eq!(config.revisions.tail_policy, TailPolicy::Drain);
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = Config::default();
        config.revisions.batch_size = 0;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[replication]\nmax_parallel = \"many\"\n").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Configuration(_))));
    }
}
