//! Write-admission policy hook
//!
//! Runs inline on the host's write path. The hook never fails: every
//! outcome, including host errors, becomes an [`Admission`] the host
//! enforces.

use crate::arb::ArbEngine;
use tracing::{info, warn};
use yoda_common::{Error, ObjectPath, ResourceName};
use yoda_host::Catalog;

/// A client write as seen by the policy hook
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRequest {
    pub client: String,
    pub resource: ResourceName,
    pub path: ObjectPath,
    pub size_hint: Option<u64>,
}

impl WriteRequest {
    pub fn new(client: impl Into<String>, resource: ResourceName, path: ObjectPath) -> Self {
        Self {
            client: client.into(),
            resource,
            path,
            size_hint: None,
        }
    }

    #[must_use]
    pub const fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }
}

/// Answer returned to the host
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Write on `resource`, which may differ from the requested one
    Allow { resource: ResourceName },
    /// Refuse the write
    Deny { reason: String },
}

impl Admission {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    /// Resource to write on, when allowed
    #[must_use]
    pub const fn resource(&self) -> Option<&ResourceName> {
        match self {
            Self::Allow { resource } => Some(resource),
            Self::Deny { .. } => None,
        }
    }
}

/// Policy hook consulting ARB for every write
pub struct WriteAdmissionPolicy<H: ?Sized> {
    engine: ArbEngine<H>,
}

impl<H: Catalog + ?Sized> WriteAdmissionPolicy<H> {
    pub const fn new(engine: ArbEngine<H>) -> Self {
        Self { engine }
    }

    pub const fn engine(&self) -> &ArbEngine<H> {
        &self.engine
    }

    /// Decide where `request` may write
    pub async fn admit(&self, request: &WriteRequest) -> Admission {
        match self
            .engine
            .resolve_for(&request.resource, request.size_hint)
            .await
        {
            Ok(decision) => {
                if decision.is_substitute() {
                    info!(
                        client = %request.client,
                        path = %request.path,
                        requested = %request.resource,
                        resource = %decision.resource(),
                        "Write redirected"
                    );
                }
                Admission::Allow {
                    resource: decision.resource().clone(),
                }
            }
            Err(e @ Error::NoCapacity { .. }) => {
                warn!(client = %request.client, path = %request.path, error = %e, "Write denied");
                Admission::Deny {
                    reason: format!("No storage resource has room for {}: {e}", request.path),
                }
            }
            Err(e) => {
                warn!(client = %request.client, path = %request.path, error = %e, "Write denied");
                Admission::Deny {
                    reason: format!(
                        "Could not determine a storage resource for {}: {e}",
                        request.path
                    ),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use yoda_common::config::ArbConfig;
    use yoda_common::{HostContext, attrs};
    use yoda_host::MemoryHost;

    fn r(name: &str) -> ResourceName {
        ResourceName::new_unchecked(name)
    }

    fn policy(host: &Arc<MemoryHost>) -> WriteAdmissionPolicy<MemoryHost> {
        let config = ArbConfig {
            min_free_bytes: 50,
            ..ArbConfig::default()
        };
        WriteAdmissionPolicy::new(ArbEngine::new(
            Arc::clone(host),
            HostContext::new("tempZone", "rods"),
            &config,
        ))
    }

    fn request(resource: &str) -> WriteRequest {
        WriteRequest::new(
            "alice",
            r(resource),
            ObjectPath::new("/tempZone/home/research-a/x.csv").unwrap(),
        )
    }

    fn seeded() -> Arc<MemoryHost> {
        let host = Arc::new(MemoryHost::new());
        for (name, status, free) in [("R1", "FULL", 0), ("R2", "READY_FOR_DATA", 100)] {
            host.add_resource(name, Some(free), None);
            host.add_resource_avu(name, attrs::ARB_STATUS, status);
        }
        host
    }

    #[tokio::test]
    async fn test_redirect_allows_substitute() {
        let host = seeded();
        let admission = policy(&host).admit(&request("R1")).await;
        assert_eq!(admission, Admission::Allow { resource: r("R2") });
    }

    #[tokio::test]
    async fn test_no_capacity_denies_with_reason() {
        let host = seeded();
        let admission = policy(&host)
            .admit(&request("R1").with_size_hint(100))
            .await;
        assert!(!admission.is_allowed());
        let Admission::Deny { reason } = admission else {
            panic!("expected denial");
        };
        assert!(reason.contains("/tempZone/home/research-a/x.csv"));
        assert!(reason.contains("150 bytes"));
    }

    #[tokio::test]
    async fn test_unmanaged_resource_allowed_unchanged() {
        let host = seeded();
        let admission = policy(&host).admit(&request("elsewhere")).await;
        assert_eq!(admission.resource(), Some(&r("elsewhere")));
    }

    #[tokio::test]
    async fn test_host_failure_denies() {
        struct Down;

        #[async_trait::async_trait]
        impl Catalog for Down {
            async fn list_resources(&self) -> yoda_host::HostResult<Vec<yoda_host::ResourceInfo>> {
                Err(yoda_host::HostError::Unavailable("down".into()))
            }
            async fn resource_info(
                &self,
                _: &ResourceName,
            ) -> yoda_host::HostResult<Option<yoda_host::ResourceInfo>> {
                Err(yoda_host::HostError::Unavailable("down".into()))
            }
            async fn resource_metadata(
                &self,
                _: &ResourceName,
                _: &str,
            ) -> yoda_host::HostResult<Vec<String>> {
                Err(yoda_host::HostError::Unavailable("down".into()))
            }
            async fn set_resource_metadata(
                &self,
                _: &ResourceName,
                _: &str,
                _: &str,
            ) -> yoda_host::HostResult<()> {
                Err(yoda_host::HostError::Unavailable("down".into()))
            }
            async fn data_objects_with_attribute(
                &self,
                _: &str,
            ) -> yoda_host::HostResult<Vec<yoda_common::FlaggedObject>> {
                Err(yoda_host::HostError::Unavailable("down".into()))
            }
            async fn data_object_metadata(
                &self,
                _: &ObjectPath,
                _: &str,
            ) -> yoda_host::HostResult<Vec<String>> {
                Err(yoda_host::HostError::Unavailable("down".into()))
            }
            async fn add_data_object_metadata(
                &self,
                _: &ObjectPath,
                _: &yoda_common::Avu,
            ) -> yoda_host::HostResult<()> {
                Err(yoda_host::HostError::Unavailable("down".into()))
            }
            async fn access_level(
                &self,
                _: &str,
                _: &ObjectPath,
            ) -> yoda_host::HostResult<yoda_common::AclLevel> {
                Err(yoda_host::HostError::Unavailable("down".into()))
            }
            async fn revisions_info(
                &self,
            ) -> yoda_host::HostResult<Vec<yoda_common::RevisionsInfo>> {
                Err(yoda_host::HostError::Unavailable("down".into()))
            }
        }

        let policy = WriteAdmissionPolicy::new(ArbEngine::new(
            Arc::new(Down),
            HostContext::new("tempZone", "rods"),
            &ArbConfig::default(),
        ));
        let admission = policy.admit(&request("R1")).await;
        let Admission::Deny { reason } = admission else {
            panic!("expected denial");
        };
        assert!(reason.contains("host unavailable"));
    }
}
