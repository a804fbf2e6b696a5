//! Single-node host backed by the redb catalog.

use crate::api::{Catalog, Microservices, ResourceInfo, service};
use crate::error::{HostError, HostResult};
use crate::rule::{CleanupRequest, REVISIONS_CLEAN_UP, RuleCall};
use crate::semantics;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};
use yoda_common::{
    AclLevel, Avu, FlaggedObject, ObjectPath, ObjectType, ResourceName, RevisionsInfo,
};
use yoda_meta_store::{MetaStore, StoredDataObject, StoredResource};

/// Host persisting its catalog in a local redb file
pub struct LocalHost {
    store: MetaStore,
    revision_store: String,
    accepts_payload: bool,
}

impl LocalHost {
    /// Wrap an open store; revisions live under `revision_store`
    pub fn new(store: MetaStore, revision_store: impl Into<String>) -> Self {
        Self {
            store,
            revision_store: revision_store.into(),
            accepts_payload: true,
        }
    }

    /// Open (or create) the catalog at `path`
    pub fn open(path: impl AsRef<Path>, revision_store: impl Into<String>) -> HostResult<Self> {
        Ok(Self::new(MetaStore::open(path)?, revision_store))
    }

    /// Toggle the rule payload side channel
    #[must_use]
    pub const fn with_payload_channel(mut self, enabled: bool) -> Self {
        self.accepts_payload = enabled;
        self
    }

    #[must_use]
    pub fn revision_store(&self) -> &str {
        &self.revision_store
    }

    // ---- Catalog administration ----

    /// Register a resource or update its capacity figures
    pub fn upsert_resource(
        &self,
        name: &ResourceName,
        free_bytes: Option<u64>,
        total_bytes: Option<u64>,
    ) -> HostResult<()> {
        let updated = self.store.update_resource(name.as_str(), |resc| {
            resc.free_bytes = free_bytes;
            resc.total_bytes = total_bytes;
        })?;
        if updated.is_none() {
            self.store.put_resource(&StoredResource {
                name: name.to_string(),
                avus: Vec::new(),
                free_bytes,
                total_bytes,
            })?;
        }
        Ok(())
    }

    /// Create a data object with a single replica on `resource`
    pub fn create_data_object(
        &self,
        path: &ObjectPath,
        owner: &str,
        group: &str,
        size: u64,
        resource: &ResourceName,
        modify_time: i64,
    ) -> HostResult<u64> {
        if self.store.get_resource(resource.as_str())?.is_none() {
            return Err(HostError::NotFound(format!("resource {resource}")));
        }
        let data_id = self.store.next_data_id()?;
        self.store.put_data_object(&StoredDataObject {
            data_id,
            path: path.to_string(),
            owner: owner.to_string(),
            group: group.to_string(),
            size,
            modify_time,
            replicas: vec![resource.to_string()],
            avus: Vec::new(),
            acls: BTreeMap::new(),
        })?;
        Ok(data_id)
    }

    /// Store a revision of an existing data object
    pub fn create_revision(&self, original: &ObjectPath, modify_time: i64) -> HostResult<String> {
        let object = self
            .store
            .get_data_object(original.as_str())?
            .ok_or_else(|| HostError::NotFound(original.to_string()))?;
        let data_id = self.store.next_data_id()?;
        let revision =
            semantics::revision_object(&object, &self.revision_store, data_id, modify_time);
        self.store.put_data_object(&revision)?;
        Ok(revision.path)
    }

    /// Replicas of a data object
    pub fn replicas(&self, path: &ObjectPath) -> HostResult<Vec<String>> {
        self.store
            .get_data_object(path.as_str())?
            .map(|o| o.replicas)
            .ok_or_else(|| HostError::NotFound(path.to_string()))
    }

    fn resource_info_of(resc: &StoredResource) -> ResourceInfo {
        ResourceInfo {
            name: ResourceName::new_unchecked(resc.name.clone()),
            free_bytes: resc.free_bytes,
            total_bytes: resc.total_bytes,
        }
    }

    fn update_object<R>(
        &self,
        path: &ObjectPath,
        f: impl FnOnce(&mut StoredDataObject) -> R,
    ) -> HostResult<R> {
        self.store
            .update_data_object(path.as_str(), f)?
            .ok_or_else(|| HostError::NotFound(path.to_string()))
    }
}

#[async_trait]
impl Catalog for LocalHost {
    async fn list_resources(&self) -> HostResult<Vec<ResourceInfo>> {
        let mut resources = self.store.load_resources()?;
        resources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(resources.iter().map(Self::resource_info_of).collect())
    }

    async fn resource_info(&self, resource: &ResourceName) -> HostResult<Option<ResourceInfo>> {
        Ok(self
            .store
            .get_resource(resource.as_str())?
            .as_ref()
            .map(Self::resource_info_of))
    }

    async fn resource_metadata(
        &self,
        resource: &ResourceName,
        attribute: &str,
    ) -> HostResult<Vec<String>> {
        Ok(self
            .store
            .get_resource(resource.as_str())?
            .map(|resc| resc.values_of(attribute))
            .unwrap_or_default())
    }

    async fn set_resource_metadata(
        &self,
        resource: &ResourceName,
        attribute: &str,
        value: &str,
    ) -> HostResult<()> {
        self.store
            .update_resource(resource.as_str(), |resc| resc.set_avu(attribute, value))?
            .ok_or_else(|| HostError::NotFound(format!("resource {resource}")))
    }

    async fn data_objects_with_attribute(
        &self,
        attribute: &str,
    ) -> HostResult<Vec<FlaggedObject>> {
        let objects = self.store.load_data_objects()?;
        Ok(objects
            .iter()
            .flat_map(|o| semantics::flagged_entries(o, attribute))
            .collect())
    }

    async fn data_object_metadata(
        &self,
        path: &ObjectPath,
        attribute: &str,
    ) -> HostResult<Vec<String>> {
        self.store
            .get_data_object(path.as_str())?
            .map(|o| o.values_of(attribute))
            .ok_or_else(|| HostError::NotFound(path.to_string()))
    }

    async fn add_data_object_metadata(&self, path: &ObjectPath, avu: &Avu) -> HostResult<()> {
        self.update_object(path, |o| {
            o.add_avu(avu.clone());
        })
    }

    async fn access_level(&self, actor: &str, path: &ObjectPath) -> HostResult<AclLevel> {
        self.store
            .get_data_object(path.as_str())?
            .map(|o| o.access_of(actor))
            .ok_or_else(|| HostError::NotFound(path.to_string()))
    }

    async fn revisions_info(&self) -> HostResult<Vec<RevisionsInfo>> {
        let objects = self.store.load_data_objects_within(&self.revision_store)?;
        Ok(semantics::revisions_info(&objects))
    }
}

#[async_trait]
impl Microservices for LocalHost {
    async fn data_obj_repl(
        &self,
        path: &ObjectPath,
        from: &ResourceName,
        to: &ResourceName,
        admin: bool,
    ) -> HostResult<()> {
        if self.store.get_resource(to.as_str())?.is_none() {
            return Err(HostError::microservice(
                service::DATA_OBJ_REPL,
                format!("unknown resource {to}"),
            ));
        }
        let created = self.update_object(path, |o| semantics::replicate(o, from, to))??;
        debug!(%path, %from, %to, admin, created, "Replicated data object");
        Ok(())
    }

    async fn acl_set_sudo(
        &self,
        _recursive: bool,
        level: AclLevel,
        actor: &str,
        path: &ObjectPath,
    ) -> HostResult<()> {
        self.update_object(path, |o| o.grant(actor, level))
    }

    async fn metadata_remove_sudo(
        &self,
        path: &ObjectPath,
        object_type: ObjectType,
        avu: &Avu,
    ) -> HostResult<()> {
        if object_type != ObjectType::DataObject {
            return Err(HostError::microservice(
                service::SUDO_OBJ_META_REMOVE,
                format!("unsupported object type {}", object_type.as_flag()),
            ));
        }
        // Removing an absent triple is not an error
        self.update_object(path, |o| {
            o.remove_avu(&avu.attribute, &avu.value, &avu.unit);
        })
    }

    fn accepts_rule_payload(&self) -> bool {
        self.accepts_payload
    }

    async fn call_rule(&self, call: &RuleCall) -> HostResult<String> {
        if call.name != REVISIONS_CLEAN_UP {
            return Err(HostError::Rule {
                rule: call.name.clone(),
                message: "no such rule".into(),
            });
        }
        if call.args.iter().any(|a| a.is_payload()) && !self.accepts_payload {
            return Err(HostError::Payload("side channel disabled".into()));
        }
        let request = CleanupRequest::from_call(call)?;
        let stdout = semantics::run_revisions_clean_up(&request, |path| {
            Ok(self.store.delete_data_object(path)?)
        })?;
        info!(rule = %call.name, entries = request.chunk.len(), "Rule completed");
        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleArg;
    use yoda_common::{BucketCase, attrs};

    fn host(dir: &tempfile::TempDir) -> LocalHost {
        LocalHost::open(dir.path().join("catalog.redb"), "/tempZone/yoda/revisions").unwrap()
    }

    fn resc(name: &str) -> ResourceName {
        ResourceName::new(name).unwrap()
    }

    fn path(p: &str) -> ObjectPath {
        ObjectPath::new(p).unwrap()
    }

    #[tokio::test]
    async fn test_replication_flow() {
        let dir = tempfile::tempdir().unwrap();
        let host = host(&dir);
        host.upsert_resource(&resc("src"), Some(100), Some(1000)).unwrap();
        host.upsert_resource(&resc("dst"), Some(500), Some(1000)).unwrap();
        let p = path("/tempZone/home/research-a/a.txt");
        host.create_data_object(&p, "alice", "research-a", 5, &resc("src"), 0)
            .unwrap();
        host.add_data_object_metadata(&p, &Avu::new(attrs::REPLICATION_SCHEDULED, "src,dst"))
            .await
            .unwrap();

        let flagged = host
            .data_objects_with_attribute(attrs::REPLICATION_SCHEDULED)
            .await
            .unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].collection, "/tempZone/home/research-a");
        assert_eq!(flagged[0].name, "a.txt");
        assert_eq!(flagged[0].value, "src,dst");

        host.data_obj_repl(&p, &resc("src"), &resc("dst"), true)
            .await
            .unwrap();
        // Idempotent
        host.data_obj_repl(&p, &resc("src"), &resc("dst"), true)
            .await
            .unwrap();
        assert_eq!(host.replicas(&p).unwrap(), vec!["src", "dst"]);

        assert_eq!(host.access_level("rods", &p).await.unwrap(), AclLevel::Null);
        host.acl_set_sudo(false, AclLevel::Own, "rods", &p).await.unwrap();
        assert_eq!(host.access_level("rods", &p).await.unwrap(), AclLevel::Own);

        host.metadata_remove_sudo(
            &p,
            ObjectType::DataObject,
            &Avu::new(attrs::REPLICATION_SCHEDULED, "src,dst"),
        )
        .await
        .unwrap();
        assert!(
            host.data_objects_with_attribute(attrs::REPLICATION_SCHEDULED)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_replicate_to_unknown_resource_fails() {
        let dir = tempfile::tempdir().unwrap();
        let host = host(&dir);
        host.upsert_resource(&resc("src"), None, None).unwrap();
        let p = path("/tempZone/home/research-a/a.txt");
        host.create_data_object(&p, "alice", "research-a", 5, &resc("src"), 0)
            .unwrap();
        let err = host
            .data_obj_repl(&p, &resc("src"), &resc("nowhere"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Microservice { .. }));
    }

    #[tokio::test]
    async fn test_resource_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let host = host(&dir);
        host.upsert_resource(&resc("R1"), Some(0), Some(100)).unwrap();
        host.set_resource_metadata(&resc("R1"), attrs::ARB_STATUS, "FULL")
            .await
            .unwrap();
        assert_eq!(
            host.resource_metadata(&resc("R1"), attrs::ARB_STATUS)
                .await
                .unwrap(),
            vec!["FULL"]
        );
        assert!(
            host.resource_metadata(&resc("absent"), attrs::ARB_STATUS)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(
            host.set_resource_metadata(&resc("absent"), attrs::ARB_STATUS, "FULL")
                .await
                .is_err()
        );
        let info = host.resource_info(&resc("R1")).await.unwrap().unwrap();
        assert_eq!(info.free_bytes, Some(0));
    }

    #[tokio::test]
    async fn test_revisions_clean_up_rule() {
        let dir = tempfile::tempdir().unwrap();
        let host = host(&dir).with_payload_channel(false);
        host.upsert_resource(&resc("src"), None, None).unwrap();
        let p = path("/tempZone/home/research-a/a.txt");
        host.create_data_object(&p, "alice", "research-a", 5, &resc("src"), 0)
            .unwrap();
        let eod = 1_700_006_399;
        for age in [60, 120, 180, 200 * 24 * 3600] {
            host.create_revision(&p, eod - age).unwrap();
        }

        let info = host.revisions_info().await.unwrap();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].revisions.len(), 4);

        let request = CleanupRequest {
            chunk: info,
            bucket_case: BucketCase::Simple,
            end_of_calendar_day: eod,
            verbose: true,
        };
        assert!(host.call_rule(&request.to_call(true).unwrap()).await.is_err());

        let stdout = host.call_rule(&request.to_call(false).unwrap()).await.unwrap();
        assert!(stdout.contains("removed 1 revision(s)"));
        let info = host.revisions_info().await.unwrap();
        assert_eq!(info[0].revisions.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_rule() {
        let dir = tempfile::tempdir().unwrap();
        let host = host(&dir);
        let call = RuleCall::new("rule_does_not_exist", vec![RuleArg::Str("x".into())]);
        assert!(matches!(
            host.call_rule(&call).await,
            Err(HostError::Rule { .. })
        ));
    }
}
