//! In-memory host with call recording and fault injection.
//!
//! Every catalog query and microservice call is appended to a call log so
//! tests can assert on what the core asked the host to do. Faults can be
//! injected per path (replication, metadata removal), for enumeration, and
//! for rule calls after a number of successes.

use crate::api::{Catalog, Microservices, ResourceInfo, service};
use crate::error::{HostError, HostResult};
use crate::rule::{CleanupRequest, REVISIONS_CLEAN_UP, RuleCall};
use crate::semantics;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use yoda_common::{
    AclLevel, Avu, FlaggedObject, ObjectPath, ObjectType, ResourceName, RevisionsInfo,
};
use yoda_meta_store::{StoredDataObject, StoredResource};

/// A recorded host interaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostCall {
    ListResources,
    ResourceInfo(String),
    ResourceMetadata { resource: String, attribute: String },
    SetResourceMetadata { resource: String, attribute: String, value: String },
    QueryAttribute(String),
    DataObjectMetadata { path: String, attribute: String },
    AddMetadata { path: String, attribute: String, value: String },
    AccessLevel { actor: String, path: String },
    RevisionsInfo,
    Replicate { path: String, from: String, to: String, admin: bool },
    AclSet { path: String, actor: String, level: AclLevel, recursive: bool },
    MetadataRemove { path: String, attribute: String, value: String },
    Rule { name: String, args: Vec<String>, payload: bool },
}

impl HostCall {
    /// Whether this call reads or writes the catalog
    #[must_use]
    pub const fn touches_catalog(&self) -> bool {
        !matches!(self, Self::Rule { .. })
    }
}

#[derive(Default)]
struct Faults {
    replication: HashSet<String>,
    metadata_remove: HashSet<String>,
    enumeration: bool,
    rule_after: Option<usize>,
}

#[derive(Default)]
struct MemoryState {
    objects: BTreeMap<String, StoredDataObject>,
    resources: BTreeMap<String, StoredResource>,
    calls: Vec<HostCall>,
    faults: Faults,
    rule_successes: usize,
    next_id: u64,
}

/// Host kept entirely in memory
pub struct MemoryHost {
    state: Mutex<MemoryState>,
    revision_store: String,
    accepts_payload: bool,
    replication_delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next_id: 10_000,
                ..MemoryState::default()
            }),
            revision_store: "/tempZone/yoda/revisions".into(),
            accepts_payload: true,
            replication_delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub const fn with_payload_channel(mut self, enabled: bool) -> Self {
        self.accepts_payload = enabled;
        self
    }

    /// Make every replication call take `delay`
    #[must_use]
    pub const fn with_replication_delay(mut self, delay: Duration) -> Self {
        self.replication_delay = Some(delay);
        self
    }

    // ---- Seeding ----

    pub fn add_resource(&self, name: &str, free_bytes: Option<u64>, total_bytes: Option<u64>) {
        self.state.lock().resources.insert(
            name.to_string(),
            StoredResource {
                name: name.to_string(),
                avus: Vec::new(),
                free_bytes,
                total_bytes,
            },
        );
    }

    /// Attach a raw triple to a resource, without replacing existing values
    pub fn add_resource_avu(&self, name: &str, attribute: &str, value: &str) {
        if let Some(resc) = self.state.lock().resources.get_mut(name) {
            resc.avus.push(Avu::new(attribute, value));
        }
    }

    /// Replace the values of a resource triple behind the core's back
    pub fn set_resource_avu(&self, name: &str, attribute: &str, value: &str) {
        if let Some(resc) = self.state.lock().resources.get_mut(name) {
            resc.set_avu(attribute, value);
        }
    }

    pub fn set_free_bytes(&self, name: &str, free_bytes: u64) {
        if let Some(resc) = self.state.lock().resources.get_mut(name) {
            resc.free_bytes = Some(free_bytes);
        }
    }

    /// Create a data object owned by `owner` with replicas on `replicas`
    pub fn add_data_object(&self, path: &str, owner: &str, replicas: &[&str]) {
        let mut state = self.state.lock();
        state.next_id += 1;
        let data_id = state.next_id;
        state.objects.insert(
            path.to_string(),
            StoredDataObject {
                data_id,
                path: path.to_string(),
                owner: owner.to_string(),
                group: String::new(),
                size: 0,
                modify_time: 0,
                replicas: replicas.iter().map(|r| (*r).to_string()).collect(),
                avus: Vec::new(),
                acls: BTreeMap::new(),
            },
        );
    }

    pub fn add_data_object_avu(&self, path: &str, attribute: &str, value: &str) {
        if let Some(object) = self.state.lock().objects.get_mut(path) {
            object.add_avu(Avu::new(attribute, value));
        }
    }

    /// Store a revision of `original` (which must exist) modified at `modify_time`
    pub fn add_revision(&self, original: &str, modify_time: i64) -> Option<String> {
        let mut state = self.state.lock();
        let object = state.objects.get(original)?.clone();
        state.next_id += 1;
        let revision =
            semantics::revision_object(&object, &self.revision_store, state.next_id, modify_time);
        let path = revision.path.clone();
        state.objects.insert(path.clone(), revision);
        Some(path)
    }

    // ---- Fault injection ----

    pub fn fail_replication_for(&self, path: &str) {
        self.state.lock().faults.replication.insert(path.to_string());
    }

    pub fn fail_metadata_remove_for(&self, path: &str) {
        self.state
            .lock()
            .faults
            .metadata_remove
            .insert(path.to_string());
    }

    pub fn fail_enumeration(&self) {
        self.state.lock().faults.enumeration = true;
    }

    /// Fail every rule call after `successes` successful ones
    pub fn fail_rule_after(&self, successes: usize) {
        self.state.lock().faults.rule_after = Some(successes);
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults = Faults::default();
    }

    // ---- Inspection ----

    #[must_use]
    pub fn calls(&self) -> Vec<HostCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Replication calls, in call order
    #[must_use]
    pub fn replicate_calls(&self) -> Vec<HostCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, HostCall::Replicate { .. }))
            .collect()
    }

    /// Rule calls, in call order
    #[must_use]
    pub fn rule_calls(&self) -> Vec<HostCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, HostCall::Rule { .. }))
            .collect()
    }

    #[must_use]
    pub fn object(&self, path: &str) -> Option<StoredDataObject> {
        self.state.lock().objects.get(path).cloned()
    }

    #[must_use]
    pub fn data_object_values(&self, path: &str, attribute: &str) -> Vec<String> {
        self.object(path)
            .map(|o| o.values_of(attribute))
            .unwrap_or_default()
    }

    /// Highest number of replication calls observed in flight at once
    #[must_use]
    pub fn max_concurrent_replications(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: HostCall) {
        self.state.lock().calls.push(call);
    }

    fn resource_info_of(resc: &StoredResource) -> ResourceInfo {
        ResourceInfo {
            name: ResourceName::new_unchecked(resc.name.clone()),
            free_bytes: resc.free_bytes,
            total_bytes: resc.total_bytes,
        }
    }
}

#[async_trait]
impl Catalog for MemoryHost {
    async fn list_resources(&self) -> HostResult<Vec<ResourceInfo>> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::ListResources);
        Ok(state.resources.values().map(Self::resource_info_of).collect())
    }

    async fn resource_info(&self, resource: &ResourceName) -> HostResult<Option<ResourceInfo>> {
        let mut state = self.state.lock();
        state
            .calls
            .push(HostCall::ResourceInfo(resource.to_string()));
        Ok(state
            .resources
            .get(resource.as_str())
            .map(Self::resource_info_of))
    }

    async fn resource_metadata(
        &self,
        resource: &ResourceName,
        attribute: &str,
    ) -> HostResult<Vec<String>> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::ResourceMetadata {
            resource: resource.to_string(),
            attribute: attribute.to_string(),
        });
        Ok(state
            .resources
            .get(resource.as_str())
            .map(|r| r.values_of(attribute))
            .unwrap_or_default())
    }

    async fn set_resource_metadata(
        &self,
        resource: &ResourceName,
        attribute: &str,
        value: &str,
    ) -> HostResult<()> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::SetResourceMetadata {
            resource: resource.to_string(),
            attribute: attribute.to_string(),
            value: value.to_string(),
        });
        let resc = state
            .resources
            .get_mut(resource.as_str())
            .ok_or_else(|| HostError::NotFound(format!("resource {resource}")))?;
        resc.set_avu(attribute, value);
        Ok(())
    }

    async fn data_objects_with_attribute(
        &self,
        attribute: &str,
    ) -> HostResult<Vec<FlaggedObject>> {
        let mut state = self.state.lock();
        state
            .calls
            .push(HostCall::QueryAttribute(attribute.to_string()));
        if state.faults.enumeration {
            return Err(HostError::Unavailable("catalog query failed".into()));
        }
        Ok(state
            .objects
            .values()
            .flat_map(|o| semantics::flagged_entries(o, attribute))
            .collect())
    }

    async fn data_object_metadata(
        &self,
        path: &ObjectPath,
        attribute: &str,
    ) -> HostResult<Vec<String>> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::DataObjectMetadata {
            path: path.to_string(),
            attribute: attribute.to_string(),
        });
        state
            .objects
            .get(path.as_str())
            .map(|o| o.values_of(attribute))
            .ok_or_else(|| HostError::NotFound(path.to_string()))
    }

    async fn add_data_object_metadata(&self, path: &ObjectPath, avu: &Avu) -> HostResult<()> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::AddMetadata {
            path: path.to_string(),
            attribute: avu.attribute.clone(),
            value: avu.value.clone(),
        });
        let object = state
            .objects
            .get_mut(path.as_str())
            .ok_or_else(|| HostError::NotFound(path.to_string()))?;
        object.add_avu(avu.clone());
        Ok(())
    }

    async fn access_level(&self, actor: &str, path: &ObjectPath) -> HostResult<AclLevel> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::AccessLevel {
            actor: actor.to_string(),
            path: path.to_string(),
        });
        state
            .objects
            .get(path.as_str())
            .map(|o| o.access_of(actor))
            .ok_or_else(|| HostError::NotFound(path.to_string()))
    }

    async fn revisions_info(&self) -> HostResult<Vec<RevisionsInfo>> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::RevisionsInfo);
        if state.faults.enumeration {
            return Err(HostError::Unavailable("revisions query failed".into()));
        }
        let prefix = format!("{}/", self.revision_store);
        Ok(semantics::revisions_info(
            state
                .objects
                .values()
                .filter(|o| o.path.starts_with(&prefix)),
        ))
    }
}

#[async_trait]
impl Microservices for MemoryHost {
    async fn data_obj_repl(
        &self,
        path: &ObjectPath,
        from: &ResourceName,
        to: &ResourceName,
        admin: bool,
    ) -> HostResult<()> {
        self.record(HostCall::Replicate {
            path: path.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            admin,
        });

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.replication_delay {
            tokio::time::sleep(delay).await;
        }
        let result = {
            let mut state = self.state.lock();
            if state.faults.replication.contains(path.as_str()) {
                Err(HostError::microservice(
                    service::DATA_OBJ_REPL,
                    "injected replication failure",
                ))
            } else if !state.resources.contains_key(to.as_str()) {
                Err(HostError::microservice(
                    service::DATA_OBJ_REPL,
                    format!("unknown resource {to}"),
                ))
            } else {
                match state.objects.get_mut(path.as_str()) {
                    Some(object) => semantics::replicate(object, from, to).map(|_| ()),
                    None => Err(HostError::NotFound(path.to_string())),
                }
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn acl_set_sudo(
        &self,
        recursive: bool,
        level: AclLevel,
        actor: &str,
        path: &ObjectPath,
    ) -> HostResult<()> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::AclSet {
            path: path.to_string(),
            actor: actor.to_string(),
            level,
            recursive,
        });
        let object = state
            .objects
            .get_mut(path.as_str())
            .ok_or_else(|| HostError::NotFound(path.to_string()))?;
        object.grant(actor, level);
        Ok(())
    }

    async fn metadata_remove_sudo(
        &self,
        path: &ObjectPath,
        object_type: ObjectType,
        avu: &Avu,
    ) -> HostResult<()> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::MetadataRemove {
            path: path.to_string(),
            attribute: avu.attribute.clone(),
            value: avu.value.clone(),
        });
        if object_type != ObjectType::DataObject
            || state.faults.metadata_remove.contains(path.as_str())
        {
            return Err(HostError::microservice(
                service::SUDO_OBJ_META_REMOVE,
                format!("cannot remove {} from {path}", avu.attribute),
            ));
        }
        let object = state
            .objects
            .get_mut(path.as_str())
            .ok_or_else(|| HostError::NotFound(path.to_string()))?;
        object.remove_avu(&avu.attribute, &avu.value, &avu.unit);
        Ok(())
    }

    fn accepts_rule_payload(&self) -> bool {
        self.accepts_payload
    }

    async fn call_rule(&self, call: &RuleCall) -> HostResult<String> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::Rule {
            name: call.name.clone(),
            args: call
                .args
                .iter()
                .map(|a| a.decode().unwrap_or_default())
                .collect(),
            payload: call.args.iter().any(|a| a.is_payload()),
        });
        if call.name != REVISIONS_CLEAN_UP {
            return Err(HostError::Rule {
                rule: call.name.clone(),
                message: "no such rule".into(),
            });
        }
        if state
            .faults
            .rule_after
            .is_some_and(|limit| state.rule_successes >= limit)
        {
            return Err(HostError::Rule {
                rule: call.name.clone(),
                message: "injected rule failure".into(),
            });
        }
        let request = CleanupRequest::from_call(call)?;
        let stdout = semantics::run_revisions_clean_up(&request, |path| {
            Ok(state.objects.remove(path).is_some())
        })?;
        state.rule_successes += 1;
        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yoda_common::attrs;

    #[tokio::test]
    async fn test_records_calls() {
        let host = MemoryHost::new();
        host.add_resource("src", Some(10), Some(100));
        host.add_resource("dst", Some(10), Some(100));
        host.add_data_object("/tempZone/home/a", "alice", &["src"]);
        host.add_data_object_avu("/tempZone/home/a", attrs::REPLICATION_SCHEDULED, "src,dst");

        let flagged = host
            .data_objects_with_attribute(attrs::REPLICATION_SCHEDULED)
            .await
            .unwrap();
        assert_eq!(flagged[0].path().as_str(), "/tempZone/home/a");

        let path = ObjectPath::new("/tempZone/home/a").unwrap();
        host.data_obj_repl(
            &path,
            &ResourceName::new_unchecked("src"),
            &ResourceName::new_unchecked("dst"),
            true,
        )
        .await
        .unwrap();

        assert_eq!(host.replicate_calls().len(), 1);
        assert_eq!(
            host.calls()[0],
            HostCall::QueryAttribute(attrs::REPLICATION_SCHEDULED.into())
        );
        assert_eq!(host.object("/tempZone/home/a").unwrap().replicas, vec!["src", "dst"]);
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let host = MemoryHost::new();
        host.add_resource("dst", None, None);
        host.add_data_object("/tempZone/home/a", "alice", &["src"]);
        host.fail_replication_for("/tempZone/home/a");
        host.fail_enumeration();

        let path = ObjectPath::new("/tempZone/home/a").unwrap();
        assert!(
            host.data_obj_repl(
                &path,
                &ResourceName::new_unchecked("src"),
                &ResourceName::new_unchecked("dst"),
                true,
            )
            .await
            .is_err()
        );
        assert!(host.data_objects_with_attribute("x").await.is_err());
        assert!(host.revisions_info().await.is_err());

        host.clear_faults();
        assert!(host.revisions_info().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revisions_info_groups_by_original() {
        let host = MemoryHost::new();
        host.add_data_object("/tempZone/home/research-a/x", "alice", &["src"]);
        host.add_data_object("/tempZone/home/research-a/y", "alice", &["src"]);
        host.add_revision("/tempZone/home/research-a/x", 100).unwrap();
        host.add_revision("/tempZone/home/research-a/x", 200).unwrap();
        host.add_revision("/tempZone/home/research-a/y", 300).unwrap();
        assert!(host.add_revision("/tempZone/home/absent", 1).is_none());

        let info = host.revisions_info().await.unwrap();
        assert_eq!(info.len(), 2);
        assert_eq!(info[0].original_path, "/tempZone/home/research-a/x");
        assert_eq!(info[0].revisions.len(), 2);
        assert_eq!(info[1].revisions.len(), 1);
    }
}
