//! Host interface traits
//!
//! Catalog queries and microservice calls consumed by the coordination
//! core. Every call is a potential suspension point; the core imposes no
//! timeouts of its own.

use crate::error::HostResult;
use crate::rule::RuleCall;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use yoda_common::{
    AclLevel, Avu, FlaggedObject, ObjectPath, ObjectType, ResourceName, RevisionsInfo,
};

/// Microservice names, as they appear in logs and errors
pub mod service {
    pub const DATA_OBJ_REPL: &str = "msiDataObjRepl";
    pub const SUDO_OBJ_ACL_SET: &str = "msiSudoObjAclSet";
    pub const SUDO_OBJ_META_REMOVE: &str = "msiSudoObjMetaRemove";
    pub const RULE_EXEC: &str = "msiExecRule";
}

/// Observed capacity of a storage resource
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub name: ResourceName,
    pub free_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
}

/// Read/write access to the host's metadata catalog
#[async_trait]
pub trait Catalog: Send + Sync {
    /// All resources with their observed capacity, ordered by name
    async fn list_resources(&self) -> HostResult<Vec<ResourceInfo>>;

    /// Capacity of a single resource, `None` when it does not exist
    async fn resource_info(&self, resource: &ResourceName) -> HostResult<Option<ResourceInfo>>;

    /// Values of `attribute` on a resource; empty for unknown resources
    async fn resource_metadata(
        &self,
        resource: &ResourceName,
        attribute: &str,
    ) -> HostResult<Vec<String>>;

    /// Replace every value of `attribute` on a resource with `value`
    async fn set_resource_metadata(
        &self,
        resource: &ResourceName,
        attribute: &str,
        value: &str,
    ) -> HostResult<()>;

    /// Every data object bearing `attribute`, one entry per value
    async fn data_objects_with_attribute(&self, attribute: &str)
    -> HostResult<Vec<FlaggedObject>>;

    /// Values of `attribute` on a data object
    async fn data_object_metadata(
        &self,
        path: &ObjectPath,
        attribute: &str,
    ) -> HostResult<Vec<String>>;

    /// Attach a triple to a data object; identical triples are kept once
    async fn add_data_object_metadata(&self, path: &ObjectPath, avu: &Avu) -> HostResult<()>;

    /// Effective access level of `actor` on a data object
    async fn access_level(&self, actor: &str, path: &ObjectPath) -> HostResult<AclLevel>;

    /// One entry per logical object that has revisions
    async fn revisions_info(&self) -> HostResult<Vec<RevisionsInfo>>;
}

/// Host microservices that act on data objects
#[async_trait]
pub trait Microservices: Send + Sync {
    /// Replicate a data object; a replica already present on `to` is success
    async fn data_obj_repl(
        &self,
        path: &ObjectPath,
        from: &ResourceName,
        to: &ResourceName,
        admin: bool,
    ) -> HostResult<()>;

    /// Set an ACL as the administrator, regardless of the caller's rights
    async fn acl_set_sudo(
        &self,
        recursive: bool,
        level: AclLevel,
        actor: &str,
        path: &ObjectPath,
    ) -> HostResult<()>;

    /// Remove one exact triple as the administrator
    async fn metadata_remove_sudo(
        &self,
        path: &ObjectPath,
        object_type: ObjectType,
        avu: &Avu,
    ) -> HostResult<()>;

    /// Whether rule calls may carry a payload through a side channel
    fn accepts_rule_payload(&self) -> bool;

    /// Invoke a host-side rule, returning its captured stdout
    async fn call_rule(&self, call: &RuleCall) -> HostResult<String>;
}

/// A complete host binding
pub trait Host: Catalog + Microservices {}

impl<T: Catalog + Microservices + ?Sized> Host for T {}
