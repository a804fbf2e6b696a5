//! Stored types for catalog persistence.
//!
//! These types are serialized to redb via bincode.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use yoda_common::{AclLevel, Avu};

/// Internal data object storage
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDataObject {
    pub data_id: u64,
    pub path: String,
    pub owner: String,
    pub group: String,
    pub size: u64,
    /// Epoch seconds
    pub modify_time: i64,
    /// Resources holding a replica, in creation order
    pub replicas: Vec<String>,
    pub avus: Vec<Avu>,
    /// Explicit grants; the owner always has `own`
    pub acls: BTreeMap<String, AclLevel>,
}

impl StoredDataObject {
    pub fn has_replica(&self, resource: &str) -> bool {
        self.replicas.iter().any(|r| r == resource)
    }

    /// Values of every triple with the given attribute
    pub fn values_of(&self, attribute: &str) -> Vec<String> {
        self.avus
            .iter()
            .filter(|avu| avu.attribute == attribute)
            .map(|avu| avu.value.clone())
            .collect()
    }

    /// Add a triple; returns false when an identical one already exists
    pub fn add_avu(&mut self, avu: Avu) -> bool {
        if self.avus.contains(&avu) {
            return false;
        }
        self.avus.push(avu);
        true
    }

    /// Remove the triple matching attribute, value and unit exactly
    pub fn remove_avu(&mut self, attribute: &str, value: &str, unit: &str) -> bool {
        let before = self.avus.len();
        self.avus.retain(|avu| !avu.matches(attribute, value, unit));
        self.avus.len() != before
    }

    /// Effective access level of `actor`
    pub fn access_of(&self, actor: &str) -> AclLevel {
        if self.owner == actor {
            return AclLevel::Own;
        }
        self.acls.get(actor).copied().unwrap_or(AclLevel::Null)
    }

    pub fn grant(&mut self, actor: &str, level: AclLevel) {
        if level == AclLevel::Null {
            self.acls.remove(actor);
        } else {
            self.acls.insert(actor.to_string(), level);
        }
    }
}

/// Internal resource storage
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResource {
    pub name: String,
    pub avus: Vec<Avu>,
    pub free_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
}

impl StoredResource {
    pub fn values_of(&self, attribute: &str) -> Vec<String> {
        self.avus
            .iter()
            .filter(|avu| avu.attribute == attribute)
            .map(|avu| avu.value.clone())
            .collect()
    }

    /// Replace every value of `attribute` with a single value
    pub fn set_avu(&mut self, attribute: &str, value: &str) {
        self.avus.retain(|avu| avu.attribute != attribute);
        self.avus.push(Avu::new(attribute, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object() -> StoredDataObject {
        StoredDataObject {
            data_id: 10001,
            path: "/tempZone/home/research-a/x.dat".into(),
            owner: "alice".into(),
            group: "research-a".into(),
            size: 12,
            modify_time: 1_700_000_000,
            replicas: vec!["src".into()],
            avus: Vec::new(),
            acls: BTreeMap::new(),
        }
    }

    #[test]
    fn test_avu_add_is_deduplicated() {
        let mut obj = object();
        assert!(obj.add_avu(Avu::new("replication_scheduled", "src,dst")));
        assert!(!obj.add_avu(Avu::new("replication_scheduled", "src,dst")));
        assert!(obj.add_avu(Avu::new("replication_scheduled", "src,other")));
        assert_eq!(obj.values_of("replication_scheduled").len(), 2);
    }

    #[test]
    fn test_avu_remove_keys_on_value() {
        let mut obj = object();
        obj.add_avu(Avu::new("replication_scheduled", "src,dst"));
        obj.add_avu(Avu::new("replication_scheduled", "src,other"));
        assert!(obj.remove_avu("replication_scheduled", "src,dst", ""));
        assert!(!obj.remove_avu("replication_scheduled", "src,dst", ""));
        assert_eq!(obj.values_of("replication_scheduled"), vec!["src,other"]);
    }

    #[test]
    fn test_access_levels() {
        let mut obj = object();
        assert_eq!(obj.access_of("alice"), AclLevel::Own);
        assert_eq!(obj.access_of("rods"), AclLevel::Null);
        obj.grant("rods", AclLevel::Own);
        assert_eq!(obj.access_of("rods"), AclLevel::Own);
        obj.grant("rods", AclLevel::Null);
        assert!(obj.acls.is_empty());
    }

    #[test]
    fn test_resource_set_avu_replaces() {
        let mut resc = StoredResource {
            name: "R1".into(),
            ..StoredResource::default()
        };
        resc.avus.push(Avu::new("yoda::arb", "FULL"));
        resc.avus.push(Avu::new("yoda::arb", "IGNORE"));
        resc.set_avu("yoda::arb", "READY_FOR_DATA");
        assert_eq!(resc.values_of("yoda::arb"), vec!["READY_FOR_DATA"]);
    }
}
