//! Core type definitions for the coordination core
//!
//! This module defines resource and object identifiers, metadata triples,
//! the ARB status set, the replication flag format and revision records.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of a storage resource
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct ResourceName(String);

impl ResourceName {
    /// Create a new resource name (validated)
    pub fn new(name: impl Into<String>) -> Result<Self, ResourceNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Create without validation (internal use only)
    #[must_use]
    pub fn new_unchecked(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the resource name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(name: &str) -> Result<(), ResourceNameError> {
        if name.is_empty() {
            return Err(ResourceNameError::Empty);
        }
        // A comma would make the replication flag value ambiguous
        if let Some(c) = name.chars().find(|c| *c == ',' || c.is_whitespace()) {
            return Err(ResourceNameError::InvalidChar(c));
        }
        Ok(())
    }
}

impl fmt::Debug for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceName({:?})", self.0)
    }
}

impl FromStr for ResourceName {
    type Err = ResourceNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Errors that can occur when creating a resource name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceNameError {
    #[error("resource name cannot be empty")]
    Empty,
    #[error("resource name contains invalid character: {0:?}")]
    InvalidChar(char),
}

/// Zone-absolute path of a data object or collection
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Create a new object path (must be absolute, no trailing slash)
    pub fn new(path: impl Into<String>) -> Result<Self, ObjectPathError> {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(ObjectPathError::NotAbsolute(path));
        }
        if path.len() > 1 && path.ends_with('/') {
            return Err(ObjectPathError::TrailingSlash(path));
        }
        Ok(Self(path))
    }

    /// Create without validation (internal use only)
    #[must_use]
    pub fn new_unchecked(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Join a collection and a data object name
    #[must_use]
    pub fn from_parts(collection: &str, name: &str) -> Self {
        let collection = collection.trim_end_matches('/');
        Self(format!("{collection}/{name}"))
    }

    /// Get the path as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parent collection of this path
    #[must_use]
    pub fn collection(&self) -> &str {
        match self.0.rfind('/') {
            Some(0) => "/",
            Some(idx) => &self.0[..idx],
            None => "",
        }
    }

    /// Final path component
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// Returns whether this path lies at or below `collection`
    #[must_use]
    pub fn is_within(&self, collection: &str) -> bool {
        let collection = collection.trim_end_matches('/');
        self.0 == collection
            || (self.0.starts_with(collection) && self.0[collection.len()..].starts_with('/'))
    }
}

impl fmt::Debug for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectPath({:?})", self.0)
    }
}

impl FromStr for ObjectPath {
    type Err = ObjectPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Errors that can occur when creating an object path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectPathError {
    #[error("path must be zone-absolute: {0}")]
    NotAbsolute(String),
    #[error("path must not end with a slash: {0}")]
    TrailingSlash(String),
}

/// Kind of catalog entity a metadata triple is attached to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    /// Data object
    DataObject,
    /// Collection
    Collection,
    /// Storage resource
    Resource,
}

impl ObjectType {
    /// Short type flag as used by the host's metadata microservices
    #[must_use]
    pub const fn as_flag(self) -> &'static str {
        match self {
            Self::DataObject => "-d",
            Self::Collection => "-C",
            Self::Resource => "-R",
        }
    }
}

/// Attribute/value/unit metadata triple
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Avu {
    pub attribute: String,
    pub value: String,
    pub unit: String,
}

impl Avu {
    /// Create a triple with an empty unit
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
            unit: String::new(),
        }
    }

    /// Returns whether attribute, value and unit all match
    #[must_use]
    pub fn matches(&self, attribute: &str, value: &str, unit: &str) -> bool {
        self.attribute == attribute && self.value == value && self.unit == unit
    }
}

/// Access level on a data object, ordered from weakest to strongest
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AclLevel {
    Null,
    Read,
    Write,
    Own,
}

impl AclLevel {
    /// Keyword used by the host ACL microservice
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Read => "read",
            Self::Write => "write",
            Self::Own => "own",
        }
    }
}

impl fmt::Display for AclLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AclLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "null" => Ok(Self::Null),
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "own" => Ok(Self::Own),
            other => Err(format!("unknown access level: {other}")),
        }
    }
}

/// Operator-set ARB status of a resource
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArbStatus {
    /// Invisible to ARB; default when the flag is missing or ambiguous
    #[default]
    Ignore,
    /// Eligible as both a source and a substitute
    ReadyForData,
    /// Not eligible as a substitute; writes requesting it are redirected
    Full,
    /// Requests are honored as-is
    ExemptFromArb,
}

impl ArbStatus {
    /// All statuses, in declaration order
    pub const ALL: [Self; 4] = [
        Self::Ignore,
        Self::ReadyForData,
        Self::Full,
        Self::ExemptFromArb,
    ];

    /// Attribute value stored on the resource
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ignore => "IGNORE",
            Self::ReadyForData => "READY_FOR_DATA",
            Self::Full => "FULL",
            Self::ExemptFromArb => "EXEMPT_FROM_ARB",
        }
    }
}

impl fmt::Display for ArbStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArbStatus {
    type Err = UnknownArbStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownArbStatus(s.to_string()))
    }
}

/// Attribute value that is not a member of the ARB status set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ARB status: {0:?}")]
pub struct UnknownArbStatus(pub String);

/// Parsed value of a replication flag: `<from>,<to>`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicationFlag {
    pub from: ResourceName,
    pub to: ResourceName,
}

impl ReplicationFlag {
    #[must_use]
    pub const fn new(from: ResourceName, to: ResourceName) -> Self {
        Self { from, to }
    }

    /// Flag value as stored in the catalog
    #[must_use]
    pub fn value(&self) -> String {
        format!("{},{}", self.from, self.to)
    }
}

impl fmt::Display for ReplicationFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.from, self.to)
    }
}

impl FromStr for ReplicationFlag {
    type Err = MalformedFlagValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || MalformedFlagValue(s.to_string());
        let (from, to) = s.split_once(',').ok_or_else(malformed)?;
        let from = ResourceName::new(from).map_err(|_| malformed())?;
        let to = ResourceName::new(to).map_err(|_| malformed())?;
        Ok(Self { from, to })
    }
}

/// Flag value that cannot be parsed as `<from>,<to>`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed replication flag value: {0:?}")]
pub struct MalformedFlagValue(pub String);

/// A data object bearing a flag, as yielded by a catalog query
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlaggedObject {
    pub collection: String,
    pub name: String,
    pub value: String,
}

impl FlaggedObject {
    /// Absolute path of the flagged data object
    #[must_use]
    pub fn path(&self) -> ObjectPath {
        ObjectPath::from_parts(&self.collection, &self.name)
    }
}

/// One revision of a logical object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRecord {
    /// Data id of the revision object itself
    pub revision_id: u64,
    /// Path of the revision object in the revision store
    pub path: String,
    pub original_path: String,
    pub original_data_id: u64,
    pub original_owner: String,
    pub original_group: String,
    pub original_size: u64,
    /// Epoch seconds
    pub original_modify_time: i64,
}

/// All revisions belonging to one logical object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionsInfo {
    pub original_path: String,
    pub revisions: Vec<RevisionRecord>,
}

/// Named retention schedule used by revision cleanup
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BucketCase {
    A,
    B,
    Simple,
}

impl BucketCase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::Simple => "Simple",
        }
    }
}

impl fmt::Display for BucketCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BucketCase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "Simple" => Ok(Self::Simple),
            other => Err(format!("unknown bucket case {other:?}, expected A, B or Simple")),
        }
    }
}

/// Zone and actor identity supplied by the host with every request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostContext {
    pub zone: String,
    pub actor: String,
}

impl HostContext {
    pub fn new(zone: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            actor: actor.into(),
        }
    }
}
