//! Catalog semantics shared by the local and in-memory hosts.

use crate::api::service;
use crate::error::{HostError, HostResult};
use crate::retention::{self, RevisionStrategy};
use crate::rule::CleanupRequest;
use std::fmt::Write;
use yoda_common::{Avu, FlaggedObject, ObjectPath, ResourceName, attrs};
use yoda_meta_store::StoredDataObject;

/// Add a replica on `to`. Returns false when one already exists there.
pub(crate) fn replicate(
    object: &mut StoredDataObject,
    from: &ResourceName,
    to: &ResourceName,
) -> HostResult<bool> {
    if object.has_replica(to.as_str()) {
        return Ok(false);
    }
    if !object.has_replica(from.as_str()) {
        return Err(HostError::microservice(
            service::DATA_OBJ_REPL,
            format!("{} has no replica on {from}", object.path),
        ));
    }
    object.replicas.push(to.to_string());
    Ok(true)
}

/// One entry per value of `attribute` on the object
pub(crate) fn flagged_entries(object: &StoredDataObject, attribute: &str) -> Vec<FlaggedObject> {
    let path = ObjectPath::new_unchecked(object.path.clone());
    object
        .values_of(attribute)
        .into_iter()
        .map(|value| FlaggedObject {
            collection: path.collection().to_string(),
            name: path.name().to_string(),
            value,
        })
        .collect()
}

/// Run the retention rule over a decoded chunk.
///
/// `remove` deletes one revision object and reports whether it existed.
/// Returns the rule's stdout.
pub(crate) fn run_revisions_clean_up(
    request: &CleanupRequest,
    mut remove: impl FnMut(&str) -> HostResult<bool>,
) -> HostResult<String> {
    let strategy = RevisionStrategy::for_case(request.bucket_case);
    let mut stdout = String::new();
    let mut removed_total = 0usize;
    for info in &request.chunk {
        let candidates = strategy.removal_candidates(&info.revisions, request.end_of_calendar_day);
        for candidate in candidates {
            if remove(&candidate.path)? {
                removed_total += 1;
                if request.verbose {
                    let _ = writeln!(
                        stdout,
                        "Removed revision {} of {} (modified {})",
                        candidate.path, info.original_path, candidate.original_modify_time
                    );
                }
            }
        }
    }
    let _ = writeln!(
        stdout,
        "Bucket case {}: removed {removed_total} revision(s) across {} object(s)",
        request.bucket_case,
        request.chunk.len()
    );
    Ok(stdout)
}

/// Build revisions-info from every object in the revision store
pub(crate) fn revisions_info<'a>(
    objects: impl IntoIterator<Item = &'a StoredDataObject>,
) -> Vec<yoda_common::RevisionsInfo> {
    retention::group_revisions(objects.into_iter().filter_map(retention::revision_record))
}

/// Build the revision object recording `original` as it was at `modify_time`
pub(crate) fn revision_object(
    original: &StoredDataObject,
    revision_store: &str,
    data_id: u64,
    modify_time: i64,
) -> StoredDataObject {
    let trimmed = original.path.trim_start_matches('/');
    let relative = trimmed.split_once('/').map_or(trimmed, |(_zone, rest)| rest);
    let relative = relative.strip_prefix("home/").unwrap_or(relative);
    let path = format!(
        "{}/{relative}_{modify_time}",
        revision_store.trim_end_matches('/')
    );

    let mut revision = StoredDataObject {
        data_id,
        path,
        owner: original.owner.clone(),
        group: original.group.clone(),
        size: original.size,
        modify_time,
        replicas: original.replicas.iter().take(1).cloned().collect(),
        avus: Vec::new(),
        acls: std::collections::BTreeMap::new(),
    };
    for (attribute, value) in [
        (attrs::ORIGINAL_PATH, original.path.clone()),
        (attrs::ORIGINAL_DATA_ID, original.data_id.to_string()),
        (attrs::ORIGINAL_OWNER, original.owner.clone()),
        (attrs::ORIGINAL_GROUP, original.group.clone()),
        (attrs::ORIGINAL_SIZE, original.size.to_string()),
        (attrs::ORIGINAL_MODIFY_TIME, modify_time.to_string()),
    ] {
        revision.add_avu(Avu::new(attribute, value));
    }
    revision
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn object() -> StoredDataObject {
        StoredDataObject {
            data_id: 10001,
            path: "/tempZone/home/research-a/data/x.csv".into(),
            owner: "alice".into(),
            group: "research-a".into(),
            size: 7,
            modify_time: 1_700_000_000,
            replicas: vec!["src".into()],
            avus: Vec::new(),
            acls: BTreeMap::new(),
        }
    }

    #[test]
    fn test_replicate_is_idempotent() {
        let mut obj = object();
        let src = ResourceName::new_unchecked("src");
        let dst = ResourceName::new_unchecked("dst");
        assert!(replicate(&mut obj, &src, &dst).unwrap());
        assert!(!replicate(&mut obj, &src, &dst).unwrap());
        assert_eq!(obj.replicas, vec!["src", "dst"]);
    }

    #[test]
    fn test_replicate_requires_source_replica() {
        let mut obj = object();
        let other = ResourceName::new_unchecked("other");
        let dst = ResourceName::new_unchecked("dst");
        assert!(matches!(
            replicate(&mut obj, &other, &dst),
            Err(HostError::Microservice { .. })
        ));
    }

    #[test]
    fn test_revision_object_round_trips_record() {
        let revision = revision_object(&object(), "/tempZone/yoda/revisions", 20001, 1_699_000_000);
        assert_eq!(
            revision.path,
            "/tempZone/yoda/revisions/research-a/data/x.csv_1699000000"
        );
        let record = retention::revision_record(&revision).unwrap();
        assert_eq!(record.original_path, "/tempZone/home/research-a/data/x.csv");
        assert_eq!(record.original_data_id, 10001);
        assert_eq!(record.original_modify_time, 1_699_000_000);
        assert_eq!(record.revision_id, 20001);
    }
}
