//! Revision retention policy
//!
//! Revisions are thinned by age. A strategy is a list of buckets, each
//! covering an age range ending at the end of the calendar day supplied by
//! the caller. A bucket holding more revisions than its size loses
//! revisions at its remove index until it fits. Revisions older than the
//! last bucket are removed; revisions newer than the reference are kept.
//!
//! The decision for a revision depends only on its modify time, the
//! reference timestamp, the bucket case and the other revisions of the
//! same logical object. Applying the policy to its own output removes
//! nothing.

use std::collections::BTreeMap;
use yoda_common::{BucketCase, RevisionRecord, RevisionsInfo, attrs};
use yoda_meta_store::StoredDataObject;

const HOURS: i64 = 60 * 60;
const DAYS: i64 = 24 * HOURS;
const WEEKS: i64 = 7 * DAYS;

/// One age range of a retention strategy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bucket {
    /// Age, in seconds before the reference, at which this bucket ends
    pub offset: i64,
    /// Revisions kept in this bucket
    pub max_size: usize,
    /// Position, oldest first, at which surplus revisions are removed
    pub remove_index: usize,
}

const fn bucket(offset: i64, max_size: usize, remove_index: usize) -> Bucket {
    Bucket {
        offset,
        max_size,
        remove_index,
    }
}

/// Retention schedule selected by a bucket case
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevisionStrategy {
    pub case: BucketCase,
    pub buckets: Vec<Bucket>,
}

impl RevisionStrategy {
    #[must_use]
    pub fn for_case(case: BucketCase) -> Self {
        let buckets = match case {
            BucketCase::A => vec![
                bucket(6 * HOURS, 1, 1),
                bucket(12 * HOURS, 1, 0),
                bucket(18 * HOURS, 1, 0),
                bucket(DAYS, 1, 0),
                bucket(2 * DAYS, 1, 0),
                bucket(3 * DAYS, 1, 0),
                bucket(4 * DAYS, 1, 0),
                bucket(5 * DAYS, 1, 0),
                bucket(6 * DAYS, 1, 0),
                bucket(WEEKS, 1, 0),
                bucket(2 * WEEKS, 1, 0),
                bucket(3 * WEEKS, 1, 0),
                bucket(4 * WEEKS, 1, 0),
                bucket(8 * WEEKS, 1, 0),
                bucket(12 * WEEKS, 1, 0),
                bucket(16 * WEEKS, 1, 0),
            ],
            BucketCase::B => vec![
                bucket(12 * HOURS, 2, 1),
                bucket(DAYS, 2, 1),
                bucket(3 * DAYS, 2, 0),
                bucket(5 * DAYS, 2, 0),
                bucket(WEEKS, 2, 1),
                bucket(3 * WEEKS, 2, 0),
                bucket(8 * WEEKS, 2, 0),
                bucket(16 * WEEKS, 2, 0),
            ],
            BucketCase::Simple => vec![bucket(16 * WEEKS, 16, 4)],
        };
        Self { case, buckets }
    }

    /// Oldest modify time any bucket still covers (exclusive)
    #[must_use]
    pub fn horizon(&self, end_of_calendar_day: i64) -> i64 {
        let oldest = self.buckets.last().map_or(0, |b| b.offset);
        end_of_calendar_day - oldest
    }

    /// Revisions of one logical object that the policy removes, oldest first
    #[must_use]
    pub fn removal_candidates<'a>(
        &self,
        revisions: &'a [RevisionRecord],
        end_of_calendar_day: i64,
    ) -> Vec<&'a RevisionRecord> {
        let mut ordered: Vec<&RevisionRecord> = revisions.iter().collect();
        ordered.sort_by_key(|r| (r.original_modify_time, r.revision_id));

        let mut removed = Vec::new();
        let mut upper = end_of_calendar_day;
        for b in &self.buckets {
            let lower = end_of_calendar_day - b.offset;
            let mut members: Vec<&RevisionRecord> = ordered
                .iter()
                .copied()
                .filter(|r| r.original_modify_time > lower && r.original_modify_time <= upper)
                .collect();
            while members.len() > b.max_size {
                let idx = b.remove_index.min(members.len() - 1);
                removed.push(members.remove(idx));
            }
            upper = lower;
        }

        let horizon = self.horizon(end_of_calendar_day);
        removed.extend(
            ordered
                .iter()
                .copied()
                .filter(|r| r.original_modify_time <= horizon),
        );
        removed.sort_by_key(|r| (r.original_modify_time, r.revision_id));
        removed
    }
}

/// Read the revision bookkeeping attached to a revision object
#[must_use]
pub fn revision_record(object: &StoredDataObject) -> Option<RevisionRecord> {
    let single = |attribute: &str| object.values_of(attribute).into_iter().next();
    Some(RevisionRecord {
        revision_id: object.data_id,
        path: object.path.clone(),
        original_path: single(attrs::ORIGINAL_PATH)?,
        original_data_id: single(attrs::ORIGINAL_DATA_ID)?.parse().ok()?,
        original_owner: single(attrs::ORIGINAL_OWNER).unwrap_or_default(),
        original_group: single(attrs::ORIGINAL_GROUP).unwrap_or_default(),
        original_size: single(attrs::ORIGINAL_SIZE)?.parse().ok()?,
        original_modify_time: single(attrs::ORIGINAL_MODIFY_TIME)?.parse().ok()?,
    })
}

/// Group revision records by logical object.
///
/// Entries are ordered by original path and revisions by modify time, so
/// the list is stable between runs over the same catalog.
pub fn group_revisions(records: impl IntoIterator<Item = RevisionRecord>) -> Vec<RevisionsInfo> {
    let mut grouped: BTreeMap<String, Vec<RevisionRecord>> = BTreeMap::new();
    for record in records {
        grouped
            .entry(record.original_path.clone())
            .or_default()
            .push(record);
    }
    grouped
        .into_iter()
        .map(|(original_path, mut revisions)| {
            revisions.sort_by_key(|r| (r.original_modify_time, r.revision_id));
            RevisionsInfo {
                original_path,
                revisions,
            }
        })
        .collect()
}
