//! Reserved metadata attribute names.
//!
//! System metadata the coordination core owns lives in the `org_`
//! namespace, except the replication flag, which uses the unprefixed key
//! `replication_scheduled`. Resource attributes set by operators use the
//! `yoda::` prefix.

/// Flag requesting background replication; value is `<from>,<to>`.
pub const REPLICATION_SCHEDULED: &str = "replication_scheduled";

/// Operator-set ARB status on a resource.
pub const ARB_STATUS: &str = "yoda::arb";

// Revision bookkeeping, attached to every revision object by the host.
pub const ORIGINAL_PATH: &str = "org_original_path";
pub const ORIGINAL_DATA_ID: &str = "org_original_data_id";
pub const ORIGINAL_OWNER: &str = "org_original_data_owner_name";
pub const ORIGINAL_GROUP: &str = "org_original_group_name";
pub const ORIGINAL_SIZE: &str = "org_original_filesize";
pub const ORIGINAL_MODIFY_TIME: &str = "org_original_modify_time";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_keys() {
        assert_eq!(REPLICATION_SCHEDULED, "replication_scheduled");
        assert_eq!(ARB_STATUS, "yoda::arb");
        for key in [ORIGINAL_PATH, ORIGINAL_DATA_ID, ORIGINAL_MODIFY_TIME] {
            assert!(key.starts_with("org_"));
        }
    }
}
