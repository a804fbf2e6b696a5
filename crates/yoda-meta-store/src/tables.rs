//! Redb table definitions for persistent catalog storage.

use redb::TableDefinition;

// Key: zone-absolute path, Value: bincode-encoded StoredDataObject
pub const DATA_OBJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("data_objects");

// Key: resource name, Value: bincode-encoded StoredResource
pub const RESOURCES: TableDefinition<&str, &[u8]> = TableDefinition::new("resources");

// Key: counter name, Value: last issued value
pub const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");
