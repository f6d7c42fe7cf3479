use redb::TableDefinition;

/// File records: id -> FileRecord (msgpack)
pub const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// Insertion order: sequence number -> id
pub const RECORD_ORDER: TableDefinition<u64, &str> = TableDefinition::new("record_order");
