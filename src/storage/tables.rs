use redb::TableDefinition;

/// Session flags shared by every tab of the origin: flag key -> "true" | "false"
pub const SESSION_FLAGS: TableDefinition<&str, &str> = TableDefinition::new("session_flags");
