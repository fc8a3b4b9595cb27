//! JSON Schema output for the repository config formats.

use anyhow::{Context, Result};
use schemars::schema_for;

use crate::cli::SchemaKind;
use crate::loader::{DatabaseConfig, NodeConfig};

/// Renders the JSON Schema of the requested config format.
pub fn format_schema(kind: SchemaKind) -> Result<String> {
    let schema = match kind {
        SchemaKind::Node => schema_for!(NodeConfig),
        SchemaKind::Database => schema_for!(DatabaseConfig),
    };
    serde_json::to_string_pretty(&schema).context("Failed to serialize schema")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_schema_mentions_expression() {
        let schema = format_schema(SchemaKind::Node).unwrap();
        assert!(schema.contains("expression"));
        assert!(schema.contains("tables"));
    }

    #[test]
    fn test_database_schema_mentions_uri() {
        let schema = format_schema(SchemaKind::Database).unwrap();
        assert!(schema.contains("URI"));
        assert!(schema.contains("cost"));
    }
}
