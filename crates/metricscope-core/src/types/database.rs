//! Databases, physical tables, and columns.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The closed set of column types the platform understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Int,
    Float,
    Str,
    Bool,
    Date,
    Datetime,
    Time,
    Timedelta,
    List,
    Dict,
}

/// A named, typed column of a table or node.
///
/// Column names are unique within their owning table or node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// An execution database a query can be planned against.
///
/// `cost` is a strictly positive scalar; the planner prefers lower costs and
/// breaks ties by ascending id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Database {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "URI")]
    pub uri: String,
    pub cost: f64,
    #[schemars(with = "String")]
    pub created_at: DateTime<Utc>,
    #[schemars(with = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Database {
    pub fn new(id: u64, name: impl Into<String>, uri: impl Into<String>, cost: f64) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            description: None,
            uri: uri.into(),
            cost,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A physical table materializing a node in one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Table {
    pub database_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub table: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(database_id: u64, table: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            database_id,
            catalog: None,
            schema: None,
            table: table.into(),
            columns,
        }
    }

    /// The fully qualified physical name parts, `catalog.schema.table` order.
    pub fn name_parts(&self) -> Vec<String> {
        let mut parts = Vec::with_capacity(3);
        if let Some(catalog) = &self.catalog {
            parts.push(catalog.clone());
        }
        if let Some(schema) = &self.schema {
            parts.push(schema.clone());
        }
        parts.push(self.table.clone());
        parts
    }

    pub fn has_columns(&self, required: impl IntoIterator<Item = impl AsRef<str>>) -> bool {
        required
            .into_iter()
            .all(|name| self.columns.iter().any(|c| c.name == name.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&ColumnType::Datetime).unwrap(),
            "\"DATETIME\""
        );
        let parsed: ColumnType = serde_json::from_str("\"INT\"").unwrap();
        assert_eq!(parsed, ColumnType::Int);
    }

    #[test]
    fn test_table_name_parts() {
        let mut table = Table::new(1, "comments", vec![]);
        assert_eq!(table.name_parts(), vec!["comments"]);

        table.schema = Some("public".to_string());
        table.catalog = Some("hive".to_string());
        assert_eq!(table.name_parts(), vec!["hive", "public", "comments"]);
    }

    #[test]
    fn test_table_has_columns() {
        let table = Table::new(
            1,
            "comments",
            vec![
                Column::new("user_id", ColumnType::Int),
                Column::new("comment", ColumnType::Str),
            ],
        );
        assert!(table.has_columns(["user_id"]));
        assert!(table.has_columns(Vec::<&str>::new()));
        assert!(!table.has_columns(["user_id", "missing"]));
    }
}
