//! Nodes: the named SQL entities forming the metric DAG.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{Column, Table};

/// Classification of a node, derived from its expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// No expression; backed directly by physical tables.
    Source,
    /// Derived, non-aggregate; usable only as an intermediate parent.
    Transform,
    /// Derived with a single aggregate projection; queryable via `metrics`.
    Metric,
}

/// A named SQL entity in the DAG.
///
/// `parents` holds the names of the nodes referenced by `expression`, sorted
/// lexicographically; the nodes themselves are looked up through the catalog.
/// Source nodes have an empty parent set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Node {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    pub kind: NodeKind,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[schemars(with = "String")]
    pub created_at: DateTime<Utc>,
    #[schemars(with = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// A source node backed by the given tables.
    pub fn source(name: impl Into<String>, tables: Vec<Table>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: None,
            expression: None,
            kind: NodeKind::Source,
            tables,
            columns: Vec::new(),
            parents: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A derived node; the kind is refined when the catalog is built.
    pub fn derived(name: impl Into<String>, expression: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: None,
            expression: Some(expression.into()),
            kind: NodeKind::Transform,
            tables: Vec::new(),
            columns: Vec::new(),
            parents: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_tables(mut self, tables: Vec<Table>) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_columns(mut self, columns: Vec<Column>) -> Self {
        self.columns = columns;
        self
    }

    pub fn is_source(&self) -> bool {
        self.expression.is_none()
    }

    pub fn is_metric(&self) -> bool {
        self.kind == NodeKind::Metric
    }

    /// The final segment of a dotted node name (`core.comments` → `comments`).
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_node_has_no_expression() {
        let node = Node::source("A", vec![]);
        assert!(node.is_source());
        assert_eq!(node.kind, NodeKind::Source);
        assert!(node.parents.is_empty());
    }

    #[test]
    fn test_short_name() {
        assert_eq!(Node::source("A", vec![]).short_name(), "A");
        assert_eq!(Node::source("core.comments", vec![]).short_name(), "comments");
    }
}
