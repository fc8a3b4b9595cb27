//! Error types for catalog construction and query building.
//!
//! Every failure a build can produce is a [`BuildError`] variant. Errors are
//! surfaced to the caller unchanged: the core never retries and never swallows.
//! For the REST boundary, each error classifies into a DBAPI-compatible
//! [`DbapiTag`] and can be rendered as an [`ErrorEnvelope`].

use schemars::JsonSchema;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Error raised while building a catalog or planning a query.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    /// The SQL parser rejected the input.
    #[error("Unable to parse SQL: {0}")]
    InvalidSql(String),

    /// A node name in user SQL does not exist in the catalog.
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// An identifier in a node expression does not resolve to a node.
    #[error("Unknown parent: {0}")]
    UnknownParent(String),

    /// A projected node exists but is not a metric.
    #[error("Not a valid metric: {0}")]
    NotAMetric(String),

    /// Two selected metrics have different parent sets.
    #[error("All metrics should have the same parents")]
    DifferingParents,

    /// No single database can compute every parent.
    #[error("{}", no_common_database_message(.node.as_deref()))]
    NoCommonDatabase { node: Option<String> },

    /// An explicitly requested database is outside the computable set.
    #[error("Unable to compute {name} on database {database_id}")]
    UnableToCompute { name: String, database_id: u64 },

    /// A filter string does not match `<column><op><literal>`.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// A column name does not resolve.
    #[error("Invalid column name: {0}")]
    InvalidColumn(String),

    /// A comparison operator is not recognized.
    #[error("Invalid operation: {operation} (valid: {valid})")]
    InvalidOperation { operation: String, valid: String },

    /// The right-hand side of a filter is not a literal.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// A qualified identifier has a prefix that is not a parent node.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A projection is neither a metric, a dimension, nor a literal.
    #[error("Invalid projection: {0}")]
    InvalidProjection(String),

    /// A column reference resolves to more than one parent.
    #[error("Ambiguous column: {0}")]
    AmbiguousColumn(String),

    /// User SQL selects from a table other than the virtual `metrics`.
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    /// Two nodes in the catalog share a name.
    #[error("Duplicate node: {0}")]
    DuplicateNode(String),

    /// Two databases in the catalog share an id.
    #[error("Duplicate database id: {0}")]
    DuplicateDatabase(u64),

    /// A database was configured with a non-positive cost.
    #[error("Database cost must be positive: {name} ({cost})")]
    InvalidCost { name: String, cost: f64 },

    /// A table references a database that is not in the catalog.
    #[error("Unknown database: {0}")]
    UnknownDatabase(String),

    /// The parent graph contains a cycle.
    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    /// A node expression failed to parse or analyze during catalog
    /// construction; wraps the underlying error with the node name.
    #[error("Invalid expression for node {name}: {source}")]
    InvalidNodeExpression {
        name: String,
        #[source]
        source: Box<BuildError>,
    },
}

fn no_common_database_message(node: Option<&str>) -> String {
    match node {
        Some(name) => format!("Unable to compute {name} (no common database)"),
        None => "Unable to run SQL (no common database)".to_string(),
    }
}

impl From<sqlparser::parser::ParserError> for BuildError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        Self::InvalidSql(err.to_string())
    }
}

/// DBAPI-compatible classification handed to the HTTP façade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
pub enum DbapiTag {
    Warning,
    Error,
    InterfaceError,
    DatabaseError,
    DataError,
    OperationalError,
    IntegrityError,
    InternalError,
    ProgrammingError,
    NotSupportedError,
}

/// The `{tag, message, debug}` structure the REST façade formats.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ErrorEnvelope {
    pub tag: DbapiTag,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<serde_json::Value>,
}

impl BuildError {
    /// Classifies the error: mistakes in user input are `ProgrammingError`,
    /// inconsistencies in catalog data are `OperationalError`.
    pub fn dbapi_tag(&self) -> DbapiTag {
        match self {
            Self::UnknownParent(_) | Self::NoCommonDatabase { .. } | Self::AmbiguousColumn(_) => {
                DbapiTag::OperationalError
            }
            _ => DbapiTag::ProgrammingError,
        }
    }

    /// Renders the error as an envelope for the REST boundary.
    pub fn envelope(&self) -> ErrorEnvelope {
        let debug = match self {
            Self::UnableToCompute { name, database_id } => {
                Some(json!({ "node": name, "database_id": database_id }))
            }
            Self::NoCommonDatabase { node: Some(name) } => Some(json!({ "node": name })),
            Self::InvalidOperation { operation, valid } => {
                Some(json!({ "operation": operation, "valid": valid }))
            }
            Self::InvalidCost { name, cost } => Some(json!({ "database": name, "cost": cost })),
            _ => None,
        };

        ErrorEnvelope {
            tag: self.dbapi_tag(),
            message: self.to_string(),
            debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_common_database_messages() {
        let err = BuildError::NoCommonDatabase {
            node: Some("B".to_string()),
        };
        assert_eq!(err.to_string(), "Unable to compute B (no common database)");

        let err = BuildError::NoCommonDatabase { node: None };
        assert_eq!(err.to_string(), "Unable to run SQL (no common database)");
    }

    #[test]
    fn test_unable_to_compute_message() {
        let err = BuildError::UnableToCompute {
            name: "B".to_string(),
            database_id: 2,
        };
        assert_eq!(err.to_string(), "Unable to compute B on database 2");
    }

    #[test]
    fn test_dbapi_classification() {
        assert_eq!(
            BuildError::NotAMetric("B".to_string()).dbapi_tag(),
            DbapiTag::ProgrammingError
        );
        assert_eq!(
            BuildError::UnknownParent("A".to_string()).dbapi_tag(),
            DbapiTag::OperationalError
        );
        assert_eq!(
            BuildError::NoCommonDatabase { node: None }.dbapi_tag(),
            DbapiTag::OperationalError
        );
    }

    #[test]
    fn test_envelope_debug_map() {
        let envelope = BuildError::UnableToCompute {
            name: "B".to_string(),
            database_id: 2,
        }
        .envelope();
        assert_eq!(envelope.tag, DbapiTag::ProgrammingError);
        assert_eq!(envelope.debug.unwrap()["database_id"], 2);

        let envelope = BuildError::DifferingParents.envelope();
        assert!(envelope.debug.is_none());
    }
}
