pub mod ast;
pub mod build;
pub mod catalog;
pub mod dag;
pub mod error;
pub mod inference;
pub mod parser;
pub mod transpile;
pub mod types;

// Re-export main types and functions
pub use build::{comparisons, get_filter, get_query_for_node, get_query_for_sql, METRICS_TABLE};
pub use catalog::{CatalogBuilder, CatalogSnapshot};
pub use dag::{get_dependencies, render_dag};
pub use error::{BuildError, DbapiTag, ErrorEnvelope};
pub use parser::{parse_sql, parse_sql_with_dialect, Dialect};

// Re-export types explicitly
pub use types::{Column, ColumnType, CreateQuery, Database, Node, NodeKind, Table};
