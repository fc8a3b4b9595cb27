//! Thin wrapper around `sqlparser`.
//!
//! Node expressions and user queries are parsed with the ANSI dialect; the
//! raw AST is immediately converted into the crate's own vocabulary by
//! [`crate::ast::convert`], so the rest of the crate never touches
//! `sqlparser` types.

use crate::error::BuildError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sqlparser::ast::Statement;
use sqlparser::parser::Parser;

/// SQL dialect used for parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Ansi,
    Generic,
    Postgres,
}

impl Dialect {
    pub fn to_sqlparser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        use sqlparser::dialect::{AnsiDialect, GenericDialect, PostgreSqlDialect};
        match self {
            Self::Ansi => Box::new(AnsiDialect {}),
            Self::Generic => Box::new(GenericDialect {}),
            Self::Postgres => Box::new(PostgreSqlDialect {}),
        }
    }
}

/// Parse SQL using the specified dialect.
pub fn parse_sql_with_dialect(sql: &str, dialect: Dialect) -> Result<Vec<Statement>, BuildError> {
    let sqlparser_dialect = dialect.to_sqlparser_dialect();
    Ok(Parser::parse_sql(sqlparser_dialect.as_ref(), sql)?)
}

/// Parse SQL using the ANSI dialect.
pub fn parse_sql(sql: &str) -> Result<Vec<Statement>, BuildError> {
    parse_sql_with_dialect(sql, Dialect::Ansi)
}

/// Parse SQL that must consist of exactly one statement.
pub fn parse_single_statement(sql: &str) -> Result<Statement, BuildError> {
    let mut statements = parse_sql(sql)?;
    match statements.len() {
        1 => Ok(statements.remove(0)),
        n => Err(BuildError::InvalidSql(format!(
            "Expected a single statement, found {n}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_select() {
        let result = parse_sql("SELECT COUNT(*) AS cnt FROM A");
        assert!(result.is_ok());
        assert_eq!(result.unwrap().len(), 1);
    }

    #[test]
    fn test_parse_invalid_sql() {
        let result = parse_sql("SELECT * FROM");
        assert!(matches!(result, Err(BuildError::InvalidSql(_))));
    }

    #[test]
    fn test_parse_compound_names() {
        let result = parse_sql("SELECT COUNT(*) FROM core.comments");
        assert!(result.is_ok());
    }

    #[test]
    fn test_parse_single_statement_rejects_batches() {
        let result = parse_single_statement("SELECT 1; SELECT 2");
        assert!(matches!(result, Err(BuildError::InvalidSql(_))));
    }

    #[test]
    fn test_parse_with_generic_dialect() {
        let result = parse_sql_with_dialect("SELECT B FROM metrics", Dialect::Generic);
        assert!(result.is_ok());
    }
}
