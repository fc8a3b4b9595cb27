//! Conversion from `sqlparser` output into the crate vocabulary.
//!
//! Anything outside the vocabulary (CTEs, set operations, derived FROM items,
//! window functions, ORDER BY, HAVING, DISTINCT) is rejected with
//! [`BuildError::InvalidSql`] rather than silently dropped.

use std::fmt;

use sqlparser::ast::{
    self, BinaryOperator as SqlBinaryOperator, Expr as SqlExpr, FunctionArg, FunctionArgExpr,
    FunctionArguments, GroupByExpr, Ident, JoinConstraint, JoinOperator, ObjectName,
    SelectItem as SqlSelectItem, SetExpr, Statement, TableFactor,
    UnaryOperator as SqlUnaryOperator, Value,
};

use super::{
    BinaryOperator, Expr, Join, JoinKind, Literal, Relation, Select, SelectItem, TableRef,
    UnaryOperator,
};
use crate::error::BuildError;

fn unsupported(what: impl fmt::Display) -> BuildError {
    BuildError::InvalidSql(format!("Unsupported SQL construct: {what}"))
}

/// Splits identifiers into dotted parts.
///
/// A quoted identifier containing dots (`"core.comments.user_id"`) is a
/// single token to the parser but a dotted path to the planner, so parts are
/// split on `.` regardless of quoting.
pub fn identifier_parts(idents: &[Ident]) -> Vec<String> {
    idents
        .iter()
        .flat_map(|ident| ident.value.split('.'))
        .map(str::to_string)
        .collect()
}

fn object_name_to_string(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|part| match part.as_ident() {
            Some(ident) => ident.value.clone(),
            None => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Converts a parsed statement; only plain `SELECT` queries are accepted.
pub fn convert_statement(statement: &Statement) -> Result<Select, BuildError> {
    match statement {
        Statement::Query(query) => convert_query(query),
        other => Err(unsupported(format!("statement {other}"))),
    }
}

/// Converts a parsed query; the body must be a single `SELECT`.
pub fn convert_query(query: &ast::Query) -> Result<Select, BuildError> {
    if query.with.is_some() {
        return Err(unsupported("WITH"));
    }
    if query.order_by.is_some() {
        return Err(unsupported("ORDER BY"));
    }
    match query.body.as_ref() {
        SetExpr::Select(select) => convert_select(select),
        SetExpr::SetOperation { op, .. } => Err(unsupported(op)),
        other => Err(unsupported(other)),
    }
}

fn convert_select(select: &ast::Select) -> Result<Select, BuildError> {
    if select.distinct.is_some() {
        return Err(unsupported("DISTINCT"));
    }
    if select.having.is_some() {
        return Err(unsupported("HAVING"));
    }

    let projection = select
        .projection
        .iter()
        .map(convert_select_item)
        .collect::<Result<Vec<_>, _>>()?;

    let from = select
        .from
        .iter()
        .map(|table_with_joins| {
            let relation = convert_relation(&table_with_joins.relation)?;
            let joins = table_with_joins
                .joins
                .iter()
                .map(convert_join)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(TableRef { relation, joins })
        })
        .collect::<Result<Vec<_>, BuildError>>()?;

    let selection = select.selection.as_ref().map(convert_expr).transpose()?;

    let group_by = match &select.group_by {
        GroupByExpr::Expressions(exprs, _) => exprs
            .iter()
            .map(convert_expr)
            .collect::<Result<Vec<_>, _>>()?,
        GroupByExpr::All(_) => return Err(unsupported("GROUP BY ALL")),
    };

    Ok(Select {
        projection,
        from,
        selection,
        group_by,
    })
}

fn convert_select_item(item: &SqlSelectItem) -> Result<SelectItem, BuildError> {
    match item {
        SqlSelectItem::UnnamedExpr(expr) => Ok(SelectItem::unnamed(convert_expr(expr)?)),
        SqlSelectItem::ExprWithAlias { expr, alias } => {
            Ok(SelectItem::aliased(convert_expr(expr)?, alias.value.clone()))
        }
        SqlSelectItem::Wildcard(_) => Ok(SelectItem::unnamed(Expr::Wildcard)),
        SqlSelectItem::QualifiedWildcard(..) => Err(unsupported("qualified wildcard")),
    }
}

fn convert_relation(table_factor: &TableFactor) -> Result<Relation, BuildError> {
    match table_factor {
        TableFactor::Table { name, alias, .. } => {
            if alias.is_some() {
                return Err(unsupported("table alias"));
            }
            Ok(Relation::Node {
                name: object_name_to_string(name),
            })
        }
        other => Err(unsupported(other)),
    }
}

fn convert_join(join: &ast::Join) -> Result<Join, BuildError> {
    let relation = convert_relation(&join.relation)?;
    let (kind, constraint) = match &join.join_operator {
        JoinOperator::Join(constraint) | JoinOperator::Inner(constraint) => {
            (JoinKind::Inner, convert_join_constraint(constraint)?)
        }
        JoinOperator::Left(constraint) | JoinOperator::LeftOuter(constraint) => {
            (JoinKind::LeftOuter, convert_join_constraint(constraint)?)
        }
        JoinOperator::Right(constraint) | JoinOperator::RightOuter(constraint) => {
            (JoinKind::RightOuter, convert_join_constraint(constraint)?)
        }
        JoinOperator::FullOuter(constraint) => {
            (JoinKind::FullOuter, convert_join_constraint(constraint)?)
        }
        JoinOperator::CrossJoin(constraint) => {
            (JoinKind::Cross, convert_join_constraint(constraint)?)
        }
        other => return Err(unsupported(format!("join operator {other:?}"))),
    };
    Ok(Join {
        relation,
        kind,
        constraint,
    })
}

fn convert_join_constraint(constraint: &JoinConstraint) -> Result<Option<Expr>, BuildError> {
    match constraint {
        JoinConstraint::On(expr) => Ok(Some(convert_expr(expr)?)),
        JoinConstraint::None => Ok(None),
        JoinConstraint::Using(_) => Err(unsupported("JOIN USING")),
        JoinConstraint::Natural => Err(unsupported("NATURAL JOIN")),
    }
}

fn convert_expr(expr: &SqlExpr) -> Result<Expr, BuildError> {
    match expr {
        SqlExpr::Identifier(ident) => Ok(Expr::Identifier {
            parts: identifier_parts(std::slice::from_ref(ident)),
        }),
        SqlExpr::CompoundIdentifier(idents) => Ok(Expr::Identifier {
            parts: identifier_parts(idents),
        }),
        SqlExpr::Value(value) => Ok(Expr::Literal(convert_value(&value.value)?)),
        SqlExpr::Function(function) => convert_function(function),
        SqlExpr::BinaryOp { left, op, right } => Ok(Expr::binary(
            convert_expr(left)?,
            convert_binary_operator(op)?,
            convert_expr(right)?,
        )),
        SqlExpr::UnaryOp { op, expr } => Ok(Expr::UnaryOp {
            op: convert_unary_operator(op)?,
            expr: Box::new(convert_expr(expr)?),
        }),
        SqlExpr::Nested(inner) => Ok(Expr::Nested(Box::new(convert_expr(inner)?))),
        other => Err(unsupported(format!("expression {other}"))),
    }
}

fn convert_value(value: &Value) -> Result<Literal, BuildError> {
    match value {
        Value::Number(number, _) => Ok(Literal::Number(number.clone())),
        Value::SingleQuotedString(string) | Value::DoubleQuotedString(string) => {
            Ok(Literal::String(string.clone()))
        }
        Value::Boolean(boolean) => Ok(Literal::Boolean(*boolean)),
        Value::Null => Ok(Literal::Null),
        other => Err(unsupported(format!("literal {other}"))),
    }
}

fn convert_function(function: &ast::Function) -> Result<Expr, BuildError> {
    if function.over.is_some() {
        return Err(unsupported("window function"));
    }

    let args = match &function.args {
        FunctionArguments::None => Vec::new(),
        FunctionArguments::Subquery(_) => return Err(unsupported("subquery argument")),
        FunctionArguments::List(list) => {
            if list.duplicate_treatment.is_some() {
                return Err(unsupported("DISTINCT aggregate"));
            }
            list.args
                .iter()
                .map(|arg| match arg {
                    FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => convert_expr(expr),
                    FunctionArg::Unnamed(FunctionArgExpr::Wildcard) => Ok(Expr::Wildcard),
                    other => Err(unsupported(format!("function argument {other}"))),
                })
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(Expr::Function {
        name: object_name_to_string(&function.name),
        args,
    })
}

fn convert_binary_operator(op: &SqlBinaryOperator) -> Result<BinaryOperator, BuildError> {
    match op {
        SqlBinaryOperator::Gt => Ok(BinaryOperator::Gt),
        SqlBinaryOperator::Lt => Ok(BinaryOperator::Lt),
        SqlBinaryOperator::GtEq => Ok(BinaryOperator::GtEq),
        SqlBinaryOperator::LtEq => Ok(BinaryOperator::LtEq),
        SqlBinaryOperator::Eq => Ok(BinaryOperator::Eq),
        SqlBinaryOperator::NotEq => Ok(BinaryOperator::NotEq),
        SqlBinaryOperator::And => Ok(BinaryOperator::And),
        SqlBinaryOperator::Or => Ok(BinaryOperator::Or),
        SqlBinaryOperator::Plus => Ok(BinaryOperator::Plus),
        SqlBinaryOperator::Minus => Ok(BinaryOperator::Minus),
        SqlBinaryOperator::Multiply => Ok(BinaryOperator::Multiply),
        SqlBinaryOperator::Divide => Ok(BinaryOperator::Divide),
        SqlBinaryOperator::Modulo => Ok(BinaryOperator::Modulo),
        other => Err(unsupported(format!("operator {other}"))),
    }
}

fn convert_unary_operator(op: &SqlUnaryOperator) -> Result<UnaryOperator, BuildError> {
    match op {
        SqlUnaryOperator::Not => Ok(UnaryOperator::Not),
        SqlUnaryOperator::Minus => Ok(UnaryOperator::Minus),
        SqlUnaryOperator::Plus => Ok(UnaryOperator::Plus),
        other => Err(unsupported(format!("operator {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_single_statement;

    fn convert(sql: &str) -> Result<Select, BuildError> {
        convert_statement(&parse_single_statement(sql)?)
    }

    #[test]
    fn test_convert_aggregate_projection() {
        let select = convert("SELECT COUNT(*) AS cnt FROM A").unwrap();
        assert_eq!(select.projection.len(), 1);
        assert_eq!(select.projection[0].alias.as_deref(), Some("cnt"));
        let Expr::Function { name, args } = &select.projection[0].expr else {
            panic!("expected a function");
        };
        assert_eq!(name, "COUNT");
        assert_eq!(args, &[Expr::Wildcard]);
        assert_eq!(select.referenced_nodes(), vec!["A"]);
    }

    #[test]
    fn test_convert_compound_from() {
        let select = convert("SELECT COUNT(*) FROM core.comments").unwrap();
        assert_eq!(select.referenced_nodes(), vec!["core.comments"]);
    }

    #[test]
    fn test_quoted_identifier_splits_on_dots() {
        let select = convert("SELECT \"core.comments.user_id\" FROM metrics").unwrap();
        assert_eq!(
            select.projection[0].expr,
            Expr::Identifier {
                parts: vec![
                    "core".to_string(),
                    "comments".to_string(),
                    "user_id".to_string()
                ],
            }
        );
    }

    #[test]
    fn test_convert_where_and_group_by() {
        let select =
            convert("SELECT COUNT(*) FROM comments WHERE user_id > 1 GROUP BY user_id").unwrap();
        assert!(select.selection.is_some());
        assert_eq!(select.group_by.len(), 1);
    }

    #[test]
    fn test_convert_join() {
        let select = convert("SELECT 1 FROM A JOIN core.B ON A.id = B.id").unwrap();
        assert_eq!(select.referenced_nodes(), vec!["A", "core.B"]);
        assert_eq!(select.from[0].joins[0].kind, JoinKind::Inner);
        assert!(select.from[0].joins[0].constraint.is_some());
    }

    #[test]
    fn test_rejects_cte() {
        let result = convert("WITH x AS (SELECT 1) SELECT * FROM x");
        assert!(matches!(result, Err(BuildError::InvalidSql(_))));
    }

    #[test]
    fn test_rejects_union() {
        let result = convert("SELECT 1 UNION SELECT 2");
        assert!(matches!(result, Err(BuildError::InvalidSql(_))));
    }

    #[test]
    fn test_rejects_order_by() {
        let result = convert("SELECT one FROM A ORDER BY one");
        assert!(matches!(result, Err(BuildError::InvalidSql(_))));
    }

    #[test]
    fn test_rejects_derived_from() {
        let result = convert("SELECT 1 FROM (SELECT 1) AS x");
        assert!(matches!(result, Err(BuildError::InvalidSql(_))));
    }

    #[test]
    fn test_literals() {
        let select = convert("SELECT 1, 1.5, 'two', true, null FROM A").unwrap();
        let literals: Vec<_> = select
            .projection
            .iter()
            .map(|item| match &item.expr {
                Expr::Literal(literal) => literal.clone(),
                other => panic!("expected literal, got {other:?}"),
            })
            .collect();
        assert_eq!(
            literals,
            vec![
                Literal::Number("1".to_string()),
                Literal::Number("1.5".to_string()),
                Literal::String("two".to_string()),
                Literal::Boolean(true),
                Literal::Null,
            ]
        );
    }
}
