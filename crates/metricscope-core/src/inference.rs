//! Column inference for derived nodes.
//!
//! A derived node's column set comes from its projection: the alias when one
//! is given, otherwise a name derived from the expression, with types
//! resolved through the parents' columns.

use crate::ast::{Expr, Literal, Select, UnaryOperator};
use crate::dag::resolve_column_reference;
use crate::error::BuildError;
use crate::types::{Column, ColumnType, Node};

/// Derives the column set of a derived node from its projection.
pub fn infer_columns(select: &Select, parents: &[&Node]) -> Result<Vec<Column>, BuildError> {
    let mut columns = Vec::new();
    for (index, item) in select.projection.iter().enumerate() {
        if matches!(item.expr, Expr::Wildcard) {
            // `SELECT *` expands to the parents' columns in parent order.
            for parent in parents {
                for column in &parent.columns {
                    if !columns.iter().any(|c: &Column| c.name == column.name) {
                        columns.push(column.clone());
                    }
                }
            }
            continue;
        }

        let name = match &item.alias {
            Some(alias) => alias.clone(),
            None => default_column_name(&item.expr, index),
        };
        let column_type = infer_expression_type(&item.expr, parents)?;
        columns.push(Column { name, column_type });
    }
    Ok(columns)
}

fn default_column_name(expr: &Expr, index: usize) -> String {
    match expr {
        Expr::Identifier { parts } => parts.last().cloned().unwrap_or_default(),
        Expr::Column { name, .. } => name.clone(),
        Expr::Function { name, .. } => name.to_lowercase(),
        _ => format!("_col{index}"),
    }
}

fn infer_expression_type(expr: &Expr, parents: &[&Node]) -> Result<ColumnType, BuildError> {
    let inferred = match expr {
        Expr::Literal(literal) => match literal {
            Literal::Number(number) if number.contains(['.', 'e', 'E']) => ColumnType::Float,
            Literal::Number(_) => ColumnType::Int,
            Literal::String(_) | Literal::Null => ColumnType::Str,
            Literal::Boolean(_) => ColumnType::Bool,
        },
        Expr::Identifier { parts } => {
            let (parent_name, column) = resolve_column_reference(parts, parents)?;
            parent_column_type(&parent_name, &column, parents)?
        }
        Expr::Column { name, .. } => {
            let owner = parents
                .iter()
                .find(|parent| parent.column_names().any(|c| c == name))
                .ok_or_else(|| BuildError::InvalidColumn(name.clone()))?;
            parent_column_type(&owner.name, name, parents)?
        }
        Expr::Function { name, args } => match name.to_lowercase().as_str() {
            "count" => ColumnType::Int,
            "avg" | "stddev" | "stddev_pop" | "stddev_samp" | "variance" | "var_pop"
            | "var_samp" => ColumnType::Float,
            "sum" | "min" | "max" => match args.first() {
                Some(Expr::Wildcard) | None => ColumnType::Int,
                Some(arg) => infer_expression_type(arg, parents)?,
            },
            _ => match args.first() {
                Some(arg) if !matches!(arg, Expr::Wildcard) => {
                    infer_expression_type(arg, parents)?
                }
                _ => ColumnType::Str,
            },
        },
        Expr::BinaryOp { left, op, right } => {
            use crate::ast::BinaryOperator::*;
            match op {
                Gt | Lt | GtEq | LtEq | Eq | NotEq | And | Or => ColumnType::Bool,
                _ => {
                    let left = infer_expression_type(left, parents)?;
                    let right = infer_expression_type(right, parents)?;
                    if left == ColumnType::Float || right == ColumnType::Float {
                        ColumnType::Float
                    } else {
                        left
                    }
                }
            }
        }
        Expr::UnaryOp { op, expr } => match op {
            UnaryOperator::Not => ColumnType::Bool,
            _ => infer_expression_type(expr, parents)?,
        },
        Expr::Nested(inner) => infer_expression_type(inner, parents)?,
        Expr::Wildcard => ColumnType::Str,
    };
    Ok(inferred)
}

fn parent_column_type(
    parent_name: &str,
    column: &str,
    parents: &[&Node],
) -> Result<ColumnType, BuildError> {
    parents
        .iter()
        .find(|parent| parent.name == parent_name)
        .and_then(|parent| parent.columns.iter().find(|c| c.name == column))
        .map(|c| c.column_type)
        .ok_or_else(|| BuildError::InvalidColumn(column.to_string()))
}
