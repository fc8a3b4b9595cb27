//! Translation of a node into a backend query.
//!
//! The transpiler is reentrant and holds no state between calls: every call
//! takes the catalog snapshot, the node, and the chosen database, and returns
//! a fresh [`Select`]. Recursion depth equals the DAG depth.

use crate::ast::{self, Expr, Relation, Select, SelectItem, TableRef};
use crate::catalog::CatalogSnapshot;
use crate::dag;
use crate::error::BuildError;
use crate::parser::parse_single_statement;
use crate::types::{Database, Node, Table};

/// Builds the query computing `node` on `database`.
pub fn get_query(
    catalog: &CatalogSnapshot,
    node: &Node,
    database: &Database,
) -> Result<Select, BuildError> {
    get_select(catalog, node, database, false)
}

/// Builds the select for `node`, labeled when it will wrap as a subquery.
///
/// A node materialized in the database reads its physical table directly;
/// otherwise the expression is parsed and every parent reference is replaced
/// by the parent's subquery aliased with the parent's full name.
pub(crate) fn get_select(
    catalog: &CatalogSnapshot,
    node: &Node,
    database: &Database,
    labeled: bool,
) -> Result<Select, BuildError> {
    if let Some(table) = materialized_table(node, database) {
        return Ok(table_select(table, labeled));
    }

    let Some(expression) = &node.expression else {
        return Err(BuildError::UnableToCompute {
            name: node.name.clone(),
            database_id: database.id,
        });
    };

    let statement = parse_single_statement(expression)
        .map_err(|err| invalid_expression(&node.name, err))?;
    let mut select =
        ast::convert_statement(&statement).map_err(|err| invalid_expression(&node.name, err))?;

    for table_ref in &mut select.from {
        inline_parent(catalog, &mut table_ref.relation, database)?;
        for join in &mut table_ref.joins {
            inline_parent(catalog, &mut join.relation, database)?;
        }
    }

    let parents = catalog.parents_of(node);
    rewrite_select(&mut select, &parents)?;

    if labeled {
        label_projection(&mut select, node);
    }

    Ok(select)
}

/// Labels unaliased projection items with the node's column names so the
/// wrapping alias exposes a stable schema.
fn label_projection(select: &mut Select, node: &Node) {
    if select
        .projection
        .iter()
        .any(|item| matches!(item.expr, Expr::Wildcard))
    {
        return;
    }
    for (item, column) in select.projection.iter_mut().zip(&node.columns) {
        if item.alias.is_none() {
            item.alias = Some(column.name.clone());
        }
    }
}

/// The first table materializing the node in the given database.
fn materialized_table<'a>(node: &'a Node, database: &Database) -> Option<&'a Table> {
    node.tables
        .iter()
        .find(|table| table.database_id == database.id)
}

/// `SELECT <col> [AS <col>], … FROM <catalog.schema.table>`, columns
/// qualified by the bare physical table name.
fn table_select(table: &Table, labeled: bool) -> Select {
    let projection = table
        .columns
        .iter()
        .map(|column| {
            let expr = Expr::column(table.table.clone(), column.name.clone());
            if labeled {
                SelectItem::aliased(expr, column.name.clone())
            } else {
                SelectItem::unnamed(expr)
            }
        })
        .collect();

    Select {
        projection,
        from: vec![TableRef::new(Relation::Table {
            parts: table.name_parts(),
        })],
        selection: None,
        group_by: vec![],
    }
}

fn inline_parent(
    catalog: &CatalogSnapshot,
    relation: &mut Relation,
    database: &Database,
) -> Result<(), BuildError> {
    if let Relation::Node { name } = relation {
        let parent = catalog
            .find_node_by_name(name)
            .ok_or_else(|| BuildError::UnknownParent(name.clone()))?;
        let subquery = get_select(catalog, parent, database, true)?;
        *relation = Relation::subquery(subquery, parent.name.clone());
    }
    Ok(())
}

/// Rewrites every unresolved identifier in the select to bind to a parent
/// alias, so serialized output carries only resolved column references.
pub(crate) fn rewrite_select(select: &mut Select, parents: &[&Node]) -> Result<(), BuildError> {
    for item in &mut select.projection {
        item.expr = rewrite_expr(&item.expr, parents)?;
    }
    for table_ref in &mut select.from {
        for join in &mut table_ref.joins {
            if let Some(constraint) = &join.constraint {
                join.constraint = Some(rewrite_expr(constraint, parents)?);
            }
        }
    }
    if let Some(selection) = &select.selection {
        select.selection = Some(rewrite_expr(selection, parents)?);
    }
    for expr in &mut select.group_by {
        *expr = rewrite_expr(expr, parents)?;
    }
    Ok(())
}

/// Rebinds identifiers against the parent aliases; everything else passes
/// through structurally unchanged.
pub(crate) fn rewrite_expr(expr: &Expr, parents: &[&Node]) -> Result<Expr, BuildError> {
    match expr {
        Expr::Identifier { parts } => {
            let (parent, column) = dag::resolve_column_reference(parts, parents)?;
            Ok(Expr::column(parent, column))
        }
        Expr::Function { name, args } => Ok(Expr::Function {
            name: name.clone(),
            args: args
                .iter()
                .map(|arg| rewrite_expr(arg, parents))
                .collect::<Result<Vec<_>, _>>()?,
        }),
        Expr::BinaryOp { left, op, right } => Ok(Expr::binary(
            rewrite_expr(left, parents)?,
            *op,
            rewrite_expr(right, parents)?,
        )),
        Expr::UnaryOp { op, expr } => Ok(Expr::UnaryOp {
            op: *op,
            expr: Box::new(rewrite_expr(expr, parents)?),
        }),
        Expr::Nested(inner) => Ok(Expr::Nested(Box::new(rewrite_expr(inner, parents)?))),
        Expr::Column { .. } | Expr::Wildcard | Expr::Literal(_) => Ok(expr.clone()),
    }
}

fn invalid_expression(name: &str, err: BuildError) -> BuildError {
    BuildError::InvalidNodeExpression {
        name: name.to_string(),
        source: Box::new(err),
    }
}
