//! Dependency analysis over node expressions.
//!
//! This module owns everything graph-shaped: extracting the set of node names
//! an expression references, ordering and cycle-checking the parent graph,
//! attributing column references to parents, and computing the set of
//! databases able to compute a node.

use std::collections::{BTreeMap, BTreeSet};

use crate::ast::{self, Expr, Select};
use crate::catalog::CatalogSnapshot;
use crate::error::BuildError;
use crate::parser::parse_single_statement;
use crate::types::Node;

/// Returns the set of node names referenced by an expression.
///
/// Only identifiers in FROM or JOIN position count; identifiers in
/// projections, filters, and group-bys are column references and are resolved
/// later. Compound parts join with `.`, so `FROM core.A` yields `core.A`.
pub fn get_dependencies(expression: &str) -> Result<BTreeSet<String>, BuildError> {
    let statement = parse_single_statement(expression)?;
    let select = ast::convert_statement(&statement)?;
    Ok(select
        .referenced_nodes()
        .into_iter()
        .map(str::to_string)
        .collect())
}

/// Leaves-first ordering of a `name -> parent names` map.
///
/// Parent names missing from the map are assumed satisfied (the catalog
/// builder validates their existence separately). Fails with
/// [`BuildError::CircularDependency`] when the graph has a cycle.
pub fn topological_order(
    dependencies: &BTreeMap<String, BTreeSet<String>>,
) -> Result<Vec<String>, BuildError> {
    let mut remaining: BTreeMap<&str, BTreeSet<&str>> = dependencies
        .iter()
        .map(|(name, parents)| {
            let pending: BTreeSet<&str> = parents
                .iter()
                .filter(|parent| dependencies.contains_key(*parent))
                .map(String::as_str)
                .collect();
            (name.as_str(), pending)
        })
        .collect();

    let mut order = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let ready: Vec<&str> = remaining
            .iter()
            .filter(|(_, pending)| pending.is_empty())
            .map(|(name, _)| *name)
            .collect();
        if ready.is_empty() {
            let stuck = remaining
                .keys()
                .next()
                .map(|name| name.to_string())
                .unwrap_or_default();
            return Err(BuildError::CircularDependency(stuck));
        }
        for name in &ready {
            remaining.remove(name);
            order.push(name.to_string());
        }
        for pending in remaining.values_mut() {
            for name in &ready {
                pending.remove(name);
            }
        }
    }
    Ok(order)
}

/// Renders the DAG as an ASCII tree, one subtree per sink node.
pub fn render_dag(dependencies: &BTreeMap<String, BTreeSet<String>>) -> String {
    let referenced: BTreeSet<&str> = dependencies
        .values()
        .flatten()
        .map(String::as_str)
        .collect();

    let mut out = String::new();
    for (name, _) in dependencies.iter() {
        if referenced.contains(name.as_str()) {
            continue;
        }
        out.push_str(name);
        out.push('\n');
        render_subtree(name, dependencies, "", &mut out);
    }
    out
}

fn render_subtree(
    name: &str,
    dependencies: &BTreeMap<String, BTreeSet<String>>,
    prefix: &str,
    out: &mut String,
) {
    let Some(parents) = dependencies.get(name) else {
        return;
    };
    let count = parents.len();
    for (index, parent) in parents.iter().enumerate() {
        let last = index + 1 == count;
        out.push_str(prefix);
        out.push_str(if last { "└── " } else { "├── " });
        out.push_str(parent);
        out.push('\n');
        let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
        render_subtree(parent, dependencies, &child_prefix, out);
    }
}

/// Resolves a dotted column reference against a set of parent nodes.
///
/// Returns the owning parent's name and the bare column name. A dotted prefix
/// must match a parent's full name, or uniquely its final segment; an
/// unqualified name must belong to exactly one parent.
pub(crate) fn resolve_column_reference(
    parts: &[String],
    parents: &[&Node],
) -> Result<(String, String), BuildError> {
    let full = parts.join(".");

    if parts.len() == 1 {
        let name = &parts[0];
        let owners: Vec<&&Node> = parents
            .iter()
            .filter(|parent| parent.column_names().any(|column| column == name))
            .collect();
        return match owners.as_slice() {
            [owner] => Ok((owner.name.clone(), name.clone())),
            [] => Err(BuildError::InvalidColumn(name.clone())),
            _ => Err(BuildError::AmbiguousColumn(name.clone())),
        };
    }

    let prefix = parts[..parts.len() - 1].join(".");
    let column = parts[parts.len() - 1].clone();

    if let Some(parent) = parents.iter().find(|parent| parent.name == prefix) {
        if !parent.column_names().any(|name| name == column) {
            return Err(BuildError::InvalidColumn(full));
        }
        return Ok((parent.name.clone(), column));
    }

    // An unqualified table name binds to the parent whose final segment
    // matches, so `A.one` resolves against a parent named `core.A`.
    if parts.len() == 2 {
        let matches: Vec<&&Node> = parents
            .iter()
            .filter(|parent| parent.short_name() == prefix)
            .collect();
        match matches.as_slice() {
            [parent] => {
                if !parent.column_names().any(|name| name == column) {
                    return Err(BuildError::InvalidColumn(full));
                }
                return Ok((parent.name.clone(), column));
            }
            [] => {}
            _ => return Err(BuildError::AmbiguousColumn(full)),
        }
    }

    Err(BuildError::InvalidIdentifier(prefix))
}

fn walk_identifiers<'a>(expr: &'a Expr, visit: &mut impl FnMut(&'a [String])) {
    match expr {
        Expr::Identifier { parts } => visit(parts),
        Expr::Function { args, .. } => {
            for arg in args {
                walk_identifiers(arg, visit);
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            walk_identifiers(left, visit);
            walk_identifiers(right, visit);
        }
        Expr::UnaryOp { expr, .. } => walk_identifiers(expr, visit),
        Expr::Nested(inner) => walk_identifiers(inner, visit),
        Expr::Column { .. } | Expr::Wildcard | Expr::Literal(_) => {}
    }
}

/// The expressions of a select that can carry column references.
pub(crate) fn column_bearing_expressions(select: &Select) -> Vec<&Expr> {
    let mut exprs: Vec<&Expr> = select.projection.iter().map(|item| &item.expr).collect();
    for table_ref in &select.from {
        for join in &table_ref.joins {
            if let Some(constraint) = &join.constraint {
                exprs.push(constraint);
            }
        }
    }
    if let Some(selection) = &select.selection {
        exprs.push(selection);
    }
    exprs.extend(select.group_by.iter());
    exprs
}

/// Maps every column reference in `exprs` to the parent it binds to.
///
/// Every parent appears in the result, with an empty set when nothing
/// references it.
pub fn get_referenced_columns(
    exprs: &[&Expr],
    parents: &[&Node],
) -> Result<BTreeMap<String, BTreeSet<String>>, BuildError> {
    let mut referenced: BTreeMap<String, BTreeSet<String>> = parents
        .iter()
        .map(|parent| (parent.name.clone(), BTreeSet::new()))
        .collect();

    let mut result = Ok(());
    for expr in exprs {
        walk_identifiers(expr, &mut |parts| {
            if result.is_err() {
                return;
            }
            match resolve_column_reference(parts, parents) {
                Ok((parent, column)) => {
                    referenced.entry(parent).or_default().insert(column);
                }
                Err(err) => result = Err(err),
            }
        });
    }
    result?;
    Ok(referenced)
}

/// Computes the set of databases able to compute a node.
///
/// A database qualifies when the node is materialized there in a table
/// carrying all required columns, or when every parent is computable there.
/// `required_columns` defaults to the node's own column set.
pub fn get_computable_databases(
    catalog: &CatalogSnapshot,
    node: &Node,
    required_columns: Option<&BTreeSet<String>>,
) -> Result<BTreeSet<u64>, BuildError> {
    let required: BTreeSet<String> = match required_columns {
        Some(columns) => columns.clone(),
        None => node.column_names().map(str::to_string).collect(),
    };

    let mut databases: BTreeSet<u64> = node
        .tables
        .iter()
        .filter(|table| table.has_columns(&required))
        .map(|table| table.database_id)
        .collect();

    if let Some(expression) = &node.expression {
        let statement = parse_single_statement(expression)?;
        let select = ast::convert_statement(&statement)?;
        let parents = catalog.parents_of(node);
        let referenced = get_referenced_columns(&column_bearing_expressions(&select), &parents)?;

        let mut common: Option<BTreeSet<u64>> = None;
        for parent in &parents {
            let columns = referenced.get(&parent.name).cloned().unwrap_or_default();
            let parent_databases = get_computable_databases(catalog, parent, Some(&columns))?;
            common = Some(match common {
                None => parent_databases,
                Some(acc) => acc.intersection(&parent_databases).copied().collect(),
            });
        }
        if let Some(common) = common {
            databases.extend(common);
        }
    }

    Ok(databases)
}
