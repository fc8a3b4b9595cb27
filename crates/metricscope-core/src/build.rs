//! The planner: turns a node or a SQL query over the virtual `metrics` table
//! into a [`CreateQuery`].
//!
//! A build is a pure function of the catalog snapshot and the input; nothing
//! here mutates shared state, and the emitted SQL is byte-identical across
//! repeated builds. Subqueries are emitted in lexicographic parent-name
//! order.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::OnceLock;

use regex::Regex;

use crate::ast::{
    self, is_aggregate_function, BinaryOperator, Expr, Literal, Relation, Select, SelectItem,
    TableRef,
};
use crate::catalog::CatalogSnapshot;
use crate::dag;
use crate::error::BuildError;
use crate::parser::parse_single_statement;
use crate::transpile;
use crate::types::{CreateQuery, Database, Node};

/// The sentinel relation name user SQL selects from.
pub const METRICS_TABLE: &str = "metrics";

/// Comparison operators accepted by the filter mini-syntax.
pub fn comparisons() -> &'static BTreeMap<&'static str, BinaryOperator> {
    static COMPARISONS: OnceLock<BTreeMap<&'static str, BinaryOperator>> = OnceLock::new();
    COMPARISONS.get_or_init(|| {
        BTreeMap::from([
            (">", BinaryOperator::Gt),
            ("<", BinaryOperator::Lt),
            (">=", BinaryOperator::GtEq),
            ("<=", BinaryOperator::LtEq),
            ("=", BinaryOperator::Eq),
            ("!=", BinaryOperator::NotEq),
        ])
    })
}

/// Parses a `<column><op><literal>` filter against the given column map.
///
/// The right-hand side must be a literal; any expression is rejected without
/// being evaluated.
pub fn get_filter(columns: &HashMap<String, Expr>, filter: &str) -> Result<Expr, BuildError> {
    get_filter_with_operators(columns, filter, comparisons())
}

fn get_filter_with_operators(
    columns: &HashMap<String, Expr>,
    filter: &str,
    operators: &BTreeMap<&'static str, BinaryOperator>,
) -> Result<Expr, BuildError> {
    static FILTER: OnceLock<Regex> = OnceLock::new();
    let re = FILTER
        .get_or_init(|| Regex::new(r"^([\w./]+)([<>=!~]+)(.+)$").expect("Invalid regex pattern"));

    let captures = re
        .captures(filter)
        .ok_or_else(|| BuildError::InvalidFilter(filter.to_string()))?;
    let column_name = &captures[1];
    let operation = &captures[2];
    let value = &captures[3];

    let column = columns
        .get(column_name)
        .ok_or_else(|| BuildError::InvalidColumn(column_name.to_string()))?;

    let op = operators.get(operation).copied().ok_or_else(|| {
        BuildError::InvalidOperation {
            operation: operation.to_string(),
            valid: operators.keys().copied().collect::<Vec<_>>().join(", "),
        }
    })?;

    let literal =
        parse_literal(value).ok_or_else(|| BuildError::InvalidValue(value.to_string()))?;

    Ok(Expr::binary(column.clone(), op, Expr::Literal(literal)))
}

/// Parses a filter literal: integer, float, single-quoted string, `true`,
/// `false`, or `null`.
fn parse_literal(text: &str) -> Option<Literal> {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    let number = NUMBER.get_or_init(|| {
        Regex::new(r"^-?\d+(\.\d+)?([eE]-?\d+)?$").expect("Invalid regex pattern")
    });

    if number.is_match(text) {
        return Some(Literal::Number(text.to_string()));
    }
    if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
        let inner = &text[1..text.len() - 1];
        // Reject anything with an unescaped quote inside; '' escapes.
        if inner.replace("''", "").contains('\'') {
            return None;
        }
        return Some(Literal::String(inner.replace("''", "'")));
    }
    match text {
        "true" => Some(Literal::Boolean(true)),
        "false" => Some(Literal::Boolean(false)),
        "null" => Some(Literal::Null),
        _ => None,
    }
}

/// Plans a query computing `node`, optionally sliced by group-bys and
/// filters, optionally pinned to a database.
pub fn get_query_for_node(
    catalog: &CatalogSnapshot,
    node: &Node,
    groupbys: &[String],
    filters: &[String],
    database_id: Option<u64>,
) -> Result<CreateQuery, BuildError> {
    let database = get_database_for_node(catalog, node, database_id)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(node = %node.name, database = database.id, "building node query");

    let mut select = transpile::get_query(catalog, node, database)?;
    if !groupbys.is_empty() || !filters.is_empty() {
        select = wrap_for_slicing(node, select, groupbys, filters)?;
    }

    Ok(CreateQuery::new(database.id, select.to_string()))
}

fn get_database_for_node<'a>(
    catalog: &'a CatalogSnapshot,
    node: &Node,
    database_id: Option<u64>,
) -> Result<&'a Database, BuildError> {
    let computable = dag::get_computable_databases(catalog, node, None)?;
    if computable.is_empty() {
        return Err(BuildError::NoCommonDatabase {
            node: Some(node.name.clone()),
        });
    }
    match database_id {
        Some(id) => {
            if !computable.contains(&id) {
                return Err(BuildError::UnableToCompute {
                    name: node.name.clone(),
                    database_id: id,
                });
            }
            catalog
                .find_database_by_id(id)
                .ok_or(BuildError::UnableToCompute {
                    name: node.name.clone(),
                    database_id: id,
                })
        }
        None => cheapest_database(catalog, &computable),
    }
}

/// Minimum cost wins; ties break by ascending id.
fn cheapest_database<'a>(
    catalog: &'a CatalogSnapshot,
    ids: &BTreeSet<u64>,
) -> Result<&'a Database, BuildError> {
    ids.iter()
        .filter_map(|id| catalog.find_database_by_id(*id))
        .min_by(|a, b| a.cost.total_cmp(&b.cost).then(a.id.cmp(&b.id)))
        .ok_or(BuildError::NoCommonDatabase { node: None })
}

/// Wraps the node query as a subquery aliased with the node's name and adds
/// WHERE/GROUP BY clauses resolved against that alias.
fn wrap_for_slicing(
    node: &Node,
    inner: Select,
    groupbys: &[String],
    filters: &[String],
) -> Result<Select, BuildError> {
    let columns_by_name = node_columns_by_name(node);

    let resolve = |name: &String| {
        columns_by_name
            .get(name.as_str())
            .cloned()
            .ok_or_else(|| BuildError::InvalidColumn(name.clone()))
    };
    let group_by = groupbys.iter().map(resolve).collect::<Result<Vec<_>, _>>()?;

    let predicates = filters
        .iter()
        .map(|filter| get_filter(&columns_by_name, filter))
        .collect::<Result<Vec<_>, _>>()?;

    let projection = node
        .columns
        .iter()
        .map(|column| SelectItem::unnamed(Expr::column(node.name.clone(), column.name.clone())))
        .collect();

    Ok(Select {
        projection,
        from: vec![TableRef::new(Relation::subquery(inner, node.name.clone()))],
        selection: Expr::conjunction(predicates),
        group_by,
    })
}

/// Column references against a node's wrapping alias, keyed by both the bare
/// column name and the `node.column` dotted form.
fn node_columns_by_name(node: &Node) -> HashMap<String, Expr> {
    let mut columns = HashMap::with_capacity(node.columns.len() * 2);
    for column in &node.columns {
        let expr = Expr::column(node.name.clone(), column.name.clone());
        columns.insert(column.name.clone(), expr.clone());
        columns.insert(format!("{}.{}", node.name, column.name), expr);
    }
    columns
}

/// A partitioned projection of a query over `metrics`.
enum Projection<'a> {
    Metric {
        node: &'a Node,
        alias: Option<String>,
    },
    Dimension {
        parent: String,
        column: String,
        alias: Option<String>,
    },
    Literal {
        literal: Literal,
        alias: Option<String>,
    },
}

/// Plans a SQL query over the virtual `metrics` table.
pub fn get_query_for_sql(catalog: &CatalogSnapshot, sql: &str) -> Result<CreateQuery, BuildError> {
    let statement = parse_single_statement(sql)?;
    let query = ast::convert_statement(&statement)?;

    check_from_is_metrics(&query)?;

    let (projections, metrics) = partition_projection(catalog, &query)?;

    // Every metric must share the same parent set.
    let parents: Vec<String> = metrics
        .first()
        .map(|metric| metric.parents.clone())
        .unwrap_or_default();
    for metric in &metrics {
        if metric.parents != parents {
            return Err(BuildError::DifferingParents);
        }
    }
    let parent_nodes: Vec<&Node> = parents
        .iter()
        .map(|name| {
            catalog
                .find_node_by_name(name)
                .ok_or_else(|| BuildError::UnknownParent(name.clone()))
        })
        .collect::<Result<_, _>>()?;

    // Parse each metric expression once; reused for column attribution and
    // for aggregate extraction below.
    let mut metric_selects: BTreeMap<&str, Select> = BTreeMap::new();
    for metric in &metrics {
        let expression = metric
            .expression
            .as_deref()
            .ok_or_else(|| BuildError::NotAMetric(metric.name.clone()))?;
        let select = ast::convert_statement(&parse_single_statement(expression)?)?;
        metric_selects.insert(metric.name.as_str(), select);
    }

    let referenced = referenced_columns(&query, &projections, &metric_selects, &parent_nodes)?;
    let database = get_database_for_sql(catalog, &referenced, &parent_nodes)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(database = database.id, parents = parents.len(), "building metrics query");

    // Parent subqueries, in lexicographic parent-name order.
    let from = parent_nodes
        .iter()
        .map(|parent| {
            let subquery = transpile::get_select(catalog, parent, database, true)?;
            Ok(TableRef::new(Relation::subquery(
                subquery,
                parent.name.clone(),
            )))
        })
        .collect::<Result<Vec<_>, BuildError>>()?;

    let mut projection = Vec::with_capacity(projections.len());
    for item in &projections {
        match item {
            Projection::Metric { node, alias } => {
                let select = &metric_selects[node.name.as_str()];
                let aggregate = extract_metric_aggregate(select, node)?;
                let rewritten = transpile::rewrite_expr(&aggregate, &parent_nodes)?;
                let alias = alias.clone().unwrap_or_else(|| node.name.clone());
                projection.push(SelectItem::aliased(rewritten, alias));
            }
            Projection::Dimension {
                parent,
                column,
                alias,
            } => projection.push(SelectItem {
                expr: Expr::column(parent.clone(), column.clone()),
                alias: alias.clone(),
            }),
            Projection::Literal { literal, alias } => projection.push(SelectItem {
                expr: Expr::Literal(literal.clone()),
                alias: alias.clone(),
            }),
        }
    }

    let selection = query
        .selection
        .as_ref()
        .map(|expr| transpile::rewrite_expr(expr, &parent_nodes))
        .transpose()?;
    let group_by = query
        .group_by
        .iter()
        .map(|expr| transpile::rewrite_expr(expr, &parent_nodes))
        .collect::<Result<Vec<_>, _>>()?;

    let select = Select {
        projection,
        from,
        selection,
        group_by,
    };

    Ok(CreateQuery::new(database.id, select.to_string()))
}

/// Picks the database for a query over the given parents: the intersection of
/// every parent's computable set, or the globally cheapest database when
/// there are no parents.
pub fn get_database_for_sql<'a>(
    catalog: &'a CatalogSnapshot,
    referenced: &BTreeMap<String, BTreeSet<String>>,
    parents: &[&Node],
) -> Result<&'a Database, BuildError> {
    if parents.is_empty() {
        let all: BTreeSet<u64> = catalog.all_databases().iter().map(|d| d.id).collect();
        return cheapest_database(catalog, &all);
    }

    let mut common: Option<BTreeSet<u64>> = None;
    for parent in parents {
        let columns = referenced.get(&parent.name).cloned().unwrap_or_default();
        let databases = dag::get_computable_databases(catalog, parent, Some(&columns))?;
        common = Some(match common {
            None => databases,
            Some(acc) => acc.intersection(&databases).copied().collect(),
        });
    }

    let common = common.unwrap_or_default();
    if common.is_empty() {
        return Err(BuildError::NoCommonDatabase { node: None });
    }
    cheapest_database(catalog, &common)
}

fn check_from_is_metrics(query: &Select) -> Result<(), BuildError> {
    match query.from.as_slice() {
        [table_ref] if table_ref.joins.is_empty() => match &table_ref.relation {
            Relation::Node { name } if name == METRICS_TABLE => Ok(()),
            other => Err(BuildError::InvalidSource(other.to_string())),
        },
        [] => Err(BuildError::InvalidSql(
            "the query must select from the virtual metrics table".to_string(),
        )),
        _ => Err(BuildError::InvalidSource(
            query
                .from
                .iter()
                .map(|table_ref| table_ref.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        )),
    }
}

fn partition_projection<'a>(
    catalog: &'a CatalogSnapshot,
    query: &Select,
) -> Result<(Vec<Projection<'a>>, Vec<&'a Node>), BuildError> {
    let mut projections = Vec::with_capacity(query.projection.len());
    let mut metrics = Vec::new();

    for item in &query.projection {
        match &item.expr {
            Expr::Identifier { parts } => {
                let name = parts.join(".");
                if let Some(node) = catalog.find_node_by_name(&name) {
                    if !node.is_metric() {
                        return Err(BuildError::NotAMetric(name));
                    }
                    metrics.push(node);
                    projections.push(Projection::Metric {
                        node,
                        alias: item.alias.clone(),
                    });
                } else if parts.len() >= 2 {
                    let parent = parts[..parts.len() - 1].join(".");
                    let column = parts[parts.len() - 1].clone();
                    if catalog.find_node_by_name(&parent).is_none() {
                        return Err(BuildError::InvalidIdentifier(parent));
                    }
                    projections.push(Projection::Dimension {
                        parent,
                        column,
                        alias: item.alias.clone(),
                    });
                } else {
                    return Err(BuildError::UnknownNode(name));
                }
            }
            Expr::Literal(literal) => projections.push(Projection::Literal {
                literal: literal.clone(),
                alias: item.alias.clone(),
            }),
            other => return Err(BuildError::InvalidProjection(other.to_string())),
        }
    }

    Ok((projections, metrics))
}

/// Every column the query touches, per parent: dimension projections, the
/// WHERE and GROUP BY clauses, and the metric expressions themselves.
fn referenced_columns(
    query: &Select,
    projections: &[Projection<'_>],
    metric_selects: &BTreeMap<&str, Select>,
    parents: &[&Node],
) -> Result<BTreeMap<String, BTreeSet<String>>, BuildError> {
    let mut exprs: Vec<&Expr> = Vec::new();
    for select in metric_selects.values() {
        exprs.extend(dag::column_bearing_expressions(select));
    }
    if let Some(selection) = &query.selection {
        exprs.push(selection);
    }
    exprs.extend(query.group_by.iter());

    let mut referenced = dag::get_referenced_columns(&exprs, parents)?;

    for projection in projections {
        if let Projection::Dimension { parent, column, .. } = projection {
            let node = parents
                .iter()
                .find(|node| node.name == *parent)
                .ok_or_else(|| BuildError::InvalidIdentifier(parent.clone()))?;
            if !node.column_names().any(|name| name == column) {
                return Err(BuildError::InvalidColumn(format!("{parent}.{column}")));
            }
            referenced.entry(parent.clone()).or_default().insert(column.clone());
        }
    }

    Ok(referenced)
}

/// The single aggregate projection of a metric's expression, unrewritten.
fn extract_metric_aggregate(select: &Select, node: &Node) -> Result<Expr, BuildError> {
    match select.projection.as_slice() {
        [item] => match &item.expr {
            expr @ Expr::Function { name, .. } if is_aggregate_function(name) => Ok(expr.clone()),
            _ => Err(BuildError::NotAMetric(node.name.clone())),
        },
        _ => Err(BuildError::NotAMetric(node.name.clone())),
    }
}
