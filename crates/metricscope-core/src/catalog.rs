//! The catalog: an immutable snapshot of databases and nodes.
//!
//! A [`CatalogSnapshot`] is built once by the loader through
//! [`CatalogBuilder`] and passed by shared reference into every build. Builds
//! are pure functions of the snapshot; the loader is the sole writer and
//! produces a fresh snapshot per reload, so the core needs no locks.
//!
//! Parent/child links are *names*, not owning references: `Node.parents`
//! indexes into the snapshot, and children are computed on demand by scanning
//! the parent lists.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::ast::{self, is_aggregate_function, Expr};
use crate::dag;
use crate::error::BuildError;
use crate::inference::infer_columns;
use crate::parser::parse_single_statement;
use crate::types::{Column, Database, Node, NodeKind};

/// A read-only snapshot of all persisted entities.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    databases: Vec<Database>,
    nodes: Vec<Node>,
    nodes_by_name: HashMap<String, usize>,
    databases_by_id: HashMap<u64, usize>,
}

impl CatalogSnapshot {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    pub fn find_node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes_by_name.get(name).map(|&index| &self.nodes[index])
    }

    pub fn find_database_by_id(&self, id: u64) -> Option<&Database> {
        self.databases_by_id.get(&id).map(|&index| &self.databases[index])
    }

    pub fn all_databases(&self) -> &[Database] {
        &self.databases
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The parent nodes of `node`, in the (sorted) order of `node.parents`.
    ///
    /// Infallible on a built snapshot: [`CatalogBuilder::finish`] rejects any
    /// node whose parents name an unknown node.
    pub fn parents_of(&self, node: &Node) -> Vec<&Node> {
        node.parents
            .iter()
            .filter_map(|name| self.find_node_by_name(name))
            .collect()
    }

    /// Nodes listing `name` among their parents, computed by scanning.
    pub fn children_of(&self, name: &str) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|node| node.parents.iter().any(|parent| parent == name))
            .collect()
    }

    /// Databases for which there exists a table of this node, transitively
    /// through parents for derived nodes.
    pub fn databases_containing(&self, node: &Node) -> Result<BTreeSet<u64>, BuildError> {
        dag::get_computable_databases(self, node, None)
    }

    /// The dependency map of the whole catalog, for rendering and ordering.
    pub fn dependencies(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.nodes
            .iter()
            .map(|node| (node.name.clone(), node.parents.iter().cloned().collect()))
            .collect()
    }
}

/// Staged entities, validated and frozen by [`CatalogBuilder::finish`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    databases: Vec<Database>,
    nodes: Vec<Node>,
}

impl CatalogBuilder {
    pub fn add_database(mut self, database: Database) -> Self {
        self.databases.push(database);
        self
    }

    pub fn add_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Validates the staged entities and freezes them into a snapshot.
    ///
    /// Enforces the catalog invariants: unique node names, positive database
    /// costs, tables referencing known databases, parents recomputed from
    /// expressions, an acyclic parent graph, and node kinds and column sets
    /// derived where missing.
    pub fn finish(self) -> Result<CatalogSnapshot, BuildError> {
        let CatalogBuilder {
            databases,
            mut nodes,
        } = self;

        let mut databases_by_id = HashMap::with_capacity(databases.len());
        for (index, database) in databases.iter().enumerate() {
            if database.cost <= 0.0 {
                return Err(BuildError::InvalidCost {
                    name: database.name.clone(),
                    cost: database.cost,
                });
            }
            if databases_by_id.insert(database.id, index).is_some() {
                return Err(BuildError::DuplicateDatabase(database.id));
            }
        }

        let mut nodes_by_name = HashMap::with_capacity(nodes.len());
        for (index, node) in nodes.iter().enumerate() {
            if nodes_by_name.insert(node.name.clone(), index).is_some() {
                return Err(BuildError::DuplicateNode(node.name.clone()));
            }
            for table in &node.tables {
                if !databases_by_id.contains_key(&table.database_id) {
                    return Err(BuildError::UnknownDatabase(format!(
                        "id {} (table {} of node {})",
                        table.database_id, table.table, node.name
                    )));
                }
                #[cfg(feature = "tracing")]
                if table.columns.is_empty() {
                    tracing::warn!(
                        node = %node.name,
                        table = %table.table,
                        "table has no columns; schema inference may have failed upstream"
                    );
                }
            }
        }

        // Recompute parents from expressions; the expression is the source of
        // truth, whatever the staged node claimed.
        for index in 0..nodes.len() {
            let node = &nodes[index];
            let parents = match &node.expression {
                None => Vec::new(),
                Some(expression) => {
                    let dependencies = dag::get_dependencies(expression)
                        .map_err(|err| invalid_expression(&node.name, err))?;
                    for dependency in &dependencies {
                        if !nodes_by_name.contains_key(dependency) {
                            return Err(BuildError::UnknownParent(dependency.clone()));
                        }
                    }
                    dependencies.into_iter().collect()
                }
            };
            nodes[index].parents = parents;
        }

        let dependencies: BTreeMap<String, BTreeSet<String>> = nodes
            .iter()
            .map(|node| (node.name.clone(), node.parents.iter().cloned().collect()))
            .collect();
        let order = dag::topological_order(&dependencies)?;

        // Kinds and column sets resolve leaves-first so that a derived node
        // can see its parents' inferred columns.
        let mut resolved: HashMap<String, Node> = HashMap::with_capacity(nodes.len());
        for name in &order {
            let index = nodes_by_name[name];
            let mut node = nodes[index].clone();
            node.kind = derive_node_kind(node.expression.as_deref())
                .map_err(|err| invalid_expression(&node.name, err))?;
            if node.columns.is_empty() {
                node.columns = derive_columns(&node, &resolved)
                    .map_err(|err| invalid_expression(&node.name, err))?;
            }
            resolved.insert(name.clone(), node);
        }
        for node in &mut nodes {
            *node = resolved.remove(&node.name).expect("node resolved above");
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            databases = databases.len(),
            nodes = nodes.len(),
            "catalog snapshot frozen"
        );

        Ok(CatalogSnapshot {
            databases,
            nodes,
            nodes_by_name,
            databases_by_id,
        })
    }
}

fn invalid_expression(name: &str, err: BuildError) -> BuildError {
    match err {
        err @ (BuildError::UnknownParent(_) | BuildError::CircularDependency(_)) => err,
        other => BuildError::InvalidNodeExpression {
            name: name.to_string(),
            source: Box::new(other),
        },
    }
}

/// Classifies a node from its expression: no expression is a source, a single
/// aggregate projection is a metric, anything else is a transform.
pub fn derive_node_kind(expression: Option<&str>) -> Result<NodeKind, BuildError> {
    let Some(expression) = expression else {
        return Ok(NodeKind::Source);
    };
    let statement = parse_single_statement(expression)?;
    let select = ast::convert_statement(&statement)?;
    let kind = match select.projection.as_slice() {
        [item] => match &item.expr {
            Expr::Function { name, .. } if is_aggregate_function(name) => NodeKind::Metric,
            _ => NodeKind::Transform,
        },
        _ => NodeKind::Transform,
    };
    Ok(kind)
}

fn derive_columns(node: &Node, resolved: &HashMap<String, Node>) -> Result<Vec<Column>, BuildError> {
    match &node.expression {
        None => {
            // Union of table columns, first occurrence wins.
            let mut columns: Vec<Column> = Vec::new();
            for table in &node.tables {
                for column in &table.columns {
                    if !columns.iter().any(|c| c.name == column.name) {
                        columns.push(column.clone());
                    }
                }
            }
            Ok(columns)
        }
        Some(expression) => {
            let statement = parse_single_statement(expression)?;
            let select = ast::convert_statement(&statement)?;
            let parents: Vec<&Node> = node
                .parents
                .iter()
                .map(|name| {
                    resolved
                        .get(name)
                        .ok_or_else(|| BuildError::UnknownParent(name.clone()))
                })
                .collect::<Result<_, _>>()?;
            infer_columns(&select, &parents)
        }
    }
}
