//! The crate's SQL vocabulary.
//!
//! `sqlparser` output is externally defined and much wider than the planner
//! needs, so it is wrapped behind this mini-AST: a single-`SELECT` shape with
//! identifiers, function calls, binary operations, literals, and FROM items
//! that are either node references, physical tables, or aliased subqueries.
//!
//! Two identifier forms coexist on purpose. [`Expr::Identifier`] is the
//! *unresolved* form straight out of the parser, an ordered sequence of parts
//! (`core.comments.user_id` → `["core", "comments", "user_id"]`); the
//! transpiler and planner rewrite every one of them into [`Expr::Column`],
//! the *resolved* form bound to a relation alias. Serialized output therefore
//! never contains an unresolved identifier.

mod convert;
mod render;

pub use convert::{convert_query, convert_statement, identifier_parts};

/// Aggregate function names recognized when classifying metric nodes.
const AGGREGATE_FUNCTIONS: &[&str] = &[
    "any_value",
    "array_agg",
    "avg",
    "bool_and",
    "bool_or",
    "count",
    "every",
    "max",
    "min",
    "stddev",
    "stddev_pop",
    "stddev_samp",
    "string_agg",
    "sum",
    "var_pop",
    "var_samp",
    "variance",
];

/// Whether a function name denotes an aggregate.
pub fn is_aggregate_function(name: &str) -> bool {
    AGGREGATE_FUNCTIONS
        .binary_search(&name.to_ascii_lowercase().as_str())
        .is_ok()
}

/// A literal value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    /// Numeric literal, kept as written.
    Number(String),
    String(String),
    Boolean(bool),
    Null,
}

/// Binary operators the planner understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Gt,
    Lt,
    GtEq,
    LtEq,
    Eq,
    NotEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Unresolved identifier: ordered parts of a possibly dotted name.
    Identifier { parts: Vec<String> },
    /// Column reference resolved against a relation alias.
    Column {
        relation: Option<String>,
        name: String,
    },
    /// `*`; as a function argument it serializes as the literal `'*'`.
    Wildcard,
    Literal(Literal),
    Function { name: String, args: Vec<Expr> },
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expr>,
    },
    /// Parenthesized expression.
    Nested(Box<Expr>),
}

impl Expr {
    pub fn column(relation: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Column {
            relation: Some(relation.into()),
            name: name.into(),
        }
    }

    pub fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Self {
        Self::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Folds expressions into a conjunction; `None` when empty.
    pub fn conjunction(exprs: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        exprs
            .into_iter()
            .reduce(|acc, expr| Expr::binary(acc, BinaryOperator::And, expr))
    }
}

/// One item of a SELECT list.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn unnamed(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn aliased(expr: Expr, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: Some(alias.into()),
        }
    }
}

/// A FROM item: relation plus any joins hanging off it.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub relation: Relation,
    pub joins: Vec<Join>,
}

impl TableRef {
    pub fn new(relation: Relation) -> Self {
        Self {
            relation,
            joins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub relation: Relation,
    pub kind: JoinKind,
    pub constraint: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
    Cross,
}

/// A relation in FROM position.
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    /// Reference to a DAG node by its (possibly dotted) name; replaced by the
    /// transpiler before serialization.
    Node { name: String },
    /// A physical table, `catalog.schema.table` parts.
    Table { parts: Vec<String> },
    /// A parenthesized subquery with a quoted alias.
    Subquery { query: Box<Select>, alias: String },
}

impl Relation {
    pub fn subquery(query: Select, alias: impl Into<String>) -> Self {
        Self::Subquery {
            query: Box::new(query),
            alias: alias.into(),
        }
    }
}

/// A single-SELECT query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Select {
    pub projection: Vec<SelectItem>,
    pub from: Vec<TableRef>,
    pub selection: Option<Expr>,
    pub group_by: Vec<Expr>,
}

impl Select {
    /// Names of the nodes referenced in FROM and JOIN position.
    pub fn referenced_nodes(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for table_ref in &self.from {
            if let Relation::Node { name } = &table_ref.relation {
                names.push(name.as_str());
            }
            for join in &table_ref.joins {
                if let Relation::Node { name } = &join.relation {
                    names.push(name.as_str());
                }
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_aggregate_function() {
        assert!(is_aggregate_function("count"));
        assert!(is_aggregate_function("COUNT"));
        assert!(is_aggregate_function("Max"));
        assert!(!is_aggregate_function("upper"));
        assert!(!is_aggregate_function("coalesce"));
    }

    #[test]
    fn test_aggregate_table_is_sorted() {
        let mut sorted = AGGREGATE_FUNCTIONS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, AGGREGATE_FUNCTIONS);
    }

    #[test]
    fn test_conjunction() {
        assert_eq!(Expr::conjunction(vec![]), None);

        let single = Expr::conjunction(vec![Expr::Wildcard]);
        assert_eq!(single, Some(Expr::Wildcard));

        let folded = Expr::conjunction(vec![
            Expr::column("A", "one"),
            Expr::column("A", "two"),
            Expr::column("A", "three"),
        ])
        .unwrap();
        let Expr::BinaryOp { op, right, .. } = folded else {
            panic!("expected conjunction");
        };
        assert_eq!(op, BinaryOperator::And);
        assert_eq!(*right, Expr::column("A", "three"));
    }

    #[test]
    fn test_referenced_nodes_includes_joins() {
        let select = Select {
            projection: vec![SelectItem::unnamed(Expr::Wildcard)],
            from: vec![TableRef {
                relation: Relation::Node {
                    name: "core.A".to_string(),
                },
                joins: vec![Join {
                    relation: Relation::Node {
                        name: "core.B".to_string(),
                    },
                    kind: JoinKind::Inner,
                    constraint: None,
                }],
            }],
            selection: None,
            group_by: vec![],
        };
        assert_eq!(select.referenced_nodes(), vec!["core.A", "core.B"]);
    }
}
