//! Property tests for the planner invariants.

use std::collections::HashMap;

use metricscope_core::ast::Expr;
use metricscope_core::{
    get_filter, get_query_for_sql, BuildError, CatalogSnapshot, Column, ColumnType, Database,
    Node, Table,
};
use proptest::prelude::*;

proptest! {
    /// A filter whose right-hand side is a call expression must be rejected
    /// without being evaluated.
    #[test]
    fn filter_rejects_call_expressions(
        column in "[a-z]{1,8}",
        callee in "[a-z]{1,8}",
        arg in "[a-z0-9]{0,8}",
    ) {
        let columns = HashMap::from([(column.clone(), Expr::column("t", column.clone()))]);
        let filter = format!("{column}>{callee}({arg})");
        let result = get_filter(&columns, &filter);
        prop_assert!(matches!(result, Err(BuildError::InvalidValue(_))));
    }

    /// A bare identifier is not a literal and never passes.
    #[test]
    fn filter_rejects_identifiers(
        column in "[a-z]{1,8}",
        rhs in "[a-z_]{1,8}",
    ) {
        prop_assume!(rhs != "true" && rhs != "false" && rhs != "null");

        let columns = HashMap::from([(column.clone(), Expr::column("t", column.clone()))]);
        let filter = format!("{column}={rhs}");
        let result = get_filter(&columns, &filter);
        prop_assert!(result.is_err());
    }

    /// Planning the same SQL twice over the same catalog is byte-identical,
    /// and the chosen database is never beaten on cost.
    #[test]
    fn build_is_deterministic_and_cost_minimal(
        suffix in "[a-z]{1,6}",
        cost_a in 0.5f64..50.0,
        cost_b in 0.5f64..50.0,
    ) {
        let source = format!("src_{suffix}");
        let metric = format!("m_{suffix}");
        let columns = vec![Column::new("one", ColumnType::Str)];

        let catalog = CatalogSnapshot::builder()
            .add_database(Database::new(1, "a", "sqlite://", cost_a))
            .add_database(Database::new(2, "b", "sqlite://", cost_b))
            .add_node(Node::source(
                source.clone(),
                vec![
                    Table::new(1, source.clone(), columns.clone()),
                    Table::new(2, source.clone(), columns),
                ],
            ))
            .add_node(Node::derived(
                metric.clone(),
                format!("SELECT COUNT(*) AS cnt FROM {source}"),
            ))
            .finish()
            .unwrap();

        let sql = format!("SELECT {metric} FROM metrics");
        let first = get_query_for_sql(&catalog, &sql).unwrap();
        let second = get_query_for_sql(&catalog, &sql).unwrap();
        prop_assert_eq!(&first, &second);

        let chosen = catalog.find_database_by_id(first.database_id).unwrap();
        for database in catalog.all_databases() {
            prop_assert!(chosen.cost <= database.cost);
        }
    }

    /// A cycle anywhere in the parent graph is rejected when the catalog is
    /// built, whatever the cycle length.
    #[test]
    fn cycles_always_rejected(len in 2usize..12) {
        let mut builder = CatalogSnapshot::builder();
        for index in 0..len {
            let next = (index + 1) % len;
            builder = builder.add_node(Node::derived(
                format!("n{index}"),
                format!("SELECT one FROM n{next}"),
            ));
        }
        let result = builder.finish();
        prop_assert!(matches!(result, Err(BuildError::CircularDependency(_))));
    }
}
