//! Human-readable output formatting.

use std::fmt::Write;

use is_terminal::IsTerminal;
use metricscope_core::{render_dag, CatalogSnapshot, CreateQuery, Node, NodeKind};
use owo_colors::OwoColorize;

pub fn use_colors() -> bool {
    std::io::stdout().is_terminal()
}

/// Formats the loaded catalog: a node listing plus the DAG tree.
pub fn format_catalog(catalog: &CatalogSnapshot, colored: bool) -> String {
    let mut out = String::new();

    let title = "MetricScope Repository";
    let line = "═".repeat(50);
    if colored {
        writeln!(out, "{}", title.bold()).unwrap();
        writeln!(out, "{}", line.dimmed()).unwrap();
    } else {
        writeln!(out, "{title}").unwrap();
        writeln!(out, "{line}").unwrap();
    }

    let stats = format!(
        "Summary: {} databases | {} nodes",
        catalog.all_databases().len(),
        catalog.nodes().len()
    );
    if colored {
        writeln!(out, "{}", stats.cyan()).unwrap();
    } else {
        writeln!(out, "{stats}").unwrap();
    }
    writeln!(out).unwrap();

    let mut nodes: Vec<&Node> = catalog.nodes().iter().collect();
    nodes.sort_by_key(|node| node.name.as_str());
    for node in nodes {
        let kind = match node.kind {
            NodeKind::Source => "source",
            NodeKind::Transform => "transform",
            NodeKind::Metric => "metric",
        };
        let databases = catalog
            .databases_containing(node)
            .map(|ids| {
                ids.iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_else(|_| "-".to_string());

        if colored {
            writeln!(
                out,
                "{:<30} {:<10} databases: [{}]",
                node.name.bold(),
                kind.dimmed(),
                databases
            )
            .unwrap();
        } else {
            writeln!(out, "{:<30} {:<10} databases: [{}]", node.name, kind, databases).unwrap();
        }
    }
    writeln!(out).unwrap();

    out.push_str(&render_dag(&catalog.dependencies()));
    out
}

/// Formats a planned query for a terminal.
pub fn format_create_query(create_query: &CreateQuery, colored: bool) -> String {
    let mut out = String::new();
    let header = format!("database: {}", create_query.database_id);
    if colored {
        writeln!(out, "{}", header.cyan()).unwrap();
    } else {
        writeln!(out, "{header}").unwrap();
    }
    writeln!(out, "{}", create_query.submitted_query).unwrap();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricscope_core::{CatalogSnapshot, Column, ColumnType, Database, Node, Table};

    #[test]
    fn test_format_catalog_lists_nodes() {
        let catalog = CatalogSnapshot::builder()
            .add_database(Database::new(1, "db", "sqlite://", 1.0))
            .add_node(Node::source(
                "A",
                vec![Table::new(1, "A", vec![Column::new("one", ColumnType::Str)])],
            ))
            .add_node(Node::derived("B", "SELECT COUNT(*) FROM A"))
            .finish()
            .unwrap();

        let out = format_catalog(&catalog, false);
        assert!(out.contains("2 nodes"));
        assert!(out.contains("source"));
        assert!(out.contains("metric"));
        assert!(out.contains("└── A"));
    }

    #[test]
    fn test_format_create_query() {
        let create_query = CreateQuery::new(1, "SELECT 1");
        let out = format_create_query(&create_query, false);
        assert_eq!(out, "database: 1\nSELECT 1\n");
    }
}
