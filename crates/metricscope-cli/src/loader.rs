//! Repository loader: YAML configs into a catalog snapshot.
//!
//! A metrics repository is a directory with two sections:
//!
//! - `databases/*.yaml` — one file per execution database;
//! - `nodes/**/*.yaml` — one file per node, nested directories allowed.
//!
//! Entity names derive from the path relative to the section root with
//! separators replaced by dots, so `nodes/core/comments.yaml` defines the
//! node `core.comments`. Database ids are assigned in ascending name order,
//! so a repository always loads to the same snapshot.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use metricscope_core::{
    render_dag, CatalogSnapshot, Column, ColumnType, Database, Node, Table,
};
use schemars::JsonSchema;
use serde::Deserialize;

/// A database config file.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub description: Option<String>,
    /// Connection descriptor, e.g. `postgresql://host/db`.
    #[serde(rename = "URI")]
    pub uri: String,
    /// Strictly positive; lower cost is preferred.
    pub cost: f64,
}

/// A node config file.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    #[serde(default)]
    pub description: Option<String>,
    /// SQL expression; absent for source nodes.
    #[serde(default)]
    pub expression: Option<String>,
    /// Physical tables keyed by database name.
    #[serde(default)]
    pub tables: BTreeMap<String, Vec<TableConfig>>,
}

/// A physical table of a node in one database.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    pub table: String,
    /// Column metadata; read from config rather than introspected live.
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

/// Loads a repository into a catalog snapshot.
pub fn load_repository(repository: &Path) -> Result<CatalogSnapshot> {
    if !repository.is_dir() {
        bail!("Not a repository: {}", repository.display());
    }

    let databases = load_section::<DatabaseConfig>(&repository.join("databases"))?;
    let nodes = load_section::<NodeConfig>(&repository.join("nodes"))?;

    let mut builder = CatalogSnapshot::builder();
    let mut database_ids: BTreeMap<String, u64> = BTreeMap::new();

    // Ids follow ascending name order; BTreeMap iteration provides it.
    for (index, (name, loaded)) in databases.into_iter().enumerate() {
        let id = index as u64 + 1;
        tracing::info!(database = %name, id, "Processing database");
        let mut database = Database::new(id, name.clone(), loaded.config.uri, loaded.config.cost);
        database.description = loaded.config.description;
        database.created_at = loaded.modified_at;
        database.updated_at = loaded.modified_at;
        database_ids.insert(name, id);
        builder = builder.add_database(database);
    }

    for (name, loaded) in nodes {
        tracing::info!(node = %name, "Processing node");
        let config = loaded.config;

        let mut tables = Vec::new();
        for (database_name, table_configs) in config.tables {
            let database_id = *database_ids.get(&database_name).with_context(|| {
                format!("Node {name} references unknown database {database_name}")
            })?;
            for table_config in table_configs {
                let mut table = Table::new(
                    database_id,
                    table_config.table,
                    table_config
                        .columns
                        .into_iter()
                        .map(|column| Column::new(column.name, column.column_type))
                        .collect(),
                );
                table.catalog = table_config.catalog;
                table.schema = table_config.schema;
                tables.push(table);
            }
        }

        let mut node = match config.expression {
            Some(expression) => Node::derived(name, expression).with_tables(tables),
            None => Node::source(name, tables),
        };
        node.description = config.description;
        node.created_at = loaded.modified_at;
        node.updated_at = loaded.modified_at;
        builder = builder.add_node(node);
    }

    let catalog = builder.finish().context("Failed to build catalog")?;
    tracing::info!("DAG:\n{}", render_dag(&catalog.dependencies()));
    Ok(catalog)
}

struct Loaded<T> {
    config: T,
    modified_at: DateTime<Utc>,
}

/// Loads every YAML file under `directory`, keyed by dotted name.
fn load_section<T: serde::de::DeserializeOwned>(
    directory: &Path,
) -> Result<BTreeMap<String, Loaded<T>>> {
    let mut entries = BTreeMap::new();
    if !directory.is_dir() {
        tracing::warn!(directory = %directory.display(), "missing repository section");
        return Ok(entries);
    }

    for path in yaml_files(directory)? {
        let name = name_from_path(directory, &path)?;
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: T = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        let modified_at = fs::metadata(&path)
            .and_then(|metadata| metadata.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        if entries
            .insert(
                name.clone(),
                Loaded {
                    config,
                    modified_at,
                },
            )
            .is_some()
        {
            bail!("Duplicate config name: {name}");
        }
    }
    Ok(entries)
}

/// Recursively collects `*.yaml` / `*.yml` files, sorted for determinism.
fn yaml_files(directory: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![directory.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)
            .with_context(|| format!("Failed to list {}", current.display()))?
        {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            ) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// `nodes/core/comments.yaml` relative to `nodes/` becomes `core.comments`.
fn name_from_path(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .with_context(|| format!("Path {} outside {}", path.display(), root.display()))?;
    let parts: Vec<String> = relative
        .with_extension("")
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricscope_core::NodeKind;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn repository() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "databases/slow.yaml",
            "description: A slow database\nURI: sqlite://\ncost: 10.0\n",
        );
        write(
            dir.path(),
            "databases/fast.yaml",
            "URI: postgresql://host/db\ncost: 1.0\n",
        );
        write(
            dir.path(),
            "nodes/core/comments.yaml",
            r#"
description: A comment on the website
tables:
  slow:
    - table: comments
      columns:
        - name: user_id
          type: INT
        - name: comment
          type: STR
"#,
        );
        write(
            dir.path(),
            "nodes/core/num_comments.yaml",
            "description: Number of comments\nexpression: SELECT COUNT(*) FROM core.comments\n",
        );
        dir
    }

    #[test]
    fn test_load_repository() {
        let dir = repository();
        let catalog = load_repository(dir.path()).unwrap();

        // fast sorts before slow, so it takes id 1.
        let fast = catalog.find_database_by_id(1).unwrap();
        assert_eq!(fast.name, "fast");
        let slow = catalog.find_database_by_id(2).unwrap();
        assert_eq!(slow.name, "slow");
        assert_eq!(slow.description.as_deref(), Some("A slow database"));

        let comments = catalog.find_node_by_name("core.comments").unwrap();
        assert_eq!(comments.kind, NodeKind::Source);
        assert_eq!(comments.tables[0].database_id, 2);
        assert_eq!(comments.columns.len(), 2);

        let num_comments = catalog.find_node_by_name("core.num_comments").unwrap();
        assert_eq!(num_comments.kind, NodeKind::Metric);
        assert_eq!(num_comments.parents, vec!["core.comments"]);
    }

    #[test]
    fn test_unknown_database_reference() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "nodes/a.yaml",
            "tables:\n  missing:\n    - table: a\n",
        );
        let err = load_repository(dir.path()).unwrap_err();
        assert!(err.to_string().contains("unknown database"));
    }

    #[test]
    fn test_invalid_expression_is_reported_with_node_name() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "nodes/bad.yaml", "expression: SELECT FROM WHERE\n");
        let err = load_repository(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("bad"));
    }

    #[test]
    fn test_name_from_path() {
        let root = Path::new("/repo/nodes");
        let name = name_from_path(root, Path::new("/repo/nodes/core/comments.yaml")).unwrap();
        assert_eq!(name, "core.comments");
    }
}
