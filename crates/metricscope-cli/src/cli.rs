//! CLI argument parsing using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// MetricScope - metric DAG query planner
#[derive(Parser, Debug)]
#[command(name = "metricscope")]
#[command(about = "Plan metric queries over a DAG of SQL nodes", long_about = None)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load and validate a metrics repository, printing the DAG
    Compile {
        /// Path to the metrics repository
        repository: PathBuf,
    },

    /// Build the query for a single node
    Build {
        /// Path to the metrics repository
        repository: PathBuf,

        /// Name of the node to build
        #[arg(long)]
        node: String,

        /// Column to group by (can be repeated)
        #[arg(long = "groupby", value_name = "COLUMN")]
        groupbys: Vec<String>,

        /// Filter in `<column><op><literal>` form (can be repeated)
        #[arg(long = "filter", value_name = "FILTER")]
        filters: Vec<String>,

        /// Pin the build to a specific database id
        #[arg(long, value_name = "ID")]
        database: Option<u64>,

        /// Output format
        #[arg(short, long, default_value = "table", value_enum)]
        format: OutputFormat,
    },

    /// Plan a SQL query over the virtual `metrics` table
    Query {
        /// Path to the metrics repository
        repository: PathBuf,

        /// The SQL to plan, e.g. `SELECT "core.num_comments" FROM metrics`
        sql: String,

        /// Output format
        #[arg(short, long, default_value = "table", value_enum)]
        format: OutputFormat,
    },

    /// Print the JSON Schema of the repository config formats
    Schema {
        /// Which config format to describe
        #[arg(long, default_value = "node", value_enum)]
        kind: SchemaKind,
    },
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Table,
    /// JSON output
    Json,
}

/// Repository config formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemaKind {
    Node,
    Database,
}
