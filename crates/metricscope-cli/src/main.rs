//! MetricScope CLI - metric DAG query planner

mod cli;
mod loader;
mod output;
mod schema;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use metricscope_core::{get_query_for_node, get_query_for_sql, BuildError, CreateQuery};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use cli::{Args, Command, OutputFormat};

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Build failures carry a DBAPI classification; print the envelope
            // message and exit 1. Anything else is an operational error.
            if let Some(build_error) = e.downcast_ref::<BuildError>() {
                let envelope = build_error.envelope();
                eprintln!("metricscope: {:?}: {}", envelope.tag, envelope.message);
                ExitCode::from(1)
            } else {
                eprintln!("metricscope: error: {e:#}");
                ExitCode::from(66)
            }
        }
    }
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .compact()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Compile { repository } => {
            let catalog = loader::load_repository(&repository)?;
            print!("{}", output::format_catalog(&catalog, output::use_colors()));
        }
        Command::Build {
            repository,
            node,
            groupbys,
            filters,
            database,
            format,
        } => {
            let catalog = loader::load_repository(&repository)?;
            let node = catalog
                .find_node_by_name(&node)
                .ok_or(BuildError::UnknownNode(node))?;
            let create_query =
                get_query_for_node(&catalog, node, &groupbys, &filters, database)?;
            print_create_query(&create_query, format)?;
        }
        Command::Query {
            repository,
            sql,
            format,
        } => {
            let catalog = loader::load_repository(&repository)?;
            let create_query = get_query_for_sql(&catalog, &sql)?;
            print_create_query(&create_query, format)?;
        }
        Command::Schema { kind } => {
            println!("{}", schema::format_schema(kind)?);
        }
    }
    Ok(())
}

fn print_create_query(create_query: &CreateQuery, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => print!(
            "{}",
            output::format_create_query(create_query, output::use_colors())
        ),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(create_query)?),
    }
    Ok(())
}
