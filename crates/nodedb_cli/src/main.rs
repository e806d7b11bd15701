//! nodedb CLI
//!
//! Command-line tools for a storage node's segment metadata database.
//!
//! # Commands
//!
//! - `create-schema` - Install the segment catalog
//! - `check` - Initialize the store and report its prepared operations
//! - `insert` - Record one segment and print its id
//! - `operations` - List the declared operations
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use nodedb_core::{NodeDbConfig, DEFAULT_SCHEMA};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Node segment metadata database tools.
#[derive(Parser)]
#[command(name = "nodedb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the node database file (defaults to NIMBUSIO_NODE_DATABASE_PATH)
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Schema name the segment table lives in
    #[arg(global = true, short, long)]
    schema: Option<String>,

    /// Name of the local node (defaults to NIMBUSIO_NODE_NAME)
    #[arg(global = true, short, long)]
    node_name: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the segment catalog, creating the database file if needed
    CreateSchema,

    /// Initialize the store and report the prepared operations
    Check,

    /// Record one new segment
    Insert {
        /// Owning collection id
        #[arg(long)]
        collection_id: i32,

        /// Object key
        #[arg(long)]
        key: String,

        /// Status token (A, C, F, T)
        #[arg(long, default_value = "A")]
        status: String,

        /// Unified id of the write
        #[arg(long)]
        unified_id: i64,

        /// Timestamp in seconds since the UNIX epoch (defaults to now)
        #[arg(long)]
        timestamp: Option<f64>,

        /// Segment number
        #[arg(long)]
        segment_num: i32,

        /// Conjoined part
        #[arg(long, default_value = "0")]
        conjoined_part: i32,

        /// Originating node id
        #[arg(long)]
        source_node_id: i32,

        /// Node this segment is held on behalf of
        #[arg(long)]
        handoff_node_id: Option<i32>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List declared operations and their statements
    Operations,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::CreateSchema => {
            let config = resolve_config(cli.path, cli.schema, cli.node_name)?;
            commands::schema::run(&config)?;
        }
        Commands::Check => {
            let config = resolve_config(cli.path, cli.schema, cli.node_name)?;
            commands::check::run(config)?;
        }
        Commands::Insert {
            collection_id,
            key,
            status,
            unified_id,
            timestamp,
            segment_num,
            conjoined_part,
            source_node_id,
            handoff_node_id,
            format,
        } => {
            let config = resolve_config(cli.path, cli.schema, cli.node_name)?;
            let args = commands::insert::InsertArgs {
                collection_id,
                key,
                status,
                unified_id,
                timestamp,
                segment_num,
                conjoined_part,
                source_node_id,
                handoff_node_id,
            };
            commands::insert::run(config, args, &format)?;
        }
        Commands::Operations => {
            let schema = cli.schema.as_deref().unwrap_or(DEFAULT_SCHEMA);
            commands::operations::run(schema);
        }
        Commands::Version => {
            println!("nodedb CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("nodedb core v{}", nodedb_core::VERSION);
        }
    }

    Ok(())
}

/// Builds the store configuration from flags, falling back to the
/// `NIMBUSIO_*` environment for anything not given.
fn resolve_config(
    path: Option<PathBuf>,
    schema: Option<String>,
    node_name: Option<String>,
) -> Result<NodeDbConfig, Box<dyn std::error::Error>> {
    let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

    let path = path
        .or_else(|| env(nodedb_core::ENV_DATABASE_PATH).map(PathBuf::from))
        .ok_or("Database path required (--path or NIMBUSIO_NODE_DATABASE_PATH)")?;
    let node_name = node_name
        .or_else(|| env(nodedb_core::ENV_NODE_NAME))
        .unwrap_or_else(|| "local".to_string());

    let mut config = NodeDbConfig::new(node_name, path).pool_size(1);
    if let Some(schema) = schema.or_else(|| env(nodedb_core::ENV_DATABASE_SCHEMA)) {
        config = config.schema(schema);
    }
    config.validate()?;
    tracing::debug!(?config, "resolved node database configuration");
    Ok(config)
}
