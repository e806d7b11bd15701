//! Create-schema command implementation.

use nodedb_core::{create_schema, ConnectionSource, NodeDbConfig, SqliteSource, SCHEMA_VERSION};

/// Runs the create-schema command.
pub fn run(config: &NodeDbConfig) -> Result<(), Box<dyn std::error::Error>> {
    let config = config.clone().create_if_missing(true);
    let mut conn = SqliteSource::new(config.clone()).open()?;
    create_schema(&mut conn, &config.schema)?;

    println!(
        "Installed segment schema v{} in {:?} as {}",
        SCHEMA_VERSION, config.database_path, config.schema
    );
    Ok(())
}
