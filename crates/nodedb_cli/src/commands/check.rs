//! Check command implementation.

use nodedb_core::{NodeDatabase, NodeDbConfig};

/// Runs the check command.
pub fn run(config: NodeDbConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Checking node database at {:?}", config.database_path);
    println!();

    let db = NodeDatabase::new(config);
    if let Err(e) = db.initialize() {
        println!("✗ Initialization failed: {}", e);
        return Err("Check failed".into());
    }

    for name in db.operation_names()? {
        println!("  prepared {}", name);
    }
    db.shutdown();

    println!();
    println!("✓ Node database is ready");
    Ok(())
}
