//! Operations command implementation.

use nodedb_core::OPERATIONS;

/// Runs the operations command.
pub fn run(schema: &str) {
    for op in OPERATIONS {
        println!("{} ({} parameters)", op.name, op.param_count);
        for line in op.render(schema).lines() {
            println!("    {}", line);
        }
        println!();
    }
}
