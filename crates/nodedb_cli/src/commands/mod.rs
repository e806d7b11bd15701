//! CLI command implementations.

pub mod check;
pub mod insert;
pub mod operations;
pub mod schema;
