//! # nodedb testkit
//!
//! Test utilities for the node segment metadata store.
//!
//! This crate provides:
//! - Temporary node databases with the segment schema installed
//! - Read-back helpers that query the catalog over a separate connection
//! - Property-based test generators using proptest
//! - A concurrent insert stress harness
//!
//! ## Usage
//!
//! ```rust,ignore
//! use nodedb_testkit::prelude::*;
//!
//! #[test]
//! fn records_a_segment() {
//!     with_test_db(|db| {
//!         let id = db.insert_new_segment(&sample_segment(1)).unwrap();
//!         assert!(db.fetch_segment(id).is_some());
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
