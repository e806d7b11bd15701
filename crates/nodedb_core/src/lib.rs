//! # nodedb core
//!
//! Node-local segment metadata store for nimbus.io storage nodes.
//!
//! Each storage node keeps a small relational catalog of the segments it
//! holds. This crate provides:
//! - Configuration and the connection source that locates the node database
//! - A fixed-size connection pool safe for concurrent writers
//! - The registry of declared operations, prepared once at startup
//! - [`NodeDatabase`], the store handle with an explicit
//!   uninitialized / ready / failed / closed lifecycle
//! - Schema installation for provisioning and tests

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod pool;
mod registry;
mod schema;
mod segment;
mod source;
mod store;

pub use config::{
    JournalMode, NodeDbConfig, SyncMode, DEFAULT_SCHEMA, ENV_DATABASE_PATH, ENV_DATABASE_SCHEMA,
    ENV_NODE_NAME, ENV_POOL_SIZE, ENV_TIMEOUT_MS,
};
pub use error::{NodeDbError, NodeDbResult};
pub use pool::{ConnectionPool, PooledConnection};
pub use registry::{OperationDef, OperationRegistry, PreparedOperation, NEW_SEGMENT, OPERATIONS};
pub use schema::{create_schema, SCHEMA_VERSION};
pub use segment::{secs_to_timestamp, timestamp_to_secs, NewSegment, SegmentId, SegmentStatus};
pub use source::{ConnectionSource, SqliteSource};
pub use store::{NodeDatabase, StoreState};

/// Re-exported so callers can build `execute` arguments and custom sources
/// without depending on rusqlite directly.
pub use rusqlite;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
