//! Node database configuration.

use crate::error::{NodeDbError, NodeDbResult};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default schema name the segment catalog lives in.
pub const DEFAULT_SCHEMA: &str = "nimbusio_node";

/// Environment variable naming the local node.
pub const ENV_NODE_NAME: &str = "NIMBUSIO_NODE_NAME";
/// Environment variable holding the node database path.
pub const ENV_DATABASE_PATH: &str = "NIMBUSIO_NODE_DATABASE_PATH";
/// Environment variable overriding the schema name.
pub const ENV_DATABASE_SCHEMA: &str = "NIMBUSIO_NODE_DATABASE_SCHEMA";
/// Environment variable overriding the pool size.
pub const ENV_POOL_SIZE: &str = "NIMBUSIO_NODE_DATABASE_POOL_SIZE";
/// Environment variable overriding the operation timeout, in milliseconds.
pub const ENV_TIMEOUT_MS: &str = "NIMBUSIO_NODE_DATABASE_TIMEOUT_MS";

/// SQLite journal mode for the node database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    /// Write-ahead logging.
    #[default]
    Wal,
    /// Rollback journal, deleted after each transaction.
    Delete,
}

impl JournalMode {
    /// Returns the pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// SQLite synchronous mode for the node database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Sync at critical moments only; safe with WAL.
    #[default]
    Normal,
    /// Sync on every commit.
    Full,
}

impl SyncMode {
    /// Returns the pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Full => "full",
        }
    }
}

/// Configuration for opening the node-local metadata database.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeDbConfig {
    /// Name of the local storage node.
    pub node_name: String,

    /// Path to the node database file.
    pub database_path: PathBuf,

    /// Schema name the segment table is addressed through.
    pub schema: String,

    /// Number of pooled connections.
    pub pool_size: usize,

    /// Bound on one operation, covering both the wait for a pooled
    /// connection and the wait for database locks.
    pub operation_timeout: Duration,

    /// Journal mode applied to the node database.
    pub journal_mode: JournalMode,

    /// Synchronous mode applied to the node database.
    pub sync_mode: SyncMode,

    /// Whether a missing database file may be created.
    pub create_if_missing: bool,
}

impl Default for NodeDbConfig {
    fn default() -> Self {
        Self {
            node_name: String::new(),
            database_path: PathBuf::new(),
            schema: DEFAULT_SCHEMA.to_string(),
            pool_size: 4,
            operation_timeout: Duration::from_secs(5),
            journal_mode: JournalMode::Wal,
            sync_mode: SyncMode::Normal,
            create_if_missing: false,
        }
    }
}

impl NodeDbConfig {
    /// Creates a configuration for `node_name` backed by the file at `path`.
    #[must_use]
    pub fn new(node_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            node_name: node_name.into(),
            database_path: path.into(),
            ..Self::default()
        }
    }

    /// Builds a configuration from the `NIMBUSIO_*` environment variables.
    pub fn from_env() -> NodeDbResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> NodeDbResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| NodeDbError::invalid_config(format!("{name} is not set")))
        };

        let mut config = Self::new(required(ENV_NODE_NAME)?, required(ENV_DATABASE_PATH)?);

        if let Some(schema) = lookup(ENV_DATABASE_SCHEMA) {
            config.schema = schema;
        }
        if let Some(raw) = lookup(ENV_POOL_SIZE) {
            config.pool_size = raw.parse().map_err(|_| {
                NodeDbError::invalid_config(format!("{ENV_POOL_SIZE} is not a number: {raw:?}"))
            })?;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            let millis: u64 = raw.parse().map_err(|_| {
                NodeDbError::invalid_config(format!("{ENV_TIMEOUT_MS} is not a number: {raw:?}"))
            })?;
            config.operation_timeout = Duration::from_millis(millis);
        }

        config.validate()?;
        Ok(config)
    }

    /// Sets the schema name.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Sets the number of pooled connections.
    #[must_use]
    pub const fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Sets the operation timeout.
    #[must_use]
    pub const fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets the journal mode.
    #[must_use]
    pub const fn journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = mode;
        self
    }

    /// Sets the synchronous mode.
    #[must_use]
    pub const fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Sets whether a missing database file may be created.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Returns true if the segment table lives in the primary database
    /// rather than an attached one.
    pub fn uses_main_schema(&self) -> bool {
        self.schema == "main"
    }

    /// Checks that the configuration can be used to open a store.
    pub fn validate(&self) -> NodeDbResult<()> {
        if self.pool_size == 0 {
            return Err(NodeDbError::invalid_config("pool_size must be at least 1"));
        }
        if self.operation_timeout.is_zero() {
            return Err(NodeDbError::invalid_config(
                "operation_timeout must be non-zero",
            ));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(NodeDbError::invalid_config("database_path is empty"));
        }
        if !is_identifier(&self.schema) {
            return Err(NodeDbError::invalid_config(format!(
                "schema name {:?} is not a plain identifier",
                self.schema
            )));
        }
        if self.schema.eq_ignore_ascii_case("temp") {
            return Err(NodeDbError::invalid_config("schema name \"temp\" is reserved"));
        }
        Ok(())
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
