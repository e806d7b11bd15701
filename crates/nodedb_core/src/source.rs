//! Opening connections to the node-local database.
//!
//! The store never opens connections itself; it asks a [`ConnectionSource`].
//! [`SqliteSource`] is the production source. Tests substitute their own to
//! exercise the failure paths of initialization.

use crate::config::NodeDbConfig;
use crate::error::{NodeDbError, NodeDbResult};
use rusqlite::{Connection, OpenFlags};

/// Something that can produce ready-to-use connections to the node database.
pub trait ConnectionSource: Send + Sync {
    /// Opens a new connection with the segment schema addressable.
    fn open(&self) -> NodeDbResult<Connection>;

    /// Short human-readable description used in logs.
    fn describe(&self) -> String;
}

/// Opens the node database file described by a [`NodeDbConfig`].
///
/// Unless the configured schema is `main`, each connection opens a private
/// in-memory primary database and attaches the node database file under
/// the schema name, so statements can address `<schema>.segment`.
#[derive(Debug, Clone)]
pub struct SqliteSource {
    config: NodeDbConfig,
}

impl SqliteSource {
    /// Creates a source for the given configuration.
    pub fn new(config: NodeDbConfig) -> Self {
        Self { config }
    }

    fn connection_error(&self, message: &str, err: rusqlite::Error) -> NodeDbError {
        NodeDbError::Connection {
            context: self.describe(),
            message: message.to_string(),
            source: Some(err),
        }
    }

    fn apply_pragmas(&self, conn: &Connection) -> NodeDbResult<()> {
        let schema = &self.config.schema;
        conn.execute_batch(&format!(
            "PRAGMA foreign_keys = ON;
             PRAGMA {schema}.journal_mode = {};
             PRAGMA {schema}.synchronous = {};",
            self.config.journal_mode.pragma_value(),
            self.config.sync_mode.pragma_value(),
        ))
        .map_err(|e| self.connection_error("failed to apply pragmas", e))?;
        conn.busy_timeout(self.config.operation_timeout)
            .map_err(|e| self.connection_error("failed to set busy timeout", e))?;
        Ok(())
    }
}

impl ConnectionSource for SqliteSource {
    fn open(&self) -> NodeDbResult<Connection> {
        self.config.validate()?;

        let path = &self.config.database_path;
        if !self.config.create_if_missing && !path.exists() {
            return Err(NodeDbError::connection(
                self.describe(),
                "database file does not exist",
            ));
        }

        let conn = if self.config.uses_main_schema() {
            let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            if self.config.create_if_missing {
                flags |= OpenFlags::SQLITE_OPEN_CREATE;
            }
            Connection::open_with_flags(path, flags)
                .map_err(|e| self.connection_error("failed to open database", e))?
        } else {
            let path_str = path.to_str().ok_or_else(|| {
                NodeDbError::connection(self.describe(), "database path is not valid UTF-8")
            })?;
            let conn = Connection::open_in_memory()
                .map_err(|e| self.connection_error("failed to open primary database", e))?;
            conn.execute(
                &format!("ATTACH DATABASE ?1 AS {}", self.config.schema),
                [path_str],
            )
            .map_err(|e| self.connection_error("failed to attach database", e))?;
            conn
        };

        self.apply_pragmas(&conn)?;
        Ok(conn)
    }

    fn describe(&self) -> String {
        format!(
            "{} ({} as {})",
            self.config.node_name,
            self.config.database_path.display(),
            self.config.schema
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_a_connection_error() {
        let dir = TempDir::new().unwrap();
        let config = NodeDbConfig::new("node-01", dir.path().join("absent.db"));
        let err = SqliteSource::new(config).open().unwrap_err();
        assert!(matches!(err, NodeDbError::Connection { .. }));
    }

    #[test]
    fn attaches_under_schema_name() {
        let dir = TempDir::new().unwrap();
        let config =
            NodeDbConfig::new("node-01", dir.path().join("node.db")).create_if_missing(true);
        let conn = SqliteSource::new(config).open().unwrap();

        conn.execute_batch("CREATE TABLE nimbusio_node.probe (x INTEGER);")
            .unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM nimbusio_node.sqlite_master WHERE name = 'probe'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn main_schema_opens_file_directly() {
        let dir = TempDir::new().unwrap();
        let config = NodeDbConfig::new("node-01", dir.path().join("node.db"))
            .schema("main")
            .create_if_missing(true);
        let conn = SqliteSource::new(config).open().unwrap();
        let foreign_keys: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn invalid_config_is_rejected_before_opening() {
        let config = NodeDbConfig::new("node-01", "/tmp/x.db").pool_size(0);
        let err = SqliteSource::new(config).open().unwrap_err();
        assert!(matches!(err, NodeDbError::InvalidConfig { .. }));
    }
}
