//! Segment catalog schema.
//!
//! The store does not manage its own schema; node provisioning does. This
//! module installs it for provisioning tools and tests.

use crate::error::{NodeDbError, NodeDbResult};
use rusqlite::{Connection, OptionalExtension};

/// Version recorded in `<schema>.schema_meta`.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA_DDL: &str = "
CREATE TABLE IF NOT EXISTS {schema}.schema_meta (
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS {schema}.segment (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection_id INTEGER NOT NULL,
    key TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('A', 'C', 'F', 'T')),
    unified_id INTEGER NOT NULL,
    timestamp REAL NOT NULL,
    segment_num INTEGER NOT NULL,
    conjoined_part INTEGER NOT NULL DEFAULT 0,
    source_node_id INTEGER NOT NULL,
    handoff_node_id INTEGER,
    UNIQUE (collection_id, unified_id, conjoined_part, segment_num)
);

CREATE INDEX IF NOT EXISTS {schema}.segment_collection_key_idx
    ON segment (collection_id, key);
";

/// Installs the segment catalog in `schema`, leaving existing tables alone.
///
/// Fails if the schema already records a different version.
pub fn create_schema(conn: &mut Connection, schema: &str) -> NodeDbResult<()> {
    let setup_error = |source| NodeDbError::Execution {
        operation: "create-schema".to_string(),
        source,
    };

    let tx = conn.transaction().map_err(setup_error)?;
    tx.execute_batch(&SCHEMA_DDL.replace("{schema}", schema))
        .map_err(setup_error)?;

    let version: Option<i64> = tx
        .query_row(
            &format!("SELECT version FROM {schema}.schema_meta LIMIT 1"),
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(setup_error)?;

    match version {
        None => {
            tx.execute(
                &format!("INSERT INTO {schema}.schema_meta (version) VALUES (?1)"),
                [SCHEMA_VERSION],
            )
            .map_err(setup_error)?;
        }
        Some(SCHEMA_VERSION) => {}
        Some(other) => {
            return Err(NodeDbError::invalid_config(format!(
                "schema {schema} is at version {other}, expected {SCHEMA_VERSION}"
            )));
        }
    }

    tx.commit().map_err(setup_error)?;
    tracing::info!(schema, version = SCHEMA_VERSION, "segment schema installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_tables_idempotently() {
        let mut conn = Connection::open_in_memory().unwrap();
        create_schema(&mut conn, "main").unwrap();
        create_schema(&mut conn, "main").unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM main.schema_meta", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn rejects_unknown_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        create_schema(&mut conn, "main").unwrap();
        conn.execute("UPDATE main.schema_meta SET version = 99", [])
            .unwrap();
        let err = create_schema(&mut conn, "main").unwrap_err();
        assert!(matches!(err, NodeDbError::InvalidConfig { .. }));
    }

    #[test]
    fn status_check_rejects_unknown_tokens() {
        let mut conn = Connection::open_in_memory().unwrap();
        create_schema(&mut conn, "main").unwrap();
        let result = conn.execute(
            "INSERT INTO segment (collection_id, key, status, unified_id, timestamp,
                                  segment_num, conjoined_part, source_node_id)
             VALUES (1, 'k', 'Z', 1, 0.0, 1, 0, 1)",
            [],
        );
        assert!(result.is_err());
    }
}
