//! Declared operations and their prepared statements.
//!
//! Every operation the store can run is listed in [`OPERATIONS`]. At
//! initialization each statement is compiled on every pooled connection and
//! kept in that connection's statement cache, so executing an operation
//! never re-parses its SQL.

use crate::error::{NodeDbError, NodeDbResult};
use crate::pool::ConnectionPool;
use rusqlite::types::ToSql;
use rusqlite::Connection;
use std::collections::HashMap;
use std::time::Duration;

/// Name of the operation that records a newly arriving segment.
pub const NEW_SEGMENT: &str = "new-segment";

const NEW_SEGMENT_SQL: &str = "\
insert into {schema}.segment (
    collection_id,
    key,
    status,
    unified_id,
    timestamp,
    segment_num,
    conjoined_part,
    source_node_id,
    handoff_node_id)
values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
returning id";

/// A declared operation: a stable name and its statement template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationDef {
    /// Logical operation name.
    pub name: &'static str,
    /// Statement text with a `{schema}` placeholder.
    pub template: &'static str,
    /// Number of positional parameters the statement takes.
    pub param_count: usize,
}

impl OperationDef {
    /// Renders the statement for a schema.
    pub fn render(&self, schema: &str) -> String {
        self.template.replace("{schema}", schema)
    }
}

/// The fixed operation set.
pub const OPERATIONS: &[OperationDef] = &[OperationDef {
    name: NEW_SEGMENT,
    template: NEW_SEGMENT_SQL,
    param_count: 9,
}];

/// An operation whose statement compiled on every pooled connection.
#[derive(Debug, Clone)]
pub struct PreparedOperation {
    name: &'static str,
    query: String,
    param_count: usize,
}

impl PreparedOperation {
    /// Logical operation name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Rendered statement text.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Number of positional parameters.
    pub fn param_count(&self) -> usize {
        self.param_count
    }

    /// Runs the statement on `conn` and returns column 0 of the single
    /// result row.
    pub fn query_id(
        &self,
        conn: &Connection,
        params: &[&dyn ToSql],
        busy_timeout: Duration,
    ) -> NodeDbResult<i64> {
        if params.len() != self.param_count {
            return Err(NodeDbError::invalid_arguments(
                self.name,
                format!(
                    "expected {} arguments, got {}",
                    self.param_count,
                    params.len()
                ),
            ));
        }

        let mut stmt = conn
            .prepare_cached(&self.query)
            .map_err(|e| NodeDbError::from_sqlite(self.name, busy_timeout, e))?;
        stmt.query_row(params, |row| row.get(0))
            .map_err(|e| NodeDbError::from_sqlite(self.name, busy_timeout, e))
    }
}

/// Read-only map from operation name to prepared operation.
#[derive(Debug, Clone)]
pub struct OperationRegistry {
    operations: HashMap<&'static str, PreparedOperation>,
}

impl OperationRegistry {
    /// Prepares the fixed operation set on every connection of `pool`.
    pub fn prepare(pool: &ConnectionPool, schema: &str) -> NodeDbResult<Self> {
        Self::prepare_defs(pool, schema, OPERATIONS)
    }

    /// Prepares `defs` on every connection of `pool`.
    ///
    /// Stops at the first statement that fails to compile. Nothing is
    /// returned unless every statement compiled everywhere.
    pub fn prepare_defs(
        pool: &ConnectionPool,
        schema: &str,
        defs: &[OperationDef],
    ) -> NodeDbResult<Self> {
        let capacity = defs.len().max(16);
        pool.for_each(|conn| {
            conn.set_prepared_statement_cache_capacity(capacity);
            Ok(())
        })?;

        let mut operations = HashMap::with_capacity(defs.len());
        for def in defs {
            if operations.contains_key(def.name) {
                return Err(NodeDbError::invalid_config(format!(
                    "operation {} is declared twice",
                    def.name
                )));
            }

            let query = def.render(schema);
            pool.for_each(|conn| compile(conn, def, &query))?;
            tracing::debug!(operation = def.name, "prepared statement");

            operations.insert(
                def.name,
                PreparedOperation {
                    name: def.name,
                    query,
                    param_count: def.param_count,
                },
            );
        }

        Ok(Self { operations })
    }

    /// Looks up an operation by name.
    pub fn get(&self, name: &str) -> NodeDbResult<&PreparedOperation> {
        self.operations
            .get(name)
            .ok_or_else(|| NodeDbError::UnknownOperation {
                name: name.to_string(),
            })
    }

    /// Names of all prepared operations, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.operations.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Number of prepared operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if no operations are prepared.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

fn compile(conn: &Connection, def: &OperationDef, query: &str) -> NodeDbResult<()> {
    let prepare_error = |source| NodeDbError::Prepare {
        operation: def.name.to_string(),
        query: query.to_string(),
        source,
    };

    let stmt = conn.prepare_cached(query).map_err(prepare_error)?;
    let compiled = stmt.parameter_count();
    if compiled != def.param_count {
        return Err(prepare_error(rusqlite::Error::InvalidParameterCount(
            compiled,
            def.param_count,
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ConnectionSource;

    struct MemorySource {
        ddl: &'static str,
    }

    impl ConnectionSource for MemorySource {
        fn open(&self) -> NodeDbResult<Connection> {
            let conn = Connection::open_in_memory().unwrap();
            conn.execute_batch(self.ddl).unwrap();
            Ok(conn)
        }

        fn describe(&self) -> String {
            "memory".to_string()
        }
    }

    const SEGMENT_DDL: &str = "CREATE TABLE segment (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        collection_id INTEGER, key TEXT, status TEXT, unified_id INTEGER,
        timestamp REAL, segment_num INTEGER, conjoined_part INTEGER,
        source_node_id INTEGER, handoff_node_id INTEGER);";

    fn pool(ddl: &'static str) -> ConnectionPool {
        ConnectionPool::open(&MemorySource { ddl }, 2, Duration::from_millis(50)).unwrap()
    }

    #[test]
    fn renders_schema_prefix() {
        let query = OPERATIONS[0].render("nimbusio_node");
        assert!(query.starts_with("insert into nimbusio_node.segment ("));
        assert!(query.ends_with("returning id"));
    }

    #[test]
    fn prepares_every_declared_operation() {
        let registry = OperationRegistry::prepare(&pool(SEGMENT_DDL), "main").unwrap();
        assert_eq!(registry.len(), OPERATIONS.len());
        assert_eq!(registry.names(), vec![NEW_SEGMENT]);
        assert_eq!(registry.get(NEW_SEGMENT).unwrap().param_count(), 9);
    }

    #[test]
    fn missing_table_is_a_prepare_error() {
        let err = OperationRegistry::prepare(&pool("SELECT 1;"), "main").unwrap_err();
        match err {
            NodeDbError::Prepare {
                operation, query, ..
            } => {
                assert_eq!(operation, NEW_SEGMENT);
                assert!(query.contains("main.segment"));
            }
            other => panic!("expected prepare error, got {other:?}"),
        }
    }

    #[test]
    fn parameter_count_mismatch_is_a_prepare_error() {
        let defs = [OperationDef {
            name: "short",
            template: "insert into {schema}.segment (key) values (?1) returning id",
            param_count: 2,
        }];
        let err = OperationRegistry::prepare_defs(&pool(SEGMENT_DDL), "main", &defs).unwrap_err();
        assert!(matches!(err, NodeDbError::Prepare { .. }));
    }

    #[test]
    fn duplicate_declarations_are_rejected() {
        let defs = [OPERATIONS[0], OPERATIONS[0]];
        let err = OperationRegistry::prepare_defs(&pool(SEGMENT_DDL), "main", &defs).unwrap_err();
        assert!(matches!(err, NodeDbError::InvalidConfig { .. }));
    }

    #[test]
    fn unknown_operation_lookup() {
        let registry = OperationRegistry::prepare(&pool(SEGMENT_DDL), "main").unwrap();
        let err = registry.get("delete-segment").unwrap_err();
        assert!(matches!(err, NodeDbError::UnknownOperation { .. }));
    }

    #[test]
    fn query_id_checks_argument_count() {
        let pool = pool(SEGMENT_DDL);
        let registry = OperationRegistry::prepare(&pool, "main").unwrap();
        let op = registry.get(NEW_SEGMENT).unwrap();
        let conn = pool.acquire(NEW_SEGMENT).unwrap();
        let err = op
            .query_id(&conn, &[&1i32, &"k"], Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, NodeDbError::InvalidArguments { .. }));
    }

    #[test]
    fn query_id_returns_generated_ids() {
        let pool = pool(SEGMENT_DDL);
        let registry = OperationRegistry::prepare(&pool, "main").unwrap();
        let op = registry.get(NEW_SEGMENT).unwrap();
        let conn = pool.acquire(NEW_SEGMENT).unwrap();
        let handoff: Option<i32> = None;

        let mut ids = Vec::new();
        for segment_num in 1..=3i32 {
            let params: [&dyn ToSql; 9] = [
                &1i32,
                &"key",
                &"A",
                &42i64,
                &0.0f64,
                &segment_num,
                &0i32,
                &5i32,
                &handoff,
            ];
            ids.push(op.query_id(&conn, &params, Duration::from_millis(50)).unwrap());
        }
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
