//! The node metadata store handle.

use crate::config::NodeDbConfig;
use crate::error::{NodeDbError, NodeDbResult};
use crate::pool::ConnectionPool;
use crate::registry::{OperationRegistry, NEW_SEGMENT};
use crate::segment::{NewSegment, SegmentId};
use crate::source::{ConnectionSource, SqliteSource};
use parking_lot::RwLock;
use rusqlite::types::ToSql;
use std::sync::Arc;
use std::time::Instant;

/// Lifecycle state of a [`NodeDatabase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// Constructed; `initialize` has not completed.
    Uninitialized,
    /// Every declared operation is prepared and callable.
    Ready,
    /// `initialize` failed; the store will never become ready.
    Failed,
    /// `shutdown` released the connections.
    Closed,
}

struct Ready {
    pool: ConnectionPool,
    registry: OperationRegistry,
}

enum Inner {
    Uninitialized,
    Ready(Arc<Ready>),
    Failed(String),
    Closed,
}

/// Handle to the node-local segment metadata store.
///
/// Construct one per process, call [`initialize`](Self::initialize) once
/// during startup, then share it (usually behind an `Arc`) with every
/// component that records segments.
///
/// ```rust,ignore
/// use nodedb_core::{NewSegment, NodeDatabase, NodeDbConfig};
///
/// let db = NodeDatabase::new(NodeDbConfig::from_env()?);
/// db.initialize()?;
///
/// let id = db.insert_new_segment(&NewSegment::new(1, "photos/cat.jpg", 9001, 3, 2))?;
///
/// db.shutdown();
/// ```
pub struct NodeDatabase {
    config: NodeDbConfig,
    source: Box<dyn ConnectionSource>,
    inner: RwLock<Inner>,
}

impl NodeDatabase {
    /// Creates an uninitialized store that opens the configured SQLite file.
    pub fn new(config: NodeDbConfig) -> Self {
        let source = SqliteSource::new(config.clone());
        Self::with_source(config, Box::new(source))
    }

    /// Creates an uninitialized store that obtains connections from `source`.
    pub fn with_source(config: NodeDbConfig, source: Box<dyn ConnectionSource>) -> Self {
        Self {
            config,
            source,
            inner: RwLock::new(Inner::Uninitialized),
        }
    }

    /// Opens the connection pool and prepares every declared operation.
    ///
    /// Either every operation becomes callable or the store moves to
    /// [`StoreState::Failed`] and stays there. Calling this again after an
    /// attempt has completed, successfully or not, returns
    /// [`NodeDbError::AlreadyInitialized`] and changes nothing.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if the configuration is unusable
    /// - `Connection` if the node database cannot be opened
    /// - `Prepare` naming the first operation that failed to compile
    pub fn initialize(&self) -> NodeDbResult<()> {
        let mut inner = self.inner.write();
        if !matches!(*inner, Inner::Uninitialized) {
            return Err(NodeDbError::AlreadyInitialized);
        }

        tracing::info!(
            node = %self.config.node_name,
            source = %self.source.describe(),
            pool_size = self.config.pool_size,
            "initializing node database"
        );

        match self.open_ready() {
            Ok(ready) => {
                tracing::info!(
                    node = %self.config.node_name,
                    operations = ready.registry.len(),
                    "node database ready"
                );
                *inner = Inner::Ready(Arc::new(ready));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(node = %self.config.node_name, error = %e, "node database initialization failed");
                *inner = Inner::Failed(e.to_string());
                Err(e)
            }
        }
    }

    fn open_ready(&self) -> NodeDbResult<Ready> {
        self.config.validate()?;
        let pool = ConnectionPool::open(
            self.source.as_ref(),
            self.config.pool_size,
            self.config.operation_timeout,
        )?;

        match OperationRegistry::prepare(&pool, &self.config.schema) {
            Ok(registry) => Ok(Ready { pool, registry }),
            Err(e) => {
                pool.close();
                Err(e)
            }
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> StoreState {
        match *self.inner.read() {
            Inner::Uninitialized => StoreState::Uninitialized,
            Inner::Ready(_) => StoreState::Ready,
            Inner::Failed(_) => StoreState::Failed,
            Inner::Closed => StoreState::Closed,
        }
    }

    /// Returns true if operations can be executed.
    pub fn is_ready(&self) -> bool {
        self.state() == StoreState::Ready
    }

    /// Returns the configuration.
    pub fn config(&self) -> &NodeDbConfig {
        &self.config
    }

    /// Names of the prepared operations.
    pub fn operation_names(&self) -> NodeDbResult<Vec<&'static str>> {
        Ok(self.ready()?.registry.names())
    }

    /// Returns the statement text of a prepared operation.
    pub fn operation_query(&self, name: &str) -> NodeDbResult<String> {
        let ready = self.ready()?;
        Ok(ready.registry.get(name)?.query().to_string())
    }

    fn ready(&self) -> NodeDbResult<Arc<Ready>> {
        match &*self.inner.read() {
            Inner::Ready(ready) => Ok(Arc::clone(ready)),
            Inner::Uninitialized => Err(NodeDbError::not_ready("initialize has not been called")),
            Inner::Failed(reason) => Err(NodeDbError::not_ready(format!(
                "initialization failed: {reason}"
            ))),
            Inner::Closed => Err(NodeDbError::not_ready("node database has been shut down")),
        }
    }

    /// Executes the operation registered under `name` and returns the id
    /// it produced.
    ///
    /// Blocks for the database round trip. Nothing is retried.
    ///
    /// # Errors
    ///
    /// - `NotReady` unless the store is ready
    /// - `UnknownOperation` if `name` is not declared
    /// - `InvalidArguments` if the argument count is wrong
    /// - `Timeout` if no connection or lock became available within
    ///   `operation_timeout`, counted from the start of the call
    /// - `ConstraintViolation` if the database rejected the row
    /// - `Connection` if the database became unusable
    pub fn execute(&self, name: &str, params: &[&dyn ToSql]) -> NodeDbResult<i64> {
        let timeout = self.config.operation_timeout;
        let started = Instant::now();

        let ready = self.ready()?;
        let operation = ready.registry.get(name)?;
        let conn = ready.pool.acquire(operation.name())?;

        // The lock wait gets whatever the pool wait left over.
        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(NodeDbError::timeout(operation.name(), timeout));
        }
        conn.busy_timeout(remaining)
            .map_err(|e| NodeDbError::from_sqlite(operation.name(), timeout, e))?;

        operation.query_id(&conn, params, timeout)
    }

    /// Records a newly arriving segment and returns its generated id.
    pub fn insert_new_segment(&self, segment: &NewSegment) -> NodeDbResult<SegmentId> {
        segment.validate()?;

        let timestamp = segment.timestamp_secs();
        let params: [&dyn ToSql; 9] = [
            &segment.collection_id,
            &segment.key,
            &segment.status,
            &segment.unified_id,
            &timestamp,
            &segment.segment_num,
            &segment.conjoined_part,
            &segment.source_node_id,
            &segment.handoff_node_id,
        ];

        let id = SegmentId::new(self.execute(NEW_SEGMENT, &params)?);
        tracing::debug!(
            %id,
            collection_id = segment.collection_id,
            unified_id = segment.unified_id,
            segment_num = segment.segment_num,
            "recorded new segment"
        );
        Ok(id)
    }

    /// Releases every pooled connection.
    ///
    /// Operations already holding a connection finish first. Afterwards the
    /// store reports `NotReady`. Calling this more than once is harmless.
    pub fn shutdown(&self) {
        let previous = std::mem::replace(&mut *self.inner.write(), Inner::Closed);
        let Inner::Ready(ready) = previous else {
            return;
        };

        match Arc::try_unwrap(ready) {
            Ok(ready) => {
                let failures = ready.pool.close();
                tracing::info!(node = %self.config.node_name, failures, "node database shut down");
            }
            // In-flight callers still hold the pool; it closes when the last one drops it.
            Err(_) => {
                tracing::info!(node = %self.config.node_name, "node database shut down with operations in flight");
            }
        }
    }
}

impl Drop for NodeDatabase {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for NodeDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeDatabase")
            .field("node", &self.config.node_name)
            .field("source", &self.source.describe())
            .field("state", &self.state())
            .finish()
    }
}
