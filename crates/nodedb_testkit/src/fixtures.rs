//! Test fixtures and node database helpers.

use nodedb_core::{
    create_schema, secs_to_timestamp, timestamp_to_secs, ConnectionSource, NewSegment,
    NodeDatabase, NodeDbConfig, SegmentId, SegmentStatus, SqliteSource,
};
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Node name used by every fixture.
pub const TEST_NODE_NAME: &str = "test-node-01";

/// A node database in a temporary directory, removed on drop.
pub struct TestNodeDb {
    /// The store under test.
    pub db: NodeDatabase,
    path: PathBuf,
    _temp_dir: TempDir,
}

impl TestNodeDb {
    /// Creates a database with the schema installed and the store initialized.
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    /// Like [`new`](Self::new), with the configuration adjusted by `f`.
    pub fn with_config<F>(f: F) -> Self
    where
        F: FnOnce(NodeDbConfig) -> NodeDbConfig,
    {
        let test_db = Self::uninitialized_with_config(f);
        test_db
            .db
            .initialize()
            .expect("Failed to initialize node database");
        test_db
    }

    /// Creates a database with the schema installed but the store not yet
    /// initialized.
    pub fn uninitialized() -> Self {
        Self::uninitialized_with_config(|config| config)
    }

    fn uninitialized_with_config<F>(f: F) -> Self
    where
        F: FnOnce(NodeDbConfig) -> NodeDbConfig,
    {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("node.db");
        let config = f(base_config(&path));
        install_schema(&config);

        Self {
            db: NodeDatabase::new(config),
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Creates an empty database file with no segment table, store not
    /// initialized.
    pub fn without_schema() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("node.db");
        Connection::open(&path)
            .and_then(|conn| conn.execute_batch("PRAGMA user_version = 1;"))
            .expect("Failed to create database file");

        Self {
            db: NodeDatabase::new(base_config(&path)),
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens a connection that bypasses the store entirely.
    pub fn raw_connection(&self) -> Connection {
        let conn = Connection::open(&self.path).expect("Failed to open raw connection");
        conn.busy_timeout(Duration::from_secs(10))
            .expect("Failed to set busy timeout");
        conn
    }

    /// Number of rows in the segment catalog.
    pub fn count_segments(&self) -> i64 {
        self.raw_connection()
            .query_row("SELECT COUNT(*) FROM segment", [], |row| row.get(0))
            .expect("Failed to count segments")
    }

    /// Reads one segment row by id.
    pub fn fetch_segment(&self, id: SegmentId) -> Option<SegmentRow> {
        self.raw_connection()
            .query_row(
                "SELECT id, collection_id, key, status, unified_id, timestamp,
                        segment_num, conjoined_part, source_node_id, handoff_node_id
                 FROM segment WHERE id = ?1",
                [id.as_i64()],
                SegmentRow::from_row,
            )
            .optional()
            .expect("Failed to fetch segment")
    }

    /// Reads every segment row, ordered by id.
    pub fn all_segments(&self) -> Vec<SegmentRow> {
        let conn = self.raw_connection();
        let mut stmt = conn
            .prepare(
                "SELECT id, collection_id, key, status, unified_id, timestamp,
                        segment_num, conjoined_part, source_node_id, handoff_node_id
                 FROM segment ORDER BY id",
            )
            .expect("Failed to prepare segment scan");
        let rows = stmt
            .query_map([], SegmentRow::from_row)
            .expect("Failed to scan segments");
        rows.collect::<Result<_, _>>()
            .expect("Failed to read segment row")
    }
}

impl Default for TestNodeDb {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestNodeDb {
    type Target = NodeDatabase;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// A segment row as read back from the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRow {
    /// Generated row id.
    pub id: SegmentId,
    /// Owning collection.
    pub collection_id: i32,
    /// Object key.
    pub key: String,
    /// Status token.
    pub status: String,
    /// Unified id.
    pub unified_id: i64,
    /// Stored timestamp.
    pub timestamp: SystemTime,
    /// Segment number.
    pub segment_num: i32,
    /// Conjoined part.
    pub conjoined_part: i32,
    /// Originating node.
    pub source_node_id: i32,
    /// Handoff node, if any.
    pub handoff_node_id: Option<i32>,
}

impl SegmentRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: SegmentId::new(row.get(0)?),
            collection_id: row.get(1)?,
            key: row.get(2)?,
            status: row.get(3)?,
            unified_id: row.get(4)?,
            timestamp: secs_to_timestamp(row.get(5)?).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Real, Box::new(e))
            })?,
            segment_num: row.get(6)?,
            conjoined_part: row.get(7)?,
            source_node_id: row.get(8)?,
            handoff_node_id: row.get(9)?,
        })
    }

    /// Returns true if every inserted column matches `segment`.
    ///
    /// Timestamps are compared to the microsecond; the catalog stores them
    /// as floating point seconds.
    pub fn matches(&self, segment: &NewSegment) -> bool {
        let stored = timestamp_to_secs(self.timestamp);
        let expected = segment.timestamp_secs();

        self.collection_id == segment.collection_id
            && self.key == segment.key
            && self.status == segment.status.token()
            && self.unified_id == segment.unified_id
            && (stored - expected).abs() < 1e-6
            && self.segment_num == segment.segment_num
            && self.conjoined_part == segment.conjoined_part
            && self.source_node_id == segment.source_node_id
            && self.handoff_node_id == segment.handoff_node_id
    }
}

fn base_config(path: &Path) -> NodeDbConfig {
    NodeDbConfig::new(TEST_NODE_NAME, path)
        .create_if_missing(true)
        .operation_timeout(Duration::from_secs(10))
}

/// Installs the segment schema into the database `config` points at.
pub fn install_schema(config: &NodeDbConfig) {
    let mut conn = SqliteSource::new(config.clone())
        .open()
        .expect("Failed to open database for schema install");
    create_schema(&mut conn, &config.schema).expect("Failed to install schema");
}

/// Runs a test against a fresh, initialized node database.
pub fn with_test_db<F, R>(f: F) -> R
where
    F: FnOnce(&TestNodeDb) -> R,
{
    let test_db = TestNodeDb::new();
    f(&test_db)
}

/// A typical active segment for `unified_id`, with fixed values elsewhere.
pub fn sample_segment(unified_id: i64) -> NewSegment {
    NewSegment::new(1, format!("objects/{unified_id}"), unified_id, 1, 3)
        .with_status(SegmentStatus::Active)
        .with_timestamp(SystemTime::UNIX_EPOCH + Duration::from_secs(1_400_000_000))
}
