//! Segment rows recorded in the node catalog.

use crate::error::{NodeDbError, NodeDbResult};
use crate::registry::NEW_SEGMENT;
use rusqlite::types::{ToSql, ToSqlOutput};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Identifier the database assigned to a segment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(i64);

impl SegmentId {
    /// Wraps a raw row id.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw row id.
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a segment, stored as a one-character token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SegmentStatus {
    /// Data is arriving or has arrived and is not yet finalized.
    #[default]
    Active,
    /// The write was abandoned.
    Cancelled,
    /// All data for the segment has been received.
    Final,
    /// The segment marks a deletion.
    Tombstone,
}

impl SegmentStatus {
    /// All statuses, in token order.
    pub const ALL: [SegmentStatus; 4] = [Self::Active, Self::Cancelled, Self::Final, Self::Tombstone];

    /// Returns the token stored in the `status` column.
    pub const fn token(self) -> &'static str {
        match self {
            Self::Active => "A",
            Self::Cancelled => "C",
            Self::Final => "F",
            Self::Tombstone => "T",
        }
    }
}

impl fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for SegmentStatus {
    type Err = NodeDbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(Self::Active),
            "C" => Ok(Self::Cancelled),
            "F" => Ok(Self::Final),
            "T" => Ok(Self::Tombstone),
            other => Err(NodeDbError::invalid_arguments(
                NEW_SEGMENT,
                format!("unknown segment status {other:?}"),
            )),
        }
    }
}

impl ToSql for SegmentStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.token()))
    }
}

/// Converts a timestamp to the REAL seconds-since-epoch stored in the catalog.
pub fn timestamp_to_secs(timestamp: SystemTime) -> f64 {
    match timestamp.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

/// Converts a stored REAL timestamp back to a `SystemTime`.
///
/// Fails for NaN, infinities and values outside what `SystemTime` can hold.
pub fn secs_to_timestamp(secs: f64) -> NodeDbResult<SystemTime> {
    let out_of_range =
        || NodeDbError::invalid_arguments(NEW_SEGMENT, format!("timestamp {secs} is out of range"));

    let timestamp = if secs >= 0.0 {
        Duration::try_from_secs_f64(secs)
            .ok()
            .and_then(|d| UNIX_EPOCH.checked_add(d))
    } else {
        Duration::try_from_secs_f64(-secs)
            .ok()
            .and_then(|d| UNIX_EPOCH.checked_sub(d))
    };
    timestamp.ok_or_else(out_of_range)
}

/// A segment about to be recorded by the `new-segment` operation.
///
/// Field order matches the statement's parameter order.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSegment {
    /// Owning collection.
    pub collection_id: i32,
    /// Object key the segment belongs to.
    pub key: String,
    /// Status at creation time.
    pub status: SegmentStatus,
    /// Groups every segment of one logical write.
    pub unified_id: i64,
    /// When the segment was received.
    pub timestamp: SystemTime,
    /// Which erasure-coded piece this is.
    pub segment_num: i32,
    /// Ordinal within a conjoined upload, 0 when not conjoined.
    pub conjoined_part: i32,
    /// Node that originated the write.
    pub source_node_id: i32,
    /// Node this row is held on behalf of, when handed off.
    pub handoff_node_id: Option<i32>,
}

impl NewSegment {
    /// Creates an active, non-conjoined, non-handoff segment received now.
    pub fn new(
        collection_id: i32,
        key: impl Into<String>,
        unified_id: i64,
        segment_num: i32,
        source_node_id: i32,
    ) -> Self {
        Self {
            collection_id,
            key: key.into(),
            status: SegmentStatus::Active,
            unified_id,
            timestamp: SystemTime::now(),
            segment_num,
            conjoined_part: 0,
            source_node_id,
            handoff_node_id: None,
        }
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: SegmentStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Sets the conjoined part.
    #[must_use]
    pub fn with_conjoined_part(mut self, part: i32) -> Self {
        self.conjoined_part = part;
        self
    }

    /// Marks the segment as held on behalf of another node.
    #[must_use]
    pub fn with_handoff_node(mut self, node_id: i32) -> Self {
        self.handoff_node_id = Some(node_id);
        self
    }

    /// Rejects values the catalog must never hold.
    pub fn validate(&self) -> NodeDbResult<()> {
        if self.key.is_empty() {
            return Err(NodeDbError::invalid_arguments(NEW_SEGMENT, "key is empty"));
        }
        if self.segment_num < 0 {
            return Err(NodeDbError::invalid_arguments(
                NEW_SEGMENT,
                format!("segment_num {} is negative", self.segment_num),
            ));
        }
        if self.conjoined_part < 0 {
            return Err(NodeDbError::invalid_arguments(
                NEW_SEGMENT,
                format!("conjoined_part {} is negative", self.conjoined_part),
            ));
        }
        Ok(())
    }

    /// Returns the timestamp as stored in the catalog.
    pub fn timestamp_secs(&self) -> f64 {
        timestamp_to_secs(self.timestamp)
    }
}
