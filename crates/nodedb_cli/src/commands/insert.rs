//! Insert command implementation.

use nodedb_core::{secs_to_timestamp, NewSegment, NodeDatabase, NodeDbConfig, SegmentStatus};
use serde::Serialize;
use std::time::SystemTime;

/// Segment fields supplied on the command line.
#[derive(Debug, Clone)]
pub struct InsertArgs {
    /// Owning collection id.
    pub collection_id: i32,
    /// Object key.
    pub key: String,
    /// Status token.
    pub status: String,
    /// Unified id.
    pub unified_id: i64,
    /// Seconds since the UNIX epoch, or now.
    pub timestamp: Option<f64>,
    /// Segment number.
    pub segment_num: i32,
    /// Conjoined part.
    pub conjoined_part: i32,
    /// Originating node id.
    pub source_node_id: i32,
    /// Handoff node id.
    pub handoff_node_id: Option<i32>,
}

impl InsertArgs {
    fn to_segment(&self) -> Result<NewSegment, Box<dyn std::error::Error>> {
        let status: SegmentStatus = self.status.parse()?;
        let timestamp = self
            .timestamp
            .map(secs_to_timestamp)
            .transpose()?
            .unwrap_or_else(SystemTime::now);

        Ok(NewSegment {
            collection_id: self.collection_id,
            key: self.key.clone(),
            status,
            unified_id: self.unified_id,
            timestamp,
            segment_num: self.segment_num,
            conjoined_part: self.conjoined_part,
            source_node_id: self.source_node_id,
            handoff_node_id: self.handoff_node_id,
        })
    }
}

/// Output of a successful insert.
#[derive(Debug, Serialize)]
struct InsertOutput {
    id: i64,
    collection_id: i32,
    key: String,
    unified_id: i64,
    segment_num: i32,
}

/// Runs the insert command.
pub fn run(
    config: NodeDbConfig,
    args: InsertArgs,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let segment = args.to_segment()?;

    let db = NodeDatabase::new(config);
    db.initialize()?;
    let id = db.insert_new_segment(&segment)?;
    db.shutdown();

    let output = InsertOutput {
        id: id.as_i64(),
        collection_id: segment.collection_id,
        key: segment.key,
        unified_id: segment.unified_id,
        segment_num: segment.segment_num,
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Recorded segment {}", output.id);
        println!("  collection: {}", output.collection_id);
        println!("  key:        {}", output.key);
        println!("  unified id: {}", output.unified_id);
        println!("  segment:    {}", output.segment_num);
    }

    Ok(())
}
