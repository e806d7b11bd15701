//! Property-based test generators using proptest.
//!
//! Generated segments always pass `NewSegment::validate`.

use nodedb_core::{NewSegment, SegmentStatus};
use proptest::prelude::*;
use std::time::{Duration, SystemTime};

/// Strategy for segment statuses.
pub fn segment_status_strategy() -> impl Strategy<Value = SegmentStatus> {
    prop::sample::select(SegmentStatus::ALL.to_vec())
}

/// Strategy for non-empty object keys, including unicode and separators.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9/._ -]{1,64}|\\PC{1,16}")
        .expect("Invalid regex")
        .prop_filter("Key must not be empty", |s| !s.is_empty())
}

/// Strategy for timestamps between 2001 and 2033, whole microseconds.
pub fn timestamp_strategy() -> impl Strategy<Value = SystemTime> {
    (1_000_000_000u64..2_000_000_000u64, 0u32..1_000_000u32).prop_map(|(secs, micros)| {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs) + Duration::from_micros(micros.into())
    })
}

/// Strategy for valid new segments.
pub fn new_segment_strategy() -> impl Strategy<Value = NewSegment> {
    (
        (0i32..10_000, key_strategy(), segment_status_strategy()),
        (any::<i64>(), timestamp_strategy(), 0i32..=10, 0i32..1_000),
        (0i32..100, prop::option::of(0i32..100)),
    )
        .prop_map(
            |(
                (collection_id, key, status),
                (unified_id, timestamp, segment_num, conjoined_part),
                (source_node_id, handoff_node_id),
            )| NewSegment {
                collection_id,
                key,
                status,
                unified_id,
                timestamp,
                segment_num,
                conjoined_part,
                source_node_id,
                handoff_node_id,
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_segments_are_valid(segment in new_segment_strategy()) {
            prop_assert!(segment.validate().is_ok());
        }

        #[test]
        fn generated_keys_are_non_empty(key in key_strategy()) {
            prop_assert!(!key.is_empty());
        }
    }
}
