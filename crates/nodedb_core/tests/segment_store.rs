//! Integration tests for initializing the store and recording segments.

use nodedb_core::rusqlite::types::ToSql;
use nodedb_core::{
    NewSegment, NodeDatabase, NodeDbConfig, NodeDbError, SegmentStatus, StoreState, NEW_SEGMENT,
};
use nodedb_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::HashSet;
use tempfile::TempDir;

#[test]
fn insert_returns_positive_unused_ids() {
    with_test_db(|db| {
        let mut seen = HashSet::new();
        for unified_id in 1..=20 {
            let segment = sample_segment(unified_id);
            let id = db.insert_new_segment(&segment).unwrap();
            assert!(id.as_i64() > 0);
            assert!(seen.insert(id), "id {id} handed out twice");

            let row = db.fetch_segment(id).expect("row should exist");
            assert!(row.matches(&segment));
        }
        assert_eq!(db.count_segments(), 20);
    });
}

#[test]
fn every_column_is_persisted() {
    with_test_db(|db| {
        let segment = NewSegment::new(42, "music/track-07.flac", 900_000_001, 7, 3)
            .with_status(SegmentStatus::Final)
            .with_conjoined_part(2)
            .with_handoff_node(5);
        let id = db.insert_new_segment(&segment).unwrap();

        let row = db.fetch_segment(id).unwrap();
        assert_eq!(row.collection_id, 42);
        assert_eq!(row.key, "music/track-07.flac");
        assert_eq!(row.status, "F");
        assert_eq!(row.unified_id, 900_000_001);
        assert_eq!(row.segment_num, 7);
        assert_eq!(row.conjoined_part, 2);
        assert_eq!(row.source_node_id, 3);
        assert_eq!(row.handoff_node_id, Some(5));
    });
}

#[test]
fn null_handoff_node_is_stored_as_null() {
    with_test_db(|db| {
        let id = db.insert_new_segment(&sample_segment(1)).unwrap();
        let handoff: Option<i32> = db
            .raw_connection()
            .query_row(
                "SELECT handoff_node_id FROM segment WHERE id = ?1",
                [id.as_i64()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(handoff, None);
    });
}

#[test]
fn generic_execute_surface_records_rows() {
    with_test_db(|db| {
        let handoff: Option<i32> = None;
        let params: [&dyn ToSql; 9] = [
            &9i32, &"via-execute", &"A", &123i64, &1_500_000_000.0f64, &4i32, &0i32, &1i32,
            &handoff,
        ];
        let id = db.execute(NEW_SEGMENT, &params).unwrap();
        assert!(id > 0);
        assert_eq!(db.count_segments(), 1);
    });
}

#[test]
fn insert_before_initialize_fails_without_a_row() {
    let test_db = TestNodeDb::uninitialized();
    let err = test_db
        .insert_new_segment(&sample_segment(1))
        .unwrap_err();
    assert!(matches!(err, NodeDbError::NotReady { .. }));
    assert_eq!(test_db.count_segments(), 0);

    test_db.initialize().unwrap();
    assert!(test_db.insert_new_segment(&sample_segment(1)).is_ok());
    assert_eq!(test_db.count_segments(), 1);
}

#[test]
fn unreachable_database_fails_with_connection_error() {
    let dir = TempDir::new().unwrap();
    let config = NodeDbConfig::new(TEST_NODE_NAME, dir.path().join("missing").join("node.db"));
    let db = NodeDatabase::new(config);

    let err = db.initialize().unwrap_err();
    assert!(matches!(err, NodeDbError::Connection { .. }), "{err:?}");
    assert_eq!(db.state(), StoreState::Failed);
    assert!(matches!(
        db.insert_new_segment(&sample_segment(1)).unwrap_err(),
        NodeDbError::NotReady { .. }
    ));
    assert!(db.operation_names().is_err());
}

#[test]
fn missing_segment_table_fails_with_prepare_error() {
    let test_db = TestNodeDb::without_schema();
    let err = test_db.initialize().unwrap_err();
    match err {
        NodeDbError::Prepare {
            operation, query, ..
        } => {
            assert_eq!(operation, NEW_SEGMENT);
            assert!(query.contains("nimbusio_node.segment"));
        }
        other => panic!("expected prepare error, got {other:?}"),
    }
    assert_eq!(test_db.state(), StoreState::Failed);
    assert!(matches!(
        test_db.insert_new_segment(&sample_segment(1)).unwrap_err(),
        NodeDbError::NotReady { .. }
    ));
}

#[test]
fn duplicate_segment_is_a_constraint_violation() {
    with_test_db(|db| {
        let original = sample_segment(500);
        db.insert_new_segment(&original).unwrap();

        let duplicate = NewSegment::new(
            original.collection_id,
            "a/different/key",
            original.unified_id,
            original.segment_num,
            8,
        );
        let err = db.insert_new_segment(&duplicate).unwrap_err();
        assert!(
            matches!(err, NodeDbError::ConstraintViolation { .. }),
            "{err:?}"
        );
        assert_eq!(err.operation(), Some(NEW_SEGMENT));
        assert!(!err.is_retryable());
        assert_eq!(db.count_segments(), 1);
    });
}

#[test]
fn same_unified_id_with_other_segment_numbers_is_accepted() {
    with_test_db(|db| {
        for segment_num in 1..=10 {
            let segment = NewSegment::new(1, "striped", 77, segment_num, 2);
            db.insert_new_segment(&segment).unwrap();
        }
        assert_eq!(db.count_segments(), 10);
    });
}

#[test]
fn reinitialize_is_rejected_and_store_stays_ready() {
    with_test_db(|db| {
        assert!(matches!(
            db.initialize().unwrap_err(),
            NodeDbError::AlreadyInitialized
        ));
        assert!(db.is_ready());
        assert!(db.insert_new_segment(&sample_segment(3)).is_ok());
    });
}

#[test]
fn shutdown_releases_connections() {
    let test_db = TestNodeDb::new();
    test_db.insert_new_segment(&sample_segment(1)).unwrap();
    test_db.shutdown();

    assert_eq!(test_db.state(), StoreState::Closed);
    assert!(matches!(
        test_db.insert_new_segment(&sample_segment(2)).unwrap_err(),
        NodeDbError::NotReady { .. }
    ));
    assert_eq!(test_db.count_segments(), 1);
}

#[test]
fn main_schema_configuration() {
    let test_db = TestNodeDb::with_config(|config| config.schema("main").pool_size(2));
    let id = test_db.insert_new_segment(&sample_segment(10)).unwrap();
    assert!(test_db.fetch_segment(id).is_some());
    assert!(test_db
        .operation_query(NEW_SEGMENT)
        .unwrap()
        .contains("main.segment"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn inserted_columns_read_back(segments in prop::collection::vec(new_segment_strategy(), 1..8)) {
        let test_db = TestNodeDb::new();
        let mut inserted = 0;
        for segment in &segments {
            match test_db.insert_new_segment(segment) {
                Ok(id) => {
                    let row = test_db.fetch_segment(id).expect("row should exist");
                    prop_assert!(row.matches(segment), "{row:?} != {segment:?}");
                    inserted += 1;
                }
                // Generated segments may collide on the unique tuple.
                Err(NodeDbError::ConstraintViolation { .. }) => {}
                Err(e) => return Err(TestCaseError::fail(e.to_string())),
            }
        }
        prop_assert_eq!(test_db.count_segments(), inserted);
    }
}
