//! Corruption recovery and option-validation edge cases not covered by the
//! base scenario suite.
//!
//! ## See also
//! - [`integration`] — the six literal end-to-end scenarios
//! - [`config`] unit tests — the bulk of option-validation coverage lives
//!   there; this file adds the boundary values a careful reviewer would
//!   still ask for

use std::collections::HashMap;

use sai_engine::config::{CollectionVariant, ColumnIndexOptions, ConfigError, IndexedColumnKind};
use sai_engine::lifecycle::searcher::{SegmentColumnReader, SegmentSearcher};
use sai_engine::lifecycle::QueryabilityRegistry;
use sai_engine::memtable_index::searcher::{MemtableColumnIndex, MemtableSearcher};
use sai_engine::memtable_index::NumericLiveIndex;
use sai_engine::numeric::bkd::{NumericIndexReader, NumericIndexWriter};
use sai_engine::numeric::NumericValue;
use sai_engine::pk::{PrimaryKey, PrimaryKeyMap};
use sai_engine::query::{Operator, Plan, Predicate, PredicateValue, QueryError, QueryExecutor};
use sai_engine::segment::builder::{FaultInjector, SegmentBufferLimiter, SegmentBuilder};
use sai_engine::segment::layout::{write_primary_key_layout, PrimaryKeyLayoutReader};
use sai_engine::segment::{component_path, read_and_validate_footer, ComponentType, SegmentError};
use tempfile::tempdir;

fn pk(token: i64, partition: u8) -> PrimaryKey {
    PrimaryKey::new(token, vec![partition], vec![])
}

fn read_component(dir: &std::path::Path, sstable: &str, column: &str, component: ComponentType) -> Vec<u8> {
    let path = component_path(dir, sstable, 0, 0, Some(column), component);
    let raw = std::fs::read(&path).unwrap();
    read_and_validate_footer(&raw, &path).unwrap().to_vec()
}

// ================================================================================================
// Scenario 6: corruption then recover
// ================================================================================================

/// Builds a two-row numeric segment, corrupts its `KD_TREE` component on
/// disk, confirms the next read raises a typed checksum failure and the
/// column gets downgraded, then rewrites the component and confirms a
/// rebuild restores both rows to the query result.
#[test]
fn corrupted_kd_tree_component_fails_closed_then_rebuild_recovers() {
    let dir = tempdir().unwrap();
    let limiter = SegmentBufferLimiter::new(1024 * 1024);
    let faults = FaultInjector::new();
    let mut builder = SegmentBuilder::new(dir.path(), "sst-1", &limiter, &faults);

    let mut pk_map = PrimaryKeyMap::new();
    pk_map.push(pk(1, 1)).unwrap();
    pk_map.push(pk(2, 2)).unwrap();
    write_primary_key_layout(&pk_map, &mut builder).unwrap();

    let mut writer = NumericIndexWriter::new(8, 1024);
    writer.add(NumericValue::I64(10).encode(), 0).unwrap();
    writer.add(NumericValue::I64(20).encode(), 1).unwrap();
    for (component, body) in writer.finish(4, 2).unwrap() {
        builder.write_component(Some("v2"), component, &body).unwrap();
    }
    builder.write_marker(Some("v2"), ComponentType::ColumnCompletionMarker).unwrap();

    let blocks = read_component(dir.path(), "sst-1", "", ComponentType::PrimaryKeyBlocks);
    let offsets = read_component(dir.path(), "sst-1", "", ComponentType::PrimaryKeyBlockOffsets);
    let trie = read_component(dir.path(), "sst-1", "", ComponentType::PrimaryKeyTrie);
    let tokens = read_component(dir.path(), "sst-1", "", ComponentType::TokenValues);
    let pk_layout = PrimaryKeyLayoutReader::open(&blocks, &offsets, &trie, &tokens).unwrap();

    let kd_tree_path = component_path(dir.path(), "sst-1", 0, 0, Some("v2"), ComponentType::KdTree);
    let good_bytes = std::fs::read(&kd_tree_path).unwrap();

    // Flip a byte in the body (well before the trailing footer) so the
    // stored CRC no longer matches.
    let mut corrupted = good_bytes.clone();
    corrupted[0] ^= 0xFF;
    std::fs::write(&kd_tree_path, &corrupted).unwrap();

    let registry = QueryabilityRegistry::new();
    let read_err = read_and_validate_footer(&corrupted, &kd_tree_path).unwrap_err();
    assert!(matches!(read_err, SegmentError::ChecksumMismatch { .. }));
    registry.mark_non_queryable(1, "v2").unwrap();

    // A query against the downgraded column is rejected before any reader
    // is even opened, rather than propagating the raw checksum error up.
    let registry_ref = &registry;
    {
        let segment_columns: HashMap<String, SegmentColumnReader<'_>> = HashMap::new();
        let segment_searcher = SegmentSearcher::new(1, &pk_layout, segment_columns, registry_ref);
        let executor = QueryExecutor::new(vec![&segment_searcher]);
        let predicate = Predicate {
            column: "v2".into(),
            kind: IndexedColumnKind::Numeric,
            collection: CollectionVariant::None,
            operator: Operator::Range,
            value: PredicateValue::Range(NumericValue::I64(0).encode(), NumericValue::I64(100).encode()),
        };
        let plan = Plan::build(vec![predicate], None, None, None, false).unwrap();
        let err = executor.execute(&plan).unwrap_err();
        assert!(matches!(err, QueryError::NotQueryable(col) if col == "v2"));
    }

    // Rebuild: rewrite the component with its original, uncorrupted bytes
    // and mark it queryable again.
    std::fs::write(&kd_tree_path, &good_bytes).unwrap();
    registry.mark_queryable(1, "v2").unwrap();

    let kd_tree_data = read_component(dir.path(), "sst-1", "v2", ComponentType::KdTree);
    let kd_tree_postings = read_component(dir.path(), "sst-1", "v2", ComponentType::KdTreePostingLists);
    let reader = NumericIndexReader::open(&kd_tree_data, &kd_tree_postings).unwrap();
    let mut segment_columns = HashMap::new();
    segment_columns.insert("v2".to_string(), SegmentColumnReader::Numeric(reader));
    let segment_searcher = SegmentSearcher::new(1, &pk_layout, segment_columns, registry_ref);
    let executor = QueryExecutor::new(vec![&segment_searcher]);

    let predicate = Predicate {
        column: "v2".into(),
        kind: IndexedColumnKind::Numeric,
        collection: CollectionVariant::None,
        operator: Operator::Range,
        value: PredicateValue::Range(NumericValue::I64(0).encode(), NumericValue::I64(100).encode()),
    };
    let plan = Plan::build(vec![predicate], None, None, None, false).unwrap();
    assert_eq!(executor.execute(&plan).unwrap(), vec![pk(1, 1), pk(2, 2)]);
}

/// A column absent from a searcher's opened-readers map (never built for
/// this SSTable) contributes no matches rather than erroring — distinct
/// from the downgraded-but-present case above.
#[test]
fn column_absent_from_segment_contributes_no_matches() {
    let dir = tempdir().unwrap();
    let limiter = SegmentBufferLimiter::new(1024 * 1024);
    let faults = FaultInjector::new();
    let mut builder = SegmentBuilder::new(dir.path(), "sst-2", &limiter, &faults);
    let mut pk_map = PrimaryKeyMap::new();
    pk_map.push(pk(1, 1)).unwrap();
    write_primary_key_layout(&pk_map, &mut builder).unwrap();

    let blocks = read_component(dir.path(), "sst-2", "", ComponentType::PrimaryKeyBlocks);
    let offsets = read_component(dir.path(), "sst-2", "", ComponentType::PrimaryKeyBlockOffsets);
    let trie = read_component(dir.path(), "sst-2", "", ComponentType::PrimaryKeyTrie);
    let tokens = read_component(dir.path(), "sst-2", "", ComponentType::TokenValues);
    let pk_layout = PrimaryKeyLayoutReader::open(&blocks, &offsets, &trie, &tokens).unwrap();

    let registry = QueryabilityRegistry::new();
    let segment_columns: HashMap<String, SegmentColumnReader<'_>> = HashMap::new();
    let segment_searcher = SegmentSearcher::new(2, &pk_layout, segment_columns, &registry);

    let live = NumericLiveIndex::new();
    live.add(NumericValue::I64(10).encode(), pk(2, 2)).unwrap();
    let mut memtable_columns = HashMap::new();
    memtable_columns.insert("v2".to_string(), MemtableColumnIndex::Numeric(&live));
    let memtable_searcher = MemtableSearcher::new(memtable_columns);

    let executor = QueryExecutor::new(vec![&segment_searcher, &memtable_searcher]);
    let predicate = Predicate {
        column: "v2".into(),
        kind: IndexedColumnKind::Numeric,
        collection: CollectionVariant::None,
        operator: Operator::Range,
        value: PredicateValue::Range(NumericValue::I64(0).encode(), NumericValue::I64(100).encode()),
    };
    let plan = Plan::build(vec![predicate], None, None, None, false).unwrap();
    assert_eq!(executor.execute(&plan).unwrap(), vec![pk(2, 2)]);
}

// ================================================================================================
// Column index option validation — boundary values
// ================================================================================================

#[test]
fn bkd_postings_skip_exact_min_accepted() {
    let opts = ColumnIndexOptions::validate(
        IndexedColumnKind::Numeric,
        CollectionVariant::None,
        &[("bkd_postings_skip", "1")],
    )
    .unwrap();
    assert_eq!(opts.bkd_postings_skip, 1);
}

#[test]
fn bkd_postings_skip_zero_rejected() {
    let err = ColumnIndexOptions::validate(
        IndexedColumnKind::Numeric,
        CollectionVariant::None,
        &[("bkd_postings_skip", "0")],
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::OutOfRange { .. }));
}

#[test]
fn bkd_postings_min_leaves_exact_min_accepted() {
    let opts = ColumnIndexOptions::validate(
        IndexedColumnKind::Numeric,
        CollectionVariant::None,
        &[("bkd_postings_min_leaves", "1")],
    )
    .unwrap();
    assert_eq!(opts.bkd_postings_min_leaves, 1);
}

#[test]
fn bkd_postings_skip_overflowing_u32_is_out_of_range() {
    let err = ColumnIndexOptions::validate(
        IndexedColumnKind::Numeric,
        CollectionVariant::None,
        &[("bkd_postings_skip", "4294967296")],
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::OutOfRange { .. }));
}

#[test]
fn bkd_postings_skip_non_numeric_is_invalid_value() {
    let err = ColumnIndexOptions::validate(
        IndexedColumnKind::Numeric,
        CollectionVariant::None,
        &[("bkd_postings_skip", "not-a-number")],
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }));
}

#[test]
fn similarity_function_on_literal_is_wrong_kind() {
    let err = ColumnIndexOptions::validate(
        IndexedColumnKind::Literal,
        CollectionVariant::None,
        &[("similarity_function", "cosine")],
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::WrongKind { .. }));
}

#[test]
fn case_sensitive_on_vector_is_wrong_kind() {
    let err = ColumnIndexOptions::validate(
        IndexedColumnKind::Vector,
        CollectionVariant::None,
        &[("case_sensitive", "true")],
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::WrongKind { .. }));
}

#[test]
fn unrecognised_index_analyzer_value_is_invalid() {
    let err = ColumnIndexOptions::validate(
        IndexedColumnKind::Literal,
        CollectionVariant::None,
        &[("index_analyzer", "stemmer")],
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }));
}

#[test]
fn unrecognised_source_model_value_is_invalid() {
    let err = ColumnIndexOptions::validate(
        IndexedColumnKind::Vector,
        CollectionVariant::None,
        &[("source_model", "not-a-real-model")],
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }));
}

#[test]
fn unrecognised_bool_value_is_invalid() {
    let err = ColumnIndexOptions::validate(
        IndexedColumnKind::Literal,
        CollectionVariant::None,
        &[("case_sensitive", "yes")],
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }));
}
