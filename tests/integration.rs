//! End-to-end scenario tests exercising the public query surface across
//! the memtable live index and a flushed on-disk segment together.
//!
//! Each test below corresponds to one literal scenario: build a live
//! index (and, where the scenario calls for it, flush it to a real
//! on-disk segment and reopen it), assemble searchers, plan a query, and
//! check the exact primary keys returned.
//!
//! ## See also
//! - [`memtable_index`] unit tests — per-kind live index behavior in isolation
//! - [`segment`] unit tests — on-disk component read/write round trips

use std::collections::HashMap;

use sai_engine::config::{CollectionVariant, ColumnIndexOptions, IndexedColumnKind, SimilarityFunction};
use sai_engine::lifecycle::searcher::{SegmentColumnReader, SegmentSearcher};
use sai_engine::lifecycle::QueryabilityRegistry;
use sai_engine::literal::{LiteralIndexReader, LiteralIndexWriter};
use sai_engine::memtable_index::searcher::{MemtableColumnIndex, MemtableSearcher};
use sai_engine::memtable_index::{LiteralLiveIndex, NumericLiveIndex, VectorLiveIndex};
use sai_engine::numeric::bkd::{NumericIndexReader, NumericIndexWriter};
use sai_engine::numeric::NumericValue;
use sai_engine::pk::{PrimaryKey, PrimaryKeyMap};
use sai_engine::query::{Operator, Plan, Predicate, PredicateValue, QueryExecutor, Searcher};
use sai_engine::segment::builder::{FaultInjector, SegmentBufferLimiter, SegmentBuilder};
use sai_engine::segment::layout::{write_primary_key_layout, PrimaryKeyLayoutReader};
use sai_engine::segment::{component_path, read_and_validate_footer, ComponentType};
use sai_engine::vector::graph::GraphParams;
use tempfile::tempdir;

fn pk(token: i64, partition: u8) -> PrimaryKey {
    PrimaryKey::new(token, vec![partition], vec![])
}

fn plan_single(predicate: Predicate) -> Plan {
    Plan::build(vec![predicate], None, None, None, false).unwrap()
}

/// Reads component `component` for `column` back off disk, validates its
/// footer, and returns the inner body bytes.
fn read_component(dir: &std::path::Path, sstable: &str, column: &str, component: ComponentType) -> Vec<u8> {
    let path = component_path(dir, sstable, 0, 0, Some(column), component);
    let raw = std::fs::read(&path).unwrap();
    read_and_validate_footer(&raw, &path).unwrap().to_vec()
}

// ================================================================================================
// Scenario 1: literal exact match with insert-then-flush
// ================================================================================================

#[test]
fn literal_exact_match_survives_flush() {
    let options = ColumnIndexOptions::validate(
        IndexedColumnKind::Literal,
        CollectionVariant::None,
        &[("case_sensitive", "false")],
    )
    .unwrap();

    let live = LiteralLiveIndex::new();
    let terms = sai_engine::literal::analyzer::analyze(b"Camel", &options).unwrap();
    for term in &terms {
        live.add(term.clone(), pk(1, 1)).unwrap();
    }

    let query_term = sai_engine::literal::analyzer::analyze(b"camel", &options).unwrap().remove(0);
    let predicate = |term: Vec<u8>| Predicate {
        column: "v".into(),
        kind: IndexedColumnKind::Literal,
        collection: CollectionVariant::None,
        operator: Operator::Eq,
        value: PredicateValue::Single(term),
    };

    let mut columns = HashMap::new();
    columns.insert("v".to_string(), MemtableColumnIndex::Literal(&live));
    let memtable_searcher = MemtableSearcher::new(columns);
    let executor = QueryExecutor::new(vec![&memtable_searcher]);
    let plan = plan_single(predicate(query_term.clone()));
    assert_eq!(executor.execute(&plan).unwrap(), vec![pk(1, 1)]);

    // Flush: serialize the live index into a real on-disk segment, then
    // reopen it and run the identical query through a `SegmentSearcher`.
    let dir = tempdir().unwrap();
    let limiter = SegmentBufferLimiter::new(1024 * 1024);
    let faults = FaultInjector::new();
    let mut builder = SegmentBuilder::new(dir.path(), "sst-1", &limiter, &faults);

    let mut pk_map = PrimaryKeyMap::new();
    pk_map.push(pk(1, 1)).unwrap();
    write_primary_key_layout(&pk_map, &mut builder).unwrap();

    let mut writer = LiteralIndexWriter::new();
    for term in &terms {
        writer.add(term.clone(), 0).unwrap();
    }
    for (component, body) in writer.finish().unwrap() {
        builder.write_component(Some("v"), component, &body).unwrap();
    }
    builder.write_marker(Some("v"), ComponentType::ColumnCompletionMarker).unwrap();

    let blocks = read_component(dir.path(), "sst-1", "", ComponentType::PrimaryKeyBlocks);
    let offsets = read_component(dir.path(), "sst-1", "", ComponentType::PrimaryKeyBlockOffsets);
    let trie = read_component(dir.path(), "sst-1", "", ComponentType::PrimaryKeyTrie);
    let tokens = read_component(dir.path(), "sst-1", "", ComponentType::TokenValues);
    let pk_layout = PrimaryKeyLayoutReader::open(&blocks, &offsets, &trie, &tokens).unwrap();

    let terms_data = read_component(dir.path(), "sst-1", "v", ComponentType::TermsData);
    let terms_directory = read_component(dir.path(), "sst-1", "v", ComponentType::TermsFooterPointer);
    let reader = LiteralIndexReader::open(&terms_data, &terms_directory).unwrap();

    let registry = QueryabilityRegistry::new();
    let mut segment_columns = HashMap::new();
    segment_columns.insert("v".to_string(), SegmentColumnReader::Literal(reader));
    let segment_searcher = SegmentSearcher::new(1, &pk_layout, segment_columns, &registry);

    let executor = QueryExecutor::new(vec![&segment_searcher]);
    let plan = plan_single(predicate(query_term));
    assert_eq!(executor.execute(&plan).unwrap(), vec![pk(1, 1)]);
}

// ================================================================================================
// Scenario 2: map-values CONTAINS with NOT CONTAINS update
// ================================================================================================

#[test]
fn map_values_contains_and_not_contains_track_overwrites() {
    let live = LiteralLiveIndex::new();
    live.add(b"v1".to_vec(), pk(1, 1)).unwrap();
    live.add(b"v2".to_vec(), pk(1, 1)).unwrap();
    live.add(b"v1".to_vec(), pk(2, 2)).unwrap();
    live.add(b"v3".to_vec(), pk(2, 2)).unwrap();

    let mut columns = HashMap::new();
    columns.insert("value".to_string(), MemtableColumnIndex::Literal(&live));
    let searcher = MemtableSearcher::new(columns);
    let executor = QueryExecutor::new(vec![&searcher]);

    let contains = |term: &[u8]| Predicate {
        column: "value".into(),
        kind: IndexedColumnKind::Literal,
        collection: CollectionVariant::Values,
        operator: Operator::Contains,
        value: PredicateValue::Single(term.to_vec()),
    };
    let not_contains = |term: &[u8]| Predicate {
        column: "value".into(),
        kind: IndexedColumnKind::Literal,
        collection: CollectionVariant::Values,
        operator: Operator::NotEq,
        value: PredicateValue::Single(term.to_vec()),
    };

    assert_eq!(executor.execute(&plan_single(contains(b"v1"))).unwrap(), vec![pk(1, 1), pk(2, 2)]);
    assert_eq!(executor.execute(&plan_single(not_contains(b"v2"))).unwrap(), vec![pk(2, 2)]);

    // Overwrite row 1 to `{2: 'v2'}`: drop its 'v1' term, keep 'v2'.
    live.remove(b"v1", &pk(1, 1)).unwrap();

    assert_eq!(executor.execute(&plan_single(not_contains(b"v1"))).unwrap(), vec![pk(1, 1)]);
}

// ================================================================================================
// Scenario 3: range on `!=` after overwrite across a flush
// ================================================================================================

#[test]
fn not_eq_reflects_memtable_overwrite_over_a_flushed_value() {
    // Row 1 flushed holding 'v1'.
    let dir = tempdir().unwrap();
    let limiter = SegmentBufferLimiter::new(1024 * 1024);
    let faults = FaultInjector::new();
    let mut builder = SegmentBuilder::new(dir.path(), "sst-1", &limiter, &faults);

    let mut pk_map = PrimaryKeyMap::new();
    pk_map.push(pk(1, 1)).unwrap();
    write_primary_key_layout(&pk_map, &mut builder).unwrap();

    let mut writer = LiteralIndexWriter::new();
    writer.add(b"v1".to_vec(), 0).unwrap();
    for (component, body) in writer.finish().unwrap() {
        builder.write_component(Some("v"), component, &body).unwrap();
    }
    builder.write_marker(Some("v"), ComponentType::ColumnCompletionMarker).unwrap();

    let blocks = read_component(dir.path(), "sst-1", "", ComponentType::PrimaryKeyBlocks);
    let offsets = read_component(dir.path(), "sst-1", "", ComponentType::PrimaryKeyBlockOffsets);
    let trie = read_component(dir.path(), "sst-1", "", ComponentType::PrimaryKeyTrie);
    let tokens = read_component(dir.path(), "sst-1", "", ComponentType::TokenValues);
    let pk_layout = PrimaryKeyLayoutReader::open(&blocks, &offsets, &trie, &tokens).unwrap();
    let terms_data = read_component(dir.path(), "sst-1", "v", ComponentType::TermsData);
    let terms_directory = read_component(dir.path(), "sst-1", "v", ComponentType::TermsFooterPointer);
    let reader = LiteralIndexReader::open(&terms_data, &terms_directory).unwrap();

    let registry = QueryabilityRegistry::new();
    let mut segment_columns = HashMap::new();
    segment_columns.insert("v".to_string(), SegmentColumnReader::Literal(reader));
    let segment_searcher = SegmentSearcher::new(1, &pk_layout, segment_columns, &registry);

    // Row 1 overwritten to 'v2' in the currently-open memtable.
    let live = LiteralLiveIndex::new();
    live.add(b"v2".to_vec(), pk(1, 1)).unwrap();
    let mut memtable_columns = HashMap::new();
    memtable_columns.insert("v".to_string(), MemtableColumnIndex::Literal(&live));
    let memtable_searcher = MemtableSearcher::new(memtable_columns);

    let executor = QueryExecutor::new(vec![&segment_searcher, &memtable_searcher]);
    let predicate = Predicate {
        column: "v".into(),
        kind: IndexedColumnKind::Literal,
        collection: CollectionVariant::None,
        operator: Operator::NotEq,
        value: PredicateValue::Single(b"v1".to_vec()),
    };
    assert_eq!(executor.execute(&plan_single(predicate)).unwrap(), vec![pk(1, 1)]);
}

// ================================================================================================
// Scenario 4: numeric range
// ================================================================================================

#[test]
fn numeric_range_and_between() {
    let live = NumericLiveIndex::new();
    for i in 0..10i64 {
        live.add(NumericValue::I64(i).encode(), pk(i, i as u8)).unwrap();
    }

    let mut columns = HashMap::new();
    columns.insert("v1".to_string(), MemtableColumnIndex::Numeric(&live));
    let searcher = MemtableSearcher::new(columns);
    let executor = QueryExecutor::new(vec![&searcher]);

    let at_least_zero = Predicate {
        column: "v1".into(),
        kind: IndexedColumnKind::Numeric,
        collection: CollectionVariant::None,
        operator: Operator::Range,
        value: PredicateValue::Range(NumericValue::I64(0).encode(), NumericValue::I64(i64::MAX).encode()),
    };
    assert_eq!(executor.execute(&plan_single(at_least_zero)).unwrap().len(), 10);

    let between_3_and_7 = Predicate {
        column: "v1".into(),
        kind: IndexedColumnKind::Numeric,
        collection: CollectionVariant::None,
        operator: Operator::Range,
        value: PredicateValue::Range(NumericValue::I64(3).encode(), NumericValue::I64(8).encode()),
    };
    assert_eq!(executor.execute(&plan_single(between_3_and_7)).unwrap().len(), 5);
}

/// Same scenario driven through a flushed on-disk `NumericIndexReader`
/// rather than the live index, confirming the tree-backed path agrees.
#[test]
fn numeric_range_against_on_disk_segment() {
    let mut writer = NumericIndexWriter::new(8, 1024);
    for i in 0..10u32 {
        writer.add(NumericValue::I64(i as i64).encode(), i).unwrap();
    }
    let components = writer.finish(4, 2).unwrap();
    let tree = &components.iter().find(|(c, _)| *c == ComponentType::KdTree).unwrap().1;
    let postings = &components
        .iter()
        .find(|(c, _)| *c == ComponentType::KdTreePostingLists)
        .unwrap()
        .1;
    let reader = NumericIndexReader::open(tree, postings).unwrap();

    let mut pk_map = PrimaryKeyMap::new();
    for i in 0..10i64 {
        pk_map.push(pk(i, i as u8)).unwrap();
    }
    let dir = tempdir().unwrap();
    let limiter = SegmentBufferLimiter::new(1024 * 1024);
    let faults = FaultInjector::new();
    let mut builder = SegmentBuilder::new(dir.path(), "sst-2", &limiter, &faults);
    write_primary_key_layout(&pk_map, &mut builder).unwrap();

    let blocks = read_component(dir.path(), "sst-2", "", ComponentType::PrimaryKeyBlocks);
    let offsets = read_component(dir.path(), "sst-2", "", ComponentType::PrimaryKeyBlockOffsets);
    let trie = read_component(dir.path(), "sst-2", "", ComponentType::PrimaryKeyTrie);
    let tokens = read_component(dir.path(), "sst-2", "", ComponentType::TokenValues);
    let pk_layout = PrimaryKeyLayoutReader::open(&blocks, &offsets, &trie, &tokens).unwrap();

    let registry = QueryabilityRegistry::new();
    let mut segment_columns = HashMap::new();
    segment_columns.insert("v1".to_string(), SegmentColumnReader::Numeric(reader));
    let segment_searcher = SegmentSearcher::new(2, &pk_layout, segment_columns, &registry);
    let executor = QueryExecutor::new(vec![&segment_searcher]);

    let between = Predicate {
        column: "v1".into(),
        kind: IndexedColumnKind::Numeric,
        collection: CollectionVariant::None,
        operator: Operator::Range,
        value: PredicateValue::Range(NumericValue::I64(3).encode(), NumericValue::I64(8).encode()),
    };
    assert_eq!(executor.execute(&plan_single(between)).unwrap().len(), 5);
}

// ================================================================================================
// Scenario 5: ANN LIMIT with and without filter
// ================================================================================================

#[test]
fn ann_limit_with_and_without_filter() {
    let vectors = VectorLiveIndex::new(GraphParams::default(), SimilarityFunction::Euclidean);
    vectors.add(vec![1.0, 2.0, 3.0], pk(0, 0)).unwrap();
    vectors.add(vec![2.0, 3.0, 4.0], pk(1, 1)).unwrap();
    vectors.add(vec![3.0, 4.0, 5.0], pk(2, 2)).unwrap();
    vectors.add(vec![4.0, 5.0, 6.0], pk(3, 3)).unwrap();

    let booleans = LiteralLiveIndex::new();
    booleans.add(vec![1], pk(0, 0)).unwrap();
    booleans.add(vec![1], pk(1, 1)).unwrap();

    let mut columns = HashMap::new();
    columns.insert("v".to_string(), MemtableColumnIndex::Vector(&vectors));
    columns.insert("b".to_string(), MemtableColumnIndex::Literal(&booleans));
    let searcher = MemtableSearcher::new(columns);
    let executor = QueryExecutor::new(vec![&searcher]);

    let ann = Predicate {
        column: "v".into(),
        kind: IndexedColumnKind::Vector,
        collection: CollectionVariant::None,
        operator: Operator::AnnOrderBy,
        value: PredicateValue::Vector(vec![2.5, 3.5, 4.5]),
    };
    let plan = Plan::build(vec![], Some(ann.clone()), Some(3), None, false).unwrap();
    let hits = executor.execute(&plan).unwrap();
    assert_eq!(hits.len(), 3);
    let first_two: Vec<&PrimaryKey> = hits.iter().take(2).collect();
    assert!(first_two.contains(&&pk(1, 1)));
    assert!(first_two.contains(&&pk(2, 2)));

    let b_true = Predicate {
        column: "b".into(),
        kind: IndexedColumnKind::Literal,
        collection: CollectionVariant::None,
        operator: Operator::Eq,
        value: PredicateValue::Single(vec![1]),
    };
    let filtered_plan = Plan::build(vec![b_true], Some(ann), Some(2), None, false).unwrap();
    assert_eq!(executor.execute(&filtered_plan).unwrap(), vec![pk(0, 0), pk(1, 1)]);
}
