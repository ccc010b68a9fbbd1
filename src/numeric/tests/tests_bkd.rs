use crate::numeric::bkd::{NumericIndexReader, NumericIndexWriter};
use crate::numeric::NumericValue;
use crate::posting::{PostingIterator, END_OF_STREAM};

fn drain(mut union: impl PostingIterator) -> Vec<u32> {
    let mut out = Vec::new();
    loop {
        let id = union.next().unwrap();
        if id == END_OF_STREAM {
            break;
        }
        out.push(id);
    }
    out.sort_unstable();
    out
}

fn build(values: &[i32], max_leaf: usize, skip: u32, min_leaves: u32) -> (Vec<u8>, Vec<u8>) {
    let mut writer = NumericIndexWriter::new(4, max_leaf);
    for (row, &v) in values.iter().enumerate() {
        writer
            .add(NumericValue::I32(v).encode(), row as u32)
            .unwrap();
    }
    let components = writer.finish(skip, min_leaves).unwrap();
    let tree = components
        .iter()
        .find(|(c, _)| matches!(c, crate::segment::ComponentType::KdTree))
        .unwrap()
        .1
        .clone();
    let postings = components
        .iter()
        .find(|(c, _)| matches!(c, crate::segment::ComponentType::KdTreePostingLists))
        .unwrap()
        .1
        .clone();
    (tree, postings)
}

#[test]
fn range_query_finds_matching_rows() {
    let values: Vec<i32> = (0..100).collect();
    let (tree, postings) = build(&values, 8, 2, 2);
    let reader = NumericIndexReader::open(&tree, &postings).unwrap();

    let lo = NumericValue::I32(10).encode();
    let hi = NumericValue::I32(20).encode();
    let union = reader.range_query(&lo, &hi).unwrap();
    let rows = drain(union);
    assert_eq!(rows, (10..=20).collect::<Vec<u32>>());
}

#[test]
fn equality_query_finds_single_row() {
    let values: Vec<i32> = vec![-5, 0, 5, 10, 15];
    let (tree, postings) = build(&values, 2, 1, 1);
    let reader = NumericIndexReader::open(&tree, &postings).unwrap();

    let key = NumericValue::I32(10).encode();
    let union = reader.range_query(&key, &key).unwrap();
    assert_eq!(drain(union), vec![3]);
}

#[test]
fn negative_and_positive_values_order_correctly() {
    let values: Vec<i32> = vec![-100, -50, 0, 50, 100];
    let (tree, postings) = build(&values, 2, 1, 1);
    let reader = NumericIndexReader::open(&tree, &postings).unwrap();

    let lo = NumericValue::I32(-60).encode();
    let hi = NumericValue::I32(10).encode();
    let union = reader.range_query(&lo, &hi).unwrap();
    assert_eq!(drain(union), vec![1, 2]);
}

#[test]
fn empty_index_range_query_returns_nothing() {
    let (tree, postings) = build(&[], 8, 2, 2);
    let reader = NumericIndexReader::open(&tree, &postings).unwrap();
    assert!(reader.is_empty());
    let union = reader.range_query(&[0, 0, 0, 0], &[0, 0, 0, 1]).unwrap();
    assert_eq!(drain(union), Vec::<u32>::new());
}

#[test]
fn sampled_internal_nodes_still_return_correct_union() {
    // bkd_postings_skip = 1 samples every depth, so internal nodes with
    // enough descendant leaves carry precomputed postings exercised by
    // the `fully_inside` fast path in `descend`.
    let values: Vec<i32> = (0..256).collect();
    let (tree, postings) = build(&values, 4, 1, 1);
    let reader = NumericIndexReader::open(&tree, &postings).unwrap();

    let lo = NumericValue::I32(0).encode();
    let hi = NumericValue::I32(255).encode();
    let union = reader.range_query(&lo, &hi).unwrap();
    assert_eq!(drain(union), (0..256).collect::<Vec<u32>>());
}
