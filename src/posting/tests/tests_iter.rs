use std::cell::Cell;
use std::rc::Rc;

use crate::pk::{PrimaryKey, PrimaryKeyMap, SegmentRowId};
use crate::posting::{
    Intersection, Merge, PostingError, PostingIterator, RangeFilter, Union, VecPostingList,
    END_OF_STREAM,
};

fn boxed(ids: &[u32]) -> Box<dyn PostingIterator> {
    Box::new(VecPostingList::from_sorted(ids.to_vec()))
}

/// Wraps a posting iterator and flips a shared flag when dropped, so a
/// test can observe whether an operand was released without ever being
/// queried.
struct DropSignal {
    inner: Box<dyn PostingIterator>,
    dropped: Rc<Cell<bool>>,
}

impl Drop for DropSignal {
    fn drop(&mut self) {
        self.dropped.set(true);
    }
}

impl PostingIterator for DropSignal {
    fn next(&mut self) -> Result<SegmentRowId, PostingError> {
        self.inner.next()
    }

    fn advance(&mut self, target: SegmentRowId) -> Result<SegmentRowId, PostingError> {
        self.inner.advance(target)
    }

    fn min(&self) -> SegmentRowId {
        self.inner.min()
    }

    fn max(&self) -> SegmentRowId {
        self.inner.max()
    }

    fn count(&self) -> usize {
        self.inner.count()
    }
}

fn drain(mut it: impl PostingIterator) -> Vec<u32> {
    let mut out = Vec::new();
    loop {
        let id = it.next().unwrap();
        if id == END_OF_STREAM {
            break;
        }
        out.push(id);
    }
    out
}

#[test]
fn union_dedups_across_operands() {
    let union = Union::new(vec![boxed(&[1, 3, 5]), boxed(&[3, 4, 5, 6])]);
    assert_eq!(drain(union), vec![1, 3, 4, 5, 6]);
}

#[test]
fn union_advance_skips_past_target() {
    let mut union = Union::new(vec![boxed(&[1, 3, 5]), boxed(&[2, 4, 6])]);
    assert_eq!(union.advance(4).unwrap(), 4);
    assert_eq!(union.next().unwrap(), 5);
    assert_eq!(union.next().unwrap(), 6);
    assert_eq!(union.next().unwrap(), END_OF_STREAM);
}

#[test]
fn intersection_finds_common_ids() {
    let inter = Intersection::new(vec![
        boxed(&[1, 2, 3, 4, 5, 6]),
        boxed(&[2, 4, 6, 8]),
        boxed(&[2, 3, 4, 6, 10]),
    ]);
    assert_eq!(drain(inter), vec![2, 4, 6]);
}

#[test]
fn intersection_empty_when_no_overlap() {
    let inter = Intersection::new(vec![boxed(&[1, 2]), boxed(&[100, 200])]);
    assert_eq!(drain(inter), Vec::<u32>::new());
}

#[test]
fn intersection_of_empty_operand_list_is_empty() {
    let inter = Intersection::new(Vec::new());
    assert_eq!(drain(inter), Vec::<u32>::new());
}

#[test]
fn intersection_eagerly_drops_every_child_when_ranges_dont_overlap() {
    let dropped_a = Rc::new(Cell::new(false));
    let dropped_b = Rc::new(Cell::new(false));
    let a = DropSignal {
        inner: boxed(&[1, 2]),
        dropped: dropped_a.clone(),
    };
    let b = DropSignal {
        inner: boxed(&[100, 200]),
        dropped: dropped_b.clone(),
    };

    // `new()` itself must close over non-overlapping ranges and release
    // both operands, before `next`/`advance`/`drain` is ever called.
    let inter = Intersection::new(vec![Box::new(a) as Box<dyn PostingIterator>, Box::new(b)]);
    assert!(dropped_a.get());
    assert!(dropped_b.get());
    assert_eq!(drain(inter), Vec::<u32>::new());
}

#[test]
fn range_filter_keeps_only_ids_in_pk_range() {
    let mut pk_map = PrimaryKeyMap::new();
    for i in 0..10u8 {
        pk_map
            .push(PrimaryKey::new(i as i64, vec![i], vec![]))
            .unwrap();
    }
    let source = boxed(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    let start = PrimaryKey::new(3, vec![3u8], vec![]);
    let end = PrimaryKey::new(7, vec![7u8], vec![]);
    let filtered = RangeFilter::new(source, &pk_map, start, end);
    assert_eq!(drain(filtered), vec![3, 4, 5, 6]);
}

#[test]
fn merge_preserves_duplicate_ids_across_operands() {
    let merge = Merge::new(vec![boxed(&[1, 2, 3]), boxed(&[2, 3, 4])]);
    assert_eq!(drain(merge), vec![1, 2, 2, 3, 3, 4]);
}
