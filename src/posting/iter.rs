//! Posting-list combinators: union, intersection, range filter, merge.
//!
//! Each combinator implements [`PostingIterator`] over boxed child
//! iterators, so they compose to arbitrary depth — the query planner
//! builds a small DAG of these per predicate tree (spec.md §4.7).
//!
//! The k-way [`Union`] is grounded on
//! `engine::utils::MergeIterator`'s `BinaryHeap`-based merge;
//! [`Intersection`]'s short-circuit is grounded on the early-return style of
//! `sstable::SSTable`'s bloom-filter probe (bail out the
//! moment the remaining operands cannot possibly overlap).

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::pk::{PrimaryKeyMap, SegmentRowId};

use super::{END_OF_STREAM, PostingError, PostingIterator};

/// Type alias for a dynamically dispatched, owned posting-list operand.
pub type BoxedPosting<'a> = Box<dyn PostingIterator + 'a>;

struct HeapEntry<'a> {
    id: SegmentRowId,
    source: usize,
    _marker: std::marker::PhantomData<&'a ()>,
}

impl Ord for HeapEntry<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        Reverse(self.id).cmp(&Reverse(other.id))
    }
}
impl PartialOrd for HeapEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for HeapEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for HeapEntry<'_> {}

/// OR over `N` operands: every id produced by any child, each yielded
/// exactly once. Used for multi-valued column semantics (e.g. `MAP VALUES
/// CONTAINS`, where one row can hit the same term through several map
/// entries) and for combining per-term postings under a single `IN`/range
/// clause.
pub struct Union<'a> {
    children: Vec<BoxedPosting<'a>>,
    heap: BinaryHeap<HeapEntry<'a>>,
    primed: bool,
    last_emitted: Option<SegmentRowId>,
}

impl<'a> Union<'a> {
    /// Builds a union over `children`. Lazily primes the heap on first use
    /// so construction itself cannot fail.
    pub fn new(children: Vec<BoxedPosting<'a>>) -> Self {
        Self {
            children,
            heap: BinaryHeap::new(),
            primed: false,
            last_emitted: None,
        }
    }

    fn prime(&mut self) -> Result<(), PostingError> {
        if self.primed {
            return Ok(());
        }
        for (idx, child) in self.children.iter_mut().enumerate() {
            let id = child.next()?;
            if id != END_OF_STREAM {
                self.heap.push(HeapEntry {
                    id,
                    source: idx,
                    _marker: std::marker::PhantomData,
                });
            }
        }
        self.primed = true;
        Ok(())
    }
}

impl PostingIterator for Union<'_> {
    fn next(&mut self) -> Result<SegmentRowId, PostingError> {
        self.prime()?;
        loop {
            let Some(entry) = self.heap.pop() else {
                return Ok(END_OF_STREAM);
            };
            let next_id = self.children[entry.source].next()?;
            if next_id != END_OF_STREAM {
                self.heap.push(HeapEntry {
                    id: next_id,
                    source: entry.source,
                    _marker: std::marker::PhantomData,
                });
            }
            if self.last_emitted == Some(entry.id) {
                continue;
            }
            self.last_emitted = Some(entry.id);
            return Ok(entry.id);
        }
    }

    fn advance(&mut self, target: SegmentRowId) -> Result<SegmentRowId, PostingError> {
        self.prime()?;
        while let Some(top) = self.heap.peek() {
            if top.id >= target {
                break;
            }
            let entry = self.heap.pop().expect("peeked");
            let advanced = self.children[entry.source].advance(target)?;
            if advanced != END_OF_STREAM {
                self.heap.push(HeapEntry {
                    id: advanced,
                    source: entry.source,
                    _marker: std::marker::PhantomData,
                });
            }
        }
        self.next()
    }

    fn min(&self) -> SegmentRowId {
        self.children.iter().map(|c| c.min()).min().unwrap_or(END_OF_STREAM)
    }

    fn max(&self) -> SegmentRowId {
        self.children.iter().map(|c| c.max()).max().unwrap_or(0)
    }

    fn count(&self) -> usize {
        self.children.iter().map(|c| c.count()).sum()
    }
}

/// AND over `N` operands, evaluated smallest-operand-first. Eagerly closes
/// once `global_min > global_max`, i.e. the remaining operands' value
/// ranges no longer overlap — no further `next`/`advance` calls are made
/// once that happens.
pub struct Intersection<'a> {
    children: Vec<BoxedPosting<'a>>,
    done: bool,
}

impl<'a> Intersection<'a> {
    /// Builds an intersection over `children`, ordered by the caller from
    /// cheapest (smallest [`PostingIterator::count`]) to most expensive —
    /// the planner is responsible for that ordering, this type just walks
    /// operands in the order given.
    ///
    /// Computes `global_min`/`global_max` across every child up front: if
    /// the operands' value ranges already don't overlap, the intersection
    /// is empty before a single `next`/`advance` call is made, and every
    /// child is dropped immediately rather than held open until the first
    /// `next()`.
    pub fn new(children: Vec<BoxedPosting<'a>>) -> Self {
        let mut this = Self { children, done: false };
        if this.closed() {
            this.done = true;
            this.children.clear();
        }
        this
    }

    fn closed(&self) -> bool {
        let global_min = self.children.iter().map(|c| c.min()).max();
        let global_max = self.children.iter().map(|c| c.max()).min();
        match (global_min, global_max) {
            (Some(lo), Some(hi)) => lo > hi,
            _ => true,
        }
    }
}

impl PostingIterator for Intersection<'_> {
    fn next(&mut self) -> Result<SegmentRowId, PostingError> {
        if self.done || self.closed() {
            self.done = true;
            return Ok(END_OF_STREAM);
        }
        let candidate = self.children[0].next()?;
        if candidate == END_OF_STREAM {
            self.done = true;
            return Ok(END_OF_STREAM);
        }
        self.next_from(candidate)
    }

    fn advance(&mut self, target: SegmentRowId) -> Result<SegmentRowId, PostingError> {
        if self.done || self.closed() {
            self.done = true;
            return Ok(END_OF_STREAM);
        }
        let first = self.children[0].advance(target)?;
        if first == END_OF_STREAM {
            self.done = true;
            return Ok(END_OF_STREAM);
        }
        self.next_from(first)
    }

    fn min(&self) -> SegmentRowId {
        self.children.iter().map(|c| c.min()).max().unwrap_or(END_OF_STREAM)
    }

    fn max(&self) -> SegmentRowId {
        self.children.iter().map(|c| c.max()).min().unwrap_or(0)
    }

    fn count(&self) -> usize {
        self.children.iter().map(|c| c.count()).min().unwrap_or(0)
    }
}

impl Intersection<'_> {
    /// Leapfrog join: walks operands in a ring starting just past whichever
    /// operand produced `candidate`, seeking each to `>= candidate`. A
    /// mismatch adopts the overshoot as the new candidate and resets the
    /// agreement count to 1 (the operand that just produced it trivially
    /// agrees) rather than restarting the ring from operand 0 — restarting
    /// would re-seek operands that already reported the old candidate,
    /// stranding them past the new one since `advance` cannot rewind.
    fn next_from(&mut self, mut candidate: SegmentRowId) -> Result<SegmentRowId, PostingError> {
        let n = self.children.len();
        if n == 1 {
            return Ok(candidate);
        }
        let mut agree = 1;
        let mut idx = 1 % n;
        loop {
            let found = self.children[idx].advance(candidate)?;
            if found == END_OF_STREAM {
                self.done = true;
                return Ok(END_OF_STREAM);
            }
            if found == candidate {
                agree += 1;
                if agree == n {
                    return Ok(candidate);
                }
            } else {
                candidate = found;
                agree = 1;
            }
            idx = (idx + 1) % n;
        }
    }
}

/// Wraps a source iterator and drops any id whose primary key falls
/// outside `[start, end)`, per a segment's [`PrimaryKeyMap`]. Used to
/// narrow a column predicate's postings down to a token/partition range
/// (e.g. paging resumption, or a query scoped to one partition).
pub struct RangeFilter<'a> {
    source: BoxedPosting<'a>,
    pk_map: &'a PrimaryKeyMap,
    start: crate::pk::PrimaryKey,
    end: crate::pk::PrimaryKey,
}

impl<'a> RangeFilter<'a> {
    /// Builds a range filter over `source`, keeping only ids whose PK (per
    /// `pk_map`) falls in `[start, end)`.
    pub fn new(
        source: BoxedPosting<'a>,
        pk_map: &'a PrimaryKeyMap,
        start: crate::pk::PrimaryKey,
        end: crate::pk::PrimaryKey,
    ) -> Self {
        Self {
            source,
            pk_map,
            start,
            end,
        }
    }

    fn skip_until_in_range(&mut self, mut id: SegmentRowId) -> Result<SegmentRowId, PostingError> {
        while id != END_OF_STREAM && !self.pk_map.in_range(id, &self.start, &self.end) {
            id = self.source.next()?;
        }
        Ok(id)
    }
}

impl PostingIterator for RangeFilter<'_> {
    fn next(&mut self) -> Result<SegmentRowId, PostingError> {
        let id = self.source.next()?;
        self.skip_until_in_range(id)
    }

    fn advance(&mut self, target: SegmentRowId) -> Result<SegmentRowId, PostingError> {
        let id = self.source.advance(target)?;
        self.skip_until_in_range(id)
    }

    fn min(&self) -> SegmentRowId {
        self.source.min()
    }

    fn max(&self) -> SegmentRowId {
        self.source.max()
    }

    fn count(&self) -> usize {
        self.source.count()
    }
}

/// A non-deduplicating k-way merge: unlike [`Union`], the same id may be
/// yielded more than once if more than one operand produces it. Used to
/// assemble cross-segment result streams where row ids have already been
/// translated into a shared space and duplicate occurrences are
/// meaningful (e.g. counting hits across segments during a rebuild).
pub struct Merge<'a> {
    children: Vec<BoxedPosting<'a>>,
    heap: BinaryHeap<HeapEntry<'a>>,
    primed: bool,
}

impl<'a> Merge<'a> {
    /// Builds a merge over `children`.
    pub fn new(children: Vec<BoxedPosting<'a>>) -> Self {
        Self {
            children,
            heap: BinaryHeap::new(),
            primed: false,
        }
    }

    fn prime(&mut self) -> Result<(), PostingError> {
        if self.primed {
            return Ok(());
        }
        for (idx, child) in self.children.iter_mut().enumerate() {
            let id = child.next()?;
            if id != END_OF_STREAM {
                self.heap.push(HeapEntry {
                    id,
                    source: idx,
                    _marker: std::marker::PhantomData,
                });
            }
        }
        self.primed = true;
        Ok(())
    }
}

impl PostingIterator for Merge<'_> {
    fn next(&mut self) -> Result<SegmentRowId, PostingError> {
        self.prime()?;
        let Some(entry) = self.heap.pop() else {
            return Ok(END_OF_STREAM);
        };
        let next_id = self.children[entry.source].next()?;
        if next_id != END_OF_STREAM {
            self.heap.push(HeapEntry {
                id: next_id,
                source: entry.source,
                _marker: std::marker::PhantomData,
            });
        }
        Ok(entry.id)
    }

    fn advance(&mut self, target: SegmentRowId) -> Result<SegmentRowId, PostingError> {
        self.prime()?;
        while let Some(top) = self.heap.peek() {
            if top.id >= target {
                break;
            }
            let entry = self.heap.pop().expect("peeked");
            let advanced = self.children[entry.source].advance(target)?;
            if advanced != END_OF_STREAM {
                self.heap.push(HeapEntry {
                    id: advanced,
                    source: entry.source,
                    _marker: std::marker::PhantomData,
                });
            }
        }
        self.next()
    }

    fn min(&self) -> SegmentRowId {
        self.children.iter().map(|c| c.min()).min().unwrap_or(END_OF_STREAM)
    }

    fn max(&self) -> SegmentRowId {
        self.children.iter().map(|c| c.max()).max().unwrap_or(0)
    }

    fn count(&self) -> usize {
        self.children.iter().map(|c| c.count()).sum()
    }
}
