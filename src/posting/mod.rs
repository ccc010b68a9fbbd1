//! Posting-list representation and the on-disk block codec.
//!
//! A posting list is a sorted, duplicate-free sequence of
//! [`SegmentRowId`]s — "which rows of this segment match this term/range/
//! predicate". [`iter`] builds the union/intersection/range-filter/merge
//! algebra queries compose with.
//!
//! Grounded on `engine::utils::MergeIterator`'s heap-based k-way
//! merge shape, generalized from `Record` streams to bare row-id streams,
//! and on [`crate::encoding::varint`] for the on-disk block format.

use thiserror::Error;

use crate::encoding::EncodingError;
use crate::encoding::varint;
use crate::pk::SegmentRowId;

pub mod iter;

#[cfg(test)]
mod tests;

pub use iter::{Intersection, Merge, RangeFilter, Union};

/// Sentinel returned by [`PostingIterator::next`]/[`PostingIterator::advance`]
/// once a stream is exhausted. `SegmentRowId` is dense and zero-based, so
/// `u32::MAX` can never be a real row id within one segment.
pub const END_OF_STREAM: SegmentRowId = SegmentRowId::MAX;

/// Errors raised while building or reading posting lists.
#[derive(Debug, Error)]
pub enum PostingError {
    /// On-disk block failed to decode.
    #[error("posting block decode error: {0}")]
    Decode(#[from] EncodingError),

    /// A row id was appended out of order while building a posting list.
    #[error("posting list ids must be inserted in strictly ascending order")]
    OutOfOrderInsert,
}

/// A forward-only, seekable cursor over a sorted row-id stream.
///
/// All combinators in [`iter`] are built on top of this trait, so a single
/// algebra covers in-memory (`VecPostingList`) and on-disk
/// (`EncodedPostingList`) sources alike.
pub trait PostingIterator {
    /// Advances to and returns the next id, or [`END_OF_STREAM`].
    fn next(&mut self) -> Result<SegmentRowId, PostingError>;

    /// Advances to the first id `>= target`, returning it, or
    /// [`END_OF_STREAM`] if none exists. Implementations must be at least
    /// as correct as (and should be faster than) repeated [`Self::next`].
    fn advance(&mut self, target: SegmentRowId) -> Result<SegmentRowId, PostingError>;

    /// Smallest id this stream could ever produce (inclusive lower bound,
    /// known without scanning).
    fn min(&self) -> SegmentRowId;

    /// Largest id this stream could ever produce (inclusive upper bound,
    /// known without scanning).
    fn max(&self) -> SegmentRowId;

    /// Exact or upper-bound cardinality, used by the query planner to order
    /// intersection operands from smallest to largest.
    fn count(&self) -> usize;
}

/// An in-memory posting list over a sorted `Vec<SegmentRowId>`.
///
/// The construction-time workhorse: every on-disk posting list is decoded
/// into one of these before being wrapped in algebra, and the memtable live
/// index builds one of these directly per term.
#[derive(Debug, Default, Clone)]
pub struct VecPostingList {
    ids: Vec<SegmentRowId>,
    cursor: usize,
}

impl VecPostingList {
    /// Wraps an already-sorted, duplicate-free id list. Debug-asserts the
    /// ordering invariant; callers outside tests are expected to uphold it
    /// (e.g. the segment builder appends ids in row order).
    pub fn from_sorted(ids: Vec<SegmentRowId>) -> Self {
        debug_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        Self { ids, cursor: 0 }
    }

    /// Builder entry point: appends `id`, rejecting non-ascending input.
    pub fn push(&mut self, id: SegmentRowId) -> Result<(), PostingError> {
        if let Some(&last) = self.ids.last() {
            if id <= last {
                return Err(PostingError::OutOfOrderInsert);
            }
        }
        self.ids.push(id);
        Ok(())
    }

    /// Number of ids currently held.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether this list holds no ids.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Borrows the underlying sorted ids.
    pub fn as_slice(&self) -> &[SegmentRowId] {
        &self.ids
    }

    /// Splits this list into [`varint::POSTING_BLOCK_SIZE`]-sized blocks and
    /// encodes each with [`varint::encode_block`], writing
    /// `[u32 block_count][block...]` to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), PostingError> {
        let chunks: Vec<&[SegmentRowId]> =
            self.ids.chunks(varint::POSTING_BLOCK_SIZE).collect();
        buf.extend_from_slice(&(chunks.len() as u32).to_le_bytes());
        for chunk in chunks {
            varint::encode_block(chunk, buf)?;
        }
        Ok(())
    }
}

impl PostingIterator for VecPostingList {
    fn next(&mut self) -> Result<SegmentRowId, PostingError> {
        match self.ids.get(self.cursor) {
            Some(&id) => {
                self.cursor += 1;
                Ok(id)
            }
            None => Ok(END_OF_STREAM),
        }
    }

    fn advance(&mut self, target: SegmentRowId) -> Result<SegmentRowId, PostingError> {
        if self.cursor < self.ids.len() && self.ids[self.cursor] >= target {
            return self.next();
        }
        let start = self.cursor;
        match self.ids[start..].binary_search(&target) {
            Ok(offset) => self.cursor = start + offset,
            Err(offset) => self.cursor = start + offset,
        }
        self.next()
    }

    fn min(&self) -> SegmentRowId {
        self.ids.first().copied().unwrap_or(END_OF_STREAM)
    }

    fn max(&self) -> SegmentRowId {
        self.ids.last().copied().unwrap_or(0)
    }

    fn count(&self) -> usize {
        self.ids.len()
    }
}

/// A posting list read lazily from an on-disk block sequence.
///
/// Wraps a `[u32 block_count][block...]` byte slice (as written by
/// [`VecPostingList::encode`]) that typically comes from a
/// `*-KD_TREE_POSTING_LISTS.db`/`*-TERMS_DATA.db` component read fully
/// into memory. Decodes all blocks eagerly at construction — posting lists are small
/// enough per term/leaf that lazy block-at-a-time decoding buys nothing
/// and only complicates `advance`.
#[derive(Debug, Clone)]
pub struct EncodedPostingList {
    inner: VecPostingList,
}

impl EncodedPostingList {
    /// Decodes `buf` (as produced by [`VecPostingList::encode`]) in full.
    pub fn decode(buf: &[u8]) -> Result<Self, PostingError> {
        if buf.len() < 4 {
            return Err(PostingError::Decode(EncodingError::UnexpectedEof {
                needed: 4,
                available: buf.len(),
            }));
        }
        let block_count = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let mut offset = 4;
        let mut ids = Vec::new();
        for _ in 0..block_count {
            let (mut block_ids, consumed) = varint::decode_block(&buf[offset..])?;
            offset += consumed;
            ids.append(&mut block_ids);
        }
        Ok(Self {
            inner: VecPostingList::from_sorted(ids),
        })
    }
}

impl PostingIterator for EncodedPostingList {
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
