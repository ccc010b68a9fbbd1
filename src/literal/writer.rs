//! Accumulates `(term, row)` pairs during a segment build into a sorted
//! term dictionary, then serializes it across two components: `TERMS_DATA`
//! (the concatenated posting-list payloads, in ascending term order) and
//! `TERMS_FOOTER_POINTER` (the term directory — each term's bytes plus an
//! offset/length pointer into `TERMS_DATA`) — a flat analogue of
//! `src/sstable/builder.rs`'s sorted-block writer plus its separate block
//! index, with terms in place of keys.

use std::collections::BTreeMap;

use crate::pk::SegmentRowId;
use crate::posting::{PostingError, VecPostingList};
use crate::segment::ComponentType;

use super::LiteralIndexError;

/// Builds one column's literal index in memory before it is flushed to the
/// segment's `TERMS_DATA` component.
#[derive(Debug, Default)]
pub struct LiteralIndexWriter {
    terms: BTreeMap<Vec<u8>, VecPostingList>,
}

impl LiteralIndexWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `row` produced `term`. Rows must be added in
    /// non-decreasing order overall (the segment builder processes rows in
    /// ascending `segment_row_id` order); a repeat of the same row for the
    /// same term (e.g. a token appearing twice in one value) is a no-op.
    pub fn add(&mut self, term: Vec<u8>, row: SegmentRowId) -> Result<(), LiteralIndexError> {
        let list = self.terms.entry(term).or_default();
        match list.as_slice().last() {
            Some(&last) if last == row => Ok(()),
            Some(&last) if last > row => Err(PostingError::OutOfOrderInsert.into()),
            _ => Ok(list.push(row)?),
        }
    }

    /// Number of distinct terms accumulated so far.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Whether no terms have been added.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Rough estimate of how many bytes this writer would currently
    /// serialize to: term bytes plus four `u32`s of bookkeeping per term
    /// (directory offset/length) plus each posting list's row count (an
    /// upper bound on its encoded size). Used to decide when a segment
    /// build should flush and roll over (spec.md §4.5).
    pub fn buffered_bytes(&self) -> usize {
        self.terms
            .iter()
            .map(|(term, postings)| term.len() + 16 + postings.len() * 4)
            .sum()
    }

    /// Serializes the dictionary into its two on-disk components:
    /// `TERMS_DATA` (postings, in ascending term order) and
    /// `TERMS_FOOTER_POINTER` (the term directory pointing into it).
    pub fn finish(self) -> Result<Vec<(ComponentType, Vec<u8>)>, LiteralIndexError> {
        let mut data = Vec::new();
        let mut directory = Vec::new();
        directory.extend_from_slice(&(self.terms.len() as u32).to_le_bytes());

        for (term, postings) in self.terms {
            let mut posting_buf = Vec::new();
            postings.encode(&mut posting_buf)?;

            let data_offset = data.len() as u32;
            data.extend_from_slice(&posting_buf);

            directory.extend_from_slice(&(term.len() as u32).to_le_bytes());
            directory.extend_from_slice(&term);
            directory.extend_from_slice(&data_offset.to_le_bytes());
            directory.extend_from_slice(&(posting_buf.len() as u32).to_le_bytes());
        }

        Ok(vec![
            (ComponentType::TermsData, data),
            (ComponentType::TermsFooterPointer, directory),
        ])
    }
}
