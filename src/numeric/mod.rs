//! Numeric index: fixed-width byte-comparable keys over a one-dimensional
//! block KD-tree, with precomputed postings on internal nodes that satisfy
//! a sampling predicate (spec.md §4.3).
//!
//! [`pack`] turns typed numeric/temporal values into byte-comparable keys;
//! [`bkd`] builds and queries the tree itself. Grounded on
//! `src/sstable/mod.rs`'s block-oriented layout (a leaf is analogous to a
//! fixed-capacity data block) and `src/compaction/stcs/mod.rs`'s
//! bucket-by-threshold logic, adapted here to bucket by tree depth and
//! descendant-leaf count instead of file size.

use thiserror::Error;

use crate::encoding::EncodingError;
use crate::posting::PostingError;

pub mod bkd;
pub mod pack;

#[cfg(test)]
mod tests;

pub use bkd::{NumericIndexReader, NumericIndexWriter};
pub use pack::NumericValue;

/// Errors raised while building or querying a numeric index.
#[derive(Debug, Error)]
pub enum NumericIndexError {
    /// A key's byte width did not match the column's configured width.
    #[error("numeric key width mismatch: expected {expected}, got {actual}")]
    WidthMismatch {
        /// Width every key in this column must have.
        expected: usize,
        /// Width of the offending key.
        actual: usize,
    },

    /// Underlying posting-list failure.
    #[error("numeric index posting error: {0}")]
    Posting(#[from] PostingError),

    /// Underlying block codec failure while reading a serialized tree.
    #[error("numeric index decode error: {0}")]
    Decode(#[from] EncodingError),

    /// The serialized tree is structurally corrupt.
    #[error("corrupt numeric index: {0}")]
    Corrupt(String),
}
