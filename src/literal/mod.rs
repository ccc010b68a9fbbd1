//! Literal (term) index: a sorted term dictionary over one column, mapping
//! each distinct term to the rows that produced it.
//!
//! Values pass through [`analyzer`] before indexing (case fold, NFC
//! normalize, ASCII fold, optional whitespace tokenization). [`writer`]
//! accumulates `(term, row)` pairs during a segment build; [`reader`] exposes
//! `exact_match`/`range_match`/`all_terms` over the serialized dictionary,
//! mirroring `src/sstable/mod.rs`'s separator-key binary search in place of
//! a real trie (spec.md §4.2, §9 Open Question: flat sorted array chosen
//! over a radix trie for simplicity).

use thiserror::Error;

use crate::encoding::EncodingError;
use crate::posting::PostingError;

pub mod analyzer;
pub mod reader;
pub mod writer;

pub use reader::LiteralIndexReader;
pub use writer::LiteralIndexWriter;

/// Errors raised while building or reading a literal index.
#[derive(Debug, Error)]
pub enum LiteralIndexError {
    /// A text transform (case fold, normalize, ascii fold, tokenize) was
    /// requested for a value that is not valid UTF-8.
    #[error("column requires UTF-8 text for its configured analyzer options")]
    NotUtf8,

    /// Underlying posting-list failure.
    #[error("literal index posting error: {0}")]
    Posting(#[from] PostingError),

    /// Underlying block codec failure while reading a serialized dictionary.
    #[error("literal index decode error: {0}")]
    Decode(#[from] EncodingError),

    /// The serialized dictionary is structurally corrupt (e.g. terms not
    /// sorted, truncated entry).
    #[error("corrupt literal index dictionary: {0}")]
    Corrupt(String),
}
