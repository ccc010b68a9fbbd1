//! Per-`(column, memtable)` live index: the in-memory structures that let
//! a query see writes that haven't flushed to an SSTable yet (spec.md
//! §4.6).
//!
//! Grounded on `src/memtable/mod.rs`'s `Memtable` — an `Arc<RwLock<...>>`
//! guarded structure with synchronous, acked writes and poisoned-lock
//! recovery — generalized from one key/value tree to three per-kind live
//! structures (literal trie-map, numeric sorted multimap, vector graph).
//! Posting lists here are ordered by [`crate::pk::PrimaryKey`] directly
//! rather than `segment_row_id` (spec.md §4.1: "strictly increasing in
//! `segment_row_id` (or PK, for memtable)"), since a memtable has no dense
//! row numbering until it flushes.

pub mod literal;
pub mod numeric;
pub mod searcher;
pub mod vector;

use thiserror::Error;

pub use literal::LiteralLiveIndex;
pub use numeric::NumericLiveIndex;
pub use searcher::{MemtableColumnIndex, MemtableSearcher};
pub use vector::VectorLiveIndex;

use crate::literal::LiteralIndexError;
use crate::numeric::NumericIndexError;
use crate::vector::VectorIndexError;

/// Errors raised while reading or writing a live index.
#[derive(Debug, Error)]
pub enum MemtableIndexError {
    /// The guarding `RwLock` was poisoned by a panicking writer.
    #[error("live index lock poisoned")]
    Poisoned,

    /// A primary key referenced during flush-seeding wasn't present in the
    /// SSTable-wide primary key map being built.
    #[error("primary key not found while seeding segment writer")]
    UnknownPrimaryKey,

    /// Underlying literal-index failure (surfaces while seeding a flush).
    #[error("literal live index error: {0}")]
    Literal(#[from] LiteralIndexError),

    /// Underlying numeric-index failure (surfaces while seeding a flush).
    #[error("numeric live index error: {0}")]
    Numeric(#[from] NumericIndexError),

    /// Underlying vector-index failure.
    #[error("vector live index error: {0}")]
    Vector(#[from] VectorIndexError),
}
