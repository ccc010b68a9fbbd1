//! Crate-wide error taxonomy.
//!
//! Every subsystem (posting algebra, literal/numeric/vector indexes, segment
//! builder, memtable live index, query planner, lifecycle) defines its own
//! `thiserror` enum. [`SaiError`] aggregates them the same way the teacher's
//! `EngineError` aggregates `ManifestError` / `MemtableError` / `SSTableError`
//! — one `#[from]` arm per subsystem, nothing hand-wrapped.

use thiserror::Error;

use crate::config::ConfigError;
use crate::literal::LiteralIndexError;
use crate::lifecycle::LifecycleError;
use crate::memtable_index::MemtableIndexError;
use crate::numeric::NumericIndexError;
use crate::posting::PostingError;
use crate::query::QueryError;
use crate::segment::SegmentError;
use crate::vector::VectorIndexError;

/// Top-level error type returned by the public SAI API.
#[derive(Debug, Error)]
pub enum SaiError {
    /// DDL-time option validation failure (class 1 — no side effects).
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Posting-list iterator algebra failure.
    #[error("posting list error: {0}")]
    Posting(#[from] PostingError),

    /// Literal (trie/term) index failure.
    #[error("literal index error: {0}")]
    Literal(#[from] LiteralIndexError),

    /// Numeric (block KD-tree) index failure.
    #[error("numeric index error: {0}")]
    Numeric(#[from] NumericIndexError),

    /// Vector (ANN) index failure.
    #[error("vector index error: {0}")]
    Vector(#[from] VectorIndexError),

    /// Per-segment build/read failure (class 3/4).
    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),

    /// Memtable live-index failure.
    #[error("memtable index error: {0}")]
    MemtableIndex(#[from] MemtableIndexError),

    /// Query planning/execution failure (class 5).
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Index lifecycle failure (create/build/drop/rebuild).
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}
