//! Query coordination: translating a predicate tree plus optional ANN
//! ordering into a plan over the memtable's live searcher and each
//! restricted SSTable's per-segment searchers, then merging, filtering,
//! and paging the result (spec.md §4.7).

pub mod exec;
pub mod plan;

use thiserror::Error;

pub use exec::{QueryExecutor, Searcher};
pub use plan::{Operator, Plan, Predicate, PredicateValue};

/// Errors raised while planning or executing a query (spec.md §7 class 5).
#[derive(Debug, Error)]
pub enum QueryError {
    /// A clause's operator is not supported by its column's index kind,
    /// and the query did not opt in with `ALLOW FILTERING`.
    #[error("operator {operator:?} is not supported on column `{column}`")]
    UnsupportedOperator {
        /// The offending column.
        column: String,
        /// The rejected operator.
        operator: Operator,
    },

    /// A column referenced by the query has no index build in progress or
    /// completed, or its only build failed.
    #[error("column `{0}` has no queryable index")]
    IndexBuildIncomplete(String),

    /// A column's index was marked non-queryable after a read-time
    /// corruption (spec.md §7 class 4) and no rebuild has completed yet.
    #[error("column `{0}` is not queryable (corruption pending rebuild)")]
    NotQueryable(String),

    /// The host's query deadline elapsed before execution completed.
    #[error("query deadline exceeded")]
    DeadlineExceeded,

    /// Underlying posting-list failure surfaced while merging searcher
    /// results.
    #[error("posting error during query execution: {0}")]
    Posting(#[from] crate::posting::PostingError),

    /// Underlying vector-index failure surfaced during an ANN search.
    #[error("vector index error during query execution: {0}")]
    Vector(#[from] crate::vector::VectorIndexError),

    /// Underlying literal-index failure surfaced while matching a clause.
    #[error("literal index error during query execution: {0}")]
    Literal(#[from] crate::literal::LiteralIndexError),

    /// Underlying numeric-index failure surfaced while matching a clause.
    #[error("numeric index error during query execution: {0}")]
    Numeric(#[from] crate::numeric::NumericIndexError),

    /// Underlying segment-layer failure (corrupt or truncated component)
    /// surfaced while resolving row ids to primary keys.
    #[error("segment error during query execution: {0}")]
    Segment(#[from] crate::segment::SegmentError),

    /// Underlying memtable live-index failure surfaced while matching a
    /// clause against the memtable searcher.
    #[error("memtable index error during query execution: {0}")]
    MemtableIndex(#[from] crate::memtable_index::MemtableIndexError),
}
