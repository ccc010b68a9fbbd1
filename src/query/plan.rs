//! Predicate tree and the operator-acceptance matrix (spec.md §6).
//!
//! Grounded on `src/config.rs`'s eager, side-effect-free validation style:
//! a [`Plan`] is only ever built through [`Plan::build`], the same way a
//! [`crate::config::ColumnIndexOptions`] is only ever built through
//! `validate` — constructing one means every clause has already been
//! checked against the matrix.

use crate::config::{CollectionVariant, IndexedColumnKind};
use crate::pk::PrimaryKey;

use super::QueryError;

/// The operator a predicate clause applies, independent of column kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `col = value`.
    Eq,
    /// `col != value`.
    NotEq,
    /// `col < / <= / > / >= / BETWEEN`.
    Range,
    /// `CONTAINS value` (map values, lists, sets).
    Contains,
    /// `CONTAINS KEY key` (map keys).
    ContainsKey,
    /// `m[k] = v` (map entries).
    EntryEq,
    /// `ORDER BY col ANN OF vector`.
    AnnOrderBy,
}

/// The typed value(s) a predicate clause compares against. Callers pass
/// already-encoded bytes (literal terms, `NumericValue::encode()` keys)
/// so this module stays agnostic of CQL-level typing.
#[derive(Debug, Clone)]
pub enum PredicateValue {
    /// A single literal term or numeric key.
    Single(Vec<u8>),
    /// An inclusive-start/exclusive-end range of literal terms or numeric
    /// keys.
    Range(Vec<u8>, Vec<u8>),
    /// A map entry: `(key_bytes, value_bytes)`.
    Entry(Vec<u8>, Vec<u8>),
    /// An ANN query vector.
    Vector(Vec<f32>),
}

/// One clause of a predicate tree: a column, its declared kind/collection
/// variant, an operator, and the value(s) to compare against.
#[derive(Debug, Clone)]
pub struct Predicate {
    /// Column name, used to look up searchers and live indexes.
    pub column: String,
    /// The column's declared index kind.
    pub kind: IndexedColumnKind,
    /// The column's collection variant (`None` for non-collection columns).
    pub collection: CollectionVariant,
    /// The operator this clause applies.
    pub operator: Operator,
    /// The comparison value(s).
    pub value: PredicateValue,
}

/// Whether `(kind, collection, operator)` is accepted by spec.md §6's
/// operator acceptance matrix.
fn matrix_allows(kind: IndexedColumnKind, collection: CollectionVariant, operator: Operator) -> bool {
    use CollectionVariant::*;
    use IndexedColumnKind::*;
    use Operator::*;

    matches!(
        (kind, collection, operator),
        (Literal, None, Eq)
            | (Literal, None, NotEq)
            | (Literal, None, Range)
            | (Literal, Keys, ContainsKey)
            | (Literal, Keys, NotEq)
            | (Literal, Values, Contains)
            | (Literal, Values, NotEq)
            | (Literal, Entries, EntryEq)
            | (Literal, Entries, NotEq)
            | (Literal, Full, Eq)
            | (Numeric, None, Eq)
            | (Numeric, None, NotEq)
            | (Numeric, None, Range)
            | (Vector, None, AnnOrderBy)
    )
}

/// A clause that survived either the matrix or an `ALLOW FILTERING`
/// downgrade. Downgraded clauses contribute no restriction to the plan's
/// own postings — the host is expected to post-filter them, per spec.md
/// §4.7/§9.
#[derive(Debug, Clone)]
pub(crate) struct PlannedClause {
    pub predicate: Predicate,
    pub verified: bool,
}

/// A validated query: every clause has already been checked against the
/// operator matrix (or downgraded under `ALLOW FILTERING`).
#[derive(Debug)]
pub struct Plan {
    pub(crate) clauses: Vec<PlannedClause>,
    pub(crate) order_by_ann: Option<Predicate>,
    /// Maximum rows to return.
    pub limit: Option<usize>,
    /// Resume paging strictly after this primary key (spec.md §4.7:
    /// "resumes queries on the partition key following the last returned
    /// row's partition key").
    pub after: Option<PrimaryKey>,
}

impl Plan {
    /// Validates `clauses` (plus an optional ANN ordering predicate)
    /// against the operator matrix. Fails with
    /// [`QueryError::UnsupportedOperator`] unless `allow_filtering` is
    /// set, in which case a non-matching clause is kept but marked
    /// unverified rather than rejected.
    pub fn build(
        clauses: Vec<Predicate>,
        order_by_ann: Option<Predicate>,
        limit: Option<usize>,
        after: Option<PrimaryKey>,
        allow_filtering: bool,
    ) -> Result<Self, QueryError> {
        if let Some(ann) = &order_by_ann {
            if !matrix_allows(ann.kind, ann.collection, ann.operator) {
                return Err(QueryError::UnsupportedOperator {
                    column: ann.column.clone(),
                    operator: ann.operator,
                });
            }
        }

        let mut planned = Vec::with_capacity(clauses.len());
        for predicate in clauses {
            let allowed = matrix_allows(predicate.kind, predicate.collection, predicate.operator);
            if !allowed && !allow_filtering {
                return Err(QueryError::UnsupportedOperator {
                    column: predicate.column,
                    operator: predicate.operator,
                });
            }
            planned.push(PlannedClause {
                verified: allowed,
                predicate,
            });
        }

        Ok(Self {
            clauses: planned,
            order_by_ann,
            limit,
            after,
        })
    }

    /// Whether this plan orders by ANN similarity.
    pub fn is_ann_ordered(&self) -> bool {
        self.order_by_ann.is_some()
    }
}
