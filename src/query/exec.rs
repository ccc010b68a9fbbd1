//! Executes a validated [`Plan`] against a set of [`Searcher`]s (the
//! memtable's live searcher plus one per restricted SSTable), implementing
//! spec.md §4.7's "per-column unions across segments; cross-column
//! intersection" and the ANN filter-then-sort pipeline (§4.4).

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::pk::PrimaryKey;

use super::plan::{Operator, Plan, Predicate, PredicateValue};
use super::QueryError;

/// A single source of column matches: either the memtable's live index or
/// one SSTable's per-segment readers. Both implement this the same way,
/// letting [`QueryExecutor`] fan out without caring which it's talking to.
pub trait Searcher {
    /// Whether `column`'s index can currently be queried (build complete,
    /// not downgraded by corruption — spec.md §4.7's index-build gate and
    /// §7 class 4's non-queryable downgrade).
    fn is_queryable(&self, column: &str) -> bool;

    /// Primary keys matching a non-ANN predicate clause, in ascending PK
    /// order.
    fn match_predicate(&self, predicate: &Predicate) -> Result<Vec<PrimaryKey>, QueryError>;

    /// Every primary key this searcher knows about, used to compute
    /// `!=`/`NOT CONTAINS` complements per spec.md §6.
    fn all_primary_keys(&self) -> Result<Vec<PrimaryKey>, QueryError>;

    /// Nearest-neighbor candidates for an ANN ordering predicate.
    fn ann_candidates(
        &self,
        predicate: &Predicate,
        k: usize,
        ef: usize,
    ) -> Result<Vec<(PrimaryKey, f32)>, QueryError>;
}

/// A cap on how many times an ANN query re-widens its beam while trying to
/// collect enough filtered candidates, so a predicate nothing in the
/// index satisfies can't spin forever.
const MAX_ANN_WIDENINGS: u32 = 20;

/// Runs a [`Plan`] over sorted `Vec<PrimaryKey>` set algebra rather than
/// `posting`'s `SegmentRowId`-keyed iterators, since a query spans
/// multiple segments' disjoint row-id spaces that can only be merged once
/// each searcher has already resolved its matches down to primary keys.
pub struct QueryExecutor<'a> {
    searchers: Vec<&'a dyn Searcher>,
}

impl<'a> QueryExecutor<'a> {
    /// Creates an executor over one memtable live searcher plus one
    /// searcher per restricted SSTable.
    pub fn new(searchers: Vec<&'a dyn Searcher>) -> Self {
        Self { searchers }
    }

    /// Executes `plan`, returning primary keys in ascending order (or, for
    /// an ANN-ordered plan, in descending-score order) with paging and
    /// `LIMIT` applied.
    pub fn execute(&self, plan: &Plan) -> Result<Vec<PrimaryKey>, QueryError> {
        for clause in &plan.clauses {
            self.check_queryable(&clause.predicate.column)?;
        }
        if let Some(ann) = &plan.order_by_ann {
            self.check_queryable(&ann.column)?;
        }

        let mut allowed: Option<Vec<PrimaryKey>> = None;
        for clause in &plan.clauses {
            if !clause.verified {
                // ALLOW FILTERING downgrade: SAI imposes no restriction,
                // the host post-filters this clause itself.
                continue;
            }
            let matches = self.match_clause(&clause.predicate)?;
            allowed = Some(match allowed {
                None => matches,
                Some(existing) => intersect_sorted(&existing, &matches),
            });
        }

        let mut rows = if let Some(ann) = &plan.order_by_ann {
            self.execute_ann(ann, plan.limit.unwrap_or(usize::MAX).max(1), allowed.as_deref())?
        } else {
            let mut rows = allowed.unwrap_or_default();
            rows.sort();
            rows
        };

        if !plan.is_ann_ordered() {
            if let Some(after) = &plan.after {
                rows.retain(|pk| pk > after);
            }
        }
        if let Some(limit) = plan.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    fn check_queryable(&self, column: &str) -> Result<(), QueryError> {
        if self.searchers.iter().all(|s| s.is_queryable(column)) {
            Ok(())
        } else {
            Err(QueryError::NotQueryable(column.to_string()))
        }
    }

    fn match_clause(&self, predicate: &Predicate) -> Result<Vec<PrimaryKey>, QueryError> {
        if matches!(predicate.operator, Operator::NotEq) {
            return self.match_not_eq(predicate);
        }
        let mut union: Vec<PrimaryKey> = Vec::new();
        for searcher in &self.searchers {
            union = union_sorted(&union, &searcher.match_predicate(predicate)?);
        }
        Ok(union)
    }

    /// `!=`/`NOT CONTAINS` via complement: union every searcher's exact
    /// matches, union every searcher's full PK universe, subtract.
    fn match_not_eq(&self, predicate: &Predicate) -> Result<Vec<PrimaryKey>, QueryError> {
        let positive = Predicate {
            operator: Operator::Eq,
            ..predicate.clone()
        };
        let mut excluded: Vec<PrimaryKey> = Vec::new();
        let mut universe: Vec<PrimaryKey> = Vec::new();
        for searcher in &self.searchers {
            excluded = union_sorted(&excluded, &searcher.match_predicate(&positive)?);
            universe = union_sorted(&universe, &searcher.all_primary_keys()?);
        }
        Ok(difference_sorted(&universe, &excluded))
    }

    /// Filter-then-sort ANN (spec.md §4.4): widens the beam across every
    /// searcher until `limit` candidates pass `allowed` (if any) or no
    /// searcher has more to give.
    fn execute_ann(
        &self,
        predicate: &Predicate,
        limit: usize,
        allowed: Option<&[PrimaryKey]>,
    ) -> Result<Vec<PrimaryKey>, QueryError> {
        if !matches!(&predicate.value, PredicateValue::Vector(_)) {
            return Err(QueryError::UnsupportedOperator {
                column: predicate.column.clone(),
                operator: predicate.operator,
            });
        }

        let mut ef = limit;
        let mut best: HashMap<PrimaryKey, f32> = HashMap::new();
        let mut previous_len = 0;
        for _ in 0..MAX_ANN_WIDENINGS {
            best.clear();
            for searcher in &self.searchers {
                for (pk, score) in searcher.ann_candidates(predicate, limit, ef)? {
                    if let Some(filter) = allowed {
                        if filter.binary_search(&pk).is_err() {
                            continue;
                        }
                    }
                    best.entry(pk)
                        .and_modify(|existing| {
                            if score > *existing {
                                *existing = score;
                            }
                        })
                        .or_insert(score);
                }
            }
            if best.len() >= limit || best.len() == previous_len {
                break;
            }
            previous_len = best.len();
            ef = ef.saturating_mul(2);
        }

        let mut ranked: Vec<(PrimaryKey, f32)> = best.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(limit);
        Ok(ranked.into_iter().map(|(pk, _)| pk).collect())
    }
}

fn intersect_sorted(a: &[PrimaryKey], b: &[PrimaryKey]) -> Vec<PrimaryKey> {
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::new();
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                out.push(a[i].clone());
                i += 1;
                j += 1;
            }
        }
    }
    out
}

fn union_sorted(a: &[PrimaryKey], b: &[PrimaryKey]) -> Vec<PrimaryKey> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => {
                out.push(a[i].clone());
                i += 1;
            }
            Ordering::Greater => {
                out.push(b[j].clone());
                j += 1;
            }
            Ordering::Equal => {
                out.push(a[i].clone());
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

fn difference_sorted(universe: &[PrimaryKey], excluded: &[PrimaryKey]) -> Vec<PrimaryKey> {
    universe.iter().filter(|pk| excluded.binary_search(pk).is_err()).cloned().collect()
}
