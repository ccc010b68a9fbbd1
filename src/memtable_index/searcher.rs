//! Concrete [`Searcher`] over one memtable's live indexes, one per
//! touched column — the "for the memtable, open the live searcher" step
//! spec.md §4.7 describes.

use std::collections::HashMap;

use crate::pk::PrimaryKey;
use crate::query::{Operator, Predicate, PredicateValue, QueryError, Searcher};

use super::{LiteralLiveIndex, NumericLiveIndex, VectorLiveIndex};

/// One column's live index, tagged by kind.
pub enum MemtableColumnIndex<'a> {
    /// Live literal term map.
    Literal(&'a LiteralLiveIndex),
    /// Live numeric point map.
    Numeric(&'a NumericLiveIndex),
    /// Live ANN graph.
    Vector(&'a VectorLiveIndex),
}

/// A [`Searcher`] over one memtable's live indexes.
///
/// `all_primary_keys` unions every column's currently-indexed primary keys
/// rather than the memtable's full key set (SAI tracks no independent row
/// registry for an open memtable — that's the host's WAL/skip-list's job).
/// A row whose every indexed column is null is consequently invisible to
/// the `!=`/`NOT CONTAINS` complement until flush; this mirrors the fact
/// that such a row contributes no term to any live index in the first
/// place.
pub struct MemtableSearcher<'a> {
    columns: HashMap<String, MemtableColumnIndex<'a>>,
}

impl<'a> MemtableSearcher<'a> {
    /// Wraps `columns` (one live index per column this query touches) as a
    /// searcher.
    pub fn new(columns: HashMap<String, MemtableColumnIndex<'a>>) -> Self {
        Self { columns }
    }
}

impl<'a> Searcher for MemtableSearcher<'a> {
    fn is_queryable(&self, _column: &str) -> bool {
        true
    }

    fn match_predicate(&self, predicate: &Predicate) -> Result<Vec<PrimaryKey>, QueryError> {
        let Some(index) = self.columns.get(&predicate.column) else {
            return Ok(Vec::new());
        };

        match (index, &predicate.value, predicate.operator) {
            (
                MemtableColumnIndex::Literal(index),
                PredicateValue::Single(term),
                Operator::Eq | Operator::Contains | Operator::ContainsKey,
            ) => Ok(index.exact_match(term)?),
            (MemtableColumnIndex::Literal(index), PredicateValue::Entry(key, value), Operator::EntryEq) => {
                let mut term = key.clone();
                term.extend_from_slice(value);
                Ok(index.exact_match(&term)?)
            }
            (MemtableColumnIndex::Literal(index), PredicateValue::Range(start, end), Operator::Range) => {
                Ok(index.range_match(start, end)?)
            }
            (MemtableColumnIndex::Numeric(index), PredicateValue::Single(key), Operator::Eq) => {
                Ok(index.exact_match(key)?)
            }
            (MemtableColumnIndex::Numeric(index), PredicateValue::Range(start, end), Operator::Range) => {
                Ok(index.range_query(start, end)?)
            }
            _ => Err(QueryError::UnsupportedOperator {
                column: predicate.column.clone(),
                operator: predicate.operator,
            }),
        }
    }

    fn all_primary_keys(&self) -> Result<Vec<PrimaryKey>, QueryError> {
        let mut out: Vec<PrimaryKey> = Vec::new();
        for index in self.columns.values() {
            let keys = match index {
                MemtableColumnIndex::Literal(index) => index.all_primary_keys()?,
                MemtableColumnIndex::Numeric(index) => index.all_primary_keys()?,
                MemtableColumnIndex::Vector(index) => index.all_primary_keys()?,
            };
            out.extend(keys);
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    fn ann_candidates(
        &self,
        predicate: &Predicate,
        k: usize,
        ef: usize,
    ) -> Result<Vec<(PrimaryKey, f32)>, QueryError> {
        let Some(MemtableColumnIndex::Vector(index)) = self.columns.get(&predicate.column) else {
            return Ok(Vec::new());
        };
        let PredicateValue::Vector(query) = &predicate.value else {
            return Err(QueryError::UnsupportedOperator {
                column: predicate.column.clone(),
                operator: predicate.operator,
            });
        };
        Ok(index.search(query, k, ef)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CollectionVariant, IndexedColumnKind, SimilarityFunction};
    use crate::vector::graph::GraphParams;

    fn pk(token: i64, n: u8) -> PrimaryKey {
        PrimaryKey::new(token, vec![n], vec![])
    }

    #[test]
    fn matches_literal_eq_against_live_index() {
        let literal = LiteralLiveIndex::new();
        literal.add(b"camel".to_vec(), pk(1, 1)).unwrap();

        let mut columns = HashMap::new();
        columns.insert("name".to_string(), MemtableColumnIndex::Literal(&literal));
        let searcher = MemtableSearcher::new(columns);

        let predicate = Predicate {
            column: "name".into(),
            kind: IndexedColumnKind::Literal,
            collection: CollectionVariant::None,
            operator: Operator::Eq,
            value: PredicateValue::Single(b"camel".to_vec()),
        };
        assert_eq!(searcher.match_predicate(&predicate).unwrap(), vec![pk(1, 1)]);
    }

    #[test]
    fn unknown_column_yields_no_matches() {
        let searcher = MemtableSearcher::new(HashMap::new());
        let predicate = Predicate {
            column: "missing".into(),
            kind: IndexedColumnKind::Literal,
            collection: CollectionVariant::None,
            operator: Operator::Eq,
            value: PredicateValue::Single(b"x".to_vec()),
        };
        assert!(searcher.match_predicate(&predicate).unwrap().is_empty());
    }

    #[test]
    fn all_primary_keys_unions_across_columns() {
        let literal = LiteralLiveIndex::new();
        literal.add(b"a".to_vec(), pk(1, 1)).unwrap();
        let vector = VectorLiveIndex::new(GraphParams::default(), SimilarityFunction::Cosine);
        vector.add(vec![1.0, 0.0], pk(2, 2)).unwrap();

        let mut columns = HashMap::new();
        columns.insert("name".to_string(), MemtableColumnIndex::Literal(&literal));
        columns.insert("emb".to_string(), MemtableColumnIndex::Vector(&vector));
        let searcher = MemtableSearcher::new(columns);

        assert_eq!(searcher.all_primary_keys().unwrap(), vec![pk(1, 1), pk(2, 2)]);
    }

    #[test]
    fn ann_candidates_reads_from_vector_column() {
        let vector = VectorLiveIndex::new(GraphParams::default(), SimilarityFunction::Cosine);
        vector.add(vec![1.0, 0.0], pk(1, 1)).unwrap();

        let mut columns = HashMap::new();
        columns.insert("emb".to_string(), MemtableColumnIndex::Vector(&vector));
        let searcher = MemtableSearcher::new(columns);

        let predicate = Predicate {
            column: "emb".into(),
            kind: IndexedColumnKind::Vector,
            collection: CollectionVariant::None,
            operator: Operator::AnnOrderBy,
            value: PredicateValue::Vector(vec![1.0, 0.0]),
        };
        let hits = searcher.ann_candidates(&predicate, 1, 10).unwrap();
        assert_eq!(hits[0].0, pk(1, 1));
    }
}
