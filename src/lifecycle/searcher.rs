//! Concrete [`Searcher`] over one SSTable's already-opened per-column
//! segment readers, joined against that SSTable's shared primary-key
//! layout — the "for each restricted SSTable, open searchers for the
//! touched segments" step spec.md §4.7 describes.

use std::collections::HashMap;

use crate::literal::reader::LiteralIndexReader;
use crate::numeric::bkd::NumericIndexReader;
use crate::pk::{PrimaryKey, SegmentRowId};
use crate::posting::PostingIterator;
use crate::query::{Operator, Predicate, PredicateValue, QueryError, Searcher};
use crate::segment::layout::PrimaryKeyLayoutReader;
use crate::vector::VectorIndexReader;

use super::QueryabilityRegistry;

/// One column's opened on-disk reader, tagged by index kind.
pub enum SegmentColumnReader<'a> {
    /// Trie/term dictionary reader.
    Literal(LiteralIndexReader<'a>),
    /// Block KD-tree reader.
    Numeric(NumericIndexReader),
    /// ANN graph reader.
    Vector(VectorIndexReader),
}

/// A [`Searcher`] over one SSTable index segment: its shared primary-key
/// layout plus whichever per-column readers were opened for the columns
/// this query touches. A column absent from `columns` means "index absent
/// for this SSTable" (spec.md §4.5) — not an error, just no matches.
pub struct SegmentSearcher<'a> {
    sstable_id: u64,
    pk_layout: &'a PrimaryKeyLayoutReader,
    columns: HashMap<String, SegmentColumnReader<'a>>,
    registry: &'a QueryabilityRegistry,
}

impl<'a> SegmentSearcher<'a> {
    /// Wraps `pk_layout` and `columns` as a searcher for SSTable
    /// `sstable_id`, consulting `registry` for per-column queryability.
    pub fn new(
        sstable_id: u64,
        pk_layout: &'a PrimaryKeyLayoutReader,
        columns: HashMap<String, SegmentColumnReader<'a>>,
        registry: &'a QueryabilityRegistry,
    ) -> Self {
        Self {
            sstable_id,
            pk_layout,
            columns,
            registry,
        }
    }

    fn drain_rows(&self, mut iter: impl PostingIterator) -> Result<Vec<PrimaryKey>, QueryError> {
        let mut rows = Vec::new();
        loop {
            let row = iter.next()?;
            if row == crate::posting::END_OF_STREAM {
                break;
            }
            rows.push(row);
        }
        self.resolve(&rows)
    }

    fn resolve(&self, rows: &[SegmentRowId]) -> Result<Vec<PrimaryKey>, QueryError> {
        rows.iter()
            .map(|&row| Ok(self.pk_layout.primary_key(row)?))
            .collect()
    }
}

impl<'a> Searcher for SegmentSearcher<'a> {
    fn is_queryable(&self, column: &str) -> bool {
        self.registry.is_queryable(self.sstable_id, column).unwrap_or(false)
    }

    fn match_predicate(&self, predicate: &Predicate) -> Result<Vec<PrimaryKey>, QueryError> {
        let Some(reader) = self.columns.get(&predicate.column) else {
            return Ok(Vec::new());
        };

        match (reader, &predicate.value, predicate.operator) {
            (
                SegmentColumnReader::Literal(reader),
                PredicateValue::Single(term),
                Operator::Eq | Operator::Contains | Operator::ContainsKey,
            ) => match reader.exact_match(term)? {
                Some(postings) => self.drain_rows(postings),
                None => Ok(Vec::new()),
            },
            (SegmentColumnReader::Literal(reader), PredicateValue::Entry(key, value), Operator::EntryEq) => {
                let mut term = key.clone();
                term.extend_from_slice(value);
                match reader.exact_match(&term)? {
                    Some(postings) => self.drain_rows(postings),
                    None => Ok(Vec::new()),
                }
            }
            (SegmentColumnReader::Literal(reader), PredicateValue::Range(start, end), Operator::Range) => {
                self.drain_rows(reader.range_match(start, Some(end))?)
            }
            (SegmentColumnReader::Numeric(reader), PredicateValue::Single(key), Operator::Eq) => {
                self.drain_rows(reader.range_query(key, key)?)
            }
            (SegmentColumnReader::Numeric(reader), PredicateValue::Range(start, end), Operator::Range) => {
                self.drain_rows(reader.range_query(start, end)?)
            }
            _ => Err(QueryError::UnsupportedOperator {
                column: predicate.column.clone(),
                operator: predicate.operator,
            }),
        }
    }

    fn all_primary_keys(&self) -> Result<Vec<PrimaryKey>, QueryError> {
        (0..self.pk_layout.len() as SegmentRowId)
            .map(|row| Ok(self.pk_layout.primary_key(row)?))
            .collect()
    }

    fn ann_candidates(
        &self,
        predicate: &Predicate,
        k: usize,
        ef: usize,
    ) -> Result<Vec<(PrimaryKey, f32)>, QueryError> {
        let Some(SegmentColumnReader::Vector(reader)) = self.columns.get(&predicate.column) else {
            return Ok(Vec::new());
        };
        let PredicateValue::Vector(query) = &predicate.value else {
            return Err(QueryError::UnsupportedOperator {
                column: predicate.column.clone(),
                operator: predicate.operator,
            });
        };

        let hits = reader.search(query, k, ef, None)?;
        let mut out = Vec::with_capacity(hits.len());
        for (ordinal, score) in hits {
            for &row in reader.rows(ordinal) {
                out.push((self.pk_layout.primary_key(row)?, score));
            }
        }
        Ok(out)
    }
}
