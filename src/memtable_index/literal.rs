//! Live literal index: a byte-comparable sorted map from term to the set
//! of primary keys that currently produce it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use crate::literal::LiteralIndexWriter;
use crate::pk::{PrimaryKey, PrimaryKeyMap};

use super::MemtableIndexError;

#[derive(Default)]
struct Inner {
    terms: BTreeMap<Vec<u8>, BTreeSet<PrimaryKey>>,
}

/// One column's live literal index for one memtable.
///
/// Writes are acked synchronously: `add`/`remove` return once the
/// in-memory map has been updated, mirroring the teacher's WAL-then-apply
/// `Memtable::put` except there is no WAL here — durability for the live
/// index rides on the host's own memtable WAL (spec.md §4.6).
#[derive(Default)]
pub struct LiteralLiveIndex {
    inner: RwLock<Inner>,
}

impl LiteralLiveIndex {
    /// Creates an empty live index.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, MemtableIndexError> {
        self.inner.read().map_err(|_| MemtableIndexError::Poisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, MemtableIndexError> {
        self.inner.write().map_err(|_| MemtableIndexError::Poisoned)
    }

    /// Records that `pk` currently produces `term`.
    pub fn add(&self, term: Vec<u8>, pk: PrimaryKey) -> Result<(), MemtableIndexError> {
        let mut guard = self.write()?;
        guard.terms.entry(term).or_default().insert(pk);
        Ok(())
    }

    /// Removes `pk` from `term`'s posting set (an overwrite or delete
    /// invalidated the old value). A no-op if `pk` never produced `term`.
    pub fn remove(&self, term: &[u8], pk: &PrimaryKey) -> Result<(), MemtableIndexError> {
        let mut guard = self.write()?;
        if let Some(set) = guard.terms.get_mut(term) {
            set.remove(pk);
            if set.is_empty() {
                guard.terms.remove(term);
            }
        }
        Ok(())
    }

    /// Primary keys that currently produce `term`, in ascending order.
    pub fn exact_match(&self, term: &[u8]) -> Result<Vec<PrimaryKey>, MemtableIndexError> {
        let guard = self.read()?;
        Ok(guard.terms.get(term).map(|s| s.iter().cloned().collect()).unwrap_or_default())
    }

    /// Primary keys that produce any term in `[start, end)`, in ascending
    /// PK order (duplicates across terms collapsed).
    pub fn range_match(&self, start: &[u8], end: &[u8]) -> Result<Vec<PrimaryKey>, MemtableIndexError> {
        let guard = self.read()?;
        let mut out: BTreeSet<PrimaryKey> = BTreeSet::new();
        for (_, set) in guard.terms.range(start.to_vec()..end.to_vec()) {
            out.extend(set.iter().cloned());
        }
        Ok(out.into_iter().collect())
    }

    /// Every primary key currently producing any term, deduplicated and in
    /// ascending order.
    pub fn all_primary_keys(&self) -> Result<Vec<PrimaryKey>, MemtableIndexError> {
        let guard = self.read()?;
        let mut out: BTreeSet<PrimaryKey> = BTreeSet::new();
        for set in guard.terms.values() {
            out.extend(set.iter().cloned());
        }
        Ok(out.into_iter().collect())
    }

    /// Number of distinct terms currently live.
    pub fn len(&self) -> Result<usize, MemtableIndexError> {
        Ok(self.read()?.terms.len())
    }

    /// Whether the live index holds no terms.
    pub fn is_empty(&self) -> Result<bool, MemtableIndexError> {
        Ok(self.read()?.terms.is_empty())
    }

    /// Feeds every `(term, row)` pair into a fresh [`LiteralIndexWriter`]
    /// in term order, resolving each live `PrimaryKey` to its flush-time
    /// `segment_row_id` via `pk_map` — the "in-memory structure seeds the
    /// segment writer" path spec.md §4.6 describes for memtable flush.
    pub fn seed_writer(&self, pk_map: &PrimaryKeyMap) -> Result<LiteralIndexWriter, MemtableIndexError> {
        let guard = self.read()?;
        let mut writer = LiteralIndexWriter::new();
        for (term, pks) in &guard.terms {
            let mut rows: Vec<_> = pks
                .iter()
                .map(|pk| pk_map.row_id(pk).ok_or(MemtableIndexError::UnknownPrimaryKey))
                .collect::<Result<Vec<_>, _>>()?;
            rows.sort_unstable();
            for row in rows {
                writer.add(term.clone(), row)?;
            }
        }
        Ok(writer)
    }
}
