//! Live numeric index: a sorted multimap from byte-comparable key to the
//! set of primary keys currently holding it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use crate::numeric::NumericIndexWriter;
use crate::pk::{PrimaryKey, PrimaryKeyMap};

use super::MemtableIndexError;

#[derive(Default)]
struct Inner {
    points: BTreeMap<Vec<u8>, BTreeSet<PrimaryKey>>,
}

/// One column's live numeric index for one memtable. Keys are the same
/// fixed-width byte-comparable encoding [`crate::numeric::pack::NumericValue`]
/// produces, so live and on-disk lookups compare identically.
#[derive(Default)]
pub struct NumericLiveIndex {
    inner: RwLock<Inner>,
}

impl NumericLiveIndex {
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

    /// Records that `pk` currently holds `key`.
    pub fn add(&self, key: Vec<u8>, pk: PrimaryKey) -> Result<(), MemtableIndexError> {
        let mut guard = self.write()?;
        guard.points.entry(key).or_default().insert(pk);
        Ok(())
    }

    /// Removes `pk` from `key`'s set (an overwrite or delete invalidated
    /// the old value).
    pub fn remove(&self, key: &[u8], pk: &PrimaryKey) -> Result<(), MemtableIndexError> {
        let mut guard = self.write()?;
        if let Some(set) = guard.points.get_mut(key) {
            set.remove(pk);
            if set.is_empty() {
                guard.points.remove(key);
            }
        }
        Ok(())
    }

    /// Primary keys currently holding exactly `key`, in ascending PK
    /// order.
    pub fn exact_match(&self, key: &[u8]) -> Result<Vec<PrimaryKey>, MemtableIndexError> {
        let guard = self.read()?;
        Ok(guard.points.get(key).map(|s| s.iter().cloned().collect()).unwrap_or_default())
    }

    /// Primary keys whose value falls within `[start, end)`, in ascending
    /// PK order.
    pub fn range_query(&self, start: &[u8], end: &[u8]) -> Result<Vec<PrimaryKey>, MemtableIndexError> {
        let guard = self.read()?;
        let mut out: BTreeSet<PrimaryKey> = BTreeSet::new();
        for (_, set) in guard.points.range(start.to_vec()..end.to_vec()) {
            out.extend(set.iter().cloned());
        }
        Ok(out.into_iter().collect())
    }

    /// Every primary key currently holding any value, deduplicated and in
    /// ascending order.
    pub fn all_primary_keys(&self) -> Result<Vec<PrimaryKey>, MemtableIndexError> {
        let guard = self.read()?;
        let mut out: BTreeSet<PrimaryKey> = BTreeSet::new();
        for set in guard.points.values() {
            out.extend(set.iter().cloned());
        }
        Ok(out.into_iter().collect())
    }

    /// Number of distinct keys currently live.
    pub fn len(&self) -> Result<usize, MemtableIndexError> {
        Ok(self.read()?.points.len())
    }

    /// Whether the live index holds no points.
    pub fn is_empty(&self) -> Result<bool, MemtableIndexError> {
        Ok(self.read()?.points.is_empty())
    }

    /// Feeds every `(key, row)` point into a fresh [`NumericIndexWriter`],
    /// resolving each live `PrimaryKey` to its flush-time `segment_row_id`
    /// via `pk_map`.
    pub fn seed_writer(
        &self,
        width: usize,
        max_points_in_leaf_node: usize,
        pk_map: &PrimaryKeyMap,
    ) -> Result<NumericIndexWriter, MemtableIndexError> {
        let guard = self.read()?;
        let mut writer = NumericIndexWriter::new(width, max_points_in_leaf_node);
        for (key, pks) in &guard.points {
            for pk in pks {
                let row = pk_map.row_id(pk).ok_or(MemtableIndexError::UnknownPrimaryKey)?;
                writer.add(key.clone(), row)?;
            }
        }
        Ok(writer)
    }
}
