//! Primary-key representation and the per-SSTable PK ↔ `segment_row_id` map.
//!
//! A [`PrimaryKey`] is opaque to SAI except that it orders, and that within
//! one SSTable it maps bijectively onto a dense `segment_row_id ∈ [0, N)`
//! (spec.md §3). [`PrimaryKeyMap`] is built once per segment during a build
//! and is read-only thereafter, mirroring the teacher's
//! `sstable::SSTableIndexEntry` list: a sorted array searched
//! by binary search, not a pointer-chasing structure.

use thiserror::Error;

/// A dense row identifier within one SSTable index segment.
pub type SegmentRowId = u32;

/// Errors raised while building or querying a [`PrimaryKeyMap`].
#[derive(Debug, Error)]
pub enum PrimaryKeyError {
    /// `row_id` passed to [`PrimaryKeyMap::primary_key`] is out of bounds.
    #[error("row id {0} out of bounds for segment of size {1}")]
    RowIdOutOfBounds(SegmentRowId, usize),

    /// Rows were inserted out of order; the map requires ascending PKs
    /// (the host feeds rows in partition/clustering order during a build).
    #[error("primary keys must be inserted in ascending order")]
    OutOfOrderInsert,
}

/// `(token, partition_key_bytes, clustering_bytes)` — ordered, hashable,
/// opaque to SAI beyond its `Ord` implementation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrimaryKey {
    /// Host-computed partition-key hash used for token-range filtering.
    pub token: i64,
    /// Raw partition key bytes.
    pub partition_key: Vec<u8>,
    /// Raw clustering key bytes (empty for tables without clustering columns).
    pub clustering: Vec<u8>,
}

impl PrimaryKey {
    /// Constructs a new primary key tuple.
    pub fn new(token: i64, partition_key: impl Into<Vec<u8>>, clustering: impl Into<Vec<u8>>) -> Self {
        Self {
            token,
            partition_key: partition_key.into(),
            clustering: clustering.into(),
        }
    }
}

/// Bidirectional map between [`PrimaryKey`] and [`SegmentRowId`] for one
/// SSTable index segment.
///
/// Built once, append-only, read-only thereafter — the same immutability
/// contract the teacher gives its `sstable::SSTable`.
#[derive(Debug, Default)]
pub struct PrimaryKeyMap {
    /// Row `i` is `keys[i]`; rows are in ascending PK order by construction.
    keys: Vec<PrimaryKey>,
}

impl PrimaryKeyMap {
    /// Creates an empty map ready to be filled during a segment build.
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Appends the next row. Must be called in ascending PK order; the
    /// returned row id is `keys.len() - 1` immediately after insertion.
    pub fn push(&mut self, pk: PrimaryKey) -> Result<SegmentRowId, PrimaryKeyError> {
        if let Some(last) = self.keys.last() {
            if pk <= *last {
                return Err(PrimaryKeyError::OutOfOrderInsert);
            }
        }
        let id = self.keys.len() as SegmentRowId;
        self.keys.push(pk);
        Ok(id)
    }

    /// Number of rows in this segment.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether this segment is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Resolves a `segment_row_id` to its primary key.
    pub fn primary_key(&self, row_id: SegmentRowId) -> Result<&PrimaryKey, PrimaryKeyError> {
        self.keys
            .get(row_id as usize)
            .ok_or(PrimaryKeyError::RowIdOutOfBounds(row_id, self.keys.len()))
    }

    /// Resolves a primary key to its `segment_row_id`, if present in this
    /// segment.
    pub fn row_id(&self, pk: &PrimaryKey) -> Option<SegmentRowId> {
        self.keys.binary_search(pk).ok().map(|i| i as SegmentRowId)
    }

    /// Returns the smallest row id whose PK falls within `[start, end)`
    /// (the lower bound of a token/partition range), suitable for driving
    /// a [`crate::posting::RangeFilter`].
    pub fn row_ids_in_range(&self, start: &PrimaryKey, end: &PrimaryKey) -> std::ops::Range<usize> {
        let lo = self.keys.partition_point(|pk| pk < start);
        let hi = self.keys.partition_point(|pk| pk < end);
        lo..hi
    }

    /// Whether `row_id`'s PK falls within `[start, end)`. Used by
    /// [`crate::posting::RangeFilter`] to drop ids outside a token range.
    pub fn in_range(&self, row_id: SegmentRowId, start: &PrimaryKey, end: &PrimaryKey) -> bool {
        match self.primary_key(row_id) {
            Ok(pk) => pk >= start && pk < end,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pk(token: i64, n: u8) -> PrimaryKey {
        PrimaryKey::new(token, vec![n], vec![])
    }

    #[test]
    fn push_assigns_dense_ascending_ids() {
        let mut map = PrimaryKeyMap::new();
        assert_eq!(map.push(pk(1, 1)).unwrap(), 0);
        assert_eq!(map.push(pk(2, 2)).unwrap(), 1);
        assert_eq!(map.push(pk(3, 3)).unwrap(), 2);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn rejects_out_of_order_insert() {
        let mut map = PrimaryKeyMap::new();
        map.push(pk(5, 5)).unwrap();
        let err = map.push(pk(1, 1)).unwrap_err();
        assert!(matches!(err, PrimaryKeyError::OutOfOrderInsert));
    }

    #[test]
    fn round_trips_row_id_and_pk() {
        let mut map = PrimaryKeyMap::new();
        let a = pk(1, 1);
        let b = pk(2, 2);
        map.push(a.clone()).unwrap();
        map.push(b.clone()).unwrap();

        assert_eq!(map.primary_key(0).unwrap(), &a);
        assert_eq!(map.row_id(&b), Some(1));
    }

    #[test]
    fn row_id_out_of_bounds_is_typed_error() {
        let map = PrimaryKeyMap::new();
        let err = map.primary_key(0).unwrap_err();
        assert!(matches!(err, PrimaryKeyError::RowIdOutOfBounds(0, 0)));
    }

    #[test]
    fn range_query_matches_partition_point() {
        let mut map = PrimaryKeyMap::new();
        for i in 0..10u8 {
            map.push(pk(i as i64, i)).unwrap();
        }
        let start = pk(3, 3);
        let end = pk(7, 7);
        let range = map.row_ids_in_range(&start, &end);
        assert_eq!(range, 3..7);
    }
}
