//! Live vector index: the same [`IncrementalGraph`] the on-disk ANN
//! segment uses (§4.4), queried and mutated directly while the memtable is
//! open (spec.md §4.6, §9: "use a concurrent graph structure... deletions
//! are logical until flush" — here realized as one `RwLock`-guarded graph
//! rather than a lock-free structure, matching the teacher's single-lock
//! `Memtable` rather than introducing epoch reclamation this crate has no
//! other use for).
//!
//! [`IncrementalGraph`] is keyed by [`SegmentRowId`], but a memtable has no
//! dense row numbering yet, so this module keeps a small
//! `PrimaryKey -> (row, vector)` map scoped to this one column's live
//! graph, used only to resolve search hits back to primary keys and to
//! re-feed live vectors at flush time.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::config::SimilarityFunction;
use crate::pk::{PrimaryKey, PrimaryKeyMap, SegmentRowId};
use crate::vector::graph::{GraphParams, IncrementalGraph};
use crate::vector::VectorIndexWriter;

use super::MemtableIndexError;

struct Inner {
    graph: IncrementalGraph,
    keys: Vec<PrimaryKey>,
    vectors: Vec<Vec<f32>>,
    live: HashMap<PrimaryKey, SegmentRowId>,
}

/// One column's live vector index for one memtable.
pub struct VectorLiveIndex {
    inner: RwLock<Inner>,
}

impl VectorLiveIndex {
    /// Creates an empty live index using the column's configured graph
    /// parameters and similarity function.
    pub fn new(params: GraphParams, similarity: SimilarityFunction) -> Self {
        Self {
            inner: RwLock::new(Inner {
                graph: IncrementalGraph::new(params, similarity),
                keys: Vec::new(),
                vectors: Vec::new(),
                live: HashMap::new(),
            }),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, MemtableIndexError> {
        self.inner.read().map_err(|_| MemtableIndexError::Poisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, MemtableIndexError> {
        self.inner.write().map_err(|_| MemtableIndexError::Poisoned)
    }

    /// Inserts `vector` for `pk`, allocating a fresh local row id the
    /// first time this PK is seen in this column. A PK seen again (its
    /// value overwritten) tombstones its previous node before reinserting,
    /// since [`IncrementalGraph::insert`] only dedups bit-identical
    /// vectors, not "this row's previous vector."
    pub fn add(&self, vector: Vec<f32>, pk: PrimaryKey) -> Result<(), MemtableIndexError> {
        let mut guard = self.write()?;
        if let Some(&row) = guard.live.get(&pk) {
            guard.graph.delete(row);
            guard.vectors[row as usize] = vector.clone();
            guard.graph.insert(vector, row)?;
            return Ok(());
        }
        let row = guard.keys.len() as SegmentRowId;
        guard.keys.push(pk.clone());
        guard.vectors.push(vector.clone());
        guard.live.insert(pk, row);
        guard.graph.insert(vector, row)?;
        Ok(())
    }

    /// Logically removes `pk`'s vector (tombstoned, not physically
    /// deleted, so graph connectivity survives — spec.md §9). A re-`add`
    /// of the same PK afterward allocates a fresh row.
    pub fn remove(&self, pk: &PrimaryKey) -> Result<bool, MemtableIndexError> {
        let mut guard = self.write()?;
        match guard.live.remove(pk) {
            Some(row) => Ok(guard.graph.delete(row)),
            None => Ok(false),
        }
    }

    /// Searches the live graph for the `k` nearest neighbors of `query`,
    /// returning primary keys in descending-score order.
    pub fn search(&self, query: &[f32], k: usize, ef: usize) -> Result<Vec<(PrimaryKey, f32)>, MemtableIndexError> {
        let guard = self.read()?;
        let hits = guard.graph.search(query, k, ef, None)?;
        let mut out = Vec::with_capacity(hits.len());
        for (ordinal, score) in hits {
            for &row in guard.graph.rows(ordinal) {
                if let Some(pk) = guard.keys.get(row as usize) {
                    out.push((pk.clone(), score));
                }
            }
        }
        Ok(out)
    }

    /// Every primary key with a currently-live vector, in ascending order.
    pub fn all_primary_keys(&self) -> Result<Vec<PrimaryKey>, MemtableIndexError> {
        let guard = self.read()?;
        let mut out: Vec<PrimaryKey> = guard.live.keys().cloned().collect();
        out.sort();
        Ok(out)
    }

    /// Number of live (non-tombstoned) vector nodes.
    pub fn len(&self) -> Result<usize, MemtableIndexError> {
        Ok(self.read()?.graph.len())
    }

    /// Whether the live graph holds no nodes.
    pub fn is_empty(&self) -> Result<bool, MemtableIndexError> {
        Ok(self.read()?.graph.is_empty())
    }

    /// Feeds every currently-live `(vector, row)` pair into a fresh
    /// [`VectorIndexWriter`], resolving this column's local row ids to
    /// flush-time `segment_row_id`s via `pk_map`. Tombstoned PKs are
    /// dropped, matching spec.md §9's "deletions are logical until flush."
    pub fn seed_writer(
        &self,
        params: GraphParams,
        similarity: SimilarityFunction,
        pk_map: &PrimaryKeyMap,
    ) -> Result<VectorIndexWriter, MemtableIndexError> {
        let guard = self.read()?;
        let mut writer = VectorIndexWriter::new(params, similarity);
        for (pk, &local_row) in &guard.live {
            let vector = guard.vectors[local_row as usize].clone();
            let row = pk_map.row_id(pk).ok_or(MemtableIndexError::UnknownPrimaryKey)?;
            writer.add(vector, row)?;
        }
        Ok(writer)
    }
}
