//! Column index lifecycle: descriptors, initial-build task grouping,
//! interruption cleanup, and the queryability registry that tracks which
//! `(sstable, column)` pairs survived their last build or open (spec.md
//! §3 "Entity lifecycles", §4.5, §7 class 3/4).
//!
//! Grounded on `src/manifest/mod.rs`'s `Mutex`-guarded metadata-authority
//! shape, adapted from durable WAL+snapshot state (SAI owns no WAL; the
//! host's own WAL already covers durability, per spec.md §1) to a plain
//! in-memory registry scoped to the lifetime of one index engine instance
//! — no ambient singleton, unlike a `static` registry would be.

pub mod searcher;

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ColumnIndexOptions, ConfigError};
use crate::segment::builder::purge_column;
use crate::segment::layout::purge_group;
use crate::segment::SegmentError;

/// Errors raised while managing column index lifecycle state.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// No column index descriptor exists with this name.
    #[error("no column index named `{0}`")]
    UnknownColumn(String),

    /// `create` was called for a column that already has a descriptor.
    #[error("column index `{0}` already exists")]
    AlreadyExists(String),

    /// A lock guarding lifecycle state was poisoned by a panicking holder.
    #[error("lifecycle state lock poisoned")]
    Poisoned,

    /// DDL option validation failed at `CREATE CUSTOM INDEX` time (spec.md
    /// §7 class 1).
    #[error("index option validation failed: {0}")]
    Config(#[from] ConfigError),

    /// A build or cleanup operation failed at the segment layer (spec.md
    /// §7 class 3).
    #[error("segment build error: {0}")]
    Segment(#[from] SegmentError),
}

/// The initial-build state of one column index descriptor, independent of
/// any single SSTable's queryability (tracked separately in
/// [`QueryabilityRegistry`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    /// The background initial build over existing SSTables has not
    /// finished yet.
    InProgress,
    /// The initial build completed; new SSTables are indexed incrementally
    /// from here on.
    Complete,
    /// The initial build failed and no completion marker exists; a
    /// `REBUILD` is required before any query can use this index.
    Failed,
}

/// A user-declared named column index (spec.md §3 "Column index
/// descriptor"). Creation is DDL-validated eagerly; the initial build runs
/// as a separate background step tracked via [`ColumnIndexDescriptor::build_state`].
pub struct ColumnIndexDescriptor {
    /// Index name, as declared in `CREATE CUSTOM INDEX`.
    pub name: String,
    /// Column this index covers.
    pub column: String,
    /// Validated index options.
    pub options: ColumnIndexOptions,
    state: RwLock<BuildState>,
}

impl ColumnIndexDescriptor {
    /// Validates `raw` against `kind`/`collection` and creates a descriptor
    /// whose initial build has not started yet (spec.md §7 class 1: no
    /// side effects until this returns `Ok`).
    pub fn create(
        name: impl Into<String>,
        column: impl Into<String>,
        kind: crate::config::IndexedColumnKind,
        collection: crate::config::CollectionVariant,
        raw: crate::config::RawOptions,
    ) -> Result<Self, LifecycleError> {
        let options = ColumnIndexOptions::validate(kind, collection, raw)?;
        Ok(Self {
            name: name.into(),
            column: column.into(),
            options,
            state: RwLock::new(BuildState::InProgress),
        })
    }

    /// Current initial-build state.
    pub fn build_state(&self) -> Result<BuildState, LifecycleError> {
        self.state.read().map(|s| *s).map_err(|_| LifecycleError::Poisoned)
    }

    /// Marks the initial build complete.
    pub fn mark_build_complete(&self) -> Result<(), LifecycleError> {
        *self.state.write().map_err(|_| LifecycleError::Poisoned)? = BuildState::Complete;
        info!(index = %self.name, column = %self.column, "initial build complete");
        Ok(())
    }

    /// Marks the initial build failed (spec.md §7 class 3).
    pub fn mark_build_failed(&self) -> Result<(), LifecycleError> {
        *self.state.write().map_err(|_| LifecycleError::Poisoned)? = BuildState::Failed;
        warn!(index = %self.name, column = %self.column, "initial build failed, REBUILD required");
        Ok(())
    }

    /// Resets to `InProgress`, the state a `REBUILD` command starts from.
    pub fn mark_rebuild_started(&self) -> Result<(), LifecycleError> {
        *self.state.write().map_err(|_| LifecycleError::Poisoned)? = BuildState::InProgress;
        info!(index = %self.name, column = %self.column, "rebuild started");
        Ok(())
    }

    /// Whether the query planner's index-build gate (spec.md §4.7) should
    /// admit a query against this column at all, independent of any one
    /// SSTable's queryability.
    pub fn is_queryable(&self) -> Result<bool, LifecycleError> {
        Ok(matches!(self.build_state()?, BuildState::Complete))
    }
}

/// In-memory map from `(sstable_id, column)` to queryable/non-queryable,
/// consulted by the planner before a searcher is ever opened for that pair
/// (spec.md §7 class 4, §9 "no ambient singletons" — owned by whatever
/// constructs the index engine, not a global).
#[derive(Default)]
pub struct QueryabilityRegistry {
    non_queryable: Mutex<HashMap<(u64, String), ()>>,
}

impl QueryabilityRegistry {
    /// Creates an empty registry; every `(sstable, column)` pair is
    /// queryable until explicitly downgraded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `(sstable_id, column)` is currently queryable. Absent from
    /// the table means "never downgraded," which is the common case.
    pub fn is_queryable(&self, sstable_id: u64, column: &str) -> Result<bool, LifecycleError> {
        let guard = self.non_queryable.lock().map_err(|_| LifecycleError::Poisoned)?;
        Ok(!guard.contains_key(&(sstable_id, column.to_string())))
    }

    /// Downgrades `(sstable_id, column)` to non-queryable after a
    /// build-time failure or read-time checksum/structural corruption.
    pub fn mark_non_queryable(&self, sstable_id: u64, column: &str) -> Result<(), LifecycleError> {
        let mut guard = self.non_queryable.lock().map_err(|_| LifecycleError::Poisoned)?;
        guard.insert((sstable_id, column.to_string()), ());
        warn!(sstable_id, column, "downgraded to non-queryable");
        Ok(())
    }

    /// Restores `(sstable_id, column)` to queryable after a successful
    /// rebuild reconstructs its components.
    pub fn mark_queryable(&self, sstable_id: u64, column: &str) -> Result<(), LifecycleError> {
        let mut guard = self.non_queryable.lock().map_err(|_| LifecycleError::Poisoned)?;
        guard.remove(&(sstable_id, column.to_string()));
        info!(sstable_id, column, "restored to queryable");
        Ok(())
    }

    /// Every column currently downgraded for any SSTable, for diagnostics
    /// or a recovery sweep.
    pub fn non_queryable_pairs(&self) -> Result<Vec<(u64, String)>, LifecycleError> {
        let guard = self.non_queryable.lock().map_err(|_| LifecycleError::Poisoned)?;
        Ok(guard.keys().cloned().collect())
    }
}

/// One SSTable as input to initial-build grouping: its id and its on-disk
/// byte size.
#[derive(Debug, Clone, Copy)]
pub struct BuildInput {
    /// SSTable identifier.
    pub sstable_id: u64,
    /// Cumulative on-disk size in bytes, used to balance worker load.
    pub size_bytes: u64,
}

/// Groups `inputs` into `parallelism` worker groups with approximately
/// equal total bytes (spec.md §4.5's "grouped to a parallelism target by
/// cumulative on-disk size"), via longest-processing-time-first greedy
/// scheduling: largest inputs assigned first, each to the currently
/// lightest group — the same greedy-balance idea
/// `src/compaction/stcs/mod.rs::bucket_sstables` uses for its running
/// average, adapted from ratio-bucketing to worker-count balancing.
pub fn group_for_initial_build(inputs: &[BuildInput], parallelism: usize) -> Vec<Vec<BuildInput>> {
    let parallelism = parallelism.max(1);
    let mut groups: Vec<Vec<BuildInput>> = vec![Vec::new(); parallelism];
    let mut totals: Vec<u64> = vec![0; parallelism];

    let mut sorted: Vec<BuildInput> = inputs.to_vec();
    sorted.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));

    for input in sorted {
        let (lightest, _) = totals
            .iter()
            .enumerate()
            .min_by_key(|&(_, total)| *total)
            .expect("parallelism is at least 1");
        totals[lightest] += input.size_bytes;
        groups[lightest].push(input);
    }

    groups.retain(|g| !g.is_empty());
    groups
}

/// Cleans up a failed or aborted build for one SSTable (spec.md §4.5
/// "Interruption"): deletes every partial per-column component across every
/// segment the build reached (`segment_count`, 1 if it never rotated), and
/// — when `last_column` is true (no column in this SSTable's build
/// succeeded) — also deletes the shared per-SSTable components, since the
/// group never earns its completion marker.
pub fn cleanup_failed_build(
    directory: &std::path::Path,
    sstable_name: &str,
    version: u16,
    segment_count: u32,
    column: &str,
    last_column: bool,
) -> Result<(), LifecycleError> {
    warn!(sstable_name, column, segment_count, last_column, "cleaning up failed column index build");
    purge_column(directory, sstable_name, version, segment_count, column)?;
    if last_column {
        purge_group(directory, sstable_name, version)?;
    }
    Ok(())
}
