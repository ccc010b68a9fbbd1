//! # SAI — Storage-Attached Secondary Index engine
//!
//! A storage-layer secondary index engine for a wide-column distributed
//! database: literal, numeric, and vector (ANN) indexes built per SSTable,
//! plus a live in-memory index for the currently-open memtable, unified
//! behind one query planner/executor.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`pk`] | Primary-key representation and the per-SSTable PK ↔ row-id map |
//! | [`config`] | Column index descriptor options and DDL-time validation |
//! | [`posting`] | Posting-list iterator algebra (union, intersection, range-filter) |
//! | [`literal`] | Trie-style term dictionary index |
//! | [`numeric`] | One-dimensional block KD-tree index |
//! | [`vector`] | In-memory graph + on-disk ANN index with product quantization |
//! | [`segment`] | Per-segment builder and per-SSTable on-disk layout |
//! | [`memtable_index`] | Per-column live index for the open memtable |
//! | [`query`] | Predicate planner and cross-searcher executor |
//! | [`lifecycle`] | Column index descriptors, build grouping, queryability registry |
//! | [`error`] | Crate-wide error taxonomy ([`SaiError`]) |
//!
//! ## Concurrency model
//!
//! Writes update memtable live indexes synchronously under the host's own
//! memtable lock; SAI adds no global write lock. Builds run on a dedicated
//! pool bounded by a [`segment::builder::SegmentBufferLimiter`]. Queries
//! consult [`lifecycle::QueryabilityRegistry`] before opening any searcher.

#![allow(dead_code)]

pub mod config;
pub mod encoding;
pub mod error;
pub mod lifecycle;
pub mod literal;
pub mod memtable_index;
pub mod numeric;
pub mod pk;
pub mod posting;
pub mod query;
pub mod segment;
pub mod vector;

pub use error::SaiError;
pub use pk::{PrimaryKey, PrimaryKeyMap, SegmentRowId};
pub use query::{Plan, QueryExecutor};
