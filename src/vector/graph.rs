//! Incremental in-memory proximity graph: the per-memtable live vector
//! index (spec.md §4.4).
//!
//! A single-layer navigable small-world graph rather than true multi-layer
//! HNSW — the same `maximum_node_connections`/`construction_beam_width`
//! parameters and greedy best-first search contract, without the layered
//! skip-list-like entry structure, since one memtable's vector count is
//! small enough that a single layer's search cost is acceptable (recorded
//! as an Open Question resolution in `DESIGN.md`). Grounded on
//! `nranjan2code-sutra-engine`'s `sutra-storage/src/hnsw_container.rs` for
//! the node/id-mapping shape (the teacher has no vector index at all).

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::config::SimilarityFunction;
use crate::pk::SegmentRowId;

use super::{similarity, VectorIndexError};

/// Tuning knobs for graph construction, named after spec.md §4.4's
/// `maximum_node_connections` (M) and `construction_beam_width`
/// (efConstruction).
#[derive(Debug, Clone, Copy)]
pub struct GraphParams {
    /// Maximum neighbors retained per node after trimming.
    pub max_node_connections: usize,
    /// Candidate pool width used while connecting a newly inserted node.
    pub construction_beam_width: usize,
}

impl Default for GraphParams {
    fn default() -> Self {
        Self {
            max_node_connections: 16,
            construction_beam_width: 100,
        }
    }
}

pub(crate) struct Node {
    vector: Vec<f32>,
    /// Rows sharing this exact vector (spec.md: "if the vector equals an
    /// existing node's vector, attach the new row-id"). Empty ⇒ tombstoned.
    rows: Vec<SegmentRowId>,
    neighbors: Vec<usize>,
}

impl Node {
    /// Builds a node from already-known parts — used when reconstructing a
    /// graph from a serialized on-disk node table.
    pub(crate) fn from_parts(vector: Vec<f32>, rows: Vec<SegmentRowId>, neighbors: Vec<usize>) -> Self {
        Self {
            vector,
            rows,
            neighbors,
        }
    }

    pub(crate) fn vector(&self) -> &[f32] {
        &self.vector
    }

    pub(crate) fn rows(&self) -> &[SegmentRowId] {
        &self.rows
    }

    pub(crate) fn neighbors(&self) -> &[usize] {
        &self.neighbors
    }
}

#[derive(Clone, Copy)]
struct Scored {
    score: f32,
    ordinal: usize,
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score
    }
}
impl Eq for Scored {}
impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score.total_cmp(&other.score)
    }
}

/// An incremental, insert/delete/search-capable proximity graph over
/// fixed-dimension `f32` vectors.
pub struct IncrementalGraph {
    params: GraphParams,
    similarity: SimilarityFunction,
    dim: Option<usize>,
    nodes: Vec<Node>,
    entry_point: Option<usize>,
    exact_index: HashMap<Vec<u32>, usize>,
    row_to_ordinal: HashMap<SegmentRowId, usize>,
}

impl IncrementalGraph {
    /// Creates an empty graph using `similarity` for scoring.
    pub fn new(params: GraphParams, similarity: SimilarityFunction) -> Self {
        Self {
            params,
            similarity,
            dim: None,
            nodes: Vec::new(),
            entry_point: None,
            exact_index: HashMap::new(),
            row_to_ordinal: HashMap::new(),
        }
    }

    /// Number of ordinals ever allocated, including tombstoned ones.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Borrows the vector stored at `ordinal`, if live.
    pub fn vector(&self, ordinal: usize) -> Option<&[f32]> {
        self.nodes.get(ordinal).map(|n| n.vector.as_slice())
    }

    /// Rows currently mapped to `ordinal` (empty if tombstoned or unknown).
    pub fn rows(&self, ordinal: usize) -> &[SegmentRowId] {
        self.nodes.get(ordinal).map(|n| n.rows.as_slice()).unwrap_or(&[])
    }

    /// Neighbor ordinals of `ordinal`, for serializing the adjacency list.
    pub fn neighbors(&self, ordinal: usize) -> &[usize] {
        self.nodes.get(ordinal).map(|n| n.neighbors.as_slice()).unwrap_or(&[])
    }

    /// Entry point ordinal, if the graph holds any live node.
    pub fn entry_point(&self) -> Option<usize> {
        self.entry_point
    }

    /// Vector dimension, once known (set by the first insert).
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    /// The similarity function this graph scores candidates with.
    pub(crate) fn similarity(&self) -> SimilarityFunction {
        self.similarity
    }

    /// Reconstructs a graph from a fully serialized node table — used when
    /// opening an on-disk ANN segment. `nodes` must already carry correct
    /// `neighbors` edges and tombstone (empty `rows`) markers; no beam
    /// search is run to rebuild connectivity.
    pub(crate) fn from_parts(
        params: GraphParams,
        similarity: SimilarityFunction,
        dim: Option<usize>,
        nodes: Vec<Node>,
        entry_point: Option<usize>,
    ) -> Self {
        let mut exact_index = HashMap::new();
        let mut row_to_ordinal = HashMap::new();
        for (ordinal, node) in nodes.iter().enumerate() {
            exact_index.insert(exact_key(node.vector()), ordinal);
            for &row in node.rows() {
                row_to_ordinal.insert(row, ordinal);
            }
        }
        Self {
            params,
            similarity,
            dim,
            nodes,
            entry_point,
            exact_index,
            row_to_ordinal,
        }
    }

    /// Inserts `vector` for `row`. If an existing node holds the exact same
    /// vector (bit-identical), `row` is attached to it; otherwise a new node
    /// is created and connected via a beam search from the entry point.
    /// Returns the node's ordinal.
    pub fn insert(&mut self, vector: Vec<f32>, row: SegmentRowId) -> Result<usize, VectorIndexError> {
        if let Some(dim) = self.dim {
            if vector.len() != dim {
                return Err(VectorIndexError::DimensionMismatch {
                    expected: dim,
                    actual: vector.len(),
                });
            }
        } else {
            self.dim = Some(vector.len());
        }
        // Validates finiteness/zero-norm per the configured similarity
        // function before the vector is ever stored.
        similarity::score(&vector, &vector, self.similarity)?;

        let key = exact_key(&vector);
        if let Some(&ordinal) = self.exact_index.get(&key) {
            let node = &mut self.nodes[ordinal];
            if !node.rows.contains(&row) {
                node.rows.push(row);
            }
            self.row_to_ordinal.insert(row, ordinal);
            return Ok(ordinal);
        }

        let ordinal = self.nodes.len();
        self.nodes.push(Node {
            vector: vector.clone(),
            rows: vec![row],
            neighbors: Vec::new(),
        });
        self.exact_index.insert(key, ordinal);
        self.row_to_ordinal.insert(row, ordinal);

        if self.entry_point.is_none() {
            self.entry_point = Some(ordinal);
            return Ok(ordinal);
        }

        let ef = self.params.construction_beam_width.max(self.params.max_node_connections);
        let candidates = self.beam_search(&vector, ef)?;
        let neighbors: Vec<usize> = candidates
            .into_iter()
            .take(self.params.max_node_connections)
            .map(|s| s.ordinal)
            .collect();
        self.nodes[ordinal].neighbors = neighbors.clone();
        for neighbor in neighbors {
            self.connect_back(neighbor, ordinal)?;
        }
        Ok(ordinal)
    }

    fn connect_back(&mut self, neighbor: usize, new_ordinal: usize) -> Result<(), VectorIndexError> {
        if !self.nodes[neighbor].neighbors.contains(&new_ordinal) {
            self.nodes[neighbor].neighbors.push(new_ordinal);
        }
        if self.nodes[neighbor].neighbors.len() > self.params.max_node_connections {
            let origin = self.nodes[neighbor].vector.clone();
            let sim = self.similarity;
            let mut scored = Vec::with_capacity(self.nodes[neighbor].neighbors.len());
            for &cand in &self.nodes[neighbor].neighbors {
                let s = similarity::score(&origin, &self.nodes[cand].vector, sim)?;
                scored.push((cand, s));
            }
            scored.sort_by(|a, b| b.1.total_cmp(&a.1));
            scored.truncate(self.params.max_node_connections);
            self.nodes[neighbor].neighbors = scored.into_iter().map(|(o, _)| o).collect();
        }
        Ok(())
    }

    /// Removes `row` from its node. If the node's row set empties, the
    /// ordinal is tombstoned (edges stay intact for graph connectivity;
    /// the node just stops being returned from searches or serving as
    /// entry point). Returns whether `row` was found.
    pub fn delete(&mut self, row: SegmentRowId) -> bool {
        let Some(ordinal) = self.row_to_ordinal.remove(&row) else {
            return false;
        };
        let node = &mut self.nodes[ordinal];
        node.rows.retain(|&r| r != row);
        if node.rows.is_empty() && self.entry_point == Some(ordinal) {
            self.entry_point = self.nodes.iter().position(|n| !n.rows.is_empty());
        }
        true
    }

    fn is_tombstoned(&self, ordinal: usize) -> bool {
        self.nodes[ordinal].rows.is_empty()
    }

    fn beam_search(&self, query: &[f32], ef: usize) -> Result<Vec<Scored>, VectorIndexError> {
        let Some(entry) = self.entry_point else {
            return Ok(Vec::new());
        };
        let mut visited = vec![false; self.nodes.len()];
        visited[entry] = true;

        let entry_score = similarity::score(query, &self.nodes[entry].vector, self.similarity)?;
        let mut frontier = BinaryHeap::new();
        frontier.push(Scored {
            score: entry_score,
            ordinal: entry,
        });

        let mut results: Vec<Scored> = Vec::new();
        if !self.is_tombstoned(entry) {
            results.push(Scored {
                score: entry_score,
                ordinal: entry,
            });
        }

        while let Some(current) = frontier.pop() {
            if results.len() >= ef {
                let worst = results.iter().map(|s| s.score).fold(f32::INFINITY, f32::min);
                if current.score < worst {
                    break;
                }
            }
            let neighbors = self.nodes[current.ordinal].neighbors.clone();
            for neighbor in neighbors {
                if visited[neighbor] {
                    continue;
                }
                visited[neighbor] = true;
                let s = similarity::score(query, &self.nodes[neighbor].vector, self.similarity)?;
                frontier.push(Scored {
                    score: s,
                    ordinal: neighbor,
                });
                if !self.is_tombstoned(neighbor) {
                    results.push(Scored {
                        score: s,
                        ordinal: neighbor,
                    });
                }
            }
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(ef);
        Ok(results)
    }

    /// Searches for the `k` nearest live nodes to `query`, widening the
    /// beam (doubling `ef`) until `k` results pass `filter` or every node
    /// has been visited. `filter` receives an ordinal and is used for
    /// search-then-filter query execution (spec.md §4.4); pass `None` for
    /// plain sort-only ANN queries.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        filter: Option<&dyn Fn(usize) -> bool>,
    ) -> Result<Vec<(usize, f32)>, VectorIndexError> {
        if self.entry_point.is_none() {
            return Ok(Vec::new());
        }
        let mut beam = ef.max(k).max(1);
        loop {
            let candidates = self.beam_search(query, beam)?;
            let filtered: Vec<Scored> = match filter {
                Some(f) => candidates.into_iter().filter(|s| f(s.ordinal)).collect(),
                None => candidates,
            };
            if filtered.len() >= k || beam >= self.nodes.len() {
                return Ok(filtered.into_iter().take(k).map(|s| (s.ordinal, s.score)).collect());
            }
            beam = (beam * 2).min(self.nodes.len());
        }
    }
}

fn exact_key(vector: &[f32]) -> Vec<u32> {
    vector.iter().map(|f| f.to_bits()).collect()
}
