//! Vector (ANN) column index: in-memory incremental graph, on-disk segment
//! persistence, and product quantization (spec.md §4.4).
//!
//! No teacher module does approximate nearest-neighbor search at all — the
//! on-disk layout here is new code, shaped after `sstable`'s
//! length-prefixed component + trailing checksum convention rather than
//! reusing any single teacher file wholesale.

pub mod graph;
pub mod pq;
pub mod similarity;

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use thiserror::Error;

use crate::config::SimilarityFunction;
use crate::pk::SegmentRowId;
use crate::posting::{PostingError, PostingIterator, Union, VecPostingList};
use crate::segment::ComponentType;

use graph::{GraphParams, IncrementalGraph, Node};
use pq::ProductQuantizer;

/// Row count above which a segment's vector index trains and stores a
/// product-quantization codebook alongside raw vectors (spec.md §4.4).
/// Below this, only raw vectors are kept and ANN search falls back to
/// exact distance computation.
pub const MIN_PQ_ROWS: usize = 1024;

/// Number of Lloyd's-algorithm iterations run per PQ subvector codebook.
const PQ_TRAINING_ITERATIONS: usize = 12;

/// How many floats each PQ subvector should cover, used to derive
/// `num_subvectors` from a column's dimension (picks the largest divisor
/// of `dim` no larger than this target width).
const PQ_TARGET_SUBVECTOR_WIDTH: usize = 4;

/// Tolerance used by unit-vector-mode detection: a column is treated as
/// unit-norm only if *every* vector in the segment is within this of norm
/// 1.0 (an Open Question resolution — all-or-nothing per segment, see
/// `DESIGN.md`).
pub const UNIT_NORM_TOLERANCE: f32 = 1e-3;

/// Errors raised while building, persisting, or querying a vector column
/// index.
#[derive(Debug, Error)]
pub enum VectorIndexError {
    /// A vector's length didn't match the column's fixed dimension.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension established by the column (or query).
        expected: usize,
        /// Dimension actually supplied.
        actual: usize,
    },

    /// A vector contained `NaN` or infinite components.
    #[error("vector contains non-finite components")]
    NonFiniteVector,

    /// A vector had zero (or near-zero) norm, which cosine similarity
    /// cannot score.
    #[error("vector has zero or near-zero norm")]
    ZeroNormVector,

    /// Product-quantization training was asked for an invalid
    /// dimension/subvector-count combination.
    #[error("invalid PQ config: dim={dim} not divisible by num_subvectors={num_subvectors}")]
    InvalidPqConfig {
        /// Vector dimension.
        dim: usize,
        /// Requested subvector count.
        num_subvectors: usize,
    },

    /// Posting-list decode failure while reading a persisted segment.
    #[error(transparent)]
    Posting(#[from] PostingError),

    /// Binary layout was truncated or otherwise malformed.
    #[error("corrupt vector index segment: {0}")]
    Corrupt(String),
}

/// Whether every vector in `vectors` is within [`UNIT_NORM_TOLERANCE`] of
/// unit norm — the per-segment unit-vector-mode detection spec.md §4.4
/// uses to pick a cheaper similarity fast path. Empty input is not unit
/// mode (nothing to detect).
pub fn detect_unit_vector_mode(vectors: &[Vec<f32>]) -> bool {
    !vectors.is_empty()
        && vectors
            .iter()
            .all(|v| similarity::is_unit_norm(v, UNIT_NORM_TOLERANCE))
}

#[derive(Clone, Copy)]
struct ApproxScored {
    neg_distance: f32,
    ordinal: usize,
}

impl PartialEq for ApproxScored {
    fn eq(&self, other: &Self) -> bool {
        self.neg_distance == other.neg_distance
    }
}
impl Eq for ApproxScored {}
impl PartialOrd for ApproxScored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ApproxScored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.neg_distance.total_cmp(&other.neg_distance)
    }
}

fn subvector_count(dim: usize) -> usize {
    if dim == 0 {
        return 1;
    }
    let target = (dim / PQ_TARGET_SUBVECTOR_WIDTH).max(1);
    (1..=target).rev().find(|s| dim % s == 0).unwrap_or(1)
}

/// Accumulates `(vector, row)` pairs during a segment build and serializes
/// them into an on-disk ANN component: graph adjacency, raw vectors, an
/// optional PQ codebook/codes, and the ordinal-to-row-ids map.
pub struct VectorIndexWriter {
    graph: IncrementalGraph,
}

impl VectorIndexWriter {
    /// Creates a writer with the column's configured graph/similarity
    /// parameters.
    pub fn new(params: GraphParams, similarity: SimilarityFunction) -> Self {
        Self {
            graph: IncrementalGraph::new(params, similarity),
        }
    }

    /// Inserts one `(vector, row)` pair, connecting it into the graph.
    pub fn add(&mut self, vector: Vec<f32>, row: SegmentRowId) -> Result<(), VectorIndexError> {
        self.graph.insert(vector, row)?;
        Ok(())
    }

    /// Number of distinct vector nodes accumulated (bit-identical vectors
    /// sharing rows count once).
    pub fn len(&self) -> usize {
        self.graph.len()
    }

    /// Whether no vectors have been added.
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Serializes the graph across its four on-disk components: `ANN_GRAPH`
    /// (entry point plus per-node adjacency), `ANN_VECTORS` (raw per-node
    /// vectors), `ANN_ORDINALS` (per-node row-id lists), and `ANN_PQ`
    /// (a trained codebook plus per-node codes once the node count reaches
    /// [`MIN_PQ_ROWS`], otherwise just a not-trained marker). All four are
    /// ordinally aligned — node `i`'s adjacency, vector, rows, and PQ code
    /// occupy slot `i` in each respective component.
    pub fn finish(self) -> Result<Vec<(ComponentType, Vec<u8>)>, VectorIndexError> {
        let node_count = self.graph.len();

        let mut graph_buf = Vec::new();
        graph_buf.extend_from_slice(&(node_count as u32).to_le_bytes());
        write_option_u32(&mut graph_buf, self.graph.entry_point());

        let mut vectors_buf = Vec::new();
        let mut ordinals_buf = Vec::new();

        for ordinal in 0..node_count {
            let vector = self.graph.vector(ordinal).unwrap_or(&[]);
            write_f32_slice(&mut vectors_buf, vector);

            let rows = self.graph.rows(ordinal);
            write_u32_slice(&mut ordinals_buf, rows);

            let neighbors: Vec<u32> = self
                .graph
                .neighbors(ordinal)
                .iter()
                .map(|&n| n as u32)
                .collect();
            write_u32_slice(&mut graph_buf, &neighbors);
        }

        let mut pq_buf = Vec::new();
        if node_count >= MIN_PQ_ROWS {
            let dim = self.graph.dim().unwrap_or(0);
            let vectors: Vec<Vec<f32>> = (0..node_count)
                .map(|o| self.graph.vector(o).unwrap_or(&[]).to_vec())
                .collect();
            let num_subvectors = subvector_count(dim);
            let mut rng = rand::rng();
            let pq = ProductQuantizer::train(&vectors, num_subvectors, PQ_TRAINING_ITERATIONS, &mut rng)?;
            let unit_vector_mode = detect_unit_vector_mode(&vectors);

            pq_buf.push(1);
            pq_buf.push(unit_vector_mode as u8);
            pq_buf.extend_from_slice(&(num_subvectors as u32).to_le_bytes());
            pq_buf.extend_from_slice(&(pq.subvector_width() as u32).to_le_bytes());
            for codebook in pq.codebooks() {
                pq_buf.extend_from_slice(&(codebook.len() as u32).to_le_bytes());
                for centroid in codebook {
                    write_f32_slice(&mut pq_buf, centroid);
                }
            }
            for vector in &vectors {
                let codes = pq.encode(vector)?;
                pq_buf.extend_from_slice(&codes);
            }
        } else {
            pq_buf.push(0);
        }

        Ok(vec![
            (ComponentType::AnnGraph, graph_buf),
            (ComponentType::AnnVectors, vectors_buf),
            (ComponentType::AnnOrdinals, ordinals_buf),
            (ComponentType::AnnPq, pq_buf),
        ])
    }
}

fn write_f32_slice(buf: &mut Vec<u8>, values: &[f32]) {
    buf.extend_from_slice(&(values.len() as u32).to_le_bytes());
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

fn write_u32_slice(buf: &mut Vec<u8>, values: &[u32]) {
    buf.extend_from_slice(&(values.len() as u32).to_le_bytes());
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

fn write_option_u32(buf: &mut Vec<u8>, value: Option<usize>) {
    match value {
        Some(v) => {
            buf.push(1);
            buf.extend_from_slice(&(v as u32).to_le_bytes());
        }
        None => buf.push(0),
    }
}

/// A parsed, read-only vector index over its four serialized components.
///
/// Always holds exact `f32` vectors (in `graph`'s nodes) alongside the
/// optional PQ codebook and per-node codes. When PQ is present,
/// [`Self::search`] traverses the graph scoring candidates by approximate
/// PQ distance and reranks the surviving candidates on exact vectors
/// before returning (spec.md §4.4); below [`MIN_PQ_ROWS`] it falls back to
/// scoring every hop with the exact similarity function directly.
pub struct VectorIndexReader {
    graph: IncrementalGraph,
    pq: Option<ProductQuantizer>,
    pq_codes: Vec<Vec<u8>>,
    unit_vector_mode: bool,
}

impl VectorIndexReader {
    /// Parses `graph`, `vectors`, `ordinals`, and `pq` as written by
    /// [`VectorIndexWriter::finish`].
    pub fn open(
        graph: &[u8],
        vectors: &[u8],
        ordinals: &[u8],
        pq: &[u8],
        params: GraphParams,
        similarity: SimilarityFunction,
    ) -> Result<Self, VectorIndexError> {
        let mut graph_offset = 0;
        let node_count = read_u32(graph, &mut graph_offset)? as usize;
        let entry_point = read_option_u32(graph, &mut graph_offset)?;

        let mut vectors_offset = 0;
        let mut ordinals_offset = 0;
        let mut nodes = Vec::with_capacity(node_count);
        let mut dim = None;
        for _ in 0..node_count {
            let vector = read_f32_slice(vectors, &mut vectors_offset)?;
            if dim.is_none() && !vector.is_empty() {
                dim = Some(vector.len());
            }
            let rows = read_u32_slice(ordinals, &mut ordinals_offset)?;
            let neighbor_ids = read_u32_slice(graph, &mut graph_offset)?;
            let neighbors: Vec<usize> = neighbor_ids.into_iter().map(|n| n as usize).collect();
            nodes.push(Node::from_parts(vector, rows, neighbors));
        }

        let mut pq_offset = 0;
        let has_pq = read_u8(pq, &mut pq_offset)?;
        let (product_quantizer, pq_codes, unit_vector_mode) = if has_pq == 1 {
            let unit_vector_mode = read_u8(pq, &mut pq_offset)? == 1;
            let num_subvectors = read_u32(pq, &mut pq_offset)? as usize;
            let subvector_width = read_u32(pq, &mut pq_offset)? as usize;
            let mut codebooks = Vec::with_capacity(num_subvectors);
            for _ in 0..num_subvectors {
                let centroid_count = read_u32(pq, &mut pq_offset)? as usize;
                let mut codebook = Vec::with_capacity(centroid_count);
                for _ in 0..centroid_count {
                    codebook.push(read_f32_slice(pq, &mut pq_offset)?);
                }
                codebooks.push(codebook);
            }
            let mut codes = Vec::with_capacity(node_count);
            for _ in 0..node_count {
                let slice = pq
                    .get(pq_offset..pq_offset + num_subvectors)
                    .ok_or_else(|| VectorIndexError::Corrupt("truncated PQ codes".into()))?;
                codes.push(slice.to_vec());
                pq_offset += num_subvectors;
            }
            let quantizer = ProductQuantizer::from_parts(num_subvectors, subvector_width, codebooks);
            (Some(quantizer), codes, unit_vector_mode)
        } else {
            (None, Vec::new(), false)
        };

        let graph = IncrementalGraph::from_parts(params, similarity, dim, nodes, entry_point);
        Ok(Self {
            graph,
            pq: product_quantizer,
            pq_codes,
            unit_vector_mode,
        })
    }

    /// Borrows the segment's trained PQ codebook, if one was persisted.
    pub fn product_quantizer(&self) -> Option<&ProductQuantizer> {
        self.pq.as_ref()
    }

    /// Whether the segment's vector index holds no live rows.
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Runs a top-`k` ANN search, optionally filtering candidates by
    /// ordinal (search-then-filter support, spec.md §4.4). When a PQ
    /// codebook was persisted, traversal distances are computed from PQ
    /// codes and the final candidates are reranked on exact vectors;
    /// unit-vector-mode segments always rerank with cosine similarity
    /// regardless of the column's configured similarity function.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        filter: Option<&dyn Fn(usize) -> bool>,
    ) -> Result<Vec<(usize, f32)>, VectorIndexError> {
        match &self.pq {
            Some(pq) => self.search_with_pq(pq, query, k, ef, filter),
            None => self.graph.search(query, k, ef, filter),
        }
    }

    fn rerank_similarity(&self) -> SimilarityFunction {
        if self.unit_vector_mode {
            SimilarityFunction::Cosine
        } else {
            self.graph.similarity()
        }
    }

    fn search_with_pq(
        &self,
        pq: &ProductQuantizer,
        query: &[f32],
        k: usize,
        ef: usize,
        filter: Option<&dyn Fn(usize) -> bool>,
    ) -> Result<Vec<(usize, f32)>, VectorIndexError> {
        let Some(entry) = self.graph.entry_point() else {
            return Ok(Vec::new());
        };
        let sim = self.rerank_similarity();

        let mut beam = ef.max(k).max(1);
        loop {
            let candidates = self.beam_search_pq(pq, query, entry, beam);

            let mut rescored = Vec::with_capacity(candidates.len());
            for ordinal in candidates {
                if self.graph.rows(ordinal).is_empty() {
                    continue;
                }
                let Some(vector) = self.graph.vector(ordinal) else {
                    continue;
                };
                rescored.push((ordinal, similarity::score(query, vector, sim)?));
            }

            let mut filtered: Vec<(usize, f32)> = match filter {
                Some(f) => rescored.into_iter().filter(|&(o, _)| f(o)).collect(),
                None => rescored,
            };
            filtered.sort_by(|a, b| b.1.total_cmp(&a.1));

            if filtered.len() >= k || beam >= self.graph.len() {
                filtered.truncate(k);
                return Ok(filtered);
            }
            beam = (beam * 2).min(self.graph.len());
        }
    }

    /// Beam search identical in shape to [`IncrementalGraph`]'s own, but
    /// ranking by ascending approximate PQ distance (lower is closer)
    /// instead of descending exact similarity.
    fn beam_search_pq(&self, pq: &ProductQuantizer, query: &[f32], entry: usize, ef: usize) -> Vec<usize> {
        let mut visited = vec![false; self.graph.len()];
        visited[entry] = true;

        let entry_distance = pq.approx_distance(query, &self.pq_codes[entry]);
        let mut frontier = BinaryHeap::new();
        frontier.push(ApproxScored {
            neg_distance: -entry_distance,
            ordinal: entry,
        });
        let mut results = vec![(entry, entry_distance)];

        while let Some(current) = frontier.pop() {
            if results.len() >= ef {
                let worst = results.iter().map(|&(_, d)| d).fold(f32::NEG_INFINITY, f32::max);
                if -current.neg_distance > worst {
                    break;
                }
            }
            for &neighbor in self.graph.neighbors(current.ordinal) {
                if visited[neighbor] {
                    continue;
                }
                visited[neighbor] = true;
                let distance = pq.approx_distance(query, &self.pq_codes[neighbor]);
                frontier.push(ApproxScored {
                    neg_distance: -distance,
                    ordinal: neighbor,
                });
                results.push((neighbor, distance));
            }
        }

        results.sort_by(|a, b| a.1.total_cmp(&b.1));
        results.truncate(ef);
        results.into_iter().map(|(ordinal, _)| ordinal).collect()
    }

    /// Rows mapped to ordinal `ordinal` (empty if tombstoned).
    pub fn rows(&self, ordinal: usize) -> &[SegmentRowId] {
        self.graph.rows(ordinal)
    }

    /// Returns a [`Union`] over every live ordinal's rows, for brute-force
    /// (non-ANN) full scans over small segments.
    pub fn all_rows<'a>(&'a self) -> Result<Union<'a>, VectorIndexError> {
        let mut sources: Vec<Box<dyn PostingIterator + 'a>> = Vec::new();
        for ordinal in 0..self.graph.len() {
            let rows = self.graph.rows(ordinal);
            if !rows.is_empty() {
                sources.push(Box::new(VecPostingList::from_sorted(rows.to_vec())));
            }
        }
        Ok(Union::new(sources))
    }
}

fn read_u8(buf: &[u8], offset: &mut usize) -> Result<u8, VectorIndexError> {
    let byte = *buf
        .get(*offset)
        .ok_or_else(|| VectorIndexError::Corrupt("truncated byte".into()))?;
    *offset += 1;
    Ok(byte)
}

fn read_u32(buf: &[u8], offset: &mut usize) -> Result<u32, VectorIndexError> {
    let slice = buf
        .get(*offset..*offset + 4)
        .ok_or_else(|| VectorIndexError::Corrupt("truncated u32".into()))?;
    *offset += 4;
    Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

fn read_option_u32(buf: &[u8], offset: &mut usize) -> Result<Option<usize>, VectorIndexError> {
    let tag = read_u8(buf, offset)?;
    if tag == 0 {
        return Ok(None);
    }
    Ok(Some(read_u32(buf, offset)? as usize))
}

fn read_f32_slice(buf: &[u8], offset: &mut usize) -> Result<Vec<f32>, VectorIndexError> {
    let len = read_u32(buf, offset)? as usize;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        let slice = buf
            .get(*offset..*offset + 4)
            .ok_or_else(|| VectorIndexError::Corrupt("truncated f32".into()))?;
        out.push(f32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]));
        *offset += 4;
    }
    Ok(out)
}

fn read_u32_slice(buf: &[u8], offset: &mut usize) -> Result<Vec<u32>, VectorIndexError> {
    let len = read_u32(buf, offset)? as usize;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(read_u32(buf, offset)?);
    }
    Ok(out)
}
