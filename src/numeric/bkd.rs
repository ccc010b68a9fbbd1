//! One-dimensional block KD-tree builder and reader.
//!
//! Keys are fixed-width byte-comparable values from [`super::pack`];
//! because they're already totally ordered, the "KD" split degenerates to
//! repeatedly halving a sorted array — no axis selection needed, unlike a
//! true multi-dimensional KD-tree. Built bottom-up in memory, then
//! flattened across two on-disk components: `KD_TREE` (node topology —
//! min/max, depth, child pointers) and `KD_TREE_POSTING_LISTS` (the
//! posting-list payload a leaf or sampled internal node carries,
//! referenced from `KD_TREE` by offset/length), described in
//! [`NumericIndexWriter::finish`].

use crate::pk::SegmentRowId;
use crate::posting::{PostingIterator, Union, VecPostingList};
use crate::segment::ComponentType;

use super::NumericIndexError;

/// Builds one column's numeric index in memory, then serializes it as a
/// flat node table.
pub struct NumericIndexWriter {
    width: usize,
    max_points_in_leaf_node: usize,
    points: Vec<(Vec<u8>, SegmentRowId)>,
}

impl NumericIndexWriter {
    /// Creates a writer for keys of `width` bytes, splitting leaves once
    /// they would exceed `max_points_in_leaf_node` points.
    pub fn new(width: usize, max_points_in_leaf_node: usize) -> Self {
        Self {
            width,
            max_points_in_leaf_node: max_points_in_leaf_node.max(1),
            points: Vec::new(),
        }
    }

    /// Adds one `(key, row)` point. `key` must be exactly `width` bytes.
    pub fn add(&mut self, key: Vec<u8>, row: SegmentRowId) -> Result<(), NumericIndexError> {
        if key.len() != self.width {
            return Err(NumericIndexError::WidthMismatch {
                expected: self.width,
                actual: key.len(),
            });
        }
        self.points.push((key, row));
        Ok(())
    }

    /// Number of points accumulated so far.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no points have been added.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Rough estimate of how many bytes this writer would currently
    /// serialize to: each point's key bytes plus bookkeeping, doubled for
    /// the tree-structural overhead above a flat sorted array. Used to
    /// decide when a segment build should flush and roll over (spec.md
    /// §4.5).
    pub fn buffered_bytes(&self) -> usize {
        self.points.iter().map(|(key, _)| key.len() + 8).sum::<usize>() * 2
    }

    /// Sorts points by key (row id breaks ties), builds the tree, and
    /// serializes it across `KD_TREE` (node topology) and
    /// `KD_TREE_POSTING_LISTS` (the posting payload nodes point into).
    /// `bkd_postings_skip`/`bkd_postings_min_leaves` are the column's
    /// sampling-predicate parameters (spec.md §4.3).
    pub fn finish(
        mut self,
        bkd_postings_skip: u32,
        bkd_postings_min_leaves: u32,
    ) -> Result<Vec<(ComponentType, Vec<u8>)>, NumericIndexError> {
        self.points.sort_unstable();

        if self.points.is_empty() {
            let mut tree = Vec::new();
            tree.extend_from_slice(&0u32.to_le_bytes());
            return Ok(vec![
                (ComponentType::KdTree, tree),
                (ComponentType::KdTreePostingLists, Vec::new()),
            ]);
        }

        let mut nodes = Vec::new();
        build(
            &self.points,
            0,
            self.max_points_in_leaf_node,
            bkd_postings_skip,
            bkd_postings_min_leaves,
            &mut nodes,
        );
        let (tree, postings) = serialize(&nodes);
        Ok(vec![
            (ComponentType::KdTree, tree),
            (ComponentType::KdTreePostingLists, postings),
        ])
    }
}

struct BuildNode {
    min: Vec<u8>,
    max: Vec<u8>,
    depth: u32,
    subtree_leaves: u32,
    rows: Vec<SegmentRowId>,
    kind: BuildKind,
}

enum BuildKind {
    Leaf {
        points: Vec<(Vec<u8>, SegmentRowId)>,
    },
    Internal {
        left: usize,
        right: usize,
        sampled: bool,
    },
}

fn build(
    points: &[(Vec<u8>, SegmentRowId)],
    depth: u32,
    max_leaf: usize,
    skip: u32,
    min_leaves: u32,
    nodes: &mut Vec<BuildNode>,
) -> usize {
    if points.len() <= max_leaf {
        let mut rows: Vec<SegmentRowId> = points.iter().map(|(_, r)| *r).collect();
        rows.sort_unstable();
        let min = points.first().unwrap().0.clone();
        let max = points.last().unwrap().0.clone();
        nodes.push(BuildNode {
            min,
            max,
            depth,
            subtree_leaves: 1,
            rows,
            kind: BuildKind::Leaf {
                points: points.to_vec(),
            },
        });
        return nodes.len() - 1;
    }

    let mid = points.len() / 2;
    let (left_pts, right_pts) = points.split_at(mid);
    let left = build(left_pts, depth + 1, max_leaf, skip, min_leaves, nodes);
    let right = build(right_pts, depth + 1, max_leaf, skip, min_leaves, nodes);

    let subtree_leaves = nodes[left].subtree_leaves + nodes[right].subtree_leaves;
    let min = nodes[left].min.clone();
    let max = nodes[right].max.clone();

    let mut rows = nodes[left].rows.clone();
    rows.extend_from_slice(&nodes[right].rows);
    rows.sort_unstable();

    let sampled = depth % skip.max(1) == 0 && subtree_leaves >= min_leaves;

    nodes.push(BuildNode {
        min,
        max,
        depth,
        subtree_leaves,
        rows,
        kind: BuildKind::Internal {
            left,
            right,
            sampled,
        },
    });
    nodes.len() - 1
}

fn serialize(nodes: &[BuildNode]) -> (Vec<u8>, Vec<u8>) {
    let mut tree = Vec::new();
    let mut postings = Vec::new();
    tree.extend_from_slice(&(nodes.len() as u32).to_le_bytes());
    for node in nodes {
        tree.extend_from_slice(&node.depth.to_le_bytes());
        write_bytes(&mut tree, &node.min);
        write_bytes(&mut tree, &node.max);
        match &node.kind {
            BuildKind::Leaf { points } => {
                tree.push(0);
                tree.extend_from_slice(&(points.len() as u32).to_le_bytes());
                for (key, row) in points {
                    write_bytes(&mut tree, key);
                    tree.extend_from_slice(&row.to_le_bytes());
                }
                // Leaves always persist their own postings (spec.md §4.3).
                write_posting_pointer(&mut tree, &mut postings, &node.rows);
            }
            BuildKind::Internal {
                left,
                right,
                sampled,
            } => {
                tree.push(1);
                tree.extend_from_slice(&(*left as u32).to_le_bytes());
                tree.extend_from_slice(&(*right as u32).to_le_bytes());
                if *sampled {
                    tree.push(1);
                    write_posting_pointer(&mut tree, &mut postings, &node.rows);
                } else {
                    tree.push(0);
                }
            }
        }
    }
    (tree, postings)
}

fn write_posting_pointer(tree: &mut Vec<u8>, postings: &mut Vec<u8>, rows: &[SegmentRowId]) {
    let list = VecPostingList::from_sorted(rows.to_vec());
    let mut encoded = Vec::new();
    list.encode(&mut encoded).expect("rows are sorted ascending");
    let offset = postings.len() as u32;
    postings.extend_from_slice(&encoded);
    tree.extend_from_slice(&offset.to_le_bytes());
    tree.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

struct ParsedNode {
    min: Vec<u8>,
    max: Vec<u8>,
    kind: ParsedKind,
}

enum ParsedKind {
    Leaf {
        points: Vec<(Vec<u8>, SegmentRowId)>,
        postings: Vec<SegmentRowId>,
    },
    Internal {
        left: usize,
        right: usize,
        postings: Option<Vec<SegmentRowId>>,
    },
}

/// A parsed, read-only numeric index over one serialized node table.
pub struct NumericIndexReader {
    nodes: Vec<ParsedNode>,
}

impl NumericIndexReader {
    /// Parses `tree` (`KD_TREE`) and `postings` (`KD_TREE_POSTING_LISTS`),
    /// as written by [`NumericIndexWriter::finish`], resolving each node's
    /// posting pointer into `postings` eagerly.
    pub fn open(tree: &[u8], postings: &[u8]) -> Result<Self, NumericIndexError> {
        let mut offset = 0;
        let node_count = read_u32(tree, &mut offset)?;
        let mut nodes = Vec::with_capacity(node_count as usize);
        for _ in 0..node_count {
            let _depth = read_u32(tree, &mut offset)?;
            let min = read_bytes(tree, &mut offset)?;
            let max = read_bytes(tree, &mut offset)?;
            let tag = read_u8(tree, &mut offset)?;
            let kind = match tag {
                0 => {
                    let point_count = read_u32(tree, &mut offset)?;
                    let mut points = Vec::with_capacity(point_count as usize);
                    for _ in 0..point_count {
                        let key = read_bytes(tree, &mut offset)?;
                        let row = read_u32(tree, &mut offset)?;
                        points.push((key, row));
                    }
                    let posting_bytes = read_posting_slice(tree, postings, &mut offset)?;
                    let postings = decode_posting(posting_bytes)?;
                    ParsedKind::Leaf { points, postings }
                }
                1 => {
                    let left = read_u32(tree, &mut offset)? as usize;
                    let right = read_u32(tree, &mut offset)? as usize;
                    let has_posting = read_u8(tree, &mut offset)?;
                    let postings = if has_posting == 1 {
                        let posting_bytes = read_posting_slice(tree, postings, &mut offset)?;
                        Some(decode_posting(posting_bytes)?)
                    } else {
                        None
                    };
                    ParsedKind::Internal {
                        left,
                        right,
                        postings,
                    }
                }
                other => {
                    return Err(NumericIndexError::Corrupt(format!(
                        "unknown node tag {other}"
                    )));
                }
            };
            nodes.push(ParsedNode { min, max, kind });
        }
        Ok(Self { nodes })
    }

    /// Whether this index holds no points.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Runs the range-query descent described in spec.md §4.3 over `[lo,
    /// hi]` (inclusive both ends — pass `lo == hi` for equality), returning
    /// the union of every contributing posting source.
    pub fn range_query<'a>(
        &'a self,
        lo: &[u8],
        hi: &[u8],
    ) -> Result<Union<'a>, NumericIndexError> {
        let mut sources: Vec<Box<dyn PostingIterator + 'a>> = Vec::new();
        if !self.nodes.is_empty() {
            self.descend(self.nodes.len() - 1, lo, hi, &mut sources)?;
        }
        Ok(Union::new(sources))
    }

    fn descend<'a>(
        &'a self,
        node_idx: usize,
        lo: &[u8],
        hi: &[u8],
        sources: &mut Vec<Box<dyn PostingIterator + 'a>>,
    ) -> Result<(), NumericIndexError> {
        let node = &self.nodes[node_idx];

        if node.max.as_slice() < lo || node.min.as_slice() > hi {
            return Ok(());
        }

        let fully_inside = node.min.as_slice() >= lo && node.max.as_slice() <= hi;

        match &node.kind {
            ParsedKind::Leaf { points, postings } => {
                if fully_inside {
                    sources.push(Box::new(VecPostingList::from_sorted(postings.clone())));
                } else {
                    let mut matched: Vec<SegmentRowId> = points
                        .iter()
                        .filter(|(key, _)| key.as_slice() >= lo && key.as_slice() <= hi)
                        .map(|(_, row)| *row)
                        .collect();
                    matched.sort_unstable();
                    if !matched.is_empty() {
                        sources.push(Box::new(VecPostingList::from_sorted(matched)));
                    }
                }
            }
            ParsedKind::Internal {
                left,
                right,
                postings,
            } => {
                if fully_inside {
                    if let Some(rows) = postings {
                        sources.push(Box::new(VecPostingList::from_sorted(rows.clone())));
                        return Ok(());
                    }
                }
                self.descend(*left, lo, hi, sources)?;
                self.descend(*right, lo, hi, sources)?;
            }
        }
        Ok(())
    }
}

fn read_posting_slice<'a>(
    tree: &[u8],
    postings: &'a [u8],
    offset: &mut usize,
) -> Result<&'a [u8], NumericIndexError> {
    let data_offset = read_u32(tree, offset)? as usize;
    let data_len = read_u32(tree, offset)? as usize;
    postings
        .get(data_offset..data_offset + data_len)
        .ok_or_else(|| NumericIndexError::Corrupt("posting pointer out of bounds".into()))
}

fn decode_posting(buf: &[u8]) -> Result<Vec<SegmentRowId>, NumericIndexError> {
    let decoded = crate::posting::EncodedPostingList::decode(buf)?;
    let mut decoded = decoded;
    let mut out = Vec::new();
    loop {
        let id = decoded.next()?;
        if id == crate::posting::END_OF_STREAM {
            break;
        }
        out.push(id);
    }
    Ok(out)
}

fn read_u8(buf: &[u8], offset: &mut usize) -> Result<u8, NumericIndexError> {
    let byte = *buf
        .get(*offset)
        .ok_or_else(|| NumericIndexError::Corrupt("truncated byte".into()))?;
    *offset += 1;
    Ok(byte)
}

fn read_u32(buf: &[u8], offset: &mut usize) -> Result<u32, NumericIndexError> {
    let slice = buf
        .get(*offset..*offset + 4)
        .ok_or_else(|| NumericIndexError::Corrupt("truncated u32".into()))?;
    *offset += 4;
    Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

fn read_bytes(buf: &[u8], offset: &mut usize) -> Result<Vec<u8>, NumericIndexError> {
    let len = read_u32(buf, offset)? as usize;
    let slice = buf
        .get(*offset..*offset + len)
        .ok_or_else(|| NumericIndexError::Corrupt("truncated byte field".into()))?;
    *offset += len;
    Ok(slice.to_vec())
}
