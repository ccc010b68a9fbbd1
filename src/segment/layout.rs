//! Per-SSTable shared components: the primary-key ↔ `segment_row_id` map
//! and the dense token array used for token-range filtering (spec.md
//! §4.5, §6). Shared by every column index built for one SSTable.
//!
//! Grounded on `src/pk.rs`'s in-memory [`PrimaryKeyMap`] (sorted
//! `Vec<PrimaryKey>`, binary-search lookups) for the logical shape, and on
//! `src/sstable/mod.rs`'s "sorted keys + offset table" index-block layout
//! for the on-disk split between a blocks file (raw encoded keys) and an
//! offsets file (byte offsets into the blocks file).
//!
//! `PRIMARY_KEY_TRIE` stores the same sorted `(key, row_id)` pairs as a
//! flat array searched by binary search — the literal index's trie-vs-
//! flat-array resolution applies here too (spec.md only requires the
//! logical PK↔row_id operations, not a specific on-disk pointer
//! structure).

use std::ops::Range;

use super::builder::SegmentBuilder;
use super::{ComponentType, SegmentError};
use crate::pk::{PrimaryKey, PrimaryKeyMap, SegmentRowId};

fn write_primary_key(buf: &mut Vec<u8>, pk: &PrimaryKey) {
    buf.extend_from_slice(&pk.token.to_le_bytes());
    buf.extend_from_slice(&(pk.partition_key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&pk.partition_key);
    buf.extend_from_slice(&(pk.clustering.len() as u32).to_le_bytes());
    buf.extend_from_slice(&pk.clustering);
}

fn read_primary_key(buf: &[u8], offset: &mut usize) -> Result<PrimaryKey, SegmentError> {
    let token = read_i64(buf, offset)?;
    let partition_key = read_bytes(buf, offset)?;
    let clustering = read_bytes(buf, offset)?;
    Ok(PrimaryKey::new(token, partition_key, clustering))
}

fn read_i64(buf: &[u8], offset: &mut usize) -> Result<i64, SegmentError> {
    let slice = buf
        .get(*offset..*offset + 8)
        .ok_or_else(|| SegmentError::Encoding(crate::encoding::EncodingError::Custom("truncated i64".into())))?;
    *offset += 8;
    Ok(i64::from_le_bytes(slice.try_into().unwrap_or([0; 8])))
}

fn read_u32(buf: &[u8], offset: &mut usize) -> Result<u32, SegmentError> {
    let slice = buf
        .get(*offset..*offset + 4)
        .ok_or_else(|| SegmentError::Encoding(crate::encoding::EncodingError::Custom("truncated u32".into())))?;
    *offset += 4;
    Ok(u32::from_le_bytes(slice.try_into().unwrap_or([0; 4])))
}

fn read_bytes(buf: &[u8], offset: &mut usize) -> Result<Vec<u8>, SegmentError> {
    let len = read_u32(buf, offset)? as usize;
    let slice = buf.get(*offset..*offset + len).ok_or_else(|| {
        SegmentError::Encoding(crate::encoding::EncodingError::Custom("truncated byte field".into()))
    })?;
    *offset += len;
    Ok(slice.to_vec())
}

/// Serializes `map`'s primary-key ↔ row-id relationship and token array
/// into this SSTable's shared components, then writes the group
/// completion marker.
pub fn write_primary_key_layout(map: &PrimaryKeyMap, builder: &mut SegmentBuilder) -> Result<(), SegmentError> {
    let mut blocks = Vec::new();
    let mut offsets = Vec::with_capacity(4 * (map.len() + 1));
    let mut tokens = Vec::with_capacity(8 * map.len());
    let mut pk_lengths = Vec::with_capacity(4 * map.len());

    for row in 0..map.len() {
        let pk = map
            .primary_key(row as SegmentRowId)
            .map_err(|e| SegmentError::Encoding(crate::encoding::EncodingError::Custom(e.to_string())))?;
        offsets.extend_from_slice(&(blocks.len() as u32).to_le_bytes());
        write_primary_key(&mut blocks, pk);
        tokens.extend_from_slice(&pk.token.to_le_bytes());
        pk_lengths.extend_from_slice(&(pk.partition_key.len() as u32).to_le_bytes());
    }
    offsets.extend_from_slice(&(blocks.len() as u32).to_le_bytes());

    let mut trie = Vec::new();
    trie.extend_from_slice(&(map.len() as u32).to_le_bytes());
    for row in 0..map.len() {
        let pk = map
            .primary_key(row as SegmentRowId)
            .map_err(|e| SegmentError::Encoding(crate::encoding::EncodingError::Custom(e.to_string())))?;
        write_primary_key(&mut trie, pk);
        trie.extend_from_slice(&(row as u32).to_le_bytes());
    }

    builder.write_component(None, ComponentType::PrimaryKeyBlocks, &blocks)?;
    builder.write_component(None, ComponentType::PrimaryKeyBlockOffsets, &offsets)?;
    builder.write_component(None, ComponentType::PrimaryKeyTrie, &trie)?;
    builder.write_component(None, ComponentType::TokenValues, &tokens)?;
    builder.write_component(None, ComponentType::OffsetsValues, &pk_lengths)?;
    builder.write_marker(None, ComponentType::GroupCompletionMarker)?;
    Ok(())
}

/// Deletes every shared per-SSTable component under `directory` — used
/// when no column's build succeeded, so the group never earns a
/// completion marker (spec.md §4.5: "per-SSTable token/offset files are
/// deleted too if no column succeeded"). Mirrors
/// [`super::builder::purge_column`]'s per-column counterpart.
pub fn purge_group(directory: &std::path::Path, sstable_name: &str, version: u16) -> Result<(), SegmentError> {
    const SHARED: &[ComponentType] = &[
        ComponentType::PrimaryKeyTrie,
        ComponentType::PrimaryKeyBlocks,
        ComponentType::PrimaryKeyBlockOffsets,
        ComponentType::TokenValues,
        ComponentType::OffsetsValues,
        ComponentType::GroupCompletionMarker,
    ];
    for &component in SHARED {
        let path = super::component_path(directory, sstable_name, version, 0, None, component);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|source| SegmentError::Io { path, source })?;
        }
    }
    Ok(())
}

/// A parsed, read-only view over one SSTable's shared primary-key
/// components.
pub struct PrimaryKeyLayoutReader {
    blocks: Vec<u8>,
    block_offsets: Vec<u32>,
    trie: Vec<(PrimaryKey, SegmentRowId)>,
    tokens: Vec<i64>,
}

impl PrimaryKeyLayoutReader {
    /// Parses already footer-validated component bodies (callers run them
    /// through [`super::read_and_validate_footer`] first).
    pub fn open(blocks_body: &[u8], offsets_body: &[u8], trie_body: &[u8], tokens_body: &[u8]) -> Result<Self, SegmentError> {
        let mut offset = 0;
        let mut block_offsets = Vec::new();
        while offset + 4 <= offsets_body.len() {
            block_offsets.push(read_u32(offsets_body, &mut offset)?);
        }

        let mut trie_offset = 0;
        let trie_count = read_u32(trie_body, &mut trie_offset)? as usize;
        let mut trie = Vec::with_capacity(trie_count);
        for _ in 0..trie_count {
            let pk = read_primary_key(trie_body, &mut trie_offset)?;
            let row = read_u32(trie_body, &mut trie_offset)?;
            trie.push((pk, row));
        }

        let mut token_offset = 0;
        let mut tokens = Vec::new();
        while token_offset + 8 <= tokens_body.len() {
            tokens.push(read_i64(tokens_body, &mut token_offset)?);
        }

        Ok(Self {
            blocks: blocks_body.to_vec(),
            block_offsets,
            trie,
            tokens,
        })
    }

    /// Number of rows in this SSTable's index.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether this SSTable's index has no rows.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Resolves `row_id` to its full primary key via the blocks + offsets
    /// pair.
    pub fn primary_key(&self, row_id: SegmentRowId) -> Result<PrimaryKey, SegmentError> {
        let idx = row_id as usize;
        let start = *self.block_offsets.get(idx).ok_or_else(|| {
            SegmentError::Encoding(crate::encoding::EncodingError::Custom("row id out of bounds".into()))
        })? as usize;
        let mut cursor = start;
        read_primary_key(&self.blocks, &mut cursor)
    }

    /// Resolves a primary key to its row id via the flat sorted trie
    /// array.
    pub fn row_id(&self, pk: &PrimaryKey) -> Option<SegmentRowId> {
        self.trie
            .binary_search_by(|(candidate, _)| candidate.cmp(pk))
            .ok()
            .map(|idx| self.trie[idx].1)
    }

    /// Returns the row-id range `[lo, hi)` whose tokens fall within
    /// `[start, end)`, via binary search over the dense token array —
    /// the fast path spec.md §4.5 calls "token-range filtering" without
    /// decoding any primary key.
    pub fn row_ids_in_token_range(&self, start: i64, end: i64) -> Range<usize> {
        let lo = self.tokens.partition_point(|&t| t < start);
        let hi = self.tokens.partition_point(|&t| t < end);
        lo..hi
    }
}
