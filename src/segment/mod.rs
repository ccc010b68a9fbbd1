//! On-disk segment layout: component naming, footer checksums, and
//! per-SSTable/per-column file layout (spec.md §4.5, §6).
//!
//! Grounded on `src/sstable/mod.rs`'s header/footer checksum convention
//! (`[magic][version][crc32]`, validated on open) generalized from one
//! fixed SSTable file to many small named component files.

pub mod builder;
pub mod layout;

use std::path::PathBuf;

use crc32fast::Hasher as Crc32;
use thiserror::Error;

/// Magic number stamped on every non-marker component footer.
const COMPONENT_MAGIC: u32 = u32::from_le_bytes(*b"SAI0");

/// Footer size in bytes: `magic(4) + version(2) + crc32(4)`.
pub const FOOTER_SIZE: usize = 10;

/// Current on-disk format generation. Encoded in filenames as a two-letter
/// token (`AA` for generation 0) per spec.md §6.
pub const CURRENT_VERSION: u16 = 0;

/// Errors raised while building or opening segment components.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// Underlying filesystem operation failed.
    #[error("io error on {path}: {source}")]
    Io {
        /// Path the operation was attempted against.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A component file was shorter than [`FOOTER_SIZE`] or otherwise
    /// structurally truncated.
    #[error("truncated component at {path}")]
    Truncated {
        /// Path of the offending file.
        path: PathBuf,
    },

    /// The footer magic didn't match [`COMPONENT_MAGIC`].
    #[error("bad magic in component at {path}")]
    BadMagic {
        /// Path of the offending file.
        path: PathBuf,
    },

    /// The footer's CRC32 didn't match the recomputed checksum over the body.
    #[error("checksum mismatch in component at {path}")]
    ChecksumMismatch {
        /// Path of the offending file.
        path: PathBuf,
    },

    /// The on-disk format version is newer than this build understands.
    #[error("unsupported component version {found} (supports up to {max})")]
    UnsupportedVersion {
        /// Version read from the file.
        found: u16,
        /// Newest version this build knows how to read.
        max: u16,
    },

    /// A build-time fault injection hook fired (test-only).
    #[error("injected fault: {0}")]
    Injected(&'static str),

    /// Encoding/decoding a component's inner payload failed.
    #[error(transparent)]
    Encoding(#[from] crate::encoding::EncodingError),
}

/// The kinds of file SAI persists per spec.md §6's `ComponentType` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    /// Literal index: the term dictionary's posting-list payload, one
    /// blob per term concatenated in ascending term order, referenced by
    /// offset/length from `TERMS_FOOTER_POINTER`.
    TermsData,
    /// Literal index: the term directory — each term's bytes plus an
    /// offset/length pointer into `TERMS_DATA`'s posting blob.
    TermsFooterPointer,
    /// Shared posting-list payload (referenced by trie/tree entries).
    PostingLists,
    /// Numeric index block KD-tree node topology (min/max, depth, child
    /// pointers, and an offset/length pointer into `KD_TREE_POSTING_LISTS`
    /// for nodes that carry postings).
    KdTree,
    /// Numeric index: the posting-list payload for leaves and sampled
    /// internal nodes, referenced by offset from `KD_TREE`.
    KdTreePostingLists,
    /// Vector index graph adjacency (entry point + per-node neighbor list).
    AnnGraph,
    /// Vector index raw vectors, one per node ordinal.
    AnnVectors,
    /// Vector index PQ codebook + codes, when the segment trained one.
    AnnPq,
    /// Vector index ordinal → row-id map.
    AnnOrdinals,
    /// Per-column segment metadata (ranges, min/max term, row count).
    Meta,
    /// Empty marker file; presence means the column's build succeeded.
    ColumnCompletionMarker,
    /// Primary-key trie (shared across all columns in the SSTable).
    PrimaryKeyTrie,
    /// Primary-key data blocks.
    PrimaryKeyBlocks,
    /// Primary-key block offset table.
    PrimaryKeyBlockOffsets,
    /// Dense token array for token-range filtering.
    TokenValues,
    /// Offsets into `TOKEN_VALUES`.
    OffsetsValues,
    /// Empty marker file; presence means every column for the SSTable built.
    GroupCompletionMarker,
}

impl ComponentType {
    /// The filename segment this component type maps to, per spec.md §6.
    fn tag(self) -> &'static str {
        match self {
            Self::TermsData => "TERMS_DATA",
            Self::TermsFooterPointer => "TERMS_FOOTER_POINTER",
            Self::PostingLists => "POSTING_LISTS",
            Self::KdTree => "KD_TREE",
            Self::KdTreePostingLists => "KD_TREE_POSTING_LISTS",
            Self::AnnGraph => "ANN_GRAPH",
            Self::AnnVectors => "ANN_VECTORS",
            Self::AnnPq => "ANN_PQ",
            Self::AnnOrdinals => "ANN_ORDINALS",
            Self::Meta => "META",
            Self::ColumnCompletionMarker => "COLUMN_COMPLETION_MARKER",
            Self::PrimaryKeyTrie => "PRIMARY_KEY_TRIE",
            Self::PrimaryKeyBlocks => "PRIMARY_KEY_BLOCKS",
            Self::PrimaryKeyBlockOffsets => "PRIMARY_KEY_BLOCK_OFFSETS",
            Self::TokenValues => "TOKEN_VALUES",
            Self::OffsetsValues => "OFFSETS_VALUES",
            Self::GroupCompletionMarker => "GROUP_COMPLETION_MARKER",
        }
    }

    /// Whether this component type is an empty presence marker (no footer,
    /// no body — spec.md §4.5's "empty file; presence = success").
    pub fn is_marker(self) -> bool {
        matches!(self, Self::ColumnCompletionMarker | Self::GroupCompletionMarker)
    }

    /// Whether this component is scoped to one column (vs. shared by every
    /// column in the SSTable).
    pub fn is_per_column(self) -> bool {
        !matches!(
            self,
            Self::PrimaryKeyTrie
                | Self::PrimaryKeyBlocks
                | Self::PrimaryKeyBlockOffsets
                | Self::TokenValues
                | Self::OffsetsValues
                | Self::GroupCompletionMarker
        )
    }
}

fn version_token(version: u16) -> String {
    let hi = (version / 26) as u8;
    let lo = (version % 26) as u8;
    format!(
        "{}{}",
        (b'A' + hi.min(25)) as char,
        (b'A' + lo.min(25)) as char
    )
}

/// Builds the on-disk path for one component, per spec.md §6:
/// `<sstable>-SAI+<version>+<segment>+<column|>+<ComponentType>.db`. An
/// SSTable index aggregates `1..K` segments per column (spec.md §4.5); the
/// `segment` ordinal (0-based) keeps each segment's components from
/// colliding with the next one's.
pub fn component_path(
    directory: &std::path::Path,
    sstable_name: &str,
    version: u16,
    segment: u32,
    column: Option<&str>,
    component: ComponentType,
) -> PathBuf {
    let column_segment = column.unwrap_or("");
    let filename = format!(
        "{sstable_name}-SAI+{}+{segment:04}+{column_segment}+{}.db",
        version_token(version),
        component.tag()
    );
    directory.join(filename)
}

/// Appends `[magic:u32][version:u16][crc32:u32]` to `buf`, the checksum
/// computed over everything already in `buf` (the component body).
pub fn write_footer(buf: &mut Vec<u8>, version: u16) {
    let mut hasher = Crc32::new();
    hasher.update(buf);
    let crc = hasher.finalize();
    buf.extend_from_slice(&COMPONENT_MAGIC.to_le_bytes());
    buf.extend_from_slice(&version.to_le_bytes());
    buf.extend_from_slice(&crc.to_le_bytes());
}

/// Validates a component buffer's trailing footer and returns the body
/// slice (everything before the footer) on success.
pub fn read_and_validate_footer<'a>(
    buf: &'a [u8],
    path: &std::path::Path,
) -> Result<&'a [u8], SegmentError> {
    if buf.len() < FOOTER_SIZE {
        return Err(SegmentError::Truncated {
            path: path.to_path_buf(),
        });
    }
    let body_len = buf.len() - FOOTER_SIZE;
    let (body, footer) = buf.split_at(body_len);

    let magic = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    if magic != COMPONENT_MAGIC {
        return Err(SegmentError::BadMagic {
            path: path.to_path_buf(),
        });
    }
    let version = u16::from_le_bytes([footer[4], footer[5]]);
    if version > CURRENT_VERSION {
        return Err(SegmentError::UnsupportedVersion {
            found: version,
            max: CURRENT_VERSION,
        });
    }
    let stored_crc = u32::from_le_bytes([footer[6], footer[7], footer[8], footer[9]]);

    let mut hasher = Crc32::new();
    hasher.update(body);
    if hasher.finalize() != stored_crc {
        return Err(SegmentError::ChecksumMismatch {
            path: path.to_path_buf(),
        });
    }
    Ok(body)
}
