//! Column index configuration and DDL-time option validation.
//!
//! Modeled on the teacher's `engine::EngineConfig` — a plain struct
//! of tuning knobs — but validated eagerly at `CREATE CUSTOM INDEX` time
//! (spec class-1 errors: surfaced at statement prepare, no side effects),
//! the way `compaction` validates its strategy thresholds before
//! a compaction round ever runs.

use thiserror::Error;

/// Errors raised while validating a [`ColumnIndexOptions`] against an
/// [`IndexedColumnKind`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An option key was not recognised at all.
    #[error("unknown index option: {0}")]
    UnknownOption(String),

    /// An option was supplied for the wrong column kind (e.g.
    /// `bkd_postings_skip` on a literal index).
    #[error("option `{option}` is not valid for a {kind:?} index")]
    WrongKind {
        /// The offending option name.
        option: &'static str,
        /// The column kind it was applied to.
        kind: IndexedColumnKind,
    },

    /// A numeric option violated its documented bound.
    #[error("option `{option}` must be {constraint}, got {value}")]
    OutOfRange {
        /// The offending option name.
        option: &'static str,
        /// Human-readable constraint description.
        constraint: &'static str,
        /// The value that was rejected.
        value: i64,
    },

    /// An enum-valued option (`similarity_function`, `source_model`, ...)
    /// received a string that doesn't match any known variant.
    #[error("invalid value `{value}` for option `{option}`")]
    InvalidValue {
        /// The offending option name.
        option: &'static str,
        /// The unrecognised value.
        value: String,
    },
}

/// Discriminates the three kinds of indexable column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexedColumnKind {
    /// Strings, booleans, UUIDs, tuples, frozen collections, map
    /// keys/values/entries.
    Literal,
    /// All numeric and temporal types.
    Numeric,
    /// `vector<float, N>`.
    Vector,
}

/// The literal-collection variant a `Literal` index was declared over, if
/// any (§6 operator acceptance matrix — `KEYS`/`VALUES`/`ENTRIES`/`FULL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CollectionVariant {
    /// Not a collection column.
    #[default]
    None,
    /// `FULL(frozen<...>)`.
    Full,
    /// `KEYS(map)`.
    Keys,
    /// `VALUES(map)`.
    Values,
    /// `ENTRIES(map)`.
    Entries,
}

/// Tokenization/normalization pipeline applied to literal terms before they
/// are inserted into the trie. Deliberately limited per spec.md's
/// Non-goals: no SQL-style analyzer pipelines beyond these four knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexAnalyzer {
    /// No tokenization: the whole (cased, normalized, folded) value is one term.
    #[default]
    NoOp,
    /// Split on whitespace, emitting one term per token.
    Whitespace,
}

/// Vector similarity function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimilarityFunction {
    /// Cosine similarity (default). Rejects zero/near-zero/non-finite vectors.
    #[default]
    Cosine,
    /// Raw dot product.
    DotProduct,
    /// Negative squared Euclidean distance (larger = closer).
    Euclidean,
}

/// Named embedding-source presets selecting default similarity + PQ tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceModel {
    /// `text-embedding-ada-002` (OpenAI): 1536-dim, cosine.
    Ada002,
    /// `text-embedding-3-small` (OpenAI): 1536-dim, cosine.
    OpenAiV3Small,
    /// Google's `gecko` embedding family: 768-dim, cosine.
    Gecko,
    /// No known preset; use explicit options.
    #[default]
    Other,
}

impl SourceModel {
    fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "ada002" => Self::Ada002,
            "openai-v3-small" => Self::OpenAiV3Small,
            "gecko" => Self::Gecko,
            "other" => Self::Other,
            _ => return None,
        })
    }

    /// Default similarity function implied by this preset.
    pub fn default_similarity(self) -> SimilarityFunction {
        match self {
            Self::Ada002 | Self::OpenAiV3Small | Self::Gecko | Self::Other => {
                SimilarityFunction::Cosine
            }
        }
    }
}

/// Fully validated options for one column index descriptor.
///
/// Constructed only via [`ColumnIndexOptions::validate`]; an instance in
/// hand is guaranteed consistent with its [`IndexedColumnKind`].
#[derive(Debug, Clone)]
pub struct ColumnIndexOptions {
    /// Resolved column kind.
    pub kind: IndexedColumnKind,
    /// Collection variant, if `kind` is `Literal` over a collection.
    pub collection: CollectionVariant,

    // -- literal-only --
    /// Fold ASCII/unicode case before indexing (default true, i.e.
    /// case-*insensitive* requires `case_sensitive: false`).
    pub case_sensitive: bool,
    /// NFC-normalize before indexing.
    pub normalize: bool,
    /// ASCII-fold (strip diacritics) before indexing.
    pub ascii: bool,
    /// Tokenization pipeline.
    pub analyzer: IndexAnalyzer,

    // -- vector-only --
    /// Similarity function.
    pub similarity_function: SimilarityFunction,
    /// Embedding source preset.
    pub source_model: SourceModel,

    // -- numeric-only --
    /// Depth modulus controlling which internal BKD nodes get precomputed
    /// postings (`depth % bkd_postings_skip == 0`). `>= 1`.
    pub bkd_postings_skip: u32,
    /// Minimum descendant-leaf count for an internal BKD node to qualify
    /// for precomputed postings. `>= 1`.
    pub bkd_postings_min_leaves: u32,
}

impl Default for ColumnIndexOptions {
    fn default() -> Self {
        Self {
            kind: IndexedColumnKind::Literal,
            collection: CollectionVariant::None,
            case_sensitive: true,
            normalize: false,
            ascii: false,
            analyzer: IndexAnalyzer::NoOp,
            similarity_function: SimilarityFunction::Cosine,
            source_model: SourceModel::Other,
            bkd_postings_skip: 3,
            bkd_postings_min_leaves: 4,
        }
    }
}

/// Raw, unvalidated DDL options as the parser would hand them to us:
/// string keys, string values. Validation is the only place that ever
/// looks at the key spelling.
pub type RawOptions<'a> = &'a [(&'a str, &'a str)];

impl ColumnIndexOptions {
    /// Validates a raw option list against a declared column kind, failing
    /// fast (no side effects) the way spec.md class-1 errors require.
    pub fn validate(
        kind: IndexedColumnKind,
        collection: CollectionVariant,
        raw: RawOptions,
    ) -> Result<Self, ConfigError> {
        let mut opts = Self {
            kind,
            collection,
            ..Self::default()
        };

        for &(key, value) in raw {
            match key {
                "case_sensitive" => {
                    require_kind(kind, IndexedColumnKind::Literal, "case_sensitive")?;
                    opts.case_sensitive = parse_bool("case_sensitive", value)?;
                }
                "normalize" => {
                    require_kind(kind, IndexedColumnKind::Literal, "normalize")?;
                    opts.normalize = parse_bool("normalize", value)?;
                }
                "ascii" => {
                    require_kind(kind, IndexedColumnKind::Literal, "ascii")?;
                    opts.ascii = parse_bool("ascii", value)?;
                }
                "index_analyzer" => {
                    require_kind(kind, IndexedColumnKind::Literal, "index_analyzer")?;
                    opts.analyzer = match value {
                        "whitespace" => IndexAnalyzer::Whitespace,
                        _ => {
                            return Err(ConfigError::InvalidValue {
                                option: "index_analyzer",
                                value: value.to_string(),
                            });
                        }
                    };
                }
                "similarity_function" => {
                    require_kind(kind, IndexedColumnKind::Vector, "similarity_function")?;
                    opts.similarity_function = match value {
                        "cosine" => SimilarityFunction::Cosine,
                        "dot_product" => SimilarityFunction::DotProduct,
                        "euclidean" => SimilarityFunction::Euclidean,
                        _ => {
                            return Err(ConfigError::InvalidValue {
                                option: "similarity_function",
                                value: value.to_string(),
                            });
                        }
                    };
                }
                "source_model" => {
                    require_kind(kind, IndexedColumnKind::Vector, "source_model")?;
                    let model = SourceModel::parse(value).ok_or_else(|| ConfigError::InvalidValue {
                        option: "source_model",
                        value: value.to_string(),
                    })?;
                    opts.source_model = model;
                }
                "bkd_postings_skip" => {
                    require_kind(kind, IndexedColumnKind::Numeric, "bkd_postings_skip")?;
                    opts.bkd_postings_skip = parse_u32_min("bkd_postings_skip", value, 1)?;
                }
                "bkd_postings_min_leaves" => {
                    require_kind(kind, IndexedColumnKind::Numeric, "bkd_postings_min_leaves")?;
                    opts.bkd_postings_min_leaves =
                        parse_u32_min("bkd_postings_min_leaves", value, 1)?;
                }
                other => return Err(ConfigError::UnknownOption(other.to_string())),
            }
        }

        // `source_model` sets the similarity default when the caller didn't
        // explicitly pass `similarity_function`.
        if kind == IndexedColumnKind::Vector
            && !raw.iter().any(|&(k, _)| k == "similarity_function")
            && raw.iter().any(|&(k, _)| k == "source_model")
        {
            opts.similarity_function = opts.source_model.default_similarity();
        }

        Ok(opts)
    }
}

fn require_kind(
    actual: IndexedColumnKind,
    expected: IndexedColumnKind,
    option: &'static str,
) -> Result<(), ConfigError> {
    if actual == expected {
        Ok(())
    } else {
        Err(ConfigError::WrongKind {
            option,
            kind: actual,
        })
    }
}

fn parse_bool(option: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            option,
            value: value.to_string(),
        }),
    }
}

fn parse_u32_min(option: &'static str, value: &str, min: u32) -> Result<u32, ConfigError> {
    let parsed: i64 = value.parse().map_err(|_| ConfigError::InvalidValue {
        option,
        value: value.to_string(),
    })?;
    if parsed < min as i64 {
        return Err(ConfigError::OutOfRange {
            option,
            constraint: "greater than or equal to 1",
            value: parsed,
        });
    }
    u32::try_from(parsed).map_err(|_| ConfigError::OutOfRange {
        option,
        constraint: "representable as u32",
        value: parsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let opts = ColumnIndexOptions::default();
        assert!(opts.case_sensitive);
        assert!(!opts.normalize);
        assert_eq!(opts.bkd_postings_skip, 3);
        assert_eq!(opts.bkd_postings_min_leaves, 4);
    }

    #[test]
    fn rejects_wrong_kind_option() {
        let err = ColumnIndexOptions::validate(
            IndexedColumnKind::Literal,
            CollectionVariant::None,
            &[("bkd_postings_skip", "2")],
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::WrongKind { .. }));
    }

    #[test]
    fn rejects_unknown_option() {
        let err = ColumnIndexOptions::validate(
            IndexedColumnKind::Literal,
            CollectionVariant::None,
            &[("not_a_real_option", "x")],
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOption(_)));
    }

    #[test]
    fn rejects_bkd_skip_below_one() {
        let err = ColumnIndexOptions::validate(
            IndexedColumnKind::Numeric,
            CollectionVariant::None,
            &[("bkd_postings_skip", "0")],
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
    }

    #[test]
    fn source_model_sets_similarity_default() {
        let opts = ColumnIndexOptions::validate(
            IndexedColumnKind::Vector,
            CollectionVariant::None,
            &[("source_model", "ada002")],
        )
        .unwrap();
        assert_eq!(opts.similarity_function, SimilarityFunction::Cosine);
    }

    #[test]
    fn explicit_similarity_overrides_source_model_default() {
        // Order in the option list shouldn't matter; explicit always wins.
        let opts = ColumnIndexOptions::validate(
            IndexedColumnKind::Vector,
            CollectionVariant::None,
            &[("source_model", "ada002"), ("similarity_function", "euclidean")],
        )
        .unwrap();
        assert_eq!(opts.similarity_function, SimilarityFunction::Euclidean);
    }
}
