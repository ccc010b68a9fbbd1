//! Value-to-term pipeline applied before a literal value enters the
//! dictionary: case fold, NFC normalize, ASCII fold, optional whitespace
//! tokenization (spec.md §4.2). Grounded on `unicode-normalization`'s NFC
//! iterator and `deunicode`'s transliteration table, both drawn from the
//! pack's text-handling examples (the teacher indexes opaque byte keys and
//! has no text pipeline of its own).

use deunicode::deunicode;
use unicode_normalization::UnicodeNormalization;

use crate::config::{ColumnIndexOptions, IndexAnalyzer};

use super::LiteralIndexError;

/// Transforms one raw column value into the term(s) it contributes to the
/// dictionary. Non-collection literal columns always produce exactly one
/// term unless `analyzer` tokenizes it further.
///
/// Bytes are only interpreted as UTF-8 text when a text-only option
/// (`case_sensitive: false`, `normalize`, `ascii`, or a non-default
/// `analyzer`) is configured; plain byte-comparable values (UUIDs, booleans,
/// raw collection element bytes) pass through untouched when none are set.
pub fn analyze(raw: &[u8], opts: &ColumnIndexOptions) -> Result<Vec<Vec<u8>>, LiteralIndexError> {
    let needs_text =
        !opts.case_sensitive || opts.normalize || opts.ascii || opts.analyzer != IndexAnalyzer::NoOp;
    if !needs_text {
        return Ok(vec![raw.to_vec()]);
    }

    let text = std::str::from_utf8(raw).map_err(|_| LiteralIndexError::NotUtf8)?;
    let mut owned = text.to_string();

    if opts.normalize {
        owned = owned.nfc().collect();
    }
    if opts.ascii {
        owned = deunicode(&owned);
    }
    if !opts.case_sensitive {
        owned = owned.to_lowercase();
    }

    let terms: Vec<String> = match opts.analyzer {
        IndexAnalyzer::NoOp => vec![owned],
        IndexAnalyzer::Whitespace => owned.split_whitespace().map(str::to_string).collect(),
    };

    Ok(terms.into_iter().map(String::into_bytes).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(case_sensitive: bool, normalize: bool, ascii: bool, analyzer: IndexAnalyzer) -> ColumnIndexOptions {
        ColumnIndexOptions {
            case_sensitive,
            normalize,
            ascii,
            analyzer,
            ..Default::default()
        }
    }

    #[test]
    fn passthrough_when_no_text_option_set() {
        let raw = [0xff, 0x00, 0x12];
        let terms = analyze(&raw, &opts(true, false, false, IndexAnalyzer::NoOp)).unwrap();
        assert_eq!(terms, vec![raw.to_vec()]);
    }

    #[test]
    fn case_folds_to_lowercase() {
        let terms = analyze(b"HeLLo", &opts(false, false, false, IndexAnalyzer::NoOp)).unwrap();
        assert_eq!(terms, vec![b"hello".to_vec()]);
    }

    #[test]
    fn ascii_folds_diacritics() {
        let terms = analyze("café".as_bytes(), &opts(true, false, true, IndexAnalyzer::NoOp)).unwrap();
        assert_eq!(terms, vec![b"cafe".to_vec()]);
    }

    #[test]
    fn whitespace_analyzer_tokenizes() {
        let terms = analyze(b"the quick fox", &opts(true, false, false, IndexAnalyzer::Whitespace)).unwrap();
        assert_eq!(terms, vec![b"the".to_vec(), b"quick".to_vec(), b"fox".to_vec()]);
    }

    #[test]
    fn text_option_on_non_utf8_bytes_errors() {
        let raw = [0xff, 0xfe];
        let err = analyze(&raw, &opts(false, false, false, IndexAnalyzer::NoOp)).unwrap_err();
        assert!(matches!(err, LiteralIndexError::NotUtf8));
    }
}
