//! Read-only view over a serialized literal index dictionary, as produced
//! by [`super::writer::LiteralIndexWriter::finish`].
//!
//! Parses the `TERMS_FOOTER_POINTER` directory (`[term_count][term_len]
//! [term][data_offset][data_len]...`) into an offset table once at open
//! time, resolving each term's postings from `TERMS_DATA` by slicing at
//! `[data_offset, data_offset + data_len)`. `exact_match`/`range_match`
//! binary search the directory — the same "mmap once, binary-search the
//! index" shape as `src/sstable/mod.rs`'s block index, with term bytes in
//! place of separator keys.

use std::ops::Range;

use crate::posting::{EncodedPostingList, Union};

use super::LiteralIndexError;

struct Entry {
    term: Range<usize>,
    posting: Range<usize>,
}

/// A parsed, read-only literal index over its two serialized components.
pub struct LiteralIndexReader<'a> {
    data: &'a [u8],
    directory: &'a [u8],
    entries: Vec<Entry>,
}

impl<'a> LiteralIndexReader<'a> {
    /// Parses `data` (`TERMS_DATA`) and `directory` (`TERMS_FOOTER_POINTER`,
    /// as written by [`super::writer::LiteralIndexWriter`]) into an offset
    /// table, validating that terms are strictly ascending.
    pub fn open(data: &'a [u8], directory: &'a [u8]) -> Result<Self, LiteralIndexError> {
        if directory.len() < 4 {
            return Err(LiteralIndexError::Corrupt("truncated term count".into()));
        }
        let term_count = u32::from_le_bytes([directory[0], directory[1], directory[2], directory[3]]);
        let mut offset = 4;
        let mut entries = Vec::with_capacity(term_count as usize);

        for _ in 0..term_count {
            let term_len = read_u32(directory, offset)?;
            offset += 4;
            let term = offset..offset + term_len as usize;
            check_bounds(directory, term.end)?;
            offset = term.end;

            let data_offset = read_u32(directory, offset)? as usize;
            offset += 4;
            let data_len = read_u32(directory, offset)? as usize;
            offset += 4;
            let posting = data_offset..data_offset + data_len;
            check_bounds(data, posting.end)?;

            if let Some(prev) = entries.last() {
                let prev: &Entry = prev;
                if directory[term.clone()] <= directory[prev.term.clone()] {
                    return Err(LiteralIndexError::Corrupt(
                        "terms out of order in dictionary".into(),
                    ));
                }
            }
            entries.push(Entry { term, posting });
        }

        Ok(Self { data, directory, entries })
    }

    /// Number of distinct terms in this dictionary.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the dictionary holds no terms.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn term_bytes(&self, entry: &Entry) -> &'a [u8] {
        &self.directory[entry.term.clone()]
    }

    fn decode(&self, entry: &Entry) -> Result<EncodedPostingList, LiteralIndexError> {
        Ok(EncodedPostingList::decode(&self.data[entry.posting.clone()])?)
    }

    fn find(&self, term: &[u8]) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| self.term_bytes(e).cmp(term))
    }

    /// Returns the posting list for an exact term match, if present.
    pub fn exact_match(&self, term: &[u8]) -> Result<Option<EncodedPostingList>, LiteralIndexError> {
        match self.find(term) {
            Ok(idx) => Ok(Some(self.decode(&self.entries[idx])?)),
            Err(_) => Ok(None),
        }
    }

    /// Returns the union of postings for every term in `[start, end)`.
    /// Pass `start = &[]` for an open lower bound and `end = None` for an
    /// open upper bound.
    pub fn range_match(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
    ) -> Result<Union<'a>, LiteralIndexError> {
        let lo = self.entries.partition_point(|e| self.term_bytes(e) < start);
        let hi = match end {
            Some(end) => self.entries.partition_point(|e| self.term_bytes(e) < end),
            None => self.entries.len(),
        };

        let mut children: Vec<Box<dyn crate::posting::PostingIterator + 'a>> = Vec::new();
        for entry in &self.entries[lo..hi] {
            children.push(Box::new(self.decode(entry)?));
        }
        Ok(Union::new(children))
    }

    /// Iterates every term in ascending order, without decoding postings.
    pub fn all_terms(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        self.entries.iter().map(move |e| self.term_bytes(e))
    }
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, LiteralIndexError> {
    let slice = buf
        .get(offset..offset + 4)
        .ok_or_else(|| LiteralIndexError::Corrupt("truncated length prefix".into()))?;
    Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

fn check_bounds(buf: &[u8], end: usize) -> Result<(), LiteralIndexError> {
    if end > buf.len() {
        return Err(LiteralIndexError::Corrupt("entry extends past buffer end".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::writer::LiteralIndexWriter;
    use crate::posting::PostingIterator;

    fn build(entries: &[(&[u8], &[u32])]) -> (Vec<u8>, Vec<u8>) {
        let mut writer = LiteralIndexWriter::new();
        for (term, rows) in entries {
            for &row in *rows {
                writer.add(term.to_vec(), row).unwrap();
            }
        }
        let components = writer.finish().unwrap();
        let data = components
            .iter()
            .find(|(c, _)| matches!(c, crate::segment::ComponentType::TermsData))
            .unwrap()
            .1
            .clone();
        let directory = components
            .iter()
            .find(|(c, _)| matches!(c, crate::segment::ComponentType::TermsFooterPointer))
            .unwrap()
            .1
            .clone();
        (data, directory)
    }

    #[test]
    fn exact_match_finds_term() {
        let (data, directory) = build(&[(b"alpha", &[1, 2]), (b"beta", &[3])]);
        let reader = LiteralIndexReader::open(&data, &directory).unwrap();
        let mut postings = reader.exact_match(b"alpha").unwrap().unwrap();
        assert_eq!(postings.next().unwrap(), 1);
        assert_eq!(postings.next().unwrap(), 2);
    }

    #[test]
    fn exact_match_missing_term_returns_none() {
        let (data, directory) = build(&[(b"alpha", &[1])]);
        let reader = LiteralIndexReader::open(&data, &directory).unwrap();
        assert!(reader.exact_match(b"zeta").unwrap().is_none());
    }

    #[test]
    fn range_match_unions_matching_terms() {
        let (data, directory) = build(&[(b"ant", &[1]), (b"bee", &[2]), (b"cat", &[3]), (b"dog", &[4])]);
        let reader = LiteralIndexReader::open(&data, &directory).unwrap();
        let mut union = reader.range_match(b"bee", Some(b"dog")).unwrap();
        let mut out = Vec::new();
        loop {
            let id = union.next().unwrap();
            if id == crate::posting::END_OF_STREAM {
                break;
            }
            out.push(id);
        }
        assert_eq!(out, vec![2, 3]);
    }

    #[test]
    fn all_terms_iterates_in_order() {
        let (data, directory) = build(&[(b"ant", &[1]), (b"bee", &[2])]);
        let reader = LiteralIndexReader::open(&data, &directory).unwrap();
        let terms: Vec<&[u8]> = reader.all_terms().collect();
        assert_eq!(terms, vec![b"ant".as_slice(), b"bee".as_slice()]);
    }
}
