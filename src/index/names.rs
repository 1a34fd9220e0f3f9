//! Prefix table for searching cities and streets by name.

use std::collections::BTreeMap;

use super::writer::file_offset;
use crate::error::Result;

/// What an index entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    City,
    Street,
}

impl ObjectKind {
    pub fn code(&self) -> u8 {
        match self {
            ObjectKind::City => 1,
            ObjectKind::Street => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedObject {
    pub kind: ObjectKind,
    pub id: i64,
    pub offset: u32,
}

/// Drop a parenthesised part, keeping what follows the closing brace.
fn strip_braces(name: &str) -> String {
    let Some(open) = name.find('(') else {
        return name.to_string();
    };
    match name[open..].find(')') {
        Some(close) => format!("{} {}", name[..open].trim(), &name[open + close..]),
        None => name[..open].to_string(),
    }
}

/// Lower-cased runs of letters, digits and apostrophes. A hyphen next to a
/// digit stays inside its run, so `10-12` is one word.
fn split_words(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut words: Vec<String> = Vec::new();
    let mut start = None;
    for i in 0..=chars.len() {
        let keep = i < chars.len() && {
            let c = chars[i];
            let hyphen_near_digit = c == '-'
                && (chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())
                    || (i > 0 && chars[i - 1].is_ascii_digit()));
            c.is_alphanumeric() || c == '\'' || hyphen_near_digit
        };
        if keep {
            start.get_or_insert(i);
        } else if let Some(s) = start.take() {
            let word: String = chars[s..i].iter().collect::<String>().to_lowercase();
            if !words.contains(&word) {
                words.push(word);
            }
        }
    }
    words
}

pub struct NameIndex {
    prefix_length: usize,
    entries: BTreeMap<String, Vec<IndexedObject>>,
}

impl NameIndex {
    pub fn new(prefix_length: usize) -> Self {
        Self {
            prefix_length: prefix_length.max(1),
            entries: BTreeMap::new(),
        }
    }

    /// Register an object under the prefixes of each of its names.
    pub fn put<'n, I>(&mut self, kind: ObjectKind, id: i64, names: I, offset: u64) -> Result<()>
    where
        I: IntoIterator<Item = &'n str>,
    {
        let object = IndexedObject {
            kind,
            id,
            offset: file_offset(offset)?,
        };
        for name in names {
            for word in split_words(&strip_braces(name)) {
                let prefix: String = word.chars().take(self.prefix_length).collect();
                let list = self.entries.entry(prefix).or_default();
                if !list.iter().any(|o| o.kind == kind && o.id == id) {
                    list.push(object);
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, prefix: &str) -> &[IndexedObject] {
        self.entries.get(prefix).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[IndexedObject])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexError;

    #[test]
    fn test_split_words() {
        assert_eq!(split_words("O'Connell Street"), vec!["o'connell", "street"]);
        assert_eq!(split_words("Route 10-12, North"), vec!["route", "10-12", "north"]);
        assert_eq!(split_words("Saint-Denis"), vec!["saint", "denis"]);
        assert!(split_words(" -- ").is_empty());
    }

    #[test]
    fn test_strip_braces() {
        assert_eq!(strip_braces("Main (North Side)"), "Main )");
        assert_eq!(strip_braces("Main (North"), "Main ");
        assert_eq!(strip_braces("Main"), "Main");
    }

    #[test]
    fn test_prefixes_are_truncated_and_lowercased() {
        let mut index = NameIndex::new(4);
        index
            .put(ObjectKind::Street, 7, ["Springfield Avenue"], 100)
            .unwrap();
        assert_eq!(index.get("spri")[0].offset, 100);
        assert_eq!(index.get("aven")[0].id, 7);
        assert!(index.get("springfield").is_empty());
    }

    #[test]
    fn test_sub_area_suffix_is_not_indexed() {
        let mut index = NameIndex::new(4);
        index
            .put(ObjectKind::Street, 1, ["Main (North Side)"], 10)
            .unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.get("nort").is_empty());
    }

    #[test]
    fn test_no_duplicate_entries() {
        let mut index = NameIndex::new(4);
        index
            .put(ObjectKind::City, 1, ["Main Mainz", "Mainland"], 10)
            .unwrap();
        index.put(ObjectKind::City, 1, ["Main"], 10).unwrap();
        index.put(ObjectKind::Street, 1, ["Main"], 20).unwrap();
        let entries = index.get("main");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, ObjectKind::City);
        assert_eq!(entries[1].kind, ObjectKind::Street);
    }

    #[test]
    fn test_offset_overflow_rejected() {
        let mut index = NameIndex::new(4);
        let err = index
            .put(ObjectKind::City, 1, ["Main"], i32::MAX as u64 + 1)
            .unwrap_err();
        assert!(matches!(err, IndexError::OffsetOverflow(_)));
        assert!(index.is_empty());
    }
}
