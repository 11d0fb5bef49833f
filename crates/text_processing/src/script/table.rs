//! Versioned Traditional to Simplified character table

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::{Result, TextProcessingError};

/// Header every table file must start with
pub const TABLE_HEADER: &str = "# t2s-chars v1";

const EMBEDDED_TABLE: &str = include_str!("../../data/t2s_chars.tsv");

static EMBEDDED: Lazy<CharTable> = Lazy::new(|| match CharTable::parse(EMBEDDED_TABLE) {
    Ok(table) => table,
    Err(e) => {
        tracing::error!(error = %e, "Embedded character table is invalid, using an empty table");
        CharTable::default()
    }
});

/// Per-character substitution table
///
/// No character is both a key and a value, so applying the table twice is
/// the same as applying it once.
#[derive(Debug, Clone, Default)]
pub struct CharTable {
    map: HashMap<char, char>,
}

impl CharTable {
    /// The table compiled into the crate
    pub fn embedded() -> &'static CharTable {
        &EMBEDDED
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let table = Self::parse(&content)?;
        tracing::info!(
            path = %path.as_ref().display(),
            entries = table.len(),
            "Loaded character table"
        );
        Ok(table)
    }

    /// Parse `traditional<TAB>simplified` lines after the version header
    pub fn parse(content: &str) -> Result<Self> {
        let mut lines = content.lines().enumerate();

        match lines.next() {
            Some((_, header)) if header.trim() == TABLE_HEADER => {}
            Some((_, header)) => {
                return Err(TextProcessingError::TableVersion(header.trim().to_string()))
            }
            None => return Err(TextProcessingError::TableVersion(String::new())),
        }

        let mut map = HashMap::new();
        for (idx, raw) in lines {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split('\t');
            let (from, to) = match (fields.next(), fields.next(), fields.next()) {
                (Some(from), Some(to), None) => (single_char(from), single_char(to)),
                _ => (None, None),
            };
            let (from, to) = match (from, to) {
                (Some(from), Some(to)) => (from, to),
                _ => {
                    return Err(TextProcessingError::TableParse {
                        line: idx + 1,
                        message: format!("expected two single characters, got '{}'", line),
                    })
                }
            };

            if from == to {
                continue;
            }
            if let Some(previous) = map.insert(from, to) {
                if previous != to {
                    return Err(TextProcessingError::TableParse {
                        line: idx + 1,
                        message: format!("'{}' already maps to '{}'", from, previous),
                    });
                }
            }
        }

        let targets: HashSet<char> = map.values().copied().collect();
        if let Some(c) = map.keys().find(|k| targets.contains(k)) {
            return Err(TextProcessingError::TableNotClosed(*c));
        }

        Ok(Self { map })
    }

    pub fn get(&self, c: char) -> Option<char> {
        self.map.get(&c).copied()
    }

    pub fn contains(&self, c: char) -> bool {
        self.map.contains_key(&c)
    }

    /// Source characters of the table
    pub fn keys(&self) -> impl Iterator<Item = char> + '_ {
        self.map.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

fn single_char(field: &str) -> Option<char> {
    let mut chars = field.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_table() {
        let table = CharTable::embedded();
        assert!(table.len() > 400);
        assert_eq!(table.get('劇'), Some('剧'));
        assert_eq!(table.get('剧'), None);
        assert!(!table.contains('著'));
    }

    #[test]
    fn test_parse_rejects_bad_header() {
        assert!(matches!(
            CharTable::parse("國\t国\n"),
            Err(TextProcessingError::TableVersion(_))
        ));
    }

    #[test]
    fn test_parse_rejects_chained_entries() {
        let content = format!("{}\n甲\t乙\n乙\t丙\n", TABLE_HEADER);
        assert!(matches!(
            CharTable::parse(&content),
            Err(TextProcessingError::TableNotClosed('乙'))
        ));
    }

    #[test]
    fn test_parse_reports_line() {
        let content = format!("{}\n國\t国\n壞行\n", TABLE_HEADER);
        assert!(matches!(
            CharTable::parse(&content),
            Err(TextProcessingError::TableParse { line: 3, .. })
        ));
    }

    #[test]
    fn test_lookup() {
        let table = CharTable::embedded();
        assert_eq!(table.get('國'), Some('国'));
        assert_eq!(table.get('国'), None);
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.tsv");
        std::fs::write(&path, format!("{}\n# comment\n\n龍\t龙\n", TABLE_HEADER)).unwrap();
        let table = CharTable::from_path(&path).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get('龍'), Some('龙'));
    }
}
