// Label tables — ordered (path, label) records with CSV persistence
//
// Persisted form: one header row, columns `path,label`.  `path` is the
// record's location relative to the image root (`/`-separated) and acts as
// the table's primary key; `label` is a non-negative integer.  Record order
// in the file is the table's order — the post-shuffle order from index
// building, never re-sorted.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One indexed sample: a relative file path and its class label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Path relative to the image root, `/`-separated.
    pub path: String,
    /// Class label from the category map.
    pub label: u32,
}

impl Record {
    pub fn new(path: impl Into<String>, label: u32) -> Self {
        Self {
            path: path.into(),
            label,
        }
    }
}

/// An ordered sequence of records for one split.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    records: Vec<Record>,
}

impl LabelTable {
    /// Create a table from records, keeping their order.
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The record at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    /// All records in table order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Iterate over records in table order.
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Write the table as CSV (`path,label` header) to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path.as_ref())?;
        // Write the header ourselves: automatic headers appear only with the
        // first serialized record, which would leave an empty table headerless
        writer.write_record(["path", "label"])?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Load a table previously written by [`save`](LabelTable::save).
    ///
    /// Fails with `NotFound` if the file is missing and with
    /// `MalformedTable` if a row does not parse or a path appears twice.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::NotFound {
                path: path.to_path_buf(),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)?;

        let mut records = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for row in reader.deserialize() {
            let record: Record = row.map_err(|e| Error::MalformedTable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            if !seen.insert(record.path.clone()) {
                return Err(Error::MalformedTable {
                    path: path.to_path_buf(),
                    reason: format!("duplicate path '{}'", record.path),
                });
            }
            records.push(record);
        }
        Ok(Self { records })
    }
}

impl<'a> IntoIterator for &'a LabelTable {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> LabelTable {
        LabelTable::new(vec![
            Record::new("b/sketch_01.png", 1),
            Record::new("a/sketch_00.png", 0),
            Record::new("a/sketch_02.png", 0),
        ])
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("train.csv");

        let table = sample_table();
        table.save(&file).unwrap();
        let loaded = LabelTable::load(&file).unwrap();

        assert_eq!(loaded, table);
        // Order is preserved exactly, not re-sorted
        assert_eq!(loaded.get(0).unwrap().path, "b/sketch_01.png");
    }

    #[test]
    fn persisted_form_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("t.csv");
        sample_table().save(&file).unwrap();

        let text = std::fs::read_to_string(&file).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("path,label"));
        assert_eq!(lines.next(), Some("b/sketch_01.png,1"));
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = LabelTable::load(dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn duplicate_path_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("dup.csv");
        std::fs::write(&file, "path,label\na/x.png,0\na/x.png,1\n").unwrap();

        let err = LabelTable::load(&file).unwrap_err();
        assert!(matches!(err, Error::MalformedTable { .. }));
    }

    #[test]
    fn unparseable_label_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.csv");
        std::fs::write(&file, "path,label\na/x.png,not-a-number\n").unwrap();

        let err = LabelTable::load(&file).unwrap_err();
        assert!(matches!(err, Error::MalformedTable { .. }));
    }

    #[test]
    fn empty_table_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("empty.csv");

        LabelTable::default().save(&file).unwrap();

        // The header row must be on disk even with zero records.
        let text = std::fs::read_to_string(&file).unwrap();
        assert_eq!(text.lines().collect::<Vec<_>>(), vec!["path,label"]);

        let loaded = LabelTable::load(&file).unwrap();
        assert!(loaded.is_empty());
    }
}
