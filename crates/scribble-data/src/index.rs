// Index building — scan category directories, shuffle, slice into splits
//
// The builder walks `image_root/<category>/...`, pairs every file with the
// label from the caller's category map, applies one seeded permutation to
// the whole (path, label) sequence, and cuts it into three contiguous
// slices.  Paths and labels travel through the shuffle together as records;
// the split tables are slices of a single permuted sequence, never
// re-sorted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{Error, Result};
use crate::table::{LabelTable, Record};

// CategoryMap

/// Mapping from category name to class label.
///
/// Categories correspond 1:1 with subdirectories under the image root.
/// Iteration runs in sorted name order, which keeps directory scans
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryMap {
    inner: BTreeMap<String, u32>,
}

impl CategoryMap {
    /// Build a map from (name, label) pairs.
    ///
    /// Fails with `Configuration` if a name or a label repeats.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let mut inner = BTreeMap::new();
        let mut labels = std::collections::HashSet::new();
        for (name, label) in pairs {
            let name = name.into();
            if !labels.insert(label) {
                return Err(Error::config(format!("duplicate label {label}")));
            }
            if inner.insert(name.clone(), label).is_some() {
                return Err(Error::config(format!("duplicate category '{name}'")));
            }
        }
        Ok(Self { inner })
    }

    /// Discover categories from the subdirectories of `image_root`,
    /// assigning labels `0..n` in sorted name order.
    pub fn discover(image_root: impl AsRef<Path>) -> Result<Self> {
        let root = image_root.as_ref();
        if !root.is_dir() {
            return Err(Error::config(format!(
                "image root {} is not a directory",
                root.display()
            )));
        }
        let mut names: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let path = entry?.path();
            if path.is_dir() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        let inner = names.into_iter().zip(0u32..).collect();
        Ok(Self { inner })
    }

    /// The label for `category`, if mapped.
    pub fn label_of(&self, category: &str) -> Option<u32> {
        self.inner.get(category).copied()
    }

    /// Number of categories.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the map holds no categories.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterate over (name, label) pairs in sorted name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.inner.iter().map(|(n, &l)| (n.as_str(), l))
    }
}

// SplitRatios

/// Train/validation/test split fractions.
///
/// Each fraction must be non-negative and the three may sum to at most 1;
/// any remainder below 1 goes to the test slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitRatios {
    pub train: f64,
    pub valid: f64,
    pub test: f64,
}

impl SplitRatios {
    pub fn new(train: f64, valid: f64, test: f64) -> Self {
        Self { train, valid, test }
    }

    /// Check the ratio invariants. Runs before any file I/O.
    pub fn validate(&self) -> Result<()> {
        let parts = [self.train, self.valid, self.test];
        if parts.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(Error::config(format!(
                "split ratios must be non-negative, got ({}, {}, {})",
                self.train, self.valid, self.test
            )));
        }
        let sum: f64 = parts.iter().sum();
        if sum > 1.0 + 1e-9 {
            return Err(Error::config(format!(
                "split ratios sum to {sum}, must be <= 1"
            )));
        }
        Ok(())
    }
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.8,
            valid: 0.1,
            test: 0.1,
        }
    }
}

// SplitIndex

/// The three label tables produced by [`build_index`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndex {
    pub train: LabelTable,
    pub valid: LabelTable,
    pub test: LabelTable,
}

impl SplitIndex {
    /// File name used by `save_to` / `load_from` for the train table.
    pub const TRAIN_FILE: &'static str = "train.csv";
    /// File name for the validation table.
    pub const VALID_FILE: &'static str = "valid.csv";
    /// File name for the test table.
    pub const TEST_FILE: &'static str = "test.csv";

    /// Total records across the three splits.
    pub fn total_len(&self) -> usize {
        self.train.len() + self.valid.len() + self.test.len()
    }

    /// Persist all three tables under `dir`, creating it if needed.
    pub fn save_to(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        self.train.save(dir.join(Self::TRAIN_FILE))?;
        self.valid.save(dir.join(Self::VALID_FILE))?;
        self.test.save(dir.join(Self::TEST_FILE))?;
        Ok(())
    }

    /// Load all three tables previously written by `save_to`.
    pub fn load_from(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        Ok(Self {
            train: LabelTable::load(dir.join(Self::TRAIN_FILE))?,
            valid: LabelTable::load(dir.join(Self::VALID_FILE))?,
            test: LabelTable::load(dir.join(Self::TEST_FILE))?,
        })
    }
}

// build_index

/// Scan `image_root`, pair every file with its category's label, shuffle
/// once under `seed`, and cut train/validation/test tables.
///
/// Every category in `categories` must have a subdirectory, and every
/// subdirectory must be a mapped category — a file under an unmapped
/// directory would escape all three splits.  All regular files below a
/// category subdirectory count as records, nested directories included.
/// Slice sizes are `round(ratio * total)` for train and validation; the
/// test slice takes everything left, so the three slices exactly partition
/// the scanned files.
///
/// Identical inputs and seed always produce identical tables.
pub fn build_index(
    image_root: impl AsRef<Path>,
    categories: &CategoryMap,
    ratios: SplitRatios,
    seed: u64,
) -> Result<SplitIndex> {
    ratios.validate()?;

    let root = image_root.as_ref();
    if !root.is_dir() {
        return Err(Error::config(format!(
            "image root {} is not a directory",
            root.display()
        )));
    }
    if categories.is_empty() {
        return Err(Error::config("category map is empty"));
    }

    // Reject subdirectories the map does not know about
    for entry in std::fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if categories.label_of(&name).is_none() {
                return Err(Error::config(format!(
                    "subdirectory '{name}' has no entry in the category map"
                )));
            }
        }
    }

    // One record per file; categories in sorted order, files sorted within
    let mut records: Vec<Record> = Vec::new();
    for (name, label) in categories.iter() {
        let dir = root.join(name);
        if !dir.is_dir() {
            return Err(Error::config(format!(
                "category '{name}' has no subdirectory under {}",
                root.display()
            )));
        }
        let mut files: Vec<PathBuf> = Vec::new();
        collect_files(&dir, &mut files)?;
        files.sort();
        for file in files {
            records.push(Record::new(relative_path(root, &file), label));
        }
    }

    // One permutation over (path, label) pairs — never parallel arrays
    let mut rng = StdRng::seed_from_u64(seed);
    records.shuffle(&mut rng);

    let n = records.len();
    let train_end = ((n as f64 * ratios.train).round() as usize).min(n);
    let valid_end = (train_end + (n as f64 * ratios.valid).round() as usize).min(n);

    let test = records.split_off(valid_end);
    let valid = records.split_off(train_end);

    Ok(SplitIndex {
        train: LabelTable::new(records),
        valid: LabelTable::new(valid),
        test: LabelTable::new(test),
    })
}

/// Recursively collect regular files under `dir`.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Root-relative path with `/` separators.
fn relative_path(root: &Path, file: &Path) -> String {
    let rel = file.strip_prefix(root).unwrap_or(file);
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;

    /// Lay out `image_root/<category>/<category>_<i>.png` placeholder files.
    ///
    /// The builder never decodes, so empty files are enough here.
    fn fake_tree(root: &Path, counts: &[(&str, usize)]) {
        for (category, count) in counts {
            let dir = root.join(category);
            fs::create_dir_all(&dir).unwrap();
            for i in 0..*count {
                fs::write(dir.join(format!("{category}_{i:03}.png")), b"").unwrap();
            }
        }
    }

    fn ab_map() -> CategoryMap {
        CategoryMap::from_pairs([("a", 0u32), ("b", 1u32)]).unwrap()
    }

    #[test]
    fn ratios_reject_negative() {
        let err = SplitRatios::new(-0.1, 0.5, 0.5).validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn ratios_reject_sum_above_one() {
        let err = SplitRatios::new(0.8, 0.3, 0.2).validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn ratios_allow_sum_below_one() {
        SplitRatios::new(0.5, 0.2, 0.0).validate().unwrap();
    }

    #[test]
    fn category_map_rejects_duplicate_label() {
        let err = CategoryMap::from_pairs([("a", 0u32), ("b", 0u32)]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn discover_assigns_sorted_labels() {
        let dir = tempfile::tempdir().unwrap();
        fake_tree(dir.path(), &[("zebra", 1), ("apple", 1), ("mango", 1)]);

        let map = CategoryMap::discover(dir.path()).unwrap();
        assert_eq!(map.label_of("apple"), Some(0));
        assert_eq!(map.label_of("mango"), Some(1));
        assert_eq!(map.label_of("zebra"), Some(2));
    }

    #[test]
    fn missing_category_subdir_fails() {
        let dir = tempfile::tempdir().unwrap();
        fake_tree(dir.path(), &[("a", 2)]);

        let err = build_index(dir.path(), &ab_map(), SplitRatios::default(), 0).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn unmapped_subdir_fails() {
        let dir = tempfile::tempdir().unwrap();
        fake_tree(dir.path(), &[("a", 2), ("b", 2), ("stray", 1)]);

        let err = build_index(dir.path(), &ab_map(), SplitRatios::default(), 0).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn bad_ratios_fail_before_scanning() {
        // The root does not even exist; ratio validation must fire first
        let err = build_index(
            "/definitely/not/here",
            &ab_map(),
            SplitRatios::new(0.9, 0.9, 0.0),
            0,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn partition_is_total_and_disjoint() {
        let dir = tempfile::tempdir().unwrap();
        fake_tree(dir.path(), &[("a", 13), ("b", 8)]);

        let index = build_index(dir.path(), &ab_map(), SplitRatios::new(0.6, 0.2, 0.2), 7).unwrap();
        assert_eq!(index.total_len(), 21);

        let mut seen: HashSet<&str> = HashSet::new();
        for table in [&index.train, &index.valid, &index.test] {
            for record in table {
                assert!(seen.insert(&record.path), "path {} duplicated", record.path);
            }
        }
        assert_eq!(seen.len(), 21);
    }

    #[test]
    fn labels_match_top_level_subdir() {
        let dir = tempfile::tempdir().unwrap();
        fake_tree(dir.path(), &[("a", 5), ("b", 5)]);
        let map = ab_map();

        let index = build_index(dir.path(), &map, SplitRatios::default(), 11).unwrap();
        for table in [&index.train, &index.valid, &index.test] {
            for record in table {
                let top = record.path.split('/').next().unwrap();
                assert_eq!(record.label, map.label_of(top).unwrap());
            }
        }
    }

    #[test]
    fn nested_files_are_indexed() {
        let dir = tempfile::tempdir().unwrap();
        fake_tree(dir.path(), &[("a", 1), ("b", 1)]);
        let nested = dir.path().join("a").join("extra");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("deep.png"), b"").unwrap();

        let index = build_index(dir.path(), &ab_map(), SplitRatios::new(1.0, 0.0, 0.0), 0).unwrap();
        assert_eq!(index.total_len(), 3);
        let deep = index
            .train
            .iter()
            .find(|r| r.path == "a/extra/deep.png")
            .unwrap();
        assert_eq!(deep.label, 0);
    }

    #[test]
    fn same_seed_same_tables() {
        let dir = tempfile::tempdir().unwrap();
        fake_tree(dir.path(), &[("a", 9), ("b", 6)]);

        let first = build_index(dir.path(), &ab_map(), SplitRatios::default(), 42).unwrap();
        let second = build_index(dir.path(), &ab_map(), SplitRatios::default(), 42).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn different_seed_different_order() {
        let dir = tempfile::tempdir().unwrap();
        fake_tree(dir.path(), &[("a", 20), ("b", 20)]);

        let first = build_index(dir.path(), &ab_map(), SplitRatios::default(), 1).unwrap();
        let second = build_index(dir.path(), &ab_map(), SplitRatios::default(), 2).unwrap();
        assert_ne!(first.train, second.train);
    }

    #[test]
    fn remainder_goes_to_test() {
        let dir = tempfile::tempdir().unwrap();
        fake_tree(dir.path(), &[("a", 7), ("b", 3)]);

        // Ratios sum to 0.8; the missing 0.2 lands in the test slice
        let index = build_index(dir.path(), &ab_map(), SplitRatios::new(0.7, 0.1, 0.0), 3).unwrap();
        assert_eq!(index.train.len(), 7);
        assert_eq!(index.valid.len(), 1);
        assert_eq!(index.test.len(), 2);
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        fake_tree(dir.path(), &[("a", 4), ("b", 4)]);

        let index = build_index(dir.path(), &ab_map(), SplitRatios::default(), 5).unwrap();
        let out = dir.path().join("index");
        index.save_to(&out).unwrap();

        let loaded = SplitIndex::load_from(&out).unwrap();
        assert_eq!(loaded, index);
    }
}
