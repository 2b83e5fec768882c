// Label-table backed image dataset
//
// Holds the table and the image root only.  Nothing is cached and no file
// handles stay open: every `get` resolves the record's path against the
// root and decodes the image from scratch, so repeated calls with the same
// index are independent reads of the same file.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::dataset::{Dataset, Sample};
use crate::error::{Error, Result};
use crate::table::{LabelTable, Record};
use crate::transform::Transform;

/// Dataset over a [`LabelTable`] whose paths point at image files under a
/// common root.
///
/// Images decode lazily in [`Dataset::get`]; pixels come back as `f64` in
/// `0..=255` with shape `[1, height, width]` (single grayscale channel).
/// An attached [`Transform`] runs on every decoded sample.
pub struct LabeledImageDataset {
    table: LabelTable,
    image_root: PathBuf,
    transform: Option<Box<dyn Transform>>,
}

impl fmt::Debug for LabeledImageDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabeledImageDataset")
            .field("table", &self.table)
            .field("image_root", &self.image_root)
            .field("transform", &self.transform.as_ref().map(|_| "dyn Transform"))
            .finish()
    }
}

impl LabeledImageDataset {
    /// Open a dataset over `table` with paths resolved against `image_root`.
    ///
    /// Fails with `NotFound` when the root directory does not exist.  Image
    /// files are not touched here; a missing or corrupt file surfaces as a
    /// `Decode` error from the `get` that reaches for it.
    pub fn open(table: LabelTable, image_root: impl AsRef<Path>) -> Result<Self> {
        let image_root = image_root.as_ref().to_path_buf();
        if !image_root.is_dir() {
            return Err(Error::NotFound { path: image_root });
        }
        Ok(Self {
            table,
            image_root,
            transform: None,
        })
    }

    /// Open from a persisted label table file.
    pub fn open_csv(table_path: impl AsRef<Path>, image_root: impl AsRef<Path>) -> Result<Self> {
        let table = LabelTable::load(table_path)?;
        Self::open(table, image_root)
    }

    /// Attach a transform applied to every sample `get` returns.
    pub fn with_transform(mut self, transform: Box<dyn Transform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// The backing label table.
    pub fn table(&self) -> &LabelTable {
        &self.table
    }

    /// The directory paths resolve against.
    pub fn image_root(&self) -> &Path {
        &self.image_root
    }

    /// The record at `index` without decoding its image.
    pub fn record(&self, index: usize) -> Option<&Record> {
        self.table.get(index)
    }

    fn decode(&self, record: &Record) -> Result<Sample> {
        let path = self.image_root.join(&record.path);
        let image = image::open(&path).map_err(|e| Error::Decode {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let gray = image.to_luma8();
        let (width, height) = gray.dimensions();
        let pixels: Vec<f64> = gray.as_raw().iter().map(|&p| p as f64).collect();
        Ok(Sample {
            pixels,
            shape: vec![1, height as usize, width as usize],
            label: record.label,
        })
    }
}

impl Dataset for LabeledImageDataset {
    fn len(&self) -> usize {
        self.table.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let record = self.table.get(index).ok_or(Error::IndexOutOfBounds {
            index,
            len: self.table.len(),
        })?;
        let mut sample = self.decode(record)?;
        if let Some(transform) = &self.transform {
            sample = transform.apply(sample);
        }
        Ok(sample)
    }

    fn name(&self) -> &str {
        "labeled-images"
    }
}
