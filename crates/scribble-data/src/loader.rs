// DataLoader — batching, shuffling, iteration

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{thread_rng, SeedableRng};

use rayon::prelude::*;

use crate::dataset::{Dataset, Sample};
use crate::error::{Error, Result};
use crate::transform::Transform;

/// Configuration for the DataLoader.
#[derive(Debug, Clone)]
pub struct DataLoaderConfig {
    /// Number of samples per batch.
    pub batch_size: usize,
    /// Whether to shuffle indices each epoch.
    pub shuffle: bool,
    /// Whether to drop the last incomplete batch.
    pub drop_last: bool,
    /// Number of parallel workers for sample fetching (0 = sequential).
    pub num_workers: usize,
    /// Optional random seed for reproducible shuffling.
    pub seed: Option<u64>,
}

impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            shuffle: true,
            drop_last: false,
            num_workers: 0,
            seed: None,
        }
    }
}

impl DataLoaderConfig {
    pub fn batch_size(mut self, bs: usize) -> Self {
        self.batch_size = bs;
        self
    }

    pub fn shuffle(mut self, s: bool) -> Self {
        self.shuffle = s;
        self
    }

    pub fn drop_last(mut self, d: bool) -> Self {
        self.drop_last = d;
        self
    }

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn seed(mut self, s: u64) -> Self {
        self.seed = Some(s);
        self
    }
}

/// One batch of stacked samples.
///
/// `images` holds the samples' pixel runs back to back and `shape` is
/// `[batch, ..sample_shape]`, so a batch of eight 28x28 grayscale bitmaps
/// has shape `[8, 1, 28, 28]`.  `labels[i]` belongs to sample `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBatch {
    pub images: Vec<f64>,
    pub shape: Vec<usize>,
    pub labels: Vec<u32>,
}

impl ImageBatch {
    /// Number of samples stacked in this batch.
    pub fn batch_size(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }
}

/// Stack samples into one batch, leading dimension = sample count.
///
/// All samples must share one shape; the first sample sets it.
pub(crate) fn collate(samples: Vec<Sample>) -> Result<ImageBatch> {
    let Some(first) = samples.first() else {
        return Ok(ImageBatch {
            images: Vec::new(),
            shape: vec![0],
            labels: Vec::new(),
        });
    };

    let sample_shape = first.shape.clone();
    let mut shape = vec![samples.len()];
    shape.extend_from_slice(&sample_shape);

    let mut images: Vec<f64> = Vec::with_capacity(samples.len() * first.num_pixels());
    let mut labels: Vec<u32> = Vec::with_capacity(samples.len());
    for s in &samples {
        if s.shape != sample_shape {
            return Err(Error::ShapeMismatch {
                expected: sample_shape.clone(),
                got: s.shape.clone(),
            });
        }
        images.extend_from_slice(&s.pixels);
        labels.push(s.label);
    }

    Ok(ImageBatch {
        images,
        shape,
        labels,
    })
}

/// A DataLoader wraps a Dataset and produces [`ImageBatch`]es.
///
/// Every epoch visits each index exactly once; with `shuffle` on the visit
/// order is a fresh permutation per epoch.  The final batch is smaller when
/// the dataset length does not divide by `batch_size`, unless `drop_last`
/// discards it.
pub struct DataLoader<'a> {
    dataset: &'a dyn Dataset,
    config: DataLoaderConfig,
    transforms: Vec<Box<dyn Transform>>,
    indices: Vec<usize>,
}

impl<'a> DataLoader<'a> {
    /// Create a new DataLoader over a dataset.
    pub fn new(dataset: &'a dyn Dataset, config: DataLoaderConfig) -> Self {
        let indices: Vec<usize> = (0..dataset.len()).collect();
        Self {
            dataset,
            config,
            transforms: Vec::new(),
            indices,
        }
    }

    /// Add a transform to apply to each sample.
    pub fn with_transform(mut self, t: Box<dyn Transform>) -> Self {
        self.transforms.push(t);
        self
    }

    /// The number of batches per epoch.
    pub fn num_batches(&self) -> usize {
        if self.config.drop_last {
            self.dataset.len() / self.config.batch_size
        } else {
            self.dataset.len().div_ceil(self.config.batch_size)
        }
    }

    /// Total number of samples.
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Reshuffle indices (called at the start of each epoch).
    pub fn reshuffle(&mut self) {
        if self.config.shuffle {
            match self.config.seed {
                Some(seed) => {
                    let mut rng = StdRng::seed_from_u64(seed);
                    self.indices.shuffle(&mut rng);
                }
                None => {
                    let mut rng = thread_rng();
                    self.indices.shuffle(&mut rng);
                }
            }
        }
    }

    /// Fetch a slice of samples, optionally in parallel via rayon.
    fn fetch_samples(&self, indices: &[usize]) -> Result<Vec<Sample>> {
        let fetch_one = |&i: &usize| -> Result<Sample> {
            let mut s = self.dataset.get(i)?;
            for t in &self.transforms {
                s = t.apply(s);
            }
            Ok(s)
        };

        if self.config.num_workers > 0 && indices.len() > 1 {
            // Parallel fetch + transform
            indices.par_iter().map(fetch_one).collect()
        } else {
            // Sequential
            indices.iter().map(fetch_one).collect()
        }
    }

    /// Produce all batches for one epoch as a Vec.
    pub fn epoch_batches(&mut self) -> Result<Vec<ImageBatch>> {
        self.reshuffle();

        let bs = self.config.batch_size;
        let n = self.dataset.len();
        let num_batches = self.num_batches();
        let mut batches = Vec::with_capacity(num_batches);

        for batch_idx in 0..num_batches {
            let start = batch_idx * bs;
            let end = (start + bs).min(n);

            let batch_indices: Vec<usize> = (start..end).map(|i| self.indices[i]).collect();
            let samples = self.fetch_samples(&batch_indices)?;
            batches.push(collate(samples)?);
        }

        Ok(batches)
    }

    /// Iterate over batches one at a time (lower memory than `epoch_batches`).
    pub fn iter_batches(&mut self) -> BatchIterator<'_, 'a> {
        self.reshuffle();
        BatchIterator {
            loader: self,
            batch_idx: 0,
        }
    }
}

/// Iterator that yields one batch at a time.
pub struct BatchIterator<'l, 'a> {
    loader: &'l DataLoader<'a>,
    batch_idx: usize,
}

impl<'l, 'a> Iterator for BatchIterator<'l, 'a> {
    type Item = Result<ImageBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let bs = self.loader.config.batch_size;
        let n = self.loader.dataset.len();
        let start = self.batch_idx * bs;

        if start >= n {
            return None;
        }

        if self.loader.config.drop_last && start + bs > n {
            return None;
        }

        let end = (start + bs).min(n);
        self.batch_idx += 1;

        let batch_indices: Vec<usize> = (start..end).map(|i| self.loader.indices[i]).collect();
        let samples = match self.loader.fetch_samples(&batch_indices) {
            Ok(s) => s,
            Err(e) => return Some(Err(e)),
        };

        Some(collate(samples))
    }
}
