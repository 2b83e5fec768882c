// PrefetchLoader — prefetching loader with background workers
//
// Spawns a pool of background threads that load, transform, and collate
// batches ahead of the consumer.  The consumer pulls ready batches from a
// bounded channel, overlapping decode work with whatever it does per batch.
//
// Usage:
//
//   let mut loader = PrefetchLoader::new(
//       dataset,
//       PrefetchConfig::default()
//           .batch_size(64)
//           .prefetch_factor(2)
//           .num_workers(4),
//   );
//
//   for _epoch in 0..num_epochs {
//       for batch in loader.iter_epoch() {
//           let batch = batch?;
//           // consume batch ...
//       }
//   }

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{thread_rng, SeedableRng};

use crate::dataset::{Dataset, Sample};
use crate::error::Result;
use crate::loader::{collate, ImageBatch};
use crate::transform::Transform;

// Configuration

/// Configuration for the prefetching loader.
#[derive(Debug, Clone)]
pub struct PrefetchConfig {
    /// Number of samples per batch.
    pub batch_size: usize,
    /// Whether to shuffle indices each epoch.
    pub shuffle: bool,
    /// Whether to drop the last incomplete batch.
    pub drop_last: bool,
    /// Number of background worker threads for loading + transforming.
    /// 0 still prefetches on a single background thread.
    pub num_workers: usize,
    /// How many batches to pre-load ahead of the consumer.
    /// Total buffered batches = prefetch_factor * max(num_workers, 1).
    pub prefetch_factor: usize,
    /// Optional random seed for reproducible shuffling.
    pub seed: Option<u64>,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            shuffle: true,
            drop_last: false,
            num_workers: 2,
            prefetch_factor: 2,
            seed: None,
        }
    }
}

impl PrefetchConfig {
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
    pub fn prefetch_factor(mut self, pf: usize) -> Self {
        self.prefetch_factor = pf;
        self
    }
    pub fn seed(mut self, s: u64) -> Self {
        self.seed = Some(s);
        self
    }
}

// PrefetchLoader

/// A loader that prefetches batches on background threads.
///
/// On each call to [`iter_epoch`](PrefetchLoader::iter_epoch), the loader:
/// 1. Optionally reshuffles indices.
/// 2. Spawns worker threads that load, transform, and collate batches.
/// 3. Returns an iterator that pulls ready batches from a bounded channel.
///
/// The channel capacity is `prefetch_factor * max(num_workers, 1)`, so at
/// most that many batches are materialised in memory at any time.  With more
/// than one worker the batches arrive in completion order, not index order;
/// every index of the epoch still appears in exactly one batch.
///
/// The dataset is held via `Arc<dyn Dataset>` so it can be safely shared
/// with background worker threads.
pub struct PrefetchLoader {
    dataset: Arc<dyn Dataset>,
    config: PrefetchConfig,
    transforms: Vec<Arc<dyn Transform>>,
    indices: Vec<usize>,
}

impl PrefetchLoader {
    /// Create a new prefetching loader.
    pub fn new(dataset: Arc<dyn Dataset>, config: PrefetchConfig) -> Self {
        let n = dataset.len();
        let indices: Vec<usize> = (0..n).collect();
        Self {
            dataset,
            config,
            transforms: Vec::new(),
            indices,
        }
    }

    /// Add a transform.
    pub fn with_transform(mut self, t: Arc<dyn Transform>) -> Self {
        self.transforms.push(t);
        self
    }

    /// Number of batches per epoch.
    pub fn num_batches(&self) -> usize {
        if self.config.drop_last {
            self.dataset.len() / self.config.batch_size
        } else {
            self.dataset.len().div_ceil(self.config.batch_size)
        }
    }

    /// Reshuffle indices.
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

    /// Iterate over one epoch of prefetched batches.
    ///
    /// Spawns background workers that load batches into a bounded channel.
    /// The returned iterator yields `Result<ImageBatch>` — one per batch.
    ///
    /// The background workers are joined when the iterator is dropped.
    pub fn iter_epoch(&mut self) -> PrefetchIterator {
        self.reshuffle();

        let bs = self.config.batch_size;
        let n = self.dataset.len();
        let num_batches = self.num_batches();
        let workers = self.config.num_workers.max(1);
        let capacity = (self.config.prefetch_factor * workers).max(1);

        // Build the list of batch index groups
        let mut batch_groups: Vec<Vec<usize>> = Vec::with_capacity(num_batches);
        for b in 0..num_batches {
            let start = b * bs;
            let end = (start + bs).min(n);
            batch_groups.push(self.indices[start..end].to_vec());
        }

        let (tx, rx) = mpsc::sync_channel::<Result<ImageBatch>>(capacity);

        // Shared work queue: each worker pops the next batch group
        let work_queue: Arc<Mutex<std::vec::IntoIter<Vec<usize>>>> =
            Arc::new(Mutex::new(batch_groups.into_iter()));

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let wq = work_queue.clone();
            let tx = tx.clone();
            let tfs = self.transforms.clone();
            let ds = self.dataset.clone();

            let handle = thread::spawn(move || {
                let dataset: &dyn Dataset = &*ds;

                loop {
                    // Pop the next batch group from the shared queue
                    let group = {
                        let mut q = wq.lock().unwrap();
                        q.next()
                    };
                    let sample_indices = match group {
                        Some(g) => g,
                        None => break, // no more work
                    };

                    let result = fetch_batch(dataset, &tfs, &sample_indices);

                    // Send to consumer — if receiver is dropped, stop
                    if tx.send(result).is_err() {
                        break;
                    }
                }
            });
            handles.push(handle);
        }

        // Drop the original sender so the channel closes when all workers finish
        drop(tx);

        PrefetchIterator {
            rx: Some(rx),
            handles: Some(handles),
            remaining: num_batches,
        }
    }
}

/// Load, transform, and collate one batch group.
fn fetch_batch(
    dataset: &dyn Dataset,
    transforms: &[Arc<dyn Transform>],
    indices: &[usize],
) -> Result<ImageBatch> {
    let samples = indices
        .iter()
        .map(|&i| {
            let mut s = dataset.get(i)?;
            for t in transforms {
                s = t.apply(s);
            }
            Ok(s)
        })
        .collect::<Result<Vec<Sample>>>()?;
    collate(samples)
}

// PrefetchIterator

/// An iterator that yields prefetched batches from background workers.
///
/// Workers are joined when the iterator is fully consumed or dropped.
pub struct PrefetchIterator {
    rx: Option<mpsc::Receiver<Result<ImageBatch>>>,
    handles: Option<Vec<thread::JoinHandle<()>>>,
    remaining: usize,
}

impl Iterator for PrefetchIterator {
    type Item = Result<ImageBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let rx = self.rx.as_ref()?;
        match rx.recv() {
            Ok(batch) => {
                self.remaining -= 1;
                Some(batch)
            }
            Err(_) => {
                // Channel closed — workers done (possibly early)
                self.remaining = 0;
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for PrefetchIterator {}

impl Drop for PrefetchIterator {
    fn drop(&mut self) {
        // Close the receiving end first so a worker blocked on a full
        // channel errors out of its send and exits
        drop(self.rx.take());
        // Join all worker threads
        if let Some(handles) = self.handles.take() {
            for h in handles {
                let _ = h.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct TinyDataset {
        samples: Vec<Sample>,
    }

    impl TinyDataset {
        fn new(n: usize) -> Self {
            let samples = (0..n)
                .map(|i| Sample {
                    pixels: vec![i as f64; 4],
                    shape: vec![1, 2, 2],
                    label: i as u32,
                })
                .collect();
            Self { samples }
        }
    }

    impl Dataset for TinyDataset {
        fn len(&self) -> usize {
            self.samples.len()
        }

        fn get(&self, index: usize) -> Result<Sample> {
            self.samples
                .get(index)
                .cloned()
                .ok_or(Error::IndexOutOfBounds {
                    index,
                    len: self.samples.len(),
                })
        }
    }

    struct FailingDataset;

    impl Dataset for FailingDataset {
        fn len(&self) -> usize {
            4
        }

        fn get(&self, index: usize) -> Result<Sample> {
            if index == 2 {
                return Err(Error::Decode {
                    path: "x.png".into(),
                    reason: "bad magic".into(),
                });
            }
            Ok(Sample {
                pixels: vec![0.0; 4],
                shape: vec![1, 2, 2],
                label: index as u32,
            })
        }
    }

    #[test]
    fn delivers_every_batch() {
        let ds: Arc<dyn Dataset> = Arc::new(TinyDataset::new(10));
        let config = PrefetchConfig::default()
            .batch_size(4)
            .shuffle(false)
            .num_workers(2);
        let mut loader = PrefetchLoader::new(ds, config);

        let batches: Vec<ImageBatch> = loader.iter_epoch().map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), loader.num_batches());

        let mut labels: Vec<u32> = batches.iter().flat_map(|b| b.labels.clone()).collect();
        labels.sort_unstable();
        assert_eq!(labels, (0..10).collect::<Vec<u32>>());
    }

    #[test]
    fn drop_last_yields_full_batches_only() {
        let ds: Arc<dyn Dataset> = Arc::new(TinyDataset::new(10));
        let config = PrefetchConfig::default()
            .batch_size(4)
            .shuffle(false)
            .drop_last(true);
        let mut loader = PrefetchLoader::new(ds, config);

        let sizes: Vec<usize> = loader.iter_epoch().map(|b| b.unwrap().batch_size()).collect();
        assert_eq!(sizes, vec![4, 4]);
    }

    #[test]
    fn early_drop_joins_workers() {
        let ds: Arc<dyn Dataset> = Arc::new(TinyDataset::new(64));
        let config = PrefetchConfig::default()
            .batch_size(1)
            .shuffle(false)
            .num_workers(2)
            .prefetch_factor(1);
        let mut loader = PrefetchLoader::new(ds, config);

        // Take a couple of batches, then drop the iterator mid-epoch.
        // Drop must unblock and join the workers instead of hanging.
        let taken: Vec<_> = loader.iter_epoch().take(2).collect();
        assert_eq!(taken.len(), 2);
    }

    #[test]
    fn dataset_error_reaches_consumer() {
        let ds: Arc<dyn Dataset> = Arc::new(FailingDataset);
        let config = PrefetchConfig::default().batch_size(2).shuffle(false);
        let mut loader = PrefetchLoader::new(ds, config);

        let results: Vec<Result<ImageBatch>> = loader.iter_epoch().collect();
        assert_eq!(results.len(), 2);
        assert!(results.iter().any(|r| matches!(r, Err(Error::Decode { .. }))));
    }

    #[test]
    fn single_worker_preserves_group_order() {
        let ds: Arc<dyn Dataset> = Arc::new(TinyDataset::new(9));
        let config = PrefetchConfig::default()
            .batch_size(3)
            .shuffle(false)
            .num_workers(0);
        let mut loader = PrefetchLoader::new(ds, config);

        let labels: Vec<u32> = loader
            .iter_epoch()
            .flat_map(|b| b.unwrap().labels)
            .collect();
        assert_eq!(labels, (0..9).collect::<Vec<u32>>());
    }

    #[test]
    fn transform_applies_before_collation() {
        use crate::transform::Normalize;

        let ds: Arc<dyn Dataset> = Arc::new(TinyDataset::new(2));
        let config = PrefetchConfig::default().batch_size(2).shuffle(false);
        let mut loader =
            PrefetchLoader::new(ds, config).with_transform(Arc::new(Normalize::new(2.0)));

        let batch = loader.iter_epoch().next().unwrap().unwrap();
        assert_eq!(batch.images[..4], [0.0; 4]);
        assert_eq!(batch.images[4..], [0.5; 4]);
    }
}
