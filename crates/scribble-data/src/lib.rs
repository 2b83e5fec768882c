//! # scribble-data
//!
//! Dataset pipeline for hand-drawn sketch bitmaps.
//!
//! This crate provides:
//! - [`convert_directory`] — bulk conversion of `.npy` bitmap stacks into per-category PNG trees
//! - [`build_index`] — seeded train/validation/test label tables over an image tree
//! - [`LabeledImageDataset`] — lazily decoding dataset over a persisted label table
//! - [`DataLoader`] — batching, shuffling, parallel iteration over a Dataset
//! - [`PrefetchLoader`] — prefetching loader with background workers
//!   - NumPy `.npy` bitmap stack parser and writer
//!   - Pixel transforms — Normalize, Standardize, Compose
//!   - CSV label table persistence with duplicate detection

pub mod convert;
pub mod dataset;
pub mod error;
pub mod image_dataset;
pub mod index;
pub mod loader;
pub mod npy;
pub mod prefetch;
pub mod table;
pub mod transform;

pub use convert::{convert_directory, convert_stack, ConvertSummary};
pub use dataset::{Dataset, Sample};
pub use error::{Error, Result};
pub use image_dataset::LabeledImageDataset;
pub use index::{build_index, CategoryMap, SplitIndex, SplitRatios};
pub use loader::{BatchIterator, DataLoader, DataLoaderConfig, ImageBatch};
pub use npy::{BitmapStack, NpyArray};
pub use prefetch::{PrefetchConfig, PrefetchIterator, PrefetchLoader};
pub use table::{LabelTable, Record};
pub use transform::Transform;
