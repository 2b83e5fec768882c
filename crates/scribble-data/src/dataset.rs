// Dataset trait — random-access interface over labeled image samples

use crate::error::Result;

/// A single decoded sample: pixel data plus its class label.
///
/// Pixels are stored flattened in `[C, H, W]` layout (channel-first,
/// row-major) together with that shape, so samples can be collated into a
/// batch without re-inspecting the source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Flattened pixel values. The raw decode range is `[0, 255]`;
    /// transforms may rescale.
    pub pixels: Vec<f64>,
    /// Shape of the pixel data, `[channels, height, width]`.
    pub shape: Vec<usize>,
    /// Class label for this sample.
    pub label: u32,
}

impl Sample {
    /// Number of pixel values (the `shape` product).
    pub fn num_pixels(&self) -> usize {
        self.shape.iter().product()
    }
}

/// An indexed collection of samples.
///
/// Implementations must be `Send + Sync` so loaders can call `get` from
/// multiple worker threads; `get` must not rely on mutable state shared
/// between calls.
pub trait Dataset: Send + Sync {
    /// Total number of samples. Must be O(1).
    fn len(&self) -> usize;

    /// Whether the dataset is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retrieve the sample at position `index`.
    ///
    /// Fails with `IndexOutOfBounds` for `index >= len()`, and with
    /// `Decode` when the underlying record cannot be materialized.
    fn get(&self, index: usize) -> Result<Sample>;

    /// Optional human-readable name.
    fn name(&self) -> &str {
        "dataset"
    }
}
