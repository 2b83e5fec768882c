// Error types shared across the crate

use std::path::PathBuf;

/// All errors that can occur while converting, indexing, or reading a
/// sketch dataset.
///
/// One enum covers the whole pipeline: configuration problems caught before
/// any file I/O, open-time lookups, per-retrieval decode failures, and the
/// bitmap-stack format errors from the converter input. Using a single error
/// type across the library simplifies error propagation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid caller-supplied configuration: bad category map, missing or
    /// unmapped category subdirectory, invalid split ratios.
    #[error("configuration: {0}")]
    Configuration(String),

    /// Image root or label-table file missing at open time.
    #[error("not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Out-of-range index passed to `get`.
    #[error("index {index} out of bounds for dataset of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A referenced image file is missing, truncated, or not decodable.
    #[error("decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    /// An image could not be encoded or written during bulk conversion.
    #[error("encode {}: {reason}", path.display())]
    Encode { path: PathBuf, reason: String },

    /// A persisted label table violates its invariants (duplicate paths).
    #[error("malformed label table {}: {reason}", path.display())]
    MalformedTable { path: PathBuf, reason: String },

    /// Samples with different pixel shapes collated into one batch.
    #[error("batch shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Bitmap-stack (.npy) input could not be parsed.
    #[error("bitmap stack: {0}")]
    Bitmap(#[from] crate::npy::NpyError),

    /// CSV-level failure while writing a label table or opening one for
    /// reading. Rows that fail to parse surface as [`MalformedTable`]
    /// instead.
    ///
    /// [`MalformedTable`]: Error::MalformedTable
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error outside the categories above.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error from any string message.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }
}

/// Convenience Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
