// NPY bitmap stacks — minimal reader/writer for packed sketch bitmaps
//
// The sketch archives ship one .npy file per category holding a stack of
// 8-bit grayscale bitmaps, either flat `(n, d)` rows or `(n, h, w)` planes.
// Only the subset those files use is supported:
//
//   magic \x93NUMPY | version 1.0 | header_len (u16 LE) | header dict | data
//
// with dtype `|u1` and C order.  The header is an ASCII python dict
// literal, e.g. `{'descr': '|u1', 'fortran_order': False, 'shape': (1000, 784), }`,
// space-padded so the data starts on a 64-byte boundary.

use std::fs;
use std::path::Path;

/// NPY magic bytes.
const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Error type for NPY parsing.
#[derive(Debug, thiserror::Error)]
pub enum NpyError {
    #[error("invalid magic: expected \\x93NUMPY, got {got:?}")]
    InvalidMagic { got: Vec<u8> },

    #[error("unsupported version {major}.{minor} (only 1.0)")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("unsupported dtype {0:?} (only '|u1')")]
    UnsupportedDType(String),

    #[error("fortran-order arrays are not supported")]
    FortranOrder,

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("data length mismatch: shape {shape:?} needs {expected} bytes, got {got}")]
    LengthMismatch {
        shape: Vec<usize>,
        expected: usize,
        got: usize,
    },

    #[error("unsupported shape {0:?}")]
    UnsupportedShape(Vec<usize>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A parsed `u8` NPY array: shape plus raw C-order data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub data: Vec<u8>,
}

/// Read and parse a `.npy` file.
pub fn read_npy(path: impl AsRef<Path>) -> Result<NpyArray, NpyError> {
    let bytes = fs::read(path.as_ref())?;
    parse_npy(&bytes)
}

/// Parse `.npy` bytes.
pub fn parse_npy(data: &[u8]) -> Result<NpyArray, NpyError> {
    if data.len() < 10 {
        return Err(NpyError::MalformedHeader(
            "file shorter than the fixed preamble".into(),
        ));
    }
    if &data[..6] != MAGIC {
        return Err(NpyError::InvalidMagic {
            got: data[..6].to_vec(),
        });
    }
    let (major, minor) = (data[6], data[7]);
    if (major, minor) != (1, 0) {
        return Err(NpyError::UnsupportedVersion { major, minor });
    }

    let header_len = u16::from_le_bytes([data[8], data[9]]) as usize;
    let body_start = 10 + header_len;
    if data.len() < body_start {
        return Err(NpyError::MalformedHeader(format!(
            "declared header length {header_len} exceeds file size"
        )));
    }
    let header = std::str::from_utf8(&data[10..body_start])
        .map_err(|_| NpyError::MalformedHeader("header is not ASCII".into()))?;

    let descr = dict_str_value(header, "descr")?;
    if descr != "|u1" {
        return Err(NpyError::UnsupportedDType(descr));
    }
    if dict_raw_value(header, "fortran_order")?.starts_with("True") {
        return Err(NpyError::FortranOrder);
    }
    let shape = parse_shape(&dict_raw_value(header, "shape")?)?;

    let expected: usize = shape.iter().product();
    let body = &data[body_start..];
    if body.len() != expected {
        return Err(NpyError::LengthMismatch {
            shape,
            expected,
            got: body.len(),
        });
    }

    Ok(NpyArray {
        shape,
        data: body.to_vec(),
    })
}

/// Extract the quoted string value of a `'key': '...'` header entry.
fn dict_str_value(header: &str, key: &str) -> Result<String, NpyError> {
    let raw = dict_raw_value(header, key)?;
    if !raw.starts_with('\'') {
        return Err(NpyError::MalformedHeader(format!(
            "expected quoted value for '{key}'"
        )));
    }
    match raw[1..].find('\'') {
        Some(end) => Ok(raw[1..1 + end].to_string()),
        None => Err(NpyError::MalformedHeader(format!(
            "unterminated value for '{key}'"
        ))),
    }
}

/// Extract the raw text following `'key':` up to the end of the header.
fn dict_raw_value(header: &str, key: &str) -> Result<String, NpyError> {
    let pattern = format!("'{key}':");
    let start = header
        .find(&pattern)
        .ok_or_else(|| NpyError::MalformedHeader(format!("missing '{key}' entry")))?
        + pattern.len();
    Ok(header[start..].trim_start().to_string())
}

/// Parse a python tuple literal like `(1000, 28, 28)` into dimensions.
fn parse_shape(raw: &str) -> Result<Vec<usize>, NpyError> {
    let open = raw
        .find('(')
        .ok_or_else(|| NpyError::MalformedHeader("shape is not a tuple".into()))?;
    let close = raw
        .find(')')
        .ok_or_else(|| NpyError::MalformedHeader("unterminated shape tuple".into()))?;

    let mut dims = Vec::new();
    for part in raw[open + 1..close].split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue; // trailing comma, as in 1-tuples
        }
        let dim = part
            .parse::<usize>()
            .map_err(|_| NpyError::MalformedHeader(format!("bad shape dimension '{part}'")))?;
        dims.push(dim);
    }
    Ok(dims)
}

// Writer helpers

/// Serialize an array into `.npy` bytes (version 1.0, dtype `|u1`).
///
/// Useful for tests and for synthesizing small fixture stacks.
pub fn build_npy_bytes(shape: &[usize], data: &[u8]) -> Vec<u8> {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    let shape_str = if dims.len() == 1 {
        format!("({},)", dims[0])
    } else {
        format!("({})", dims.join(", "))
    };
    let mut header = format!("{{'descr': '|u1', 'fortran_order': False, 'shape': {shape_str}, }}");

    // Space-pad so preamble + header + '\n' lands on a 64-byte boundary
    let unpadded = 10 + header.len() + 1;
    header.push_str(&" ".repeat(unpadded.div_ceil(64) * 64 - unpadded));
    header.push('\n');

    let mut buf = Vec::with_capacity(10 + header.len() + data.len());
    buf.extend_from_slice(MAGIC);
    buf.push(1);
    buf.push(0);
    buf.extend_from_slice(&(header.len() as u16).to_le_bytes());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(data);
    buf
}

/// Write an array to a `.npy` file.
pub fn write_npy(path: impl AsRef<Path>, array: &NpyArray) -> Result<(), NpyError> {
    fs::write(path.as_ref(), build_npy_bytes(&array.shape, &array.data))?;
    Ok(())
}

// Bitmap stacks

/// A validated view of an NPY array as a stack of single-channel bitmaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapStack {
    count: usize,
    height: usize,
    width: usize,
    data: Vec<u8>,
}

impl BitmapStack {
    /// Interpret an array as a bitmap stack.
    ///
    /// Rank-3 arrays are `(count, height, width)`.  Rank-2 arrays are
    /// `(count, d)` flat rows and require `d` to be a perfect square
    /// (784 → 28×28, the sketch-archive layout).
    pub fn from_array(array: NpyArray) -> Result<Self, NpyError> {
        let NpyArray { shape, data } = array;

        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(NpyError::LengthMismatch {
                shape,
                expected,
                got: data.len(),
            });
        }

        match shape.as_slice() {
            &[count, height, width] => Ok(Self {
                count,
                height,
                width,
                data,
            }),
            &[count, d] => {
                let side = (d as f64).sqrt().round() as usize;
                if side * side != d {
                    return Err(NpyError::UnsupportedShape(shape.clone()));
                }
                Ok(Self {
                    count,
                    height: side,
                    width: side,
                    data,
                })
            }
            _ => Err(NpyError::UnsupportedShape(shape.clone())),
        }
    }

    /// Number of bitmaps in the stack.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Bitmap dimensions as (height, width).
    pub fn dims(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Raw pixels of the i-th bitmap, row-major.
    pub fn bitmap(&self, i: usize) -> &[u8] {
        let len = self.height * self.width;
        &self.data[i * len..(i + 1) * len]
    }
}
