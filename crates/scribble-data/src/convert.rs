// Bulk conversion — bitmap stacks to per-category PNG trees
//
// Input is a directory of `.npy` stacks, one per category, each file
// holding an array of grayscale bitmaps.  Output is
// `image_root/<category>/<category>_<index>.png`, the layout the index
// builder scans.  Conversion is one-shot and offline; the run fails on the
// first stack that cannot be parsed or written.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use image::GrayImage;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::npy::{read_npy, BitmapStack};

/// Per-category image counts from a conversion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertSummary {
    pub per_category: BTreeMap<String, usize>,
}

impl ConvertSummary {
    /// Total images written across all categories.
    pub fn total(&self) -> usize {
        self.per_category.values().sum()
    }
}

/// Convert every `.npy` stack under `raw_dir` into a PNG tree at
/// `image_root`.
///
/// The category name is the stack's file stem.  `limit` caps the number of
/// images written per category, for carving a small subset out of large
/// stacks.  Files without the `.npy` extension are skipped.
pub fn convert_directory(
    raw_dir: impl AsRef<Path>,
    image_root: impl AsRef<Path>,
    limit: Option<usize>,
) -> Result<ConvertSummary> {
    let raw_dir = raw_dir.as_ref();
    let image_root = image_root.as_ref();
    if !raw_dir.is_dir() {
        return Err(Error::config(format!(
            "raw directory {} is not a directory",
            raw_dir.display()
        )));
    }

    let mut stacks: Vec<(String, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(raw_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("npy") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            let stem = stem.to_string();
            stacks.push((stem, path));
        }
    }
    if stacks.is_empty() {
        return Err(Error::config(format!(
            "no .npy stacks found under {}",
            raw_dir.display()
        )));
    }
    stacks.sort();

    let mut summary = ConvertSummary::default();
    for (category, path) in stacks {
        let stack = BitmapStack::from_array(read_npy(&path)?)?;
        debug!(category = %category, bitmaps = stack.count(), "parsed stack");
        let written = convert_stack(&category, &stack, image_root, limit)?;
        info!(category = %category, written, "converted");
        summary.per_category.insert(category, written);
    }
    Ok(summary)
}

/// Write the bitmaps of one stack as PNG files under
/// `image_root/<category>/`, returning how many were written.
pub fn convert_stack(
    category: &str,
    stack: &BitmapStack,
    image_root: impl AsRef<Path>,
    limit: Option<usize>,
) -> Result<usize> {
    let dir = image_root.as_ref().join(category);
    std::fs::create_dir_all(&dir)?;

    let (height, width) = stack.dims();
    let count = limit.map_or(stack.count(), |l| l.min(stack.count()));
    for i in 0..count {
        let mut img = GrayImage::new(width as u32, height as u32);
        img.copy_from_slice(stack.bitmap(i));
        let path = dir.join(format!("{category}_{i:05}.png"));
        img.save(&path).map_err(|e| Error::Encode {
            path: path.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::npy::build_npy_bytes;
    use std::fs;

    /// A 3-bitmap 4x4 stack with distinct per-bitmap fill values.
    fn stack_bytes(fills: &[u8]) -> Vec<u8> {
        let data: Vec<u8> = fills.iter().flat_map(|&f| vec![f; 16]).collect();
        build_npy_bytes(&[fills.len(), 4, 4], &data)
    }

    #[test]
    fn converts_every_stack() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw");
        let out = dir.path().join("images");
        fs::create_dir(&raw).unwrap();
        fs::write(raw.join("circle.npy"), stack_bytes(&[10, 20, 30])).unwrap();
        fs::write(raw.join("square.npy"), stack_bytes(&[40, 50])).unwrap();
        fs::write(raw.join("notes.txt"), b"ignored").unwrap();

        let summary = convert_directory(&raw, &out, None).unwrap();
        assert_eq!(summary.per_category.get("circle"), Some(&3));
        assert_eq!(summary.per_category.get("square"), Some(&2));
        assert_eq!(summary.total(), 5);

        assert!(out.join("circle").join("circle_00000.png").is_file());
        assert!(out.join("circle").join("circle_00002.png").is_file());
        assert!(out.join("square").join("square_00001.png").is_file());
    }

    #[test]
    fn limit_caps_each_category() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw");
        let out = dir.path().join("images");
        fs::create_dir(&raw).unwrap();
        fs::write(raw.join("circle.npy"), stack_bytes(&[1, 2, 3])).unwrap();

        let summary = convert_directory(&raw, &out, Some(2)).unwrap();
        assert_eq!(summary.total(), 2);
        assert!(out.join("circle").join("circle_00001.png").is_file());
        assert!(!out.join("circle").join("circle_00002.png").exists());
    }

    #[test]
    fn pngs_decode_back_to_source_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw");
        let out = dir.path().join("images");
        fs::create_dir(&raw).unwrap();
        // Bitmap 1 is a gradient, not a flat fill
        let mut data = vec![9u8; 16];
        data.extend((0..16).map(|v| (v * 16) as u8));
        fs::write(raw.join("star.npy"), build_npy_bytes(&[2, 4, 4], &data)).unwrap();

        convert_directory(&raw, &out, None).unwrap();

        let png = image::open(out.join("star").join("star_00001.png"))
            .unwrap()
            .to_luma8();
        assert_eq!(png.dimensions(), (4, 4));
        assert_eq!(png.as_raw(), &data[16..]);
    }

    #[test]
    fn empty_raw_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw");
        fs::create_dir(&raw).unwrap();

        let err = convert_directory(&raw, dir.path().join("images"), None).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn missing_raw_dir_fails() {
        let dir = tempfile::tempdir().unwrap();

        let err =
            convert_directory(dir.path().join("gone"), dir.path().join("images"), None)
                .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn flattened_stack_converts() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw");
        let out = dir.path().join("images");
        fs::create_dir(&raw).unwrap();
        // [2, 16] infers 4x4 bitmaps
        let data: Vec<u8> = (0u8..32).collect();
        fs::write(raw.join("moon.npy"), build_npy_bytes(&[2, 16], &data)).unwrap();

        let summary = convert_directory(&raw, &out, None).unwrap();
        assert_eq!(summary.total(), 2);
        let png = image::open(out.join("moon").join("moon_00000.png"))
            .unwrap()
            .to_luma8();
        assert_eq!(png.dimensions(), (4, 4));
    }
}
