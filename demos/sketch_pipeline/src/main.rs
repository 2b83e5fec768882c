// =============================================================================
// Sketch Dataset Pipeline — Scribble Data Library
// =============================================================================
//
// This demo runs the full pipeline end to end on synthesized data:
//
//   raw .npy bitmap stacks → per-category PNG tree → seeded split index
//   → lazily decoding dataset → batched / prefetched iteration
//
// Features demonstrated:
//   1. Bitmap stack synthesis and bulk conversion (convert_directory)
//   2. Category discovery and index building (build_index)
//   3. CSV label table persistence (SplitIndex::save_to)
//   4. LabeledImageDataset with a Normalize transform
//   5. DataLoader batching with per-epoch shuffling
//   6. PrefetchLoader with background workers
//
// Usage:
//   cargo run -p sketch-pipeline                                # synthesized stacks
//   cargo run -p sketch-pipeline -- --raw-dir path/to/stacks    # real archives
//   cargo run -p sketch-pipeline -- --out /tmp/demo --batch-size 16 --seed 3

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use scribble_data::npy::{write_npy, NpyArray};
use scribble_data::transform::Normalize;
use scribble_data::{
    build_index, convert_directory, CategoryMap, DataLoader, DataLoaderConfig, Dataset,
    LabeledImageDataset, PrefetchConfig, PrefetchLoader, SplitIndex, SplitRatios,
};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

struct Config {
    raw_dir: Option<PathBuf>,
    out_dir: PathBuf,
    batch_size: usize,
    seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            raw_dir: None,
            out_dir: PathBuf::from("scribble-demo"),
            batch_size: 8,
            seed: 7,
        }
    }
}

fn parse_args() -> Config {
    let mut cfg = Config::default();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--raw-dir" => {
                i += 1;
                cfg.raw_dir = Some(PathBuf::from(&args[i]));
            }
            "--out" => {
                i += 1;
                cfg.out_dir = PathBuf::from(&args[i]);
            }
            "--batch-size" => {
                i += 1;
                cfg.batch_size = args[i].parse().expect("invalid --batch-size");
            }
            "--seed" => {
                i += 1;
                cfg.seed = args[i].parse().expect("invalid --seed");
            }
            "--help" | "-h" => {
                println!("Sketch dataset pipeline demo for Scribble");
                println!();
                println!("Options:");
                println!("  --raw-dir <dir>     Existing .npy stacks (default: synthesize)");
                println!("  --out <dir>         Output directory (default: scribble-demo)");
                println!("  --batch-size <n>    Batch size (default: 8)");
                println!("  --seed <n>          Shuffle seed (default: 7)");
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                std::process::exit(1);
            }
        }
        i += 1;
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Fixture synthesis
// ─────────────────────────────────────────────────────────────────────────────

/// A stack of `count` deterministic 28x28 grayscale test patterns.
fn synth_stack(count: usize, phase: u8) -> NpyArray {
    let side = 28;
    let mut data = Vec::with_capacity(count * side * side);
    for i in 0..count {
        for y in 0..side {
            for x in 0..side {
                data.push(((x * 31 + y * 17 + i * 13) as u8).wrapping_add(phase));
            }
        }
    }
    NpyArray {
        shape: vec![count, side, side],
        data,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> scribble_data::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = parse_args();
    let images = cfg.out_dir.join("images");
    let index_dir = cfg.out_dir.join("index");

    println!("=== Scribble — Sketch Dataset Pipeline ===");
    println!();

    // ─────────────────────────────────────────────────────────────────────
    // 1. Locate or synthesize raw bitmap stacks
    // ─────────────────────────────────────────────────────────────────────
    let raw = match &cfg.raw_dir {
        Some(dir) => {
            println!("Using raw stacks from: {}", dir.display());
            dir.clone()
        }
        None => {
            let raw = cfg.out_dir.join("raw");
            std::fs::create_dir_all(&raw)?;
            for (name, count, phase) in
                [("circle", 14usize, 0u8), ("square", 11, 80), ("star", 9, 160)]
            {
                write_npy(raw.join(format!("{name}.npy")), &synth_stack(count, phase))?;
            }
            println!("Synthesized stacks under: {}", raw.display());
            println!("  Tip: use --raw-dir <path> for real sketch archives");
            raw
        }
    };
    println!();

    // ─────────────────────────────────────────────────────────────────────
    // 2. Bulk conversion to a PNG tree
    // ─────────────────────────────────────────────────────────────────────
    let summary = convert_directory(&raw, &images, None)?;
    println!("Converted {} images:", summary.total());
    for (category, count) in &summary.per_category {
        println!("  {category}: {count}");
    }
    println!();

    // ─────────────────────────────────────────────────────────────────────
    // 3. Build and persist the split index
    // ─────────────────────────────────────────────────────────────────────
    let categories = CategoryMap::discover(&images)?;
    let index = build_index(
        &images,
        &categories,
        SplitRatios::new(0.7, 0.1, 0.2),
        cfg.seed,
    )?;
    index.save_to(&index_dir)?;
    println!("Split index (seed {}):", cfg.seed);
    println!("  Train: {} records", index.train.len());
    println!("  Valid: {} records", index.valid.len());
    println!("  Test:  {} records", index.test.len());
    println!();

    // ─────────────────────────────────────────────────────────────────────
    // 4. Batched epoch over the train split
    // ─────────────────────────────────────────────────────────────────────
    let train = LabeledImageDataset::open_csv(index_dir.join(SplitIndex::TRAIN_FILE), &images)?
        .with_transform(Box::new(Normalize::new(255.0)));
    let loader_config = DataLoaderConfig::default()
        .batch_size(cfg.batch_size)
        .seed(cfg.seed);
    let mut loader = DataLoader::new(&train, loader_config);
    println!(
        "DataLoader: {} batches of up to {}",
        loader.num_batches(),
        cfg.batch_size
    );
    for (i, batch) in loader.iter_batches().enumerate() {
        let batch = batch?;
        println!("  batch {i}: shape {:?}", batch.shape);
    }
    println!();

    // ─────────────────────────────────────────────────────────────────────
    // 5. Prefetched pass over the validation split
    // ─────────────────────────────────────────────────────────────────────
    let valid: Arc<dyn Dataset> = Arc::new(LabeledImageDataset::open_csv(
        index_dir.join(SplitIndex::VALID_FILE),
        &images,
    )?);
    let prefetch_config = PrefetchConfig::default()
        .batch_size(cfg.batch_size)
        .shuffle(false);
    let mut prefetch = PrefetchLoader::new(valid, prefetch_config);
    let mut samples = 0usize;
    for batch in prefetch.iter_epoch() {
        samples += batch?.batch_size();
    }
    println!("PrefetchLoader: {samples} validation samples prefetched");

    Ok(())
}
