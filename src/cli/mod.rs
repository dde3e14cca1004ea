//! Sampleset CLI Module
//!
//! Command-line interface for inspecting, converting, generating and
//! rebalancing sample files.

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use colored::*;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::samples::{SampleList, Samples};
use crate::storage::{FileType, SampleReader, StorageConfig, Version};
use crate::tools::{self, SamplesInfo};
use crate::views::{OverSample, OverStrategy, UnderSample, UnderStrategy};

// Styling helpers

fn dim(s: &str) -> ColoredString {
    s.truecolor(100, 100, 100)
}

fn accent(s: &str) -> ColoredString {
    s.truecolor(120, 170, 255)
}

fn muted(s: &str) -> ColoredString {
    s.truecolor(140, 140, 140)
}

fn ok(s: &str) -> ColoredString {
    s.truecolor(100, 210, 120)
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv(key: &str, val: impl std::fmt::Display) {
    println!("  {:<12} {}", muted(key), val.to_string().white());
}

// CLI definition

#[derive(Parser)]
#[command(name = "sampleset")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect, convert and rebalance labeled sample files")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print a summary of a sample file
    Info {
        /// Sample file (`.samples` may be omitted)
        path: PathBuf,
    },

    /// Rewrite a sample file in another version or encoding
    Convert {
        /// Input sample file
        input: PathBuf,

        /// Output sample file
        output: PathBuf,

        /// Format version (2 or 3)
        #[arg(long, default_value = "3")]
        version: u32,

        /// Data encoding (binary, ascii)
        #[arg(long, default_value = "binary")]
        ftype: String,

        /// Value separator of ASCII files
        #[arg(long, default_value = " ")]
        delimiter: char,

        /// JSON storage config, overrides the flags above
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Write a synthetic Gaussian test collection
    Generate {
        /// Output sample file
        output: PathBuf,

        /// Number of classes
        #[arg(long, default_value = "3")]
        classes: usize,

        /// Samples per class
        #[arg(long, default_value = "20")]
        per_class: usize,

        /// Streams per sample
        #[arg(long, default_value = "1")]
        streams: usize,

        /// Standard deviation around each class center
        #[arg(long, default_value = "0.1")]
        spread: f32,

        /// Keep each stream with this probability
        #[arg(long)]
        keep: Option<f64>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Format version (2 or 3)
        #[arg(long, default_value = "3")]
        version: u32,

        /// Data encoding (binary, ascii)
        #[arg(long, default_value = "binary")]
        ftype: String,
    },

    /// Equalize class sizes
    Balance {
        /// Input sample file
        input: PathBuf,

        /// Output sample file
        output: PathBuf,

        /// Strategy (duplicate, smote, under)
        #[arg(short, long, default_value = "duplicate")]
        strategy: String,

        /// Neighbors considered by SMOTE
        #[arg(short, long, default_value = "5")]
        k: usize,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn storage_config(version: u32, ftype: &str, delimiter: char) -> anyhow::Result<StorageConfig> {
    let version = Version::from_number(version)
        .ok_or_else(|| anyhow!("unsupported version {}, expected 2 or 3", version))?;
    let file_type =
        FileType::from_name(ftype).ok_or_else(|| anyhow!("unknown file type '{}'", ftype))?;
    let config = StorageConfig::new()
        .with_version(version)
        .with_file_type(file_type)
        .with_delimiter(delimiter);
    config.validate()?;
    Ok(config)
}

fn open(path: &Path) -> anyhow::Result<SampleReader> {
    SampleReader::open(path).with_context(|| format!("cannot open '{}'", path.display()))
}

pub fn cmd_info(path: &Path) -> anyhow::Result<()> {
    let reader = open(path)?;
    let info = SamplesInfo::of(&reader)?;

    section("Sample File");
    kv("File", reader.info_path().display());
    kv("Version", reader.version());
    kv("Encoding", reader.file_type());
    kv("Samples", info.len);
    kv("Garbage", info.garbage);
    kv("Missing", if info.has_missing_data { "yes" } else { "no" });

    section("Classes");
    for (name, size) in info.class_names.iter().zip(&info.class_sizes) {
        println!("  {:<20} {:>8}", name, size);
    }

    section("Users");
    for name in &info.user_names {
        println!("  {}", name);
    }

    section("Streams");
    println!("  {:<6} {:>6} {:>8} {:>10}", muted("#"), muted("Dim"), muted("Type"), muted("Rate"));
    for (i, spec) in info.streams.iter().enumerate() {
        println!(
            "  {:<6} {:>6} {:>8} {:>10}",
            i,
            spec.dim,
            spec.data_type.name(),
            format!("{} Hz", spec.sample_rate)
        );
    }
    println!();
    Ok(())
}

pub fn cmd_convert(
    input: &Path,
    output: &Path,
    version: u32,
    ftype: &str,
    delimiter: char,
    config: Option<&Path>,
) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => StorageConfig::from_file(path)
            .with_context(|| format!("cannot load config '{}'", path.display()))?,
        None => storage_config(version, ftype, delimiter)?,
    };
    let reader = open(input)?;

    let start = Instant::now();
    step_run(&format!("Converting to {} {}", config.version, config.file_type));
    tools::save_samples(&reader, output, &config)?;
    step_done(&format!("{} samples in {:.2?}", reader.len(), start.elapsed()));
    println!();
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_generate(
    output: &Path,
    classes: usize,
    per_class: usize,
    streams: usize,
    spread: f32,
    keep: Option<f64>,
    seed: Option<u64>,
    version: u32,
    ftype: &str,
) -> anyhow::Result<()> {
    let config = storage_config(version, ftype, ' ')?;
    let mut rng = match seed {
        Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
        None => Xoshiro256PlusPlus::from_entropy(),
    };

    // Class centers on a unit grid
    let side = (classes as f64).sqrt().ceil().max(1.0) as usize;
    let distr: Vec<[f32; 3]> = (0..classes)
        .map(|c| [(c % side) as f32, (c / side) as f32, spread])
        .collect();

    step_run("Generating samples");
    let mut list = SampleList::new();
    tools::create_test_samples(&mut list, classes, per_class, streams, &distr, "user", &mut rng)?;
    if let Some(prob) = keep {
        tools::create_missing_data(&mut list, prob, &mut rng);
    }
    step_done(&format!("{} samples", list.len()));

    step_run("Writing");
    tools::save_samples(&list, output, &config)?;
    step_done(&output.display().to_string());
    println!();
    Ok(())
}

pub fn cmd_balance(
    input: &Path,
    output: &Path,
    strategy: &str,
    k: usize,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    let reader = open(input)?;
    let config = StorageConfig::new()
        .with_version(reader.version())
        .with_file_type(reader.file_type());
    let sizes = (0..reader.class_count() as u32)
        .map(|c| reader.class_len(c))
        .collect::<crate::Result<Vec<_>>>()?;
    let (min, max) = match (sizes.iter().filter(|&&n| n > 0).min(), sizes.iter().max()) {
        (Some(&min), Some(&max)) => (min, max),
        _ => bail!("'{}' holds no labeled samples", input.display()),
    };

    let start = Instant::now();
    let written = match strategy.to_lowercase().as_str() {
        "under" => {
            step_run(&format!("Under-sampling to {} per class", min));
            let mut view = UnderSample::new(&reader)?;
            if let Some(seed) = seed {
                view = view.with_seed(seed)?;
            }
            for (class, &size) in sizes.iter().enumerate() {
                if size > min {
                    view.set_under(class as u32, min, UnderStrategy::Random)?;
                }
            }
            tools::save_samples(&view, output, &config)?;
            view.len()
        }
        "duplicate" | "smote" => {
            let over = if strategy.eq_ignore_ascii_case("smote") {
                OverStrategy::Smote
            } else {
                OverStrategy::Duplicate
            };
            step_run(&format!("Over-sampling to {} per class", max));
            let mut view = OverSample::new(&reader)?.with_k_neighbors(k)?;
            if let Some(seed) = seed {
                view = view.with_seed(seed)?;
            }
            for (class, &size) in sizes.iter().enumerate() {
                if size > 0 && size < max {
                    view.set_over(class as u32, max - size, over)?;
                }
            }
            tools::save_samples(&view, output, &config)?;
            view.len()
        }
        other => bail!("unknown strategy '{}', expected duplicate, smote or under", other),
    };
    step_done(&format!("{} samples in {:.2?}", written, start.elapsed()));
    println!();
    Ok(())
}

/// Parse arguments and run the selected command
pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Info { path } => cmd_info(&path),
        Commands::Convert {
            input,
            output,
            version,
            ftype,
            delimiter,
            config,
        } => cmd_convert(&input, &output, version, &ftype, delimiter, config.as_deref()),
        Commands::Generate {
            output,
            classes,
            per_class,
            streams,
            spread,
            keep,
            seed,
            version,
            ftype,
        } => cmd_generate(
            &output, classes, per_class, streams, spread, keep, seed, version, &ftype,
        ),
        Commands::Balance {
            input,
            output,
            strategy,
            k,
            seed,
        } => cmd_balance(&input, &output, &strategy, k, seed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_balance() {
        let cli = Cli::try_parse_from(["sampleset", "balance", "a", "b", "--strategy", "smote"])
            .unwrap();
        match cli.command {
            Commands::Balance { strategy, k, .. } => {
                assert_eq!(strategy, "smote");
                assert_eq!(k, 5);
            }
            _ => panic!("expected balance"),
        }
    }

    #[test]
    fn test_storage_config_flags() {
        let config = storage_config(2, "ascii", ';').unwrap();
        assert_eq!(config.version, Version::V2);
        assert_eq!(config.file_type, FileType::Ascii);
        assert!(storage_config(4, "binary", ' ').is_err());
        assert!(storage_config(3, "xml", ' ').is_err());
    }

    #[test]
    fn test_generate_then_balance() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("raw");
        let balanced = dir.path().join("balanced");
        cmd_generate(&raw, 2, 6, 1, 0.1, None, Some(3), 3, "binary").unwrap();

        let list = tools::load_samples(&raw).unwrap();
        assert_eq!(list.len(), 12);

        // Keep two samples of class B
        let cutoff = list.sample(8).unwrap().time;
        let mut skewed = SampleList::new();
        for name in list.class_names() {
            skewed.add_class_name(name);
        }
        skewed.add_user_name("user");
        for sample in list.iter().filter(|s| s.class_id == 0 || s.time < cutoff) {
            skewed.push(sample.clone()).unwrap();
        }
        tools::save_samples(&skewed, &raw, &StorageConfig::default()).unwrap();

        cmd_balance(&raw, &balanced, "smote", 3, Some(1)).unwrap();
        let out = tools::load_samples(&balanced).unwrap();
        assert_eq!(out.class_len(0).unwrap(), 6);
        assert_eq!(out.class_len(1).unwrap(), 6);

        cmd_balance(&raw, &balanced, "under", 3, Some(1)).unwrap();
        let out = tools::load_samples(&balanced).unwrap();
        assert_eq!(out.class_len(0).unwrap(), out.class_len(1).unwrap());
        assert!(cmd_balance(&raw, &balanced, "mix", 3, None).is_err());
    }
}
