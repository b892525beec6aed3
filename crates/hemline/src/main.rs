//! hemline: tag clothing photographs with their dominant color.
//!
//! Runs the color analysis pipeline over every image given on the
//! command line (directories are expanded one level deep), in parallel,
//! and prints one record per image: the dominant RGB color, the nearest
//! reference color name, and its family.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin hemline -- [OPTIONS] <PATHS>...
//! ```
//!
//! The process exits non-zero if any image failed.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use hemline_pipeline::{
    AnalysisResult, ColorNamer, ErrorKind, FamilyMapper, Pipeline, PipelineConfig, PipelineError,
    ReferenceTables, ResizeFilter,
};
use rayon::prelude::*;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// File extensions picked up when expanding a directory.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

/// Dominant garment color extraction and color naming.
///
/// Each image is contrast-enhanced, resized, segmented from its
/// background, clustered for its dominant color, and matched to the
/// nearest named reference color.
#[derive(Parser)]
#[command(name = "hemline", version)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Image files or directories of images (PNG, JPEG, BMP, WebP).
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Reference palette and family tables as JSON (default: built-in).
    #[arg(long)]
    palette: Option<PathBuf>,

    /// CLAHE clip limit.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_CLIP_LIMIT)]
    clip_limit: f64,

    /// CLAHE tiles per axis.
    #[arg(
        long,
        default_value_t = PipelineConfig::DEFAULT_TILE_COLUMNS,
        value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..)
    )]
    tiles: u32,

    /// Canonical width images are resized to.
    #[arg(
        long,
        default_value_t = PipelineConfig::DEFAULT_CANONICAL_WIDTH,
        value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..)
    )]
    width: u32,

    /// Canonical height images are resized to.
    #[arg(
        long,
        default_value_t = PipelineConfig::DEFAULT_CANONICAL_HEIGHT,
        value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..)
    )]
    height: u32,

    /// Resize filter (nearest, triangle, catmull-rom, gaussian, lanczos3).
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_FILTER)]
    resize_filter: Filter,

    /// Segmentation rectangle inset from each border, in pixels.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_RECT_MARGIN)]
    margin: u32,

    /// Segmentation iterations.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SEGMENTATION_ITERATIONS)]
    iterations: u32,

    /// Brightness (HSV value, 0-255) at or below which samples are dropped.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_BRIGHTNESS_THRESHOLD)]
    brightness_threshold: u8,

    /// Quantile used for bandwidth estimation.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_BANDWIDTH_QUANTILE)]
    bandwidth_quantile: f64,

    /// Subsample size used for bandwidth estimation.
    #[arg(
        long,
        default_value_t = PipelineConfig::DEFAULT_BANDWIDTH_SAMPLES,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    bandwidth_samples: usize,

    /// Seed mean shift from every sample instead of a grid.
    #[arg(long)]
    no_bin_seeding: bool,

    /// Random seed.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SEED)]
    seed: u64,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// Missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Write a marked copy of every segmented image into this directory.
    #[arg(long)]
    marked_dir: Option<PathBuf>,

    /// Output records as JSON instead of tab-separated lines.
    #[arg(long)]
    json: bool,

    /// Worker threads (0 = one per core).
    #[arg(short = 'j', long, default_value_t = 0)]
    threads: usize,

    /// Increase log verbosity (-v debug, -vv trace). Overrides `RUST_LOG`.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Resize filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

/// Maps a [`ResizeFilter`] to the local CLI [`Filter`] enum.
const fn filter_from_pipeline(f: ResizeFilter) -> Filter {
    match f {
        ResizeFilter::Nearest => Filter::Nearest,
        ResizeFilter::Triangle => Filter::Triangle,
        ResizeFilter::CatmullRom => Filter::CatmullRom,
        ResizeFilter::Gaussian => Filter::Gaussian,
        ResizeFilter::Lanczos3 => Filter::Lanczos3,
    }
}

/// The CLI default filter, derived from
/// [`PipelineConfig::DEFAULT_RESIZE_FILTER`] so the two cannot silently
/// diverge.
const CLI_DEFAULT_FILTER: Filter = filter_from_pipeline(PipelineConfig::DEFAULT_RESIZE_FILTER);

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig> {
    let config = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).context("parsing --config-json")?
    } else {
        PipelineConfig {
            clip_limit: cli.clip_limit,
            tile_columns: cli.tiles,
            tile_rows: cli.tiles,
            canonical_width: cli.width,
            canonical_height: cli.height,
            resize_filter: match cli.resize_filter {
                Filter::Nearest => ResizeFilter::Nearest,
                Filter::Triangle => ResizeFilter::Triangle,
                Filter::CatmullRom => ResizeFilter::CatmullRom,
                Filter::Gaussian => ResizeFilter::Gaussian,
                Filter::Lanczos3 => ResizeFilter::Lanczos3,
            },
            rect_margin: cli.margin,
            segmentation_iterations: cli.iterations,
            brightness_threshold: cli.brightness_threshold,
            bandwidth_quantile: cli.bandwidth_quantile,
            bandwidth_samples: cli.bandwidth_samples,
            bin_seeding: !cli.no_bin_seeding,
            seed: cli.seed,
            ..PipelineConfig::default()
        }
    };
    config.validate()?;
    Ok(config)
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_tables(path: Option<&Path>) -> Result<ReferenceTables> {
    let Some(path) = path else {
        return Ok(ReferenceTables::builtin()?);
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading palette {}", path.display()))?;
    ReferenceTables::from_json(&json).with_context(|| format!("loading palette {}", path.display()))
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Expand directories (one level, image extensions only, sorted) and
/// keep plain files as given.
fn collect_images(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("listing {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && has_image_extension(p))
                .collect();
            found.sort();
            tracing::debug!(dir = %path.display(), images = found.len(), "expanded directory");
            images.extend(found);
        } else {
            images.push(path.clone());
        }
    }
    Ok(images)
}

/// One output line or JSON object.
#[derive(Serialize)]
#[serde(untagged)]
enum Record {
    Analyzed {
        image: String,
        #[serde(flatten)]
        result: AnalysisResult,
        /// Set when `--marked-dir` was given but the marked image could
        /// not be written.
        #[serde(skip_serializing_if = "Option::is_none")]
        marked_error: Option<String>,
    },
    Failed {
        image: String,
        error_kind: Option<ErrorKind>,
        error: String,
        #[serde(skip)]
        configuration: bool,
    },
}

impl Record {
    const fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::Failed { .. }
                | Self::Analyzed {
                    marked_error: Some(_),
                    ..
                }
        )
    }

    const fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Failed {
                configuration: true,
                ..
            }
        )
    }

    fn line(&self) -> String {
        match self {
            Self::Analyzed {
                image,
                result,
                marked_error,
            } => {
                let line = format!(
                    "{image}\t{}\t{}\t{}",
                    result.dominant_rgb, result.color_name, result.family_name
                );
                match marked_error {
                    Some(e) => format!("{line}\tmarked image error\t{e}"),
                    None => line,
                }
            }
            Self::Failed { image, error, .. } => format!("{image}\terror\t{error}"),
        }
    }
}

/// Why a single image failed.
enum Failure {
    Read(std::io::Error),
    Pipeline(PipelineError),
}

impl From<PipelineError> for Failure {
    fn from(error: PipelineError) -> Self {
        Self::Pipeline(error)
    }
}

/// Everything an image is analyzed against.
struct Job<'a> {
    namer: &'a ColorNamer,
    families: &'a FamilyMapper,
    config: &'a PipelineConfig,
    marked_dir: Option<&'a Path>,
}

impl<'a> Job<'a> {
    const fn new(
        tables: &'a ReferenceTables,
        config: &'a PipelineConfig,
        marked_dir: Option<&'a Path>,
    ) -> Self {
        Self {
            namer: tables.namer(),
            families: tables.families(),
            config,
            marked_dir,
        }
    }
}

/// Analyze one file. The second value is the marked-image write error,
/// if any.
fn analyze_file(path: &Path, job: &Job<'_>) -> Result<(AnalysisResult, Option<String>), Failure> {
    let bytes = std::fs::read(path).map_err(Failure::Read)?;
    let image = hemline_pipeline::decode::decode_rgb(&bytes)?;
    let resolved = Pipeline::new(image, job.config.clone())
        .enhance()?
        .resize()?
        .segment()?
        .extract_color()?
        .name(job.namer)?
        .resolve_family(job.families)?;

    let mut marked_error = None;
    if let Some(dir) = job.marked_dir {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
        let out = dir.join(format!("{stem}_marked.png"));
        match resolved.marked_image().save(&out) {
            Ok(()) => tracing::debug!(path = %out.display(), "wrote marked image"),
            Err(e) => {
                tracing::warn!(path = %out.display(), error = %e, "failed to write marked image");
                marked_error = Some(format!("{}: {e}", out.display()));
            }
        }
    }

    Ok((resolved.into_result(), marked_error))
}

fn process(path: &Path, job: &Job<'_>) -> Record {
    let image = path.display().to_string();
    match analyze_file(path, job) {
        Ok((result, marked_error)) => {
            tracing::debug!(image = %image, name = %result.color_name, "analyzed");
            Record::Analyzed {
                image,
                result,
                marked_error,
            }
        }
        Err(Failure::Read(e)) => {
            tracing::warn!(image = %image, error = %e, "failed to read image");
            Record::Failed {
                image,
                error_kind: None,
                error: e.to_string(),
                configuration: false,
            }
        }
        Err(Failure::Pipeline(e)) => {
            tracing::warn!(image = %image, kind = %e.kind(), error = %e, "analysis failed");
            Record::Failed {
                image,
                error_kind: Some(e.kind()),
                error: e.to_string(),
                configuration: e.is_configuration_error(),
            }
        }
    }
}

/// Fail the whole batch if any record hit an inconsistency in the
/// reference tables or config; every other image would hit it too.
fn ensure_no_configuration_error(records: &[Record]) -> Result<()> {
    if let Some(Record::Failed { image, error, .. }) =
        records.iter().find(|r| r.is_configuration_error())
    {
        anyhow::bail!("configuration error while analyzing {image}: {error}");
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<bool> {
    let config = config_from_cli(cli)?;
    let tables = load_tables(cli.palette.as_deref())?;

    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("configuring thread pool")?;
    }

    if let Some(ref dir) = cli.marked_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let images = collect_images(&cli.paths)?;
    tracing::info!(images = images.len(), "starting analysis");

    let job = Job::new(&tables, &config, cli.marked_dir.as_deref());
    let records: Vec<Record> = images.par_iter().map(|path| process(path, &job)).collect();
    ensure_no_configuration_error(&records)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        for record in &records {
            println!("{}", record.line());
        }
    }

    let failed = records.iter().filter(|r| r.is_failure()).count();
    tracing::info!(
        analyzed = records.len() - failed,
        failed,
        "analysis complete"
    );
    Ok(failed == 0)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
