//! texgraft: transplant texture between images from the command line.
//!
//! Loads a source and a destination image plus precomputed region masks
//! (grayscale images, `value / 255` is the foreground probability), runs
//! the transplant pipeline and writes the result. Useful for:
//!
//! - Comparing warp methods on the same region pairs
//! - Tuning alpha, blur, shrink and confidence thresholds
//! - Inspecting which pairs were skipped and why (`--report`)
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin texgraft -- \
//!     --source src.png --destination dst.png \
//!     --src-mask src_mask.png@0.9 --dst-mask dst_mask_a.png --dst-mask dst_mask_b.png@0.7 \
//!     --output out.png --warp-method elastic
//! ```
//!
//! Set `RUST_LOG=debug` for per-stage pipeline logging.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use texgraft_pipeline::{
    Detection, Dimensions, NeverCancel, PipelineConfig, PrecomputedMasks, TransplantOutcome,
    WarpMethod,
};

/// Mask-guided texture transplant.
///
/// Warps the texture inside each source region onto the matching
/// destination region and blends it in.
#[derive(Parser)]
#[command(name = "texgraft", version)]
struct Cli {
    /// Image the texture is taken from.
    #[arg(long)]
    source: PathBuf,

    /// Image the texture is placed onto.
    #[arg(long)]
    destination: PathBuf,

    /// Source region mask, optionally with a confidence: `PATH[@CONF]`.
    #[arg(long = "src-mask", value_parser = parse_mask_arg)]
    src_masks: Vec<MaskArg>,

    /// Destination region mask, optionally with a confidence: `PATH[@CONF]`.
    #[arg(long = "dst-mask", value_parser = parse_mask_arg)]
    dst_masks: Vec<MaskArg>,

    /// Where to write the result (format from the extension).
    #[arg(long)]
    output: PathBuf,

    /// Geometric model: projective, affine or elastic.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_WARP_METHOD)]
    warp_method: WarpMethod,

    /// Blend strength of transplanted texture (0.0-1.0).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_ALPHA)]
    alpha: f64,

    /// Boundary resampling and elastic grid density (0.0-1.0].
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_WARP_STRENGTH)]
    warp_strength: f64,

    /// Contraction of source regions toward their centroid [0.0-1.0).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SHRINK_FACTOR)]
    shrink_factor: f64,

    /// Gaussian kernel size for mask edge smoothing (0 disables).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_BLUR_RADIUS)]
    blur_radius: u32,

    /// Minimum confidence of source masks.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_CONF_THRESHOLD_SRC)]
    conf_src: f32,

    /// Minimum confidence of destination masks.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_CONF_THRESHOLD_DST)]
    conf_dst: f32,

    /// Maximum number of region pairs.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MAX_INSTANCES, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    max_instances: usize,

    /// Use source regions as detected instead of their inscribed circle.
    #[arg(long)]
    no_inscribed_circle: bool,

    /// Prepare region pairs on a single thread.
    #[arg(long)]
    sequential: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// Missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Write the transplant report as JSON to this file.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print the transplant report as JSON instead of a table.
    #[arg(long)]
    json: bool,

    /// Also write the union of confident destination masks to this file.
    #[arg(long)]
    combined_mask: Option<PathBuf>,
}

/// A mask file and the confidence assigned to it.
#[derive(Debug, Clone, PartialEq)]
struct MaskArg {
    path: PathBuf,
    confidence: f32,
}

/// Parse `PATH[@CONF]`.
///
/// A suffix after the last `@` that is not a number is treated as part of
/// the path; a number outside `[0, 1]` is an error.
fn parse_mask_arg(arg: &str) -> Result<MaskArg, String> {
    if let Some((path, conf)) = arg.rsplit_once('@')
        && let Ok(confidence) = conf.parse::<f32>()
    {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(format!("confidence must be in [0, 1], got {confidence}"));
        }
        if path.is_empty() {
            return Err("mask path is empty".to_string());
        }
        return Ok(MaskArg {
            path: PathBuf::from(path),
            confidence,
        });
    }
    if arg.is_empty() {
        return Err("mask path is empty".to_string());
    }
    Ok(MaskArg {
        path: PathBuf::from(arg),
        confidence: 1.0,
    })
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.  Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(PipelineConfig {
        conf_threshold_src: cli.conf_src,
        conf_threshold_dst: cli.conf_dst,
        blur_radius: cli.blur_radius,
        warp_method: cli.warp_method,
        warp_strength: cli.warp_strength,
        shrink_factor: cli.shrink_factor,
        alpha: cli.alpha,
        max_instances: cli.max_instances,
        source_inscribed_circle: !cli.no_inscribed_circle,
        parallel: !cli.sequential,
        ..PipelineConfig::default()
    })
}

fn open_image(path: &Path) -> Result<image::DynamicImage, String> {
    image::open(path).map_err(|e| format!("Error reading {}: {e}", path.display()))
}

fn load_masks(masks: &[MaskArg]) -> Result<Vec<Detection>, String> {
    masks
        .iter()
        .map(|m| {
            let gray = open_image(&m.path)?.to_luma8();
            Ok(Detection::from_gray(&gray, m.confidence))
        })
        .collect()
}

fn run(cli: &Cli) -> Result<(), String> {
    let config = config_from_cli(cli)?;
    config.validate().map_err(|e| e.to_string())?;

    let source = open_image(&cli.source)?;
    let destination = open_image(&cli.destination)?;
    let source_masks = load_masks(&cli.src_masks)?;
    let destination_masks = load_masks(&cli.dst_masks)?;

    eprintln!(
        "Source: {} ({}x{}, {} masks)",
        cli.source.display(),
        source.width(),
        source.height(),
        source_masks.len(),
    );
    eprintln!(
        "Destination: {} ({}x{}, {} masks)",
        cli.destination.display(),
        destination.width(),
        destination.height(),
        destination_masks.len(),
    );
    log::debug!("config: {config:?}");

    if let Some(ref path) = cli.combined_mask {
        let combined = texgraft_pipeline::combine_masks(
            &destination_masks,
            config.conf_threshold_dst,
            Dimensions::new(destination.width(), destination.height()),
        );
        combined
            .to_visual()
            .save(path)
            .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
        eprintln!("Combined mask written to {}", path.display());
    }

    let provider = PrecomputedMasks::new(source_masks, destination_masks);
    let outcome = texgraft_pipeline::transplant_with_provider(
        &source,
        &destination,
        &provider,
        &config,
        &NeverCancel,
    )
    .map_err(|e| format!("Pipeline error: {e}"))?;

    match &outcome {
        TransplantOutcome::Transplanted { report, .. } => {
            if cli.json {
                let json = serde_json::to_string_pretty(report)
                    .map_err(|e| format!("Error serializing report: {e}"))?;
                println!("{json}");
            } else {
                println!("{}", report.report());
            }
            if let Some(ref path) = cli.report {
                let json = serde_json::to_string_pretty(report)
                    .map_err(|e| format!("Error serializing report: {e}"))?;
                std::fs::write(path, json)
                    .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
            }
        }
        TransplantOutcome::Fallback { reason, .. } => {
            eprintln!("Nothing transplanted: {reason}");
        }
    }

    outcome
        .image()
        .save(&cli.output)
        .map_err(|e| format!("Error writing {}: {e}", cli.output.display()))?;
    eprintln!("Result written to {}", cli.output.display());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}
