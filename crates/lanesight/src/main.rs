//! lanesight: run the lane pipeline over recorded frames.
//!
//! Plays a directory of frames through the pipeline as if it were the
//! live camera, validates the tracked lanes against ground truth on the
//! configured schedule, and optionally writes overlays and debug rasters.
//! Useful for:
//!
//! - Tuning Canny, Hough and smoothing parameters on recorded drives
//! - Measuring per-stage durations against the 20 Hz frame budget
//! - Producing the validation log for a recorded run
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin lanesight -- run [OPTIONS] <FRAMES_DIR>
//! cargo run --release --bin lanesight -- detect <IMAGE>
//! cargo run --release --bin lanesight -- config > lanesight.json
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod render;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use lanesight_export::SvgMetadata;
use lanesight_io::{CsvLogSink, FrameDirectory, GroundTruthFile};
use lanesight_pipeline::{
    FrameDiagnostics, LaneConfig, LanePipeline, LaneState, StagedFrame, TickOutcome,
    ValidatedConfig, ValidationEngine, ValidationSink,
};
use tracing_subscriber::EnvFilter;

/// Camera-based lane detection, tracking and validation.
#[derive(Parser)]
#[command(name = "lanesight", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process a directory of frames in order.
    Run(RunArgs),
    /// Detect lanes in a single image, without tracking.
    Detect(DetectArgs),
    /// Print the default configuration as JSON.
    Config,
}

/// Where the configuration comes from, plus per-flag overrides.
#[derive(Args)]
struct ConfigArgs {
    /// JSON configuration file.
    #[arg(long, conflicts_with = "config_json")]
    config: Option<PathBuf>,

    /// Full configuration as a JSON string.
    #[arg(long)]
    config_json: Option<String>,

    /// Canny low threshold (default 50).
    #[arg(long)]
    low_threshold: Option<f32>,

    /// Canny high threshold (default 150).
    #[arg(long)]
    high_threshold: Option<f32>,

    /// Hough vote threshold (default 50).
    #[arg(long)]
    vote_threshold: Option<u32>,

    /// Smoothing factor, the weight of the previous estimate (default 0.8).
    #[arg(long)]
    alpha: Option<f64>,

    /// Fit lanes in bird's-eye view.
    #[arg(long)]
    bev: bool,
}

#[derive(Args)]
struct RunArgs {
    /// Directory of frames (PNG, JPEG, BMP, WebP), replayed in name order.
    frames: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,

    /// Playback rate used to derive frame timestamps.
    #[arg(long, default_value_t = lanesight_io::frames::DEFAULT_FPS)]
    fps: f64,

    /// Ground truth JSON. Without it no validation runs.
    #[arg(long)]
    ground_truth: Option<PathBuf>,

    /// Validation log directory (overrides `validation.output_dir`).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Write one overlay per frame into this directory.
    #[arg(long)]
    overlay_dir: Option<PathBuf>,

    /// Overlay file format.
    #[arg(long, value_enum, default_value_t = OverlayFormat::Png)]
    overlay_format: OverlayFormat,

    /// Write gray, edge and masked-edge rasters per frame into this directory.
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Print per-frame diagnostics as JSON lines instead of a summary.
    #[arg(long)]
    json: bool,

    /// Print a human-readable diagnostics report every N frames (0 = never).
    #[arg(long, default_value_t = 0)]
    report_every: u64,
}

#[derive(Args)]
struct DetectArgs {
    /// Input image.
    image: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,
}

/// Overlay output selection.
#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OverlayFormat {
    /// Lanes drawn over the frame at native resolution.
    Png,
    /// Lanes only, as vector paths in working-resolution pixels.
    Svg,
}

/// Build the configuration from a file or inline JSON, then apply flags.
fn config_from_args(args: &ConfigArgs) -> Result<ValidatedConfig, Box<dyn Error>> {
    let mut config = if let Some(ref path) = args.config {
        lanesight_io::load_config(path)?.into_inner()
    } else if let Some(ref json) = args.config_json {
        lanesight_io::parse_config(json)
            .map_err(|e| format!("--config-json: {e}"))?
            .into_inner()
    } else {
        LaneConfig::default()
    };

    if let Some(low) = args.low_threshold {
        config.edges.low_threshold = low;
    }
    if let Some(high) = args.high_threshold {
        config.edges.high_threshold = high;
    }
    if let Some(votes) = args.vote_threshold {
        config.segments.vote_threshold = votes;
    }
    if let Some(alpha) = args.alpha {
        config.tracking.alpha = alpha;
    }
    if args.bev {
        config.bev.enabled = true;
    }
    Ok(config.validate()?)
}

/// Validation collaborators, present only when ground truth is given.
struct Validation {
    engine: ValidationEngine,
    truth: GroundTruthFile,
    sink: CsvLogSink,
}

impl Validation {
    fn poll(&mut self, now: f64, state: &LaneState) -> Result<(), Box<dyn Error>> {
        match self.engine.poll(now, state, &self.truth, &mut self.sink)? {
            Some(TickOutcome::Recorded(record)) => eprintln!(
                "validation: frame {} error {:.2}px {}",
                record.frame_id,
                record.pixel_error,
                if record.passed { "PASS" } else { "FAIL" }
            ),
            Some(TickOutcome::Skipped { .. }) | None => {}
        }
        Ok(())
    }

    /// Flush the log even if the recording ended before the last capture.
    fn close(mut self) -> Result<(), Box<dyn Error>> {
        if !self.engine.is_finished() {
            tracing::warn!(
                "frames ran out with {} of the configured captures taken",
                self.engine.summary().captures
            );
            self.sink.finalize()?;
        }
        let summary = self.engine.summary();
        self.sink.write_summary(&summary)?;
        eprintln!(
            "validation: {} passed, {} failed, {} skipped -> {}",
            summary.passed,
            summary.failed,
            summary.skipped,
            self.sink.path().display()
        );
        Ok(())
    }
}

fn write_overlay(
    dir: &Path,
    format: OverlayFormat,
    frame: &lanesight_pipeline::Frame,
    staged: &StagedFrame,
    pipeline: &LanePipeline,
) -> Result<(), Box<dyn Error>> {
    let overlay = &staged.output.overlay;
    match format {
        OverlayFormat::Png => {
            let path = dir.join(format!("{:06}.png", frame.frame_id));
            render::render_overlay(&frame.image, overlay, pipeline.working_dimensions())
                .save(&path)
                .map_err(|e| format!("{}: {e}", path.display()))?;
        }
        OverlayFormat::Svg => {
            let path = dir.join(format!("{:06}.svg", frame.frame_id));
            let title = format!("frame {}", frame.frame_id);
            let svg = lanesight_export::to_overlay_svg(
                overlay,
                pipeline.working_dimensions(),
                &SvgMetadata {
                    title: Some(&title),
                    ..SvgMetadata::default()
                },
            );
            std::fs::write(&path, svg).map_err(|e| format!("{}: {e}", path.display()))?;
        }
    }
    Ok(())
}

fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let config = config_from_args(&args.config)?;
    let frames = FrameDirectory::open(&args.frames, args.fps)?;
    let mut pipeline = LanePipeline::new(config);

    let mut validation = match args.ground_truth {
        Some(ref path) => {
            let dir = args
                .output_dir
                .clone()
                .unwrap_or_else(|| pipeline.config().validation.output_dir.clone());
            Some(Validation {
                engine: pipeline.validation_engine(),
                truth: GroundTruthFile::load(path)?,
                sink: CsvLogSink::create(&dir)?,
            })
        }
        None => {
            tracing::info!("no ground truth given, validation disabled");
            None
        }
    };

    for dir in [&args.overlay_dir, &args.debug_dir].into_iter().flatten() {
        std::fs::create_dir_all(dir).map_err(|e| format!("{}: {e}", dir.display()))?;
    }

    let mut all_diagnostics: Vec<FrameDiagnostics> = Vec::with_capacity(frames.len());
    let mut tracked_frames = 0_usize;

    for frame in frames.frames() {
        let frame = frame?;
        let staged = pipeline.process_staged(&frame)?;

        if staged.output.state.has_lane() {
            tracked_frames += 1;
        }
        if args.json {
            println!("{}", serde_json::to_string(&staged.diagnostics)?);
        } else if args.report_every > 0 && frame.frame_id % args.report_every == 0 {
            println!("{}\n", staged.diagnostics.report());
        }
        if let Some(ref dir) = args.overlay_dir {
            write_overlay(dir, args.overlay_format, &frame, &staged, &pipeline)?;
        }
        if let Some(ref dir) = args.debug_dir {
            lanesight_io::debug::write_stages(dir, &staged)?;
        }
        if let Some(ref mut validation) = validation {
            validation.poll(frame.timestamp, &staged.output.state)?;
        }

        all_diagnostics.push(staged.diagnostics);
    }

    if let Some(validation) = validation {
        validation.close()?;
    }
    if !args.json {
        print_run_summary(&all_diagnostics, tracked_frames);
    }
    Ok(())
}

fn detect(args: &DetectArgs) -> Result<(), Box<dyn Error>> {
    let config = config_from_args(&args.config)?;
    let image = image::open(&args.image)
        .map_err(|e| format!("{}: {e}", args.image.display()))?
        .to_rgba8();
    let state = lanesight_pipeline::detect_lanes(&image, &config)?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&FrameDiagnostics) -> std::time::Duration;

/// Print aggregated timing across all frames.
#[allow(clippy::cast_precision_loss)]
fn print_run_summary(all_diagnostics: &[FrameDiagnostics], tracked_frames: usize) {
    println!(
        "Run summary ({} frames, {} with lanes)\n{}",
        all_diagnostics.len(),
        tracked_frames,
        "=".repeat(60),
    );
    if all_diagnostics.is_empty() {
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();
    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;
    println!("Frame duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Preprocess", |d| d.preprocess.duration),
        ("Edge Detection", |d| d.edge_detection.duration),
        ("Segment Detection", |d| d.segment_detection.duration),
        ("Fitting", |d| d.fitting.duration),
        ("Tracking", |d| d.tracking.duration),
    ];
    for (name, extractor) in stage_extractors {
        let total: f64 = all_diagnostics
            .iter()
            .map(|d| extractor(d).as_secs_f64() * 1000.0)
            .sum();
        let stage_mean = total / all_diagnostics.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run(ref args) => run(args),
        Command::Detect(ref args) => detect(args),
        Command::Config => serde_json::to_string_pretty(&LaneConfig::default())
            .map(|json| println!("{json}"))
            .map_err(Into::into),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
