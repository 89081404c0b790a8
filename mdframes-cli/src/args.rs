//! Command-line argument definitions for mdframes.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use mdframes_utils::{EmptyFramePolicy, RgbColor};

/// Extract frames from microscopy stacks, label them, and render label overlays.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Settings JSON. Falls back to `$MDFRAMES_CONFIG`, then `config/mdframes.json`, then
    /// built-in defaults.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable telemetry timing logs (defaults to settings file).
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub telemetry: bool,

    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write every Nth frame of a TIFF stack (or a directory of stacks) as 8-bit RGB images.
    Extract(ExtractArgs),
    /// Label frames with an ONNX object detector.
    LabelModel(LabelModelArgs),
    /// Pseudo-label frames by locating bright particles.
    LabelTracker(LabelTrackerArgs),
    /// Draw label boxes onto their frames.
    Overlay(OverlayArgs),
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// A `.tif`/`.tiff` stack, or a directory of stacks.
    pub input_path: PathBuf,

    /// Output directory. Defaults to `./<input stem>_frames`.
    pub output_dir: Option<PathBuf>,

    /// Keep every Nth frame (values below 1 are treated as 1).
    #[arg(short = 'n', long, allow_negative_numbers = true)]
    pub nth: Option<i64>,

    /// Output image format (png, jpg, tif, bmp, ...).
    #[arg(short, long)]
    pub format: Option<String>,

    /// Re-encode `.jpg`/`.jpeg` images instead of reading TIFF stacks.
    #[arg(long, action = ArgAction::SetTrue)]
    pub convert_jpg: bool,

    /// Write the run report to a JSON file.
    #[arg(long)]
    pub json: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct LabelModelArgs {
    /// A `.png` frame or a directory of frames.
    pub input_path: PathBuf,

    /// Directory that receives one `frame_NNNNN.txt` per frame.
    pub output_dir: PathBuf,

    /// ONNX detector exported from training. Required unless set in the settings file.
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Override score threshold.
    #[arg(long)]
    pub score_threshold: Option<f32>,

    /// Override NMS threshold.
    #[arg(long)]
    pub nms_threshold: Option<f32>,

    /// Override top_k limit.
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Model input size as `WIDTHxHEIGHT`.
    #[arg(long, value_name = "WxH", value_parser = parse_input_size)]
    pub input_size: Option<(u32, u32)>,

    /// Frames without detections: `write` an empty file or `skip` them.
    #[arg(long, value_name = "POLICY")]
    pub empty_frames: Option<EmptyFramePolicy>,

    /// Write the run report to a JSON file.
    #[arg(long)]
    pub json: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct LabelTrackerArgs {
    /// A `.png` frame or a directory of frames.
    pub input_path: PathBuf,

    /// Directory that receives `frame_NNNNN.txt` for frames with particles.
    pub output_dir: PathBuf,

    /// Expected particle diameter in pixels (odd).
    #[arg(long)]
    pub diameter: Option<u32>,

    /// Minimum integrated brightness of a particle.
    #[arg(long)]
    pub minmass: Option<f32>,

    /// Side of the square label box in pixels.
    #[arg(long)]
    pub box_size: Option<f32>,

    /// Minimum distance between particles (default: diameter + 1).
    #[arg(long)]
    pub separation: Option<f32>,

    /// Ignore maxima dimmer than this percentile of the filtered frame.
    #[arg(long)]
    pub percentile: Option<f32>,

    /// Frames without particles: `write` an empty file or `skip` them.
    #[arg(long, value_name = "POLICY")]
    pub empty_frames: Option<EmptyFramePolicy>,

    /// Write the run report to a JSON file.
    #[arg(long)]
    pub json: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct OverlayArgs {
    /// A `.png` frame or a directory of frames.
    pub input_path: PathBuf,

    /// Directory holding `frame_NNNNN.txt` label files.
    pub label_dir: PathBuf,

    /// Directory that receives `frame_NNNNN_overlay.png`.
    pub output_dir: PathBuf,

    /// Outline color as `#RRGGBB`.
    #[arg(long)]
    pub color: Option<RgbColor>,

    /// Outline width in pixels.
    #[arg(long)]
    pub thickness: Option<u32>,

    /// Write the run report to a JSON file.
    #[arg(long)]
    pub json: Option<PathBuf>,
}

/// Parse `640x640` (also `640X640` or `640,640`).
pub fn parse_input_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X', ','])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<u32>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| format!("invalid dimension '{s}' in '{value}'"))
    };
    Ok((parse(w)?, parse(h)?))
}
