//! Configuration loading and CLI override logic.

use anyhow::Result;
use log::{LevelFilter, info};
use mdframes_utils::{config::AppSettings, normalize_path};

use crate::args::{Cli, ExtractArgs, LabelModelArgs, LabelTrackerArgs, OverlayArgs};

/// Resolve settings from `--config`, the environment, or the default location.
pub fn load_settings(cli: &Cli) -> Result<AppSettings> {
    let explicit = cli.config.as_ref().map(normalize_path).transpose()?;
    let (settings, source) = AppSettings::resolve(explicit.as_deref())?;
    match source {
        Some(path) => info!("Loaded settings from {}", path.display()),
        None => info!("Using built-in settings"),
    }
    Ok(settings)
}

/// Console log level implied by `-v`/`--quiet`.
pub fn log_level(cli: &Cli) -> LevelFilter {
    if cli.quiet {
        return LevelFilter::Warn;
    }
    match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

pub fn apply_global_overrides(settings: &mut AppSettings, cli: &Cli) {
    if cli.telemetry {
        settings.telemetry.enabled = true;
    }
}

pub fn apply_extract_overrides(settings: &mut AppSettings, args: &ExtractArgs) {
    if let Some(nth) = args.nth {
        settings.extract.nth = nth;
    }
    if let Some(format) = args.format.as_ref() {
        settings.extract.format = format.clone();
    }
}

pub fn apply_label_model_overrides(settings: &mut AppSettings, args: &LabelModelArgs) {
    let detector = &mut settings.detector;
    if let Some(model) = args.model.as_ref() {
        detector.model_path = Some(model.display().to_string());
    }
    if let Some(score) = args.score_threshold {
        detector.score_threshold = score;
    }
    if let Some(nms) = args.nms_threshold {
        detector.nms_threshold = nms;
    }
    if let Some(top_k) = args.top_k {
        detector.top_k = top_k;
    }
    if let Some((width, height)) = args.input_size {
        detector.input_width = width;
        detector.input_height = height;
    }
    if let Some(policy) = args.empty_frames {
        detector.empty_frames = policy;
    }
}

pub fn apply_label_tracker_overrides(settings: &mut AppSettings, args: &LabelTrackerArgs) {
    let tracker = &mut settings.tracker;
    if let Some(diameter) = args.diameter {
        tracker.diameter = diameter;
    }
    if let Some(minmass) = args.minmass {
        tracker.minmass = minmass;
    }
    if let Some(box_size) = args.box_size {
        tracker.box_size = box_size;
    }
    if let Some(separation) = args.separation {
        tracker.separation = Some(separation);
    }
    if let Some(percentile) = args.percentile {
        tracker.percentile = percentile;
    }
    if let Some(policy) = args.empty_frames {
        tracker.empty_frames = policy;
    }
}

pub fn apply_overlay_overrides(settings: &mut AppSettings, args: &OverlayArgs) {
    if let Some(color) = args.color {
        settings.overlay.color = color;
    }
    if let Some(thickness) = args.thickness {
        settings.overlay.thickness = thickness;
    }
}
