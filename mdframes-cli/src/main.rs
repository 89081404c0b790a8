use std::{
    env,
    fs::{self, File},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use mdframes_core::{
    CentroidLocator, FrameFormat, LocateParams, OnnxDetector, OverlayStyle, Stride,
    convert_images, extract, label_with_model, label_with_tracker, naming::stack_output_dir,
    render_overlays,
};
use mdframes_utils::{config::AppSettings, configure_telemetry, init_logging};
use serde::Serialize;

mod args;
mod config;

use crate::args::{Cli, Command, ExtractArgs, LabelModelArgs, LabelTrackerArgs, OverlayArgs};
use crate::config::{
    apply_extract_overrides, apply_global_overrides, apply_label_model_overrides,
    apply_label_tracker_overrides, apply_overlay_overrides, load_settings, log_level,
};

#[derive(Debug, Serialize)]
struct ConvertReport {
    output_dir: PathBuf,
    written: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(log_level(&cli))?;

    let mut settings = load_settings(&cli)?;
    apply_global_overrides(&mut settings, &cli);
    configure_telemetry(
        settings.telemetry.enabled,
        settings.telemetry.level_filter(),
    );
    debug!("mdframes-core {}", mdframes_core::version());

    match &cli.command {
        Command::Extract(args) => run_extract(settings, args),
        Command::LabelModel(args) => run_label_model(settings, args),
        Command::LabelTracker(args) => run_label_tracker(settings, args),
        Command::Overlay(args) => run_overlay(settings, args),
    }
}

fn run_extract(mut settings: AppSettings, args: &ExtractArgs) -> Result<()> {
    apply_extract_overrides(&mut settings, args);
    let format = FrameFormat::parse(&settings.extract.format)?;
    let output_dir = match args.output_dir.as_ref() {
        Some(dir) => dir.clone(),
        None => {
            let cwd = env::current_dir().context("failed to read the working directory")?;
            stack_output_dir(&cwd, &args.input_path)
        }
    };

    if args.convert_jpg {
        let written = convert_images(&args.input_path, &output_dir, &format)?;
        info!("Converted {} image(s) into {}", written.len(), output_dir.display());
        return write_json_report(
            args.json.as_deref(),
            &ConvertReport {
                output_dir,
                written,
            },
        );
    }

    let stride = Stride::new(settings.extract.nth);
    let report = extract(&args.input_path, &output_dir, &format, stride)?;
    info!(
        "Wrote {} frame(s) from {} stack(s) to {}",
        report.frames_written(),
        report.stacks.len(),
        output_dir.display()
    );
    write_json_report(args.json.as_deref(), &report)
}

fn run_label_model(mut settings: AppSettings, args: &LabelModelArgs) -> Result<()> {
    apply_label_model_overrides(&mut settings, args);
    let detector_settings = &settings.detector;
    info!(
        "Loading detector {} at resolution {}x{}",
        detector_settings.model_path.as_deref().unwrap_or("<unset>"),
        detector_settings.input_width,
        detector_settings.input_height
    );
    let detector = OnnxDetector::from_settings(detector_settings)
        .context("pass --model or set detector.model_path in the settings file")?;

    let report = label_with_model(
        &args.input_path,
        &args.output_dir,
        &detector,
        detector_settings.empty_frames,
    )?;
    write_json_report(args.json.as_deref(), &report)
}

fn run_label_tracker(mut settings: AppSettings, args: &LabelTrackerArgs) -> Result<()> {
    apply_label_tracker_overrides(&mut settings, args);
    let tracker = &settings.tracker;
    let locator = CentroidLocator::new(LocateParams::from(tracker))?;
    let report = label_with_tracker(
        &args.input_path,
        &args.output_dir,
        &locator,
        tracker.box_size,
        tracker.empty_frames,
    )?;
    write_json_report(args.json.as_deref(), &report)
}

fn run_overlay(mut settings: AppSettings, args: &OverlayArgs) -> Result<()> {
    apply_overlay_overrides(&mut settings, args);
    let style = OverlayStyle::from(&settings.overlay);
    let report = render_overlays(&args.input_path, &args.label_dir, &args.output_dir, &style)?;
    write_json_report(args.json.as_deref(), &report)
}

fn write_json_report<T: Serialize>(path: Option<&Path>, report: &T) -> Result<()> {
    let Some(json_path) = path else {
        return Ok(());
    };
    if let Some(dir) = json_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
    }
    let file = File::create(json_path)
        .with_context(|| format!("failed to create {}", json_path.display()))?;
    serde_json::to_writer_pretty(file, report)
        .with_context(|| format!("failed to write report JSON to {}", json_path.display()))?;
    info!("Wrote report to {}", json_path.display());
    Ok(())
}
