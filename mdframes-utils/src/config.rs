//! Persisted settings consumed by the CLI.
//!
//! Every section is `#[serde(default)]` so a settings file only needs the keys it changes.
//! Nothing here refers to a particular machine; paths come from the file, the environment,
//! or the command line.

use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::{color::RgbColor, telemetry::parse_level_filter};

/// Environment variable naming a settings file to load when `--config` is absent.
pub const CONFIG_ENV: &str = "MDFRAMES_CONFIG";

/// What to do for a frame that ends up with no label records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmptyFramePolicy {
    /// Create an empty label file (background frame for training).
    WriteEmpty,
    /// Do not create a label file.
    Skip,
}

impl fmt::Display for EmptyFramePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EmptyFramePolicy::WriteEmpty => "write",
            EmptyFramePolicy::Skip => "skip",
        })
    }
}

impl FromStr for EmptyFramePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "write" | "write_empty" | "empty" => Ok(EmptyFramePolicy::WriteEmpty),
            "skip" | "none" => Ok(EmptyFramePolicy::Skip),
            other => Err(format!(
                "invalid empty-frame policy '{other}'; expected 'write' or 'skip'"
            )),
        }
    }
}

/// Frame extraction defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractSettings {
    /// Keep every `nth` frame; values below 1 are treated as 1.
    pub nth: i64,
    /// Output raster format (`png`, `jpg`, `tif`, ...).
    pub format: String,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            nth: 10,
            format: "png".to_string(),
        }
    }
}

/// Object-detector labeling parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorSettings {
    /// ONNX model exported from the training run.
    pub model_path: Option<String>,
    /// Model input width in pixels.
    pub input_width: u32,
    /// Model input height in pixels.
    pub input_height: u32,
    /// Minimum class confidence for a detection to be kept.
    pub score_threshold: f32,
    /// IoU above which overlapping boxes of the same class are suppressed.
    pub nms_threshold: f32,
    /// Maximum detections per image after sorting by score (0 = unlimited).
    pub top_k: usize,
    pub empty_frames: EmptyFramePolicy,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            model_path: None,
            input_width: 640,
            input_height: 640,
            score_threshold: 0.25,
            nms_threshold: 0.45,
            top_k: 300,
            empty_frames: EmptyFramePolicy::WriteEmpty,
        }
    }
}

/// Particle-locator pseudo-labeling parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackerSettings {
    /// Expected particle diameter in pixels; must be odd.
    pub diameter: u32,
    /// Minimum integrated brightness of an accepted particle.
    pub minmass: f32,
    /// Side length in pixels of the box emitted around each particle.
    pub box_size: f32,
    /// Minimum distance between particle centers; defaults to `diameter + 1`.
    pub separation: Option<f32>,
    /// Local maxima dimmer than this percentile of the filtered frame are ignored.
    pub percentile: f32,
    /// Gaussian noise length scale in pixels.
    pub noise_size: f32,
    /// Background boxcar size; defaults to `diameter`.
    pub smoothing_size: Option<u32>,
    pub empty_frames: EmptyFramePolicy,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            diameter: 41,
            minmass: 200.0,
            box_size: 40.0,
            separation: None,
            percentile: 64.0,
            noise_size: 1.0,
            smoothing_size: None,
            empty_frames: EmptyFramePolicy::Skip,
        }
    }
}

/// Overlay drawing style.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OverlaySettings {
    pub color: RgbColor,
    /// Outline width in pixels.
    pub thickness: u32,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            color: RgbColor::RED,
            thickness: 2,
        }
    }
}

/// Settings controlling optional runtime telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub enabled: bool,
    /// Logging level for telemetry output (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "debug".to_string(),
        }
    }
}

impl TelemetrySettings {
    pub fn level_filter(&self) -> LevelFilter {
        parse_level_filter(&self.level)
    }
}

/// All pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppSettings {
    pub extract: ExtractSettings,
    pub detector: DetectorSettings,
    pub tracker: TrackerSettings,
    pub overlay: OverlaySettings,
    pub telemetry: TelemetrySettings,
}

impl AppSettings {
    /// Load settings from a JSON file.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))
    }

    /// Resolve and load settings: explicit path, then `MDFRAMES_CONFIG`, then
    /// [`default_settings_path`] if it exists, else built-in defaults.
    ///
    /// Returns the settings and the file they came from, if any.
    pub fn resolve(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let candidate = explicit
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));
        if let Some(path) = candidate {
            let settings = Self::load_from_path(&path)?;
            return Ok((settings, Some(path)));
        }
        let fallback = default_settings_path();
        if fallback.is_file() {
            let settings = Self::load_from_path(&fallback)?;
            return Ok((settings, Some(fallback)));
        }
        Ok((Self::default(), None))
    }
}

/// `config/mdframes.json` relative to the working directory.
pub fn default_settings_path() -> PathBuf {
    env::current_dir()
        .map(|dir| dir.join("config/mdframes.json"))
        .unwrap_or_else(|_| PathBuf::from("config/mdframes.json"))
}
