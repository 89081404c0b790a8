//! Common helpers shared across the mdframes crates.

/// Overlay color parsing.
pub mod color;
/// Persisted pipeline settings.
pub mod config;
/// Image loading and encoding helpers.
pub mod image_utils;
/// Input path resolution (single file vs. sorted directory listing).
pub mod input;
/// Instrumentation helpers for optional performance tracing.
pub mod telemetry;

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::LevelFilter;

pub use color::{RgbColor, parse_hex_color};
pub use config::{AppSettings, EmptyFramePolicy};
pub use image_utils::{
    load_grayscale, load_image, load_rgb, output_format_from_str, rgb_to_chw,
};
pub use input::{InputError, collect_files, resolve_inputs};
pub use telemetry::{TimingGuard, configure as configure_telemetry, timing_guard};

/// Initialize logging once for the CLI and tests.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` applies.
pub fn init_logging(default_filter: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.filter_module(telemetry::TELEMETRY_TARGET, LevelFilter::Trace);

    if builder.try_init().is_err() {
        // Logger already initialized; nothing to do.
    }
    Ok(())
}

/// Validate that a path exists and resolve it to an absolute path.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    anyhow::ensure!(path.exists(), "path does not exist: {}", path.display());
    Ok(path.canonicalize()?)
}

/// Create `dir` (and parents) if it is missing.
pub fn ensure_dir<P: AsRef<Path>>(dir: P) -> Result<()> {
    use anyhow::Context;

    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn normalize_path_rejects_missing() {
        let dir = tempdir().expect("tempdir");
        assert!(normalize_path(dir.path().join("nope")).is_err());
        assert!(normalize_path(dir.path()).is_ok());
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let nested = dir.path().join("a/b/c");
        ensure_dir(&nested).expect("first create");
        ensure_dir(&nested).expect("second create");
        assert!(nested.is_dir());
    }
}
