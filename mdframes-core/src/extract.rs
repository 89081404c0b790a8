//! Frame extraction: TIFF stacks in, every Nth frame out as an 8-bit RGB raster.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::ImageFormat;
use log::{info, warn};
use mdframes_utils::{
    ensure_dir,
    input::{collect_files, has_extension},
    load_image, output_format_from_str, timing_guard,
};
use serde::Serialize;

use crate::{
    naming::{frame_file_name, stack_output_dir},
    normalize::frame_to_rgb,
    stack::{FrameStack, read_tiff_stack},
};

/// Extensions recognised as multi-page stacks.
pub const STACK_EXTENSIONS: &[&str] = &["tif", "tiff"];
/// Extensions picked up by [`convert_images`].
pub const JPEG_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// Sampling interval; always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stride(usize);

impl Stride {
    /// Coerce any requested interval below 1 to 1.
    pub fn new(requested: i64) -> Self {
        Self(usize::try_from(requested).unwrap_or(0).max(1))
    }

    pub fn get(self) -> usize {
        self.0
    }

    pub fn keeps(self, index: usize) -> bool {
        index % self.0 == 0
    }
}

impl Default for Stride {
    fn default() -> Self {
        Self(10)
    }
}

/// Output raster format together with the extension used in file names.
#[derive(Debug, Clone)]
pub struct FrameFormat {
    format: ImageFormat,
    extension: String,
}

impl FrameFormat {
    pub fn parse(name: &str) -> Result<Self> {
        let format = output_format_from_str(name)?;
        let extension = name.trim().trim_start_matches('.').to_ascii_lowercase();
        Ok(Self { format, extension })
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn image_format(&self) -> ImageFormat {
        self.format
    }
}

/// Outcome for one stack.
#[derive(Debug, Clone, Serialize)]
pub struct StackReport {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub frames_read: usize,
    pub frames_written: usize,
}

/// Outcome of an [`extract`] call.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractReport {
    pub output_dir: PathBuf,
    pub stacks: Vec<StackReport>,
    /// Stacks that could not be read (directory mode only).
    pub failed: Vec<PathBuf>,
}

impl ExtractReport {
    pub fn frames_written(&self) -> usize {
        self.stacks.iter().map(|s| s.frames_written).sum()
    }
}

/// Extract every `stride`-th frame of a stack, or of every stack in a directory.
///
/// Directory input writes each stack to `<output_folder>/<stem>_frames`; a stack that fails to
/// parse or to write is logged and skipped. A single file writes straight into `output_folder`
/// and any failure is returned. Nothing is created until the input has been found.
pub fn extract(
    input_path: &Path,
    output_folder: &Path,
    format: &FrameFormat,
    stride: Stride,
) -> Result<ExtractReport> {
    let _guard = timing_guard("mdframes_core::extract", log::Level::Debug);
    let mut report = ExtractReport {
        output_dir: output_folder.to_path_buf(),
        stacks: Vec::new(),
        failed: Vec::new(),
    };

    if input_path.is_dir() {
        let stacks = collect_files(input_path, STACK_EXTENSIONS)?;
        if stacks.is_empty() {
            warn!("No .tif files found in directory: {}", input_path.display());
            return Ok(report);
        }
        ensure_dir(output_folder)?;
        for source in stacks {
            let target = stack_output_dir(output_folder, &source);
            let stack = match read_tiff_stack(&source) {
                Ok(stack) => stack,
                Err(err) => {
                    warn!("Error reading TIF '{}': {err:#}", source.display());
                    report.failed.push(source);
                    continue;
                }
            };
            match write_stack(&stack, &target, format, stride) {
                Ok(written) => report.stacks.push(written),
                Err(err) => {
                    warn!("Error writing frames of '{}': {err:#}", source.display());
                    report.failed.push(source);
                }
            }
        }
    } else {
        anyhow::ensure!(
            input_path.is_file(),
            "input path does not exist: {}",
            input_path.display()
        );
        let stack = read_tiff_stack(input_path)?;
        report
            .stacks
            .push(write_stack(&stack, output_folder, format, stride)?);
    }

    Ok(report)
}

/// Write the kept frames of one stack as `frame_{seq:05d}.{ext}`, `seq` counting from 0.
pub fn write_stack(
    stack: &FrameStack,
    output_dir: &Path,
    format: &FrameFormat,
    stride: Stride,
) -> Result<StackReport> {
    ensure_dir(output_dir)?;
    if let Some((frames, height, width)) = stack.shape() {
        info!(
            "Data shape: ({frames}, {height}, {width}) - reading {}",
            stack.source().display()
        );
    }

    let mut written = 0usize;
    for (index, frame) in stack.frames().iter().enumerate() {
        if !stride.keeps(index) {
            continue;
        }
        let rgb = frame_to_rgb(frame)
            .with_context(|| format!("frame {index} of {}", stack.source().display()))?;
        let path = output_dir.join(frame_file_name(written, format.extension()));
        rgb.save_with_format(&path, format.image_format())
            .with_context(|| format!("failed to write {}", path.display()))?;
        written += 1;
    }

    info!(
        "Successfully converted {written} frames (every {}th) to {}",
        stride.get(),
        output_dir.display()
    );

    Ok(StackReport {
        source: stack.source().to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        frames_read: stack.len(),
        frames_written: written,
    })
}

/// Re-encode a JPEG file, or every JPEG in a directory, into `format`, keeping each stem.
///
/// Files that fail to decode are logged and skipped. Returns the paths written.
pub fn convert_images(
    input_path: &Path,
    output_folder: &Path,
    format: &FrameFormat,
) -> Result<Vec<PathBuf>> {
    let sources = if input_path.is_dir() {
        let files = collect_files(input_path, JPEG_EXTENSIONS)?;
        if files.is_empty() {
            warn!("No .jpg files found in directory: {}", input_path.display());
            return Ok(Vec::new());
        }
        files
    } else {
        anyhow::ensure!(
            input_path.is_file(),
            "input path does not exist: {}",
            input_path.display()
        );
        if !has_extension(input_path, JPEG_EXTENSIONS) {
            warn!("{} does not look like a JPEG; trying anyway", input_path.display());
        }
        vec![input_path.to_path_buf()]
    };

    ensure_dir(output_folder)?;
    let mut written = Vec::with_capacity(sources.len());
    for source in sources {
        info!("{}", source.display());
        let image = match load_image(&source) {
            Ok(image) => image,
            Err(err) => {
                warn!("Error converting JPG '{}': {err:#}", source.display());
                continue;
            }
        };
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let target = output_folder.join(format!("{stem}.{}", format.extension()));
        image
            .save_with_format(&target, format.image_format())
            .with_context(|| format!("failed to write {}", target.display()))?;
        written.push(target);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{Frame, Samples};
    use tempfile::tempdir;

    fn gray_stack(len: usize) -> FrameStack {
        let frames = (0..len)
            .map(|i| Frame::new(3, 2, Samples::U16(vec![i as u16; 6])).unwrap())
            .collect();
        FrameStack::new(PathBuf::from("synthetic.tif"), frames)
    }

    #[test]
    fn stride_coerces_non_positive_values() {
        assert_eq!(Stride::new(0).get(), 1);
        assert_eq!(Stride::new(-4).get(), 1);
        assert_eq!(Stride::new(3).get(), 3);
        assert!(Stride::new(3).keeps(6));
        assert!(!Stride::new(3).keeps(7));
    }

    #[test]
    fn writes_ceil_len_over_stride_frames() {
        let png = FrameFormat::parse("png").unwrap();
        for (len, stride, expected) in [(10, 3, 4), (9, 3, 3), (1, 5, 1), (5, 1, 5), (0, 2, 0)] {
            let dir = tempdir().unwrap();
            let report = write_stack(&gray_stack(len), dir.path(), &png, Stride::new(stride))
                .expect("write stack");
            assert_eq!(report.frames_written, expected, "len={len} stride={stride}");
            assert_eq!(report.frames_read, len);
            for seq in 0..expected {
                assert!(dir.path().join(frame_file_name(seq, "png")).is_file());
            }
            assert!(!dir.path().join(frame_file_name(expected, "png")).exists());
        }
    }

    #[test]
    fn frame_format_keeps_requested_extension() {
        let jpg = FrameFormat::parse(".JPG").unwrap();
        assert_eq!(jpg.extension(), "jpg");
        assert_eq!(jpg.image_format(), ImageFormat::Jpeg);
        assert!(FrameFormat::parse("xyz").is_err());
    }

    #[test]
    fn missing_input_creates_no_output_folder() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("typo_frames");
        let png = FrameFormat::parse("png").unwrap();
        assert!(extract(&dir.path().join("typo.tif"), &out, &png, Stride::new(1)).is_err());
        assert!(!out.exists());
    }

    #[test]
    fn write_failures_skip_only_that_stack() {
        use tiff::encoder::{TiffEncoder, colortype};

        let dir = tempdir().unwrap();
        let input = dir.path().join("stacks");
        std::fs::create_dir(&input).unwrap();
        for name in ["a.tif", "b.tif"] {
            let mut file = std::fs::File::create(input.join(name)).unwrap();
            let mut encoder = TiffEncoder::new(&mut file).unwrap();
            encoder
                .write_image::<colortype::Gray16>(4, 2, &[100u16; 8])
                .unwrap();
        }
        let out = dir.path().join("frames");
        std::fs::create_dir_all(&out).unwrap();
        // a plain file where a's output folder should go
        std::fs::write(out.join("a_frames"), b"in the way").unwrap();

        let png = FrameFormat::parse("png").unwrap();
        let report = extract(&input, &out, &png, Stride::new(1)).unwrap();
        assert_eq!(report.failed, vec![input.join("a.tif")]);
        assert_eq!(report.stacks.len(), 1);
        assert!(out.join("b_frames").join("frame_00000.png").is_file());
    }

    #[test]
    fn convert_images_keeps_stems() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in");
        std::fs::create_dir(&input).unwrap();
        image::RgbImage::from_pixel(4, 4, image::Rgb([9, 9, 9]))
            .save_with_format(input.join("shot_a.jpg"), ImageFormat::Jpeg)
            .unwrap();
        std::fs::write(input.join("shot_b.jpeg"), b"corrupt").unwrap();

        let out = dir.path().join("out");
        let written = convert_images(&input, &out, &FrameFormat::parse("png").unwrap()).unwrap();
        assert_eq!(written, vec![out.join("shot_a.png")]);
        assert!(out.join("shot_a.png").is_file());
    }
}
