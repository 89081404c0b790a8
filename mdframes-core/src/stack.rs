//! Multi-page TIFF stacks as produced by the microscope acquisition software.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::debug;
use tiff::decoder::{Decoder, DecodingResult, Limits};

/// Pixel samples in the bit depth they were stored with, interleaved per pixel.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! with_samples {
    ($samples:expr, $v:ident => $body:expr) => {
        match $samples {
            Samples::U8($v) => $body,
            Samples::U16($v) => $body,
            Samples::U32($v) => $body,
            Samples::U64($v) => $body,
            Samples::I8($v) => $body,
            Samples::I16($v) => $body,
            Samples::I32($v) => $body,
            Samples::I64($v) => $body,
            Samples::F32($v) => $body,
            Samples::F64($v) => $body,
        }
    };
}

impl Samples {
    pub fn len(&self) -> usize {
        with_samples!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every sample widened to `f64`.
    pub fn to_f64(&self) -> Vec<f64> {
        with_samples!(self, v => v.iter().map(|&s| s as f64).collect())
    }

    /// Short name of the stored type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Samples::U8(_) => "u8",
            Samples::U16(_) => "u16",
            Samples::U32(_) => "u32",
            Samples::U64(_) => "u64",
            Samples::I8(_) => "i8",
            Samples::I16(_) => "i16",
            Samples::I32(_) => "i32",
            Samples::I64(_) => "i64",
            Samples::F32(_) => "f32",
            Samples::F64(_) => "f64",
        }
    }
}

/// One image of a stack.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    channels: usize,
    samples: Samples,
}

impl Frame {
    /// Build a frame, inferring the channel count from the sample count.
    pub fn new(width: u32, height: u32, samples: Samples) -> Result<Self> {
        let pixels = width as usize * height as usize;
        anyhow::ensure!(pixels > 0, "frame dimensions must be non-zero");
        anyhow::ensure!(
            samples.len() % pixels == 0,
            "{} samples do not fill a {width}x{height} frame",
            samples.len()
        );
        let channels = samples.len() / pixels;
        anyhow::ensure!(
            (1..=4).contains(&channels),
            "unsupported channel count {channels} for a {width}x{height} frame"
        );
        Ok(Self {
            width,
            height,
            channels,
            samples,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    pub fn is_8bit(&self) -> bool {
        matches!(self.samples, Samples::U8(_))
    }
}

/// Every frame of one acquisition file, in page order.
#[derive(Debug, Clone)]
pub struct FrameStack {
    source: PathBuf,
    frames: Vec<Frame>,
}

impl FrameStack {
    pub fn new(source: PathBuf, frames: Vec<Frame>) -> Self {
        Self { source, frames }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Shape as `(frames, height, width)` of the first frame.
    pub fn shape(&self) -> Option<(usize, u32, u32)> {
        self.frames
            .first()
            .map(|f| (self.frames.len(), f.height, f.width))
    }
}

/// Read every page of a TIFF file.
pub fn read_tiff_stack<P: AsRef<Path>>(path: P) -> Result<FrameStack> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .with_context(|| format!("failed to parse TIFF header of {}", path.display()))?
        .with_limits(Limits::unlimited());

    let mut frames = Vec::new();
    loop {
        let page = frames.len();
        let (width, height) = decoder
            .dimensions()
            .with_context(|| format!("failed to read page {page} size in {}", path.display()))?;
        let samples = match decoder
            .read_image()
            .with_context(|| format!("failed to decode page {page} of {}", path.display()))?
        {
            DecodingResult::U8(v) => Samples::U8(v),
            DecodingResult::U16(v) => Samples::U16(v),
            DecodingResult::U32(v) => Samples::U32(v),
            DecodingResult::U64(v) => Samples::U64(v),
            DecodingResult::I8(v) => Samples::I8(v),
            DecodingResult::I16(v) => Samples::I16(v),
            DecodingResult::I32(v) => Samples::I32(v),
            DecodingResult::I64(v) => Samples::I64(v),
            DecodingResult::F32(v) => Samples::F32(v),
            DecodingResult::F64(v) => Samples::F64(v),
            #[allow(unreachable_patterns)]
            _ => anyhow::bail!(
                "page {page} of {} uses an unsupported sample type",
                path.display()
            ),
        };
        let frame = Frame::new(width, height, samples)
            .with_context(|| format!("page {page} of {}", path.display()))?;
        frames.push(frame);

        if !decoder.more_images() {
            break;
        }
        decoder
            .next_image()
            .with_context(|| format!("failed to seek to page {} of {}", page + 1, path.display()))?;
    }

    if let Some(first) = frames.first() {
        debug!(
            "Read {} ({} frames, {}x{}, {} channel(s), {})",
            path.display(),
            frames.len(),
            first.width,
            first.height,
            first.channels,
            first.samples.type_name()
        );
    }

    Ok(FrameStack::new(path.to_path_buf(), frames))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tiff::encoder::{TiffEncoder, colortype};

    #[test]
    fn frame_infers_channels_and_rejects_ragged_data() {
        let gray = Frame::new(2, 2, Samples::U16(vec![0; 4])).unwrap();
        assert_eq!(gray.channels(), 1);
        let rgb = Frame::new(2, 1, Samples::U8(vec![0; 6])).unwrap();
        assert_eq!(rgb.channels(), 3);
        assert!(Frame::new(2, 2, Samples::U8(vec![0; 5])).is_err());
        assert!(Frame::new(0, 2, Samples::U8(vec![])).is_err());
    }

    #[test]
    fn reads_every_page_of_a_stack() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stack.tif");
        {
            let mut file = File::create(&path).unwrap();
            let mut encoder = TiffEncoder::new(&mut file).unwrap();
            for page in 0..3u16 {
                let data: Vec<u16> = (0..12).map(|i| i * 100 + page).collect();
                encoder
                    .write_image::<colortype::Gray16>(4, 3, &data)
                    .unwrap();
            }
        }

        let stack = read_tiff_stack(&path).unwrap();
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.shape(), Some((3, 3, 4)));
        let Samples::U16(last) = stack.frames()[2].samples() else {
            panic!("expected u16 samples");
        };
        assert_eq!(last[1], 102);
    }

    #[test]
    fn garbage_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.tif");
        std::fs::write(&path, b"definitely not a tiff").unwrap();
        assert!(read_tiff_stack(&path).is_err());
    }
}
