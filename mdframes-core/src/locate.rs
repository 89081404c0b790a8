//! Particle location for pseudo-labeling.
//!
//! [`CentroidLocator`] follows the classic Crocker-Grier recipe: band-pass the frame (Gaussian
//! noise removal minus a boxcar background), keep local maxima brighter than a percentile of
//! the filtered frame, then refine each maximum to the brightness-weighted centroid inside a
//! disc of `diameter / 2` pixels.

use std::{cmp::Ordering, collections::BTreeMap};

use anyhow::Result;
use log::debug;
use mdframes_utils::{config::TrackerSettings, timing_guard};
use ndarray::{Array2, Array3, ArrayView2};
use serde::Serialize;
use thiserror::Error;

const MAX_REFINE_ITERATIONS: usize = 10;
const REFINE_SHIFT_THRESHOLD: f64 = 0.6;

/// Rejected locator parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocateError {
    #[error("diameter must be an odd integer of at least 3 (got {0})")]
    InvalidDiameter(u32),
    #[error("minmass must be finite and non-negative (got {0})")]
    InvalidMinmass(f32),
    #[error("separation must be a positive number of pixels (got {0})")]
    InvalidSeparation(f32),
    #[error("percentile must lie within [0, 100] (got {0})")]
    InvalidPercentile(f32),
    #[error("noise_size must be positive (got {0})")]
    InvalidNoiseSize(f32),
    #[error("smoothing_size must be at least 1 (got {0})")]
    InvalidSmoothingSize(u32),
}

/// One located particle. Coordinates are in pixels, `x` along columns and `y` along rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParticleObservation {
    pub frame: usize,
    pub x: f64,
    pub y: f64,
    /// Integrated band-passed brightness inside the mask.
    pub mass: f64,
    /// Radius of gyration of the brightness inside the mask.
    pub size: f64,
}

/// Anything that can find particles in a `(frame, row, col)` stack.
pub trait ParticleLocator {
    fn locate(&self, frames: &Array3<f32>) -> Result<Vec<ParticleObservation>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocateParams {
    /// Feature diameter in pixels; odd and at least 3.
    pub diameter: u32,
    pub minmass: f32,
    /// Minimum center-to-center distance; `diameter + 1` when unset.
    pub separation: Option<f32>,
    pub percentile: f32,
    /// Gaussian sigma of the noise filter.
    pub noise_size: f32,
    /// Boxcar width of the background estimate; `diameter` when unset.
    pub smoothing_size: Option<u32>,
}

impl LocateParams {
    pub fn new(diameter: u32, minmass: f32) -> Self {
        Self {
            diameter,
            minmass,
            separation: None,
            percentile: 64.0,
            noise_size: 1.0,
            smoothing_size: None,
        }
    }

    pub fn validate(&self) -> Result<(), LocateError> {
        if self.diameter < 3 || self.diameter % 2 == 0 {
            return Err(LocateError::InvalidDiameter(self.diameter));
        }
        if !self.minmass.is_finite() || self.minmass < 0.0 {
            return Err(LocateError::InvalidMinmass(self.minmass));
        }
        match self.separation {
            Some(sep) if !(sep.is_finite() && sep > 0.0) => {
                return Err(LocateError::InvalidSeparation(sep));
            }
            _ => {}
        }
        if !(0.0..=100.0).contains(&self.percentile) {
            return Err(LocateError::InvalidPercentile(self.percentile));
        }
        if !(self.noise_size.is_finite() && self.noise_size > 0.0) {
            return Err(LocateError::InvalidNoiseSize(self.noise_size));
        }
        if let Some(0) = self.smoothing_size {
            return Err(LocateError::InvalidSmoothingSize(0));
        }
        Ok(())
    }

    pub fn radius(&self) -> usize {
        (self.diameter / 2) as usize
    }

    pub fn separation(&self) -> f32 {
        self.separation.unwrap_or(self.diameter as f32 + 1.0)
    }

    pub fn smoothing_size(&self) -> u32 {
        self.smoothing_size.unwrap_or(self.diameter)
    }
}

impl From<&TrackerSettings> for LocateParams {
    fn from(settings: &TrackerSettings) -> Self {
        Self {
            diameter: settings.diameter,
            minmass: settings.minmass,
            separation: settings.separation,
            percentile: settings.percentile,
            noise_size: settings.noise_size,
            smoothing_size: settings.smoothing_size,
        }
    }
}

/// Band-pass + local-maximum + centroid particle locator.
#[derive(Debug, Clone)]
pub struct CentroidLocator {
    params: LocateParams,
}

impl CentroidLocator {
    pub fn new(params: LocateParams) -> Result<Self, LocateError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &LocateParams {
        &self.params
    }

    /// Locate particles in a single frame.
    pub fn locate_frame(&self, frame: ArrayView2<'_, f32>, index: usize) -> Vec<ParticleObservation> {
        let (height, width) = frame.dim();
        let radius = self.params.radius();
        if height <= 2 * radius || width <= 2 * radius {
            debug!("Frame {index} ({width}x{height}) is smaller than one feature; skipping");
            return Vec::new();
        }

        let filtered = bandpass(frame, self.params.noise_size, self.params.smoothing_size());
        let threshold = percentile(&filtered, self.params.percentile);
        let candidates = local_maxima(&filtered, self.params.separation(), threshold, radius);

        let mut observations: Vec<ParticleObservation> = candidates
            .into_iter()
            .filter_map(|(y, x)| refine(&filtered, y, x, radius))
            .filter(|(_, _, mass, _)| *mass >= self.params.minmass as f64)
            .map(|(x, y, mass, size)| ParticleObservation {
                frame: index,
                x,
                y,
                mass,
                size,
            })
            .collect();

        observations.sort_by(|a, b| {
            a.y.partial_cmp(&b.y)
                .unwrap_or(Ordering::Equal)
                .then(a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal))
        });
        debug!("Frame {index}: {} particle(s)", observations.len());
        observations
    }
}

impl ParticleLocator for CentroidLocator {
    fn locate(&self, frames: &Array3<f32>) -> Result<Vec<ParticleObservation>> {
        let _guard = timing_guard("mdframes_core::locate", log::Level::Debug);
        Ok(frames
            .outer_iter()
            .enumerate()
            .flat_map(|(index, frame)| self.locate_frame(frame, index))
            .collect())
    }
}

/// Group observations by frame id, ascending.
pub fn group_by_frame(
    observations: &[ParticleObservation],
) -> BTreeMap<usize, Vec<ParticleObservation>> {
    let mut grouped: BTreeMap<usize, Vec<ParticleObservation>> = BTreeMap::new();
    for obs in observations {
        grouped.entry(obs.frame).or_default().push(*obs);
    }
    grouped
}

/// Gaussian-smoothed frame minus its boxcar background, clipped at zero.
pub fn bandpass(frame: ArrayView2<'_, f32>, noise_size: f32, smoothing_size: u32) -> Array2<f32> {
    let lowpass = convolve_separable(frame, &gaussian_kernel(noise_size));
    let window = (smoothing_size / 2) as usize * 2 + 1;
    let background = convolve_separable(frame, &vec![1.0 / window as f32; window]);
    let mut out = lowpass - background;
    out.mapv_inplace(|v| v.max(0.0));
    out
}

fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let half = (4.0 * sigma).ceil().max(1.0) as i32;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (-half..=half)
        .map(|i| (-(i * i) as f32 / denom).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

fn clamp_index(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

/// Separable 2-D convolution with edge replication.
fn convolve_separable(image: ArrayView2<'_, f32>, kernel: &[f32]) -> Array2<f32> {
    let (h, w) = image.dim();
    let half = (kernel.len() / 2) as isize;

    let mut rows = Array2::<f32>::zeros((h, w));
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = clamp_index(x as isize + k as isize - half, w);
                acc += weight * image[(y, sx)];
            }
            rows[(y, x)] = acc;
        }
    }

    let mut out = Array2::<f32>::zeros((h, w));
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = clamp_index(y as isize + k as isize - half, h);
                acc += weight * rows[(sy, x)];
            }
            out[(y, x)] = acc;
        }
    }
    out
}

/// Square max filter of half-width `half`.
fn max_filter(image: &Array2<f32>, half: usize) -> Array2<f32> {
    let (h, w) = image.dim();
    let half = half as isize;

    let mut rows = Array2::<f32>::zeros((h, w));
    for y in 0..h {
        for x in 0..w {
            rows[(y, x)] = (-half..=half)
                .map(|d| image[(y, clamp_index(x as isize + d, w))])
                .fold(f32::NEG_INFINITY, f32::max);
        }
    }

    let mut out = Array2::<f32>::zeros((h, w));
    for y in 0..h {
        for x in 0..w {
            out[(y, x)] = (-half..=half)
                .map(|d| rows[(clamp_index(y as isize + d, h), x)])
                .fold(f32::NEG_INFINITY, f32::max);
        }
    }
    out
}

/// Linear-interpolated percentile over every pixel.
fn percentile(image: &Array2<f32>, pct: f32) -> f32 {
    let mut values: Vec<f32> = image.iter().copied().collect();
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f32::total_cmp);
    let pos = (pct as f64 / 100.0) * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = (pos - lo as f64) as f32;
    values[lo] + (values[hi] - values[lo]) * frac
}

/// Integer maxima brighter than `threshold`, at least `margin` pixels from every edge and
/// at least `separation` apart (the brighter one wins).
fn local_maxima(
    image: &Array2<f32>,
    separation: f32,
    threshold: f32,
    margin: usize,
) -> Vec<(usize, usize)> {
    let (h, w) = image.dim();
    let dilated = max_filter(image, (separation / 2.0).floor().max(1.0) as usize);

    let mut peaks: Vec<(f32, usize, usize)> = Vec::new();
    for y in margin..h - margin {
        for x in margin..w - margin {
            let v = image[(y, x)];
            if v > threshold && v >= dilated[(y, x)] {
                peaks.push((v, y, x));
            }
        }
    }
    peaks.sort_by(|a, b| b.0.total_cmp(&a.0));

    let min_dist_sq = (separation as f64).powi(2);
    let mut kept: Vec<(usize, usize)> = Vec::with_capacity(peaks.len());
    for (_, y, x) in peaks {
        let crowded = kept.iter().any(|&(ky, kx)| {
            let dy = ky as f64 - y as f64;
            let dx = kx as f64 - x as f64;
            dy * dy + dx * dx < min_dist_sq
        });
        if !crowded {
            kept.push((y, x));
        }
    }
    kept
}

/// Brightness-weighted centroid inside a disc of `radius`, re-centered while the estimate
/// drifts more than 0.6 px. Returns `(x, y, mass, size)`.
fn refine(
    image: &Array2<f32>,
    mut cy: usize,
    mut cx: usize,
    radius: usize,
) -> Option<(f64, f64, f64, f64)> {
    let (h, w) = image.dim();
    let r = radius as isize;
    let r_sq = (radius * radius) as isize;

    for _ in 0..MAX_REFINE_ITERATIONS {
        let (mut mass, mut sx, mut sy, mut sr) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
        for dy in -r..=r {
            for dx in -r..=r {
                let d_sq = dy * dy + dx * dx;
                if d_sq > r_sq {
                    continue;
                }
                let v = image[((cy as isize + dy) as usize, (cx as isize + dx) as usize)] as f64;
                mass += v;
                sx += v * dx as f64;
                sy += v * dy as f64;
                sr += v * d_sq as f64;
            }
        }
        if mass <= 0.0 {
            return None;
        }

        let (ox, oy) = (sx / mass, sy / mass);
        let shift_x = ox.abs() > REFINE_SHIFT_THRESHOLD;
        let shift_y = oy.abs() > REFINE_SHIFT_THRESHOLD;
        let next_x = if shift_x {
            (cx as isize + ox.round() as isize).clamp(r, w as isize - 1 - r) as usize
        } else {
            cx
        };
        let next_y = if shift_y {
            (cy as isize + oy.round() as isize).clamp(r, h as isize - 1 - r) as usize
        } else {
            cy
        };

        if (next_x, next_y) == (cx, cy) {
            let size = (sr / mass - (ox * ox + oy * oy)).max(0.0).sqrt();
            return Some((cx as f64 + ox, cy as f64 + oy, mass, size));
        }
        cx = next_x;
        cy = next_y;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_spot(frame: &mut Array2<f32>, x: f32, y: f32, sigma: f32, amplitude: f32) {
        let (h, w) = frame.dim();
        for row in 0..h {
            for col in 0..w {
                let d2 = (col as f32 - x).powi(2) + (row as f32 - y).powi(2);
                frame[(row, col)] += amplitude * (-d2 / (2.0 * sigma * sigma)).exp();
            }
        }
    }

    fn small_params() -> LocateParams {
        LocateParams::new(9, 50.0)
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert_eq!(
            CentroidLocator::new(LocateParams::new(4, 10.0)).unwrap_err(),
            LocateError::InvalidDiameter(4)
        );
        assert_eq!(
            CentroidLocator::new(LocateParams::new(1, 10.0)).unwrap_err(),
            LocateError::InvalidDiameter(1)
        );
        assert_eq!(
            CentroidLocator::new(LocateParams::new(5, -1.0)).unwrap_err(),
            LocateError::InvalidMinmass(-1.0)
        );
        let mut params = LocateParams::new(5, 1.0);
        params.percentile = 101.0;
        assert!(matches!(
            CentroidLocator::new(params),
            Err(LocateError::InvalidPercentile(_))
        ));
        assert!(CentroidLocator::new(LocateParams::new(41, 200.0)).is_ok());
    }

    #[test]
    fn finds_gaussian_spots_with_subpixel_accuracy() {
        let mut frame = Array2::<f32>::zeros((64, 64));
        add_spot(&mut frame, 20.0, 18.0, 1.5, 200.0);
        add_spot(&mut frame, 44.3, 40.0, 1.5, 200.0);

        let locator = CentroidLocator::new(small_params()).unwrap();
        let found = locator.locate_frame(frame.view(), 3);
        assert_eq!(found.len(), 2, "{found:?}");

        assert_eq!(found[0].frame, 3);
        assert!((found[0].x - 20.0).abs() < 0.5, "{:?}", found[0]);
        assert!((found[0].y - 18.0).abs() < 0.5, "{:?}", found[0]);
        assert!((found[1].x - 44.3).abs() < 0.5, "{:?}", found[1]);
        assert!((found[1].y - 40.0).abs() < 0.5, "{:?}", found[1]);
        assert!(found.iter().all(|p| p.mass >= 50.0 && p.size > 0.0));
    }

    #[test]
    fn minmass_filters_dim_spots() {
        let mut frame = Array2::<f32>::zeros((48, 48));
        add_spot(&mut frame, 24.0, 24.0, 1.5, 200.0);
        let locator = CentroidLocator::new(LocateParams::new(9, 1.0e9)).unwrap();
        assert!(locator.locate_frame(frame.view(), 0).is_empty());
    }

    #[test]
    fn blank_frames_have_no_particles_and_stack_keeps_frame_ids() {
        let mut stack = Array3::<f32>::zeros((3, 48, 48));
        let mut spot = Array2::<f32>::zeros((48, 48));
        add_spot(&mut spot, 24.0, 24.0, 1.5, 200.0);
        stack.index_axis_mut(ndarray::Axis(0), 2).assign(&spot);

        let locator = CentroidLocator::new(small_params()).unwrap();
        let found = locator.locate(&stack).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].frame, 2);

        let grouped = group_by_frame(&found);
        assert_eq!(grouped.keys().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn spots_at_the_border_are_ignored() {
        let mut frame = Array2::<f32>::zeros((48, 48));
        add_spot(&mut frame, 1.0, 24.0, 1.5, 200.0);
        let locator = CentroidLocator::new(small_params()).unwrap();
        assert!(locator.locate_frame(frame.view(), 0).is_empty());
    }

    #[test]
    fn group_by_frame_orders_frames() {
        let obs = |frame| ParticleObservation {
            frame,
            x: 1.0,
            y: 1.0,
            mass: 1.0,
            size: 1.0,
        };
        let grouped = group_by_frame(&[obs(5), obs(1), obs(5)]);
        let keys: Vec<usize> = grouped.keys().copied().collect();
        assert_eq!(keys, vec![1, 5]);
        assert_eq!(grouped[&5].len(), 2);
    }

    #[test]
    fn percentile_interpolates() {
        let image = Array2::from_shape_vec((1, 5), vec![0.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(percentile(&image, 50.0), 2.0);
        assert_eq!(percentile(&image, 100.0), 4.0);
        assert!((percentile(&image, 64.0) - 2.56).abs() < 1e-5);
    }
}
