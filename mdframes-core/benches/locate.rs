use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use mdframes_core::{
    CentroidLocator, Frame, LocateParams, ParticleLocator, Samples, normalize_to_u8,
};
use ndarray::Array3;

const FRAME_SIDE: usize = 256;

fn synthetic_stack(frames: usize) -> Array3<f32> {
    let mut stack = Array3::<f32>::zeros((frames, FRAME_SIDE, FRAME_SIDE));
    let centers = [(40.0f32, 60.0f32), (128.5, 128.0), (200.0, 90.25), (70.0, 210.0)];
    for (f, mut frame) in stack.outer_iter_mut().enumerate() {
        for (row, mut line) in frame.outer_iter_mut().enumerate() {
            for (col, value) in line.iter_mut().enumerate() {
                *value = centers
                    .iter()
                    .map(|&(cx, cy)| {
                        let dx = col as f32 - cx - f as f32;
                        let dy = row as f32 - cy;
                        180.0 * (-(dx * dx + dy * dy) / 8.0).exp()
                    })
                    .sum();
            }
        }
    }
    stack
}

fn benchmark_locate(c: &mut Criterion) {
    let stack = synthetic_stack(4);
    let mut group = c.benchmark_group("centroid_locate");
    for diameter in [9u32, 21] {
        let locator =
            CentroidLocator::new(LocateParams::new(diameter, 50.0)).expect("valid parameters");
        group.bench_with_input(BenchmarkId::from_parameter(diameter), &stack, |b, stack| {
            b.iter(|| locator.locate(black_box(stack)).expect("locate"))
        });
    }
    group.finish();
}

fn benchmark_normalize(c: &mut Criterion) {
    let samples: Vec<u16> = (0..1024 * 1024).map(|i| (i % 4096) as u16).collect();
    let frame = Frame::new(1024, 1024, Samples::U16(samples)).expect("valid frame");
    c.bench_function("normalize_u16_1024", |b| {
        b.iter(|| normalize_to_u8(black_box(&frame)))
    });
}

criterion_group!(benches, benchmark_locate, benchmark_normalize);
criterion_main!(benches);
