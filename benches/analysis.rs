use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::f32::consts::PI;

use spectrum_bridge::analysis::Analyzer;
use spectrum_bridge::audio::{sample_accumulator, SampleWindow};
use spectrum_bridge::codec::FrameEncoder;
use spectrum_bridge::config::AnalysisConfig;

fn tone(freq: f32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / 48_000.0).sin())
        .collect()
}

fn bench_analysis_cycle(c: &mut Criterion) {
    let config = AnalysisConfig::default();
    let left = tone(1000.0, config.transform_size);
    let right = tone(1500.0, config.transform_size);
    let window = SampleWindow::from_channels(config.transform_size, &left, &right);
    let mut analyzer = Analyzer::new(&config, 48_000.0);

    c.bench_function("analyze_4096_stereo", |b| {
        b.iter(|| analyzer.analyze(black_box(&window), 2, 48_000.0, 0))
    });
}

fn bench_encode(c: &mut Criterion) {
    let config = AnalysisConfig::default();
    let left = tone(1000.0, config.transform_size);
    let window = SampleWindow::from_channels(config.transform_size, &left, &left);
    let snapshot = Analyzer::new(&config, 48_000.0).analyze(&window, 2, 48_000.0, 0);
    let mut encoder = FrameEncoder::new(config.band_count);

    c.bench_function("encode_frame_64_bands", |b| {
        b.iter(|| encoder.encode(black_box(&snapshot)))
    });
}

fn bench_accumulator_push(c: &mut Criterion) {
    let (writer, _reader) = sample_accumulator(4096);
    let block: Vec<f32> = tone(440.0, 1024);

    c.bench_function("push_512_stereo_frames", |b| {
        b.iter(|| writer.push_interleaved(black_box(&block), 2))
    });
}

criterion_group!(benches, bench_analysis_cycle, bench_encode, bench_accumulator_push);
criterion_main!(benches);
