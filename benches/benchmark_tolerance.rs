use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dlk_harness::validation::{npy, percent_mismatched, Tolerance};
use ndarray::{ArrayD, IxDyn};

fn tensors(len: usize) -> (Vec<f32>, Vec<f32>) {
    let mut rng = fastrand::Rng::with_seed(len as u64);
    let golden: Vec<f32> = (0..len).map(|_| rng.f32() * 2.0 - 1.0).collect();
    // Roughly one element in a thousand is perturbed past the tolerance.
    let produced = golden
        .iter()
        .map(|&v| if rng.u32(..1000) == 0 { v + 0.01 } else { v })
        .collect();
    (produced, golden)
}

pub fn verdict_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Tolerance_Verdict");
    let tolerance = Tolerance::default();

    // Output sizes of the classification head up to a full segmentation map.
    for power in [10, 14, 18, 20] {
        let len = 1usize << power;
        let (produced, golden) = tensors(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| percent_mismatched(black_box(&produced), black_box(&golden), &tolerance))
        });
    }
    group.finish();
}

pub fn npy_decode_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Npy_Decode");
    for side in [32, 128, 512] {
        let array = ArrayD::<f32>::zeros(IxDyn(&[side, side, 3]));
        let bytes = npy::encode(&array);
        group.bench_with_input(BenchmarkId::from_parameter(side), &side, |b, _| {
            b.iter(|| npy::decode(black_box(&bytes)))
        });
    }
    group.finish();
}

criterion_group!(tolerance_benches, verdict_benchmark, npy_decode_benchmark);
criterion_main!(tolerance_benches);
