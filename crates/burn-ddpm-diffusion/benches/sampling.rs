//! Benchmark the forward process and single reverse steps
//!
//! Run with:
//!   cargo bench -p burn-ddpm-diffusion --bench sampling

use burn::prelude::*;
use burn_ddpm_diffusion::{DiffusionConfig, DiffusionModel, NoisePredictor, SeededNoise};
use burn_ndarray::NdArray;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

type BenchBackend = NdArray<f32>;

struct Identity;

impl<B: Backend> NoisePredictor<B> for Identity {
    fn predict_noise(&self, sample: Tensor<B, 4>, _t: Tensor<B, 1, Int>) -> Tensor<B, 4> {
        sample
    }
}

fn bench_forward_and_reverse(c: &mut Criterion) {
    let device = Default::default();
    let diffusion =
        DiffusionModel::<BenchBackend>::new(DiffusionConfig::default(), &device).unwrap();

    let configs = [
        ("mnist_1x28", [1, 1, 28, 28]),
        ("mnist_64x28", [64, 1, 28, 28]),
        ("rgb_8x64", [8, 3, 64, 64]),
    ];

    let mut group = c.benchmark_group("DDPM");
    group.sample_size(20);

    for (name, shape) in configs {
        let x = Tensor::<BenchBackend, 4>::random(
            shape,
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let t = Tensor::<BenchBackend, 1, Int>::full([shape[0]], 100, &device);

        group.bench_with_input(BenchmarkId::new("q_sample", name), &shape, |b, _| {
            b.iter(|| {
                let out = diffusion
                    .q_sample(black_box(x.clone()), t.clone(), None)
                    .unwrap();
                let _ = out.into_data();
            });
        });

        let mut noise = SeededNoise::new(0);
        group.bench_with_input(BenchmarkId::new("p_sample", name), &shape, |b, _| {
            b.iter(|| {
                let out = diffusion
                    .p_sample(&Identity, black_box(x.clone()), t.clone(), 100, &mut noise)
                    .unwrap();
                let _ = out.into_data();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_forward_and_reverse);
criterion_main!(benches);
