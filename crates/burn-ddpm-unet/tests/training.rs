//! The denoiser trains and samples through the diffusion core

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn_autodiff::Autodiff;
use burn_ddpm_diffusion::{
    DiffusionConfig, DiffusionModel, LossType, SampleConfig, SeededNoise, TrainEvent, Trainer,
    TrainingConfig,
};
use burn_ddpm_unet::DenoiserConfig;
use burn_ndarray::NdArray;

type TrainBackend = Autodiff<NdArray<f32>>;

#[test]
fn test_train_then_sample() {
    let device = Default::default();
    let config = DenoiserConfig {
        channels: 1,
        dim: 8,
        dim_mults: vec![1, 2],
        groups: 4,
    };
    let model = config.init::<TrainBackend>(&device);
    let before = model.conv_out.weight.val().into_data();

    let batches: Vec<Tensor<TrainBackend, 4>> = (0..2)
        .map(|_| {
            Tensor::random(
                [2, 1, 8, 8],
                burn::tensor::Distribution::Uniform(-1.0, 1.0),
                &device,
            )
        })
        .collect();

    let diffusion =
        DiffusionModel::<TrainBackend>::new(DiffusionConfig::with_timesteps(20), &device).unwrap();
    let mut trainer = Trainer::new(
        diffusion.clone(),
        TrainingConfig {
            epochs: 2,
            loss_type: LossType::Huber,
            learning_rate: 1e-3,
            log_every: 1,
            seed: Some(0),
        },
    );

    let mut losses = Vec::new();
    let model = trainer
        .train(model, &batches, |event| {
            if let TrainEvent::Step(step) = event {
                losses.push(step.loss);
            }
        })
        .unwrap();

    assert_eq!(losses.len(), 4);
    assert!(losses.iter().all(|l| l.is_finite()));
    assert_ne!(model.conv_out.weight.val().into_data(), before);

    let sample_config = SampleConfig {
        image_size: 8,
        batch_size: 2,
        channels: 1,
    };
    let imgs = diffusion
        .valid()
        .sample(&model.valid(), &sample_config, &mut SeededNoise::new(1))
        .unwrap();

    assert_eq!(imgs.len(), 20);
    assert_eq!(imgs[19].dims(), [2, 1, 8, 8]);
}
