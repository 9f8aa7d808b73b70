//! burn-ddpm CLI
//!
//! Train a denoising diffusion model on a folder of images, sample new
//! images from trained weights, and inspect the forward noising process.

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use burn::data::dataloader::DataLoaderBuilder;
use burn::data::dataset::Dataset;
use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::record::CompactRecorder;
use clap::{Args, Parser, Subcommand};
use image::imageops::FilterType;
use indicatif::{ProgressBar, ProgressStyle};

use burn_ddpm_data::{image_grid, image_to_values, tensor_to_images, ImageBatcher, ImageFolderDataset};
use burn_ddpm_diffusion::{
    BackendNoise, DiffusionConfig, DiffusionModel, LossType, NoiseSource, SampleConfig,
    SeededNoise, TrainEvent, Trainer,
};
use burn_ddpm_unet::{Denoiser, DenoiserConfig};

mod backend;
mod config;

use backend::{backend_name, default_device, InferenceBackend, TrainBackend};
use config::{ModelCard, RunConfig};

#[derive(Parser)]
#[command(name = "burn-ddpm")]
#[command(about = "Denoising diffusion probabilistic models in pure Rust")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a denoiser on a directory of images
    Train(TrainArgs),

    /// Generate images from trained weights
    Sample(SampleArgs),

    /// Apply the forward process to an image at one timestep
    Noise(NoiseArgs),

    /// Show backend and default configuration
    Info,
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Directory of training images (png, jpg, jpeg, bmp)
    #[arg(short, long)]
    data: PathBuf,

    /// Output weights path (the recorder appends its extension)
    #[arg(short, long, default_value = "model")]
    output: PathBuf,

    /// JSON run configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,

    /// l1, l2 or huber
    #[arg(long)]
    loss_type: Option<String>,

    /// Diffusion steps (T)
    #[arg(long)]
    timesteps: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Images are resized to this square size
    #[arg(long)]
    image_size: Option<usize>,

    /// 1 = grayscale, 3 = RGB
    #[arg(long)]
    channels: Option<usize>,

    /// Adam learning rate
    #[arg(long)]
    lr: Option<f64>,

    /// Seed for shuffling, timesteps and noise
    #[arg(long)]
    seed: Option<u64>,

    /// Data loader worker threads
    #[arg(long)]
    workers: Option<usize>,
}

impl TrainArgs {
    fn apply(&self, run: &mut RunConfig) -> Result<()> {
        if let Some(epochs) = self.epochs {
            run.training.epochs = epochs;
        }
        if let Some(loss_type) = &self.loss_type {
            run.training.loss_type = LossType::from_str(loss_type)?;
        }
        if let Some(timesteps) = self.timesteps {
            run.diffusion.timesteps = timesteps;
        }
        if let Some(batch_size) = self.batch_size {
            run.data.batch_size = batch_size;
        }
        if let Some(image_size) = self.image_size {
            run.data.image_size = image_size;
        }
        if let Some(channels) = self.channels {
            run.denoiser.channels = channels;
        }
        if let Some(lr) = self.lr {
            run.training.learning_rate = lr;
        }
        if let Some(seed) = self.seed {
            run.training.seed = Some(seed);
        }
        if let Some(workers) = self.workers {
            run.data.num_workers = workers;
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
struct SampleArgs {
    /// Trained weights path, as passed to `train --output`
    #[arg(short, long)]
    weights: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = "samples")]
    output: PathBuf,

    /// Override the stored number of diffusion steps
    #[arg(long)]
    timesteps: Option<usize>,

    /// Override the stored image size
    #[arg(long)]
    image_size: Option<usize>,

    /// Override the stored channel count
    #[arg(long)]
    channels: Option<usize>,

    /// Number of images generated in parallel
    #[arg(long, default_value = "64")]
    batch_size: usize,

    /// Random seed (optional)
    #[arg(long)]
    seed: Option<u64>,

    /// Also save a grid every tenth of the reverse process
    #[arg(long)]
    save_trajectory: bool,

    /// Images per row in grids
    #[arg(long, default_value = "8")]
    columns: usize,
}

#[derive(Args, Debug)]
struct NoiseArgs {
    /// Input image
    #[arg(short, long)]
    input: PathBuf,

    /// Timestep to noise to, in [0, timesteps)
    #[arg(short, long)]
    timestep: usize,

    /// Output image path
    #[arg(short, long, default_value = "noisy.png")]
    output: PathBuf,

    /// Diffusion steps (T)
    #[arg(long, default_value = "200")]
    timesteps: usize,

    /// The input is resized to this square size
    #[arg(long, default_value = "128")]
    image_size: usize,

    /// Random seed (optional)
    #[arg(long)]
    seed: Option<u64>,
}

fn progress_bar(len: u64, template: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(template)?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

// ============================================================================
// train
// ============================================================================

fn run_train(args: TrainArgs) -> Result<()> {
    let mut run = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    args.apply(&mut run)?;

    let image_size = run.data.image_size;
    if !run.denoiser.supports_size(image_size, image_size) {
        bail!(
            "image size {} must be a positive multiple of {}",
            image_size,
            1usize << run.denoiser.dim_mults.len().saturating_sub(1)
        );
    }
    if run.data.batch_size == 0 {
        bail!("batch size must be positive");
    }

    let dataset = ImageFolderDataset::new(&args.data, image_size as u32, run.denoiser.channels)
        .with_context(|| format!("Failed to load images from {}", args.data.display()))?;
    let batches_per_epoch = dataset.len().div_ceil(run.data.batch_size);
    println!(
        "Loaded {} images from {} ({} batches per epoch)",
        dataset.len(),
        args.data.display(),
        batches_per_epoch
    );

    // Pin the seed so the loader and trainer share it
    let seed = run.training.seed.unwrap_or_else(rand::random);
    run.training.seed = Some(seed);

    let loader = DataLoaderBuilder::<TrainBackend, _, _>::new(ImageBatcher)
        .batch_size(run.data.batch_size)
        .shuffle(seed)
        .num_workers(run.data.num_workers.max(1))
        .build(dataset);

    let device = default_device();
    let diffusion = DiffusionModel::<TrainBackend>::new(run.diffusion.clone(), &device)?;
    let model: Denoiser<TrainBackend> = run.denoiser.init(&device);
    println!(
        "Training {} parameters for {} epochs on {} (seed {})",
        model.num_params(),
        run.training.epochs,
        backend_name(),
        seed
    );

    let pb = progress_bar(
        run.training.epochs as u64,
        "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} epochs {msg}",
    )?;

    let mut trainer = Trainer::new(diffusion, run.training.clone());
    let model = trainer.train(model, &loader, |event| match event {
        TrainEvent::Step(step) => {
            pb.println(format!(
                "epoch {} step {}: loss {:.6}",
                step.epoch + 1,
                step.step,
                step.loss
            ));
            pb.set_message(format!("loss {:.4}", step.loss));
        }
        TrainEvent::EpochEnd(summary) => {
            pb.inc(1);
            if let Some(mean) = summary.mean_loss {
                pb.set_message(format!("mean loss {:.4}", mean));
            }
        }
    })?;
    pb.finish_and_clear();

    model
        .valid()
        .save_file(args.output.clone(), &CompactRecorder::new())
        .with_context(|| format!("Failed to save weights to {}", args.output.display()))?;
    ModelCard {
        diffusion: run.diffusion,
        denoiser: run.denoiser,
        image_size,
    }
    .save(&args.output)?;

    println!("\nSaved to: {}", args.output.display());
    Ok(())
}

// ============================================================================
// sample
// ============================================================================

fn sample_with<N: NoiseSource<InferenceBackend>>(
    diffusion: &DiffusionModel<InferenceBackend>,
    model: &Denoiser<InferenceBackend>,
    config: &SampleConfig,
    noise: &mut N,
    pb: &ProgressBar,
) -> Result<Vec<Tensor<InferenceBackend, 4>>> {
    let imgs = diffusion.p_sample_loop(model, config.shape(), noise, |info| {
        pb.set_position((info.step + 1) as u64);
        pb.set_message(format!("t = {}", info.timestep));
    })?;
    Ok(imgs)
}

fn run_sample(args: SampleArgs) -> Result<()> {
    let (mut diffusion_config, mut denoiser_config, mut image_size) =
        match ModelCard::load(&args.weights)? {
            Some(card) => (card.diffusion, card.denoiser, card.image_size),
            None => {
                eprintln!(
                    "[warning] {} not found, using default configuration",
                    ModelCard::path_for(&args.weights).display()
                );
                (
                    DiffusionConfig::default(),
                    DenoiserConfig::default(),
                    SampleConfig::default().image_size,
                )
            }
        };

    if let Some(timesteps) = args.timesteps {
        diffusion_config.timesteps = timesteps;
    }
    if let Some(size) = args.image_size {
        image_size = size;
    }
    if let Some(channels) = args.channels {
        denoiser_config.channels = channels;
    }
    if !denoiser_config.supports_size(image_size, image_size) {
        bail!("image size {} is not supported by this denoiser", image_size);
    }

    let device = default_device();
    let model = denoiser_config
        .init::<InferenceBackend>(&device)
        .load_file(args.weights.clone(), &CompactRecorder::new(), &device)
        .with_context(|| format!("Failed to load weights from {}", args.weights.display()))?;
    let diffusion = DiffusionModel::<InferenceBackend>::new(diffusion_config, &device)?;

    let config = SampleConfig {
        image_size,
        batch_size: args.batch_size,
        channels: denoiser_config.channels,
    };

    let pb = progress_bar(
        diffusion.num_timesteps() as u64,
        "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    )?;
    let imgs = match args.seed {
        Some(seed) => sample_with(&diffusion, &model, &config, &mut SeededNoise::new(seed), &pb)?,
        None => sample_with(&diffusion, &model, &config, &mut BackendNoise, &pb)?,
    };
    pb.finish_and_clear();

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    let last = imgs.last().context("Sampling produced no steps")?;
    let images = tensor_to_images(last.clone()).context("Failed to convert samples to images")?;
    for (i, img) in images.iter().enumerate() {
        img.save(args.output.join(format!("sample_{i:03}.png")))?;
    }
    image_grid(&images, args.columns).save(args.output.join("grid.png"))?;

    if args.save_trajectory {
        let dir = args.output.join("trajectory");
        fs::create_dir_all(&dir)?;
        let stride = (imgs.len() / 10).max(1);
        for (step, x) in imgs.iter().enumerate() {
            if (step + 1) % stride == 0 || step + 1 == imgs.len() {
                let images = tensor_to_images(x.clone())
                    .with_context(|| format!("Failed to convert step {}", step + 1))?;
                let grid = image_grid(&images, args.columns);
                grid.save(dir.join(format!("step_{:04}.png", step + 1)))?;
            }
        }
    }

    println!("Saved {} samples to {}", images.len(), args.output.display());
    Ok(())
}

// ============================================================================
// noise
// ============================================================================

fn run_noise(args: NoiseArgs) -> Result<()> {
    let device = default_device();
    let size = args.image_size;
    if size == 0 {
        bail!("image size must be positive");
    }

    let image = image::open(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?
        .resize_exact(size as u32, size as u32, FilterType::CatmullRom);
    let shape = [1, 3, size, size];
    let x = Tensor::<InferenceBackend, 4>::from_data(
        TensorData::new(image_to_values(&image, 3), shape),
        &device,
    );

    let diffusion = DiffusionModel::<InferenceBackend>::new(
        DiffusionConfig::with_timesteps(args.timesteps),
        &device,
    )?;

    let noisy = match args.seed {
        Some(seed) => {
            let noise = NoiseSource::<InferenceBackend>::standard_normal(
                &mut SeededNoise::new(seed),
                shape,
                &device,
            );
            let t = diffusion.timestep_batch(1, args.timestep)?;
            diffusion.q_sample(x, t, Some(noise))?
        }
        None => diffusion.noisy_image(x, args.timestep)?,
    };

    let images = tensor_to_images(noisy).context("Failed to convert noised tensor")?;
    let img = images.first().context("Empty output batch")?;
    img.save(&args.output)
        .with_context(|| format!("Failed to save {}", args.output.display()))?;

    println!(
        "Noised {} to t = {} of {}: {}",
        args.input.display(),
        args.timestep,
        args.timesteps,
        args.output.display()
    );
    Ok(())
}

// ============================================================================
// info
// ============================================================================

fn run_info() -> Result<()> {
    let device = default_device();
    let diffusion = DiffusionConfig::default();
    let schedule = DiffusionModel::<InferenceBackend>::new(diffusion.clone(), &device)?;
    let coefficients = schedule.schedule().coefficients();
    let last = coefficients.len() - 1;
    let snr = coefficients.snr();

    println!("burn-ddpm {}", env!("CARGO_PKG_VERSION"));
    println!("Backend: {}", backend_name());
    println!();
    println!("Schedule (linear):");
    println!("  timesteps:        {}", diffusion.timesteps);
    println!("  beta:             {} .. {}", diffusion.beta_start, diffusion.beta_end);
    println!("  alpha_bar[T-1]:   {:.6}", coefficients.alphas_cumprod[last]);
    println!("  SNR[0]:           {:.2}", snr[0]);
    println!("  SNR[T-1]:         {:.6}", snr[last]);

    let denoiser = DenoiserConfig::default();
    let model: Denoiser<InferenceBackend> = denoiser.init(&device);
    println!();
    println!("Denoiser:");
    println!("  channels:         {}", denoiser.channels);
    println!("  level widths:     {:?}", denoiser.level_dims());
    println!("  parameters:       {}", model.num_params());

    let sample = SampleConfig::default();
    println!();
    println!("Sampling: {} images of {}x{}", sample.batch_size, sample.image_size, sample.image_size);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Train(args) => run_train(args),
        Commands::Sample(args) => run_sample(args),
        Commands::Noise(args) => run_noise(args),
        Commands::Info => run_info(),
    }
}
