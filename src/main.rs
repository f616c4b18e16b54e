#![recursion_limit = "256"]

use std::process::ExitCode;

use burn::tensor::backend::AutodiffBackend;
use clap::Parser;
use mnist_denoise::{
    cli::{Cli, Commands},
    experiment::{create_artifact_dir, run_classification, run_denoising},
    logging::install_logger,
    Result,
};

#[cfg(any(
    feature = "ndarray",
    feature = "ndarray-blas-netlib",
    feature = "ndarray-blas-openblas",
    feature = "ndarray-blas-accelerate",
))]
mod ndarray {
    use burn::backend::{
        ndarray::{NdArray, NdArrayDevice},
        Autodiff,
    };
    use mnist_denoise::{cli::Commands, Result};

    pub fn run(command: &Commands) -> Result<()> {
        super::run::<Autodiff<NdArray>>(command, NdArrayDevice::Cpu)
    }
}

#[cfg(feature = "tch-gpu")]
mod tch_gpu {
    use burn::backend::{
        libtorch::{LibTorch, LibTorchDevice},
        Autodiff,
    };
    use mnist_denoise::{cli::Commands, Result};

    pub fn run(command: &Commands) -> Result<()> {
        #[cfg(not(target_os = "macos"))]
        let device = LibTorchDevice::Cuda(0);
        #[cfg(target_os = "macos")]
        let device = LibTorchDevice::Mps;

        super::run::<Autodiff<LibTorch>>(command, device)
    }
}

#[cfg(feature = "tch-cpu")]
mod tch_cpu {
    use burn::backend::{
        libtorch::{LibTorch, LibTorchDevice},
        Autodiff,
    };
    use mnist_denoise::{cli::Commands, Result};

    pub fn run(command: &Commands) -> Result<()> {
        super::run::<Autodiff<LibTorch>>(command, LibTorchDevice::Cpu)
    }
}

#[cfg(feature = "wgpu")]
mod wgpu {
    use burn::backend::{
        wgpu::{Wgpu, WgpuDevice},
        Autodiff,
    };
    use mnist_denoise::{cli::Commands, Result};

    pub fn run(command: &Commands) -> Result<()> {
        super::run::<Autodiff<Wgpu>>(command, WgpuDevice::default())
    }
}

fn run<B: AutodiffBackend>(command: &Commands, device: B::Device) -> Result<()> {
    let config = command.experiment_config()?;
    let artifact_dir = command.artifact_dir();

    create_artifact_dir(artifact_dir)?;
    install_logger(artifact_dir);

    let report = match command {
        Commands::Classify { .. } => run_classification::<B>(artifact_dir, &config, &device)?,
        Commands::Denoise { .. } => run_denoising::<B>(artifact_dir, &config, &device)?,
    };
    log::info!(
        "{}: {}/{} correct, accuracy {:.4}",
        report.experiment,
        report.num_correct,
        report.num_samples,
        report.accuracy
    );

    Ok(())
}

#[allow(unreachable_code)]
fn select_and_run(command: &Commands) -> Result<()> {
    #[cfg(any(
        feature = "ndarray",
        feature = "ndarray-blas-netlib",
        feature = "ndarray-blas-openblas",
        feature = "ndarray-blas-accelerate",
    ))]
    return ndarray::run(command);

    #[cfg(feature = "tch-gpu")]
    return tch_gpu::run(command);

    #[cfg(feature = "tch-cpu")]
    return tch_cpu::run(command);

    #[cfg(feature = "wgpu")]
    return wgpu::run(command);

    unreachable!("At least one backend will be selected.")
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match select_and_run(&cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
