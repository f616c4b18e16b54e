use std::path::{Path, PathBuf};

use burn::config::Config;
use clap::{Args, Parser, Subcommand};

use crate::{error::Result, experiment::ExperimentConfig};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a classifier on MNIST, with noise when the factor is positive.
    Classify {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Train a denoising autoencoder, then classify the denoised digits.
    Denoise {
        #[command(flatten)]
        common: CommonArgs,

        /// Number of autoencoder epochs.
        #[arg(long)]
        autoencoder_epochs: Option<usize>,

        /// Number of test digits saved before and after denoising.
        #[arg(long)]
        num_visualizations: Option<usize>,
    },
}

#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Directory receiving logs, images, models and the report.
    #[arg(long, default_value = "/tmp/mnist-denoise")]
    pub artifact_dir: PathBuf,

    /// Experiment configuration to start from, as saved in `config.json`.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Standard deviation multiplier of the gaussian noise.
    #[arg(long)]
    pub noise_factor: Option<f64>,

    /// Number of classifier epochs.
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Classifier batch size.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Seed shared by the noise, the backend and the data loaders.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Data loader worker threads.
    #[arg(long)]
    pub num_workers: Option<usize>,
}

impl CommonArgs {
    /// Load the base configuration and apply the flags given on the command line.
    pub fn experiment_config(&self) -> Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::load(path)?,
            None => ExperimentConfig::default(),
        };

        if let Some(factor) = self.noise_factor {
            config.noise.factor = factor;
        }
        if let Some(epochs) = self.epochs {
            config.classifier.num_epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.classifier.batch_size = batch_size;
        }
        if let Some(seed) = self.seed {
            config.noise.seed = seed;
            config.classifier.seed = seed;
            config.autoencoder.seed = seed;
        }
        if let Some(num_workers) = self.num_workers {
            config.classifier.num_workers = num_workers;
            config.autoencoder.num_workers = num_workers;
        }

        Ok(config)
    }
}

impl Commands {
    pub fn artifact_dir(&self) -> &Path {
        match self {
            Commands::Classify { common } | Commands::Denoise { common, .. } => {
                &common.artifact_dir
            }
        }
    }

    /// The experiment configuration for this command, validated.
    pub fn experiment_config(&self) -> Result<ExperimentConfig> {
        let config = match self {
            Commands::Classify { common } => common.experiment_config()?,
            Commands::Denoise {
                common,
                autoencoder_epochs,
                num_visualizations,
            } => {
                let mut config = common.experiment_config()?;
                if let Some(epochs) = autoencoder_epochs {
                    config.autoencoder.num_epochs = *epochs;
                }
                if let Some(count) = num_visualizations {
                    config.num_visualizations = *count;
                }
                config
            }
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExperimentError;

    #[test]
    fn defaults_match_the_reference_experiment() {
        let cli = Cli::parse_from(["mnist-denoise", "classify"]);
        let config = cli.command.experiment_config().unwrap();

        assert_eq!(config.noise.factor, 0.5);
        assert_eq!(config.classifier.num_epochs, 4);
        assert_eq!(config.classifier.batch_size, 128);
        assert_eq!(config.autoencoder.batch_size, 150);
        assert_eq!(config.autoencoder.validation_split, 0.2);
        assert_eq!(config.num_visualizations, 4);
    }

    #[test]
    fn flags_override_the_config() {
        let cli = Cli::parse_from([
            "mnist-denoise",
            "denoise",
            "--artifact-dir",
            "/tmp/run",
            "--noise-factor",
            "0.25",
            "--epochs",
            "2",
            "--seed",
            "7",
            "--autoencoder-epochs",
            "3",
            "--num-visualizations",
            "1",
        ]);
        let config = cli.command.experiment_config().unwrap();

        assert_eq!(cli.command.artifact_dir(), Path::new("/tmp/run"));
        assert_eq!(config.noise.factor, 0.25);
        assert_eq!(config.noise.seed, 7);
        assert_eq!(config.classifier.num_epochs, 2);
        assert_eq!(config.classifier.seed, 7);
        assert_eq!(config.autoencoder.num_epochs, 3);
        assert_eq!(config.num_visualizations, 1);
    }

    #[test]
    fn config_file_is_the_base_for_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        ExperimentConfig::default()
            .with_num_visualizations(9)
            .save(&path)
            .unwrap();

        let cli = Cli::parse_from([
            "mnist-denoise",
            "denoise",
            "--config",
            path.to_str().unwrap(),
            "--noise-factor",
            "0.1",
        ]);
        let config = cli.command.experiment_config().unwrap();

        assert_eq!(config.num_visualizations, 9);
        assert_eq!(config.noise.factor, 0.1);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let cli = Cli::parse_from(["mnist-denoise", "classify", "--batch-size", "0"]);

        assert!(matches!(
            cli.command.experiment_config(),
            Err(ExperimentError::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let cli = Cli::parse_from([
            "mnist-denoise",
            "classify",
            "--config",
            "/nonexistent/config.json",
        ]);

        assert!(cli.command.experiment_config().is_err());
    }
}
