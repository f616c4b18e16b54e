use std::fs;
use std::path::Path;

use burn::{
    module::{AutodiffModule, Module},
    prelude::*,
    record::CompactRecorder,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::{
    data::{load_mnist, pair_for_denoising, DigitItem, DigitSplits},
    error,
    inference::{denoise, predict, Predictions},
    model::{AutoencoderConfig, ClassifierConfig},
    noise::GaussianNoiseConfig,
    show::{
        class_caption, prediction_caption, save_denoising_comparison, save_digit_grid, GRID_SIZE,
    },
    training::{
        check_batch_size, train_autoencoder, train_classifier, AutoencoderTrainingConfig,
        ClassifierTrainingConfig, EpochSummary,
    },
};

#[derive(Config)]
pub struct ExperimentConfig {
    pub noise: GaussianNoiseConfig,
    pub classifier: ClassifierTrainingConfig,
    pub autoencoder: AutoencoderTrainingConfig,
    /// Number of test digits shown before and after denoising.
    #[config(default = 4)]
    pub num_visualizations: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self::new(
            GaussianNoiseConfig::new(),
            ClassifierTrainingConfig::new(
                ClassifierConfig::new(),
                ClassifierTrainingConfig::default_optimizer(),
            ),
            AutoencoderTrainingConfig::new(
                AutoencoderConfig::new(),
                AutoencoderTrainingConfig::default_optimizer(),
            ),
        )
    }
}

impl ExperimentConfig {
    /// Check the noise factor and batch sizes before any artifact is written.
    pub fn validate(&self) -> error::Result<()> {
        self.noise.init()?;
        check_batch_size("classifier", self.classifier.batch_size)?;
        check_batch_size("autoencoder", self.autoencoder.batch_size)
    }
}

/// Outcome of one experiment, written to `report.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub experiment: String,
    pub noise_factor: f64,
    pub accuracy: f64,
    pub num_correct: usize,
    pub num_incorrect: usize,
    pub num_samples: usize,
    pub num_params: usize,
    pub classifier_history: Vec<EpochSummary>,
    pub autoencoder_history: Option<Vec<EpochSummary>>,
}

/// Remove artifacts of a previous run and recreate the directory.
pub fn create_artifact_dir(artifact_dir: &Path) -> error::Result<()> {
    fs::remove_dir_all(artifact_dir).ok();
    fs::create_dir_all(artifact_dir)?;
    Ok(())
}

/// Classify (optionally noisy) MNIST digits.
pub fn run_classification<B: AutodiffBackend>(
    artifact_dir: &Path,
    config: &ExperimentConfig,
    device: &B::Device,
) -> error::Result<ExperimentReport> {
    classification_pipeline::<B>(artifact_dir, config, load_mnist(), device)
}

/// Denoise noisy MNIST digits with an autoencoder, then classify the result.
pub fn run_denoising<B: AutodiffBackend>(
    artifact_dir: &Path,
    config: &ExperimentConfig,
    device: &B::Device,
) -> error::Result<ExperimentReport> {
    denoising_pipeline::<B>(artifact_dir, config, load_mnist(), device)
}

fn save_samples(path: &Path, items: &[DigitItem]) -> error::Result<()> {
    let samples: Vec<&DigitItem> = items.iter().take(GRID_SIZE * GRID_SIZE).collect();
    let captions = samples.iter().map(|item| class_caption(item.label)).collect();
    save_digit_grid(path, &samples, captions)
}

fn add_noise(
    artifact_dir: &Path,
    config: &ExperimentConfig,
    splits: DigitSplits,
) -> error::Result<DigitSplits> {
    let noise = config.noise.init()?;
    if noise.is_identity() {
        log::info!("Noise factor is 0, keeping clean digits");
        return Ok(splits);
    }

    log::info!("Adding gaussian noise with factor {}", noise.factor());
    let noisy = DigitSplits {
        train: noise.apply(&splits.train, 0),
        test: noise.apply(&splits.test, 1),
    };
    save_samples(&artifact_dir.join("samples-noisy.png"), &noisy.train)?;

    Ok(noisy)
}

fn classification_pipeline<B: AutodiffBackend>(
    artifact_dir: &Path,
    config: &ExperimentConfig,
    splits: DigitSplits,
    device: &B::Device,
) -> error::Result<ExperimentReport> {
    config.validate()?;
    config.save(artifact_dir.join("config.json"))?;
    save_samples(&artifact_dir.join("samples.png"), &splits.train)?;

    let splits = add_noise(artifact_dir, config, splits)?;

    classify_and_report::<B>(artifact_dir, "classify", config, splits, None, device)
}

fn denoising_pipeline<B: AutodiffBackend>(
    artifact_dir: &Path,
    config: &ExperimentConfig,
    clean: DigitSplits,
    device: &B::Device,
) -> error::Result<ExperimentReport> {
    config.validate()?;
    config.save(artifact_dir.join("config.json"))?;
    save_samples(&artifact_dir.join("samples.png"), &clean.train)?;

    let noisy = add_noise(artifact_dir, config, clean.clone())?;
    let pairs = pair_for_denoising(&noisy.train, &clean.train)?;

    let outcome = train_autoencoder::<B>(&config.autoencoder, pairs, device)?;
    outcome
        .model
        .clone()
        .save_file(artifact_dir.join("autoencoder"), &CompactRecorder::new())?;

    let autoencoder = outcome.model.valid();
    let batch_size = config.autoencoder.batch_size;

    let num_visualizations = config.num_visualizations.min(noisy.test.len());
    let samples = denoise(
        &autoencoder,
        &noisy.test[..num_visualizations],
        batch_size,
        device,
    );
    for (index, denoised) in samples.iter().enumerate() {
        save_denoising_comparison(
            &artifact_dir.join(format!("denoised-{index}.png")),
            &noisy.test[index],
            &clean.test[index],
            denoised,
            clean.test[index].label,
        )?;
    }

    log::info!(
        "Denoising {} train and {} test digits",
        noisy.train.len(),
        noisy.test.len()
    );
    let denoised = DigitSplits {
        train: denoise(&autoencoder, &noisy.train, batch_size, device),
        test: denoise(&autoencoder, &noisy.test, batch_size, device),
    };
    save_samples(&artifact_dir.join("samples-denoised.png"), &denoised.train)?;

    classify_and_report::<B>(
        artifact_dir,
        "denoise",
        config,
        denoised,
        Some(outcome.history),
        device,
    )
}

fn save_predictions(
    path: &Path,
    items: &[DigitItem],
    predictions: &Predictions,
    indices: &[usize],
) -> error::Result<()> {
    let indices = &indices[..indices.len().min(GRID_SIZE * GRID_SIZE)];
    let samples: Vec<&DigitItem> = indices.iter().map(|index| &items[*index]).collect();
    let captions = indices
        .iter()
        .map(|&index| prediction_caption(predictions.predicted[index], predictions.labels[index]))
        .collect();

    save_digit_grid(path, &samples, captions)
}

fn classify_and_report<B: AutodiffBackend>(
    artifact_dir: &Path,
    experiment: &str,
    config: &ExperimentConfig,
    splits: DigitSplits,
    autoencoder_history: Option<Vec<EpochSummary>>,
    device: &B::Device,
) -> error::Result<ExperimentReport> {
    let DigitSplits { train, test } = splits;
    let outcome = train_classifier::<B>(&config.classifier, train, test.clone(), device)?;

    log::info!("{}", outcome.model);
    outcome
        .model
        .clone()
        .save_file(artifact_dir.join("classifier"), &CompactRecorder::new())?;

    let model = outcome.model.valid();
    let predictions = predict(&model, &test, config.classifier.batch_size, device);
    let correct = predictions.correct_indices();
    let incorrect = predictions.incorrect_indices();

    save_predictions(&artifact_dir.join("correct.png"), &test, &predictions, &correct)?;
    save_predictions(&artifact_dir.join("incorrect.png"), &test, &predictions, &incorrect)?;

    let report = ExperimentReport {
        experiment: experiment.to_string(),
        noise_factor: config.noise.factor,
        accuracy: predictions.accuracy(),
        num_correct: correct.len(),
        num_incorrect: incorrect.len(),
        num_samples: predictions.len(),
        num_params: model.num_params(),
        classifier_history: outcome.history,
        autoencoder_history,
    };
    log::info!("Test Accuracy : {}", report.accuracy);

    fs::write(
        artifact_dir.join("report.json"),
        serde_json::to_string_pretty(&report)?,
    )?;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::synthetic_digits;
    use crate::error::ExperimentError;
    use burn::backend::{Autodiff, NdArray};

    type TestAutodiffBackend = Autodiff<NdArray>;

    fn tiny_config(noise_factor: f64) -> ExperimentConfig {
        let mut config = ExperimentConfig::default().with_num_visualizations(2);
        config.noise = config.noise.with_factor(noise_factor);

        config.classifier.model = ClassifierConfig::new()
            .with_conv_channels(2)
            .with_hidden_size(4);
        config.classifier = config
            .classifier
            .with_num_epochs(1)
            .with_batch_size(8)
            .with_num_workers(1);

        config.autoencoder.model = AutoencoderConfig::new()
            .with_outer_channels(2)
            .with_inner_channels(2);
        config.autoencoder = config
            .autoencoder
            .with_num_epochs(1)
            .with_batch_size(8)
            .with_num_workers(1);

        config
    }

    fn tiny_splits() -> DigitSplits {
        DigitSplits {
            train: synthetic_digits(16),
            test: synthetic_digits(10),
        }
    }

    #[test]
    fn classification_writes_report_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();

        let report = classification_pipeline::<TestAutodiffBackend>(
            dir.path(),
            &tiny_config(0.5),
            tiny_splits(),
            &device,
        )
        .unwrap();

        assert_eq!(report.experiment, "classify");
        assert_eq!(report.num_samples, 10);
        assert_eq!(report.num_correct + report.num_incorrect, 10);
        assert!((0.0..=1.0).contains(&report.accuracy));
        assert!(report.num_params > 0);
        assert!(report.autoencoder_history.is_none());
        for file in [
            "config.json",
            "samples.png",
            "samples-noisy.png",
            "classifier.mpk",
            "report.json",
        ] {
            assert!(dir.path().join(file).exists(), "missing {file}");
        }

        let loaded = ExperimentConfig::load(dir.path().join("config.json")).unwrap();
        assert_eq!(loaded.noise.factor, 0.5);
    }

    #[test]
    fn clean_classification_skips_noisy_samples() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();

        classification_pipeline::<TestAutodiffBackend>(
            dir.path(),
            &tiny_config(0.0),
            tiny_splits(),
            &device,
        )
        .unwrap();

        assert!(!dir.path().join("samples-noisy.png").exists());
    }

    #[test]
    fn denoising_trains_both_models() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();

        let report = denoising_pipeline::<TestAutodiffBackend>(
            dir.path(),
            &tiny_config(0.5),
            tiny_splits(),
            &device,
        )
        .unwrap();

        assert_eq!(report.experiment, "denoise");
        assert_eq!(report.autoencoder_history.as_ref().map(Vec::len), Some(1));
        for file in [
            "autoencoder.mpk",
            "classifier.mpk",
            "denoised-0.png",
            "denoised-1.png",
            "samples-denoised.png",
        ] {
            assert!(dir.path().join(file).exists(), "missing {file}");
        }
        assert!(!dir.path().join("denoised-2.png").exists());
    }

    #[test]
    fn zero_batch_size_fails_validation() {
        let mut config = tiny_config(0.5);
        assert!(config.validate().is_ok());

        config.autoencoder.batch_size = 0;

        assert!(matches!(
            config.validate(),
            Err(ExperimentError::InvalidConfig(_))
        ));
    }

    #[test]
    fn invalid_noise_is_reported_before_training() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();

        let result = classification_pipeline::<TestAutodiffBackend>(
            dir.path(),
            &tiny_config(-1.0),
            tiny_splits(),
            &device,
        );

        assert!(result.is_err());
        assert!(!dir.path().join("report.json").exists());
    }
}
