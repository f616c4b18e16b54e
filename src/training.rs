use std::sync::Arc;

use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::{transform::PartialDataset, Dataset, InMemDataset},
    },
    module::AutodiffModule,
    optim::{momentum::MomentumConfig, AdamConfig, GradientsParams, Optimizer, SgdConfig},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::{
    data::{DenoisingBatch, DenoisingBatcher, DenoisingItem, DigitBatch, DigitBatcher, DigitItem},
    error::{self, ExperimentError},
    model::{Autoencoder, AutoencoderConfig, Classifier, ClassifierConfig},
};

#[derive(Config)]
pub struct ClassifierTrainingConfig {
    pub model: ClassifierConfig,
    pub optimizer: SgdConfig,
    #[config(default = 4)]
    pub num_epochs: usize,
    #[config(default = 128)]
    pub batch_size: usize,
    #[config(default = 4)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 0.01)]
    pub learning_rate: f64,
}

impl ClassifierTrainingConfig {
    /// SGD with classical momentum 0.9 and no dampening.
    pub fn default_optimizer() -> SgdConfig {
        SgdConfig::new().with_momentum(Some(
            MomentumConfig::new()
                .with_momentum(0.9)
                .with_dampening(0.0),
        ))
    }
}

#[derive(Config)]
pub struct AutoencoderTrainingConfig {
    pub model: AutoencoderConfig,
    pub optimizer: AdamConfig,
    #[config(default = 4)]
    pub num_epochs: usize,
    #[config(default = 150)]
    pub batch_size: usize,
    #[config(default = 4)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    /// Fraction of the pairs, taken from the end, held out for validation.
    #[config(default = 0.2)]
    pub validation_split: f64,
}

impl AutoencoderTrainingConfig {
    pub fn default_optimizer() -> AdamConfig {
        AdamConfig::new().with_epsilon(1e-7)
    }
}

/// Metrics of one training epoch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: Option<f64>,
    pub valid_loss: Option<f64>,
    pub valid_accuracy: Option<f64>,
}

impl core::fmt::Display for EpochSummary {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "epoch {} | train loss {:.4}", self.epoch, self.train_loss)?;
        if let Some(accuracy) = self.train_accuracy {
            write!(f, " acc {:.4}", accuracy)?;
        }
        if let Some(loss) = self.valid_loss {
            write!(f, " | valid loss {:.4}", loss)?;
        }
        if let Some(accuracy) = self.valid_accuracy {
            write!(f, " acc {:.4}", accuracy)?;
        }
        Ok(())
    }
}

/// A trained model with its per-epoch history.
pub struct TrainingOutcome<M> {
    pub model: M,
    pub history: Vec<EpochSummary>,
}

#[derive(Default)]
struct Accumulator {
    loss_sum: f64,
    num_correct: usize,
    num_items: usize,
}

impl Accumulator {
    fn update(&mut self, loss: f64, num_correct: usize, num_items: usize) {
        self.loss_sum += loss * num_items as f64;
        self.num_correct += num_correct;
        self.num_items += num_items;
    }

    fn loss(&self) -> Option<f64> {
        (self.num_items > 0).then(|| self.loss_sum / self.num_items as f64)
    }

    fn accuracy(&self) -> Option<f64> {
        (self.num_items > 0).then(|| self.num_correct as f64 / self.num_items as f64)
    }
}

fn scalar<B: Backend>(loss: Tensor<B, 1>) -> f64 {
    loss.into_scalar().elem::<f64>()
}

/// Train the classifier with SGD, evaluating on `valid` after every epoch.
pub fn train_classifier<B: AutodiffBackend>(
    config: &ClassifierTrainingConfig,
    train: Vec<DigitItem>,
    valid: Vec<DigitItem>,
    device: &B::Device,
) -> error::Result<TrainingOutcome<Classifier<B>>> {
    check_batch_size("classifier", config.batch_size)?;
    if train.is_empty() {
        return Err(ExperimentError::EmptyDataset("classifier train"));
    }

    B::seed(config.seed);

    let mut model = config.model.init::<B>(device);
    let mut optim = config.optimizer.init();

    let dataloader_train: Arc<dyn DataLoader<B, DigitBatch<B>>> =
        DataLoaderBuilder::new(DigitBatcher)
            .batch_size(config.batch_size)
            .shuffle(config.seed)
            .num_workers(config.num_workers)
            .set_device(device.clone())
            .build(InMemDataset::new(train));

    let dataloader_valid: Arc<dyn DataLoader<B::InnerBackend, DigitBatch<B::InnerBackend>>> =
        DataLoaderBuilder::new(DigitBatcher)
            .batch_size(config.batch_size)
            .num_workers(config.num_workers)
            .set_device(device.clone())
            .build(InMemDataset::new(valid));

    let mut history = Vec::with_capacity(config.num_epochs);

    for epoch in 1..=config.num_epochs {
        let mut train_metrics = Accumulator::default();

        for batch in dataloader_train.iter() {
            let num_items = batch.targets.dims()[0];
            let output = model.forward_classification(batch.images, batch.targets);
            train_metrics.update(scalar(output.loss.clone()), output.num_correct(), num_items);

            // Gradients linked to each parameter of the model.
            let grads = GradientsParams::from_grads(output.loss.backward(), &model);
            model = optim.step(config.learning_rate, model, grads);
        }

        let model_valid = model.valid();
        let mut valid_metrics = Accumulator::default();

        for batch in dataloader_valid.iter() {
            let num_items = batch.targets.dims()[0];
            let output = model_valid.forward_classification(batch.images, batch.targets);
            valid_metrics.update(scalar(output.loss.clone()), output.num_correct(), num_items);
        }

        let summary = EpochSummary {
            epoch,
            train_loss: train_metrics.loss().unwrap_or_default(),
            train_accuracy: train_metrics.accuracy(),
            valid_loss: valid_metrics.loss(),
            valid_accuracy: valid_metrics.accuracy(),
        };
        log::info!("[classifier] {summary}");
        history.push(summary);
    }

    Ok(TrainingOutcome { model, history })
}

/// Batch sizes of zero are rejected rather than silently treated as one.
pub(crate) fn check_batch_size(name: &str, batch_size: usize) -> error::Result<()> {
    if batch_size == 0 {
        return Err(ExperimentError::InvalidConfig(format!(
            "{name} batch size must be positive"
        )));
    }

    Ok(())
}

/// Index at which the pairs are split into train and validation parts.
fn validation_boundary(num_items: usize, validation_split: f64) -> error::Result<usize> {
    if !(0.0..1.0).contains(&validation_split) {
        return Err(ExperimentError::InvalidConfig(format!(
            "validation split must be in [0, 1), got {validation_split}"
        )));
    }

    Ok((num_items as f64 * (1.0 - validation_split)) as usize)
}

/// Train the autoencoder to map noisy images to clean ones.
///
/// The last `validation_split` fraction of `pairs` is held out unshuffled.
/// Every filter is projected back onto the max-norm ball after each step.
pub fn train_autoencoder<B: AutodiffBackend>(
    config: &AutoencoderTrainingConfig,
    pairs: Vec<DenoisingItem>,
    device: &B::Device,
) -> error::Result<TrainingOutcome<Autoencoder<B>>> {
    check_batch_size("autoencoder", config.batch_size)?;
    let num_items = pairs.len();
    let boundary = validation_boundary(num_items, config.validation_split)?;
    if boundary == 0 {
        return Err(ExperimentError::EmptyDataset("autoencoder train"));
    }

    B::seed(config.seed);

    let mut model = config.model.init::<B>(device);
    let mut optim = config.optimizer.init();

    let dataset = Arc::new(InMemDataset::new(pairs));
    let dataset_train = PartialDataset::new(dataset.clone(), 0, boundary);
    let dataset_valid = PartialDataset::new(dataset, boundary, num_items);
    log::info!(
        "[autoencoder] {} train pairs, {} validation pairs",
        dataset_train.len(),
        dataset_valid.len()
    );

    let dataloader_train: Arc<dyn DataLoader<B, DenoisingBatch<B>>> =
        DataLoaderBuilder::new(DenoisingBatcher)
            .batch_size(config.batch_size)
            .shuffle(config.seed)
            .num_workers(config.num_workers)
            .set_device(device.clone())
            .build(dataset_train);

    let dataloader_valid: Arc<
        dyn DataLoader<B::InnerBackend, DenoisingBatch<B::InnerBackend>>,
    > = DataLoaderBuilder::new(DenoisingBatcher)
        .batch_size(config.batch_size)
        .num_workers(config.num_workers)
        .set_device(device.clone())
        .build(dataset_valid);

    let mut history = Vec::with_capacity(config.num_epochs);

    for epoch in 1..=config.num_epochs {
        let mut train_metrics = Accumulator::default();

        for batch in dataloader_train.iter() {
            let num_items = batch.noisy.dims()[0];
            let output = model.forward_reconstruction(batch.noisy, batch.clean);
            train_metrics.update(scalar(output.loss.clone()), 0, num_items);

            let grads = GradientsParams::from_grads(output.loss.backward(), &model);
            model = optim.step(config.learning_rate, model, grads);
            model = model.apply_max_norm(config.model.max_norm);
        }

        let model_valid = model.valid();
        let mut valid_metrics = Accumulator::default();

        for batch in dataloader_valid.iter() {
            let num_items = batch.noisy.dims()[0];
            let output = model_valid.forward_reconstruction(batch.noisy, batch.clean);
            valid_metrics.update(scalar(output.loss), 0, num_items);
        }

        let summary = EpochSummary {
            epoch,
            train_loss: train_metrics.loss().unwrap_or_default(),
            train_accuracy: None,
            valid_loss: valid_metrics.loss(),
            valid_accuracy: None,
        };
        log::info!("[autoencoder] {summary}");
        history.push(summary);
    }

    Ok(TrainingOutcome { model, history })
}
