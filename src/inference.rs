use burn::{data::dataloader::batcher::Batcher, prelude::*};
use serde::{Deserialize, Serialize};

use crate::{
    data::{images_to_tensor, tensor_to_images, DigitBatch, DigitBatcher, DigitItem},
    model::{Autoencoder, Classifier},
};

/// Predicted classes aligned with the true labels.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Predictions {
    pub predicted: Vec<u8>,
    pub labels: Vec<u8>,
}

impl Predictions {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn correct_indices(&self) -> Vec<usize> {
        self.indices_where(|predicted, label| predicted == label)
    }

    pub fn incorrect_indices(&self) -> Vec<usize> {
        self.indices_where(|predicted, label| predicted != label)
    }

    /// Fraction of correct predictions, `0.0` when there are none.
    pub fn accuracy(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }

        self.correct_indices().len() as f64 / self.len() as f64
    }

    fn indices_where(&self, predicate: impl Fn(u8, u8) -> bool) -> Vec<usize> {
        self.predicted
            .iter()
            .zip(&self.labels)
            .enumerate()
            .filter(|(_, (predicted, label))| predicate(**predicted, **label))
            .map(|(index, _)| index)
            .collect()
    }
}

/// Classify every item in order.
pub fn predict<B: Backend>(
    model: &Classifier<B>,
    items: &[DigitItem],
    batch_size: usize,
    device: &B::Device,
) -> Predictions {
    let mut predictions = Predictions::default();

    for chunk in items.chunks(batch_size.max(1)) {
        let batch: DigitBatch<B> = DigitBatcher.batch(chunk.to_vec(), device);
        let classes = model.predict_classes(batch.images);

        predictions
            .predicted
            .extend(classes.into_data().iter::<i64>().map(|class| class as u8));
        predictions
            .labels
            .extend(chunk.iter().map(|item| item.label));
    }

    predictions
}

/// Run every item through the autoencoder, keeping labels and order.
pub fn denoise<B: Backend>(
    model: &Autoencoder<B>,
    items: &[DigitItem],
    batch_size: usize,
    device: &B::Device,
) -> Vec<DigitItem> {
    let mut denoised = Vec::with_capacity(items.len());

    for chunk in items.chunks(batch_size.max(1)) {
        let images = images_to_tensor::<B, _>(chunk.iter().map(|item| &item.image), device);
        let output = model.forward(images);

        denoised.extend(
            tensor_to_images(output)
                .into_iter()
                .zip(chunk)
                .map(|(image, item)| DigitItem {
                    image,
                    label: item.label,
                }),
        );
    }

    denoised
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::synthetic_digits;
    use crate::model::{AutoencoderConfig, ClassifierConfig};
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn predictions_split_correct_and_incorrect() {
        let predictions = Predictions {
            predicted: vec![1, 2, 3, 4, 5],
            labels: vec![1, 0, 3, 0, 5],
        };

        assert_eq!(predictions.correct_indices(), vec![0, 2, 4]);
        assert_eq!(predictions.incorrect_indices(), vec![1, 3]);
        assert!((predictions.accuracy() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn empty_predictions_have_zero_accuracy() {
        assert_eq!(Predictions::default().accuracy(), 0.0);
    }

    #[test]
    fn predict_covers_every_item_in_order() {
        let device = Default::default();
        let model = ClassifierConfig::new()
            .with_conv_channels(2)
            .with_hidden_size(4)
            .init::<TestBackend>(&device);
        let items = synthetic_digits(7);

        let predictions = predict(&model, &items, 3, &device);

        assert_eq!(predictions.len(), 7);
        assert_eq!(
            predictions.labels,
            items.iter().map(|item| item.label).collect::<Vec<_>>()
        );
        assert!(predictions.predicted.iter().all(|class| *class < 10));
    }

    #[test]
    fn denoise_preserves_labels_and_order() {
        let device = Default::default();
        let model = AutoencoderConfig::new()
            .with_outer_channels(2)
            .with_inner_channels(2)
            .init::<TestBackend>(&device);
        let items = synthetic_digits(5);

        let denoised = denoise(&model, &items, 2, &device);

        assert_eq!(denoised.len(), 5);
        for (denoised, item) in denoised.iter().zip(&items) {
            assert_eq!(denoised.label, item.label);
            assert!(denoised.pixels().all(|p| (0.0..=1.0).contains(&p)));
        }
    }
}
