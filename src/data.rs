use burn::{
    data::{
        dataloader::batcher::Batcher,
        dataset::{
            vision::{MnistDataset, MnistItem},
            Dataset,
        },
    },
    prelude::*,
};
use serde::{Deserialize, Serialize};

use crate::error::{ExperimentError, Result};

pub const WIDTH: usize = 28;
pub const HEIGHT: usize = 28;
pub const NUM_PIXELS: usize = WIDTH * HEIGHT;
pub const NUM_CLASSES: usize = 10;

/// A grayscale digit with pixel intensities in `[0, 1]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DigitItem {
    pub image: [[f32; WIDTH]; HEIGHT],
    pub label: u8,
}

impl DigitItem {
    /// Scale a raw MNIST item (intensities in `[0, 255]`) down to `[0, 1]`.
    pub fn from_mnist(item: &MnistItem) -> Self {
        let mut image = item.image;
        image
            .iter_mut()
            .flat_map(|row| row.iter_mut())
            .for_each(|pixel| *pixel /= 255.0);

        Self {
            image,
            label: item.label,
        }
    }

    pub fn pixels(&self) -> impl Iterator<Item = f32> + '_ {
        self.image.iter().flat_map(|row| row.iter().copied())
    }
}

/// Train and test splits held in memory.
#[derive(Clone, Debug)]
pub struct DigitSplits {
    pub train: Vec<DigitItem>,
    pub test: Vec<DigitItem>,
}

/// Load MNIST through burn's dataset source, downloading it on first use.
pub fn load_mnist() -> DigitSplits {
    let train = normalize_dataset(&MnistDataset::train());
    let test = normalize_dataset(&MnistDataset::test());
    log::info!(
        "Loaded MNIST: {} train items, {} test items",
        train.len(),
        test.len()
    );

    DigitSplits { train, test }
}

fn normalize_dataset<D: Dataset<MnistItem>>(dataset: &D) -> Vec<DigitItem> {
    dataset.iter().map(|item| DigitItem::from_mnist(&item)).collect()
}

/// Stack digit images into a `[N, 1, 28, 28]` tensor.
pub fn images_to_tensor<'a, B: Backend, I>(images: I, device: &B::Device) -> Tensor<B, 4>
where
    I: IntoIterator<Item = &'a [[f32; WIDTH]; HEIGHT]>,
{
    let mut values = Vec::new();
    let mut count = 0;
    for image in images {
        values.extend(image.iter().flat_map(|row| row.iter().copied()));
        count += 1;
    }

    let data = TensorData::new(values, [count, 1, HEIGHT, WIDTH]);
    Tensor::from_data(data.convert::<B::FloatElem>(), device)
}

/// Split a `[N, 1, 28, 28]` tensor back into per-image pixel arrays.
pub fn tensor_to_images<B: Backend>(tensor: Tensor<B, 4>) -> Vec<[[f32; WIDTH]; HEIGHT]> {
    let values: Vec<f32> = tensor.into_data().iter::<f32>().collect();

    values
        .chunks_exact(NUM_PIXELS)
        .map(|chunk| {
            let mut image = [[0f32; WIDTH]; HEIGHT];
            for (row, pixels) in image.iter_mut().zip(chunk.chunks_exact(WIDTH)) {
                row.copy_from_slice(pixels);
            }
            image
        })
        .collect()
}

fn labels_to_tensor<B: Backend>(labels: &[u8], device: &B::Device) -> Tensor<B, 1, Int> {
    let values: Vec<i64> = labels.iter().map(|label| *label as i64).collect();
    let data = TensorData::new(values, [labels.len()]);
    Tensor::from_data(data.convert::<B::IntElem>(), device)
}

#[derive(Clone, Default)]
pub struct DigitBatcher;

#[derive(Clone, Debug)]
pub struct DigitBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, DigitItem, DigitBatch<B>> for DigitBatcher {
    fn batch(&self, items: Vec<DigitItem>, device: &B::Device) -> DigitBatch<B> {
        let images = images_to_tensor(items.iter().map(|item| &item.image), device);
        let labels: Vec<u8> = items.iter().map(|item| item.label).collect();
        let targets = labels_to_tensor(&labels, device);

        DigitBatch { images, targets }
    }
}

/// A noisy input paired with the clean image it was derived from.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DenoisingItem {
    pub noisy: [[f32; WIDTH]; HEIGHT],
    pub clean: [[f32; WIDTH]; HEIGHT],
}

/// Zip noisy and clean digits index by index.
pub fn pair_for_denoising(noisy: &[DigitItem], clean: &[DigitItem]) -> Result<Vec<DenoisingItem>> {
    if noisy.len() != clean.len() {
        return Err(ExperimentError::LengthMismatch {
            expected: clean.len(),
            actual: noisy.len(),
        });
    }

    Ok(noisy
        .iter()
        .zip(clean)
        .map(|(noisy, clean)| DenoisingItem {
            noisy: noisy.image,
            clean: clean.image,
        })
        .collect())
}

#[derive(Clone, Default)]
pub struct DenoisingBatcher;

#[derive(Clone, Debug)]
pub struct DenoisingBatch<B: Backend> {
    pub noisy: Tensor<B, 4>,
    pub clean: Tensor<B, 4>,
}

impl<B: Backend> Batcher<B, DenoisingItem, DenoisingBatch<B>> for DenoisingBatcher {
    fn batch(&self, items: Vec<DenoisingItem>, device: &B::Device) -> DenoisingBatch<B> {
        let noisy = images_to_tensor(items.iter().map(|item| &item.noisy), device);
        let clean = images_to_tensor(items.iter().map(|item| &item.clean), device);

        DenoisingBatch { noisy, clean }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    /// A digit whose pixels follow a label-dependent pattern, so tests run offline.
    pub(crate) fn synthetic_digit(label: u8) -> DigitItem {
        let mut image = [[0f32; WIDTH]; HEIGHT];
        for (y, row) in image.iter_mut().enumerate() {
            for (x, pixel) in row.iter_mut().enumerate() {
                *pixel = ((x + y * 3 + label as usize * 7) % 17) as f32 / 16.0;
            }
        }

        DigitItem { image, label }
    }

    pub(crate) fn synthetic_digits(count: usize) -> Vec<DigitItem> {
        (0..count)
            .map(|i| synthetic_digit((i % NUM_CLASSES) as u8))
            .collect()
    }

    #[test]
    fn from_mnist_scales_to_unit_range() {
        let mut image = [[0f32; WIDTH]; HEIGHT];
        image[0][0] = 255.0;
        image[3][5] = 51.0;
        let item = DigitItem::from_mnist(&MnistItem { image, label: 4 });

        assert_eq!(item.label, 4);
        assert_eq!(item.image[0][0], 1.0);
        assert!((item.image[3][5] - 0.2).abs() < 1e-6);
        assert!(item.pixels().all(|p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn digit_batch_is_channels_first() {
        let device = Default::default();
        let items = synthetic_digits(5);

        let batch: DigitBatch<TestBackend> = DigitBatcher.batch(items.clone(), &device);

        assert_eq!(batch.images.dims(), [5, 1, HEIGHT, WIDTH]);
        assert_eq!(batch.targets.dims(), [5]);
        let targets: Vec<i64> = batch.targets.into_data().iter::<i64>().collect();
        assert_eq!(targets, vec![0, 1, 2, 3, 4]);

        let pixel = batch
            .images
            .slice([1..2, 0..1, 2..3, 9..10])
            .into_scalar()
            .elem::<f32>();
        assert_eq!(pixel, items[1].image[2][9]);
    }

    #[test]
    fn tensor_round_trip_keeps_pixel_layout() {
        let device = Default::default();
        let items = synthetic_digits(3);

        let tensor =
            images_to_tensor::<TestBackend, _>(items.iter().map(|item| &item.image), &device);
        let images = tensor_to_images(tensor);

        assert_eq!(images.len(), 3);
        for (image, item) in images.iter().zip(&items) {
            assert_eq!(image, &item.image);
        }
    }

    #[test]
    fn pairing_requires_equal_lengths() {
        let clean = synthetic_digits(4);
        let noisy = synthetic_digits(3);

        let err = pair_for_denoising(&noisy, &clean).unwrap_err();
        assert!(matches!(
            err,
            ExperimentError::LengthMismatch {
                expected: 4,
                actual: 3
            }
        ));

        let pairs = pair_for_denoising(&clean, &clean).unwrap();
        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs[2].noisy, clean[2].image);
    }

    #[test]
    fn denoising_batch_shapes() {
        let device = Default::default();
        let clean = synthetic_digits(6);
        let pairs = pair_for_denoising(&clean, &clean).unwrap();

        let batch: DenoisingBatch<TestBackend> = DenoisingBatcher.batch(pairs, &device);

        assert_eq!(batch.noisy.dims(), [6, 1, HEIGHT, WIDTH]);
        assert_eq!(batch.clean.dims(), [6, 1, HEIGHT, WIDTH]);
    }
}
