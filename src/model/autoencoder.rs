use burn::{
    module::Param,
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        PaddingConfig2d, Relu,
    },
    prelude::*,
    tensor::activation::sigmoid,
};

use super::{he_uniform, map_detached, zero_bias};

const EPSILON: f64 = 1e-7;

/// Convolutional denoising autoencoder.
///
/// Two valid convolutions shrink the image from 28x28 to 24x24, two transposed
/// convolutions grow it back, and a same-padded convolution maps the features
/// to a single sigmoid channel.
#[derive(Module, Debug)]
pub struct Autoencoder<B: Backend> {
    encoder_1: Conv2d<B>,
    encoder_2: Conv2d<B>,
    decoder_1: ConvTranspose2d<B>,
    decoder_2: ConvTranspose2d<B>,
    output: Conv2d<B>,
    activation: Relu,
}

#[derive(Config, Debug)]
pub struct AutoencoderConfig {
    #[config(default = 64)]
    pub outer_channels: usize,
    #[config(default = 32)]
    pub inner_channels: usize,
    /// Upper bound on the L2 norm of every convolution filter.
    #[config(default = 2.0)]
    pub max_norm: f64,
}

impl AutoencoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Autoencoder<B> {
        let outer = self.outer_channels;
        let inner = self.inner_channels;

        let mut model = Autoencoder {
            encoder_1: Conv2dConfig::new([1, outer], [3, 3])
                .with_initializer(he_uniform())
                .init(device),
            encoder_2: Conv2dConfig::new([outer, inner], [3, 3])
                .with_initializer(he_uniform())
                .init(device),
            decoder_1: ConvTranspose2dConfig::new([inner, inner], [3, 3])
                .with_initializer(he_uniform())
                .init(device),
            decoder_2: ConvTranspose2dConfig::new([inner, outer], [3, 3])
                .with_initializer(he_uniform())
                .init(device),
            output: Conv2dConfig::new([outer, 1], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .with_initializer(he_uniform())
                .init(device),
            activation: Relu::new(),
        };

        model.encoder_1.bias = zero_bias(model.encoder_1.bias);
        model.encoder_2.bias = zero_bias(model.encoder_2.bias);
        model.decoder_1.bias = zero_bias(model.decoder_1.bias);
        model.decoder_2.bias = zero_bias(model.decoder_2.bias);
        model.output.bias = zero_bias(model.output.bias);

        model
    }
}

impl<B: Backend> Autoencoder<B> {
    /// # Shapes
    ///   - Images [batch_size, 1, height, width]
    ///   - Output [batch_size, 1, height, width], values in `(0, 1)`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.activation.forward(self.encoder_1.forward(images));
        let x = self.activation.forward(self.encoder_2.forward(x));
        let x = self.activation.forward(self.decoder_1.forward(x));
        let x = self.activation.forward(self.decoder_2.forward(x));

        sigmoid(self.output.forward(x))
    }

    /// Forward pass with the binary cross-entropy against the clean images.
    pub fn forward_reconstruction(
        &self,
        noisy: Tensor<B, 4>,
        clean: Tensor<B, 4>,
    ) -> ReconstructionOutput<B> {
        let output = self.forward(noisy);
        let loss = binary_cross_entropy(output.clone(), clean.clone());

        ReconstructionOutput {
            loss,
            output,
            targets: clean,
        }
    }

    /// Rescale every filter whose L2 norm exceeds `bound`.
    pub fn apply_max_norm(self, bound: f64) -> Self {
        let mut model = self;
        model.encoder_1.weight = constrain(model.encoder_1.weight, bound);
        model.encoder_2.weight = constrain(model.encoder_2.weight, bound);
        model.decoder_1.weight = constrain(model.decoder_1.weight, bound);
        model.decoder_2.weight = constrain(model.decoder_2.weight, bound);
        model.output.weight = constrain(model.output.weight, bound);

        model
    }

    /// Largest filter norm across all layers.
    pub fn max_filter_norm(&self) -> f32 {
        [
            filter_norms(self.encoder_1.weight.val()),
            filter_norms(self.encoder_2.weight.val()),
            filter_norms(self.decoder_1.weight.val()),
            filter_norms(self.decoder_2.weight.val()),
            filter_norms(self.output.weight.val()),
        ]
        .into_iter()
        .map(|norms| norms.max().into_scalar().elem::<f32>())
        .fold(0.0, f32::max)
    }
}

pub struct ReconstructionOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
    pub output: Tensor<B, 4>,
    pub targets: Tensor<B, 4>,
}

/// Mean binary cross-entropy between probabilities and targets in `[0, 1]`.
pub fn binary_cross_entropy<B: Backend, const D: usize>(
    predictions: Tensor<B, D>,
    targets: Tensor<B, D>,
) -> Tensor<B, 1> {
    let predictions = predictions.clamp(EPSILON, 1.0 - EPSILON);
    let positive = targets.clone() * predictions.clone().log();
    let negative = (targets.neg() + 1.0) * (predictions.neg() + 1.0).log();

    (positive + negative).neg().mean()
}

/// L2 norm of each filter, taken over every dimension but the first.
///
/// Conv2d weights are `[out, in, k, k]` and ConvTranspose2d weights are
/// `[in, out, k, k]`, so this is per output filter and per input channel
/// respectively.
fn filter_norms<B: Backend>(weight: Tensor<B, 4>) -> Tensor<B, 4> {
    weight
        .powf_scalar(2.0)
        .sum_dim(3)
        .sum_dim(2)
        .sum_dim(1)
        .sqrt()
}

/// `w * clamp(n, 0, bound) / (n + eps)` for each filter norm `n`.
pub fn max_norm<B: Backend>(weight: Tensor<B, 4>, bound: f64) -> Tensor<B, 4> {
    let norms = filter_norms(weight.clone());
    let desired = norms.clone().clamp(0.0, bound);

    weight * (desired / (norms + EPSILON))
}

fn constrain<B: Backend>(param: Param<Tensor<B, 4>>, bound: f64) -> Param<Tensor<B, 4>> {
    map_detached(param, |weight| max_norm(weight, bound))
}
