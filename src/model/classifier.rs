use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, Relu,
    },
    prelude::*,
    tensor::activation::softmax,
};

use super::{glorot_uniform, he_uniform, zero_bias};
use crate::data::{HEIGHT, WIDTH};

/// One convolution block followed by a two-layer perceptron.
#[derive(Module, Debug)]
pub struct Classifier<B: Backend> {
    conv: Conv2d<B>,
    pool: MaxPool2d,
    hidden: Linear<B>,
    output: Linear<B>,
    activation: Relu,
}

#[derive(Config, Debug)]
pub struct ClassifierConfig {
    #[config(default = 10)]
    pub num_classes: usize,
    #[config(default = 32)]
    pub conv_channels: usize,
    #[config(default = 100)]
    pub hidden_size: usize,
}

impl ClassifierConfig {
    /// Number of features after the valid 3x3 convolution and the 2x2 pooling.
    pub fn flattened_size(&self) -> usize {
        let height = (HEIGHT - 2) / 2;
        let width = (WIDTH - 2) / 2;
        self.conv_channels * height * width
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Classifier<B> {
        let mut conv = Conv2dConfig::new([1, self.conv_channels], [3, 3])
            .with_initializer(he_uniform())
            .init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        let mut hidden = LinearConfig::new(self.flattened_size(), self.hidden_size)
            .with_initializer(he_uniform())
            .init(device);
        let mut output = LinearConfig::new(self.hidden_size, self.num_classes)
            .with_initializer(glorot_uniform())
            .init(device);

        conv.bias = zero_bias(conv.bias);
        hidden.bias = zero_bias(hidden.bias);
        output.bias = zero_bias(output.bias);

        Classifier {
            conv,
            pool,
            hidden,
            output,
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> Classifier<B> {
    /// # Shapes
    ///   - Images [batch_size, 1, height, width]
    ///   - Output [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv.forward(images);
        let x = self.activation.forward(x);
        let x = self.pool.forward(x);
        let x = x.flatten::<2>(1, 3);
        let x = self.hidden.forward(x);
        let x = self.activation.forward(x);

        self.output.forward(x)
    }

    /// Forward pass with the cross-entropy loss against integer class targets.
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassifierOutput<B> {
        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassifierOutput {
            loss,
            output,
            targets,
        }
    }

    pub fn probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    pub fn predict_classes(&self, images: Tensor<B, 4>) -> Tensor<B, 1, Int> {
        self.forward(images).argmax(1).flatten::<1>(0, 1)
    }
}

pub struct ClassifierOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
    pub output: Tensor<B, 2>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> ClassifierOutput<B> {
    /// Number of correctly classified items in the batch.
    pub fn num_correct(&self) -> usize {
        let predictions = self.output.clone().argmax(1).flatten::<1>(0, 1);
        predictions
            .equal(self.targets.clone())
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>() as usize
    }
}
