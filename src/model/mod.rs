mod autoencoder;
mod classifier;

pub use autoencoder::*;
pub use classifier::*;

use burn::{module::Param, nn::Initializer, prelude::*};

/// He uniform initialization: `U(-sqrt(6 / fan_in), sqrt(6 / fan_in))`.
pub(crate) fn he_uniform() -> Initializer {
    Initializer::KaimingUniform {
        gain: core::f64::consts::SQRT_2,
        fan_out_only: false,
    }
}

/// Glorot uniform initialization: `U(-sqrt(6 / (fan_in + fan_out)), ...)`.
pub(crate) fn glorot_uniform() -> Initializer {
    Initializer::XavierUniform { gain: 1.0 }
}

/// Replace a parameter value through `func`, outside of the autodiff graph.
///
/// The new value is a leaf tensor that keeps the parameter's gradient tracking.
pub(crate) fn map_detached<B: Backend, const D: usize>(
    param: Param<Tensor<B, D>>,
    func: impl FnOnce(Tensor<B, D>) -> Tensor<B, D>,
) -> Param<Tensor<B, D>> {
    param.map(|tensor| {
        let require_grad = tensor.is_require_grad();
        let tensor = func(tensor.detach()).detach();

        if require_grad {
            tensor.require_grad()
        } else {
            tensor
        }
    })
}

/// Zero a layer bias. Burn draws biases from the weight initializer.
pub(crate) fn zero_bias<B: Backend>(
    bias: Option<Param<Tensor<B, 1>>>,
) -> Option<Param<Tensor<B, 1>>> {
    bias.map(|bias| map_detached(bias, |tensor| tensor.zeros_like()))
}
