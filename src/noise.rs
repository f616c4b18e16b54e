use burn::config::Config;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::data::DigitItem;
use crate::error::{self, ExperimentError};

/// Additive Gaussian noise: `clip(x + factor * N(0, 1), 0, 1)`.
#[derive(Config, Debug)]
pub struct GaussianNoiseConfig {
    #[config(default = 0.5)]
    pub factor: f64,
    #[config(default = 42)]
    pub seed: u64,
}

impl GaussianNoiseConfig {
    pub fn init(&self) -> error::Result<GaussianNoise> {
        if !self.factor.is_finite() || self.factor < 0.0 {
            return Err(ExperimentError::InvalidConfig(format!(
                "noise factor must be a finite non-negative number, got {}",
                self.factor
            )));
        }

        Ok(GaussianNoise {
            factor: self.factor as f32,
            seed: self.seed,
        })
    }
}

#[derive(Clone, Debug)]
pub struct GaussianNoise {
    factor: f32,
    seed: u64,
}

impl GaussianNoise {
    pub fn factor(&self) -> f32 {
        self.factor
    }

    pub fn is_identity(&self) -> bool {
        self.factor == 0.0
    }

    /// Corrupt every pixel of every item. `stream` selects an independent noise
    /// sequence for the same seed, so the train and test splits do not share noise.
    pub fn apply(&self, items: &[DigitItem], stream: u64) -> Vec<DigitItem> {
        if self.is_identity() {
            return items.to_vec();
        }

        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(stream));
        items
            .iter()
            .map(|item| {
                let mut image = item.image;
                for pixel in image.iter_mut().flat_map(|row| row.iter_mut()) {
                    let sample: f32 = rng.sample(StandardNormal);
                    let noisy = *pixel + self.factor * sample;
                    *pixel = noisy.clamp(0.0, 1.0);
                }

                DigitItem {
                    image,
                    label: item.label,
                }
            })
            .collect()
    }
}
