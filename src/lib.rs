pub mod cli;
pub mod data;
pub mod error;
pub mod experiment;
pub mod inference;
pub mod logging;
pub mod model;
pub mod noise;
pub mod show;
pub mod training;

pub use error::{ExperimentError, Result};
