//! Neural model factories for coursework-style experiments.
//!
//! Four factory functions assemble, compile, and return small networks for a
//! toy sequence-regression task, digit classification, and two
//! spam-classification variants on short text comments. The layer, loss,
//! metric, and optimizer machinery they configure lives in this crate too.
//!
//! # Modules
//!
//! - `factory`: the four model factories
//! - `model`: the `Sequential` container and compilation spec
//! - `layers`: Layer trait and implementations
//! - `losses`: loss functions
//! - `metrics`: evaluation metrics
//! - `optimizers`: Optimizer trait, SGD and Adam, parameter tensors
//! - `config`: fit-time options forwarded to training drivers
//! - `utils`: RNG, activations, GEMM helpers

extern crate blas_src;

pub mod config;
pub mod factory;
pub mod layers;
pub mod losses;
pub mod metrics;
pub mod model;
pub mod optimizers;
pub mod utils;

pub use config::FitOptions;
pub use factory::{
    create_image_classifier, create_text_classifier_convolutional,
    create_text_classifier_recurrent, create_toy_sequence_model,
};
pub use model::Sequential;
