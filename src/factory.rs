//! Model factories for the coursework experiments.
//!
//! Each factory assembles a layered topology, compiles it with a loss and
//! optimizer, and returns it together with a [`FitOptions`] value for the
//! caller's training driver. No factory trains, loads data, or evaluates;
//! those responsibilities stay with the caller.
//!
//! All four return `(model, fit_options)` where the options start empty: a
//! driver can later populate them (batch size, early stopping) without any
//! factory signature changing.

use std::error::Error;

use crate::config::FitOptions;
use crate::layers::{
    BidirectionalGruLayer, Conv1DLayer, Conv2DLayer, DenseLayer, DropoutLayer, EmbeddingLayer,
    FlattenLayer, GlobalMaxPool1DLayer, MaxPool2DLayer, SimpleRnnLayer, TimeDistributedDense,
};
use crate::losses::Loss;
use crate::metrics::Metric;
use crate::model::Sequential;
use crate::optimizers::OptimizerSpec;
use crate::utils::{Activation, SimpleRng};

// Toy sequence model.
const RNN_UNITS: usize = 256;

// Image classifier.
const IMAGE_FILTERS: usize = 64;
const IMAGE_FILTERS_DEEP: usize = 128;
const IMAGE_KERNEL: usize = 3;
const IMAGE_POOL: usize = 3;
const IMAGE_DROP_RATE: f32 = 0.25;

// Text classifiers.
const EMBEDDING_DIM: usize = 200;
const GRU_UNITS: usize = 64;
const TEXT_FILTERS: usize = 64;
const TEXT_KERNEL: usize = 3;
const TEXT_DROP_RATE: f32 = 0.25;
const GRU_INPUT_DROP_RATE: f32 = 0.5;
const TEXT_LEARNING_RATE: f32 = 0.01;

fn fresh_rng() -> SimpleRng {
    let mut rng = SimpleRng::new(0);
    rng.reseed_from_time();
    rng
}

/// Creates a recurrent network for a toy sequence-regression problem.
///
/// The network takes a sequence of number pairs (x_t, y_t) and must learn to
/// produce x_{t-3} - y_t at each time step t: a single 256-unit tanh
/// recurrent layer emitting one state per step, followed by a per-step
/// linear projection to width 1. Compiled with mean squared error and Adam
/// at the default learning rate; no metrics.
///
/// `input_shape` is `(steps, features)` — the toy task uses 2 features.
/// `n_outputs` is accepted for interface uniformity with the other factories
/// but unused: the per-step output width is fixed at 1.
///
/// This function does not train. The returned [`FitOptions`] is empty and is
/// forwarded by the caller to its training driver, which may populate it
/// with options such as the batch size or early stopping.
pub fn create_toy_sequence_model(
    input_shape: (usize, usize),
    n_outputs: usize,
) -> Result<(Sequential, FitOptions), Box<dyn Error>> {
    let (steps, features) = input_shape;
    let _ = n_outputs; // output width is fixed at 1 per step

    let mut rng = fresh_rng();
    let mut model = Sequential::new();
    model.add(Box::new(SimpleRnnLayer::new(
        steps,
        features,
        RNN_UNITS,
        true,
        Activation::Tanh,
        &mut rng,
    )));
    model.add(Box::new(TimeDistributedDense::new(
        steps,
        RNN_UNITS,
        1,
        Activation::Linear,
        &mut rng,
    )));

    model.compile(Loss::MeanSquaredError, OptimizerSpec::adam(), Vec::new())?;
    Ok((model, FitOptions::default()))
}

/// Creates a convolutional network for digit classification.
///
/// The network takes a single-channel grayscale image and produces a
/// probability distribution over `n_outputs` classes: two 64-filter 3x3
/// convolutions, 3x3 max pooling, dropout at 0.25, a 128-filter 3x3
/// convolution, another 3x3 max pooling, then a flattened softmax
/// projection. Compiled with categorical cross-entropy, Adam at the default
/// learning rate, and the accuracy metric.
///
/// `input_shape` is `(height, width, channels)`; images are laid out as
/// channel-major planes, which for the single-channel case is simply the
/// row-major image.
///
/// This function does not train. The returned [`FitOptions`] is empty and is
/// forwarded by the caller to its training driver.
pub fn create_image_classifier(
    input_shape: (usize, usize, usize),
    n_outputs: usize,
) -> Result<(Sequential, FitOptions), Box<dyn Error>> {
    let (height, width, channels) = input_shape;

    let mut rng = fresh_rng();
    let mut model = Sequential::new();

    let conv1 = Conv2DLayer::new(
        channels,
        IMAGE_FILTERS,
        IMAGE_KERNEL,
        0,
        1,
        height,
        width,
        Activation::Relu,
        &mut rng,
    );
    let (h, w) = (conv1.output_height(), conv1.output_width());
    model.add(Box::new(conv1));

    let conv2 = Conv2DLayer::new(
        IMAGE_FILTERS,
        IMAGE_FILTERS,
        IMAGE_KERNEL,
        0,
        1,
        h,
        w,
        Activation::Relu,
        &mut rng,
    );
    let (h, w) = (conv2.output_height(), conv2.output_width());
    model.add(Box::new(conv2));

    let pool1 = MaxPool2DLayer::new(IMAGE_FILTERS, h, w, IMAGE_POOL);
    let (h, w) = (pool1.output_height(), pool1.output_width());
    model.add(Box::new(pool1));

    model.add(Box::new(DropoutLayer::new(
        IMAGE_FILTERS * h * w,
        IMAGE_DROP_RATE,
        &mut rng,
    )));

    let conv3 = Conv2DLayer::new(
        IMAGE_FILTERS,
        IMAGE_FILTERS_DEEP,
        IMAGE_KERNEL,
        0,
        1,
        h,
        w,
        Activation::Relu,
        &mut rng,
    );
    let (h, w) = (conv3.output_height(), conv3.output_width());
    model.add(Box::new(conv3));

    let pool2 = MaxPool2DLayer::new(IMAGE_FILTERS_DEEP, h, w, IMAGE_POOL);
    let (h, w) = (pool2.output_height(), pool2.output_width());
    model.add(Box::new(pool2));

    let flat = IMAGE_FILTERS_DEEP * h * w;
    model.add(Box::new(FlattenLayer::new(flat)));
    model.add(Box::new(DenseLayer::new(
        flat,
        n_outputs,
        Activation::Softmax,
        &mut rng,
    )));

    model.compile(
        Loss::CategoricalCrossentropy,
        OptimizerSpec::adam(),
        vec![Metric::Accuracy],
    )?;
    Ok((model, FitOptions::default()))
}

/// Creates a recurrent network for spam classification of short comments.
///
/// The network takes a comment as a sequence of token indices into
/// `vocabulary` and produces an independent per-class probability in [0, 1]
/// (1 for spam, 0 for ham in the single-output case): an embedding table of
/// `vocabulary.len() x 200`, a bidirectional 64-unit GRU with a linear
/// candidate activation and 50% input dropout whose forward and backward
/// final states are concatenated, then a sigmoid projection to `n_outputs`.
/// Compiled with binary cross-entropy, Adam at learning rate 0.01, and the
/// accuracy metric.
///
/// Comments may be of variable length; callers right-pad each batch with
/// token index 0 to a uniform width of their choosing. The factory assumes,
/// but does not enforce, that convention — the model infers the padded width
/// from each batch it sees.
///
/// This function does not train. The returned [`FitOptions`] is empty and is
/// forwarded by the caller to its training driver.
///
/// # Panics
///
/// Panics if `vocabulary` is empty.
pub fn create_text_classifier_recurrent(
    vocabulary: &[String],
    n_outputs: usize,
) -> Result<(Sequential, FitOptions), Box<dyn Error>> {
    let mut rng = fresh_rng();
    let mut model = Sequential::new();

    model.add(Box::new(EmbeddingLayer::new(
        vocabulary.len(),
        EMBEDDING_DIM,
        &mut rng,
    )));
    model.add(Box::new(BidirectionalGruLayer::new(
        EMBEDDING_DIM,
        GRU_UNITS,
        GRU_INPUT_DROP_RATE,
        Activation::Linear,
        &mut rng,
    )));
    model.add(Box::new(DenseLayer::new(
        2 * GRU_UNITS,
        n_outputs,
        Activation::Sigmoid,
        &mut rng,
    )));

    model.compile(
        Loss::BinaryCrossentropy,
        OptimizerSpec::adam_with_learning_rate(TEXT_LEARNING_RATE),
        vec![Metric::Accuracy],
    )?;
    Ok((model, FitOptions::default()))
}

/// Creates a convolutional network for spam classification of short comments.
///
/// Same input contract and compilation as
/// [`create_text_classifier_recurrent`]: token-index sequences over
/// `vocabulary`, right-padded with index 0. The topology is an embedding
/// table of `vocabulary.len() x 200`, a 64-filter width-3 convolution over
/// the sequence, global max pooling (which collapses any padded width to a
/// fixed 64-wide vector), dropout at 0.25, and a sigmoid projection to
/// `n_outputs`.
///
/// This function does not train. The returned [`FitOptions`] is empty and is
/// forwarded by the caller to its training driver.
///
/// # Panics
///
/// Panics if `vocabulary` is empty.
pub fn create_text_classifier_convolutional(
    vocabulary: &[String],
    n_outputs: usize,
) -> Result<(Sequential, FitOptions), Box<dyn Error>> {
    let mut rng = fresh_rng();
    let mut model = Sequential::new();

    model.add(Box::new(EmbeddingLayer::new(
        vocabulary.len(),
        EMBEDDING_DIM,
        &mut rng,
    )));
    model.add(Box::new(Conv1DLayer::new(
        EMBEDDING_DIM,
        TEXT_FILTERS,
        TEXT_KERNEL,
        Activation::Relu,
        &mut rng,
    )));
    model.add(Box::new(GlobalMaxPool1DLayer::new(TEXT_FILTERS)));
    model.add(Box::new(DropoutLayer::new(
        TEXT_FILTERS,
        TEXT_DROP_RATE,
        &mut rng,
    )));
    model.add(Box::new(DenseLayer::new(
        TEXT_FILTERS,
        n_outputs,
        Activation::Sigmoid,
        &mut rng,
    )));

    model.compile(
        Loss::BinaryCrossentropy,
        OptimizerSpec::adam_with_learning_rate(TEXT_LEARNING_RATE),
        vec![Metric::Accuracy],
    )?;
    Ok((model, FitOptions::default()))
}
