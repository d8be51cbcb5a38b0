//! Forward-pass semantics of the individual layers through the public API.

use approx::assert_relative_eq;
use neural_factories::layers::{
    BidirectionalGruLayer, Conv1DLayer, Conv2DLayer, DenseLayer, DropoutLayer, EmbeddingLayer,
    GlobalMaxPool1DLayer, Layer, MaxPool2DLayer, SimpleRnnLayer,
};
use neural_factories::losses::Loss;
use neural_factories::model::Sequential;
use neural_factories::optimizers::OptimizerSpec;
use neural_factories::utils::{Activation, SimpleRng};

// ============================================================================
// Dense
// ============================================================================

#[test]
fn dense_softmax_produces_distributions() {
    let mut rng = SimpleRng::new(42);
    let layer = DenseLayer::new(6, 4, Activation::Softmax, &mut rng);
    let mut input = vec![0.0f32; 3 * 6];
    rng.fill_uniform(&mut input, -2.0, 2.0);

    let mut output = vec![0.0f32; 3 * 4];
    layer.forward(&input, &mut output, 3);
    for row in output.chunks_exact(4) {
        let sum: f32 = row.iter().sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-5);
    }
}

#[test]
fn dense_sigmoid_stays_in_unit_interval() {
    let mut rng = SimpleRng::new(42);
    let layer = DenseLayer::new(5, 3, Activation::Sigmoid, &mut rng);
    let mut input = vec![0.0f32; 2 * 5];
    rng.fill_uniform(&mut input, -5.0, 5.0);

    let mut output = vec![0.0f32; 2 * 3];
    layer.forward(&input, &mut output, 2);
    assert!(output.iter().all(|&v| (0.0..=1.0).contains(&v)));
}

// ============================================================================
// Convolutions
// ============================================================================

#[test]
fn conv2d_relu_output_is_nonnegative() {
    let mut rng = SimpleRng::new(5);
    let layer = Conv2DLayer::new(1, 4, 3, 0, 1, 8, 8, Activation::Relu, &mut rng);
    let mut input = vec![0.0f32; 64];
    rng.fill_uniform(&mut input, -1.0, 1.0);

    let mut output = vec![0.0f32; layer.output_size()];
    layer.forward(&input, &mut output, 1);
    assert_eq!(output.len(), 4 * 6 * 6);
    assert!(output.iter().all(|&v| v >= 0.0));
}

#[test]
fn conv1d_output_width_shrinks_by_kernel() {
    let mut rng = SimpleRng::new(5);
    let layer = Conv1DLayer::new(3, 2, 3, Activation::Linear, &mut rng);
    let input = vec![0.1f32; 6 * 3]; // 6 steps x 3 channels
    let mut output = vec![0.0f32; layer.output_len(input.len(), 1)];
    layer.forward(&input, &mut output, 1);
    assert_eq!(output.len(), 4 * 2); // (6 - 3 + 1) steps x 2 filters
}

// ============================================================================
// Pooling
// ============================================================================

#[test]
fn max_pool2d_keeps_channel_maxima() {
    let layer = MaxPool2DLayer::new(2, 2, 2, 2);
    // Two channels of a 2x2 plane collapse to one value each.
    let input = vec![1.0, 2.0, 3.0, 4.0, 8.0, 7.0, 6.0, 5.0];
    let mut output = vec![0.0f32; 2];
    layer.forward(&input, &mut output, 1);
    assert_eq!(output, vec![4.0, 8.0]);
}

#[test]
fn global_max_pool_is_width_invariant_on_padding() {
    // Padding steps with small values do not change the pooled output when
    // the real maxima are larger.
    let layer = GlobalMaxPool1DLayer::new(2);
    let unpadded = vec![0.9, 0.4, 0.2, 0.8];
    let padded = vec![0.9, 0.4, 0.2, 0.8, 0.0, 0.0, 0.0, 0.0];

    let mut out_a = vec![0.0f32; 2];
    let mut out_b = vec![0.0f32; 2];
    layer.forward(&unpadded, &mut out_a, 1);
    layer.forward(&padded, &mut out_b, 1);
    assert_eq!(out_a, out_b);
}

// ============================================================================
// Dropout
// ============================================================================

#[test]
fn dropout_is_identity_in_inference() {
    let mut rng = SimpleRng::new(42);
    let mut layer = DropoutLayer::new(8, 0.25, &mut rng);
    layer.set_training(false);

    let input: Vec<f32> = (0..8).map(|v| v as f32).collect();
    let mut output = vec![0.0f32; 8];
    layer.forward(&input, &mut output, 1);
    assert_eq!(output, input);
}

// ============================================================================
// Embedding
// ============================================================================

#[test]
fn embedding_expands_tokens_to_vectors() {
    let mut rng = SimpleRng::new(42);
    let layer = EmbeddingLayer::new(16, 200, &mut rng);
    assert_eq!(layer.vocab_size(), 16);
    assert_eq!(layer.parameter_count(), 16 * 200);

    let tokens = vec![1.0, 0.0, 15.0, 7.0];
    let mut output = vec![0.0f32; 4 * 200];
    layer.forward(&tokens, &mut output, 1);

    // The same token always maps to the same row.
    let mut again = vec![0.0f32; 200];
    layer.forward(&[1.0], &mut again, 1);
    assert_eq!(&output[0..200], &again[..]);
}

// ============================================================================
// Recurrent layers
// ============================================================================

#[test]
fn simple_rnn_emits_one_state_per_step() {
    let mut rng = SimpleRng::new(42);
    let layer = SimpleRnnLayer::new(6, 2, 16, true, Activation::Tanh, &mut rng);
    let mut input = vec![0.0f32; 2 * 6 * 2];
    rng.fill_uniform(&mut input, -1.0, 1.0);

    let mut output = vec![0.0f32; 2 * 6 * 16];
    layer.forward(&input, &mut output, 2);
    // tanh keeps every state in (-1, 1).
    assert!(output.iter().all(|&v| v.abs() < 1.0));
}

#[test]
fn bidirectional_gru_concatenates_directions() {
    let mut rng = SimpleRng::new(42);
    let mut layer = BidirectionalGruLayer::new(4, 8, 0.0, Activation::Linear, &mut rng);
    layer.set_training(false);
    assert_eq!(layer.output_size(), 16);

    let mut input = vec![0.0f32; 5 * 4];
    rng.fill_uniform(&mut input, -0.5, 0.5);
    let mut output = vec![0.0f32; 16];
    layer.forward(&input, &mut output, 1);
    assert!(output.iter().all(|v| v.is_finite()));

    // A recurrent layer is order-sensitive: reversing the sequence changes
    // the final states.
    let mut reversed = vec![0.0f32; 5 * 4];
    for t in 0..5 {
        reversed[t * 4..(t + 1) * 4].copy_from_slice(&input[(4 - t) * 4..(5 - t) * 4]);
    }
    let mut rev_output = vec![0.0f32; 16];
    layer.forward(&reversed, &mut rev_output, 1);
    assert_ne!(output, rev_output);
}

// ============================================================================
// Stacks
// ============================================================================

#[test]
fn embedding_pool_stack_handles_variable_width() {
    let mut rng = SimpleRng::new(42);
    let mut model = Sequential::new();
    model.add(Box::new(EmbeddingLayer::new(10, 4, &mut rng)));
    model.add(Box::new(GlobalMaxPool1DLayer::new(4)));
    model.add(Box::new(DenseLayer::new(4, 2, Activation::Sigmoid, &mut rng)));
    model
        .compile(
            Loss::BinaryCrossentropy,
            OptimizerSpec::adam_with_learning_rate(0.01),
            Vec::new(),
        )
        .unwrap();

    let short = model.predict(&[1.0, 2.0, 3.0], 1).unwrap();
    let long = model.predict(&[1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.0], 1).unwrap();
    assert_eq!(short.len(), 2);
    assert_eq!(long.len(), 2);
}
