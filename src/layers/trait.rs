//! Layer trait shared by all network layers.

use crate::optimizers::OptimizerSpec;

/// Uniform interface for forward propagation, backward propagation, and
/// parameter updates.
///
/// Data is f32 throughout, flattened row-major with the batch as the leading
/// dimension: `input` holds `batch_size` consecutive samples of
/// `input_size()` values each. Layers that process token sequences of a
/// width only known at call time ([`variable_width`](Layer::variable_width))
/// instead treat `input_size()`/`output_size()` as per-time-step feature
/// counts and recover the step count from the buffer length.
///
/// Weight and bias gradients accumulate inside the layer during
/// [`backward`](Layer::backward) (scaled by 1/batch) and are applied and
/// cleared by [`update_parameters`](Layer::update_parameters). The gradient
/// written to `grad_input` is unscaled; the upstream layer applies its own
/// batch scaling.
pub trait Layer {
    /// Compute the layer output for a batch.
    ///
    /// `output` must have the length returned by
    /// [`output_len`](Layer::output_len) for this input. Layers may cache
    /// intermediate values (activations, masks, argmax indices) for the
    /// matching backward pass, so `backward` must be called with the same
    /// input as the preceding `forward`.
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize);

    /// Propagate gradients for a batch.
    ///
    /// `grad_output` is the loss gradient with respect to this layer's
    /// output; `grad_input` receives the gradient with respect to its input.
    /// Parameter gradients accumulate internally.
    fn backward(
        &self,
        input: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    );

    /// Bind the optimizer each parameter tensor will use. No-op for layers
    /// without parameters.
    fn set_optimizer(&mut self, spec: &OptimizerSpec) {
        let _ = spec;
    }

    /// Apply accumulated gradients through the bound optimizers and clear
    /// them. No-op for layers without parameters.
    fn update_parameters(&mut self) {}

    /// Switch between training and inference behavior (dropout masks).
    /// Most layers behave identically in both modes.
    fn set_training(&mut self, training: bool) {
        let _ = training;
    }

    /// Input features per sample, or per time step for variable-width layers.
    fn input_size(&self) -> usize;

    /// Output features per sample, or per time step for variable-width
    /// layers whose output is still a sequence.
    fn output_size(&self) -> usize;

    /// True when the layer accepts sequences whose step count is inferred
    /// from the input length at call time.
    fn variable_width(&self) -> bool {
        false
    }

    /// Output buffer length for an input of `input_len` values.
    ///
    /// Fixed-shape layers ignore `input_len`.
    fn output_len(&self, input_len: usize, batch_size: usize) -> usize {
        let _ = input_len;
        batch_size * self.output_size()
    }

    /// Total number of trainable scalars.
    fn parameter_count(&self) -> usize;

    /// Short name used in model summaries.
    fn name(&self) -> &'static str;
}
