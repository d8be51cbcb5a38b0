//! Dense (fully connected) layers.
//!
//! [`DenseLayer`] maps a flat feature vector through `y = act(x W + b)`;
//! [`TimeDistributedDense`] applies the same affine map independently at every
//! time step of a sequence. Both run their matrix products through BLAS.

use std::cell::RefCell;

use crate::layers::Layer;
use crate::optimizers::{OptimizerSpec, Parameter};
use crate::utils::matmul::{add_bias_rows, matmul};
use crate::utils::{Activation, SimpleRng};

/// Fully connected layer with an owned output activation.
///
/// Weights are stored row-major as `input_size x output_size`, Xavier
/// initialized; biases start at zero. The post-activation output of the last
/// forward pass is cached so the backward pass can evaluate the activation
/// derivative without keeping pre-activation values.
pub struct DenseLayer {
    input_size: usize,
    output_size: usize,
    activation: Activation,
    weights: Parameter,
    biases: Parameter,
    last_output: RefCell<Vec<f32>>,
}

impl DenseLayer {
    /// Create a layer with Xavier-initialized weights and zero biases.
    pub fn new(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        rng: &mut SimpleRng,
    ) -> Self {
        Self {
            input_size,
            output_size,
            activation,
            weights: Parameter::xavier(input_size * output_size, input_size, output_size, rng),
            biases: Parameter::zeros(output_size),
            last_output: RefCell::new(Vec::new()),
        }
    }

    /// Output activation.
    pub fn activation(&self) -> Activation {
        self.activation
    }

    #[cfg(test)]
    fn set_weights(&mut self, weights: &[f32], biases: &[f32]) {
        self.weights.values_mut().copy_from_slice(weights);
        self.biases.values_mut().copy_from_slice(biases);
    }
}

impl Layer for DenseLayer {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        assert_eq!(input.len(), batch_size * self.input_size);
        assert_eq!(output.len(), batch_size * self.output_size);

        matmul(
            batch_size,
            self.output_size,
            self.input_size,
            input,
            self.input_size,
            self.weights.values(),
            self.output_size,
            output,
            self.output_size,
            false,
            false,
            1.0,
            0.0,
        );
        add_bias_rows(output, batch_size, self.output_size, self.biases.values());
        self.activation
            .apply_rows(output, batch_size, self.output_size);

        let mut cache = self.last_output.borrow_mut();
        cache.clear();
        cache.extend_from_slice(output);
    }

    fn backward(
        &self,
        input: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        assert_eq!(input.len(), batch_size * self.input_size);
        assert_eq!(grad_output.len(), batch_size * self.output_size);
        assert_eq!(grad_input.len(), input.len());

        let cache = self.last_output.borrow();
        assert_eq!(cache.len(), grad_output.len(), "backward without forward");

        // Gradient at the pre-activation, from the cached post-activation.
        let mut delta = vec![0.0f32; grad_output.len()];
        for i in 0..delta.len() {
            delta[i] = grad_output[i] * self.activation.derivative_from_output(cache[i]);
        }

        let scale = 1.0 / batch_size as f32;
        {
            let mut grad_b = self.biases.grad_mut();
            for row in delta.chunks_exact(self.output_size) {
                for (g, d) in grad_b.iter_mut().zip(row) {
                    *g += d * scale;
                }
            }
        }
        {
            // grad_W += scale * input^T * delta
            let mut grad_w = self.weights.grad_mut();
            matmul(
                self.input_size,
                self.output_size,
                batch_size,
                input,
                self.input_size,
                &delta,
                self.output_size,
                &mut grad_w,
                self.output_size,
                true,
                false,
                scale,
                1.0,
            );
        }
        // grad_input = delta * W^T
        matmul(
            batch_size,
            self.input_size,
            self.output_size,
            &delta,
            self.output_size,
            self.weights.values(),
            self.output_size,
            grad_input,
            self.input_size,
            false,
            true,
            1.0,
            0.0,
        );
    }

    fn set_optimizer(&mut self, spec: &OptimizerSpec) {
        self.weights.bind_optimizer(spec);
        self.biases.bind_optimizer(spec);
    }

    fn update_parameters(&mut self) {
        self.weights.apply_update();
        self.biases.apply_update();
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    fn name(&self) -> &'static str {
        "dense"
    }
}

/// Dense projection applied independently at every time step.
///
/// The input is a `steps x input_features` sequence per sample; each step is
/// mapped through the same `input_features x output_features` weights. Used
/// for per-step regression heads on recurrent outputs.
pub struct TimeDistributedDense {
    steps: usize,
    input_features: usize,
    output_features: usize,
    activation: Activation,
    weights: Parameter,
    biases: Parameter,
    last_output: RefCell<Vec<f32>>,
}

impl TimeDistributedDense {
    /// Create a per-step projection over a fixed number of steps.
    pub fn new(
        steps: usize,
        input_features: usize,
        output_features: usize,
        activation: Activation,
        rng: &mut SimpleRng,
    ) -> Self {
        Self {
            steps,
            input_features,
            output_features,
            activation,
            weights: Parameter::xavier(
                input_features * output_features,
                input_features,
                output_features,
                rng,
            ),
            biases: Parameter::zeros(output_features),
            last_output: RefCell::new(Vec::new()),
        }
    }

    /// Number of time steps.
    pub fn steps(&self) -> usize {
        self.steps
    }
}

impl Layer for TimeDistributedDense {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        let rows = batch_size * self.steps;
        assert_eq!(input.len(), rows * self.input_features);
        assert_eq!(output.len(), rows * self.output_features);

        // Every step is an independent row of the same affine map.
        matmul(
            rows,
            self.output_features,
            self.input_features,
            input,
            self.input_features,
            self.weights.values(),
            self.output_features,
            output,
            self.output_features,
            false,
            false,
            1.0,
            0.0,
        );
        add_bias_rows(output, rows, self.output_features, self.biases.values());
        self.activation.apply_rows(output, rows, self.output_features);

        let mut cache = self.last_output.borrow_mut();
        cache.clear();
        cache.extend_from_slice(output);
    }

    fn backward(
        &self,
        input: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        let rows = batch_size * self.steps;
        assert_eq!(input.len(), rows * self.input_features);
        assert_eq!(grad_output.len(), rows * self.output_features);
        assert_eq!(grad_input.len(), input.len());

        let cache = self.last_output.borrow();
        assert_eq!(cache.len(), grad_output.len(), "backward without forward");

        let mut delta = vec![0.0f32; grad_output.len()];
        for i in 0..delta.len() {
            delta[i] = grad_output[i] * self.activation.derivative_from_output(cache[i]);
        }

        let scale = 1.0 / batch_size as f32;
        {
            let mut grad_b = self.biases.grad_mut();
            for row in delta.chunks_exact(self.output_features) {
                for (g, d) in grad_b.iter_mut().zip(row) {
                    *g += d * scale;
                }
            }
        }
        {
            let mut grad_w = self.weights.grad_mut();
            matmul(
                self.input_features,
                self.output_features,
                rows,
                input,
                self.input_features,
                &delta,
                self.output_features,
                &mut grad_w,
                self.output_features,
                true,
                false,
                scale,
                1.0,
            );
        }
        matmul(
            rows,
            self.input_features,
            self.output_features,
            &delta,
            self.output_features,
            self.weights.values(),
            self.output_features,
            grad_input,
            self.input_features,
            false,
            true,
            1.0,
            0.0,
        );
    }

    fn set_optimizer(&mut self, spec: &OptimizerSpec) {
        self.weights.bind_optimizer(spec);
        self.biases.bind_optimizer(spec);
    }

    fn update_parameters(&mut self) {
        self.weights.apply_update();
        self.biases.apply_update();
    }

    fn input_size(&self) -> usize {
        self.steps * self.input_features
    }

    fn output_size(&self) -> usize {
        self.steps * self.output_features
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    fn name(&self) -> &'static str {
        "time_distributed_dense"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn dense_shapes_and_parameter_count() {
        let mut rng = SimpleRng::new(42);
        let layer = DenseLayer::new(10, 5, Activation::Linear, &mut rng);
        assert_eq!(layer.input_size(), 10);
        assert_eq!(layer.output_size(), 5);
        assert_eq!(layer.parameter_count(), 10 * 5 + 5);
    }

    #[test]
    fn dense_forward_known_weights() {
        let mut rng = SimpleRng::new(42);
        let mut layer = DenseLayer::new(2, 2, Activation::Linear, &mut rng);
        // W = [[1, 2], [3, 4]], b = [0.5, -0.5]; x = [1, 1].
        layer.set_weights(&[1.0, 2.0, 3.0, 4.0], &[0.5, -0.5]);
        let mut output = vec![0.0; 2];
        layer.forward(&[1.0, 1.0], &mut output, 1);
        assert_relative_eq!(output[0], 4.5, epsilon = 1e-5);
        assert_relative_eq!(output[1], 5.5, epsilon = 1e-5);
    }

    #[test]
    fn dense_softmax_rows_sum_to_one() {
        let mut rng = SimpleRng::new(7);
        let layer = DenseLayer::new(4, 3, Activation::Softmax, &mut rng);
        let input: Vec<f32> = (0..8).map(|i| i as f32 * 0.25).collect();
        let mut output = vec![0.0; 6];
        layer.forward(&input, &mut output, 2);
        for row in output.chunks_exact(3) {
            let sum: f32 = row.iter().sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn dense_gradient_check() {
        // Finite-difference check on a single weight and a bias, batch of 1 so
        // the internal 1/batch scaling is unity.
        let mut rng = SimpleRng::new(11);
        let mut layer = DenseLayer::new(3, 2, Activation::Tanh, &mut rng);
        let input = vec![0.3, -0.7, 0.5];
        let upstream = vec![1.0, -2.0];

        let loss = |layer: &DenseLayer| {
            let mut out = vec![0.0; 2];
            layer.forward(&input, &mut out, 1);
            out.iter().zip(&upstream).map(|(o, u)| o * u).sum::<f32>()
        };

        let mut out = vec![0.0; 2];
        layer.forward(&input, &mut out, 1);
        let mut grad_in = vec![0.0; 3];
        layer.backward(&input, &upstream, &mut grad_in, 1);
        let analytic_w0 = layer.weights.grads()[0];
        let analytic_b1 = layer.biases.grads()[1];

        let eps = 1e-3;
        let w0 = layer.weights.values()[0];
        layer.weights.values_mut()[0] = w0 + eps;
        let plus = loss(&layer);
        layer.weights.values_mut()[0] = w0 - eps;
        let minus = loss(&layer);
        layer.weights.values_mut()[0] = w0;
        assert_relative_eq!(
            analytic_w0,
            (plus - minus) / (2.0 * eps),
            epsilon = 1e-2,
            max_relative = 1e-2
        );

        let b1 = layer.biases.values()[1];
        layer.biases.values_mut()[1] = b1 + eps;
        let plus = loss(&layer);
        layer.biases.values_mut()[1] = b1 - eps;
        let minus = loss(&layer);
        layer.biases.values_mut()[1] = b1;
        assert_relative_eq!(
            analytic_b1,
            (plus - minus) / (2.0 * eps),
            epsilon = 1e-2,
            max_relative = 1e-2
        );
    }

    #[test]
    fn dense_input_gradient_check() {
        let mut rng = SimpleRng::new(13);
        let layer = DenseLayer::new(3, 2, Activation::Sigmoid, &mut rng);
        let input = vec![0.4, 0.9, -0.2];
        let upstream = vec![0.7, 1.3];

        let loss = |x: &[f32]| {
            let mut out = vec![0.0; 2];
            layer.forward(x, &mut out, 1);
            out.iter().zip(&upstream).map(|(o, u)| o * u).sum::<f32>()
        };

        let mut out = vec![0.0; 2];
        layer.forward(&input, &mut out, 1);
        let mut grad_in = vec![0.0; 3];
        layer.backward(&input, &upstream, &mut grad_in, 1);

        let eps = 1e-3;
        for i in 0..3 {
            let mut plus = input.clone();
            plus[i] += eps;
            let mut minus = input.clone();
            minus[i] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
            // Re-run forward on the unperturbed input so the cache matches.
            layer.forward(&input, &mut out, 1);
            assert_relative_eq!(grad_in[i], numeric, epsilon = 1e-2, max_relative = 1e-2);
        }
    }

    #[test]
    fn time_distributed_matches_per_step_dense() {
        // A 2-step sequence through TimeDistributedDense must equal running
        // each step through forward as its own batch row.
        let mut rng = SimpleRng::new(5);
        let td = TimeDistributedDense::new(2, 3, 2, Activation::Linear, &mut rng);
        let input: Vec<f32> = vec![0.1, 0.2, 0.3, -0.1, -0.2, -0.3];

        let mut seq_out = vec![0.0; 4];
        td.forward(&input, &mut seq_out, 1);

        let mut flat_out = vec![0.0; 4];
        // Same weights, treating the 2 steps as 2 batch rows of a 1-step layer.
        let one = TimeDistributedDense {
            steps: 1,
            input_features: 3,
            output_features: 2,
            activation: Activation::Linear,
            weights: Parameter::uniform(6, 0.0, 0.0, &mut rng),
            biases: Parameter::zeros(2),
            last_output: RefCell::new(Vec::new()),
        };
        let mut one = one;
        one.weights.values_mut().copy_from_slice(td.weights.values());
        one.forward(&input, &mut flat_out, 2);

        for (a, b) in seq_out.iter().zip(flat_out.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-5);
        }
    }

    #[test]
    fn time_distributed_sizes() {
        let mut rng = SimpleRng::new(9);
        let layer = TimeDistributedDense::new(8, 256, 1, Activation::Linear, &mut rng);
        assert_eq!(layer.input_size(), 8 * 256);
        assert_eq!(layer.output_size(), 8);
        assert_eq!(layer.parameter_count(), 256 + 1);
    }
}
