//! 1-D convolutional layer for token sequences.
//!
//! Operates on step-major (steps x channels) sequences whose step count is
//! only known at call time, so the layer is width-agnostic: the number of
//! steps is recovered from the input length on every pass.

use std::cell::RefCell;

use crate::layers::Layer;
use crate::optimizers::{OptimizerSpec, Parameter};
use crate::utils::{Activation, SimpleRng};

/// Valid-padding, stride-1 convolution along the sequence dimension.
///
/// Filters are stored as `filters x kernel x in_channels`. An input of `T`
/// steps yields `T - kernel + 1` output steps of `filters` features each.
pub struct Conv1DLayer {
    in_channels: usize,
    filters: usize,
    kernel_size: usize,
    activation: Activation,
    weights: Parameter,
    biases: Parameter,
    last_output: RefCell<Vec<f32>>,
}

impl Conv1DLayer {
    /// Create a sequence convolution.
    ///
    /// # Panics
    ///
    /// Panics if `in_channels`, `filters`, or `kernel_size` is zero.
    pub fn new(
        in_channels: usize,
        filters: usize,
        kernel_size: usize,
        activation: Activation,
        rng: &mut SimpleRng,
    ) -> Self {
        assert!(in_channels > 0, "in_channels must be greater than 0");
        assert!(filters > 0, "filters must be greater than 0");
        assert!(kernel_size > 0, "kernel_size must be greater than 0");

        let fan_in = in_channels * kernel_size;
        let fan_out = filters * kernel_size;
        Self {
            in_channels,
            filters,
            kernel_size,
            activation,
            weights: Parameter::xavier(
                filters * kernel_size * in_channels,
                fan_in,
                fan_out,
                rng,
            ),
            biases: Parameter::zeros(filters),
            last_output: RefCell::new(Vec::new()),
        }
    }

    /// Number of filters (output features per step).
    pub fn filters(&self) -> usize {
        self.filters
    }

    /// Kernel width in steps.
    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    fn steps_for(&self, input_len: usize, batch_size: usize) -> usize {
        let per_sample = self.in_channels * batch_size;
        assert!(
            per_sample > 0 && input_len % per_sample == 0,
            "input length {} is not a whole number of {}-feature steps",
            input_len,
            self.in_channels
        );
        let steps = input_len / per_sample;
        assert!(
            steps >= self.kernel_size,
            "sequence of {} steps is shorter than the kernel ({})",
            steps,
            self.kernel_size
        );
        steps
    }
}

impl Layer for Conv1DLayer {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        let steps = self.steps_for(input.len(), batch_size);
        let out_steps = steps - self.kernel_size + 1;
        assert_eq!(output.len(), batch_size * out_steps * self.filters);

        let weights = self.weights.values();
        let biases = self.biases.values();
        let in_stride = steps * self.in_channels;
        let out_stride = out_steps * self.filters;

        for b in 0..batch_size {
            let in_base = b * in_stride;
            let out_base = b * out_stride;

            for t in 0..out_steps {
                for f in 0..self.filters {
                    let mut sum = biases[f];
                    let w_base = f * self.kernel_size * self.in_channels;

                    for dt in 0..self.kernel_size {
                        let in_step = in_base + (t + dt) * self.in_channels;
                        let w_step = w_base + dt * self.in_channels;
                        for c in 0..self.in_channels {
                            sum += input[in_step + c] * weights[w_step + c];
                        }
                    }

                    output[out_base + t * self.filters + f] = sum;
                }
            }
        }

        self.activation.apply_rows(output, 1, output.len());

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
        let steps = self.steps_for(input.len(), batch_size);
        let out_steps = steps - self.kernel_size + 1;
        assert_eq!(grad_output.len(), batch_size * out_steps * self.filters);
        assert_eq!(grad_input.len(), input.len());

        let cache = self.last_output.borrow();
        assert_eq!(cache.len(), grad_output.len(), "backward without forward");

        let mut delta = vec![0.0f32; grad_output.len()];
        for i in 0..delta.len() {
            delta[i] = grad_output[i] * self.activation.derivative_from_output(cache[i]);
        }

        let scale = 1.0 / batch_size as f32;
        let weights = self.weights.values();
        let mut grad_w = self.weights.grad_mut();
        let mut grad_b = self.biases.grad_mut();
        let in_stride = steps * self.in_channels;
        let out_stride = out_steps * self.filters;

        for v in grad_input.iter_mut() {
            *v = 0.0;
        }

        for b in 0..batch_size {
            let in_base = b * in_stride;
            let out_base = b * out_stride;

            for t in 0..out_steps {
                for f in 0..self.filters {
                    let g = delta[out_base + t * self.filters + f];
                    grad_b[f] += g * scale;
                    let w_base = f * self.kernel_size * self.in_channels;

                    for dt in 0..self.kernel_size {
                        let in_step = in_base + (t + dt) * self.in_channels;
                        let w_step = w_base + dt * self.in_channels;
                        for c in 0..self.in_channels {
                            grad_w[w_step + c] += g * input[in_step + c] * scale;
                            grad_input[in_step + c] += g * weights[w_step + c];
                        }
                    }
                }
            }
        }
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
        self.in_channels
    }

    fn output_size(&self) -> usize {
        self.filters
    }

    fn variable_width(&self) -> bool {
        true
    }

    fn output_len(&self, input_len: usize, batch_size: usize) -> usize {
        let steps = self.steps_for(input_len, batch_size);
        batch_size * (steps - self.kernel_size + 1) * self.filters
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    fn name(&self) -> &'static str {
        "conv1d"
    }
}
