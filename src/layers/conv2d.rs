//! 2-D convolutional layer.
//!
//! Explicit-loop convolution over channel-major (C, H, W) planes. Square
//! kernels, symmetric zero padding, configurable stride. Slow compared to an
//! im2col/GEMM formulation but easy to audit.

use std::cell::RefCell;

use crate::layers::Layer;
use crate::optimizers::{OptimizerSpec, Parameter};
use crate::utils::{Activation, SimpleRng};

/// 2-D convolution with learnable filters and an owned activation.
///
/// Filters are stored as `out_channels x in_channels x kernel x kernel`,
/// Xavier initialized over `fan = channels * kernel^2`. Samples are flattened
/// channel-major: channel plane 0 row-major, then plane 1, and so on.
pub struct Conv2DLayer {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    padding: isize,
    stride: usize,
    input_height: usize,
    input_width: usize,
    activation: Activation,
    weights: Parameter,
    biases: Parameter,
    last_output: RefCell<Vec<f32>>,
}

impl Conv2DLayer {
    /// Create a convolution layer.
    ///
    /// # Panics
    ///
    /// Panics if `kernel_size` or `stride` is zero, or if the kernel does not
    /// fit the padded input at least once.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        padding: isize,
        stride: usize,
        input_height: usize,
        input_width: usize,
        activation: Activation,
        rng: &mut SimpleRng,
    ) -> Self {
        assert!(kernel_size > 0, "kernel_size must be greater than 0");
        assert!(stride > 0, "stride must be greater than 0");
        assert!(
            input_height as isize + 2 * padding >= kernel_size as isize
                && input_width as isize + 2 * padding >= kernel_size as isize,
            "kernel does not fit the padded input"
        );

        let fan_in = in_channels * kernel_size * kernel_size;
        let fan_out = out_channels * kernel_size * kernel_size;
        let weight_count = out_channels * in_channels * kernel_size * kernel_size;

        Self {
            in_channels,
            out_channels,
            kernel_size,
            padding,
            stride,
            input_height,
            input_width,
            activation,
            weights: Parameter::xavier(weight_count, fan_in, fan_out, rng),
            biases: Parameter::zeros(out_channels),
            last_output: RefCell::new(Vec::new()),
        }
    }

    /// Number of output feature maps.
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Output height: (H + 2*padding - kernel) / stride + 1.
    pub fn output_height(&self) -> usize {
        ((self.input_height as isize + 2 * self.padding - self.kernel_size as isize)
            / self.stride as isize
            + 1) as usize
    }

    /// Output width: (W + 2*padding - kernel) / stride + 1.
    pub fn output_width(&self) -> usize {
        ((self.input_width as isize + 2 * self.padding - self.kernel_size as isize)
            / self.stride as isize
            + 1) as usize
    }
}

impl Layer for Conv2DLayer {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        let out_h = self.output_height();
        let out_w = self.output_width();
        let out_spatial = out_h * out_w;
        let in_spatial = self.input_height * self.input_width;
        assert_eq!(input.len(), batch_size * self.in_channels * in_spatial);
        assert_eq!(output.len(), batch_size * self.out_channels * out_spatial);

        let weights = self.weights.values();
        let biases = self.biases.values();

        for b in 0..batch_size {
            let in_base = b * (self.in_channels * in_spatial);
            let out_base_b = b * (self.out_channels * out_spatial);

            for oc in 0..self.out_channels {
                let bias = biases[oc];
                let out_base = out_base_b + oc * out_spatial;

                for oy in 0..out_h {
                    for ox in 0..out_w {
                        let mut sum = bias;

                        for ic in 0..self.in_channels {
                            let w_base =
                                (oc * self.in_channels + ic) * self.kernel_size * self.kernel_size;
                            let in_base_c = in_base + ic * in_spatial;

                            for ky in 0..self.kernel_size {
                                for kx in 0..self.kernel_size {
                                    let iy = oy as isize * self.stride as isize + ky as isize
                                        - self.padding;
                                    let ix = ox as isize * self.stride as isize + kx as isize
                                        - self.padding;

                                    if iy >= 0
                                        && iy < self.input_height as isize
                                        && ix >= 0
                                        && ix < self.input_width as isize
                                    {
                                        let in_idx = in_base_c
                                            + iy as usize * self.input_width
                                            + ix as usize;
                                        let w_idx = w_base + ky * self.kernel_size + kx;
                                        sum += input[in_idx] * weights[w_idx];
                                    }
                                }
                            }
                        }

                        output[out_base + oy * out_w + ox] = sum;
                    }
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
        let out_h = self.output_height();
        let out_w = self.output_width();
        let out_spatial = out_h * out_w;
        let in_spatial = self.input_height * self.input_width;
        assert_eq!(grad_output.len(), batch_size * self.out_channels * out_spatial);
        assert_eq!(grad_input.len(), input.len());

        let cache = self.last_output.borrow();
        assert_eq!(cache.len(), grad_output.len(), "backward without forward");

        let mut delta = vec![0.0f32; grad_output.len()];
        for i in 0..delta.len() {
            delta[i] = grad_output[i] * self.activation.derivative_from_output(cache[i]);
        }

        let scale = 1.0f32 / batch_size as f32;
        let weights = self.weights.values();
        let mut grad_w = self.weights.grad_mut();
        let mut grad_b = self.biases.grad_mut();

        for v in grad_input.iter_mut() {
            *v = 0.0;
        }

        for b in 0..batch_size {
            let in_base = b * (self.in_channels * in_spatial);
            let g_base_b = b * (self.out_channels * out_spatial);

            for oc in 0..self.out_channels {
                let g_base = g_base_b + oc * out_spatial;

                for oy in 0..out_h {
                    for ox in 0..out_w {
                        let g = delta[g_base + oy * out_w + ox];
                        grad_b[oc] += g * scale;

                        for ic in 0..self.in_channels {
                            let w_base =
                                (oc * self.in_channels + ic) * self.kernel_size * self.kernel_size;
                            let in_base_c = in_base + ic * in_spatial;

                            for ky in 0..self.kernel_size {
                                for kx in 0..self.kernel_size {
                                    let iy = oy as isize * self.stride as isize + ky as isize
                                        - self.padding;
                                    let ix = ox as isize * self.stride as isize + kx as isize
                                        - self.padding;

                                    if iy >= 0
                                        && iy < self.input_height as isize
                                        && ix >= 0
                                        && ix < self.input_width as isize
                                    {
                                        let in_idx = in_base_c
                                            + iy as usize * self.input_width
                                            + ix as usize;
                                        let w_idx = w_base + ky * self.kernel_size + kx;

                                        grad_w[w_idx] += g * input[in_idx] * scale;
                                        grad_input[in_idx] += g * weights[w_idx];
                                    }
                                }
                            }
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
        self.in_channels * self.input_height * self.input_width
    }

    fn output_size(&self) -> usize {
        self.out_channels * self.output_height() * self.output_width()
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    fn name(&self) -> &'static str {
        "conv2d"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn output_dimensions_valid_padding() {
        let mut rng = SimpleRng::new(42);
        let layer = Conv2DLayer::new(1, 8, 3, 0, 1, 28, 28, Activation::Relu, &mut rng);
        assert_eq!(layer.output_height(), 26);
        assert_eq!(layer.output_width(), 26);
        assert_eq!(layer.output_size(), 8 * 26 * 26);
    }

    #[test]
    fn output_dimensions_same_padding() {
        let mut rng = SimpleRng::new(42);
        let layer = Conv2DLayer::new(1, 8, 3, 1, 1, 28, 28, Activation::Relu, &mut rng);
        assert_eq!(layer.output_height(), 28);
        assert_eq!(layer.output_width(), 28);
    }

    #[test]
    fn parameter_count_counts_filters_and_biases() {
        let mut rng = SimpleRng::new(42);
        let layer = Conv2DLayer::new(1, 8, 3, 0, 1, 28, 28, Activation::Relu, &mut rng);
        assert_eq!(layer.parameter_count(), 8 * 9 + 8);
    }

    #[test]
    fn forward_known_kernel_sums_window() {
        // All-ones 2x2 kernel over a 3x3 ramp: each output is the window sum.
        let mut rng = SimpleRng::new(1);
        let mut layer = Conv2DLayer::new(1, 1, 2, 0, 1, 3, 3, Activation::Linear, &mut rng);
        for w in layer.weights.values_mut() {
            *w = 1.0;
        }
        let input: Vec<f32> = (1..=9).map(|v| v as f32).collect();
        let mut output = vec![0.0; 4];
        layer.forward(&input, &mut output, 1);
        assert_eq!(output, vec![12.0, 16.0, 24.0, 28.0]);
    }

    #[test]
    fn gradient_check_single_weight() {
        let mut rng = SimpleRng::new(3);
        let mut layer = Conv2DLayer::new(1, 2, 2, 0, 1, 3, 3, Activation::Linear, &mut rng);
        let input: Vec<f32> = (0..9).map(|v| 0.1 * v as f32 - 0.4).collect();
        let upstream = vec![0.5f32; 8];

        let loss = |layer: &Conv2DLayer| {
            let mut out = vec![0.0; 8];
            layer.forward(&input, &mut out, 1);
            out.iter().zip(&upstream).map(|(o, u)| o * u).sum::<f32>()
        };

        let mut out = vec![0.0; 8];
        layer.forward(&input, &mut out, 1);
        let mut grad_in = vec![0.0; 9];
        layer.backward(&input, &upstream, &mut grad_in, 1);
        let analytic = layer.weights.grads()[3];

        let eps = 1e-3;
        let w = layer.weights.values()[3];
        layer.weights.values_mut()[3] = w + eps;
        let plus = loss(&layer);
        layer.weights.values_mut()[3] = w - eps;
        let minus = loss(&layer);
        assert_relative_eq!(
            analytic,
            (plus - minus) / (2.0 * eps),
            epsilon = 1e-2,
            max_relative = 1e-2
        );
    }

    #[test]
    #[should_panic(expected = "kernel does not fit")]
    fn kernel_larger_than_input_panics() {
        let mut rng = SimpleRng::new(42);
        let _ = Conv2DLayer::new(1, 1, 5, 0, 1, 3, 3, Activation::Linear, &mut rng);
    }
}
