//! Inverted dropout for regularization.

use std::cell::RefCell;

use crate::layers::Layer;
use crate::utils::SimpleRng;

/// Randomly zeroes units during training, scaling survivors by
/// `1 / (1 - drop_rate)` so the expected activation is unchanged. In
/// inference mode the layer is the identity.
///
/// The mask from the last training forward pass is cached so backward drops
/// and rescales the same positions.
pub struct DropoutLayer {
    size: usize,
    drop_rate: f32,
    training: bool,
    mask: RefCell<Vec<f32>>,
    rng: RefCell<SimpleRng>,
}

impl DropoutLayer {
    /// Create a dropout layer over `size` features per sample.
    ///
    /// # Panics
    ///
    /// Panics unless `drop_rate` lies in [0.0, 1.0).
    pub fn new(size: usize, drop_rate: f32, rng: &mut SimpleRng) -> Self {
        assert!(
            (0.0..1.0).contains(&drop_rate),
            "drop_rate must be in range [0.0, 1.0)"
        );
        Self {
            size,
            drop_rate,
            training: true,
            mask: RefCell::new(Vec::new()),
            rng: RefCell::new(rng.clone()),
        }
    }

    /// Configured drop probability.
    pub fn drop_rate(&self) -> f32 {
        self.drop_rate
    }

    /// True while the layer applies dropout.
    pub fn is_training(&self) -> bool {
        self.training
    }
}

impl Layer for DropoutLayer {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        assert_eq!(input.len(), batch_size * self.size);
        assert_eq!(output.len(), input.len());

        if !self.training || self.drop_rate == 0.0 {
            output.copy_from_slice(input);
            let mut mask = self.mask.borrow_mut();
            mask.clear();
            return;
        }

        let keep_scale = 1.0 / (1.0 - self.drop_rate);
        let mut mask = self.mask.borrow_mut();
        mask.clear();
        mask.resize(input.len(), 0.0);

        let mut rng = self.rng.borrow_mut();
        for i in 0..input.len() {
            let keep = rng.next_f32() >= self.drop_rate;
            let m = if keep { keep_scale } else { 0.0 };
            mask[i] = m;
            output[i] = input[i] * m;
        }
    }

    fn backward(
        &self,
        input: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        _batch_size: usize,
    ) {
        assert_eq!(grad_output.len(), input.len());
        assert_eq!(grad_input.len(), input.len());

        let mask = self.mask.borrow();
        if mask.is_empty() {
            grad_input.copy_from_slice(grad_output);
            return;
        }
        assert_eq!(mask.len(), grad_output.len(), "backward without forward");
        for i in 0..grad_output.len() {
            grad_input[i] = grad_output[i] * mask[i];
        }
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn input_size(&self) -> usize {
        self.size
    }

    fn output_size(&self) -> usize {
        self.size
    }

    fn parameter_count(&self) -> usize {
        0
    }

    fn name(&self) -> &'static str {
        "dropout"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_mode_is_identity() {
        let mut rng = SimpleRng::new(42);
        let mut layer = DropoutLayer::new(4, 0.5, &mut rng);
        layer.set_training(false);

        let input = vec![1.0, -2.0, 3.0, -4.0];
        let mut output = vec![0.0; 4];
        layer.forward(&input, &mut output, 1);
        assert_eq!(output, input);
    }

    #[test]
    fn training_zeroes_and_rescales() {
        let mut rng = SimpleRng::new(42);
        let layer = DropoutLayer::new(1000, 0.5, &mut rng);
        let input = vec![1.0; 1000];
        let mut output = vec![0.0; 1000];
        layer.forward(&input, &mut output, 1);

        let dropped = output.iter().filter(|&&v| v == 0.0).count();
        let kept = output.iter().filter(|&&v| (v - 2.0).abs() < 1e-6).count();
        assert_eq!(dropped + kept, 1000);
        // Around half drop; loose bounds to keep the test deterministic-safe.
        assert!(dropped > 350 && dropped < 650);
    }

    #[test]
    fn backward_reuses_forward_mask() {
        let mut rng = SimpleRng::new(7);
        let layer = DropoutLayer::new(100, 0.3, &mut rng);
        let input = vec![1.0; 100];
        let mut output = vec![0.0; 100];
        layer.forward(&input, &mut output, 1);

        let grad_output = vec![1.0; 100];
        let mut grad_input = vec![0.0; 100];
        layer.backward(&input, &grad_output, &mut grad_input, 1);
        // Gradient passes exactly where the forward pass kept the unit.
        for (o, g) in output.iter().zip(grad_input.iter()) {
            assert_eq!(o, g);
        }
    }

    #[test]
    #[should_panic(expected = "drop_rate")]
    fn rejects_rate_of_one() {
        let mut rng = SimpleRng::new(42);
        let _ = DropoutLayer::new(4, 1.0, &mut rng);
    }

    #[test]
    fn zero_rate_passes_through_in_training() {
        let mut rng = SimpleRng::new(42);
        let layer = DropoutLayer::new(3, 0.0, &mut rng);
        let input = vec![1.0, 2.0, 3.0];
        let mut output = vec![0.0; 3];
        layer.forward(&input, &mut output, 1);
        assert_eq!(output, input);
    }
}
