//! Loss functions bound to a model at compile time.
//!
//! Each loss provides the batch-mean scalar and the gradient the output layer
//! consumes. The gradient convention matches the layers' internal 1/batch
//! scaling: `output_gradient` produces per-sample gradients, and layers scale
//! their parameter gradients by 1/batch during backward.

/// Clamp bound for probabilities inside logarithms and divisions.
const PROB_EPSILON: f32 = 1e-7;

/// Loss identifier stored in the compilation spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loss {
    /// Mean squared error over all output elements; pairs with a linear
    /// output layer.
    MeanSquaredError,
    /// Categorical cross-entropy over mutually exclusive classes; pairs with
    /// a softmax output layer, and its gradient is taken directly with
    /// respect to the logits (the softmax derivative is folded in).
    CategoricalCrossentropy,
    /// Binary cross-entropy over independent per-class probabilities; pairs
    /// with a sigmoid output layer and differentiates through it.
    BinaryCrossentropy,
}

impl Loss {
    /// Batch-mean loss value.
    ///
    /// # Panics
    ///
    /// Panics if `predictions` and `targets` differ in length or
    /// `batch_size` does not divide them.
    pub fn compute(&self, predictions: &[f32], targets: &[f32], batch_size: usize) -> f32 {
        assert_eq!(
            predictions.len(),
            targets.len(),
            "predictions and targets must have the same length"
        );
        assert!(
            batch_size > 0 && predictions.len() % batch_size == 0,
            "batch size {} does not divide {} outputs",
            batch_size,
            predictions.len()
        );

        match self {
            Loss::MeanSquaredError => {
                let sum: f32 = predictions
                    .iter()
                    .zip(targets)
                    .map(|(p, y)| (p - y) * (p - y))
                    .sum();
                sum / predictions.len() as f32
            }
            Loss::CategoricalCrossentropy => {
                let sum: f32 = predictions
                    .iter()
                    .zip(targets)
                    .map(|(p, y)| -y * p.max(PROB_EPSILON).ln())
                    .sum();
                sum / batch_size as f32
            }
            Loss::BinaryCrossentropy => {
                let sum: f32 = predictions
                    .iter()
                    .zip(targets)
                    .map(|(p, y)| {
                        let p = p.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON);
                        -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
                    })
                    .sum();
                sum / predictions.len() as f32
            }
        }
    }

    /// Gradient of the per-sample loss with respect to the output layer's
    /// activation (or, for categorical cross-entropy, its logits).
    pub fn output_gradient(
        &self,
        predictions: &[f32],
        targets: &[f32],
        grad: &mut [f32],
        batch_size: usize,
    ) {
        assert_eq!(predictions.len(), targets.len());
        assert_eq!(grad.len(), predictions.len());
        assert!(batch_size > 0 && predictions.len() % batch_size == 0);
        let per_sample = predictions.len() / batch_size;

        match self {
            Loss::MeanSquaredError => {
                // d/dp of mean_j (p_j - y_j)^2 within each sample.
                for i in 0..grad.len() {
                    grad[i] = 2.0 * (predictions[i] - targets[i]) / per_sample as f32;
                }
            }
            Loss::CategoricalCrossentropy => {
                // With respect to the softmax logits.
                for i in 0..grad.len() {
                    grad[i] = predictions[i] - targets[i];
                }
            }
            Loss::BinaryCrossentropy => {
                // With respect to the sigmoid output; the layer's sigmoid
                // derivative p(1-p) cancels this denominator.
                for i in 0..grad.len() {
                    let p = predictions[i].clamp(PROB_EPSILON, 1.0 - PROB_EPSILON);
                    grad[i] = (p - targets[i]) / (p * (1.0 - p) * per_sample as f32);
                }
            }
        }
    }

    /// Short name used in model summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Loss::MeanSquaredError => "mse",
            Loss::CategoricalCrossentropy => "categorical_crossentropy",
            Loss::BinaryCrossentropy => "binary_crossentropy",
        }
    }
}
