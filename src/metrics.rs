//! Evaluation metrics tracked alongside the loss.

use crate::losses::Loss;

/// Metric identifier stored in the compilation spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Classification accuracy. Interpreted per the compiled loss: argmax
    /// match for categorical cross-entropy, 0.5-threshold match for binary
    /// cross-entropy, undefined for regression losses.
    Accuracy,
}

impl Metric {
    /// Short name used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Accuracy => "accuracy",
        }
    }

    /// Evaluate the metric for predictions under the given loss. Returns
    /// `None` when the metric is undefined for that loss (accuracy of a
    /// regression).
    pub fn evaluate(
        &self,
        loss: Loss,
        predictions: &[f32],
        targets: &[f32],
        classes: usize,
    ) -> Option<f32> {
        match (self, loss) {
            (Metric::Accuracy, Loss::CategoricalCrossentropy) => {
                Some(categorical_accuracy(predictions, targets, classes))
            }
            (Metric::Accuracy, Loss::BinaryCrossentropy) => {
                Some(binary_accuracy(predictions, targets))
            }
            (Metric::Accuracy, Loss::MeanSquaredError) => None,
        }
    }
}

/// Fraction of rows whose predicted argmax matches the target argmax.
///
/// # Panics
///
/// Panics if the buffers differ in length or are not whole rows of
/// `classes` values.
pub fn categorical_accuracy(predictions: &[f32], targets: &[f32], classes: usize) -> f32 {
    assert_eq!(predictions.len(), targets.len());
    assert!(
        classes > 0 && predictions.len() % classes == 0,
        "predictions are not whole rows of {} classes",
        classes
    );
    let rows = predictions.len() / classes;
    if rows == 0 {
        return 0.0;
    }

    let mut correct = 0usize;
    for (p_row, y_row) in predictions
        .chunks_exact(classes)
        .zip(targets.chunks_exact(classes))
    {
        if argmax(p_row) == argmax(y_row) {
            correct += 1;
        }
    }
    correct as f32 / rows as f32
}

/// Fraction of elements where `prediction > 0.5` agrees with `target > 0.5`.
pub fn binary_accuracy(predictions: &[f32], targets: &[f32]) -> f32 {
    assert_eq!(predictions.len(), targets.len());
    if predictions.is_empty() {
        return 0.0;
    }
    let correct = predictions
        .iter()
        .zip(targets)
        .filter(|(p, y)| (**p > 0.5) == (**y > 0.5))
        .count();
    correct as f32 / predictions.len() as f32
}

fn argmax(row: &[f32]) -> usize {
    let mut best = 0usize;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}
