//! Embedding lookup table for token sequences.

use crate::layers::Layer;
use crate::optimizers::{OptimizerSpec, Parameter};
use crate::utils::SimpleRng;

/// Learned `vocab_size x embedding_dim` lookup table.
///
/// Inputs are token indices (stored as f32 like all layer data and truncated
/// to integers); each index becomes its table row, so a `T`-token sample
/// expands to a step-major `T x embedding_dim` sequence. The sequence width
/// is whatever the caller padded to, hence `variable_width`.
///
/// Index 0 is the conventional right-padding token; it embeds like any other
/// row and downstream pooling or recurrence is expected to tolerate it.
pub struct EmbeddingLayer {
    vocab_size: usize,
    embedding_dim: usize,
    table: Parameter,
}

impl EmbeddingLayer {
    /// Create a table with small uniform init in [-0.05, 0.05).
    ///
    /// # Panics
    ///
    /// Panics on an empty vocabulary or a zero embedding dimension.
    pub fn new(vocab_size: usize, embedding_dim: usize, rng: &mut SimpleRng) -> Self {
        assert!(vocab_size > 0, "vocabulary must not be empty");
        assert!(embedding_dim > 0, "embedding_dim must be greater than 0");
        Self {
            vocab_size,
            embedding_dim,
            table: Parameter::uniform(vocab_size * embedding_dim, -0.05, 0.05, rng),
        }
    }

    /// Number of rows (distinct tokens).
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Width of each embedding vector.
    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn token_at(&self, value: f32) -> usize {
        let idx = value as usize;
        assert!(
            value >= 0.0 && idx < self.vocab_size,
            "token index {} out of range for vocabulary of {}",
            value,
            self.vocab_size
        );
        idx
    }
}

impl Layer for EmbeddingLayer {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        assert!(
            batch_size > 0 && input.len() % batch_size == 0 && !input.is_empty(),
            "input length {} is not a whole number of samples",
            input.len()
        );
        assert_eq!(output.len(), input.len() * self.embedding_dim);

        let table = self.table.values();
        for (i, &token) in input.iter().enumerate() {
            let row = self.token_at(token) * self.embedding_dim;
            let out = i * self.embedding_dim;
            output[out..out + self.embedding_dim]
                .copy_from_slice(&table[row..row + self.embedding_dim]);
        }
    }

    fn backward(
        &self,
        input: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        assert_eq!(grad_output.len(), input.len() * self.embedding_dim);
        assert_eq!(grad_input.len(), input.len());

        let scale = 1.0 / batch_size as f32;
        let mut grad_table = self.table.grad_mut();

        for (i, &token) in input.iter().enumerate() {
            let row = self.token_at(token) * self.embedding_dim;
            let out = i * self.embedding_dim;
            for d in 0..self.embedding_dim {
                grad_table[row + d] += grad_output[out + d] * scale;
            }
        }

        // Token indices are discrete; nothing flows to the input.
        for v in grad_input.iter_mut() {
            *v = 0.0;
        }
    }

    fn set_optimizer(&mut self, spec: &OptimizerSpec) {
        self.table.bind_optimizer(spec);
    }

    fn update_parameters(&mut self) {
        self.table.apply_update();
    }

    fn input_size(&self) -> usize {
        1
    }

    fn output_size(&self) -> usize {
        self.embedding_dim
    }

    fn variable_width(&self) -> bool {
        true
    }

    fn output_len(&self, input_len: usize, _batch_size: usize) -> usize {
        input_len * self.embedding_dim
    }

    fn parameter_count(&self) -> usize {
        self.table.len()
    }

    fn name(&self) -> &'static str {
        "embedding"
    }
}
