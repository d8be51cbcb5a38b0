//! Sequential model container and compilation spec.
//!
//! A [`Sequential`] owns an ordered stack of layers. [`compile`](Sequential::compile)
//! validates the topology, binds the loss, optimizer, and metrics, and must
//! succeed before any training call. The epoch loop, data loading, and metric
//! reporting live with the caller; the model only offers single-batch
//! primitives.

use std::error::Error;

use crate::layers::Layer;
use crate::losses::Loss;
use crate::metrics::Metric;
use crate::optimizers::OptimizerSpec;

/// Loss, optimizer configuration, and tracked metrics bound at compile time.
#[derive(Debug, Clone)]
pub struct CompileSpec {
    pub loss: Loss,
    pub optimizer: OptimizerSpec,
    pub metrics: Vec<Metric>,
}

fn config_error(message: String) -> Box<dyn Error> {
    Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message,
    ))
}

/// Ordered layer stack with an optional compilation spec.
#[derive(Default)]
pub struct Sequential {
    layers: Vec<Box<dyn Layer>>,
    spec: Option<CompileSpec>,
}

impl Sequential {
    /// Create an empty model.
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            spec: None,
        }
    }

    /// Append a layer to the stack.
    pub fn add(&mut self, layer: Box<dyn Layer>) {
        self.layers.push(layer);
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// True for a model with no layers.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// The layer stack, for inspection.
    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    /// The compilation spec, once compiled.
    pub fn compile_spec(&self) -> Option<&CompileSpec> {
        self.spec.as_ref()
    }

    /// Validate the topology and bind loss, optimizer, and metrics.
    ///
    /// Checks that the model is non-empty, that every layer reports positive
    /// sizes, and that each layer's output width matches the next layer's
    /// input width. On success each layer receives its own optimizer
    /// instances built from `optimizer`.
    pub fn compile(
        &mut self,
        loss: Loss,
        optimizer: OptimizerSpec,
        metrics: Vec<Metric>,
    ) -> Result<(), Box<dyn Error>> {
        if self.layers.is_empty() {
            return Err(config_error(
                "model must have at least one layer".to_string(),
            ));
        }

        for (i, layer) in self.layers.iter().enumerate() {
            if layer.input_size() == 0 || layer.output_size() == 0 {
                return Err(config_error(format!(
                    "Layer {} ({}): sizes must be greater than 0 (got {} -> {})",
                    i,
                    layer.name(),
                    layer.input_size(),
                    layer.output_size()
                )));
            }
        }

        for i in 0..self.layers.len() - 1 {
            let current = &self.layers[i];
            let next = &self.layers[i + 1];
            if current.output_size() != next.input_size() {
                return Err(config_error(format!(
                    "Layer connection mismatch: Layer {} ({}) output size ({}) does not match Layer {} ({}) input size ({})",
                    i,
                    current.name(),
                    current.output_size(),
                    i + 1,
                    next.name(),
                    next.input_size()
                )));
            }
        }

        for layer in &mut self.layers {
            layer.set_optimizer(&optimizer);
        }
        self.spec = Some(CompileSpec {
            loss,
            optimizer,
            metrics,
        });
        Ok(())
    }

    /// True once `compile` has succeeded.
    pub fn is_compiled(&self) -> bool {
        self.spec.is_some()
    }

    /// Switch every layer between training and inference behavior.
    pub fn set_training(&mut self, training: bool) {
        for layer in &mut self.layers {
            layer.set_training(training);
        }
    }

    /// Inference-mode forward pass; returns the final output buffer.
    ///
    /// Leaves the model in inference mode. Works on an uncompiled model.
    pub fn predict(
        &mut self,
        input: &[f32],
        batch_size: usize,
    ) -> Result<Vec<f32>, Box<dyn Error>> {
        self.set_training(false);
        let mut activations = self.forward_chain(input, batch_size)?;
        Ok(activations.pop().expect("non-empty model"))
    }

    /// One gradient step on a batch: forward, loss, backward, update.
    ///
    /// Returns the batch loss. Fails if the model has not been compiled or
    /// if buffer lengths do not match the topology. Leaves the model in
    /// training mode.
    pub fn train_batch(
        &mut self,
        input: &[f32],
        targets: &[f32],
        batch_size: usize,
    ) -> Result<f32, Box<dyn Error>> {
        let spec = self
            .spec
            .clone()
            .ok_or_else(|| config_error("model must be compiled before training".to_string()))?;

        self.set_training(true);
        let activations = self.forward_chain(input, batch_size)?;
        let output = activations.last().expect("non-empty model");
        if targets.len() != output.len() {
            return Err(config_error(format!(
                "target length {} does not match output length {}",
                targets.len(),
                output.len()
            )));
        }

        let loss_value = spec.loss.compute(output, targets, batch_size);

        let mut grad = vec![0.0f32; output.len()];
        spec.loss
            .output_gradient(output, targets, &mut grad, batch_size);

        for i in (0..self.layers.len()).rev() {
            let layer_input: &[f32] = if i == 0 { input } else { &activations[i - 1] };
            let mut grad_input = vec![0.0f32; layer_input.len()];
            self.layers[i].backward(layer_input, &grad, &mut grad_input, batch_size);
            grad = grad_input;
        }

        for layer in &mut self.layers {
            layer.update_parameters();
        }

        Ok(loss_value)
    }

    /// Inference-mode loss plus the compiled metrics on a batch.
    pub fn evaluate(
        &mut self,
        input: &[f32],
        targets: &[f32],
        batch_size: usize,
    ) -> Result<(f32, Vec<(Metric, f32)>), Box<dyn Error>> {
        let spec = self
            .spec
            .clone()
            .ok_or_else(|| config_error("model must be compiled before evaluation".to_string()))?;

        self.set_training(false);
        let activations = self.forward_chain(input, batch_size)?;
        let output = activations.last().expect("non-empty model");
        if targets.len() != output.len() {
            return Err(config_error(format!(
                "target length {} does not match output length {}",
                targets.len(),
                output.len()
            )));
        }

        let loss_value = spec.loss.compute(output, targets, batch_size);
        let classes = self.output_size();
        let mut results = Vec::new();
        for metric in &spec.metrics {
            if let Some(value) = metric.evaluate(spec.loss, output, targets, classes) {
                results.push((*metric, value));
            }
        }
        Ok((loss_value, results))
    }

    /// Input width of the first layer (per time step for variable-width
    /// models).
    pub fn input_size(&self) -> usize {
        self.layers.first().map(|l| l.input_size()).unwrap_or(0)
    }

    /// Output width of the final layer.
    pub fn output_size(&self) -> usize {
        self.layers.last().map(|l| l.output_size()).unwrap_or(0)
    }

    /// Total trainable scalars across all layers.
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|l| l.parameter_count()).sum()
    }

    /// Human-readable architecture description: one line per layer plus the
    /// compiled loss and learning rate. Two models built the same way print
    /// the same summary regardless of their random weights.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for layer in &self.layers {
            out.push_str(&format!(
                "{}: {} -> {} ({} params)\n",
                layer.name(),
                layer.input_size(),
                layer.output_size(),
                layer.parameter_count()
            ));
        }
        out.push_str(&format!("total params: {}\n", self.parameter_count()));
        if let Some(spec) = &self.spec {
            let metrics: Vec<&str> = spec.metrics.iter().map(|m| m.label()).collect();
            out.push_str(&format!(
                "loss: {}, learning rate: {}, metrics: [{}]\n",
                spec.loss.label(),
                spec.optimizer.learning_rate(),
                metrics.join(", ")
            ));
        }
        out
    }

    /// Run the forward pass, collecting every layer's output.
    fn forward_chain(
        &self,
        input: &[f32],
        batch_size: usize,
    ) -> Result<Vec<Vec<f32>>, Box<dyn Error>> {
        if self.layers.is_empty() {
            return Err(config_error("model has no layers".to_string()));
        }
        if batch_size == 0 {
            return Err(config_error("batch size must be greater than 0".to_string()));
        }

        let first = &self.layers[0];
        let expected = batch_size * first.input_size();
        if first.variable_width() {
            if input.is_empty() || expected == 0 || input.len() % expected != 0 {
                return Err(config_error(format!(
                    "input length {} is not a whole number of {}-wide steps for batch size {}",
                    input.len(),
                    first.input_size(),
                    batch_size
                )));
            }
        } else if input.len() != expected {
            return Err(config_error(format!(
                "input length {} does not match batch size {} x input size {}",
                input.len(),
                batch_size,
                first.input_size()
            )));
        }

        let mut activations: Vec<Vec<f32>> = Vec::with_capacity(self.layers.len());
        for (i, layer) in self.layers.iter().enumerate() {
            let current: &[f32] = if i == 0 { input } else { &activations[i - 1] };
            let mut output = vec![0.0f32; layer.output_len(current.len(), batch_size)];
            layer.forward(current, &mut output, batch_size);
            activations.push(output);
        }
        Ok(activations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::DenseLayer;
    use crate::utils::{Activation, SimpleRng};

    fn two_layer_model(rng: &mut SimpleRng) -> Sequential {
        let mut model = Sequential::new();
        model.add(Box::new(DenseLayer::new(3, 4, Activation::Tanh, rng)));
        model.add(Box::new(DenseLayer::new(4, 2, Activation::Linear, rng)));
        model
    }

    #[test]
    fn compile_accepts_matching_chain() {
        let mut rng = SimpleRng::new(42);
        let mut model = two_layer_model(&mut rng);
        assert!(model
            .compile(Loss::MeanSquaredError, OptimizerSpec::adam(), Vec::new())
            .is_ok());
        assert!(model.is_compiled());
    }

    #[test]
    fn compile_rejects_size_mismatch() {
        let mut rng = SimpleRng::new(42);
        let mut model = Sequential::new();
        model.add(Box::new(DenseLayer::new(3, 4, Activation::Tanh, &mut rng)));
        model.add(Box::new(DenseLayer::new(5, 2, Activation::Linear, &mut rng)));
        let err = model
            .compile(Loss::MeanSquaredError, OptimizerSpec::adam(), Vec::new())
            .unwrap_err();
        assert!(err.to_string().contains("connection mismatch"));
    }

    #[test]
    fn compile_rejects_empty_model() {
        let mut model = Sequential::new();
        assert!(model
            .compile(Loss::MeanSquaredError, OptimizerSpec::adam(), Vec::new())
            .is_err());
    }

    #[test]
    fn train_before_compile_fails() {
        let mut rng = SimpleRng::new(42);
        let mut model = two_layer_model(&mut rng);
        let err = model.train_batch(&[0.0; 3], &[0.0; 2], 1).unwrap_err();
        assert!(err.to_string().contains("compiled before training"));
    }

    #[test]
    fn predict_works_without_compile() {
        let mut rng = SimpleRng::new(42);
        let mut model = two_layer_model(&mut rng);
        let output = model.predict(&[0.1, 0.2, 0.3], 1).unwrap();
        assert_eq!(output.len(), 2);
    }

    #[test]
    fn predict_rejects_bad_input_length() {
        let mut rng = SimpleRng::new(42);
        let mut model = two_layer_model(&mut rng);
        assert!(model.predict(&[0.1, 0.2], 1).is_err());
        assert!(model.predict(&[0.1; 6], 0).is_err());
    }

    #[test]
    fn train_batch_reduces_loss_on_linear_task() {
        // y = [x0 + x1, x2]; a linear model with SGD must fit it quickly.
        let mut rng = SimpleRng::new(7);
        let mut model = Sequential::new();
        model.add(Box::new(DenseLayer::new(3, 2, Activation::Linear, &mut rng)));
        model
            .compile(Loss::MeanSquaredError, OptimizerSpec::sgd(0.1), Vec::new())
            .unwrap();

        let input = vec![0.5, 0.25, -0.5, -0.25, 1.0, 0.75];
        let targets = vec![0.75, -0.5, 0.75, 0.75];

        let first = model.train_batch(&input, &targets, 2).unwrap();
        let mut last = first;
        for _ in 0..200 {
            last = model.train_batch(&input, &targets, 2).unwrap();
        }
        assert!(last < first * 0.1, "loss {} -> {}", first, last);
    }

    #[test]
    fn summary_lists_layers_and_spec() {
        let mut rng = SimpleRng::new(42);
        let mut model = two_layer_model(&mut rng);
        model
            .compile(
                Loss::MeanSquaredError,
                OptimizerSpec::adam_with_learning_rate(0.01),
                Vec::new(),
            )
            .unwrap();
        let summary = model.summary();
        assert!(summary.contains("dense: 3 -> 4"));
        assert!(summary.contains("total params"));
        assert!(summary.contains("mse"));
        assert!(summary.contains("0.01"));
    }

    #[test]
    fn parameter_count_sums_layers() {
        let mut rng = SimpleRng::new(42);
        let model = two_layer_model(&mut rng);
        assert_eq!(model.parameter_count(), (3 * 4 + 4) + (4 * 2 + 2));
    }
}
