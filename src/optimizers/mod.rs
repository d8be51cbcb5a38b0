//! Optimizers and the parameter tensors they update.
//!
//! An [`Optimizer`] applies an update rule to one parameter tensor. Stateful
//! optimizers (Adam) keep per-element moment estimates, so every tensor owns
//! its own optimizer instance; sharing one across tensors would alias the
//! moments. [`OptimizerSpec`] is the cloneable configuration a model is
//! compiled with, and [`Parameter`] bundles a value vector with its gradient
//! accumulator and bound optimizer.

pub mod adam;
pub mod sgd;

pub use adam::Adam;
pub use sgd::Sgd;

use std::cell::{Ref, RefCell, RefMut};

use crate::utils::SimpleRng;

/// Update rule for a single parameter tensor.
pub trait Optimizer {
    /// Apply one update step in-place.
    ///
    /// # Panics
    ///
    /// Panics if `parameters` and `gradients` differ in length.
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32]);

    /// Clear any accumulated state (moments, step counters).
    fn reset(&mut self);

    /// Base learning rate.
    fn learning_rate(&self) -> f32;

    /// Replace the base learning rate, e.g. for external decay schedules.
    fn set_learning_rate(&mut self, lr: f32);
}

/// Cloneable optimizer configuration bound to a model at compile time.
///
/// Each trainable tensor builds its own instance from the spec, so moment
/// state never leaks between tensors or between models.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptimizerSpec {
    /// Vanilla stochastic gradient descent.
    Sgd { learning_rate: f32 },
    /// Adaptive moment estimation.
    Adam {
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    },
}

impl OptimizerSpec {
    /// Adam with the defaults from the original paper
    /// (lr 0.001, beta1 0.9, beta2 0.999, epsilon 1e-8).
    pub fn adam() -> Self {
        OptimizerSpec::Adam {
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }

    /// Adam with an explicit learning rate and default moment decay rates.
    pub fn adam_with_learning_rate(learning_rate: f32) -> Self {
        OptimizerSpec::Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }

    /// Plain SGD at the given learning rate.
    pub fn sgd(learning_rate: f32) -> Self {
        OptimizerSpec::Sgd { learning_rate }
    }

    /// Instantiate the configured optimizer.
    pub fn build(&self) -> Box<dyn Optimizer> {
        match *self {
            OptimizerSpec::Sgd { learning_rate } => Box::new(Sgd::new(learning_rate)),
            OptimizerSpec::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => Box::new(Adam::new(learning_rate, beta1, beta2, epsilon)),
        }
    }

    /// Configured base learning rate.
    pub fn learning_rate(&self) -> f32 {
        match *self {
            OptimizerSpec::Sgd { learning_rate } => learning_rate,
            OptimizerSpec::Adam { learning_rate, .. } => learning_rate,
        }
    }
}

/// One trainable tensor: values, accumulated gradients, bound optimizer.
///
/// Gradients live behind a `RefCell` because `Layer::backward` takes `&self`;
/// layers accumulate into `grad_mut()` during backward and the whole batch is
/// applied at once by `apply_update`.
pub struct Parameter {
    values: Vec<f32>,
    grads: RefCell<Vec<f32>>,
    optimizer: Option<Box<dyn Optimizer>>,
}

impl Parameter {
    /// Zero-initialized tensor (biases).
    pub fn zeros(len: usize) -> Self {
        Self {
            values: vec![0.0; len],
            grads: RefCell::new(vec![0.0; len]),
            optimizer: None,
        }
    }

    /// Xavier/Glorot uniform init over `fan_in + fan_out`.
    pub fn xavier(len: usize, fan_in: usize, fan_out: usize, rng: &mut SimpleRng) -> Self {
        let limit = (6.0f32 / (fan_in + fan_out) as f32).sqrt();
        Self::uniform(len, -limit, limit, rng)
    }

    /// Uniform init in [low, high) (embedding tables).
    pub fn uniform(len: usize, low: f32, high: f32, rng: &mut SimpleRng) -> Self {
        let mut values = vec![0.0f32; len];
        rng.fill_uniform(&mut values, low, high);
        Self {
            values,
            grads: RefCell::new(vec![0.0; len]),
            optimizer: None,
        }
    }

    /// Current values.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Mutable values, for tests that pin weights to known numbers.
    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }

    /// Accumulated gradients (read-only borrow).
    pub fn grads(&self) -> Ref<'_, Vec<f32>> {
        self.grads.borrow()
    }

    /// Gradient accumulator for backward passes.
    pub fn grad_mut(&self) -> RefMut<'_, Vec<f32>> {
        self.grads.borrow_mut()
    }

    /// Number of scalar parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for an empty tensor.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Bind (or rebind) the optimizer built from `spec`, resetting state.
    pub fn bind_optimizer(&mut self, spec: &OptimizerSpec) {
        self.optimizer = Some(spec.build());
    }

    /// Apply the accumulated gradients through the bound optimizer and clear
    /// them. A tensor without a bound optimizer keeps accumulating, which lets
    /// gradient checks inspect raw gradients without stepping.
    pub fn apply_update(&mut self) {
        let mut grads = self.grads.borrow_mut();
        if let Some(optimizer) = self.optimizer.as_mut() {
            optimizer.update(&mut self.values, &grads);
            for g in grads.iter_mut() {
                *g = 0.0;
            }
        }
    }

    /// Zero the gradient accumulator without updating values.
    pub fn zero_grad(&self) {
        for g in self.grads.borrow_mut().iter_mut() {
            *g = 0.0;
        }
    }
}
