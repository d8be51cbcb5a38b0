//! Recurrent layers: simple RNN and bidirectional GRU.
//!
//! Both layers unroll over time with explicit loops and cache per-step state
//! during forward for backpropagation through time. The GRU follows the
//! convention `h_t = z * h_{t-1} + (1 - z) * candidate` with sigmoid gates
//! and a configurable candidate activation.

use std::cell::RefCell;

use crate::layers::Layer;
use crate::optimizers::{OptimizerSpec, Parameter};
use crate::utils::{sigmoid, Activation, SimpleRng};

/// Single-direction recurrent layer over a fixed number of steps.
///
/// Per step: `h_t = act(x_t W_in + h_{t-1} W_rec + b)`. With
/// `return_sequences` the layer emits every hidden state (step-major
/// `steps x units`); otherwise only the final state.
pub struct SimpleRnnLayer {
    steps: usize,
    input_features: usize,
    units: usize,
    return_sequences: bool,
    activation: Activation,
    w_in: Parameter,
    w_rec: Parameter,
    bias: Parameter,
    // Hidden states of the last forward pass, batch x steps x units.
    hidden: RefCell<Vec<f32>>,
}

impl SimpleRnnLayer {
    /// Create a recurrent layer with Xavier-initialized weights.
    ///
    /// # Panics
    ///
    /// Panics if `steps`, `input_features`, or `units` is zero.
    pub fn new(
        steps: usize,
        input_features: usize,
        units: usize,
        return_sequences: bool,
        activation: Activation,
        rng: &mut SimpleRng,
    ) -> Self {
        assert!(steps > 0, "steps must be greater than 0");
        assert!(input_features > 0, "input_features must be greater than 0");
        assert!(units > 0, "units must be greater than 0");
        Self {
            steps,
            input_features,
            units,
            return_sequences,
            activation,
            w_in: Parameter::xavier(input_features * units, input_features, units, rng),
            w_rec: Parameter::xavier(units * units, units, units, rng),
            bias: Parameter::zeros(units),
            hidden: RefCell::new(Vec::new()),
        }
    }

    /// Hidden width of the layer.
    pub fn units(&self) -> usize {
        self.units
    }

    /// Whether every step's state is emitted.
    pub fn return_sequences(&self) -> bool {
        self.return_sequences
    }
}

impl Layer for SimpleRnnLayer {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        let features = self.input_features;
        let units = self.units;
        assert_eq!(input.len(), batch_size * self.steps * features);
        assert_eq!(output.len(), batch_size * self.output_size());

        let w_in = self.w_in.values();
        let w_rec = self.w_rec.values();
        let bias = self.bias.values();

        let mut hidden = self.hidden.borrow_mut();
        hidden.clear();
        hidden.resize(batch_size * self.steps * units, 0.0);

        let mut h = vec![0.0f32; units];
        let mut pre = vec![0.0f32; units];

        for b in 0..batch_size {
            for v in h.iter_mut() {
                *v = 0.0;
            }

            for t in 0..self.steps {
                let x = &input[(b * self.steps + t) * features..][..features];

                for i in 0..units {
                    let mut sum = bias[i];
                    for d in 0..features {
                        sum += x[d] * w_in[d * units + i];
                    }
                    for j in 0..units {
                        sum += h[j] * w_rec[j * units + i];
                    }
                    pre[i] = sum;
                }
                self.activation.apply_rows(&mut pre, 1, units);
                h.copy_from_slice(&pre);

                let cache_at = (b * self.steps + t) * units;
                hidden[cache_at..cache_at + units].copy_from_slice(&h);

                if self.return_sequences {
                    output[(b * self.steps + t) * units..][..units].copy_from_slice(&h);
                }
            }

            if !self.return_sequences {
                output[b * units..][..units].copy_from_slice(&h);
            }
        }
    }

    fn backward(
        &self,
        input: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        let features = self.input_features;
        let units = self.units;
        assert_eq!(input.len(), batch_size * self.steps * features);
        assert_eq!(grad_output.len(), batch_size * self.output_size());
        assert_eq!(grad_input.len(), input.len());

        let hidden = self.hidden.borrow();
        assert_eq!(
            hidden.len(),
            batch_size * self.steps * units,
            "backward without forward"
        );

        let scale = 1.0 / batch_size as f32;
        let w_in = self.w_in.values();
        let w_rec = self.w_rec.values();
        let mut grad_w_in = self.w_in.grad_mut();
        let mut grad_w_rec = self.w_rec.grad_mut();
        let mut grad_bias = self.bias.grad_mut();

        for v in grad_input.iter_mut() {
            *v = 0.0;
        }

        let mut dh_next = vec![0.0f32; units];
        let mut dz = vec![0.0f32; units];
        let zeros = vec![0.0f32; units];

        for b in 0..batch_size {
            for v in dh_next.iter_mut() {
                *v = 0.0;
            }

            for t in (0..self.steps).rev() {
                let cache_at = (b * self.steps + t) * units;
                let h_t = &hidden[cache_at..cache_at + units];
                let h_prev = if t > 0 {
                    &hidden[cache_at - units..cache_at]
                } else {
                    &zeros[..]
                };
                let x = &input[(b * self.steps + t) * features..][..features];

                for i in 0..units {
                    let upstream = if self.return_sequences {
                        grad_output[(b * self.steps + t) * units + i]
                    } else if t + 1 == self.steps {
                        grad_output[b * units + i]
                    } else {
                        0.0
                    };
                    let dh = upstream + dh_next[i];
                    dz[i] = dh * self.activation.derivative_from_output(h_t[i]);
                }

                for i in 0..units {
                    let g = dz[i];
                    grad_bias[i] += g * scale;
                    for d in 0..features {
                        grad_w_in[d * units + i] += x[d] * g * scale;
                        grad_input[(b * self.steps + t) * features + d] += g * w_in[d * units + i];
                    }
                    for j in 0..units {
                        grad_w_rec[j * units + i] += h_prev[j] * g * scale;
                    }
                }

                for j in 0..units {
                    let mut sum = 0.0;
                    for i in 0..units {
                        sum += dz[i] * w_rec[j * units + i];
                    }
                    dh_next[j] = sum;
                }
            }
        }
    }

    fn set_optimizer(&mut self, spec: &OptimizerSpec) {
        self.w_in.bind_optimizer(spec);
        self.w_rec.bind_optimizer(spec);
        self.bias.bind_optimizer(spec);
    }

    fn update_parameters(&mut self) {
        self.w_in.apply_update();
        self.w_rec.apply_update();
        self.bias.apply_update();
    }

    fn input_size(&self) -> usize {
        self.steps * self.input_features
    }

    fn output_size(&self) -> usize {
        if self.return_sequences {
            self.steps * self.units
        } else {
            self.units
        }
    }

    fn parameter_count(&self) -> usize {
        self.w_in.len() + self.w_rec.len() + self.bias.len()
    }

    fn name(&self) -> &'static str {
        "simple_rnn"
    }
}

/// One direction of a GRU: weights, biases, and per-step caches.
struct GruCell {
    input_features: usize,
    units: usize,
    activation: Activation,
    w_z: Parameter,
    w_r: Parameter,
    w_h: Parameter,
    u_z: Parameter,
    u_r: Parameter,
    u_h: Parameter,
    b_z: Parameter,
    b_r: Parameter,
    b_h: Parameter,
    // Per-step values of the last forward pass, batch x steps x units,
    // indexed in processing order (already reversed for the backward cell).
    cache_z: RefCell<Vec<f32>>,
    cache_r: RefCell<Vec<f32>>,
    cache_hh: RefCell<Vec<f32>>,
    cache_h: RefCell<Vec<f32>>,
}

impl GruCell {
    fn new(input_features: usize, units: usize, activation: Activation, rng: &mut SimpleRng) -> Self {
        let input_len = input_features * units;
        let rec_len = units * units;
        Self {
            input_features,
            units,
            activation,
            w_z: Parameter::xavier(input_len, input_features, units, rng),
            w_r: Parameter::xavier(input_len, input_features, units, rng),
            w_h: Parameter::xavier(input_len, input_features, units, rng),
            u_z: Parameter::xavier(rec_len, units, units, rng),
            u_r: Parameter::xavier(rec_len, units, units, rng),
            u_h: Parameter::xavier(rec_len, units, units, rng),
            b_z: Parameter::zeros(units),
            b_r: Parameter::zeros(units),
            b_h: Parameter::zeros(units),
            cache_z: RefCell::new(Vec::new()),
            cache_r: RefCell::new(Vec::new()),
            cache_hh: RefCell::new(Vec::new()),
            cache_h: RefCell::new(Vec::new()),
        }
    }

    fn parameter_count(&self) -> usize {
        3 * (self.input_features * self.units + self.units * self.units + self.units)
    }

    fn bind_optimizers(&mut self, spec: &OptimizerSpec) {
        for p in [
            &mut self.w_z,
            &mut self.w_r,
            &mut self.w_h,
            &mut self.u_z,
            &mut self.u_r,
            &mut self.u_h,
            &mut self.b_z,
            &mut self.b_r,
            &mut self.b_h,
        ] {
            p.bind_optimizer(spec);
        }
    }

    fn apply_updates(&mut self) {
        for p in [
            &mut self.w_z,
            &mut self.w_r,
            &mut self.w_h,
            &mut self.u_z,
            &mut self.u_r,
            &mut self.u_h,
            &mut self.b_z,
            &mut self.b_r,
            &mut self.b_h,
        ] {
            p.apply_update();
        }
    }

    /// Run the cell over the sequence; `reverse` walks time backwards.
    /// `mask` is an optional per-sample input mask (batch x features); empty
    /// means no masking. Writes each sample's final state to `final_h`.
    fn forward_pass(
        &self,
        input: &[f32],
        batch_size: usize,
        steps: usize,
        reverse: bool,
        mask: &[f32],
        final_h: &mut [f32],
    ) {
        let features = self.input_features;
        let units = self.units;

        let mut cz = self.cache_z.borrow_mut();
        let mut cr = self.cache_r.borrow_mut();
        let mut chh = self.cache_hh.borrow_mut();
        let mut ch = self.cache_h.borrow_mut();
        let cache_len = batch_size * steps * units;
        for c in [&mut *cz, &mut *cr, &mut *chh, &mut *ch] {
            c.clear();
            c.resize(cache_len, 0.0);
        }

        let w_z = self.w_z.values();
        let w_r = self.w_r.values();
        let w_h = self.w_h.values();
        let u_z = self.u_z.values();
        let u_r = self.u_r.values();
        let u_h = self.u_h.values();
        let b_z = self.b_z.values();
        let b_r = self.b_r.values();
        let b_h = self.b_h.values();

        let mut h = vec![0.0f32; units];
        let mut x = vec![0.0f32; features];
        let mut hh = vec![0.0f32; units];

        for b in 0..batch_size {
            for v in h.iter_mut() {
                *v = 0.0;
            }

            for pos in 0..steps {
                let t = if reverse { steps - 1 - pos } else { pos };
                let raw = &input[(b * steps + t) * features..][..features];
                if mask.is_empty() {
                    x.copy_from_slice(raw);
                } else {
                    let m = &mask[b * features..][..features];
                    for d in 0..features {
                        x[d] = raw[d] * m[d];
                    }
                }

                let at = (b * steps + pos) * units;
                for i in 0..units {
                    let mut z_pre = b_z[i];
                    let mut r_pre = b_r[i];
                    for d in 0..features {
                        z_pre += x[d] * w_z[d * units + i];
                        r_pre += x[d] * w_r[d * units + i];
                    }
                    for j in 0..units {
                        z_pre += h[j] * u_z[j * units + i];
                        r_pre += h[j] * u_r[j * units + i];
                    }
                    cz[at + i] = sigmoid(z_pre);
                    cr[at + i] = sigmoid(r_pre);
                }

                for i in 0..units {
                    let mut hh_pre = b_h[i];
                    for d in 0..features {
                        hh_pre += x[d] * w_h[d * units + i];
                    }
                    for j in 0..units {
                        hh_pre += cr[at + j] * h[j] * u_h[j * units + i];
                    }
                    hh[i] = hh_pre;
                }
                self.activation.apply_rows(&mut hh, 1, units);

                for i in 0..units {
                    let z = cz[at + i];
                    h[i] = z * h[i] + (1.0 - z) * hh[i];
                    chh[at + i] = hh[i];
                    ch[at + i] = h[i];
                }
            }

            final_h[b * units..][..units].copy_from_slice(&h);
        }
    }

    /// Backpropagate from the final-state gradient; accumulates into
    /// `grad_input` so both directions can share one buffer.
    #[allow(clippy::too_many_arguments)]
    fn backward_pass(
        &self,
        input: &[f32],
        batch_size: usize,
        steps: usize,
        reverse: bool,
        mask: &[f32],
        grad_final: &[f32],
        grad_input: &mut [f32],
    ) {
        let features = self.input_features;
        let units = self.units;
        let scale = 1.0 / batch_size as f32;

        let cz = self.cache_z.borrow();
        let cr = self.cache_r.borrow();
        let chh = self.cache_hh.borrow();
        let ch = self.cache_h.borrow();
        assert_eq!(ch.len(), batch_size * steps * units, "backward without forward");

        let w_z = self.w_z.values();
        let w_r = self.w_r.values();
        let w_h = self.w_h.values();
        let u_z = self.u_z.values();
        let u_r = self.u_r.values();
        let u_h = self.u_h.values();

        let mut gw_z = self.w_z.grad_mut();
        let mut gw_r = self.w_r.grad_mut();
        let mut gw_h = self.w_h.grad_mut();
        let mut gu_z = self.u_z.grad_mut();
        let mut gu_r = self.u_r.grad_mut();
        let mut gu_h = self.u_h.grad_mut();
        let mut gb_z = self.b_z.grad_mut();
        let mut gb_r = self.b_r.grad_mut();
        let mut gb_h = self.b_h.grad_mut();

        let zeros = vec![0.0f32; units];
        let mut x = vec![0.0f32; features];
        let mut dh = vec![0.0f32; units];
        let mut dh_prev = vec![0.0f32; units];
        let mut dz_pre = vec![0.0f32; units];
        let mut dr_pre = vec![0.0f32; units];
        let mut s = vec![0.0f32; units];
        let mut drh = vec![0.0f32; units];

        for b in 0..batch_size {
            dh.copy_from_slice(&grad_final[b * units..][..units]);

            for pos in (0..steps).rev() {
                let t = if reverse { steps - 1 - pos } else { pos };
                let at = (b * steps + pos) * units;
                let h_prev = if pos > 0 {
                    &ch[at - units..at]
                } else {
                    &zeros[..]
                };

                let raw = &input[(b * steps + t) * features..][..features];
                if mask.is_empty() {
                    x.copy_from_slice(raw);
                } else {
                    let m = &mask[b * features..][..features];
                    for d in 0..features {
                        x[d] = raw[d] * m[d];
                    }
                }

                // Gate pre-activation gradients.
                for i in 0..units {
                    let z = cz[at + i];
                    let hh = chh[at + i];
                    dz_pre[i] = dh[i] * (h_prev[i] - hh) * z * (1.0 - z);
                    s[i] = dh[i] * (1.0 - z) * self.activation.derivative_from_output(hh);
                }
                for j in 0..units {
                    let mut sum = 0.0;
                    for i in 0..units {
                        sum += s[i] * u_h[j * units + i];
                    }
                    drh[j] = sum;
                }
                for j in 0..units {
                    let r = cr[at + j];
                    dr_pre[j] = drh[j] * h_prev[j] * r * (1.0 - r);
                }

                // Gradient flowing to the previous hidden state.
                for j in 0..units {
                    let mut sum = dh[j] * cz[at + j] + drh[j] * cr[at + j];
                    for i in 0..units {
                        sum += dz_pre[i] * u_z[j * units + i] + dr_pre[i] * u_r[j * units + i];
                    }
                    dh_prev[j] = sum;
                }

                // Parameter gradients.
                for i in 0..units {
                    gb_z[i] += dz_pre[i] * scale;
                    gb_r[i] += dr_pre[i] * scale;
                    gb_h[i] += s[i] * scale;
                    for d in 0..features {
                        gw_z[d * units + i] += x[d] * dz_pre[i] * scale;
                        gw_r[d * units + i] += x[d] * dr_pre[i] * scale;
                        gw_h[d * units + i] += x[d] * s[i] * scale;
                    }
                    for j in 0..units {
                        gu_z[j * units + i] += h_prev[j] * dz_pre[i] * scale;
                        gu_r[j * units + i] += h_prev[j] * dr_pre[i] * scale;
                        gu_h[j * units + i] += cr[at + j] * h_prev[j] * s[i] * scale;
                    }
                }

                // Gradient to this step's input, through the dropout mask.
                for d in 0..features {
                    let mut sum = 0.0;
                    for i in 0..units {
                        sum += dz_pre[i] * w_z[d * units + i]
                            + dr_pre[i] * w_r[d * units + i]
                            + s[i] * w_h[d * units + i];
                    }
                    if !mask.is_empty() {
                        sum *= mask[b * features + d];
                    }
                    grad_input[(b * steps + t) * features + d] += sum;
                }

                dh.copy_from_slice(&dh_prev);
            }
        }
    }
}

/// Bidirectional GRU emitting the concatenated final states.
///
/// Two independent cells process the sequence forwards and backwards; each
/// sample's output is `[h_forward_last, h_backward_last]`, `2 * units` wide.
/// An inverted-dropout mask over input features (one per sample, shared by
/// both directions and all steps) regularizes the inputs during training.
/// The sequence width is inferred per call, so padded batches of any uniform
/// width work.
pub struct BidirectionalGruLayer {
    input_features: usize,
    units: usize,
    dropout_rate: f32,
    training: bool,
    forward_cell: GruCell,
    backward_cell: GruCell,
    mask: RefCell<Vec<f32>>,
    rng: RefCell<SimpleRng>,
}

impl BidirectionalGruLayer {
    /// Create a bidirectional GRU.
    ///
    /// # Panics
    ///
    /// Panics if `input_features` or `units` is zero, or if `dropout_rate`
    /// is outside [0.0, 1.0).
    pub fn new(
        input_features: usize,
        units: usize,
        dropout_rate: f32,
        activation: Activation,
        rng: &mut SimpleRng,
    ) -> Self {
        assert!(input_features > 0, "input_features must be greater than 0");
        assert!(units > 0, "units must be greater than 0");
        assert!(
            (0.0..1.0).contains(&dropout_rate),
            "dropout_rate must be in range [0.0, 1.0)"
        );
        Self {
            input_features,
            units,
            dropout_rate,
            training: true,
            forward_cell: GruCell::new(input_features, units, activation, rng),
            backward_cell: GruCell::new(input_features, units, activation, rng),
            mask: RefCell::new(Vec::new()),
            rng: RefCell::new(rng.clone()),
        }
    }

    /// Hidden width per direction.
    pub fn units(&self) -> usize {
        self.units
    }

    /// Input dropout probability.
    pub fn dropout_rate(&self) -> f32 {
        self.dropout_rate
    }

    fn steps_for(&self, input_len: usize, batch_size: usize) -> usize {
        let per_sample = self.input_features * batch_size;
        assert!(
            per_sample > 0 && input_len % per_sample == 0,
            "input length {} is not a whole number of {}-feature steps",
            input_len,
            self.input_features
        );
        let steps = input_len / per_sample;
        assert!(steps > 0, "cannot run a GRU over an empty sequence");
        steps
    }
}

impl Layer for BidirectionalGruLayer {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        let steps = self.steps_for(input.len(), batch_size);
        let units = self.units;
        assert_eq!(output.len(), batch_size * 2 * units);

        let mut mask = self.mask.borrow_mut();
        mask.clear();
        if self.training && self.dropout_rate > 0.0 {
            let keep_scale = 1.0 / (1.0 - self.dropout_rate);
            mask.resize(batch_size * self.input_features, 0.0);
            let mut rng = self.rng.borrow_mut();
            for m in mask.iter_mut() {
                *m = if rng.next_f32() >= self.dropout_rate {
                    keep_scale
                } else {
                    0.0
                };
            }
        }

        let mut final_f = vec![0.0f32; batch_size * units];
        let mut final_b = vec![0.0f32; batch_size * units];
        self.forward_cell
            .forward_pass(input, batch_size, steps, false, &mask, &mut final_f);
        self.backward_cell
            .forward_pass(input, batch_size, steps, true, &mask, &mut final_b);

        for b in 0..batch_size {
            output[b * 2 * units..][..units].copy_from_slice(&final_f[b * units..][..units]);
            output[b * 2 * units + units..][..units]
                .copy_from_slice(&final_b[b * units..][..units]);
        }
    }

    fn backward(
        &self,
        input: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        let steps = self.steps_for(input.len(), batch_size);
        let units = self.units;
        assert_eq!(grad_output.len(), batch_size * 2 * units);
        assert_eq!(grad_input.len(), input.len());

        let mask = self.mask.borrow();

        let mut grad_f = vec![0.0f32; batch_size * units];
        let mut grad_b = vec![0.0f32; batch_size * units];
        for b in 0..batch_size {
            grad_f[b * units..][..units].copy_from_slice(&grad_output[b * 2 * units..][..units]);
            grad_b[b * units..][..units]
                .copy_from_slice(&grad_output[b * 2 * units + units..][..units]);
        }

        for v in grad_input.iter_mut() {
            *v = 0.0;
        }
        self.forward_cell
            .backward_pass(input, batch_size, steps, false, &mask, &grad_f, grad_input);
        self.backward_cell
            .backward_pass(input, batch_size, steps, true, &mask, &grad_b, grad_input);
    }

    fn set_optimizer(&mut self, spec: &OptimizerSpec) {
        self.forward_cell.bind_optimizers(spec);
        self.backward_cell.bind_optimizers(spec);
    }

    fn update_parameters(&mut self) {
        self.forward_cell.apply_updates();
        self.backward_cell.apply_updates();
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn input_size(&self) -> usize {
        self.input_features
    }

    fn output_size(&self) -> usize {
        2 * self.units
    }

    fn variable_width(&self) -> bool {
        true
    }

    fn parameter_count(&self) -> usize {
        self.forward_cell.parameter_count() + self.backward_cell.parameter_count()
    }

    fn name(&self) -> &'static str {
        "bidirectional_gru"
    }
}
