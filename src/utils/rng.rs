//! Xorshift random number generator for weight initialization.
//!
//! Weight init and dropout masks only need a fast, seedable source of uniform
//! numbers, not a cryptographic one. Keeping the generator in-crate makes runs
//! reproducible from a single u64 seed.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seedable xorshift PRNG.
///
/// A zero seed is remapped to a fixed non-zero constant, since xorshift state
/// must never be zero.
#[derive(Clone)]
pub struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    /// Create a generator from an explicit seed (zero is remapped).
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 0x9e3779b97f4a7c15 } else { seed };
        Self { state }
    }

    /// Reseed from the current wall clock, for independently initialized models.
    pub fn reseed_from_time(&mut self) {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        self.state = if nanos == 0 {
            0x9e3779b97f4a7c15
        } else {
            nanos
        };
    }

    /// Next raw 32-bit value.
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        (x >> 32) as u32
    }

    /// Uniform sample in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        self.next_u32() as f32 / (u32::MAX as f32 + 1.0)
    }

    /// Uniform sample in [low, high).
    pub fn gen_range_f32(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32()
    }

    /// Fill a slice with uniform samples in [low, high).
    ///
    /// All layer weight initializers funnel through this.
    pub fn fill_uniform(&mut self, data: &mut [f32], low: f32, high: f32) {
        for value in data.iter_mut() {
            *value = self.gen_range_f32(low, high);
        }
    }

    /// Integer sample in [0, upper). Returns 0 when upper is 0.
    pub fn gen_usize(&mut self, upper: usize) -> usize {
        if upper == 0 {
            0
        } else {
            (self.next_u32() as usize) % upper
        }
    }

    /// Fisher-Yates shuffle for index slices.
    pub fn shuffle_usize(&mut self, data: &mut [usize]) {
        if data.len() <= 1 {
            return;
        }
        for i in (1..data.len()).rev() {
            let j = self.gen_usize(i + 1);
            data.swap(i, j);
        }
    }
}
