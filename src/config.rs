//! Fit-time options returned by the model factories.
//!
//! The factories hand back an empty [`FitOptions`] next to each model; it is
//! the channel through which an external training driver injects options
//! (batch size, early stopping) without the factory signatures changing. The
//! crate itself never consumes these options.

use serde::Deserialize;
use std::error::Error;
use std::fs;

/// Keyword-style options forwarded verbatim to a training driver.
///
/// Every field is optional; [`Default`] is the empty mapping, which is what
/// the factories return today. The struct is deserializable so drivers can
/// keep their fit options in JSON next to their other configuration.
///
/// # Example
///
/// ```json
/// {
///   "batch_size": 32,
///   "epochs": 10,
///   "early_stopping_patience": 3
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FitOptions {
    /// Samples per gradient step.
    pub batch_size: Option<usize>,

    /// Number of passes over the training data.
    pub epochs: Option<usize>,

    /// Whether to shuffle samples between epochs.
    pub shuffle: Option<bool>,

    /// Fraction of the training data held out for validation, in [0.0, 1.0).
    pub validation_split: Option<f32>,

    /// Epochs without improvement before training stops early.
    pub early_stopping_patience: Option<usize>,

    /// Minimum improvement that resets the early-stopping counter.
    pub early_stopping_min_delta: Option<f32>,
}

impl FitOptions {
    /// True when no option is set — the state the factories return.
    pub fn is_empty(&self) -> bool {
        *self == FitOptions::default()
    }
}

/// Loads fit options from a JSON file.
///
/// # Returns
///
/// `Ok(FitOptions)` on success, or an error if the file cannot be read, the
/// JSON is invalid, or a value is out of range.
pub fn load_fit_options(path: &str) -> Result<FitOptions, Box<dyn Error>> {
    let contents = fs::read_to_string(path)?;
    let options: FitOptions = serde_json::from_str(&contents)?;
    validate_fit_options(&options)?;
    Ok(options)
}

fn validate_fit_options(options: &FitOptions) -> Result<(), Box<dyn Error>> {
    fn invalid(message: &str) -> Box<dyn Error> {
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            message.to_string(),
        ))
    }

    if let Some(batch_size) = options.batch_size {
        if batch_size == 0 {
            return Err(invalid("batch_size must be greater than 0"));
        }
    }

    if let Some(epochs) = options.epochs {
        if epochs == 0 {
            return Err(invalid("epochs must be greater than 0"));
        }
    }

    if let Some(split) = options.validation_split {
        if !(0.0..1.0).contains(&split) {
            return Err(invalid("validation_split must be in range [0.0, 1.0)"));
        }
    }

    if let Some(delta) = options.early_stopping_min_delta {
        if delta < 0.0 {
            return Err(invalid("early_stopping_min_delta must be non-negative"));
        }
    }

    Ok(())
}
