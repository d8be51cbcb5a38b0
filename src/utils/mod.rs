pub mod activations;
pub mod matmul;
pub mod rng;

pub use activations::{relu_inplace, sigmoid, softmax_rows, Activation};
pub use rng::SimpleRng;
