//! Layer implementations for the model factories.
//!
//! All layers implement the [`Layer`] trait; the concrete set covers the four
//! factory topologies: dense and per-step projections, 2-D and 1-D
//! convolution, max pooling (spatial and global), dropout, embedding lookup,
//! and the recurrent layers (simple RNN and bidirectional GRU).

mod r#trait;

pub mod conv1d;
pub mod conv2d;
pub mod dense;
pub mod dropout;
pub mod embedding;
pub mod flatten;
pub mod pooling;
pub mod recurrent;

pub use conv1d::Conv1DLayer;
pub use conv2d::Conv2DLayer;
pub use dense::{DenseLayer, TimeDistributedDense};
pub use dropout::DropoutLayer;
pub use embedding::EmbeddingLayer;
pub use flatten::FlattenLayer;
pub use pooling::{GlobalMaxPool1DLayer, MaxPool2DLayer};
pub use r#trait::Layer;
pub use recurrent::{BidirectionalGruLayer, SimpleRnnLayer};
