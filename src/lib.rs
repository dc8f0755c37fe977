//! knets: Layers With Explicit Backpropagation
//!
//! A small neural-network layer framework where every gradient is computed
//! by hand. Layers pass tagged tensors ([`Signal`]) forward, each one a
//! sequence position further along the chain, and push gradients backward
//! through per-signal slots that can be written exactly once.
//!
//! # Modules
//!
//! - [`tensor`] - Row-major `f32` tensors (matmul, broadcasting, axis sums)
//! - [`signal`] - Tensor wrapper with sequence position and gradient slot
//! - [`activation`] - Activation capability and standard nonlinearities
//! - [`initializer`] - Parameter initializers
//! - [`layers`] - The [`Layer`] trait, [`Dense`] and [`ActivationLayer`]
//! - [`chain`] - Linear chains of layers with gradient hand-off
//! - [`config`] - JSON chain descriptions
//!
//! # Example
//!
//! ```rust
//! use knets::{Dense, Layer, Tensor};
//!
//! let mut layer = Dense::new(3, 2).unwrap();
//! let x = Tensor::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
//!
//! let y = layer.call(x).unwrap();
//! assert_eq!(y.read().shape, vec![2, 2]);
//! assert_eq!(y.sequence_position(), 1);
//!
//! // Gradient of the loss with respect to y, from the caller's loss
//! layer.set_output_error(Tensor::full(vec![2, 2], 1.0)).unwrap();
//! let grads = layer.backward().unwrap();
//! assert_eq!(grads.weight().unwrap().shape, vec![3, 2]);
//! assert_eq!(grads.bias().unwrap().shape, vec![1, 2]);
//! ```

pub mod activation;
pub mod chain;
pub mod config;
pub mod error;
pub mod gradients;
pub mod initializer;
pub mod layers;
pub mod signal;
pub mod tensor;

// Re-export main types for convenience
pub use activation::Activation;
pub use chain::Chain;
pub use config::{load_config, ChainConfig, LayerConfig};
pub use error::{LayerError, Result};
pub use gradients::Gradients;
pub use initializer::Initializer;
pub use layers::{ActivationLayer, Dense, DenseBuilder, Input, Layer, LayerState, ParamLayer};
pub use signal::Signal;
pub use tensor::Tensor;
