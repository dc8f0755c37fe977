//! Neural Network Layers
//!
//! Every layer implements the [`Layer`] trait: `forward` consumes an
//! [`Input`] and returns a [`Signal`](crate::Signal) one sequence position
//! later, `backward` reads the gradient parked on that output signal and
//! writes the input gradient back onto the cached input signal.
//!
//! ## Layers
//!
//! - **base**: the [`Layer`] trait and [`LayerState`] (signal caching)
//! - **param**: [`ParamLayer`], weight/bias/activation shared by parametric layers
//! - **dense**: fully connected layer `f(x @ W + b)`
//! - **activation**: parameterless nonlinearity as its own layer
//!
//! ## Design Pattern
//!
//! ```rust,ignore
//! impl Layer for MyLayer {
//!     fn forward(&mut self, input: Input) -> Result<&Signal> {
//!         let x = self.state.process_input(input);
//!         let y = /* math */;
//!         Ok(self.state.wrap_output(y))
//!     }
//!
//!     fn backward(&mut self) -> Result<Gradients> {
//!         let g = self.state.output_gradient(self.name())?;
//!         /* parameter gradients, grad_x */
//!         self.state.set_input_error(self.name(), grad_x)?;
//!         Ok(grads)
//!     }
//! }
//! ```

pub mod activation;
pub mod base;
pub mod dense;
pub mod param;

pub use activation::ActivationLayer;
pub use base::{Input, Layer, LayerState};
pub use dense::{Dense, DenseBuilder};
pub use param::ParamLayer;
