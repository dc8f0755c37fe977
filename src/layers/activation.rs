//! Standalone Activation Layer
//!
//! Applies an element-wise nonlinearity as its own step in a chain, for
//! when the activation should sit between two linear [`Dense`](super::Dense)
//! layers instead of being folded into one:
//!
//! ```text
//! forward:  y      = f(x)
//! backward: grad_x = grad_y ⊙ f'(x)
//! ```
//!
//! The layer has no parameters, so `backward` returns an empty
//! [`Gradients`] map. Any input width is accepted and the output keeps the
//! input's shape.

use super::base::{Input, Layer, LayerState};
use crate::activation::{self, Activation};
use crate::error::Result;
use crate::gradients::Gradients;
use crate::signal::Signal;
use log::debug;

/// Parameterless layer wrapping an [`Activation`]
#[derive(Debug)]
pub struct ActivationLayer {
    activation: Box<dyn Activation>,
    state: LayerState,
}

impl ActivationLayer {
    pub fn new(activation: impl Activation + 'static) -> Self {
        Self::boxed(Box::new(activation))
    }

    pub fn boxed(activation: Box<dyn Activation>) -> Self {
        Self {
            activation,
            state: LayerState::new(),
        }
    }

    /// Look the activation up by configuration name
    ///
    /// # Errors
    ///
    /// `TypeError` for unknown names.
    pub fn from_name(name: &str, alpha: Option<f32>) -> Result<Self> {
        Ok(Self::boxed(activation::from_name(name, alpha)?))
    }

    pub fn activation(&self) -> &dyn Activation {
        self.activation.as_ref()
    }
}

impl Layer for ActivationLayer {
    fn name(&self) -> &'static str {
        "activation"
    }

    fn forward(&mut self, input: Input) -> Result<&Signal> {
        let x = self.state.process_input(input);
        let y = self.activation.call(x);
        debug!("activation forward ({}): {:?}", self.activation.name(), y.shape);
        Ok(self.state.wrap_output(y))
    }

    fn backward(&mut self) -> Result<Gradients> {
        let name = self.name();
        let grad_out = self.state.output_gradient(name)?;
        let x = self.state.input(name)?;
        let grad_x = grad_out.mul(&self.activation.derivative(x))?;
        self.state.set_input_error(name, grad_x)?;
        Ok(Gradients::new())
    }

    fn state(&self) -> &LayerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LayerState {
        &mut self.state
    }
}
