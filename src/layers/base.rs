//! Layer Protocol
//!
//! Every layer follows the same two rituals around its own math:
//!
//! ```text
//! forward(input):
//!     x   = process_input(input)     # cache input signal, adopt its position N
//!     y   = <layer math>(x)
//!     out = wrap_output(y)           # cache and return Signal at N + 1
//!
//! backward():
//!     g      = output gradient       # set by the caller or the next layer
//!     grads  = <parameter gradients>
//!     grad_x = <input gradient>
//!     input signal.set_error(grad_x) # hand-off slot for the previous layer
//!     return grads
//! ```
//!
//! [`LayerState`] implements both rituals so concrete layers only supply the
//! math. A layer keeps only its latest forward call; a new forward replaces
//! both cached signals.
//!
//! ## Raw Inputs
//!
//! A raw [`Tensor`] passed to `forward` always starts a new chain at sequence
//! position 0. To continue a chain, pass the previous layer's [`Signal`].

use crate::error::{LayerError, Result};
use crate::gradients::Gradients;
use crate::layers::param::ParamLayer;
use crate::signal::Signal;
use crate::tensor::Tensor;
use std::fmt::Debug;

/// What a layer's forward pass accepts
#[derive(Clone, Debug, PartialEq)]
pub enum Input {
    /// Start of a new chain, promoted to a `Signal` at position 0
    Raw(Tensor),
    /// Output of an upstream layer
    Signal(Signal),
}

impl From<Tensor> for Input {
    fn from(tensor: Tensor) -> Self {
        Input::Raw(tensor)
    }
}

impl From<Signal> for Input {
    fn from(signal: Signal) -> Self {
        Input::Signal(signal)
    }
}

/// Borrowed signals are detached: the consumer gets its own gradient slot.
impl From<&Signal> for Input {
    fn from(signal: &Signal) -> Self {
        Input::Signal(signal.detach())
    }
}

/// Cached signals and sequence position of one layer
#[derive(Clone, Debug, Default)]
pub struct LayerState {
    sequence_position: Option<usize>,
    cached_input: Option<Signal>,
    cached_output: Option<Signal>,
}

impl LayerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache the input signal and return its raw tensor
    ///
    /// Raw tensors become a `Signal` at position 0. Any output cached by a
    /// previous forward call is dropped.
    pub fn process_input(&mut self, input: Input) -> &Tensor {
        let signal = match input {
            Input::Raw(tensor) => Signal::new(tensor, 0),
            Input::Signal(signal) => signal,
        };
        self.sequence_position = Some(signal.sequence_position());
        self.cached_output = None;
        self.cached_input.insert(signal).read()
    }

    /// Wrap the layer's raw output one position after its input
    pub fn wrap_output(&mut self, output: Tensor) -> &Signal {
        let position = self.sequence_position.map_or(1, |p| p + 1);
        self.cached_output.insert(Signal::new(output, position))
    }

    /// Position of the most recent input signal
    pub fn sequence_position(&self) -> Option<usize> {
        self.sequence_position
    }

    pub fn input_signal(&self) -> Option<&Signal> {
        self.cached_input.as_ref()
    }

    pub fn output_signal(&self) -> Option<&Signal> {
        self.cached_output.as_ref()
    }

    /// Raw tensor of the cached input
    pub fn input(&self, layer: &'static str) -> Result<&Tensor> {
        self.cached_input
            .as_ref()
            .map(Signal::read)
            .ok_or(LayerError::NotEvaluated { layer })
    }

    /// Gradient waiting in the output slot
    ///
    /// # Errors
    ///
    /// - `NotEvaluated` if there is no completed forward pass
    /// - `GradientNotReady` if the output gradient has not been set
    pub fn output_gradient(&self, layer: &'static str) -> Result<&Tensor> {
        let output = self
            .cached_output
            .as_ref()
            .ok_or(LayerError::NotEvaluated { layer })?;
        output
            .gradient()
            .ok_or(LayerError::GradientNotReady { layer })
    }

    pub fn set_output_error(&mut self, layer: &'static str, gradient: Tensor) -> Result<()> {
        self.cached_output
            .as_mut()
            .ok_or(LayerError::NotEvaluated { layer })?
            .set_error(gradient)
    }

    pub fn set_input_error(&mut self, layer: &'static str, gradient: Tensor) -> Result<()> {
        self.cached_input
            .as_mut()
            .ok_or(LayerError::NotEvaluated { layer })?
            .set_error(gradient)
    }

    /// Move the input gradient out for the preceding layer
    pub fn take_input_error(&mut self) -> Option<Tensor> {
        self.cached_input.as_mut().and_then(Signal::take_error)
    }
}

/// Forward/backward contract shared by every layer
///
/// # Ordering
///
/// `backward` requires a completed `forward` and a populated output
/// gradient. In a chain, drive `forward` first-to-last and `backward`
/// last-to-first.
pub trait Layer: Debug + Send {
    /// Short name used in errors and logs
    fn name(&self) -> &'static str;

    /// Evaluate the layer and return its cached output signal
    fn forward(&mut self, input: Input) -> Result<&Signal>;

    /// Compute parameter gradients and hand the input gradient back
    fn backward(&mut self) -> Result<Gradients>;

    fn state(&self) -> &LayerState;

    fn state_mut(&mut self) -> &mut LayerState;

    /// Expected feature count of the input, `None` if any width works
    fn input_features(&self) -> Option<usize> {
        None
    }

    /// Feature count of the output, `None` if it follows the input
    fn output_features(&self) -> Option<usize> {
        None
    }

    /// Trainable parameters, for layers that own any
    fn params(&self) -> Option<&ParamLayer> {
        None
    }

    /// Mutable parameters, so an optimizer can update them between steps
    fn params_mut(&mut self) -> Option<&mut ParamLayer> {
        None
    }

    fn parameter_count(&self) -> usize {
        self.params().map_or(0, ParamLayer::parameter_count)
    }

    fn sequence_position(&self) -> Option<usize> {
        self.state().sequence_position()
    }

    fn input_signal(&self) -> Option<&Signal> {
        self.state().input_signal()
    }

    fn output_signal(&self) -> Option<&Signal> {
        self.state().output_signal()
    }

    /// Populate the output gradient (done by the caller for the last layer)
    fn set_output_error(&mut self, gradient: Tensor) -> Result<()> {
        let name = self.name();
        self.state_mut().set_output_error(name, gradient)
    }

    /// Move out the gradient written by `backward` into the input signal
    fn take_input_error(&mut self) -> Option<Tensor> {
        self.state_mut().take_input_error()
    }

    /// `forward` for anything convertible into [`Input`]
    fn call(&mut self, input: impl Into<Input>) -> Result<&Signal>
    where
        Self: Sized,
    {
        self.forward(input.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_input_starts_at_zero() {
        let mut state = LayerState::new();
        state.process_input(Tensor::zeros(vec![1, 2]).into());
        assert_eq!(state.sequence_position(), Some(0));
        assert_eq!(state.wrap_output(Tensor::zeros(vec![1, 2])).sequence_position(), 1);
    }

    #[test]
    fn test_signal_input_keeps_position() {
        let mut state = LayerState::new();
        state.process_input(Signal::new(Tensor::zeros(vec![1, 1]), 4).into());
        let out = state.wrap_output(Tensor::zeros(vec![1, 1]));
        assert_eq!(out.sequence_position(), 5);
    }

    #[test]
    fn test_borrowed_signal_is_detached() {
        let mut upstream = Signal::new(Tensor::zeros(vec![1, 1]), 2);
        upstream.set_error(Tensor::zeros(vec![1, 1])).unwrap();
        match Input::from(&upstream) {
            Input::Signal(s) => assert!(!s.has_error()),
            Input::Raw(_) => panic!("expected signal"),
        }
    }

    #[test]
    fn test_new_forward_drops_old_output() {
        let mut state = LayerState::new();
        state.process_input(Tensor::zeros(vec![1, 1]).into());
        state.wrap_output(Tensor::zeros(vec![1, 1]));
        state.process_input(Tensor::zeros(vec![1, 1]).into());
        assert!(state.output_signal().is_none());
    }

    #[test]
    fn test_output_gradient_errors() {
        let mut state = LayerState::new();
        assert_eq!(
            state.output_gradient("stub"),
            Err(LayerError::NotEvaluated { layer: "stub" })
        );

        state.process_input(Tensor::zeros(vec![1, 1]).into());
        state.wrap_output(Tensor::zeros(vec![1, 1]));
        assert_eq!(
            state.output_gradient("stub"),
            Err(LayerError::GradientNotReady { layer: "stub" })
        );

        state
            .set_output_error("stub", Tensor::full(vec![1, 1], 3.0))
            .unwrap();
        assert_eq!(state.output_gradient("stub").unwrap().data, vec![3.0]);
    }
}
