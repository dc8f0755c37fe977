//! Layer Chains
//!
//! A [`Chain`] owns an ordered list of layers and drives the two passes:
//!
//! ```text
//! forward:   input ─► L0 ─► L1 ─► ... ─► Ln-1 ─► output
//! position:  0        1     2            n
//!
//! backward:  grad ─► Ln-1 ─► ... ─► L1 ─► L0 ─► input gradient
//! ```
//!
//! Each layer keeps its own signals. On the way forward the chain hands each
//! layer a detached copy of its predecessor's output, so no gradient slot is
//! shared. On the way back it moves each layer's input gradient into the
//! predecessor's output slot before calling the predecessor's `backward`.
//!
//! ## Checks
//!
//! - `push` rejects a layer whose input width differs from the width the
//!   chain currently produces
//! - `forward` accepts a raw tensor or a signal at position 0, and verifies
//!   that layer *i* produced position *i + 1*
//!
//! ## Example
//!
//! ```rust
//! use knets::activation::Tanh;
//! use knets::{ActivationLayer, Chain, Dense, Tensor};
//!
//! let mut chain = Chain::new()
//!     .with(Dense::new(2, 4).unwrap()).unwrap()
//!     .with(ActivationLayer::new(Tanh)).unwrap()
//!     .with(Dense::new(4, 1).unwrap()).unwrap();
//!
//! let out = chain.forward(Tensor::zeros(vec![3, 2])).unwrap();
//! assert_eq!(out.sequence_position(), 3);
//! assert_eq!(out.read().shape, vec![3, 1]);
//!
//! let grads = chain.backward(Tensor::full(vec![3, 1], 1.0)).unwrap();
//! assert_eq!(grads.len(), 3);
//! assert_eq!(chain.input_gradient().unwrap().shape, vec![3, 2]);
//! ```

use crate::error::{LayerError, Result};
use crate::gradients::Gradients;
use crate::layers::{Input, Layer};
use crate::signal::Signal;
use crate::tensor::Tensor;
use log::{debug, trace};

/// Ordered sequence of layers with explicit gradient hand-off
#[derive(Debug, Default)]
pub struct Chain {
    layers: Vec<Box<dyn Layer>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if the layer expects a different input width than the
    /// chain currently produces.
    pub fn push(&mut self, layer: impl Layer + 'static) -> Result<()> {
        self.push_boxed(Box::new(layer))
    }

    pub fn push_boxed(&mut self, layer: Box<dyn Layer>) -> Result<()> {
        if let (Some(produced), Some(expected)) = (self.output_features(), layer.input_features()) {
            if produced != expected {
                return Err(LayerError::shape("chain", &[expected], &[produced]));
            }
        }
        debug!(
            "chain: appended {} at index {}",
            layer.name(),
            self.layers.len()
        );
        self.layers.push(layer);
        Ok(())
    }

    /// Builder-style [`push`](Self::push)
    pub fn with(mut self, layer: impl Layer + 'static) -> Result<Self> {
        self.push(layer)?;
        Ok(self)
    }

    /// Run every layer in order and return the final output signal
    ///
    /// # Errors
    ///
    /// - `SequenceMismatch` if `input` is a signal not at position 0, or a
    ///   layer produced an unexpected position
    /// - `InvalidConfig` if the chain is empty
    /// - any error raised by a layer
    pub fn forward(&mut self, input: impl Into<Input>) -> Result<&Signal> {
        let mut current = input.into();
        if let Input::Signal(signal) = &current {
            if signal.sequence_position() != 0 {
                return Err(LayerError::SequenceMismatch {
                    expected: 0,
                    got: signal.sequence_position(),
                });
            }
        }
        if self.layers.is_empty() {
            return Err(LayerError::InvalidConfig("chain has no layers".into()));
        }

        for (i, layer) in self.layers.iter_mut().enumerate() {
            let output = layer.forward(current)?;
            let expected = i + 1;
            if output.sequence_position() != expected {
                return Err(LayerError::SequenceMismatch {
                    expected,
                    got: output.sequence_position(),
                });
            }
            current = Input::Signal(output.detach());
        }

        debug!("chain forward: {} layers", self.layers.len());
        self.output()
    }

    /// Backpropagate `output_gradient` through every layer
    ///
    /// Returns one [`Gradients`] per layer, in layer order. The gradient
    /// with respect to the chain input stays on the first layer's input
    /// signal; see [`input_gradient`](Self::input_gradient).
    pub fn backward(&mut self, output_gradient: Tensor) -> Result<Vec<Gradients>> {
        let n = self.layers.len();
        self.layers
            .last_mut()
            .ok_or_else(|| LayerError::InvalidConfig("chain has no layers".into()))?
            .set_output_error(output_gradient)?;

        let mut grads = Vec::with_capacity(n);
        for i in (0..n).rev() {
            grads.push(self.layers[i].backward()?);
            if i == 0 {
                break;
            }

            let name = self.layers[i].name();
            let grad_x = self.layers[i]
                .take_input_error()
                .ok_or(LayerError::GradientNotReady { layer: name })?;
            trace!(
                "chain: gradient {:?} from {} (index {}) to {} (index {})",
                grad_x.shape,
                name,
                i,
                self.layers[i - 1].name(),
                i - 1
            );
            self.layers[i - 1].set_output_error(grad_x)?;
        }

        grads.reverse();
        Ok(grads)
    }

    /// Output signal of the last layer from the latest forward pass
    pub fn output(&self) -> Result<&Signal> {
        self.layers
            .last()
            .and_then(|layer| layer.output_signal())
            .ok_or(LayerError::NotEvaluated { layer: "chain" })
    }

    /// Gradient with respect to the chain input, after `backward`
    pub fn input_gradient(&self) -> Option<&Tensor> {
        self.layers
            .first()
            .and_then(|layer| layer.input_signal())
            .and_then(Signal::gradient)
    }

    /// Input width of the first layer that declares one
    pub fn input_features(&self) -> Option<usize> {
        self.layers.iter().find_map(|layer| layer.input_features())
    }

    /// Output width of the last layer that declares one
    pub fn output_features(&self) -> Option<usize> {
        self.layers.iter().rev().find_map(|layer| layer.output_features())
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Box<dyn Layer>] {
        &mut self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.parameter_count()).sum()
    }
}
