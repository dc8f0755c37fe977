//! Signals: Tensors Tagged with Chain Position
//!
//! A [`Signal`] is what travels between layers. It carries the raw tensor,
//! the position in the chain where it was produced, and a single-assignment
//! gradient slot.
//!
//! ## Gradient Slot
//!
//! ```text
//! Empty ──set_error──▶ Set ──take_error──▶ Taken
//!   ▲                   │                    │
//!   └── new / detach    └── set_error ✗      └── set_error ✗ (AlreadySet)
//! ```
//!
//! Taking the gradient out is how it moves to the preceding layer. The slot
//! stays spent afterwards, so a `Signal` can never carry two gradients; a new
//! training step needs a fresh forward pass.
//!
//! ## Example
//!
//! ```rust
//! use knets::{LayerError, Signal, Tensor};
//!
//! let mut signal = Signal::new(Tensor::zeros(vec![2, 3]), 0);
//! signal.set_error(Tensor::full(vec![2, 3], 1.0)).unwrap();
//! assert!(signal.gradient().is_some());
//!
//! let again = signal.set_error(Tensor::zeros(vec![2, 3]));
//! assert_eq!(again, Err(LayerError::AlreadySet { position: 0 }));
//! ```

use crate::error::{LayerError, Result};
use crate::tensor::Tensor;

#[derive(Clone, Debug, PartialEq)]
enum GradientSlot {
    Empty,
    Set(Tensor),
    Taken,
}

/// A tensor wrapped with its sequence position and gradient slot
#[derive(Clone, Debug, PartialEq)]
pub struct Signal {
    data: Tensor,
    sequence_position: usize,
    gradient: GradientSlot,
}

impl Signal {
    /// Wrap `data` at `sequence_position` with an empty gradient slot
    pub fn new(data: Tensor, sequence_position: usize) -> Self {
        Self {
            data,
            sequence_position,
            gradient: GradientSlot::Empty,
        }
    }

    /// Store the gradient of the loss with respect to this signal's data
    ///
    /// # Errors
    ///
    /// - `ShapeMismatch` if `gradient` is not shaped like the data
    /// - `AlreadySet` if the slot was written before
    pub fn set_error(&mut self, gradient: Tensor) -> Result<()> {
        if !matches!(self.gradient, GradientSlot::Empty) {
            return Err(LayerError::AlreadySet {
                position: self.sequence_position,
            });
        }
        if gradient.shape != self.data.shape {
            return Err(LayerError::shape(
                "set_error",
                &self.data.shape,
                &gradient.shape,
            ));
        }
        self.gradient = GradientSlot::Set(gradient);
        Ok(())
    }

    /// Immutable view of the wrapped tensor
    pub fn read(&self) -> &Tensor {
        &self.data
    }

    pub fn data(&self) -> &Tensor {
        &self.data
    }

    pub fn sequence_position(&self) -> usize {
        self.sequence_position
    }

    /// The stored gradient, if it is set and has not been taken
    pub fn gradient(&self) -> Option<&Tensor> {
        match &self.gradient {
            GradientSlot::Set(g) => Some(g),
            _ => None,
        }
    }

    /// True once the slot has been written, whether or not it was taken
    pub fn has_error(&self) -> bool {
        !matches!(self.gradient, GradientSlot::Empty)
    }

    /// Move the gradient out, leaving the slot spent
    pub fn take_error(&mut self) -> Option<Tensor> {
        match std::mem::replace(&mut self.gradient, GradientSlot::Taken) {
            GradientSlot::Set(g) => Some(g),
            GradientSlot::Empty => {
                self.gradient = GradientSlot::Empty;
                None
            }
            GradientSlot::Taken => None,
        }
    }

    /// Copy of the data and position with a fresh, empty gradient slot
    ///
    /// Used to hand a layer's output to its successor: each side then owns
    /// its own slot and gradients move between them explicitly.
    pub fn detach(&self) -> Signal {
        Signal::new(self.data.clone(), self.sequence_position)
    }

    /// Unwrap into the raw tensor
    pub fn into_data(self) -> Tensor {
        self.data
    }
}
