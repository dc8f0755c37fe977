//! Parametric Layer Base
//!
//! [`ParamLayer`] is the parameter bag shared by layers with trainable
//! weights: a weight tensor, an optional bias, and the activation applied to
//! the affine result. Concrete layers (such as [`Dense`](super::Dense)) embed
//! one and supply the forward/backward math.
//!
//! ## Shapes
//!
//! ```text
//! weight: w_shape                  e.g. [n_in, n_out]
//! bias:   [1, ..., 1, w_shape[-1]] e.g. [1, n_out]
//! ```
//!
//! Only the output-feature axis carries bias values; every other axis
//! broadcasts.
//!
//! ## Initialization
//!
//! Parameters are initialized once, in [`ParamLayer::new`]. When no
//! initializer is given, weights use a truncated normal (mean 0, stddev 0.01)
//! and biases the constant 0.01. The layer never changes its own parameters
//! afterwards; an optimizer does, through [`ParamLayer::weight_mut`] and
//! [`ParamLayer::bias_mut`].

use crate::activation::{Activation, Linear};
use crate::error::{LayerError, Result};
use crate::initializer::{default_bias_initializer, default_weight_initializer, Initializer};
use crate::tensor::Tensor;

/// Weight, optional bias and activation of a parametric layer
#[derive(Debug)]
pub struct ParamLayer {
    weight: Tensor,
    bias: Option<Tensor>,
    activation: Box<dyn Activation>,
}

/// Bias shape for a weight shape: ones everywhere except the last axis
pub fn bias_shape(w_shape: &[usize]) -> Vec<usize> {
    let mut shape = vec![1; w_shape.len()];
    if let (Some(last), Some(&out)) = (shape.last_mut(), w_shape.last()) {
        *last = out;
    }
    shape
}

impl ParamLayer {
    /// Allocate and initialize parameters
    ///
    /// # Arguments
    ///
    /// * `w_shape` - Weight shape, at least one axis, no zero-sized axes
    /// * `activation` - Nonlinearity, `None` for linear
    /// * `weight_initializer` - `None` for truncated normal (0, 0.01)
    /// * `bias_initializer` - `None` for constant 0.01
    /// * `use_bias` - Whether to allocate a bias
    pub fn new(
        w_shape: &[usize],
        activation: Option<Box<dyn Activation>>,
        weight_initializer: Option<&dyn Initializer>,
        bias_initializer: Option<&dyn Initializer>,
        use_bias: bool,
    ) -> Result<Self> {
        if w_shape.is_empty() || w_shape.contains(&0) {
            return Err(LayerError::InvalidConfig(format!(
                "weight shape must be non-empty with non-zero axes, got {w_shape:?}"
            )));
        }

        let mut weight = Tensor::zeros(w_shape.to_vec());
        match weight_initializer {
            Some(init) => init.initialize(&mut weight),
            None => default_weight_initializer()?.initialize(&mut weight),
        }

        let bias = if use_bias {
            let mut bias = Tensor::zeros(bias_shape(w_shape));
            match bias_initializer {
                Some(init) => init.initialize(&mut bias),
                None => default_bias_initializer().initialize(&mut bias),
            }
            Some(bias)
        } else {
            None
        };

        Ok(Self {
            weight,
            bias,
            activation: activation.unwrap_or_else(|| Box::new(Linear)),
        })
    }

    /// Adopt existing parameter tensors
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if `bias` is not shaped `[1, ..., 1, n_out]` for the
    /// given weight.
    pub fn from_parts(
        weight: Tensor,
        bias: Option<Tensor>,
        activation: Box<dyn Activation>,
    ) -> Result<Self> {
        if weight.shape.is_empty() || weight.shape.contains(&0) {
            return Err(LayerError::InvalidConfig(format!(
                "weight shape must be non-empty with non-zero axes, got {:?}",
                weight.shape
            )));
        }
        if let Some(bias) = &bias {
            let expected = bias_shape(&weight.shape);
            if bias.shape != expected {
                return Err(LayerError::shape("bias", &expected, &bias.shape));
            }
        }
        Ok(Self {
            weight,
            bias,
            activation,
        })
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn weight_mut(&mut self) -> &mut Tensor {
        &mut self.weight
    }

    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    pub fn bias_mut(&mut self) -> Option<&mut Tensor> {
        self.bias.as_mut()
    }

    pub fn use_bias(&self) -> bool {
        self.bias.is_some()
    }

    pub fn activation(&self) -> &dyn Activation {
        self.activation.as_ref()
    }

    /// Weights plus biases
    pub fn parameter_count(&self) -> usize {
        self.weight.len() + self.bias.as_ref().map_or(0, Tensor::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Tanh;
    use crate::initializer::{Constant, Ones};

    #[test]
    fn test_bias_shape_broadcasts_last_axis() {
        assert_eq!(bias_shape(&[4, 3]), vec![1, 3]);
        assert_eq!(bias_shape(&[2, 4, 3]), vec![1, 1, 3]);
    }

    #[test]
    fn test_defaults() {
        let p = ParamLayer::new(&[10, 5], None, None, None, true).unwrap();
        assert_eq!(p.activation().name(), "linear");
        assert!(p.weight().data.iter().all(|v| v.abs() <= 0.02 + 1e-6));
        assert!(p.bias().unwrap().data.iter().all(|&v| v == 0.01));
        assert_eq!(p.parameter_count(), 55);
    }

    #[test]
    fn test_explicit_capabilities() {
        let p = ParamLayer::new(
            &[2, 3],
            Some(Box::new(Tanh)),
            Some(&Ones),
            Some(&Constant::new(-1.0)),
            true,
        )
        .unwrap();
        assert_eq!(p.activation().name(), "tanh");
        assert!(p.weight().data.iter().all(|&v| v == 1.0));
        assert_eq!(p.bias().unwrap().data, vec![-1.0, -1.0, -1.0]);
    }

    #[test]
    fn test_no_bias() {
        let p = ParamLayer::new(&[2, 3], None, None, Some(&Ones), false).unwrap();
        assert!(p.bias().is_none());
        assert!(!p.use_bias());
        assert_eq!(p.parameter_count(), 6);
    }

    #[test]
    fn test_zero_sized_weight_rejected() {
        assert!(matches!(
            ParamLayer::new(&[0, 3], None, None, None, true),
            Err(LayerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_parts_checks_bias() {
        let err = ParamLayer::from_parts(
            Tensor::zeros(vec![2, 3]),
            Some(Tensor::zeros(vec![3])),
            Box::new(Linear),
        )
        .unwrap_err();
        assert_eq!(err, LayerError::shape("bias", &[1, 3], &[3]));
    }
}
