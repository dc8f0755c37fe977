//! Parameter Gradients
//!
//! `backward` returns the gradient of the loss with respect to each of a
//! layer's parameters, keyed by parameter name:
//!
//! ```text
//! Dense with bias:    {"b": grad_b, "w": grad_w}
//! Dense without bias: {"w": grad_w}
//! ActivationLayer:    {}
//! ```
//!
//! The layers never apply these themselves; the caller's optimizer reads
//! them and updates the parameters between steps.
//!
//! ## Monitoring
//!
//! [`compute_grad_norm`] reduces the gradients of a whole chain to one L2
//! norm, the usual number to watch for exploding or vanishing gradients:
//!
//! ```text
//! norm = √(Σ g²)  over every gradient tensor of every layer
//! ```
//!
//! ## Example
//!
//! ```rust
//! use knets::{Gradients, Tensor};
//! use knets::gradients::compute_grad_norm;
//!
//! let mut grads = Gradients::new();
//! grads.insert("w", Tensor::new(vec![3.0, 4.0], vec![2, 1]));
//! assert_eq!(compute_grad_norm(&[grads]), 5.0);
//! ```

use crate::tensor::Tensor;
use std::collections::BTreeMap;

/// Name of the weight parameter in a [`Gradients`] map
pub const WEIGHT: &str = "w";
/// Name of the bias parameter in a [`Gradients`] map
pub const BIAS: &str = "b";

/// Mapping from parameter name to gradient tensor
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Gradients {
    grads: BTreeMap<&'static str, Tensor>,
}

impl Gradients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &'static str, grad: Tensor) {
        self.grads.insert(name, grad);
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.grads.get(name)
    }

    /// Gradient of the weight matrix, if the layer has one
    pub fn weight(&self) -> Option<&Tensor> {
        self.get(WEIGHT)
    }

    /// Gradient of the bias, if the layer has one
    pub fn bias(&self) -> Option<&Tensor> {
        self.get(BIAS)
    }

    pub fn len(&self) -> usize {
        self.grads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grads.is_empty()
    }

    /// Iterate over `(name, gradient)` pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Tensor)> {
        self.grads.iter().map(|(name, grad)| (*name, grad))
    }

    /// Sum of squares over every gradient in this map
    pub fn sum_squares(&self) -> f32 {
        self.grads.values().map(Tensor::sum_squares).sum()
    }
}

impl IntoIterator for Gradients {
    type Item = (&'static str, Tensor);
    type IntoIter = std::collections::btree_map::IntoIter<&'static str, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.grads.into_iter()
    }
}

/// Compute the L2 norm over the gradients of several layers
///
/// Layers without parameters contribute nothing. Each tensor's sum of
/// squares is computed in parallel.
pub fn compute_grad_norm(grads: &[Gradients]) -> f32 {
    grads.iter().map(Gradients::sum_squares).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_accessors() {
        let mut g = Gradients::new();
        g.insert(WEIGHT, Tensor::zeros(vec![2, 2]));
        assert!(g.weight().is_some());
        assert!(g.bias().is_none());
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn test_iteration_is_name_ordered() {
        let mut g = Gradients::new();
        g.insert(WEIGHT, Tensor::zeros(vec![1, 1]));
        g.insert(BIAS, Tensor::zeros(vec![1, 1]));
        let names: Vec<_> = g.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "w"]);
    }

    #[test]
    fn test_grad_norm_across_layers() {
        let mut a = Gradients::new();
        a.insert(WEIGHT, Tensor::new(vec![1.0, 2.0], vec![1, 2]));
        let mut b = Gradients::new();
        b.insert(WEIGHT, Tensor::new(vec![2.0], vec![1, 1]));
        b.insert(BIAS, Tensor::new(vec![4.0], vec![1, 1]));
        // sqrt(1 + 4 + 4 + 16) = 5
        assert_eq!(compute_grad_norm(&[a, Gradients::new(), b]), 5.0);
    }

    #[test]
    fn test_empty_norm_is_zero() {
        assert_eq!(compute_grad_norm(&[]), 0.0);
    }
}
