//! Activation Capabilities
//!
//! An activation is an element-wise nonlinearity paired with its derivative.
//! Layers call [`Activation::call`] on the pre-activation value during the
//! forward pass and [`Activation::derivative`] on the *same* cached value
//! during the backward pass:
//!
//! ```text
//! forward:  a = f(z)
//! backward: grad_z = grad_a ⊙ f'(z)
//! ```
//!
//! ## Variants
//!
//! | Name         | f(z)                              | f'(z)                         |
//! |--------------|-----------------------------------|-------------------------------|
//! | `linear`     | z                                 | 1                             |
//! | `relu`       | max(0, z)                         | 1 if z > 0 else 0             |
//! | `leaky_relu` | z if z > 0 else αz                | 1 if z > 0 else α             |
//! | `elu`        | z if z > 0 else α(eᶻ − 1)         | 1 if z > 0 else αeᶻ           |
//! | `sigmoid`    | 1 / (1 + e⁻ᶻ)                     | σ(z)(1 − σ(z))                |
//! | `tanh`       | tanh z                            | 1 − tanh² z                   |
//! | `gelu`       | tanh approximation (see [`Gelu`]) | analytic derivative           |
//! | `softplus`   | ln(1 + eᶻ)                        | σ(z)                          |
//!
//! Capability conformance is checked by the compiler. The only runtime check
//! is [`from_name`], which turns a configuration string into a boxed
//! activation and reports unknown names as `TypeError`.

use crate::error::{LayerError, Result};
use crate::tensor::Tensor;
use std::fmt::Debug;

/// Element-wise nonlinearity with a paired derivative
pub trait Activation: Debug + Send + Sync {
    /// Short configuration name (e.g. `"relu"`)
    fn name(&self) -> &'static str;

    /// Apply the nonlinearity element-wise
    fn call(&self, z: &Tensor) -> Tensor;

    /// Derivative evaluated at the pre-activation point `z`
    fn derivative(&self, z: &Tensor) -> Tensor;
}

impl<A: Activation + ?Sized> Activation for Box<A> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn call(&self, z: &Tensor) -> Tensor {
        (**self).call(z)
    }

    fn derivative(&self, z: &Tensor) -> Tensor {
        (**self).derivative(z)
    }
}

/// Identity activation, the default when none is configured
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Linear;

impl Activation for Linear {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn call(&self, z: &Tensor) -> Tensor {
        z.clone()
    }

    fn derivative(&self, z: &Tensor) -> Tensor {
        Tensor::full(z.shape.clone(), 1.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Relu;

impl Activation for Relu {
    fn name(&self) -> &'static str {
        "relu"
    }

    fn call(&self, z: &Tensor) -> Tensor {
        z.map(|v| v.max(0.0))
    }

    fn derivative(&self, z: &Tensor) -> Tensor {
        z.map(|v| if v > 0.0 { 1.0 } else { 0.0 })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeakyRelu {
    pub alpha: f32,
}

impl Default for LeakyRelu {
    fn default() -> Self {
        Self { alpha: 0.01 }
    }
}

impl Activation for LeakyRelu {
    fn name(&self) -> &'static str {
        "leaky_relu"
    }

    fn call(&self, z: &Tensor) -> Tensor {
        let alpha = self.alpha;
        z.map(move |v| if v > 0.0 { v } else { alpha * v })
    }

    fn derivative(&self, z: &Tensor) -> Tensor {
        let alpha = self.alpha;
        z.map(move |v| if v > 0.0 { 1.0 } else { alpha })
    }
}

/// Exponential linear unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Elu {
    pub alpha: f32,
}

impl Default for Elu {
    fn default() -> Self {
        Self { alpha: 1.0 }
    }
}

impl Activation for Elu {
    fn name(&self) -> &'static str {
        "elu"
    }

    fn call(&self, z: &Tensor) -> Tensor {
        let alpha = self.alpha;
        z.map(move |v| if v > 0.0 { v } else { alpha * (v.exp() - 1.0) })
    }

    fn derivative(&self, z: &Tensor) -> Tensor {
        let alpha = self.alpha;
        z.map(move |v| if v > 0.0 { 1.0 } else { alpha * v.exp() })
    }
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sigmoid;

impl Activation for Sigmoid {
    fn name(&self) -> &'static str {
        "sigmoid"
    }

    fn call(&self, z: &Tensor) -> Tensor {
        z.map(sigmoid)
    }

    fn derivative(&self, z: &Tensor) -> Tensor {
        z.map(|v| {
            let s = sigmoid(v);
            s * (1.0 - s)
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tanh;

impl Activation for Tanh {
    fn name(&self) -> &'static str {
        "tanh"
    }

    fn call(&self, z: &Tensor) -> Tensor {
        z.map(f32::tanh)
    }

    fn derivative(&self, z: &Tensor) -> Tensor {
        z.map(|v| {
            let t = v.tanh();
            1.0 - t * t
        })
    }
}

/// Gaussian error linear unit, tanh approximation
///
/// ```text
/// GELU(x) ≈ 0.5 × x × (1 + tanh(√(2/π) × (x + 0.044715 × x³)))
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Gelu;

impl Activation for Gelu {
    fn name(&self) -> &'static str {
        "gelu"
    }

    fn call(&self, z: &Tensor) -> Tensor {
        z.map(|val| {
            0.5 * val
                * (1.0
                    + ((2.0 / std::f32::consts::PI).sqrt() * (val + 0.044715 * val.powi(3))).tanh())
        })
    }

    fn derivative(&self, z: &Tensor) -> Tensor {
        z.map(|x_val| {
            let sqrt_2_pi = (2.0 / std::f32::consts::PI).sqrt();
            let inner = sqrt_2_pi * (x_val + 0.044715 * x_val.powi(3));
            let tanh_inner = inner.tanh();
            let sech_sq = 1.0 - tanh_inner * tanh_inner;

            0.5 * (1.0 + tanh_inner)
                + 0.5 * x_val * sech_sq * sqrt_2_pi * (1.0 + 3.0 * 0.044715 * x_val.powi(2))
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Softplus;

impl Activation for Softplus {
    fn name(&self) -> &'static str {
        "softplus"
    }

    fn call(&self, z: &Tensor) -> Tensor {
        // max(z, 0) + ln(1 + e^-|z|) avoids overflow for large z
        z.map(|v| v.max(0.0) + (-v.abs()).exp().ln_1p())
    }

    fn derivative(&self, z: &Tensor) -> Tensor {
        z.map(sigmoid)
    }
}

/// Every name accepted by [`from_name`]
pub const ACTIVATION_NAMES: [&str; 8] = [
    "linear",
    "relu",
    "leaky_relu",
    "elu",
    "sigmoid",
    "tanh",
    "gelu",
    "softplus",
];

/// Select an activation by configuration name
///
/// `alpha` parameterizes `leaky_relu` and `elu` and is ignored otherwise.
///
/// # Errors
///
/// - `TypeError` for names outside [`ACTIVATION_NAMES`]
/// - `InvalidConfig` for a non-finite `alpha`
///
/// ```rust
/// use knets::activation::from_name;
///
/// assert_eq!(from_name("tanh", None).unwrap().name(), "tanh");
/// assert!(from_name("swish", None).is_err());
/// ```
pub fn from_name(name: &str, alpha: Option<f32>) -> Result<Box<dyn Activation>> {
    if let Some(alpha) = alpha.filter(|a| !a.is_finite()) {
        return Err(LayerError::InvalidConfig(format!(
            "activation `{name}` needs a finite alpha, got {alpha}"
        )));
    }
    let activation: Box<dyn Activation> = match name {
        "linear" => Box::new(Linear),
        "relu" => Box::new(Relu),
        "leaky_relu" => Box::new(alpha.map_or_else(LeakyRelu::default, |alpha| LeakyRelu { alpha })),
        "elu" => Box::new(alpha.map_or_else(Elu::default, |alpha| Elu { alpha })),
        "sigmoid" => Box::new(Sigmoid),
        "tanh" => Box::new(Tanh),
        "gelu" => Box::new(Gelu),
        "softplus" => Box::new(Softplus),
        other => {
            return Err(LayerError::TypeError {
                expected: "activation (linear, relu, leaky_relu, elu, sigmoid, tanh, gelu, softplus)",
                got: other.to_string(),
            })
        }
    };
    Ok(activation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sample_points() -> Tensor {
        Tensor::new(vec![-2.0, -0.5, 0.3, 1.7], vec![1, 4])
    }

    /// Central finite difference of `call` against `derivative`
    fn check_derivative(act: &dyn Activation) {
        let z = sample_points();
        let analytic = act.derivative(&z);
        let h = 1e-3;
        let plus = act.call(&z.map(|v| v + h));
        let minus = act.call(&z.map(|v| v - h));
        for i in 0..z.len() {
            let numeric = (plus.data[i] - minus.data[i]) / (2.0 * h);
            assert_abs_diff_eq!(analytic.data[i], numeric, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_linear_identity() {
        let z = sample_points();
        assert_eq!(Linear.call(&z), z);
        assert!(Linear.derivative(&z).data.iter().all(|&d| d == 1.0));
    }

    #[test]
    fn test_relu_values() {
        assert_eq!(Relu.call(&sample_points()).data, vec![0.0, 0.0, 0.3, 1.7]);
        assert_eq!(Relu.derivative(&sample_points()).data, vec![0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_sigmoid_at_zero() {
        let z = Tensor::zeros(vec![1, 1]);
        assert_abs_diff_eq!(Sigmoid.call(&z).data[0], 0.5);
        assert_abs_diff_eq!(Sigmoid.derivative(&z).data[0], 0.25);
    }

    #[test]
    fn test_softplus_large_input_is_finite() {
        let z = Tensor::new(vec![100.0, -100.0], vec![1, 2]);
        let out = Softplus.call(&z);
        assert_abs_diff_eq!(out.data[0], 100.0, epsilon = 1e-3);
        assert!(out.data[1] >= 0.0 && out.data[1] < 1e-6);
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        let all: Vec<Box<dyn Activation>> = ACTIVATION_NAMES
            .iter()
            .map(|name| from_name(name, None).unwrap())
            .collect();
        for act in &all {
            check_derivative(act.as_ref());
        }
    }

    #[test]
    fn test_from_name_alpha() {
        let leaky = from_name("leaky_relu", Some(0.2)).unwrap();
        let z = Tensor::new(vec![-1.0], vec![1, 1]);
        assert_abs_diff_eq!(leaky.call(&z).data[0], -0.2);
    }

    #[test]
    fn test_from_name_rejects_non_finite_alpha() {
        for alpha in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            assert!(matches!(
                from_name("elu", Some(alpha)),
                Err(LayerError::InvalidConfig(_))
            ));
        }
        assert!(from_name("leaky_relu", Some(f32::NAN)).is_err());
    }

    #[test]
    fn test_from_name_unknown() {
        let err = from_name("swish", None).unwrap_err();
        assert!(matches!(err, LayerError::TypeError { got, .. } if got == "swish"));
    }
}
