//! Dense Layer (Affine + Activation)
//!
//! The dense layer is an affine transform followed by an element-wise
//! activation:
//!
//! ## Forward Pass
//!
//! ```text
//! Input:  x [batch, n_in]
//! Weight: W [n_in, n_out]
//! Bias:   b [1, n_out]            (optional)
//! z = x @ W + b                   [batch, n_out]   (cached)
//! y = f(z)                        [batch, n_out]
//! ```
//!
//! ## Backward Pass
//!
//! Given `grad_y` from the output signal, the chain rule gives:
//!
//! ```text
//! grad_z = grad_y ⊙ f'(z)
//! grad_W = xᵀ @ grad_z            [n_in, n_out]
//! grad_b = Σ_batch grad_z         [1, n_out]
//! grad_x = grad_z @ Wᵀ            [batch, n_in]   → written to the input signal
//! ```
//!
//! - **grad_W**: each weight W[i,j] reaches y[*,j] through x[*,i]
//! - **grad_b**: each bias b[j] shifts every row of z[*,j] equally
//! - **grad_x**: the error handed to the previous layer
//!
//! ## Example
//!
//! ```rust
//! use knets::{Dense, Layer, Tensor};
//!
//! let w = Tensor::new(vec![2.0, 3.0], vec![2, 1]);
//! let b = Tensor::new(vec![1.0], vec![1, 1]);
//! let mut layer = Dense::from_parts(w, Some(b), None).unwrap();
//!
//! let out = layer.call(Tensor::new(vec![1.0, 1.0], vec![1, 2])).unwrap();
//! assert_eq!(out.read().data, vec![6.0]);
//!
//! layer.set_output_error(Tensor::new(vec![1.0], vec![1, 1])).unwrap();
//! let grads = layer.backward().unwrap();
//! assert_eq!(grads.weight().unwrap().data, vec![1.0, 1.0]);
//! assert_eq!(grads.bias().unwrap().data, vec![1.0]);
//! assert_eq!(layer.input_signal().unwrap().gradient().unwrap().data, vec![2.0, 3.0]);
//! ```

use super::base::{Input, Layer, LayerState};
use super::param::ParamLayer;
use crate::activation::{Activation, Linear};
use crate::error::{LayerError, Result};
use crate::gradients::{Gradients, BIAS, WEIGHT};
use crate::initializer::Initializer;
use crate::signal::Signal;
use crate::tensor::Tensor;
use log::debug;

/// Fully connected layer: `y = f(x @ W + b)`
#[derive(Debug)]
pub struct Dense {
    params: ParamLayer,
    state: LayerState,
    /// Pre-activation `x @ W + b` from the latest forward call
    affine: Option<Tensor>,
    n_in: usize,
    n_out: usize,
}

impl Dense {
    /// Dense layer with every default: linear activation, truncated-normal
    /// weights, bias of 0.01
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if either feature count is zero.
    pub fn new(n_in: usize, n_out: usize) -> Result<Self> {
        Self::builder(n_in, n_out).build()
    }

    pub fn builder(n_in: usize, n_out: usize) -> DenseBuilder {
        DenseBuilder::new(n_in, n_out)
    }

    /// Build from explicit parameters
    ///
    /// `weight` must be `[n_in, n_out]` and `bias`, if present, `[1, n_out]`.
    pub fn from_parts(
        weight: Tensor,
        bias: Option<Tensor>,
        activation: Option<Box<dyn Activation>>,
    ) -> Result<Self> {
        if weight.ndim() != 2 {
            return Err(LayerError::shape(
                "dense weight",
                &[weight.rows(), weight.cols()],
                &weight.shape,
            ));
        }
        let (n_in, n_out) = (weight.shape[0], weight.shape[1]);
        let activation = activation.unwrap_or_else(|| Box::new(Linear));
        Ok(Self::with_params(
            ParamLayer::from_parts(weight, bias, activation)?,
            n_in,
            n_out,
        ))
    }

    fn with_params(params: ParamLayer, n_in: usize, n_out: usize) -> Self {
        Self {
            params,
            state: LayerState::new(),
            affine: None,
            n_in,
            n_out,
        }
    }

    pub fn n_in(&self) -> usize {
        self.n_in
    }

    pub fn n_out(&self) -> usize {
        self.n_out
    }

    /// Pre-activation value cached by the latest forward call
    pub fn affine_output(&self) -> Option<&Tensor> {
        self.affine.as_ref()
    }
}

impl Layer for Dense {
    fn name(&self) -> &'static str {
        "dense"
    }

    fn forward(&mut self, input: Input) -> Result<&Signal> {
        self.affine = None;
        let x = self.state.process_input(input);

        if x.ndim() != 2 || x.cols() != self.n_in {
            return Err(LayerError::shape(
                "dense forward",
                &[x.rows(), self.n_in],
                &x.shape,
            ));
        }

        let mut affine = x.matmul(self.params.weight())?;
        if let Some(bias) = self.params.bias() {
            affine = affine.add(bias)?;
        }
        let activated = self.params.activation().call(&affine);

        debug!(
            "dense forward: {:?} -> {:?} ({})",
            x.shape,
            activated.shape,
            self.params.activation().name()
        );

        self.affine = Some(affine);
        let output = self.state.wrap_output(activated);
        debug!("dense output at position {}", output.sequence_position());
        Ok(output)
    }

    fn backward(&mut self) -> Result<Gradients> {
        let name = self.name();
        let grad_out = self.state.output_gradient(name)?;
        let affine = self
            .affine
            .as_ref()
            .ok_or(LayerError::NotEvaluated { layer: name })?;
        let x = self.state.input(name)?;

        // Chain rule through the activation
        let local = grad_out.mul(&self.params.activation().derivative(affine))?;

        let mut grads = Gradients::new();
        grads.insert(WEIGHT, x.t().matmul(&local)?);
        if self.params.use_bias() {
            grads.insert(BIAS, local.sum_axis(0, true));
        }

        let grad_x = local.matmul(&self.params.weight().t())?;

        debug!(
            "dense backward at position {:?}: grad_out {:?} -> grad_x {:?}",
            self.state.sequence_position(),
            grad_out.shape,
            grad_x.shape
        );

        self.state.set_input_error(name, grad_x)?;
        Ok(grads)
    }

    fn state(&self) -> &LayerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LayerState {
        &mut self.state
    }

    fn input_features(&self) -> Option<usize> {
        Some(self.n_in)
    }

    fn output_features(&self) -> Option<usize> {
        Some(self.n_out)
    }

    fn params(&self) -> Option<&ParamLayer> {
        Some(&self.params)
    }

    fn params_mut(&mut self) -> Option<&mut ParamLayer> {
        Some(&mut self.params)
    }
}

/// Configures and builds a [`Dense`] layer
///
/// ```rust
/// use knets::activation::Relu;
/// use knets::initializer::XavierUniform;
/// use knets::{Dense, Layer};
///
/// let layer = Dense::builder(784, 128)
///     .activation(Relu)
///     .weight_initializer(XavierUniform::new().with_seed(42))
///     .build()
///     .unwrap();
/// assert_eq!(layer.parameter_count(), 784 * 128 + 128);
/// ```
#[derive(Debug)]
pub struct DenseBuilder {
    n_in: usize,
    n_out: usize,
    activation: Option<Box<dyn Activation>>,
    weight_initializer: Option<Box<dyn Initializer>>,
    bias_initializer: Option<Box<dyn Initializer>>,
    use_bias: bool,
}

impl DenseBuilder {
    pub fn new(n_in: usize, n_out: usize) -> Self {
        Self {
            n_in,
            n_out,
            activation: None,
            weight_initializer: None,
            bias_initializer: None,
            use_bias: true,
        }
    }

    pub fn activation(self, activation: impl Activation + 'static) -> Self {
        self.boxed_activation(Box::new(activation))
    }

    pub fn boxed_activation(mut self, activation: Box<dyn Activation>) -> Self {
        self.activation = Some(activation);
        self
    }

    pub fn weight_initializer(self, init: impl Initializer + 'static) -> Self {
        self.boxed_weight_initializer(Box::new(init))
    }

    pub fn boxed_weight_initializer(mut self, init: Box<dyn Initializer>) -> Self {
        self.weight_initializer = Some(init);
        self
    }

    pub fn bias_initializer(self, init: impl Initializer + 'static) -> Self {
        self.boxed_bias_initializer(Box::new(init))
    }

    pub fn boxed_bias_initializer(mut self, init: Box<dyn Initializer>) -> Self {
        self.bias_initializer = Some(init);
        self
    }

    pub fn use_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    /// Allocate the parameters and run the initializers
    pub fn build(self) -> Result<Dense> {
        let params = ParamLayer::new(
            &[self.n_in, self.n_out],
            self.activation,
            self.weight_initializer.as_deref(),
            self.bias_initializer.as_deref(),
            self.use_bias,
        )?;
        Ok(Dense::with_params(params, self.n_in, self.n_out))
    }
}
