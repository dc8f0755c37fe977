//! Chain Configuration
//!
//! Describes a chain of layers as data so architectures can be changed
//! without recompiling. Configurations are JSON:
//!
//! ```json
//! {
//!   "layers": [
//!     { "type": "dense", "n_in": 2, "n_out": 8, "activation": "tanh",
//!       "weight_initializer": "xavier_uniform" },
//!     { "type": "dense", "n_in": 8, "n_out": 1,
//!       "weight_initializer": { "kind": "random_uniform", "low": -0.5, "high": 0.5, "seed": 1 } },
//!     { "type": "activation", "name": "sigmoid" }
//!   ]
//! }
//! ```
//!
//! ## Dense Fields
//!
//! | Field                | Default                 |
//! |----------------------|-------------------------|
//! | `n_in`, `n_out`      | required, non-zero      |
//! | `activation`         | `"linear"`              |
//! | `alpha`              | activation's default    |
//! | `use_bias`           | `true`                  |
//! | `weight_initializer` | truncated normal (0, 0.01) |
//! | `bias_initializer`   | constant 0.01           |
//!
//! Initializers are either a name from
//! [`INITIALIZER_NAMES`](crate::initializer::INITIALIZER_NAMES) or a full
//! [`InitializerSpec`] object.

use crate::activation;
use crate::chain::Chain;
use crate::error::{LayerError, Result};
use crate::initializer::{self, Initializer, InitializerSpec};
use crate::layers::{ActivationLayer, Dense, Layer};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Initializer given by name or by full description
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitializerConfig {
    Name(String),
    Spec(InitializerSpec),
}

impl InitializerConfig {
    pub fn build(&self) -> Result<Box<dyn Initializer>> {
        match self {
            InitializerConfig::Name(name) => initializer::from_name(name),
            InitializerConfig::Spec(spec) => spec.build(),
        }
    }
}

fn default_activation() -> String {
    "linear".to_string()
}

fn default_use_bias() -> bool {
    true
}

/// One layer of a [`ChainConfig`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerConfig {
    Dense {
        n_in: usize,
        n_out: usize,
        #[serde(default = "default_activation")]
        activation: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alpha: Option<f32>,
        #[serde(default = "default_use_bias")]
        use_bias: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        weight_initializer: Option<InitializerConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bias_initializer: Option<InitializerConfig>,
    },
    Activation {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alpha: Option<f32>,
    },
}

impl LayerConfig {
    /// Dense layer with the given activation and default initializers
    pub fn dense(n_in: usize, n_out: usize, activation: &str) -> Self {
        LayerConfig::Dense {
            n_in,
            n_out,
            activation: activation.to_string(),
            alpha: None,
            use_bias: true,
            weight_initializer: None,
            bias_initializer: None,
        }
    }

    pub fn activation(name: &str) -> Self {
        LayerConfig::Activation {
            name: name.to_string(),
            alpha: None,
        }
    }

    /// Construct the layer
    ///
    /// # Errors
    ///
    /// - `TypeError` for unknown activation or initializer names
    /// - `InvalidConfig` for zero feature counts, a non-finite `alpha` or bad
    ///   initializer parameters
    pub fn build(&self) -> Result<Box<dyn Layer>> {
        match self {
            LayerConfig::Dense {
                n_in,
                n_out,
                activation,
                alpha,
                use_bias,
                weight_initializer,
                bias_initializer,
            } => {
                let mut builder = Dense::builder(*n_in, *n_out)
                    .boxed_activation(activation::from_name(activation, *alpha)?)
                    .use_bias(*use_bias);
                if let Some(init) = weight_initializer {
                    builder = builder.boxed_weight_initializer(init.build()?);
                }
                if let Some(init) = bias_initializer {
                    builder = builder.boxed_bias_initializer(init.build()?);
                }
                Ok(Box::new(builder.build()?))
            }
            LayerConfig::Activation { name, alpha } => {
                Ok(Box::new(ActivationLayer::from_name(name, *alpha)?))
            }
        }
    }
}

/// Ordered list of layer descriptions
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub layers: Vec<LayerConfig>,
}

impl ChainConfig {
    /// Multi-layer perceptron over `sizes`: `hidden` activation on every
    /// dense layer but the last, which uses `output`
    ///
    /// ```rust
    /// use knets::config::ChainConfig;
    ///
    /// let config = ChainConfig::mlp(&[2, 8, 1], "tanh", "sigmoid");
    /// assert_eq!(config.layers.len(), 2);
    /// let chain = config.build().unwrap();
    /// assert_eq!(chain.parameter_count(), (2 * 8 + 8) + (8 + 1));
    /// ```
    pub fn mlp(sizes: &[usize], hidden: &str, output: &str) -> Self {
        let n = sizes.len().saturating_sub(1);
        let layers = sizes
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let act = if i + 1 == n { output } else { hidden };
                LayerConfig::dense(pair[0], pair[1], act)
            })
            .collect();
        Self { layers }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the configuration without allocating any parameters
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` for an empty layer list, zero feature counts,
    ///   adjacent dense layers whose widths disagree, a non-finite `alpha`,
    ///   or initializer parameters the initializer would reject
    /// - `TypeError` for unknown activation or initializer names
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(LayerError::InvalidConfig("no layers configured".into()));
        }

        let mut width: Option<usize> = None;
        for (i, layer) in self.layers.iter().enumerate() {
            match layer {
                LayerConfig::Dense {
                    n_in,
                    n_out,
                    activation,
                    alpha,
                    weight_initializer,
                    bias_initializer,
                    ..
                } => {
                    if *n_in == 0 || *n_out == 0 {
                        return Err(LayerError::InvalidConfig(format!(
                            "layer {i}: dense feature counts must be non-zero, got {n_in} -> {n_out}"
                        )));
                    }
                    if let Some(w) = width {
                        if w != *n_in {
                            return Err(LayerError::InvalidConfig(format!(
                                "layer {i}: expects {n_in} input features but previous layer produces {w}"
                            )));
                        }
                    }
                    activation::from_name(activation, *alpha)?;
                    for init in [weight_initializer, bias_initializer].into_iter().flatten() {
                        init.build()?;
                    }
                    width = Some(*n_out);
                }
                LayerConfig::Activation { name, alpha } => {
                    activation::from_name(name, *alpha)?;
                }
            }
        }
        Ok(())
    }

    /// Validate and construct the chain
    pub fn build(&self) -> Result<Chain> {
        self.validate()?;
        let mut chain = Chain::new();
        for layer in &self.layers {
            chain.push_boxed(layer.build()?)?;
        }
        Ok(chain)
    }
}

/// Load and validate a chain configuration from a JSON file
pub fn load_config(path: impl AsRef<Path>) -> Result<ChainConfig> {
    let contents = fs::read_to_string(path)?;
    let config = ChainConfig::from_json_str(&contents)?;
    config.validate()?;
    Ok(config)
}
