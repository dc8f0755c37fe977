//! Parameter Initializers
//!
//! An initializer fills a freshly allocated parameter tensor in place. Layers
//! run their initializers exactly once, at construction.
//!
//! ## Defaults
//!
//! - Weights: `TruncatedNormal(mean = 0.0, stddev = 0.01)`
//! - Biases: `Constant(0.01)`
//!
//! ## Reproducibility
//!
//! Randomized initializers draw from an OS-seeded [`StdRng`] unless a seed is
//! given with `with_seed`, in which case every call produces the same fill.
//!
//! ```rust
//! use knets::initializer::{Initializer, TruncatedNormal};
//! use knets::Tensor;
//!
//! let init = TruncatedNormal::new(0.0, 0.5).unwrap().with_seed(7);
//! let mut a = Tensor::zeros(vec![4, 4]);
//! let mut b = Tensor::zeros(vec![4, 4]);
//! init.initialize(&mut a);
//! init.initialize(&mut b);
//! assert_eq!(a, b);
//! assert!(a.data.iter().all(|v| v.abs() <= 1.0));
//! ```

use crate::error::{LayerError, Result};
use crate::tensor::Tensor;
use rand::distr::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, StandardNormal};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// In-place parameter fill
pub trait Initializer: Debug {
    fn initialize(&self, tensor: &mut Tensor);
}

impl<I: Initializer + ?Sized> Initializer for Box<I> {
    fn initialize(&self, tensor: &mut Tensor) {
        (**self).initialize(tensor)
    }
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Fan-in and fan-out of a weight shape `[fan_in, ..., fan_out]`
fn fans(shape: &[usize]) -> (usize, usize) {
    let fan_in = shape.first().copied().unwrap_or(1);
    let fan_out = shape.last().copied().unwrap_or(1);
    (fan_in.max(1), fan_out.max(1))
}

fn normal(mean: f32, stddev: f32) -> Result<Normal<f32>> {
    if !mean.is_finite() || !stddev.is_finite() || stddev <= 0.0 {
        return Err(LayerError::InvalidConfig(format!(
            "normal initializer needs finite mean and positive stddev, got mean={mean}, stddev={stddev}"
        )));
    }
    Normal::new(mean, stddev).map_err(|e| LayerError::InvalidConfig(e.to_string()))
}

/// Fill with a single value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constant {
    pub value: f32,
}

impl Constant {
    pub fn new(value: f32) -> Self {
        Self { value }
    }
}

impl Initializer for Constant {
    fn initialize(&self, tensor: &mut Tensor) {
        tensor.data.fill(self.value);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Zeros;

impl Initializer for Zeros {
    fn initialize(&self, tensor: &mut Tensor) {
        tensor.data.fill(0.0);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ones;

impl Initializer for Ones {
    fn initialize(&self, tensor: &mut Tensor) {
        tensor.data.fill(1.0);
    }
}

/// Samples from N(mean, stddev²)
#[derive(Debug, Clone, Copy)]
pub struct RandomNormal {
    dist: Normal<f32>,
    seed: Option<u64>,
}

impl RandomNormal {
    pub fn new(mean: f32, stddev: f32) -> Result<Self> {
        Ok(Self {
            dist: normal(mean, stddev)?,
            seed: None,
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Initializer for RandomNormal {
    fn initialize(&self, tensor: &mut Tensor) {
        let mut rng = make_rng(self.seed);
        for v in tensor.data.iter_mut() {
            *v = self.dist.sample(&mut rng);
        }
    }
}

/// Normal samples, redrawn until they fall within two standard deviations
#[derive(Debug, Clone, Copy)]
pub struct TruncatedNormal {
    dist: Normal<f32>,
    seed: Option<u64>,
}

impl TruncatedNormal {
    pub fn new(mean: f32, stddev: f32) -> Result<Self> {
        Ok(Self {
            dist: normal(mean, stddev)?,
            seed: None,
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Initializer for TruncatedNormal {
    fn initialize(&self, tensor: &mut Tensor) {
        let mut rng = make_rng(self.seed);
        let mean = self.dist.mean();
        let bound = 2.0 * self.dist.std_dev();
        for v in tensor.data.iter_mut() {
            *v = loop {
                let sample = self.dist.sample(&mut rng);
                if (sample - mean).abs() <= bound {
                    break sample;
                }
            };
        }
    }
}

/// Uniform samples in `[low, high)`
#[derive(Debug, Clone)]
pub struct RandomUniform {
    dist: Uniform<f32>,
    seed: Option<u64>,
}

impl RandomUniform {
    /// # Errors
    ///
    /// `InvalidConfig` unless `low < high` and the width `high - low` is
    /// finite.
    pub fn new(low: f32, high: f32) -> Result<Self> {
        if !low.is_finite() || !high.is_finite() || low >= high || !(high - low).is_finite() {
            return Err(LayerError::InvalidConfig(format!(
                "uniform initializer needs finite low < high, got [{low}, {high})"
            )));
        }
        let dist = Uniform::new(low, high).map_err(|e| {
            LayerError::InvalidConfig(format!("uniform initializer [{low}, {high}): {e}"))
        })?;
        Ok(Self { dist, seed: None })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Initializer for RandomUniform {
    fn initialize(&self, tensor: &mut Tensor) {
        let mut rng = make_rng(self.seed);
        for v in tensor.data.iter_mut() {
            *v = self.dist.sample(&mut rng);
        }
    }
}

/// Xavier/Glorot uniform: `limit = √(6 / (fan_in + fan_out))`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct XavierUniform {
    seed: Option<u64>,
}

impl XavierUniform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Initializer for XavierUniform {
    fn initialize(&self, tensor: &mut Tensor) {
        let (fan_in, fan_out) = fans(&tensor.shape);
        let limit = (6.0f32 / (fan_in + fan_out) as f32).sqrt();
        let mut rng = make_rng(self.seed);
        for v in tensor.data.iter_mut() {
            *v = rng.random_range(-limit..limit);
        }
    }
}

/// He normal: `N(0, 2 / fan_in)`, suited to ReLU-family activations
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeNormal {
    seed: Option<u64>,
}

impl HeNormal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Initializer for HeNormal {
    fn initialize(&self, tensor: &mut Tensor) {
        let (fan_in, _) = fans(&tensor.shape);
        let scale = (2.0 / fan_in as f32).sqrt();
        let mut rng = make_rng(self.seed);
        for v in tensor.data.iter_mut() {
            let z: f32 = StandardNormal.sample(&mut rng);
            *v = z * scale;
        }
    }
}

/// Serializable description of an initializer
///
/// ```rust
/// use knets::initializer::InitializerSpec;
///
/// let spec: InitializerSpec =
///     serde_json::from_str(r#"{"kind": "random_uniform", "low": -0.1, "high": 0.1, "seed": 3}"#)
///         .unwrap();
/// assert!(spec.build().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InitializerSpec {
    Constant {
        value: f32,
    },
    Zeros,
    Ones,
    RandomNormal {
        mean: f32,
        stddev: f32,
        seed: Option<u64>,
    },
    TruncatedNormal {
        mean: f32,
        stddev: f32,
        seed: Option<u64>,
    },
    RandomUniform {
        low: f32,
        high: f32,
        seed: Option<u64>,
    },
    XavierUniform {
        seed: Option<u64>,
    },
    HeNormal {
        seed: Option<u64>,
    },
}

impl InitializerSpec {
    /// Validate parameters and build the initializer
    pub fn build(&self) -> Result<Box<dyn Initializer>> {
        let init: Box<dyn Initializer> = match *self {
            InitializerSpec::Constant { value } => Box::new(Constant::new(value)),
            InitializerSpec::Zeros => Box::new(Zeros),
            InitializerSpec::Ones => Box::new(Ones),
            InitializerSpec::RandomNormal { mean, stddev, seed } => {
                let init = RandomNormal::new(mean, stddev)?;
                Box::new(match seed {
                    Some(s) => init.with_seed(s),
                    None => init,
                })
            }
            InitializerSpec::TruncatedNormal { mean, stddev, seed } => {
                let init = TruncatedNormal::new(mean, stddev)?;
                Box::new(match seed {
                    Some(s) => init.with_seed(s),
                    None => init,
                })
            }
            InitializerSpec::RandomUniform { low, high, seed } => {
                let init = RandomUniform::new(low, high)?;
                Box::new(match seed {
                    Some(s) => init.with_seed(s),
                    None => init,
                })
            }
            InitializerSpec::XavierUniform { seed } => Box::new(XavierUniform { seed }),
            InitializerSpec::HeNormal { seed } => Box::new(HeNormal { seed }),
        };
        Ok(init)
    }
}

/// Every name accepted by [`from_name`]
pub const INITIALIZER_NAMES: [&str; 6] = [
    "zeros",
    "ones",
    "truncated_normal",
    "random_normal",
    "xavier_uniform",
    "he_normal",
];

/// Select an initializer by name with its default parameters
///
/// `truncated_normal` and `random_normal` use mean 0.0 and stddev 0.01.
///
/// # Errors
///
/// `TypeError` for names outside [`INITIALIZER_NAMES`].
pub fn from_name(name: &str) -> Result<Box<dyn Initializer>> {
    let init: Box<dyn Initializer> = match name {
        "zeros" => Box::new(Zeros),
        "ones" => Box::new(Ones),
        "truncated_normal" => Box::new(TruncatedNormal::new(0.0, 0.01)?),
        "random_normal" => Box::new(RandomNormal::new(0.0, 0.01)?),
        "xavier_uniform" => Box::new(XavierUniform::new()),
        "he_normal" => Box::new(HeNormal::new()),
        other => {
            return Err(LayerError::TypeError {
                expected: "initializer (zeros, ones, truncated_normal, random_normal, xavier_uniform, he_normal)",
                got: other.to_string(),
            })
        }
    };
    Ok(init)
}

/// Default weight initializer: truncated normal, mean 0, stddev 0.01
pub fn default_weight_initializer() -> Result<TruncatedNormal> {
    TruncatedNormal::new(0.0, 0.01)
}

/// Default bias initializer: constant 0.01
pub fn default_bias_initializer() -> Constant {
    Constant::new(0.01)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_fill() {
        let mut t = Tensor::zeros(vec![2, 3]);
        Constant::new(0.25).initialize(&mut t);
        assert!(t.data.iter().all(|&v| v == 0.25));
    }

    #[test]
    fn test_truncated_normal_stays_within_two_sigma() {
        let init = TruncatedNormal::new(1.0, 0.1).unwrap().with_seed(42);
        let mut t = Tensor::zeros(vec![50, 50]);
        init.initialize(&mut t);
        assert!(t.data.iter().all(|&v| (v - 1.0).abs() <= 0.2 + 1e-6));
        let mean: f32 = t.data.iter().sum::<f32>() / t.len() as f32;
        assert!((mean - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_invalid_stddev_rejected() {
        assert!(matches!(
            TruncatedNormal::new(0.0, -1.0),
            Err(LayerError::InvalidConfig(_))
        ));
        assert!(RandomNormal::new(f32::NAN, 1.0).is_err());
    }

    #[test]
    fn test_uniform_bounds() {
        assert!(RandomUniform::new(1.0, 1.0).is_err());
        let init = RandomUniform::new(-0.5, 0.5).unwrap().with_seed(9);
        let mut t = Tensor::zeros(vec![10, 10]);
        init.initialize(&mut t);
        assert!(t.data.iter().all(|&v| (-0.5..0.5).contains(&v)));
    }

    #[test]
    fn test_uniform_rejects_overflowing_width() {
        // Both bounds are finite but high - low overflows f32
        assert!(matches!(
            RandomUniform::new(-3e38, 3e38),
            Err(LayerError::InvalidConfig(_))
        ));
        let spec = InitializerSpec::RandomUniform {
            low: -3e38,
            high: 3e38,
            seed: Some(1),
        };
        assert!(matches!(spec.build(), Err(LayerError::InvalidConfig(_))));
    }

    #[test]
    fn test_xavier_range() {
        // Xavier limit = sqrt(6 / (100 + 50)) = 0.2
        let mut t = Tensor::zeros(vec![100, 50]);
        XavierUniform::new().with_seed(1).initialize(&mut t);
        let limit = (6.0f32 / 150.0).sqrt();
        assert!(t.data.iter().all(|&v| v >= -limit && v <= limit));
    }

    #[test]
    fn test_seeded_fills_repeat() {
        let init = HeNormal::new().with_seed(5);
        let mut a = Tensor::zeros(vec![8, 4]);
        let mut b = Tensor::zeros(vec![8, 4]);
        init.initialize(&mut a);
        init.initialize(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_spec_from_json() {
        let spec: InitializerSpec =
            serde_json::from_str(r#"{"kind": "constant", "value": 0.5}"#).unwrap();
        let init = spec.build().unwrap();
        let mut t = Tensor::zeros(vec![1, 2]);
        init.initialize(&mut t);
        assert_eq!(t.data, vec![0.5, 0.5]);
    }

    #[test]
    fn test_spec_validation() {
        let spec = InitializerSpec::RandomUniform {
            low: 1.0,
            high: 0.0,
            seed: None,
        };
        assert!(spec.build().is_err());
    }

    #[test]
    fn test_from_name() {
        assert!(from_name("xavier_uniform").is_ok());
        assert!(matches!(
            from_name("orthogonal"),
            Err(LayerError::TypeError { .. })
        ));
    }
}
