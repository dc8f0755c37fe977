//! Error Types
//!
//! Every failure in the layer protocol is a programmer-ordering or
//! configuration error. Nothing is retried: errors surface immediately to the
//! caller, and a failed forward/backward call never touches sibling layers.

use thiserror::Error;

/// Errors raised by tensors, signals, layers and chains.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LayerError {
    /// A capability was selected by a name that does not exist.
    #[error("type error: expected {expected}, got `{got}`")]
    TypeError { expected: &'static str, got: String },

    /// Tensor shapes disagree at an operation boundary.
    #[error("shape mismatch in {op}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        op: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// `backward` was called before the output gradient was populated.
    #[error("gradient not ready: output of layer `{layer}` has no gradient")]
    GradientNotReady { layer: &'static str },

    /// A signal's gradient slot was written more than once.
    #[error("gradient already set on signal at position {position}")]
    AlreadySet { position: usize },

    /// A layer was asked for backward state before any forward call.
    #[error("layer `{layer}` has not been evaluated")]
    NotEvaluated { layer: &'static str },

    /// A signal arrived at the wrong place in a chain.
    #[error("sequence mismatch: expected position {expected}, got {got}")]
    SequenceMismatch { expected: usize, got: usize },

    /// A configuration or capability parameter is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("json error: {0}")]
    Json(String),
}

impl LayerError {
    pub(crate) fn shape(op: &'static str, expected: &[usize], got: &[usize]) -> Self {
        LayerError::ShapeMismatch {
            op,
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }
}

impl From<std::io::Error> for LayerError {
    fn from(err: std::io::Error) -> Self {
        LayerError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for LayerError {
    fn from(err: serde_json::Error) -> Self {
        LayerError::Json(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LayerError>;
