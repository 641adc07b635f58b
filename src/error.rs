//! Error type shared by the regressors, the loss adapter and the minimizers.
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Unknown strategy identifier or option value naming an algorithm.
    #[error("the {family} method {name:?} is not implemented yet")]
    NotSupported { family: &'static str, name: String },

    /// An option is present but has the wrong type or an unusable value.
    #[error("option `{key}` expects {expected}, found {found}")]
    InvalidOption {
        key: String,
        expected: &'static str,
        found: String,
    },

    /// A minimizer builder rejected its configuration.
    #[error("invalid minimizer configuration: {0}")]
    Builder(String),

    #[error("expected {expected} bounds, one per parameter, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("invalid bounds for dimension {index}: ({min}, {max})")]
    InvalidBounds { index: usize, min: f64, max: f64 },

    #[error("cannot regress a model with no parameters")]
    EmptyParameters,

    /// The model failed to evaluate its loss for a candidate.
    #[error("loss evaluation failed: {0}")]
    Evaluation(String),

    #[error("the model does not provide an analytic gradient")]
    GradientNotImplemented,

    #[error("gradient has {found} entries, expected {expected}")]
    GradientDimMismatch { expected: usize, found: usize },

    #[error("malformed options: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for models reporting an evaluation failure.
    pub fn evaluation(message: impl Into<String>) -> Self {
        Error::Evaluation(message.into())
    }

    /// True for errors raised while validating configuration, before any
    /// loss evaluation took place.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::NotSupported { .. } | Error::InvalidOption { .. } | Error::Builder(_)
        )
    }
}
