use thiserror::Error;

/// Why an order was rejected as a learning sample.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidOrderReason {
    #[error("order has no items")]
    Empty,
    #[error("order contains a missing item")]
    MissingItem,
    #[error("product appears more than once in the order")]
    DuplicateProduct,
    #[error("order item has zero quantity")]
    ZeroQuantity,
    #[error("measured weight must be positive")]
    NonPositiveWeight,
    #[error("measured weight is not finite")]
    NonFiniteWeight,
}

/// Main crate error type
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Order failed the learning preconditions
    #[error("Invalid order: {0}")]
    InvalidOrder(InvalidOrderReason),

    /// Posterior covariance became singular or non-finite
    #[error("Numeric degeneracy during {stage} (dimension {dimension})")]
    NumericDegeneracy { stage: &'static str, dimension: usize },

    /// Configuration value out of range
    #[error("Config error: {0}")]
    Config(String),

    /// Unknown estimator name
    #[error("Unknown estimator '{0}'. Use: ema, kalman, bayesian")]
    UnknownEstimator(String),

    /// File system error
    #[error("IO error: {0}")]
    Io(String),

    /// JSON parse error
    #[error("Json parse error: {0}")]
    JsonParse(String),

    /// TOML parse error
    #[error("Toml parse error: {0}")]
    TomlParse(String),
}

pub type Result<T> = std::result::Result<T, Error>;

// Convenience constructors for common error patterns
impl Error {
    /// Create a numeric degeneracy error
    pub fn degenerate(stage: &'static str, dimension: usize) -> Self {
        Error::NumericDegeneracy { stage, dimension }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Whether this error indicates a corrupted-posterior risk
    pub fn is_numeric_degeneracy(&self) -> bool {
        matches!(self, Error::NumericDegeneracy { .. })
    }
}

impl From<InvalidOrderReason> for Error {
    fn from(reason: InvalidOrderReason) -> Self {
        Error::InvalidOrder(reason)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::JsonParse(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::TomlParse(e.to_string())
    }
}
